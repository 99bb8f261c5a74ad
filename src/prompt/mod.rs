use serde::Serialize;

use crate::errors::BookError;
use crate::schema::Schema;
use crate::wire::{
    ChapterWriteParams, ImageTone, OutlineDraft, OutlineParams, Prompt, ReviewChapter,
    ReviewResult, WrittenChapterContent,
};

/// Authorial voice shared by every text request.
pub const PERSONA: &str = r#"
あなたは特定の文体を持つ、日本の著名なビジネス思想家兼ライターです。あなたの名前は「柏木」として振る舞ってください。あなたの文体の核は「実践的フレームワークの探求と共有」です。
あなたの執筆スタイルには以下の特徴があります。

1.  **思考の体系化**: 複雑な事象や思考プロセスを、独自の「型」や「フレームワーク」に落とし込み、構造化・ステップ化して提示します。（例：「思考の流れ:基本の3ステップ」）
2.  **問いから始める**: 常に読者や自身への「問い」から論理を展開し、対話的に思考を促します。（例：「〜となっていませんか？」、「あなたのビジネスの計器はなんですか？」）
3.  **一人称での語り**: 「私が考える」「常々感じていることは」のように、常に「私」を主語とし、自身の経験や内省に基づいた具体性と説得力のある語り口をします。
4.  **対話の呼び水**: あなたの文章は、単体で完結するものではなく、その後のディスカッションや「壁打ち」のきっかけとなることを明確に意図しています。
5.  **比喩の多用**: 抽象的な概念を読者が直感的に理解できるよう、以下のような巧みな比喩を用います。
    *   プロジェクトを「ゲーム」として捉える（例：手持ちのカード、戦略）
    *   組織を「生態系（エコシステム）」として捉える
    *   思考やアイデアを「物理的な構造物」として捉える（例：アイデアを壊す、土台を再検証する）
    *   コンセプトや目標を「旗」として捉える（例：旗を立てる）
    *   不確実な状況を「飛行（フライト）」として捉える（例：計器を見ながら飛行する）
"#;

const KANJI_ORDINALS: [&str; 12] = [
    "", "一", "二", "三", "四", "五", "六", "七", "八", "九", "十", "十一",
];

fn kanji_ordinal(n: usize) -> String {
    match KANJI_ORDINALS.get(n) {
        Some(k) if !k.is_empty() => (*k).to_string(),
        _ => n.to_string(),
    }
}

/// Human-facing label for the chapter at 1-based `index`.
///
/// With more than one chapter the first and last slots are the prologue and
/// epilogue, so numbering starts at the second slot.
pub fn chapter_label(index: usize, total: usize, title: &str) -> String {
    if total > 1 && index == 1 {
        return format!("序章：{title}");
    }
    if total > 1 && index == total {
        return format!("終章：{title}");
    }
    if total == 1 {
        return title.to_string();
    }
    format!("第{}章：{title}", kanji_ordinal(index.saturating_sub(1)))
}

fn table_of_contents(total: usize, titles: &[String]) -> String {
    titles
        .iter()
        .enumerate()
        .map(|(i, title)| format!("- {}", chapter_label(i + 1, total, title)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Mandatory opening and closing blocks the model must reproduce verbatim.
/// Both are empty for a single-chapter book.
fn bookends(
    topic: &str,
    chapter_title: &str,
    index: usize,
    total: usize,
    titles: &[String],
) -> (String, String) {
    if total <= 1 {
        return (String::new(), String::new());
    }
    let toc = table_of_contents(total, titles);
    let title_at = |i: usize| titles.get(i).map(String::as_str).unwrap_or_default();

    if index == 1 {
        (
            format!("この書籍は「{topic}」というテーマで執筆しています。\n\n## この書籍の目次\n{toc}\n\n---\n\n"),
            format!(
                "\n\n---\n\n次章（{}）では、本格的な議論を始めていきます。",
                chapter_label(2, total, title_at(1))
            ),
        )
    } else if index == total {
        (
            format!("この書籍は「{topic}」というテーマで執筆してきました。本章が最終章となります。\n\n## この書籍の目次\n{toc}\n\n---\n\n"),
            format!("\n\n---\n\n以上で書籍「{topic}」は完結です。最後までお読みいただき、ありがとうございました。\n\n### 引用・参考文献\n- (ここに参考文献を記載)\n"),
        )
    } else {
        (
            format!("この書籍は「{topic}」というテーマで執筆しています。\n\n## この書籍の目次\n{toc}\n\nこのnoteでは、「{chapter_title}」について書きます。\n\n---\n\n"),
            format!(
                "\n\n---\n\n次章（{}）では、さらに議論を深めていきます。",
                chapter_label(index + 1, total, title_at(index))
            ),
        )
    }
}

fn require_text(value: &str, message: &str) -> Result<(), BookError> {
    if value.trim().is_empty() {
        return Err(BookError::InvalidParameter(message.to_string()));
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, BookError> {
    let encoded = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    encoded.map_err(|e| BookError::InvalidParameter(format!("JSONへの変換に失敗しました: {e}")))
}

pub fn build_outline_prompt(params: &OutlineParams, persona: &str) -> Result<Prompt, BookError> {
    params.validate()?;

    let topic = &params.topic;
    let count = params.chapter_count;
    let direction = match params.direction.as_deref() {
        Some(d) if !d.trim().is_empty() => format!("執筆の方向性: 「{d}」"),
        _ => String::new(),
    };
    let audience = params.difficulty.audience();

    let instruction = format!(
        r#"
{persona}
上記のペルソナと文体を厳格に守り、日本のビジネスパーソンをターゲットにしたブログプラットフォーム「note」向けの書籍の構成案を作成してください。

書籍のテーマ: "{topic}"
章の数: {count}章
{direction}
読者レベル: {audience}

各章について、以下の構造で詳細な構成案を生成してください。
1.  **title**: 読者の興味を引く、示唆に富んだ章のタイトル。
2.  **overview**: この章で書く内容の3〜5行程度のサマリー。
3.  **purpose**: 書籍全体の中で、この章が担う役割や意図。
4.  **sections**: 章を構成する適切な数の「節」。各節には「title」（節のタイトル）と「summary」（100文字程度の節の概要）を含めてください。
"#
    );

    Ok(Prompt {
        instruction,
        message: format!("テーマ「{topic}」について、{count}章構成で書籍の詳細な目次案を作成してください。"),
        schema: Schema::of::<Vec<OutlineDraft>>(),
    })
}

pub fn build_outline_adjustment_prompt(
    current: &OutlineDraft,
    instruction: &str,
    persona: &str,
) -> Result<Prompt, BookError> {
    require_text(instruction, "修正指示を入力してください。")?;
    let outline_json = to_json(current, true)?;

    let system = format!(
        r#"
{persona}
あなたは優秀な編集者です。以下の書籍の章の構成案を、ユーザーからの指示に基づいて修正してください。
出力形式は元の形式（JSON）を維持してください。

元の構成案:
{outline_json}

ユーザーからの修正指示:
「{instruction}」
"#
    );

    Ok(Prompt {
        instruction: system,
        message: format!("ユーザーの指示「{instruction}」に従って、章の構成案を修正してください。"),
        schema: Schema::of::<OutlineDraft>(),
    })
}

pub fn build_chapter_write_prompt(
    params: &ChapterWriteParams,
    persona: &str,
) -> Result<Prompt, BookError> {
    if params.index == 0 || params.index > params.total {
        return Err(BookError::InvalidParameter(format!(
            "章番号が範囲外です（{}／{}）。",
            params.index, params.total
        )));
    }

    let title = &params.outline.title;
    let (intro, outro) = bookends(&params.topic, title, params.index, params.total, &params.titles);
    let outline_json = to_json(&params.outline, true)?;

    let instruction = format!(
        r#"
{persona}

あなたは上記のペルソナと文体を厳格に守り、指定された構成案に基づいて、「note」向けの書籍の1章分を執筆します。

章のタイトル: "{title}"
この章の構成案:
{outline_json}

以下のルールを厳守してください：
1.  章全体の文字数は、厳密に2,000文字から5,000文字の間でなければなりません。
2.  読者がエンゲージ（スキ、シェア）したくなるような、洞察に富んだ内容にしてください。
3.  モバイルで読みやすいよう、Markdown形式を積極的に活用し、見出し（H2, H3）、太字、引用、箇条書きリストを使ってください。
    -   H2（##）は節のタイトルに使用してください。
4.  絵文字は一切使用しないでください。
5.  ハッシュタグは文末に3〜5個含めてください。
6.  以下の導入文と結びの文を、生成する本文の最初と最後に必ず含めてください。
    -   **導入**:
{intro}
    -   **結び**:
{outro}
7.  終章の場合は、全体の振り返りとして各章の簡単なサマリーを本文に含め、「引用・参考文献」の項目を末尾に用意してください。
"#
    );

    Ok(Prompt {
        instruction,
        message: format!("「{title}」というタイトルの章を執筆してください。"),
        schema: Schema::of::<WrittenChapterContent>(),
    })
}

pub fn build_chapter_adjustment_prompt(
    original: &WrittenChapterContent,
    instruction: &str,
    persona: &str,
) -> Result<Prompt, BookError> {
    require_text(instruction, "修正指示を入力してください。")?;
    let content = &original.content;
    let intent = &original.intent;

    let system = format!(
        r#"
{persona}
あなたは上記のペルソナと文体を厳格に守り、既存の書籍の章を修正します。
元の章の内容：
「{content}」

元の章の意図：
「{intent}」

以下の指示に従って、この章を修正してください： 「{instruction}」

修正後もMarkdown形式を維持し、絵文字は使用しないでください。文字数は2,000〜5,000字の範囲を維持してください。
"#
    );

    Ok(Prompt {
        instruction: system,
        message: "章を修正してください。".to_string(),
        schema: Schema::of::<WrittenChapterContent>(),
    })
}

pub fn build_final_review_prompt(
    chapters: &[ReviewChapter],
    persona: &str,
) -> Result<Prompt, BookError> {
    if chapters.is_empty() {
        return Err(BookError::InvalidParameter("推敲する章がありません。".into()));
    }
    let manuscript = to_json(&chapters, false)?;

    let instruction = format!(
        r#"
{persona}
あなたは書籍全体をレビューする優秀な編集者です。
以下の各章からなる書籍の原稿をすべて読み込み、以下の観点で推敲・修正してください。
-   言い回しや表現の統一
-   専門用語の揺れの修正
-   全体としての一貫性と流れの改善

修正後の各章の全文を、元のペルソナとMarkdown形式を維持したまま、JSON形式で返却してください。
"#
    );

    Ok(Prompt {
        instruction,
        message: format!("以下の書籍原稿を推敲してください：\n{manuscript}"),
        schema: Schema::of::<ReviewResult>(),
    })
}

/// Cover-image prompt. The source text is Japanese; the image must not
/// reproduce it.
pub fn build_image_prompt(content: &str, tone: ImageTone) -> Result<String, BookError> {
    require_text(content, "画像の元になる本文がありません。")?;
    let style = tone.style();

    Ok(format!(
        r#"
Generate a cover image for a Japanese 'note' article (1280x670px). The image must be visually compelling and directly inspired by the following text content.

**Image Style:** {style}

**Text Content to Inspire Image:**
"{content}"

Do not include any of the original Japanese text from the 'Text Content to Inspire Image' in the image. The image should be a metaphorical or direct representation of the core idea in the text.
"#
    ))
}
