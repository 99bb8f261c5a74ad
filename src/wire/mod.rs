use std::fmt;

use clap::ValueEnum;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::BookError;
use crate::schema::Schema;

/// ========================================
/// Book draft data model
/// ========================================

/// Opaque chapter identifier. Local only; never sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(String);

impl ChapterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `<stamp>-<position>`; unique within one generated outline.
    pub fn generated(stamp: i64, position: usize) -> Self {
        Self(format!("{stamp}-{position}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Section {
    pub title: String,
    pub summary: String,
}

/// A chapter plan as exchanged with the model (no identifier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OutlineDraft {
    pub title: String,
    pub overview: String,
    pub purpose: String,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterOutline {
    pub id: ChapterId,
    pub title: String,
    pub overview: String,
    pub purpose: String,
    pub sections: Vec<Section>,
}

impl ChapterOutline {
    pub fn from_draft(id: ChapterId, draft: OutlineDraft) -> Self {
        Self {
            id,
            title: draft.title,
            overview: draft.overview,
            purpose: draft.purpose,
            sections: draft.sections,
        }
    }

    /// Replace everything except the identifier.
    pub fn apply_draft(&mut self, draft: OutlineDraft) {
        self.title = draft.title;
        self.overview = draft.overview;
        self.purpose = draft.purpose;
        self.sections = draft.sections;
    }

    pub fn to_draft(&self) -> OutlineDraft {
        OutlineDraft {
            title: self.title.clone(),
            overview: self.overview.clone(),
            purpose: self.purpose.clone(),
            sections: self.sections.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WrittenChapterContent {
    pub content: String,
    pub intent: String,
}

/// Outline and written content captured at save time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedChapter {
    pub id: ChapterId,
    pub title: String,
    pub overview: String,
    pub purpose: String,
    pub sections: Vec<Section>,
    pub content: String,
    pub intent: String,
}

impl SavedChapter {
    pub fn snapshot(outline: &ChapterOutline, written: &WrittenChapterContent) -> Self {
        Self {
            id: outline.id.clone(),
            title: outline.title.clone(),
            overview: outline.overview.clone(),
            purpose: outline.purpose.clone(),
            sections: outline.sections.clone(),
            content: written.content.clone(),
            intent: written.intent.clone(),
        }
    }
}

/// One chapter as submitted to, and returned from, the final review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReviewChapter {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReviewResult {
    pub chapters: Vec<ReviewChapter>,
}

/// Reader level, 1 (novice) to 5 (domain expert).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Difficulty {
    Novice,
    Basic,
    Business,
    Experienced,
    Expert,
}

impl Difficulty {
    pub const ALL: [Difficulty; 5] = [
        Difficulty::Novice,
        Difficulty::Basic,
        Difficulty::Business,
        Difficulty::Experienced,
        Difficulty::Expert,
    ];

    pub fn level(self) -> u8 {
        match self {
            Difficulty::Novice => 1,
            Difficulty::Basic => 2,
            Difficulty::Business => 3,
            Difficulty::Experienced => 4,
            Difficulty::Expert => 5,
        }
    }

    pub fn audience(self) -> &'static str {
        match self {
            Difficulty::Novice => "このトピックに関する事前の知識が全くない完全な初心者",
            Difficulty::Basic => "このトピックについて基本的な理解がある人々",
            Difficulty::Business => {
                "この特定分野の専門家ではないが、一般的に知識のある平均的なビジネスパーソン"
            }
            Difficulty::Experienced => "このトピックにおいて重要な経験と高度な知識を持つ個人",
            Difficulty::Expert => "この特定分野の第一線の専門家、研究者、または教授",
        }
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = BookError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Difficulty::ALL
            .into_iter()
            .find(|d| d.level() == level)
            .ok_or_else(|| {
                BookError::InvalidParameter(format!(
                    "読者レベルは1〜5で指定してください（指定値: {level}）。"
                ))
            })
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageTone {
    LineArt,
    Watercolor,
    Creative,
}

impl ImageTone {
    pub fn style(self) -> &'static str {
        match self {
            ImageTone::LineArt => "Create a minimalist and sophisticated line art image on a clean white background. Use a single, elegant PANTONE accent color. Any text included must be in English. The overall feel should be modern and professional.",
            ImageTone::Watercolor => "Create a gentle and light watercolor painting. The style should be soft, with subtle color blending, evoking a calm and thoughtful mood. If any text is included, it must be in English.",
            ImageTone::Creative => "Creatively and abstractly interpret the theme. Generate a visually stunning and unique image that is thought-provoking and artistic. Feel free to use any style that best represents the core concept. If any text is included, it must be in English.",
        }
    }
}

/// ========================================
/// Operation parameters
/// ========================================

#[derive(Debug, Clone)]
pub struct OutlineParams {
    pub topic: String,
    pub direction: Option<String>,
    /// Callers keep this within 3..=12; only zero is rejected here.
    pub chapter_count: u32,
    pub difficulty: Difficulty,
    pub thinking: bool,
}

impl OutlineParams {
    pub fn validate(&self) -> Result<(), BookError> {
        if self.topic.trim().is_empty() {
            return Err(BookError::InvalidParameter("書籍のテーマを入力してください。".into()));
        }
        if self.chapter_count == 0 {
            return Err(BookError::InvalidParameter("章の数は1以上で指定してください。".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ChapterWriteParams {
    pub topic: String,
    pub outline: OutlineDraft,
    /// 1-based position in the outline.
    pub index: usize,
    pub total: usize,
    pub titles: Vec<String>,
    pub thinking: bool,
}

/// ========================================
/// Model request wire types
/// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    GenerateOutline,
    AdjustOutline,
    WriteChapter,
    AdjustChapter,
    FinalReview,
    GenerateImage,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::GenerateOutline => "generate_outline",
            Operation::AdjustOutline => "adjust_outline",
            Operation::WriteChapter => "write_chapter",
            Operation::AdjustChapter => "adjust_chapter",
            Operation::FinalReview => "final_review",
            Operation::GenerateImage => "generate_image",
        }
    }

    /// Localized message shown when the operation fails for any reason
    /// other than configuration.
    pub fn failure_message(self) -> &'static str {
        match self {
            Operation::GenerateOutline => "目次案の生成に失敗しました。",
            Operation::AdjustOutline => "構成案の修正に失敗しました。",
            Operation::WriteChapter => "章の執筆に失敗しました。",
            Operation::AdjustChapter => "章の調整に失敗しました。",
            Operation::FinalReview => "全体推敲に失敗しました。",
            Operation::GenerateImage => "画像の生成に失敗しました。",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a prompt builder produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub instruction: String,
    pub message: String,
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub operation: Operation,
    pub prompt: Prompt,
    pub thinking_budget: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub aspect_ratio: &'static str,
    pub mime_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

impl GeneratedImage {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn difficulty_levels_map_to_distinct_audiences() {
        let audiences: HashSet<_> = Difficulty::ALL.iter().map(|d| d.audience()).collect();
        assert_eq!(audiences.len(), 5);
        for level in 1..=5u8 {
            assert_eq!(Difficulty::try_from(level).unwrap().level(), level);
        }
    }

    #[test]
    fn difficulty_out_of_range_is_rejected() {
        assert!(matches!(Difficulty::try_from(0), Err(BookError::InvalidParameter(_))));
        assert!(matches!(Difficulty::try_from(6), Err(BookError::InvalidParameter(_))));
    }

    #[test]
    fn saved_chapter_serializes_flat() {
        let outline = ChapterOutline {
            id: ChapterId::generated(1700000000000, 2),
            title: "旗を立てる".into(),
            overview: "概要".into(),
            purpose: "目的".into(),
            sections: vec![Section { title: "節".into(), summary: "要約".into() }],
        };
        let written = WrittenChapterContent { content: "本文".into(), intent: "意図".into() };
        let value = serde_json::to_value(SavedChapter::snapshot(&outline, &written)).unwrap();
        assert_eq!(value["id"], "1700000000000-2");
        assert_eq!(value["title"], "旗を立てる");
        assert_eq!(value["content"], "本文");
        assert_eq!(value["sections"][0]["summary"], "要約");
    }

    #[test]
    fn response_types_satisfy_their_own_schemas() {
        let outline = vec![OutlineDraft {
            title: "問い".into(),
            overview: "概要".into(),
            purpose: "目的".into(),
            sections: vec![Section { title: "節".into(), summary: "要約".into() }],
        }];
        let review = ReviewResult {
            chapters: vec![ReviewChapter { title: "問い".into(), content: "本文".into() }],
        };
        let written = WrittenChapterContent { content: "本文".into(), intent: "意図".into() };

        let checks = [
            (Schema::of::<Vec<OutlineDraft>>(), serde_json::to_value(&outline).unwrap()),
            (Schema::of::<ReviewResult>(), serde_json::to_value(&review).unwrap()),
            (Schema::of::<WrittenChapterContent>(), serde_json::to_value(&written).unwrap()),
        ];
        for (schema, value) in &checks {
            assert_eq!(schema.validate(value), Ok(()));
        }
    }

    #[test]
    fn outline_schema_requires_every_field() {
        let gemini = Schema::of::<OutlineDraft>().to_gemini();
        assert_eq!(gemini["type"], "OBJECT");
        assert_eq!(gemini["required"], serde_json::json!(["overview", "purpose", "sections", "title"]));
        assert_eq!(
            gemini["properties"]["sections"]["items"]["required"],
            serde_json::json!(["summary", "title"])
        );
        assert!(gemini["properties"]["title"].get("description").is_none());
    }

    #[test]
    fn image_data_uri_uses_mime_type() {
        let image = GeneratedImage { mime_type: "image/jpeg".into(), data: "QUJD".into() };
        assert_eq!(image.data_uri(), "data:image/jpeg;base64,QUJD");
    }
}
