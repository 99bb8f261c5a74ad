use crate::draft::Draft;

pub const CHAPTER_SEPARATOR: &str = "\n\n---\n\n";

/// Whole draft as one Markdown document for pasting into an editor.
/// Unwritten chapters fall back to their overview. `None` without an outline.
pub fn render_book(draft: &Draft) -> Option<String> {
    if draft.outline().is_empty() {
        return None;
    }
    let chapters: Vec<String> = draft
        .outline()
        .iter()
        .map(|chapter| {
            let body = match draft.written(&chapter.id) {
                Some(written) => written.content.clone(),
                None => format!("### 章の概要\n\n{}", chapter.overview),
            };
            format!("## {}\n\n{body}", chapter.title)
        })
        .collect();
    Some(chapters.join(CHAPTER_SEPARATOR))
}
