//! The book draft as an explicit state value.
//!
//! All mutation goes through [`Draft::update`], which consumes the state and
//! an [`Action`] and returns the next state plus the side effects the caller
//! must carry out. Chapter-scoped actions carry the outline generation they
//! were issued under; results for a discarded outline are dropped.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::errors::BookError;
use crate::wire::{
    ChapterId, ChapterOutline, ChapterWriteParams, OutlineDraft, ReviewChapter, SavedChapter,
    WrittenChapterContent,
};

#[derive(Debug, Clone)]
pub enum Action {
    /// A new outline was requested: everything derived from the old one goes.
    OutlineRequested,
    OutlineGenerated {
        generation: u64,
        drafts: Vec<OutlineDraft>,
        stamp: i64,
    },
    OutlineAdjusted {
        generation: u64,
        id: ChapterId,
        draft: OutlineDraft,
    },
    ChapterWritten {
        generation: u64,
        id: ChapterId,
        content: WrittenChapterContent,
    },
    ChapterAdjusted {
        generation: u64,
        id: ChapterId,
        content: WrittenChapterContent,
    },
    ReviewCompleted {
        generation: u64,
        chapters: Vec<ReviewChapter>,
    },
    CoverGenerated {
        generation: u64,
        id: ChapterId,
        data_uri: String,
    },
    ChapterSaved(SavedChapter),
    ChapterDeleted(ChapterId),
    Failed(String),
    ErrorCleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Rewrite the saved-chapter sequence to durable storage.
    PersistSaved,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    generation: u64,
    outline: Vec<ChapterOutline>,
    written: HashMap<ChapterId, WrittenChapterContent>,
    covers: HashMap<ChapterId, String>,
    saved: Vec<SavedChapter>,
    error: Option<String>,
}

impl Draft {
    pub fn with_saved(saved: Vec<SavedChapter>) -> Self {
        Self { saved, ..Self::default() }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn outline(&self) -> &[ChapterOutline] {
        &self.outline
    }

    pub fn chapter(&self, id: &ChapterId) -> Option<&ChapterOutline> {
        self.outline.iter().find(|c| &c.id == id)
    }

    /// Identifier of the chapter at 1-based `position`.
    pub fn id_at(&self, position: usize) -> Option<&ChapterId> {
        position.checked_sub(1).and_then(|i| self.outline.get(i)).map(|c| &c.id)
    }

    pub fn written(&self, id: &ChapterId) -> Option<&WrittenChapterContent> {
        self.written.get(id)
    }

    pub fn written_count(&self) -> usize {
        self.outline.iter().filter(|c| self.written.contains_key(&c.id)).count()
    }

    pub fn cover(&self, id: &ChapterId) -> Option<&str> {
        self.covers.get(id).map(String::as_str)
    }

    pub fn saved(&self) -> &[SavedChapter] {
        &self.saved
    }

    pub fn is_saved(&self, id: &ChapterId) -> bool {
        self.saved.iter().any(|c| &c.id == id)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_ready_for_review(&self) -> bool {
        !self.outline.is_empty() && self.outline.iter().all(|c| self.written.contains_key(&c.id))
    }

    fn require_chapter(&self, id: &ChapterId) -> Result<(usize, &ChapterOutline), BookError> {
        self.outline
            .iter()
            .enumerate()
            .find(|(_, c)| &c.id == id)
            .ok_or_else(|| BookError::InvalidParameter(format!("章 {id} は現在の目次にありません。")))
    }

    /// Everything needed to write chapter `id`: its position, the total and
    /// every title for the table of contents.
    pub fn write_params(
        &self,
        id: &ChapterId,
        topic: &str,
        thinking: bool,
    ) -> Result<ChapterWriteParams, BookError> {
        let (index, chapter) = self.require_chapter(id)?;
        Ok(ChapterWriteParams {
            topic: topic.to_string(),
            outline: chapter.to_draft(),
            index: index + 1,
            total: self.outline.len(),
            titles: self.outline.iter().map(|c| c.title.clone()).collect(),
            thinking,
        })
    }

    pub fn outline_draft(&self, id: &ChapterId) -> Result<OutlineDraft, BookError> {
        self.require_chapter(id).map(|(_, c)| c.to_draft())
    }

    pub fn written_or_err(&self, id: &ChapterId) -> Result<&WrittenChapterContent, BookError> {
        self.require_chapter(id)?;
        self.written
            .get(id)
            .ok_or_else(|| BookError::Precondition("この章はまだ執筆されていません。".into()))
    }

    /// Manuscript for the final review, in outline order.
    pub fn review_request(&self) -> Result<Vec<ReviewChapter>, BookError> {
        if !self.is_ready_for_review() {
            return Err(BookError::Precondition(
                "全体推敲の前に、すべての章を執筆してください。".into(),
            ));
        }
        Ok(self
            .outline
            .iter()
            .filter_map(|c| {
                self.written.get(&c.id).map(|w| ReviewChapter {
                    title: c.title.clone(),
                    content: w.content.clone(),
                })
            })
            .collect())
    }

    pub fn snapshot(&self, id: &ChapterId) -> Result<SavedChapter, BookError> {
        let (_, chapter) = self.require_chapter(id)?;
        let written = self.written_or_err(id)?;
        Ok(SavedChapter::snapshot(chapter, written))
    }

    fn is_current(&self, generation: u64, what: &str) -> bool {
        if generation != self.generation {
            debug!(generation, current = self.generation, what, "dropping result for a discarded outline");
            return false;
        }
        true
    }

    fn has_chapter(&self, id: &ChapterId) -> bool {
        self.outline.iter().any(|c| &c.id == id)
    }

    pub fn update(mut self, action: Action) -> (Self, Vec<Effect>) {
        let mut effects = Vec::new();
        match action {
            Action::OutlineRequested => {
                self.generation += 1;
                self.outline.clear();
                self.written.clear();
                self.covers.clear();
                self.error = None;
            }
            Action::OutlineGenerated { generation, drafts, stamp } => {
                if self.is_current(generation, "outline") {
                    self.written.clear();
                    self.covers.clear();
                    self.outline = drafts
                        .into_iter()
                        .enumerate()
                        .map(|(i, d)| ChapterOutline::from_draft(ChapterId::generated(stamp, i), d))
                        .collect();
                }
            }
            Action::OutlineAdjusted { generation, id, draft } => {
                if self.is_current(generation, "outline adjustment") {
                    if let Some(chapter) = self.outline.iter_mut().find(|c| c.id == id) {
                        chapter.apply_draft(draft);
                    }
                }
            }
            Action::ChapterWritten { generation, id, content }
            | Action::ChapterAdjusted { generation, id, content } => {
                if self.is_current(generation, "chapter") && self.has_chapter(&id) {
                    self.written.insert(id, content);
                }
            }
            Action::ReviewCompleted { generation, chapters } => {
                if self.is_current(generation, "review") {
                    self.apply_review(chapters);
                }
            }
            Action::CoverGenerated { generation, id, data_uri } => {
                if self.is_current(generation, "cover") && self.has_chapter(&id) {
                    self.covers.insert(id, data_uri);
                }
            }
            Action::ChapterSaved(snapshot) => {
                if !self.is_saved(&snapshot.id) {
                    self.saved.push(snapshot);
                    effects.push(Effect::PersistSaved);
                }
            }
            Action::ChapterDeleted(id) => {
                let before = self.saved.len();
                self.saved.retain(|c| c.id != id);
                if self.saved.len() != before {
                    effects.push(Effect::PersistSaved);
                }
            }
            Action::Failed(message) => self.error = Some(message),
            Action::ErrorCleared => self.error = None,
        }
        (self, effects)
    }

    /// Matches reviewed chapters back by exact title; the first outline entry
    /// with that title wins. Only `content` changes.
    fn apply_review(&mut self, chapters: Vec<ReviewChapter>) {
        for reviewed in chapters {
            let Some(id) = self
                .outline
                .iter()
                .find(|c| c.title == reviewed.title)
                .map(|c| c.id.clone())
            else {
                warn!(title = %reviewed.title, "reviewed chapter matches no outline title; skipped");
                continue;
            };
            if let Some(written) = self.written.get_mut(&id) {
                written.content = reviewed.content;
            }
        }
    }
}
