//! Runs model operations against a [`Draft`] and routes their outcomes back
//! through [`Draft::update`]. Each operation clears the error slot when it
//! starts and fills it with a localized message when it fails.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::draft::{Action, Draft, Effect};
use crate::errors::BookError;
use crate::export;
use crate::gateway::Gateway;
use crate::lint;
use crate::storage::SavedChapterStore;
use crate::wire::{ChapterId, ChapterWriteParams, ImageTone, OutlineParams, WrittenChapterContent};

/// Owns the draft for one interactive run.
///
/// Operations take `&mut self` and so run one at a time. The exception is
/// [`Session::write_chapters`], which keeps several requests in flight and
/// applies each result as it completes. Results issued under an older
/// generation are dropped by the draft.
pub struct Session {
    gateway: Gateway,
    store: SavedChapterStore,
    draft: Draft,
    last_outline: Option<OutlineParams>,
    thinking: bool,
    max_parallel_writes: usize,
}

/// Outcome of one chapter in a batch write.
pub type WriteOutcome = (ChapterId, Result<Vec<String>, BookError>);

impl Session {
    /// Starts with whatever chapters were saved by earlier runs.
    pub fn open(gateway: Gateway, store: SavedChapterStore, cfg: &Config) -> Self {
        let saved = store.load();
        info!(count = saved.len(), "loaded saved chapters");
        Self {
            gateway,
            store,
            draft: Draft::with_saved(saved),
            last_outline: None,
            thinking: cfg.thinking_mode,
            max_parallel_writes: cfg.max_parallel_writes.max(1),
        }
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn topic(&self) -> Option<&str> {
        self.last_outline.as_ref().map(|p| p.topic.as_str())
    }

    /// Applies `action` to the draft without running effects.
    fn apply(&mut self, action: Action) -> Vec<Effect> {
        let (next, effects) = std::mem::take(&mut self.draft).update(action);
        self.draft = next;
        effects
    }

    fn dispatch(&mut self, action: Action) -> Result<(), BookError> {
        for effect in self.apply(action) {
            match effect {
                Effect::PersistSaved => self.store.save(self.draft.saved())?,
            }
        }
        Ok(())
    }

    /// The single place a failed operation is logged.
    fn fail(&mut self, e: BookError) -> BookError {
        match e {
            BookError::InvalidParameter(_) | BookError::Precondition(_) => {
                warn!(error = %e, "operation rejected")
            }
            _ => error!(error = %e, "operation failed"),
        }
        self.apply(Action::Failed(e.user_message()));
        e
    }

    fn check<T>(&mut self, result: Result<T, BookError>) -> Result<T, BookError> {
        result.map_err(|e| self.fail(e))
    }

    /// Replaces the outline. Invalid parameters leave the current draft as is.
    pub async fn generate_outline(&mut self, params: OutlineParams) -> Result<usize, BookError> {
        self.apply(Action::ErrorCleared);
        self.check(params.validate())?;

        self.apply(Action::OutlineRequested);
        let generation = self.draft.generation();
        let result = self.gateway.generate_outline(&params).await;
        self.last_outline = Some(params);
        let drafts = self.check(result)?;

        let count = drafts.len();
        self.apply(Action::OutlineGenerated {
            generation,
            drafts,
            stamp: Utc::now().timestamp_millis(),
        });
        info!(chapters = count, generation, "outline generated");
        Ok(count)
    }

    /// Runs the last outline request again.
    pub async fn regenerate(&mut self) -> Result<usize, BookError> {
        let params = self.last_outline.clone().ok_or_else(|| {
            BookError::Precondition("まだ目次案を生成していません。".into())
        });
        let params = self.check(params)?;
        self.generate_outline(params).await
    }

    pub async fn adjust_outline(
        &mut self,
        id: &ChapterId,
        instruction: &str,
    ) -> Result<(), BookError> {
        self.apply(Action::ErrorCleared);
        let current = self.check(self.draft.outline_draft(id))?;
        let generation = self.draft.generation();

        let result = self.gateway.adjust_outline(&current, instruction).await;
        let draft = self.check(result)?;
        self.apply(Action::OutlineAdjusted { generation, id: id.clone(), draft });
        Ok(())
    }

    /// Writes one chapter; returns lint findings for the new text.
    pub async fn write_chapter(&mut self, id: &ChapterId) -> Result<Vec<String>, BookError> {
        self.apply(Action::ErrorCleared);
        let params = self.check(self.write_params(id))?;
        let generation = self.draft.generation();

        let result = self.gateway.write_chapter(&params).await;
        let content = self.check(result)?;
        Ok(self.accept_written(generation, id.clone(), content, false))
    }

    /// Writes several chapters with up to `max_parallel_writes` requests in
    /// flight. One failure does not stop the others.
    pub async fn write_chapters(&mut self, ids: &[ChapterId]) -> Vec<WriteOutcome> {
        self.apply(Action::ErrorCleared);
        let generation = self.draft.generation();
        let mut outcomes = Vec::with_capacity(ids.len());

        let mut jobs = Vec::new();
        for id in ids {
            match self.write_params(id) {
                Ok(params) => jobs.push((id.clone(), params)),
                Err(e) => {
                    let e = self.fail(e);
                    outcomes.push((id.clone(), Err(e)));
                }
            }
        }

        let gateway = self.gateway.clone();
        let limit = self.max_parallel_writes;
        let mut results = stream::iter(jobs)
            .map(|(id, params)| {
                let gateway = &gateway;
                async move {
                    let result = gateway.write_chapter(&params).await;
                    (id, result)
                }
            })
            .buffer_unordered(limit);

        while let Some((id, result)) = results.next().await {
            match result {
                Ok(content) => {
                    let warnings = self.accept_written(generation, id.clone(), content, false);
                    outcomes.push((id, Ok(warnings)));
                }
                Err(e) => {
                    let e = self.fail(e);
                    outcomes.push((id, Err(e)));
                }
            }
        }
        outcomes
    }

    pub async fn adjust_chapter(
        &mut self,
        id: &ChapterId,
        instruction: &str,
    ) -> Result<Vec<String>, BookError> {
        self.apply(Action::ErrorCleared);
        let original = self.check(self.draft.written_or_err(id).cloned())?;
        let generation = self.draft.generation();

        let result = self.gateway.adjust_chapter(&original, instruction).await;
        let content = self.check(result)?;
        Ok(self.accept_written(generation, id.clone(), content, true))
    }

    /// Polishes the whole manuscript. Content changes only if the review
    /// succeeds; returns how many chapters the model sent back.
    pub async fn final_review(&mut self) -> Result<usize, BookError> {
        self.apply(Action::ErrorCleared);
        let chapters = self.check(self.draft.review_request())?;
        let generation = self.draft.generation();

        let result = self.gateway.final_review(&chapters).await;
        let reviewed = self.check(result)?;
        let count = reviewed.len();
        self.apply(Action::ReviewCompleted { generation, chapters: reviewed });
        info!(chapters = count, "final review applied");
        Ok(count)
    }

    pub async fn generate_cover(
        &mut self,
        id: &ChapterId,
        tone: ImageTone,
    ) -> Result<(), BookError> {
        self.apply(Action::ErrorCleared);
        let content = self.check(self.draft.written_or_err(id).map(|w| w.content.clone()))?;
        let generation = self.draft.generation();

        let result = self.gateway.generate_image(&content, tone).await;
        let data_uri = self.check(result)?;
        self.apply(Action::CoverGenerated { generation, id: id.clone(), data_uri });
        Ok(())
    }

    /// Returns `false` when the chapter was already saved.
    pub fn save_chapter(&mut self, id: &ChapterId) -> Result<bool, BookError> {
        self.apply(Action::ErrorCleared);
        let snapshot = self.check(self.draft.snapshot(id))?;
        if self.draft.is_saved(id) {
            return Ok(false);
        }
        let result = self.dispatch(Action::ChapterSaved(snapshot));
        self.check(result)?;
        info!(%id, "chapter saved");
        Ok(true)
    }

    /// Returns `false` when nothing was saved under `id`.
    pub fn delete_saved(&mut self, id: &ChapterId) -> Result<bool, BookError> {
        self.apply(Action::ErrorCleared);
        let existed = self.draft.is_saved(id);
        let result = self.dispatch(Action::ChapterDeleted(id.clone()));
        self.check(result)?;
        Ok(existed)
    }

    pub fn export(&self) -> Option<String> {
        export::render_book(&self.draft)
    }

    fn write_params(&self, id: &ChapterId) -> Result<ChapterWriteParams, BookError> {
        let topic = self.topic().unwrap_or_default();
        self.draft.write_params(id, topic, self.thinking)
    }

    fn accept_written(
        &mut self,
        generation: u64,
        id: ChapterId,
        content: WrittenChapterContent,
        adjusted: bool,
    ) -> Vec<String> {
        let warnings = lint::inspect(&content.content);
        for w in &warnings {
            warn!(%id, finding = %w, "chapter text does not follow the writing rules");
        }
        let action = if adjusted {
            Action::ChapterAdjusted { generation, id, content }
        } else {
            Action::ChapterWritten { generation, id, content }
        };
        self.apply(action);
        warnings
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::testing::ScriptedProvider;
    use crate::wire::{Difficulty, Operation};

    fn params(topic: &str) -> OutlineParams {
        OutlineParams {
            topic: topic.into(),
            direction: Some("実践的に".into()),
            chapter_count: 3,
            difficulty: Difficulty::Business,
            thinking: true,
        }
    }

    fn outline_json(titles: &[&str]) -> serde_json::Value {
        let chapters: Vec<_> = titles
            .iter()
            .map(|t| json!({ "title": t, "overview": format!("{t}の概要"), "purpose": "目的", "sections": [] }))
            .collect();
        json!(chapters)
    }

    fn chapter_json(text: &str) -> serde_json::Value {
        json!({ "content": text, "intent": format!("{text}の意図") })
    }

    fn open(provider: &Arc<ScriptedProvider>, dir: &std::path::Path) -> Session {
        let gateway = Gateway::new(provider.clone(), 1024);
        Session::open(gateway, SavedChapterStore::in_dir(dir), &Config::default())
    }

    async fn with_written_book(provider: &Arc<ScriptedProvider>, dir: &std::path::Path) -> Session {
        provider.push_json(&outline_json(&["問い", "旗", "着陸"]));
        for text in ["一", "二", "三"] {
            provider.push_json(&chapter_json(text));
        }
        let mut session = open(provider, dir);
        session.generate_outline(params("持続可能な経営")).await.unwrap();
        let ids: Vec<ChapterId> = session.draft().outline().iter().map(|c| c.id.clone()).collect();
        for (_, outcome) in session.write_chapters(&ids).await {
            outcome.unwrap();
        }
        session
    }

    #[tokio::test]
    async fn outline_then_batch_write() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new();
        let session = with_written_book(&provider, dir.path()).await;

        assert_eq!(session.draft().outline().len(), 3);
        assert_eq!(session.draft().written_count(), 3);
        assert!(session.draft().is_ready_for_review());
        assert_eq!(session.topic(), Some("持続可能な経営"));

        let written: Vec<Operation> = provider.requests().iter().map(|r| r.operation).collect();
        assert_eq!(written[0], Operation::GenerateOutline);
        assert_eq!(written.iter().filter(|op| **op == Operation::WriteChapter).count(), 3);
    }

    #[tokio::test]
    async fn blank_topic_keeps_current_outline() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new();
        provider.push_json(&outline_json(&["問い"]));
        let mut session = open(&provider, dir.path());
        session.generate_outline(params("経営")).await.unwrap();

        let err = session.generate_outline(params("  ")).await.unwrap_err();
        assert!(matches!(err, BookError::InvalidParameter(_)));
        assert_eq!(session.draft().outline().len(), 1);
        assert_eq!(session.draft().error(), Some("書籍のテーマを入力してください。"));
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn failed_generation_leaves_empty_outline_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new();
        provider.push_text("not json");
        let mut session = open(&provider, dir.path());

        assert!(session.generate_outline(params("経営")).await.is_err());
        assert!(session.draft().outline().is_empty());
        assert_eq!(session.draft().error(), Some("目次案の生成に失敗しました。"));

        provider.push_json(&outline_json(&["問い", "旗"]));
        assert_eq!(session.regenerate().await.unwrap(), 2);
        assert_eq!(session.draft().error(), None);
    }

    #[tokio::test]
    async fn one_failed_write_does_not_block_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new();
        provider.push_json(&outline_json(&["問い", "旗", "着陸"]));
        provider.push_json(&chapter_json("一"));
        provider.push_err(BookError::request(Operation::WriteChapter, "HTTP 500"));
        provider.push_json(&chapter_json("三"));
        let mut session = open(&provider, dir.path());
        session.generate_outline(params("経営")).await.unwrap();

        let ids: Vec<ChapterId> = session.draft().outline().iter().map(|c| c.id.clone()).collect();
        let outcomes = session.write_chapters(&ids).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.iter().filter(|(_, r)| r.is_err()).count(), 1);
        assert_eq!(session.draft().written_count(), 2);
        assert_eq!(session.draft().error(), Some("章の執筆に失敗しました。"));
        assert!(!session.draft().is_ready_for_review());
    }

    #[tokio::test]
    async fn review_before_writing_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new();
        provider.push_json(&outline_json(&["問い", "旗"]));
        let mut session = open(&provider, dir.path());
        session.generate_outline(params("経営")).await.unwrap();

        let err = session.final_review().await.unwrap_err();
        assert!(matches!(err, BookError::Precondition(_)));
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn failed_review_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new();
        let mut session = with_written_book(&provider, dir.path()).await;
        let before = session.draft().clone();

        provider.push_text("{\"chapters\": [{\"title\": \"旗\"}]}");
        assert!(session.final_review().await.is_err());
        assert_eq!(session.draft().outline(), before.outline());
        let id = before.outline()[1].id.clone();
        assert_eq!(session.draft().written(&id), before.written(&id));
        assert_eq!(session.draft().error(), Some("全体推敲に失敗しました。"));
    }

    #[tokio::test]
    async fn review_rewrites_matching_chapters() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new();
        let mut session = with_written_book(&provider, dir.path()).await;

        provider.push_json(&json!({ "chapters": [{ "title": "旗", "content": "推敲済み" }] }));
        assert_eq!(session.final_review().await.unwrap(), 1);

        let flag = session.draft().id_at(2).cloned().unwrap();
        let written = session.draft().written(&flag).unwrap();
        assert_eq!(written.content, "推敲済み");
        assert!(written.intent.ends_with("の意図"));
    }

    #[tokio::test]
    async fn adjusting_unwritten_chapter_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new();
        provider.push_json(&outline_json(&["問い", "旗"]));
        let mut session = open(&provider, dir.path());
        session.generate_outline(params("経営")).await.unwrap();

        let id = session.draft().id_at(1).cloned().unwrap();
        let err = session.adjust_chapter(&id, "短く").await.unwrap_err();
        assert!(matches!(err, BookError::Precondition(ref m) if m == "この章はまだ執筆されていません。"));
        assert_eq!(session.draft().error(), Some("この章はまだ執筆されていません。"));
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn adjusting_chapter_replaces_its_text() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new();
        let mut session = with_written_book(&provider, dir.path()).await;
        let id = session.draft().id_at(2).cloned().unwrap();

        provider.push_json(&chapter_json("改稿"));
        session.adjust_chapter(&id, "短く").await.unwrap();

        assert_eq!(session.draft().written(&id).unwrap().content, "改稿");
        assert_eq!(session.draft().error(), None);
        let last = provider.requests().pop().unwrap();
        assert_eq!(last.operation, Operation::AdjustChapter);
        assert_eq!(last.thinking_budget, Some(1024));
        assert!(last.prompt.instruction.contains("「短く」"));
    }

    #[tokio::test]
    async fn adjusting_outline_keeps_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new();
        provider.push_json(&outline_json(&["問い", "旗"]));
        provider.push_json(&json!({ "title": "新しい旗", "overview": "o", "purpose": "p", "sections": [] }));
        let mut session = open(&provider, dir.path());
        session.generate_outline(params("経営")).await.unwrap();

        let id = session.draft().id_at(2).cloned().unwrap();
        session.adjust_outline(&id, "タイトルを変更").await.unwrap();
        assert_eq!(session.draft().chapter(&id).unwrap().title, "新しい旗");
        assert_eq!(session.draft().id_at(2), Some(&id));
    }

    #[tokio::test]
    async fn saved_chapters_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new();
        let mut session = with_written_book(&provider, dir.path()).await;
        let id = session.draft().id_at(1).cloned().unwrap();

        assert!(session.save_chapter(&id).unwrap());
        assert!(!session.save_chapter(&id).unwrap());

        let reopened = open(&provider, dir.path());
        assert_eq!(reopened.draft().saved().len(), 1);
        assert_eq!(reopened.draft().saved()[0].id, id);

        assert!(session.delete_saved(&id).unwrap());
        assert!(!session.delete_saved(&id).unwrap());
        assert!(open(&provider, dir.path()).draft().saved().is_empty());
    }

    #[tokio::test]
    async fn cover_is_attached_to_written_chapter() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new();
        let mut session = with_written_book(&provider, dir.path()).await;
        let id = session.draft().id_at(3).cloned().unwrap();

        provider.push_image("image/jpeg", "QUJD");
        session.generate_cover(&id, ImageTone::Watercolor).await.unwrap();
        assert_eq!(session.draft().cover(&id), Some("data:image/jpeg;base64,QUJD"));
    }

    #[tokio::test]
    async fn export_follows_outline_order() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new();
        let session = with_written_book(&provider, dir.path()).await;

        let book = session.export().unwrap();
        let first = book.find("## 問い").unwrap();
        let last = book.find("## 着陸").unwrap();
        assert!(first < last);
        assert_eq!(book.matches(export::CHAPTER_SEPARATOR).count(), 2);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn provider_failure_is_logged_once() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new();
        provider.push_err(BookError::request(Operation::GenerateOutline, "HTTP 503"));
        tracing::subscriber::with_default(subscriber, || {
            runtime.block_on(async {
                let mut session = open(&provider, dir.path());
                assert!(session.generate_outline(params("経営")).await.is_err());
            })
        });

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(logs.matches("HTTP 503").count(), 1, "{logs}");
        assert!(logs.contains("ERROR"), "{logs}");
    }
}
