//! Mock stages and cursors for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::CursorError;
use crate::source::{PageCursor, PagedResultSource, QueryHandle, ResultPage};
use crate::stages::{SharedStage, Stage};

/// A stage that counts the items it sees and forwards them.
///
/// Clones share the same counter, so a test can keep one clone and hand
/// the other to a pipeline.
#[derive(Debug, Clone)]
pub struct CountingStage {
    name: String,
    count: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

impl CountingStage {
    /// Creates a new counting stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns a shared handle to this stage.
    #[must_use]
    pub fn shared<T: Send + 'static>(&self) -> SharedStage<T> {
        Arc::new(self.clone())
    }

    /// Returns the number of items processed.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Returns how many times the finish hook ran.
    #[must_use]
    pub fn finish_calls(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Send + 'static> Stage<T> for CountingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, item: T) -> anyhow::Result<Vec<T>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(vec![item])
    }

    async fn finish(&self) -> anyhow::Result<Vec<T>> {
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

/// A stage that fails on its n-th item.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    fail_on: usize,
    seen: AtomicUsize,
}

impl FailingStage {
    /// Creates a stage that fails on its first item.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::on_item(name, 1)
    }

    /// Creates a stage that fails on item number `n` (1-based).
    #[must_use]
    pub fn on_item(name: impl Into<String>, n: usize) -> Self {
        Self {
            name: name.into(),
            fail_on: n.max(1),
            seen: AtomicUsize::new(0),
        }
    }

    /// Returns the number of items received, including the failing one.
    #[must_use]
    pub fn seen(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Send + 'static> Stage<T> for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, item: T) -> anyhow::Result<Vec<T>> {
        let n = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            anyhow::bail!("{} rejected item #{n}", self.name);
        }
        Ok(vec![item])
    }
}

/// A stage that sleeps before forwarding each item.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
}

impl SlowStage {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }

    /// Creates a slow stage with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self::new(name, Duration::from_millis(ms))
    }
}

#[async_trait]
impl<T: Send + 'static> Stage<T> for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, item: T) -> anyhow::Result<Vec<T>> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![item])
    }
}

/// A stage that records every item it forwards.
pub struct RecordingStage<T> {
    name: String,
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for RecordingStage<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> fmt::Debug for RecordingStage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingStage")
            .field("name", &self.name)
            .field("recorded", &self.items.lock().len())
            .finish()
    }
}

impl<T: Clone + Send + 'static> RecordingStage<T> {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns a shared handle to this stage.
    #[must_use]
    pub fn shared(&self) -> SharedStage<T> {
        Arc::new(self.clone())
    }

    /// Returns the recorded items in arrival order.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.items.lock().clone()
    }

    /// Returns the number of recorded items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Stage<T> for RecordingStage<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, item: T) -> anyhow::Result<Vec<T>> {
        self.items.lock().push(item.clone());
        Ok(vec![item])
    }
}

/// A paged result source replaying a fixed list of pages.
#[derive(Debug)]
pub struct ScriptedSource<P> {
    pages: Vec<P>,
    failure: Option<(usize, CursorError)>,
    paginate_calls: AtomicUsize,
    page_sizes: Mutex<Vec<usize>>,
}

impl<P: Clone + Send + Sync + 'static> ScriptedSource<P> {
    /// Creates a source serving `pages` in order.
    #[must_use]
    pub fn new(pages: Vec<P>) -> Self {
        Self {
            pages,
            failure: None,
            paginate_calls: AtomicUsize::new(0),
            page_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Makes the fetch of page `index` (0-based) fail.
    #[must_use]
    pub fn fail_at(mut self, index: usize, error: CursorError) -> Self {
        self.failure = Some((index, error));
        self
    }

    /// Returns how many cursors were opened.
    #[must_use]
    pub fn paginate_calls(&self) -> usize {
        self.paginate_calls.load(Ordering::SeqCst)
    }

    /// Returns the page size requested by each `paginate` call.
    #[must_use]
    pub fn page_sizes(&self) -> Vec<usize> {
        self.page_sizes.lock().clone()
    }
}

impl<P: Clone + Send + Sync + 'static> PagedResultSource<P> for ScriptedSource<P> {
    fn paginate(&self, _query: &QueryHandle, page_size: usize) -> Box<dyn PageCursor<P>> {
        self.paginate_calls.fetch_add(1, Ordering::SeqCst);
        self.page_sizes.lock().push(page_size);
        Box::new(ScriptedCursor {
            pages: self.pages.clone(),
            failure: self.failure.clone(),
            position: 0,
        })
    }
}

/// Cursor opened by [`ScriptedSource`].
#[derive(Debug)]
pub struct ScriptedCursor<P> {
    pages: Vec<P>,
    failure: Option<(usize, CursorError)>,
    position: usize,
}

impl<P> ScriptedCursor<P> {
    /// Returns the index of the next page to serve.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }
}

#[async_trait]
impl<P: Clone + Send + Sync + 'static> PageCursor<P> for ScriptedCursor<P> {
    async fn next_page(&mut self) -> Result<ResultPage<P>, CursorError> {
        let index = self.position;
        if let Some((fail_at, error)) = &self.failure {
            if *fail_at == index {
                return Err(error.clone());
            }
        }
        let Some(page) = self.pages.get(index).cloned() else {
            return Err(CursorError::execution(format!("no page at index {index}")));
        };
        self.position += 1;
        if self.position == self.pages.len() {
            Ok(ResultPage::last(page))
        } else {
            Ok(ResultPage::new(page, format!("token-{}", self.position)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_counting_stage_shares_counter() {
        let stage = CountingStage::new("count");
        let handle: SharedStage<u8> = stage.shared();

        handle.process(1).await.unwrap();
        handle.process(2).await.unwrap();
        handle.finish().await.unwrap();

        assert_eq!(stage.count(), 2);
        assert_eq!(stage.finish_calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_stage_fails_on_nth() {
        let stage = FailingStage::on_item("fail", 2);

        assert!(stage.process(1_u8).await.is_ok());
        let err = stage.process(2_u8).await.unwrap_err();
        assert_eq!(err.to_string(), "fail rejected item #2");
        assert!(stage.process(3_u8).await.is_ok());
        assert_eq!(stage.seen(), 3);
    }

    #[tokio::test]
    async fn test_slow_stage() {
        let stage = SlowStage::with_delay_ms("slow", 10);

        let start = std::time::Instant::now();
        let out = stage.process("x").await.unwrap();

        assert_eq!(out, vec!["x"]);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_recording_stage() {
        let stage = RecordingStage::new("record");
        let handle = stage.shared();

        handle.process(1_u32).await.unwrap();
        handle.process(2_u32).await.unwrap();

        assert_eq!(stage.items(), vec![1, 2]);
        assert_eq!(stage.len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_cursor_serves_pages_then_tokens_end() {
        let source = ScriptedSource::new(vec!["a", "b"]);
        let mut cursor = source.paginate(&QueryHandle::new("q"), 50);

        let first = cursor.next_page().await.unwrap();
        assert_eq!(first.result, "a");
        assert_eq!(first.next_token.as_deref(), Some("token-1"));
        let second = cursor.next_page().await.unwrap();
        assert!(second.is_last());
        assert_eq!(source.page_sizes(), vec![50]);
    }

    #[tokio::test]
    async fn test_scripted_cursor_failure() {
        let source = ScriptedSource::new(vec![1_u8, 2, 3]).fail_at(1, CursorError::transport("reset"));
        let mut cursor = source.paginate(&QueryHandle::new("q"), 10);

        assert!(cursor.next_page().await.is_ok());
        assert!(matches!(
            cursor.next_page().await,
            Err(CursorError::Transport { .. })
        ));
    }
}
