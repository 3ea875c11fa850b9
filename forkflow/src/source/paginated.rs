//! Lazy row stream over a paged query result.

use super::cursor::{PagedResultSource, QueryHandle, RowConverter};
use crate::config::PaginationConfig;
use crate::errors::{OperationFailedError, PipelineError};
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Operation name recorded on paging failures.
pub const FETCH_PAGE_OPERATION: &str = "fetch_page";

/// Turns a page-at-a-time query result into one sequence of rows.
///
/// No page is requested until the returned stream is first polled. Every
/// call to [`PaginatedRows::stream`] opens a fresh cursor, so the sequence
/// can be restarted from scratch; a single stream is forward-only.
///
/// A cursor failure ends the stream with exactly one
/// [`OperationFailedError`]; no rows of the failed page are emitted.
///
/// With the default [`HeaderPolicy::FirstPageOnly`](crate::config::HeaderPolicy)
/// the first page is converted with `suppress_header == false`. A converter
/// such as [`ObjectRowConverter`](crate::source::ObjectRowConverter) then
/// emits that page's header row as an ordinary row (for a labelled integer
/// column, `{"id": "id"}`), and only the repeats on later pages are dropped.
/// Use `HeaderPolicy::SuppressAll` to drop the header everywhere.
pub struct PaginatedRows<P, C> {
    source: Arc<dyn PagedResultSource<P>>,
    query: QueryHandle,
    converter: Arc<C>,
    config: PaginationConfig,
    fetched: Arc<Mutex<FetchCount>>,
}

/// Pages fetched by the most recently started stream.
#[derive(Debug, Default)]
struct FetchCount {
    stream: u64,
    pages: usize,
}

impl<P, C> PaginatedRows<P, C>
where
    P: Send + 'static,
    C: RowConverter<P> + 'static,
    C::Row: Send + 'static,
{
    /// Creates an adapter with the default page size.
    pub fn new<S>(source: Arc<S>, query: QueryHandle, converter: C) -> Self
    where
        S: PagedResultSource<P> + 'static,
    {
        Self::with_config(source, query, converter, PaginationConfig::default())
    }

    /// Creates an adapter with an explicit pagination configuration.
    pub fn with_config<S>(
        source: Arc<S>,
        query: QueryHandle,
        converter: C,
        config: PaginationConfig,
    ) -> Self
    where
        S: PagedResultSource<P> + 'static,
    {
        let source: Arc<dyn PagedResultSource<P>> = source;
        Self {
            source,
            query,
            converter: Arc::new(converter),
            config,
            fetched: Arc::new(Mutex::new(FetchCount::default())),
        }
    }

    /// Returns the query being paged.
    #[must_use]
    pub fn query(&self) -> &QueryHandle {
        &self.query
    }

    /// Returns the page size requested from the source.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Returns how many pages the most recently started stream has fetched.
    ///
    /// Older streams still being polled do not touch the count.
    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.fetched.lock().pages
    }

    /// Opens a new row stream.
    pub fn stream(&self) -> BoxStream<'static, Result<C::Row, PipelineError>> {
        let source = Arc::clone(&self.source);
        let query = self.query.clone();
        let converter = Arc::clone(&self.converter);
        let config = self.config.clone();
        let fetched_count = Arc::clone(&self.fetched);

        Box::pin(async_stream::stream! {
            let stream_id = {
                let mut count = fetched_count.lock();
                count.stream += 1;
                count.pages = 0;
                count.stream
            };
            let mut cursor = source.paginate(&query, config.page_size);
            let mut page = 0_usize;
            loop {
                let fetched = match cursor.next_page().await {
                    Ok(fetched) => fetched,
                    Err(err) => {
                        warn!(query = %query, page, error = %err, "Page fetch failed");
                        let failed = OperationFailedError::new(FETCH_PAGE_OPERATION, page, err);
                        yield Err(PipelineError::from(failed));
                        return;
                    }
                };
                {
                    let mut count = fetched_count.lock();
                    if count.stream == stream_id {
                        count.pages += 1;
                    }
                }

                let suppress = config.header_policy.suppress_header(page);
                let rows = converter.convert(&fetched.result, suppress);
                debug!(query = %query, page, rows = rows.len(), "Page fetched");
                for row in rows {
                    yield Ok(row);
                }

                if fetched.is_last() {
                    break;
                }
                page += 1;
            }
            debug!(query = %query, pages = page + 1, "Query result exhausted");
        })
    }

    /// Consumes the adapter, returning its row stream.
    ///
    /// The stream can be handed straight to `ForkingPipeline::new`.
    pub fn into_stream(self) -> BoxStream<'static, Result<C::Row, PipelineError>> {
        self.stream()
    }
}

impl<P, C> std::fmt::Debug for PaginatedRows<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginatedRows")
            .field("query", &self.query)
            .field("config", &self.config)
            .field("pages_fetched", &self.fetched.lock().pages)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaderPolicy;
    use crate::errors::{CursorError, ErrorKind};
    use crate::source::{ObjectRowConverter, TabularPage};
    use crate::testing::{tabular_pages, ScriptedSource};
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    async fn collect<P, C>(rows: &PaginatedRows<P, C>) -> Vec<Result<C::Row, PipelineError>>
    where
        P: Send + 'static,
        C: RowConverter<P> + 'static,
        C::Row: Send + 'static,
    {
        rows.stream().collect().await
    }

    #[tokio::test]
    async fn test_exhausts_all_pages() {
        let source = Arc::new(ScriptedSource::new(tabular_pages(4, 5)));
        let rows = PaginatedRows::new(source.clone(), QueryHandle::new("q-1"), ObjectRowConverter);

        let events = collect(&rows).await;

        assert_eq!(events.len(), 20);
        assert!(events.iter().all(Result::is_ok));
        assert_eq!(rows.pages_fetched(), 4);
    }

    #[tokio::test]
    async fn test_lazy_until_polled() {
        let source = Arc::new(ScriptedSource::new(tabular_pages(2, 1)));
        let rows = PaginatedRows::new(source.clone(), QueryHandle::new("q-1"), ObjectRowConverter);

        let stream = rows.stream();
        assert_eq!(source.paginate_calls(), 0);
        drop(stream);
        assert_eq!(source.paginate_calls(), 0);
    }

    #[tokio::test]
    async fn test_ten_pages_with_default_and_explicit_page_size() {
        for page_size in [None, Some(10)] {
            let source = Arc::new(ScriptedSource::new(tabular_pages(10, 10)));
            let config = page_size.map_or_else(PaginationConfig::default, |size| {
                PaginationConfig::new().with_page_size(size)
            });
            let rows = PaginatedRows::with_config(
                source.clone(),
                QueryHandle::new("q-10"),
                ObjectRowConverter,
                config,
            );

            let events = collect(&rows).await;

            assert_eq!(events.len(), 100);
            assert_eq!(source.paginate_calls(), 1);
            assert_eq!(source.page_sizes(), vec![page_size.unwrap_or(1000)]);
            assert_eq!(rows.pages_fetched(), 10);
        }
    }

    #[tokio::test]
    async fn test_error_surfaces_once_then_ends() {
        let source = Arc::new(
            ScriptedSource::new(tabular_pages(10, 10))
                .fail_at(2, CursorError::execution("table not found")),
        );
        let rows = PaginatedRows::new(source.clone(), QueryHandle::new("q-err"), ObjectRowConverter);

        let events = collect(&rows).await;

        assert_eq!(events.len(), 21);
        assert!(events[..20].iter().all(Result::is_ok));
        let err = events[20].as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationFailed);
        match err {
            PipelineError::OperationFailed(failed) => {
                assert_eq!(failed.operation, FETCH_PAGE_OPERATION);
                assert_eq!(failed.page, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(rows.pages_fetched(), 2);
    }

    #[tokio::test]
    async fn test_first_page_failure_yields_only_error() {
        let source = Arc::new(
            ScriptedSource::new(tabular_pages(3, 4)).fail_at(0, CursorError::transport("timeout")),
        );
        let rows = PaginatedRows::new(source, QueryHandle::new("q"), ObjectRowConverter);

        let events = collect(&rows).await;

        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }

    #[tokio::test]
    async fn test_restart_opens_fresh_cursor() {
        let source = Arc::new(ScriptedSource::new(tabular_pages(3, 2)));
        let rows = PaginatedRows::new(source.clone(), QueryHandle::new("q"), ObjectRowConverter);

        assert_eq!(collect(&rows).await.len(), 6);
        assert_eq!(collect(&rows).await.len(), 6);
        assert_eq!(source.paginate_calls(), 2);
        assert_eq!(rows.pages_fetched(), 3);
    }

    #[tokio::test]
    async fn test_header_repeated_on_later_pages_is_dropped() {
        let page = |value: &str| {
            TabularPage::new(vec![("id".to_string(), "integer".to_string())])
                .with_header_row()
                .with_row(vec![Some(value.to_string())])
        };
        let source = Arc::new(ScriptedSource::new(vec![page("1"), page("2"), page("3")]));
        let rows = PaginatedRows::with_config(
            source,
            QueryHandle::new("q"),
            ObjectRowConverter,
            PaginationConfig::new().with_header_policy(HeaderPolicy::SuppressAll),
        );

        let values: Vec<_> = collect(&rows)
            .await
            .into_iter()
            .map(|row| row.unwrap()["id"].clone())
            .collect();

        assert_eq!(
            values,
            vec![serde_json::json!(1), serde_json::json!(2), serde_json::json!(3)]
        );
    }

    #[tokio::test]
    async fn test_pages_fetched_tracks_latest_stream() {
        let source = Arc::new(ScriptedSource::new(tabular_pages(3, 2)));
        let rows = PaginatedRows::new(source, QueryHandle::new("q"), ObjectRowConverter);
        let mut older = rows.stream();
        let mut newer = rows.stream();

        assert!(older.next().await.is_some());
        assert_eq!(rows.pages_fetched(), 1);

        assert!(newer.next().await.is_some());
        assert_eq!(rows.pages_fetched(), 1);

        let rest: Vec<_> = older.collect().await;
        assert_eq!(rest.len(), 5);
        assert_eq!(rows.pages_fetched(), 1);

        let rest: Vec<_> = newer.collect().await;
        assert_eq!(rest.len(), 5);
        assert_eq!(rows.pages_fetched(), 3);
    }

    #[tokio::test]
    async fn test_first_page_header_kept_by_default() {
        let page = |value: &str| {
            TabularPage::new(vec![("id".to_string(), "integer".to_string())])
                .with_header_row()
                .with_row(vec![Some(value.to_string())])
        };
        let source = Arc::new(ScriptedSource::new(vec![page("1"), page("2")]));
        let rows = PaginatedRows::new(source, QueryHandle::new("q"), ObjectRowConverter);

        let values: Vec<_> = collect(&rows)
            .await
            .into_iter()
            .map(|row| row.unwrap()["id"].clone())
            .collect();

        assert_eq!(
            values,
            vec![
                serde_json::json!("id"),
                serde_json::json!(1),
                serde_json::json!(2)
            ]
        );
    }
}
