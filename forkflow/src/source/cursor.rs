//! Collaborator contracts for paged remote query results.

use crate::errors::CursorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle of a query already submitted to the remote engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryHandle {
    id: String,
}

impl QueryHandle {
    /// Creates a handle for a remote query id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Returns the remote query id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// One page returned by a cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage<P> {
    /// The raw result set of this page.
    pub result: P,
    /// Token of the following page; `None` on the last page.
    pub next_token: Option<String>,
}

impl<P> ResultPage<P> {
    /// Creates a page followed by another page.
    pub fn new(result: P, next_token: impl Into<String>) -> Self {
        Self {
            result,
            next_token: Some(next_token.into()),
        }
    }

    /// Creates the final page.
    pub fn last(result: P) -> Self {
        Self {
            result,
            next_token: None,
        }
    }

    /// Returns true if no page follows this one.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }
}

/// A forward-only cursor over the pages of one query result.
#[async_trait]
pub trait PageCursor<P>: Send {
    /// Fetches the next page.
    ///
    /// Called again only while the previous page carried a next token.
    async fn next_page(&mut self) -> Result<ResultPage<P>, CursorError>;
}

/// A remote engine able to page through query results.
pub trait PagedResultSource<P>: Send + Sync {
    /// Opens a cursor over `query`'s results, `page_size` rows at a time.
    fn paginate(&self, query: &QueryHandle, page_size: usize) -> Box<dyn PageCursor<P>>;
}

/// Shapes one raw result page into row objects.
///
/// Implementations are pure: no I/O and no side effects.
pub trait RowConverter<P>: Send + Sync {
    /// The row object type.
    type Row;

    /// Converts a page, dropping its header row when `suppress_header` is set.
    fn convert(&self, page: &P, suppress_header: bool) -> Vec<Self::Row>;
}
