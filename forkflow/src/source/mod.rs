//! Paginated source adapter.
//!
//! Wraps a page-at-a-time remote query result into one lazy sequence of
//! rows whose paging failures arrive as a single terminal stream error.

mod cursor;
mod paginated;
mod tabular;

pub use cursor::{PageCursor, PagedResultSource, QueryHandle, ResultPage, RowConverter};
pub use paginated::{PaginatedRows, FETCH_PAGE_OPERATION};
pub use tabular::{Column, ObjectRowConverter, TabularPage};
