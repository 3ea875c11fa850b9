//! Test fixtures for pipeline and pagination testing.

use crate::source::{Column, TabularPage};

/// Builds one tabular page of `rows` numbered rows.
///
/// Rows carry an `id` unique across pages (`page * rows + n`) and a
/// `label` string.
#[must_use]
pub fn numbered_page(page: usize, rows: usize) -> TabularPage {
    let mut result = TabularPage::new([Column::new("id", "bigint"), Column::new("label", "varchar")]);
    for n in 0..rows {
        let id = page * rows + n;
        result = result.with_row(vec![Some(id.to_string()), Some(format!("row-{id}"))]);
    }
    result
}

/// Builds `pages` tabular pages of `rows` rows each, without header rows.
#[must_use]
pub fn tabular_pages(pages: usize, rows: usize) -> Vec<TabularPage> {
    (0..pages).map(|page| numbered_page(page, rows)).collect()
}
