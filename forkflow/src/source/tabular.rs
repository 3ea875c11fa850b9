//! Tabular result pages and their conversion to JSON row objects.

use super::cursor::RowConverter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Column metadata of a tabular result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column label, used as the key of converted rows.
    pub label: String,
    /// Remote type name, e.g. `integer` or `varchar`.
    pub type_hint: String,
}

impl Column {
    /// Creates a column.
    #[must_use]
    pub fn new(label: impl Into<String>, type_hint: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            type_hint: type_hint.into(),
        }
    }

    /// Parses a raw cell according to the column's type hint.
    ///
    /// Empty and missing cells become `null`. A cell that does not parse as
    /// its hinted type is kept as a string.
    #[must_use]
    pub fn parse(&self, raw: Option<&str>) -> Value {
        let Some(raw) = raw.filter(|s| !s.is_empty()) else {
            return Value::Null;
        };
        let parsed = match self.type_hint.to_ascii_lowercase().as_str() {
            "integer" | "bigint" => raw.parse::<i64>().ok().map(Value::from),
            "double" | "float" => raw
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            "boolean" => raw.parse::<bool>().ok().map(Value::Bool),
            _ => None,
        };
        parsed.unwrap_or_else(|| Value::String(raw.to_string()))
    }
}

impl<L, T> From<(L, T)> for Column
where
    L: Into<String>,
    T: Into<String>,
{
    fn from((label, type_hint): (L, T)) -> Self {
        Self::new(label, type_hint)
    }
}

/// One page of a tabular query result.
///
/// Cells are raw strings as returned by the remote engine. The first row may
/// repeat the column labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularPage {
    /// Column metadata, in cell order.
    pub columns: Vec<Column>,
    /// Raw cells; `None` for SQL NULL.
    pub rows: Vec<Vec<Option<String>>>,
}

impl TabularPage {
    /// Creates an empty page with the given columns.
    pub fn new<I>(columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Column>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a header row repeating the column labels.
    #[must_use]
    pub fn with_header_row(mut self) -> Self {
        let header = self
            .columns
            .iter()
            .map(|c| Some(c.label.clone()))
            .collect();
        self.rows.push(header);
        self
    }

    /// Appends a data row.
    #[must_use]
    pub fn with_row(mut self, row: Vec<Option<String>>) -> Self {
        self.rows.push(row);
        self
    }

    /// Returns true if the first row repeats the column labels.
    #[must_use]
    pub fn has_header_row(&self) -> bool {
        self.rows.first().is_some_and(|row| {
            row.len() == self.columns.len()
                && row
                    .iter()
                    .zip(&self.columns)
                    .all(|(cell, col)| cell.as_deref() == Some(col.label.as_str()))
        })
    }
}

/// Converts [`TabularPage`] rows into JSON objects keyed by column label.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectRowConverter;

impl RowConverter<TabularPage> for ObjectRowConverter {
    type Row = Value;

    fn convert(&self, page: &TabularPage, suppress_header: bool) -> Vec<Value> {
        let skip = usize::from(suppress_header && page.has_header_row());
        page.rows
            .iter()
            .skip(skip)
            .map(|row| {
                let object: Map<String, Value> = page
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, col)| {
                        let cell = row.get(i).and_then(Option::as_deref);
                        (col.label.clone(), col.parse(cell))
                    })
                    .collect();
                Value::Object(object)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn cells(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some((*v).to_string())).collect()
    }

    fn page() -> TabularPage {
        TabularPage::new([
            ("id", "bigint"),
            ("score", "double"),
            ("active", "boolean"),
            ("name", "varchar"),
        ])
        .with_header_row()
        .with_row(cells(&["7", "2.5", "true", "ada"]))
    }

    #[test]
    fn test_typed_conversion() {
        let rows = ObjectRowConverter.convert(&page(), true);

        assert_eq!(
            rows,
            vec![json!({"id": 7, "score": 2.5, "active": true, "name": "ada"})]
        );
    }

    #[test]
    fn test_header_kept_when_not_suppressed() {
        let rows = ObjectRowConverter.convert(&page(), false);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], json!("name"));
    }

    #[test]
    fn test_suppress_without_header_keeps_rows() {
        let page = TabularPage::new([("id", "integer")]).with_row(cells(&["1"]));

        assert_eq!(ObjectRowConverter.convert(&page, true), vec![json!({"id": 1})]);
    }

    #[test]
    fn test_empty_and_missing_cells_are_null() {
        let page = TabularPage::new([("a", "integer"), ("b", "varchar"), ("c", "varchar")])
            .with_row(vec![Some(String::new()), None]);

        assert_eq!(
            ObjectRowConverter.convert(&page, false),
            vec![json!({"a": null, "b": null, "c": null})]
        );
    }

    #[test]
    fn test_unparsable_cell_kept_as_string() {
        let column = Column::new("n", "integer");

        assert_eq!(column.parse(Some("n/a")), json!("n/a"));
        assert_eq!(column.parse(Some("-3")), json!(-3));
    }
}
