//! Query builder contract, pagination values and an in-memory table query.

use std::collections::BTreeMap;

use cadence_core::RunError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    #[error("invalid page request: {0}")]
    InvalidPage(String),
    #[error("query execution failed: {0}")]
    Execution(String),
}

impl From<QueryError> for RunError {
    fn from(value: QueryError) -> Self {
        RunError::Query(value.to_string())
    }
}

/// Opaque query builder owned by a query runnable.
pub trait QueryBuilder: Send {
    /// Execute and return the rows.
    fn get(&self) -> Result<Value, QueryError>;

    fn to_sql(&self) -> String;

    fn paginate(&self, request: &PageRequest) -> Result<Paginator, QueryError>;
}

/// Page parameters; defaults to 25 rows of every column on `page` 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    pub per_page: usize,
    pub columns: Vec<String>,
    pub page_name: String,
    pub page: Option<usize>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            per_page: 25,
            columns: vec!["*".to_string()],
            page_name: "page".to_string(),
            page: None,
        }
    }
}

impl PageRequest {
    pub fn new(per_page: usize) -> Self {
        Self {
            per_page,
            ..Self::default()
        }
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_page_name(mut self, name: impl Into<String>) -> Self {
        self.page_name = name.into();
        self
    }

    /// One-based page number.
    pub fn current_page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    fn validate(&self) -> Result<(), QueryError> {
        if self.per_page == 0 {
            return Err(QueryError::InvalidPage("per_page must be positive".into()));
        }
        Ok(())
    }
}

/// A page of results that knows the total size of the set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginator {
    pub items: Vec<Value>,
    pub total: usize,
    pub per_page: usize,
    pub current_page: usize,
    pub last_page: usize,
    pub page_name: String,
    /// Extra query-string values carried into page links.
    #[serde(default)]
    pub appends: BTreeMap<String, Value>,
}

impl Paginator {
    /// Slice the requested page out of the full result set.
    pub fn from_items(all: Vec<Value>, request: &PageRequest) -> Result<Self, QueryError> {
        request.validate()?;
        let total = all.len();
        let current_page = request.current_page();
        // Pages past the addressable range are empty.
        let offset = (current_page - 1)
            .checked_mul(request.per_page)
            .unwrap_or(usize::MAX);
        let items = all
            .into_iter()
            .skip(offset)
            .take(request.per_page)
            .collect();
        Ok(Self {
            items,
            total,
            per_page: request.per_page,
            current_page,
            last_page: total.div_ceil(request.per_page).max(1),
            page_name: request.page_name.clone(),
            appends: BTreeMap::new(),
        })
    }

    pub fn appends<I, K>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.appends.extend(values.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }
}

/// In-memory rows with equality filters, for tests/dev.
#[derive(Debug, Clone)]
pub struct TableQuery {
    table: String,
    rows: Vec<Value>,
    wheres: Vec<(String, Value)>,
}

impl TableQuery {
    pub fn new(table: impl Into<String>, rows: Vec<Value>) -> Self {
        Self {
            table: table.into(),
            rows,
            wheres: Vec::new(),
        }
    }

    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.wheres.push((column.into(), value.into()));
        self
    }

    fn matching(&self) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter(|row| {
            self.wheres
                .iter()
                .all(|(column, value)| row.get(column) == Some(value))
        })
    }

    fn project(row: &Value, columns: &[String]) -> Value {
        if columns.iter().any(|c| c == "*") {
            return row.clone();
        }
        let picked = columns
            .iter()
            .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
            .collect();
        Value::Object(picked)
    }
}

impl QueryBuilder for TableQuery {
    fn get(&self) -> Result<Value, QueryError> {
        Ok(Value::Array(self.matching().cloned().collect()))
    }

    fn to_sql(&self) -> String {
        let mut sql = format!("select * from `{}`", self.table);
        for (i, (column, _)) in self.wheres.iter().enumerate() {
            sql.push_str(if i == 0 { " where " } else { " and " });
            sql.push_str(&format!("`{column}` = ?"));
        }
        sql
    }

    fn paginate(&self, request: &PageRequest) -> Result<Paginator, QueryError> {
        let rows = self
            .matching()
            .map(|row| Self::project(row, &request.columns))
            .collect();
        Paginator::from_items(rows, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> TableQuery {
        TableQuery::new(
            "users",
            (1..=7)
                .map(|id| json!({"id": id, "active": id % 2 == 1, "name": format!("user{id}")}))
                .collect(),
        )
    }

    #[test]
    fn filters_and_renders_sql() {
        let query = users().where_eq("active", true);
        assert_eq!(query.get().unwrap().as_array().unwrap().len(), 4);
        assert_eq!(query.to_sql(), "select * from `users` where `active` = ?");
    }

    #[test]
    fn paginates_with_projection() {
        let page = users()
            .paginate(&PageRequest::new(3).with_page(3).with_columns(["id"]))
            .unwrap();
        assert_eq!(page.items, vec![json!({"id": 7})]);
        assert_eq!((page.total, page.last_page, page.current_page), (7, 3, 3));
        assert!(!page.has_more_pages());
    }

    #[test]
    fn defaults_match_the_usual_page_shape() {
        let request = PageRequest::default();
        assert_eq!(request.per_page, 25);
        assert_eq!(request.columns, vec!["*"]);
        assert_eq!(request.page_name, "page");
        assert_eq!(request.current_page(), 1);
    }

    #[test]
    fn out_of_range_pages_are_empty() {
        let page = users()
            .paginate(&PageRequest::new(25).with_page(usize::MAX))
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!((page.total, page.last_page, page.current_page), (7, 1, usize::MAX));
    }

    #[test]
    fn zero_per_page_is_rejected() {
        assert!(Paginator::from_items(vec![], &PageRequest::new(0)).is_err());
    }
}
