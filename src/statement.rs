//! Compiled-statement contract between the query layer and this core.
//!
//! The query builder lives outside this crate; it hands us finished
//! statements and takes back rows. These types are deliberately thin.

/// A single bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// One result row, positionally matching `QueryResult::columns`.
pub type Row = Vec<Value>;

/// Which execution-timeout class a statement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryClass {
    /// Regular OLTP statement, bounded by the normal execution timeout.
    #[default]
    Normal,
    /// Explicitly marked long-running analytical statement; gets the
    /// larger analytical timeout.
    Analytical,
}

/// A compiled statement ready to run against a backend.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    pub class: QueryClass,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            class: QueryClass::Normal,
        }
    }

    /// Append a bound parameter.
    pub fn bind(mut self, value: Value) -> Self {
        self.params.push(value);
        self
    }

    /// Mark this statement as long-running analytical work.
    pub fn analytical(mut self) -> Self {
        self.class = QueryClass::Analytical;
        self
    }
}

/// Result of executing a statement.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Rows affected for DML; 0 for selects.
    pub affected: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }
}
