//! Parameterized SQL assembly.

/// A compiled query: SQL text with `$n` placeholders and their bound values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<i64>,
}

/// Accumulates bound parameters, reusing a placeholder when the same
/// value is referenced more than once.
#[derive(Debug, Default)]
pub struct SqlBuilder {
    params: Vec<i64>,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value and return its placeholder.
    pub fn bind(&mut self, value: i64) -> String {
        let index = match self.params.iter().position(|p| *p == value) {
            Some(i) => i,
            None => {
                self.params.push(value);
                self.params.len() - 1
            }
        };
        format!("${}", index + 1)
    }

    pub fn finish(self, sql: String) -> SqlQuery {
        SqlQuery {
            sql,
            params: self.params,
        }
    }
}

/// Join predicates with AND, collapsing the empty case to `TRUE`.
pub fn and_all(clauses: Vec<String>) -> String {
    if clauses.is_empty() {
        "TRUE".to_string()
    } else {
        clauses.join(" AND ")
    }
}
