//! A driver that answers catalog queries from canned rows.

use std::cell::RefCell;

use crate::db::connection::Driver;
use crate::db::row::{Row, Value};
use crate::error::Result;
use crate::inspector::Backend;

struct Answer {
    needle: &'static str,
    params: Option<Vec<String>>,
    rows: Vec<Row>,
}

/// Matches each query against registered SQL fragments, first match wins.
/// Unmatched queries return no rows. Every call is recorded.
pub(crate) struct ScriptedDriver {
    backend: Backend,
    database: Option<String>,
    answers: Vec<Answer>,
    calls: RefCell<Vec<(String, Vec<String>)>>,
}

impl ScriptedDriver {
    pub(crate) fn new(backend: Backend) -> Self {
        Self {
            backend,
            database: None,
            answers: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn database(mut self, name: &str) -> Self {
        self.database = Some(name.to_string());
        self
    }

    /// Answer any query containing `needle`.
    pub(crate) fn answer(mut self, needle: &'static str, rows: Vec<Vec<Value>>) -> Self {
        self.answers.push(Answer {
            needle,
            params: None,
            rows: rows.into_iter().map(Row::new).collect(),
        });
        self
    }

    /// Answer queries containing `needle` only when bound to `params`.
    pub(crate) fn answer_with(
        mut self,
        needle: &'static str,
        params: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.answers.push(Answer {
            needle,
            params: Some(params.iter().map(|p| p.to_string()).collect()),
            rows: rows.into_iter().map(Row::new).collect(),
        });
        self
    }

    /// Number of recorded queries containing `needle`.
    pub(crate) fn count(&self, needle: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|(sql, _)| sql.contains(needle))
            .count()
    }

    /// Parameters of every recorded query containing `needle`.
    pub(crate) fn params_of(&self, needle: &str) -> Vec<Vec<String>> {
        self.calls
            .borrow()
            .iter()
            .filter(|(sql, _)| sql.contains(needle))
            .map(|(_, params)| params.clone())
            .collect()
    }
}

impl Driver for ScriptedDriver {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn select(&self, sql: &str, params: &[&str]) -> Result<Vec<Row>> {
        let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        self.calls.borrow_mut().push((sql.to_string(), params.clone()));
        Ok(self
            .answers
            .iter()
            .find(|answer| {
                sql.contains(answer.needle)
                    && answer.params.as_ref().map_or(true, |p| *p == params)
            })
            .map(|answer| answer.rows.clone())
            .unwrap_or_default())
    }

    fn execute(&self, sql: &str) -> Result<()> {
        self.calls.borrow_mut().push((sql.to_string(), Vec::new()));
        Ok(())
    }

    fn database_name(&self) -> Option<String> {
        self.database.clone()
    }
}

/// Shorthand for a text value.
pub(crate) fn t(s: &str) -> Value {
    Value::from(s)
}
