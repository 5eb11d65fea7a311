//! SQL executor
//!
//! Applies batches of DDL against a database, used to set up and tear down
//! fixtures. Statements are written with double-quoted identifiers and
//! adapted to the backend's quoting before they run.

use std::rc::Rc;
use tracing::debug;

use crate::db::connection::Driver;
use crate::error::Result;
use crate::utils::naming::adapt_quotes;

/// SQL executor for running DDL statements
pub struct SqlExecutor {
    driver: Rc<dyn Driver>,
}

impl SqlExecutor {
    pub fn new(driver: Rc<dyn Driver>) -> Self {
        Self { driver }
    }

    /// Execute a single statement
    pub fn execute(&self, sql: &str) -> Result<()> {
        self.driver
            .execute(&adapt_quotes(sql, self.driver.backend()))
    }

    /// Execute statements in order, stopping at the first failure
    pub fn execute_batch<S: AsRef<str>>(&self, statements: &[S]) -> Result<()> {
        for statement in statements {
            self.execute(statement.as_ref())?;
        }
        Ok(())
    }

    /// Execute every statement, logging and skipping failures.
    ///
    /// Teardown runs `DROP` statements for objects that may not exist, so
    /// errors here are expected. Returns how many statements succeeded.
    pub fn execute_ignoring_errors<S: AsRef<str>>(&self, statements: &[S]) -> usize {
        let mut succeeded = 0;
        for statement in statements {
            match self.execute(statement.as_ref()) {
                Ok(()) => succeeded += 1,
                Err(e) => debug!(error = %e, "ignored failing statement"),
            }
        }
        succeeded
    }

    pub fn driver(&self) -> &Rc<dyn Driver> {
        &self.driver
    }
}
