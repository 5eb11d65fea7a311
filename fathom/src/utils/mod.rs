//! Utilities for fathom
//!
//! Identifier handling shared by the inspectors and test fixtures, and
//! logging setup.

pub mod logging;
pub mod naming;

// Re-export key utility functions
pub use logging::init_logging;
pub use naming::{
    adapt_quotes, escape_identifier, is_reserved_word, normalize_identifier, quote_identifier,
    substitute_quote_char,
};
