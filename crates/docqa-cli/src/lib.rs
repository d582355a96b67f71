//! Library for docqa CLI utilities and shared functionality.

pub mod commands;
pub mod eval;
pub mod guard;
pub mod output;

pub use guard::{check_question, GuardError, MAX_QUESTION_CHARS};
pub use output::OutputFormat;
