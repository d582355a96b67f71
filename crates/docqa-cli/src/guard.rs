//! Input checks applied to a question before it reaches the engine.

use thiserror::Error;

/// Longest accepted question, in characters.
pub const MAX_QUESTION_CHARS: usize = 500;

/// Phrases that mark a prompt-injection attempt, matched case-insensitively.
const BLOCKED_PHRASES: &[&str] = &[
    "ignore previous instructions",
    "system override",
    "act as dan",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("Question is empty")]
    Empty,

    #[error("Question too long ({len} characters, at most {max}). Please shorten it.")]
    TooLong { len: usize, max: usize },

    #[error("Unsafe prompt detected.")]
    Unsafe,
}

/// Reject questions that are empty, too long, or contain a blocked phrase.
pub fn check_question(question: &str) -> Result<(), GuardError> {
    if question.trim().is_empty() {
        return Err(GuardError::Empty);
    }

    let len = question.chars().count();
    if len > MAX_QUESTION_CHARS {
        return Err(GuardError::TooLong {
            len,
            max: MAX_QUESTION_CHARS,
        });
    }

    let lower = question.to_lowercase();
    if BLOCKED_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        return Err(GuardError::Unsafe);
    }

    Ok(())
}
