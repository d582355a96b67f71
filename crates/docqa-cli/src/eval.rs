//! Offline evaluation against a file of question/pattern cases.
//!
//! The cases file is a JSON array:
//!
//! ```json
//! [
//!   { "input": "When is the final exam?", "expected_pattern": "december\\s+12" }
//! ]
//! ```
//!
//! Each answer passes when the pattern matches anywhere in it,
//! case-insensitively.

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct EvalCase {
    pub input: String,
    pub expected_pattern: String,
}

/// A case with its pattern compiled.
#[derive(Debug, Clone)]
pub struct CompiledCase {
    pub input: String,
    pub pattern: Regex,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalOutcome {
    pub number: usize,
    pub question: String,
    pub answer: Option<String>,
    pub error: Option<String>,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub outcomes: Vec<EvalOutcome>,
    pub passed: usize,
    pub total: usize,
}

impl EvalReport {
    /// Pass rate in percent. An empty run scores zero.
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64 * 100.0
        }
    }
}

/// Parse and compile cases from JSON text.
pub fn parse_cases(json: &str) -> Result<Vec<CompiledCase>> {
    let cases: Vec<EvalCase> = serde_json::from_str(json).context("Invalid evaluation cases")?;

    cases
        .into_iter()
        .enumerate()
        .map(|(i, case)| {
            let pattern = RegexBuilder::new(&case.expected_pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("Invalid expected_pattern in case {}", i + 1))?;
            Ok::<_, anyhow::Error>(CompiledCase {
                input: case.input,
                pattern,
            })
        })
        .collect()
}

/// Read and compile cases from a JSON file.
pub async fn load_cases(path: &Path) -> Result<Vec<CompiledCase>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_cases(&content)
}

/// Ask every case in order. A failed question counts as a failed case.
pub async fn run_cases<F, Fut, E>(cases: &[CompiledCase], mut answer: F) -> EvalReport
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = std::result::Result<String, E>>,
    E: Display,
{
    let mut outcomes = Vec::with_capacity(cases.len());

    for (i, case) in cases.iter().enumerate() {
        let outcome = match answer(case.input.clone()).await {
            Ok(text) => EvalOutcome {
                number: i + 1,
                question: case.input.clone(),
                passed: case.pattern.is_match(&text),
                answer: Some(text),
                error: None,
            },
            Err(e) => EvalOutcome {
                number: i + 1,
                question: case.input.clone(),
                answer: None,
                error: Some(e.to_string()),
                passed: false,
            },
        };
        outcomes.push(outcome);
    }

    let passed = outcomes.iter().filter(|o| o.passed).count();
    EvalReport {
        total: outcomes.len(),
        passed,
        outcomes,
    }
}
