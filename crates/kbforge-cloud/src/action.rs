//! Best-effort teardown bookkeeping
//!
//! Teardown runs as a list of named steps. Every step is attempted regardless
//! of earlier failures and its outcome is recorded in a `TeardownReport`.

use crate::error::Result;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Instant;

/// A named teardown action
pub struct TeardownStep<'a> {
    pub name: String,
    pub action: BoxFuture<'a, Result<()>>,
}

impl<'a> TeardownStep<'a> {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'a,
    {
        Self {
            name: name.into(),
            action: Box::pin(action),
        }
    }
}

/// Result of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Name of the step
    pub step: String,

    /// Whether the step succeeded
    pub success: bool,

    /// Error message if failed
    pub error: Option<String>,
}

/// Outcome of a teardown run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeardownReport {
    /// Steps that completed
    pub succeeded: Vec<StepResult>,

    /// Steps that failed
    pub failed: Vec<StepResult>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl TeardownReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every step in order, never stopping on failure
    pub async fn run_all(steps: Vec<TeardownStep<'_>>) -> Self {
        let start = Instant::now();
        let mut report = Self::new();
        for step in steps {
            report.attempt(step.name, step.action).await;
        }
        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    /// Run one step and record its outcome
    pub async fn attempt<F>(&mut self, step: impl Into<String>, action: F)
    where
        F: Future<Output = Result<()>>,
    {
        let step = step.into();
        match action.await {
            Ok(()) => {
                tracing::info!(step = %step, "Teardown step completed");
                self.add_success(step);
            }
            Err(e) => {
                tracing::warn!(step = %step, error = %e, "Teardown step failed, continuing");
                self.add_failure(step, e.to_string());
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn add_success(&mut self, step: String) {
        self.succeeded.push(StepResult {
            step,
            success: true,
            error: None,
        });
    }

    pub fn add_failure(&mut self, step: String, error: String) {
        self.failed.push(StepResult {
            step,
            success: false,
            error: Some(error),
        });
    }

    /// Names of the failed steps
    pub fn failed_steps(&self) -> Vec<&str> {
        self.failed.iter().map(|r| r.step.as_str()).collect()
    }
}

impl std::fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_success() {
            write!(f, "{} teardown steps completed", self.total())
        } else {
            write!(
                f,
                "{} of {} teardown steps failed: {}",
                self.failed.len(),
                self.total(),
                self.failed_steps().join(", ")
            )
        }
    }
}
