//! Weighted combination of checker scores and regression counting.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{VerificationMethod, VerificationResult};

/// Per-method weights for the base score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationWeights {
    pub test: f64,
    pub lint: f64,
    pub text: f64,
}

impl Default for VerificationWeights {
    fn default() -> Self {
        Self {
            test: 0.7,
            lint: 0.2,
            text: 0.1,
        }
    }
}

impl VerificationWeights {
    pub fn new(test: f64, lint: f64, text: f64) -> Self {
        Self { test, lint, text }
    }

    pub fn weight(&self, method: VerificationMethod) -> f64 {
        match method {
            VerificationMethod::Test => self.test,
            VerificationMethod::Lint => self.lint,
            VerificationMethod::TextMatch => self.text,
        }
    }

    /// `Σ weight × score` over the results, clamped to [0, 1]. Methods with
    /// no result contribute nothing.
    pub fn aggregate(&self, results: &[VerificationResult]) -> f64 {
        let sum: f64 = results
            .iter()
            .map(|r| self.weight(r.method) * sanitize(r.score))
            .sum();
        sanitize(sum)
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Tests that passed at baseline but no longer pass.
pub fn regression_count(baseline_passing: &[String], current: &VerificationResult) -> usize {
    let now_passing: HashSet<&str> = current.passing.iter().map(String::as_str).collect();
    baseline_passing
        .iter()
        .filter(|name| !now_passing.contains(name.as_str()))
        .count()
}
