use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::solution::Solution;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestVector {
    pub input: i64,
    pub expected: i64,
}

impl TestVector {
    pub const fn new(input: i64, expected: i64) -> Self {
        Self { input, expected }
    }
}

/// Longest run of zeros enclosed by ones in the binary representation.
pub const REFERENCE_VECTORS: [TestVector; 6] = [
    TestVector::new(0, 0),
    TestVector::new(1, 0),
    TestVector::new(2, 0),
    TestVector::new(1041, 5),
    TestVector::new(601, 2),
    TestVector::new(600, 2),
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid test vector `{0}`, expected INPUT:EXPECTED")]
pub struct ParseVectorError(pub String);

impl FromStr for TestVector {
    type Err = ParseVectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseVectorError(s.to_owned());
        let (input, expected) = s.split_once(':').ok_or_else(err)?;
        Ok(Self {
            input: input.trim().parse().map_err(|_| err())?,
            expected: expected.trim().parse().map_err(|_| err())?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Correct,
    Incorrect,
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Correct => write!(f, "correct"),
            Outcome::Incorrect => write!(f, "incorrect"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub input: i64,
    pub expected: i64,
    /// `None` when the invocation failed.
    pub actual: Option<i64>,
    pub outcome: Outcome,
    pub error: Option<String>,
}

impl Verdict {
    pub fn is_correct(&self) -> bool {
        self.outcome == Outcome::Correct
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// The graded solution was the fallback.
    pub fallback: bool,
    pub passed: usize,
    pub total: usize,
    pub verdicts: Vec<Verdict>,
}

impl Report {
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Invokes a solution on ordered test vectors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Harness {
    vectors: Vec<TestVector>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(REFERENCE_VECTORS.to_vec())
    }
}

impl Harness {
    pub fn new(vectors: Vec<TestVector>) -> Self {
        Self { vectors }
    }

    pub fn vectors(&self) -> &[TestVector] {
        &self.vectors
    }

    /// Classifies one vector. Every vector is incorrect for a fallback.
    pub fn check(solution: &dyn Solution, vector: TestVector) -> Verdict {
        let (actual, error) = match solution.solution(vector.input) {
            Ok(actual) => (Some(actual), None),
            Err(err) => (None, Some(err.to_string())),
        };
        let outcome = if !solution.is_fallback() && actual == Some(vector.expected) {
            Outcome::Correct
        } else {
            Outcome::Incorrect
        };
        tracing::debug!(input = vector.input, %outcome, "checked vector");
        Verdict {
            input: vector.input,
            expected: vector.expected,
            actual,
            outcome,
            error,
        }
    }

    pub fn run(&self, solution: &dyn Solution) -> Report {
        let verdicts: Vec<_> = self
            .vectors
            .iter()
            .map(|v| Self::check(solution, *v))
            .collect();
        Report {
            fallback: solution.is_fallback(),
            passed: verdicts.iter().filter(|v| v.is_correct()).count(),
            total: verdicts.len(),
            verdicts,
        }
    }
}
