//! Operations a worker can run.

use std::fmt;
use std::str::FromStr;

use crate::error::JobError;

/// A named operation. Dispatch is an exhaustive match, so every variant has
/// a handler by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Train,
    Predict,
}

impl Operation {
    pub const ALL: [Operation; 2] = [Operation::Train, Operation::Predict];

    pub fn name(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Predict => "predict",
        }
    }

    /// Resolve an operation from its name.
    pub fn resolve(name: &str) -> Result<Self, JobError> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| JobError::UnknownOperation {
                name: name.to_string(),
            })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}
