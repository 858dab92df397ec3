//! Job identity, arguments and output.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::JobError;
use crate::model::{Options, Series};
use crate::worker::operation::Operation;

/// Opaque job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Arguments of a job: positional values followed by named ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobArgs {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Options,
}

impl JobArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a named argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }
}

/// Binds positional then named arguments to parameters, in declaration order.
struct Binder {
    operation: Operation,
    positional: std::vec::IntoIter<Value>,
    named: Options,
}

impl Binder {
    fn new(operation: Operation, args: JobArgs) -> Self {
        Self {
            operation,
            positional: args.args.into_iter(),
            named: args.kwargs,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> JobError {
        JobError::InvalidArguments {
            operation: self.operation.to_string(),
            reason: reason.into(),
        }
    }

    fn next(&mut self, param: &str) -> Result<Option<Value>, JobError> {
        let positional = self.positional.next();
        let named = self.named.remove(param);
        match (positional, named) {
            (Some(_), Some(_)) => Err(self.invalid(format!("got multiple values for '{param}'"))),
            (positional, named) => Ok(positional.or(named)),
        }
    }

    fn required_str(&mut self, param: &str) -> Result<String, JobError> {
        match self.next(param)? {
            Some(Value::String(s)) if !s.is_empty() => Ok(s),
            Some(other) => Err(self.invalid(format!("'{param}' must be a non-empty string, got {other}"))),
            None => Err(self.invalid(format!("missing required argument '{param}'"))),
        }
    }

    fn flag(&mut self, param: &str) -> Result<bool, JobError> {
        match self.next(param)? {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(b),
            Some(other) => Err(self.invalid(format!("'{param}' must be a boolean, got {other}"))),
        }
    }

    /// Remaining named arguments become model options.
    fn finish(mut self) -> Result<Options, JobError> {
        let surplus = self.positional.len();
        if surplus > 0 {
            return Err(self.invalid(format!("{surplus} unexpected positional argument(s)")));
        }
        Ok(std::mem::take(&mut self.named))
    }
}

/// Arguments of `train(model_name, **options)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainArgs {
    pub model_name: String,
    pub options: Options,
}

impl TrainArgs {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            options: Options::new(),
        }
    }

    pub fn parse(args: JobArgs) -> Result<Self, JobError> {
        let mut binder = Binder::new(Operation::Train, args);
        let model_name = binder.required_str("model_name")?;
        let options = binder.finish()?;
        Ok(Self {
            model_name,
            options,
        })
    }
}

/// Arguments of `predict(model_name, save_prediction, detect_anomalies, **options)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictArgs {
    pub model_name: String,
    pub save_prediction: bool,
    pub detect_anomalies: bool,
    pub options: Options,
}

impl PredictArgs {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            save_prediction: false,
            detect_anomalies: false,
            options: Options::new(),
        }
    }

    pub fn parse(args: JobArgs) -> Result<Self, JobError> {
        let mut binder = Binder::new(Operation::Predict, args);
        let model_name = binder.required_str("model_name")?;
        let save_prediction = binder.flag("save_prediction")?;
        let detect_anomalies = binder.flag("detect_anomalies")?;
        let options = binder.finish()?;
        Ok(Self {
            model_name,
            save_prediction,
            detect_anomalies,
            options,
        })
    }
}

/// Value returned by a successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobOutput {
    Series(Series),
    Empty,
}

impl JobOutput {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn series(&self) -> Option<&Series> {
        match self {
            Self::Series(series) => Some(series),
            Self::Empty => None,
        }
    }
}

impl From<Option<Series>> for JobOutput {
    fn from(series: Option<Series>) -> Self {
        series.map_or(Self::Empty, Self::Series)
    }
}
