//! Worker system. Runs one job at a time.
//!
//! Core components:
//! - `job`: job ids, arguments and output
//! - `operation`: the operations a worker dispatches to
//! - `state`: job status events and the current-job marker
//! - `worker`: dispatch, failure classification, train and predict

pub mod job;
pub mod operation;
pub mod state;
pub mod worker;

pub use job::{JobArgs, JobId, JobOutput, PredictArgs, TrainArgs};
pub use operation::Operation;
pub use state::{CurrentJob, JobEvent, JobState, WorkerState};
pub use worker::{EventSender, Worker, WorkerDeps};
