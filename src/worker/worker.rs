//! Job execution.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Config;
use crate::datasource::{DataSource, DataSourceFactory};
use crate::error::{ConfigError, Error, JobError, JobFailure};
use crate::model::{Model, ModelFactory, ModelFamily, Series};
use crate::store::{FileStorage, Storage};
use crate::worker::job::{JobArgs, JobId, JobOutput, PredictArgs, TrainArgs};
use crate::worker::operation::Operation;
use crate::worker::state::{CurrentJob, JobEvent, WorkerState};

/// Sending half of the outbound event sink.
pub type EventSender = mpsc::UnboundedSender<JobEvent>;

/// Collaborators a worker is built with.
#[derive(Clone)]
pub struct WorkerDeps {
    pub models: Arc<dyn ModelFactory>,
    pub datasources: Arc<dyn DataSourceFactory>,
    pub events: EventSender,
}

/// Executes one job at a time against its own storage handle.
///
/// Interrupts are not handled here. The pool owning the worker cancels a
/// job through the token passed to [`Worker::run`]; the token is checked
/// between steps, never inside a model or datasource call.
pub struct Worker {
    config: Config,
    storage: Arc<dyn Storage>,
    datasources: Arc<dyn DataSourceFactory>,
    events: EventSender,
    current: CurrentJob,
}

impl Worker {
    /// Create a worker backed by a file storage at the configured path.
    pub async fn open(config: Config, deps: WorkerDeps) -> Result<Self, Error> {
        let storage = FileStorage::open(&config.storage.path, deps.models).await?;
        Ok(Self::with_storage(
            config,
            Arc::new(storage),
            deps.datasources,
            deps.events,
        ))
    }

    /// Load the configuration file, then [`Worker::open`].
    pub async fn from_config_file(path: impl AsRef<Path>, deps: WorkerDeps) -> Result<Self, Error> {
        let config = Config::load(path).await?;
        Self::open(config, deps).await
    }

    /// Create a worker over an existing storage backend.
    pub fn with_storage(
        config: Config,
        storage: Arc<dyn Storage>,
        datasources: Arc<dyn DataSourceFactory>,
        events: EventSender,
    ) -> Self {
        Self {
            config,
            storage,
            datasources,
            events,
            current: CurrentJob::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// The job being executed, if any.
    pub fn current_job(&self) -> Option<JobId> {
        self.current.get()
    }

    /// A handle observing the current-job marker from elsewhere.
    pub fn current_job_handle(&self) -> CurrentJob {
        self.current.clone()
    }

    pub fn state(&self) -> WorkerState {
        self.current.state()
    }

    /// Fire-and-forget: a closed sink never fails a job.
    fn emit(&self, event: JobEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Event sink closed, dropping job event");
        }
    }

    /// Run `operation` with `args` as job `job_id`.
    ///
    /// Emits a single `running` event before any work, then returns the
    /// operation result or its classified failure. Only the `running`
    /// transition is reported; completion is the return of this call.
    pub async fn run(
        &mut self,
        job_id: impl Into<JobId>,
        operation: &str,
        args: JobArgs,
        cancel: &CancellationToken,
    ) -> Result<JobOutput, JobFailure> {
        let job_id = job_id.into();
        self.emit(JobEvent::running(job_id.clone()));
        tracing::info!("job[{}] starting", job_id);

        let _current = self.current.enter(job_id.clone());
        let span = tracing::info_span!("job", job_id = %job_id, operation);
        let result = self
            .dispatch(operation, args, cancel)
            .instrument(span)
            .await;

        result.map_err(|e| Self::classify(&job_id, operation, e))
    }

    /// Tag a failure; internal ones are logged here and only here.
    fn classify(job_id: &JobId, operation: &str, error: Error) -> JobFailure {
        if error.is_domain() {
            return JobFailure::Domain(error);
        }
        tracing::error!(
            job_id = %job_id,
            operation,
            error = %error,
            details = ?error,
            "job[{}] failed with internal error",
            job_id
        );
        JobFailure::Internal(error)
    }

    async fn dispatch(
        &self,
        operation: &str,
        args: JobArgs,
        cancel: &CancellationToken,
    ) -> Result<JobOutput, Error> {
        match Operation::resolve(operation)? {
            Operation::Train => {
                self.train(TrainArgs::parse(args)?, cancel).await?;
                Ok(JobOutput::Empty)
            }
            Operation::Predict => {
                let series = self.predict(PredictArgs::parse(args)?, cancel).await?;
                Ok(JobOutput::from(series))
            }
        }
    }

    /// Train a model and persist it. Nothing is saved if training fails.
    pub async fn train(&self, args: TrainArgs, cancel: &CancellationToken) -> Result<(), Error> {
        let (mut model, source) = self.open_model(&args.model_name, cancel).await?;

        checkpoint(cancel, "train")?;
        model.train(source.as_ref(), &args.options).await?;

        checkpoint(cancel, "save model")?;
        self.storage.save_model(model.as_ref()).await?;
        tracing::info!(model = model.name(), "Model trained");
        Ok(())
    }

    /// Ask a model for a prediction and post-process it by model family.
    ///
    /// Only time-series models return a series. A fingerprint prediction is
    /// kept on the model when `save_prediction` is set and dropped otherwise.
    pub async fn predict(
        &self,
        args: PredictArgs,
        cancel: &CancellationToken,
    ) -> Result<Option<Series>, Error> {
        let (mut model, source) = self.open_model(&args.model_name, cancel).await?;

        checkpoint(cancel, "predict")?;
        let mut prediction = model.predict(source.as_ref(), &args.options).await?;

        match model.family() {
            ModelFamily::TimeSeries => {
                tracing::info!(
                    "predicted values for {} time buckets",
                    prediction.timestamps.len()
                );
                if args.save_prediction {
                    checkpoint(cancel, "save prediction")?;
                    source
                        .save_timeseries_prediction(&prediction, model.as_ref())
                        .await?;
                }
                if args.detect_anomalies {
                    checkpoint(cancel, "detect anomalies")?;
                    model.detect_anomalies(&mut prediction)?;
                    tracing::debug!(
                        anomalies = prediction.anomalies().len(),
                        "Anomaly detection done"
                    );
                }
                Ok(Some(prediction.format_series()))
            }
            ModelFamily::Fingerprints => {
                tracing::info!("computing fingerprints for model '{}'", model.name());
                if args.save_prediction {
                    model.keep_prediction(prediction)?;
                    checkpoint(cancel, "save model")?;
                    self.storage.save_model(model.as_ref()).await?;
                }
                Ok(None)
            }
            ModelFamily::Other => {
                tracing::info!("prediction done");
                Ok(None)
            }
        }
    }

    /// Load a model and open its default datasource.
    async fn open_model(
        &self,
        model_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(Box<dyn Model>, Box<dyn DataSource>), Error> {
        checkpoint(cancel, "load model")?;
        let model = self.storage.get_model(model_name).await?;

        checkpoint(cancel, "open datasource")?;
        let source_name =
            model
                .default_datasource()
                .ok_or_else(|| ConfigError::MissingRequired {
                    key: "default_datasource".to_string(),
                    hint: format!("Model '{}' does not name a datasource.", model.name()),
                })?;
        let settings = self.config.get_datasource(source_name)?;
        let source = self.datasources.open(settings)?;
        Ok((model, source))
    }
}

fn checkpoint(cancel: &CancellationToken, step: &str) -> Result<(), JobError> {
    if cancel.is_cancelled() {
        tracing::info!(step, "Job cancelled");
        return Err(JobError::Cancelled {
            step: step.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Mutex, OnceLock};

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::datasource::DataSourceSettings;
    use crate::error::{DataSourceError, ModelError, StorageError};
    use crate::model::{ModelRecord, ModelSettings, Options, Prediction};
    use crate::store::DataPoint;
    use crate::worker::state::JobState;

    type Calls = Arc<Mutex<Vec<String>>>;

    fn log(calls: &Calls, call: String) {
        calls.lock().unwrap().push(call);
    }

    #[derive(Clone)]
    enum Training {
        Succeed,
        NoData,
        Crash,
        CancelMidway(CancellationToken),
    }

    #[derive(Clone)]
    struct Spec {
        settings: ModelSettings,
        training: Training,
    }

    fn spec(name: &str, kind: &str) -> Spec {
        Spec {
            settings: ModelSettings::new(name, kind).with_datasource("ds1"),
            training: Training::Succeed,
        }
    }

    fn canned_prediction() -> Prediction {
        let timestamps = (0..3)
            .map(|i| Utc.timestamp_opt(1_700_000_000 + i * 60, 0).unwrap())
            .collect::<Vec<DateTime<Utc>>>();
        Prediction::new(timestamps)
            .with_predicted("count", vec![Some(1.0), Some(2.0), Some(3.0)])
            .with_scores(vec![Some(1.0), Some(90.0), Some(2.0)])
    }

    struct StubModel {
        spec: Spec,
        state: Option<serde_json::Value>,
        calls: Calls,
        marker: Option<CurrentJob>,
        observed: Arc<Mutex<Vec<Option<JobId>>>>,
    }

    #[async_trait]
    impl Model for StubModel {
        fn settings(&self) -> &ModelSettings {
            &self.spec.settings
        }

        fn state(&self) -> Option<serde_json::Value> {
            self.state.clone()
        }

        async fn train(
            &mut self,
            source: &dyn DataSource,
            _options: &Options,
        ) -> Result<(), ModelError> {
            log(&self.calls, format!("train:{}:{}", self.name(), source.name()));
            let current = self.marker.as_ref().and_then(CurrentJob::get);
            self.observed.lock().unwrap().push(current);
            match &self.spec.training {
                Training::Succeed => {
                    self.state = Some(serde_json::json!({"trained": true}));
                    Ok(())
                }
                Training::NoData => Err(ModelError::NoData {
                    reason: "empty bucket range".to_string(),
                }),
                Training::Crash => Err(ModelError::Internal("shape mismatch".to_string())),
                Training::CancelMidway(token) => {
                    token.cancel();
                    self.state = Some(serde_json::json!({"trained": true}));
                    Ok(())
                }
            }
        }

        async fn predict(
            &self,
            _source: &dyn DataSource,
            _options: &Options,
        ) -> Result<Prediction, ModelError> {
            log(&self.calls, format!("predict:{}", self.name()));
            Ok(canned_prediction())
        }

        fn detect_anomalies(&mut self, prediction: &mut Prediction) -> Result<(), ModelError> {
            log(&self.calls, format!("detect_anomalies:{}", self.name()));
            prediction.mark_anomaly(1, 90.0);
            Ok(())
        }

        fn keep_prediction(&mut self, prediction: Prediction) -> Result<(), ModelError> {
            log(&self.calls, format!("keep_prediction:{}", self.name()));
            self.state = Some(serde_json::json!({"kept": prediction.len()}));
            Ok(())
        }
    }

    struct StubStorage {
        specs: HashMap<String, Spec>,
        calls: Calls,
        marker: OnceLock<CurrentJob>,
        observed: Arc<Mutex<Vec<Option<JobId>>>>,
        saved: Mutex<Vec<ModelRecord>>,
        events: Mutex<mpsc::UnboundedReceiver<JobEvent>>,
        delivered: Mutex<Vec<JobEvent>>,
        delivered_at_get_model: Mutex<Vec<Vec<JobEvent>>>,
    }

    impl StubStorage {
        /// Move everything the worker has sent so far into `delivered`.
        fn pump(&self) {
            let mut events = self.events.lock().unwrap();
            let mut delivered = self.delivered.lock().unwrap();
            while let Ok(event) = events.try_recv() {
                delivered.push(event);
            }
        }
    }

    #[async_trait]
    impl Storage for StubStorage {
        async fn get_model(&self, name: &str) -> Result<Box<dyn Model>, StorageError> {
            log(&self.calls, format!("get_model:{name}"));
            self.pump();
            let seen = self.delivered.lock().unwrap().clone();
            self.delivered_at_get_model.lock().unwrap().push(seen);
            let spec = self
                .specs
                .get(name)
                .cloned()
                .ok_or_else(|| StorageError::ModelNotFound {
                    name: name.to_string(),
                })?;
            Ok(Box::new(StubModel {
                spec,
                state: None,
                calls: self.calls.clone(),
                marker: self.marker.get().cloned(),
                observed: self.observed.clone(),
            }))
        }

        async fn create_model(&self, _model: &dyn Model) -> Result<(), StorageError> {
            unimplemented!("not used by the worker")
        }

        async fn delete_model(&self, _name: &str) -> Result<(), StorageError> {
            unimplemented!("not used by the worker")
        }

        async fn set_threshold(&self, _name: &str, _threshold: f64) -> Result<(), StorageError> {
            unimplemented!("not used by the worker")
        }

        async fn get_times_data(
            &self,
            _model: &str,
            _from: Option<DateTime<Utc>>,
            _to: Option<DateTime<Utc>>,
        ) -> Result<Vec<DataPoint>, StorageError> {
            Ok(Vec::new())
        }

        async fn save_model(&self, model: &dyn Model) -> Result<(), StorageError> {
            log(&self.calls, format!("save_model:{}", model.name()));
            self.saved.lock().unwrap().push(model.to_record());
            Ok(())
        }

        async fn list_models(&self) -> Result<Vec<String>, StorageError> {
            let mut names: Vec<String> = self.specs.keys().cloned().collect();
            names.sort();
            Ok(names)
        }
    }

    struct StubSource {
        name: String,
        calls: Calls,
    }

    #[async_trait]
    impl DataSource for StubSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn save_timeseries_prediction(
            &self,
            prediction: &Prediction,
            model: &dyn Model,
        ) -> Result<(), DataSourceError> {
            log(
                &self.calls,
                format!("save_timeseries_prediction:{}:{}", model.name(), prediction.len()),
            );
            Ok(())
        }
    }

    struct StubSources {
        calls: Calls,
    }

    impl DataSourceFactory for StubSources {
        fn open(
            &self,
            settings: &DataSourceSettings,
        ) -> Result<Box<dyn DataSource>, DataSourceError> {
            log(&self.calls, format!("open_datasource:{}", settings.name));
            Ok(Box::new(StubSource {
                name: settings.name.clone(),
                calls: self.calls.clone(),
            }))
        }
    }

    struct Harness {
        worker: Worker,
        storage: Arc<StubStorage>,
        calls: Calls,
    }

    impl Harness {
        fn new(specs: Vec<Spec>) -> Self {
            let calls: Calls = Arc::default();
            let (tx, events) = mpsc::unbounded_channel();
            let storage = Arc::new(StubStorage {
                specs: specs
                    .into_iter()
                    .map(|s| (s.settings.name.clone(), s))
                    .collect(),
                calls: calls.clone(),
                marker: OnceLock::new(),
                observed: Arc::default(),
                saved: Mutex::default(),
                events: Mutex::new(events),
                delivered: Mutex::default(),
                delivered_at_get_model: Mutex::default(),
            });
            let config = Config::default().with_datasource(DataSourceSettings::new("ds1", "stub"));
            let worker = Worker::with_storage(
                config,
                storage.clone(),
                Arc::new(StubSources {
                    calls: calls.clone(),
                }),
                tx,
            );
            storage.marker.set(worker.current_job_handle()).unwrap();
            Self {
                worker,
                storage,
                calls,
            }
        }

        async fn run(
            &mut self,
            job_id: &str,
            operation: &str,
            args: JobArgs,
        ) -> Result<JobOutput, JobFailure> {
            self.worker
                .run(job_id, operation, args, &CancellationToken::new())
                .await
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn drain_events(&mut self) -> Vec<JobEvent> {
            self.storage.pump();
            std::mem::take(&mut *self.storage.delivered.lock().unwrap())
        }

        fn saved(&self) -> Vec<ModelRecord> {
            self.storage.saved.lock().unwrap().clone()
        }
    }

    fn model_args(name: &str) -> JobArgs {
        JobArgs::new().kwarg("model_name", name)
    }

    #[tokio::test]
    async fn train_emits_one_running_event_and_saves_once() {
        let mut h = Harness::new(vec![spec("m1", "timeseries")]);

        let output = h.run("job-1", "train", model_args("m1")).await.unwrap();

        assert!(output.is_empty());
        assert_eq!(h.drain_events(), vec![JobEvent::running(JobId::from("job-1"))]);
        assert_eq!(
            h.calls(),
            vec![
                "get_model:m1",
                "open_datasource:ds1",
                "train:m1:ds1",
                "save_model:m1",
            ]
        );
        let saved = h.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].state, Some(serde_json::json!({"trained": true})));
        assert_eq!(h.worker.current_job(), None);
    }

    #[tokio::test]
    async fn running_event_precedes_first_collaborator_call() {
        let mut h = Harness::new(vec![spec("m1", "timeseries"), spec("m2", "timeseries")]);

        h.run("job-1", "train", model_args("m1")).await.unwrap();
        h.run("job-2", "predict", model_args("m2")).await.unwrap();

        let seen = h.storage.delivered_at_get_model.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                vec![JobEvent::running(JobId::from("job-1"))],
                vec![
                    JobEvent::running(JobId::from("job-1")),
                    JobEvent::running(JobId::from("job-2")),
                ],
            ]
        );
    }

    #[tokio::test]
    async fn marker_set_only_during_the_call() {
        let mut h = Harness::new(vec![spec("m1", "timeseries")]);
        assert_eq!(h.worker.state(), WorkerState::Idle);

        h.run("job-1", "train", model_args("m1")).await.unwrap();

        let observed = h.storage.observed.lock().unwrap().clone();
        assert_eq!(observed, vec![Some(JobId::from("job-1"))]);
        assert_eq!(h.worker.current_job(), None);
        assert_eq!(h.worker.state(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn failed_training_is_never_persisted() {
        let mut failing = spec("m1", "timeseries");
        failing.training = Training::NoData;
        let mut h = Harness::new(vec![failing]);

        let failure = h.run("job-1", "train", model_args("m1")).await.unwrap_err();

        assert!(failure.is_domain());
        assert!(matches!(
            failure.error(),
            Error::Model(ModelError::NoData { .. })
        ));
        assert!(!h.calls().iter().any(|c| c.starts_with("save_model")));
        assert!(h.saved().is_empty());
        assert_eq!(h.worker.current_job(), None);
    }

    #[tokio::test]
    async fn unexpected_failure_is_internal_and_unchanged() {
        let mut crashing = spec("m1", "timeseries");
        crashing.training = Training::Crash;
        let mut h = Harness::new(vec![crashing]);

        let failure = h.run("job-1", "train", model_args("m1")).await.unwrap_err();

        assert!(matches!(failure, JobFailure::Internal(_)));
        assert!(matches!(
            failure.into_error(),
            Error::Model(ModelError::Internal(reason)) if reason == "shape mismatch"
        ));
        assert!(h.saved().is_empty());
        assert_eq!(h.worker.current_job(), None);
    }

    #[tokio::test]
    async fn unknown_operation_never_reaches_collaborators() {
        let mut h = Harness::new(vec![spec("m1", "timeseries")]);

        let failure = h.run("job-9", "do_things", model_args("m1")).await.unwrap_err();

        assert!(matches!(
            failure,
            JobFailure::Domain(Error::Job(JobError::UnknownOperation { ref name })) if name == "do_things"
        ));
        assert!(h.calls().is_empty());
        assert_eq!(h.drain_events().len(), 1);
        assert_eq!(h.worker.current_job(), None);
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_collaborators() {
        let mut h = Harness::new(vec![spec("m1", "timeseries")]);

        let failure = h
            .run("job-1", "predict", JobArgs::new().kwarg("save_prediction", true))
            .await
            .unwrap_err();

        assert!(matches!(
            failure,
            JobFailure::Domain(Error::Job(JobError::InvalidArguments { .. }))
        ));
        assert!(h.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_model() {
        let mut h = Harness::new(vec![]);

        let failure = h.run("job-1", "train", model_args("ghost")).await.unwrap_err();

        assert!(matches!(
            failure,
            JobFailure::Domain(Error::Storage(StorageError::ModelNotFound { .. }))
        ));
        assert_eq!(h.worker.current_job(), None);
    }

    #[tokio::test]
    async fn unknown_datasource_is_config_error() {
        let mut orphan = spec("m1", "timeseries");
        orphan.settings.default_datasource = Some("nowhere".to_string());
        let mut h = Harness::new(vec![orphan]);

        let failure = h.run("job-1", "train", model_args("m1")).await.unwrap_err();

        assert!(matches!(
            failure,
            JobFailure::Domain(Error::Config(ConfigError::DataSourceNotFound { ref name })) if name == "nowhere"
        ));
        assert_eq!(h.calls(), vec!["get_model:m1"]);
    }

    #[tokio::test]
    async fn model_without_datasource_is_config_error() {
        let mut orphan = spec("m1", "timeseries");
        orphan.settings.default_datasource = None;
        let mut h = Harness::new(vec![orphan]);

        let failure = h.run("job-1", "predict", model_args("m1")).await.unwrap_err();

        assert!(matches!(
            failure,
            JobFailure::Domain(Error::Config(ConfigError::MissingRequired { .. }))
        ));
    }

    #[tokio::test]
    async fn timeseries_detection_without_saving() {
        let mut h = Harness::new(vec![spec("m2", "timeseries")]);

        let output = h
            .run(
                "job-2",
                "predict",
                model_args("m2").kwarg("detect_anomalies", true),
            )
            .await
            .unwrap();

        assert_eq!(output, JobOutput::Series(canned_prediction().format_series()));
        let calls = h.calls();
        assert!(calls.contains(&"detect_anomalies:m2".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("save_")));
    }

    #[tokio::test]
    async fn timeseries_saved_through_datasource() {
        let mut h = Harness::new(vec![spec("m2", "timeseries")]);

        let output = h
            .run(
                "job-2",
                "predict",
                model_args("m2").kwarg("save_prediction", true),
            )
            .await
            .unwrap();

        assert_eq!(output.series(), Some(&canned_prediction().format_series()));
        assert_eq!(
            h.calls(),
            vec![
                "get_model:m2",
                "open_datasource:ds1",
                "predict:m2",
                "save_timeseries_prediction:m2:3",
            ]
        );
        assert!(h.saved().is_empty());
    }

    #[tokio::test]
    async fn fingerprints_kept_then_saved() {
        let mut h = Harness::new(vec![spec("fp", "ivoip_fingerprints")]);

        let output = h
            .run("job-3", "predict", JobArgs::new().arg("fp").arg(true))
            .await
            .unwrap();

        assert!(output.is_empty());
        let calls = h.calls();
        let keep = calls.iter().position(|c| c == "keep_prediction:fp").unwrap();
        let save = calls.iter().position(|c| c == "save_model:fp").unwrap();
        assert!(keep < save);
        assert_eq!(h.saved()[0].state, Some(serde_json::json!({"kept": 3})));
    }

    #[tokio::test]
    async fn fingerprints_discarded_without_saving() {
        let mut h = Harness::new(vec![spec("fp", "fingerprints")]);

        let output = h.run("job-3", "predict", model_args("fp")).await.unwrap();

        assert!(output.is_empty());
        let calls = h.calls();
        assert!(!calls.iter().any(|c| c.starts_with("keep_prediction")));
        assert!(!calls.iter().any(|c| c.starts_with("save_model")));
    }

    #[tokio::test]
    async fn other_types_only_predict() {
        let mut h = Harness::new(vec![spec("m3", "donut")]);

        let output = h
            .run(
                "job-3",
                "predict",
                model_args("m3")
                    .kwarg("save_prediction", true)
                    .kwarg("detect_anomalies", true),
            )
            .await
            .unwrap();

        assert!(output.is_empty());
        assert_eq!(
            h.calls(),
            vec!["get_model:m3", "open_datasource:ds1", "predict:m3"]
        );
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let mut h = Harness::new(vec![spec("m1", "timeseries")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = h
            .worker
            .run("job-1", "train", model_args("m1"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            failure,
            JobFailure::Domain(Error::Job(JobError::Cancelled { ref step })) if step == "load model"
        ));
        assert!(h.calls().is_empty());
        assert_eq!(h.drain_events().len(), 1);
        assert_eq!(h.worker.current_job(), None);
    }

    #[tokio::test]
    async fn cancelled_during_training_skips_persistence() {
        let cancel = CancellationToken::new();
        let mut interrupted = spec("m1", "timeseries");
        interrupted.training = Training::CancelMidway(cancel.clone());
        let mut h = Harness::new(vec![interrupted]);

        let failure = h
            .worker
            .run("job-1", "train", model_args("m1"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error(),
            Error::Job(JobError::Cancelled { step }) if step == "save model"
        ));
        assert!(h.calls().contains(&"train:m1:ds1".to_string()));
        assert!(h.saved().is_empty());
    }

    #[tokio::test]
    async fn reusable_after_failure() {
        let mut h = Harness::new(vec![spec("m1", "timeseries")]);

        assert!(h.run("job-1", "train", model_args("ghost")).await.is_err());
        assert!(h.run("job-2", "train", model_args("m1")).await.is_ok());

        let events = h.drain_events();
        assert_eq!(
            events,
            vec![
                JobEvent::running(JobId::from("job-1")),
                JobEvent::running(JobId::from("job-2")),
            ]
        );
        assert!(events.iter().all(|e| matches!(
            e,
            JobEvent::JobState {
                state: JobState::Running,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn closed_event_sink_does_not_fail_jobs() {
        let mut h = Harness::new(vec![spec("m1", "timeseries")]);
        h.storage.events.lock().unwrap().close();

        assert!(h.run("job-1", "train", model_args("m1")).await.is_ok());
    }
}
