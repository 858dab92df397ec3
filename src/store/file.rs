//! File-backed storage.
//!
//! Layout under the storage root:
//! - `models/<name>/model.json`: the model record (settings + state)
//! - `data/<name>.jsonl`: data points, one JSON object per line

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::StorageError;
use crate::model::{Model, ModelFactory, ModelRecord};
use crate::store::traits::{
    DataPoint, Storage, select_range, validate_model_name, validate_threshold,
};

const MODELS_DIR: &str = "models";
const DATA_DIR: &str = "data";
const MODEL_FILE: &str = "model.json";

/// Storage keeping one directory per model under a root path.
pub struct FileStorage {
    root: PathBuf,
    factory: Arc<dyn ModelFactory>,
}

impl FileStorage {
    /// Open (or create) a storage rooted at `root`.
    pub async fn open(
        root: impl Into<PathBuf>,
        factory: Arc<dyn ModelFactory>,
    ) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(root.join(MODELS_DIR)).await?;
        fs::create_dir_all(root.join(DATA_DIR)).await?;
        tracing::info!(path = %root.display(), "File storage opened");
        Ok(Self { root, factory })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn model_dir(&self, name: &str) -> PathBuf {
        self.root.join(MODELS_DIR).join(name)
    }

    fn model_path(&self, name: &str) -> PathBuf {
        self.model_dir(name).join(MODEL_FILE)
    }

    fn data_path(&self, name: &str) -> PathBuf {
        self.root.join(DATA_DIR).join(format!("{name}.jsonl"))
    }

    async fn read_record(&self, name: &str) -> Result<ModelRecord, StorageError> {
        validate_model_name(name)?;
        let raw = match fs::read(self.model_path(name)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::ModelNotFound {
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw).map_err(|e| {
            StorageError::Serialization(format!("model {name}: {e}"))
        })
    }

    /// Serialize `record` into a fresh temp file next to its final path.
    ///
    /// Each call gets its own file, so concurrent writers never share one.
    async fn stage_record(&self, record: &ModelRecord) -> Result<PathBuf, StorageError> {
        let name = record.name();
        let dir = self.model_dir(name);
        fs::create_dir_all(&dir).await?;

        let body = serde_json::to_vec_pretty(record)
            .map_err(|e| StorageError::Serialization(format!("model {name}: {e}")))?;
        let tmp = dir.join(format!(".{MODEL_FILE}.{}.tmp", uuid::Uuid::new_v4().simple()));
        if let Err(e) = fs::write(&tmp, body).await {
            discard(&tmp).await;
            return Err(e.into());
        }
        Ok(tmp)
    }

    /// Replace the record; readers never see a partial file.
    async fn write_record(&self, record: &ModelRecord) -> Result<(), StorageError> {
        let tmp = self.stage_record(record).await?;
        if let Err(e) = fs::rename(&tmp, self.model_path(record.name())).await {
            discard(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Publish the record only if none exists yet.
    ///
    /// `hard_link` fails when the target exists, which makes the existence
    /// check and the write a single step.
    async fn create_record(&self, record: &ModelRecord) -> Result<(), StorageError> {
        let name = record.name();
        let tmp = self.stage_record(record).await?;
        let linked = fs::hard_link(&tmp, self.model_path(name)).await;
        discard(&tmp).await;
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StorageError::ModelExists {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.model_path(name)).await?)
    }

    /// Append data points for `model`.
    pub async fn append_times_data(
        &self,
        model: &str,
        points: &[DataPoint],
    ) -> Result<(), StorageError> {
        validate_model_name(model)?;
        let mut body = Vec::new();
        for point in points {
            serde_json::to_writer(&mut body, point)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            body.push(b'\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.data_path(model))
            .await?;
        file.write_all(&body).await?;
        file.flush().await?;
        Ok(())
    }
}

async fn discard(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp).await {
        tracing::debug!(path = %tmp.display(), error = %e, "Temp record not removed");
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get_model(&self, name: &str) -> Result<Box<dyn Model>, StorageError> {
        let record = self.read_record(name).await?;
        self.factory
            .load(record)
            .map_err(|source| StorageError::Load {
                name: name.to_string(),
                source,
            })
    }

    async fn create_model(&self, model: &dyn Model) -> Result<(), StorageError> {
        let name = model.name();
        validate_model_name(name)?;
        self.create_record(&model.to_record()).await?;
        tracing::info!(model = name, "Model created");
        Ok(())
    }

    async fn delete_model(&self, name: &str) -> Result<(), StorageError> {
        validate_model_name(name)?;
        if !self.exists(name).await? {
            return Err(StorageError::ModelNotFound {
                name: name.to_string(),
            });
        }
        fs::remove_dir_all(self.model_dir(name)).await?;
        match fs::remove_file(self.data_path(name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!(model = name, "Model deleted");
        Ok(())
    }

    async fn set_threshold(&self, name: &str, threshold: f64) -> Result<(), StorageError> {
        validate_threshold(threshold)?;
        let mut record = self.read_record(name).await?;
        record.settings.threshold = Some(threshold);
        self.write_record(&record).await?;
        tracing::debug!(model = name, threshold, "Threshold updated");
        Ok(())
    }

    async fn get_times_data(
        &self,
        model: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<DataPoint>, StorageError> {
        validate_model_name(model)?;
        let raw = match fs::read_to_string(self.data_path(model)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let points = raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str::<DataPoint>(line)
                    .map_err(|e| StorageError::Serialization(format!("data of {model}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(select_range(points, from, to))
    }

    async fn save_model(&self, model: &dyn Model) -> Result<(), StorageError> {
        validate_model_name(model.name())?;
        self.write_record(&model.to_record()).await?;
        tracing::debug!(model = model.name(), "Model saved");
        Ok(())
    }

    async fn list_models(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(self.root.join(MODELS_DIR)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !fs::try_exists(entry.path().join(MODEL_FILE)).await? {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn model_exists(&self, name: &str) -> Result<bool, StorageError> {
        validate_model_name(name)?;
        self.exists(name).await
    }
}
