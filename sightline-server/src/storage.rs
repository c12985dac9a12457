//! Local surveillance store: JPEG frames on disk, records in memory mirrored to a JSON-lines log

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::RgbImage;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sightline_eye::{encode_jpeg, RecordStore, StoredRecord, SurveillanceRecord, VisionError, JPEG_QUALITY};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

pub const RECORD_LOG: &str = "records.jsonl";

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Insert(StoredRecord),
    Delete { id: String },
}

pub struct LocalStore {
    upload_dir: PathBuf,
    log_path: PathBuf,
    records: RwLock<Vec<StoredRecord>>,
    // serializes appends
    log_lock: Mutex<()>,
}

impl LocalStore {
    /// Open (creating if needed) the upload directory and replay its record log.
    pub async fn open(upload_dir: impl AsRef<Path>) -> Result<Self, VisionError> {
        let upload_dir = upload_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&upload_dir).await?;
        let log_path = upload_dir.join(RECORD_LOG);

        let mut records: Vec<StoredRecord> = Vec::new();
        match tokio::fs::read_to_string(&log_path).await {
            Ok(content) => {
                for (n, line) in content.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<LogEntry>(line) {
                        Ok(LogEntry::Insert(record)) => records.push(record),
                        Ok(LogEntry::Delete { id }) => records.retain(|r| r.id != id),
                        Err(e) => warn!("Skipping corrupt record log line {}: {}", n + 1, e),
                    }
                }
                info!("Loaded {} surveillance records from {}", records.len(), log_path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            upload_dir,
            log_path,
            records: RwLock::new(records),
            log_lock: Mutex::new(()),
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    async fn append(&self, entry: &LogEntry) -> Result<(), VisionError> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| VisionError::Storage(format!("failed to serialize record: {}", e)))?;
        line.push('\n');

        let _guard = self.log_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .map_err(|e| VisionError::Storage(format!("failed to open {}: {}", self.log_path.display(), e)))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for LocalStore {
    async fn save_frame(&self, image: &RgbImage, timestamp: DateTime<Utc>) -> Result<String, VisionError> {
        let name = format!(
            "frame_{}_{}.jpg",
            timestamp.format("%Y%m%d_%H%M%S_%3f"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let path = self.upload_dir.join(name);

        let image = image.clone();
        let bytes = tokio::task::spawn_blocking(move || encode_jpeg(&image, JPEG_QUALITY))
            .await
            .map_err(|e| VisionError::Storage(format!("encode task failed: {}", e)))??;
        tokio::fs::write(&path, bytes).await?;
        Ok(path.to_string_lossy().into_owned())
    }

    async fn insert(&self, record: SurveillanceRecord) -> Result<String, VisionError> {
        let stored = StoredRecord {
            id: Uuid::new_v4().to_string(),
            record,
        };
        self.append(&LogEntry::Insert(stored.clone())).await?;
        let id = stored.id.clone();
        self.records.write().push(stored);
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<StoredRecord>, VisionError> {
        let mut records = self.records.read().clone();
        // Insertion order breaks timestamp ties, newest first.
        records.reverse();
        records.sort_by(|a, b| b.record.timestamp.cmp(&a.record.timestamp));
        Ok(records)
    }

    async fn delete(&self, id: &str) -> Result<bool, VisionError> {
        let exists = self.records.read().iter().any(|r| r.id == id);
        if !exists {
            return Ok(false);
        }
        self.append(&LogEntry::Delete { id: id.to_string() }).await?;
        self.records.write().retain(|r| r.id != id);
        Ok(true)
    }
}
