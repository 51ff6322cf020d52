//! Combined sensor/control history persisted to a JSON file.
//!
//! Every entry pairs the latest sensor payload with the control command that
//! answered it. Commands recorded by the gateway itself (workflow runs and
//! `/control` requests) are remembered by hash for a short window so the
//! copy echoed back on the bus is not recorded twice.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex as StdMutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, Utc};
use fieldlink_core::HistorySettings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Where a log entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// Control output of a Dify workflow run
    Workflow,
    /// Command observed on the control topic
    Mqtt,
    /// Command published through `POST /control`
    Http,
    #[serde(other)]
    Unknown,
}

impl RecordSource {
    /// Sources whose commands are echoed back by the broker.
    fn published_by_gateway(self) -> bool {
        matches!(self, Self::Workflow | Self::Http)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub sensor_data: Value,
    #[serde(default)]
    pub control_command: Value,
    #[serde(default = "unknown_source")]
    pub source: RecordSource,
}

fn unknown_source() -> RecordSource {
    RecordSource::Unknown
}

#[derive(Debug, thiserror::Error)]
pub enum ControlLogError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct ControlLog {
    path: PathBuf,
    settings: HistorySettings,
    offset: FixedOffset,
    entries: Mutex<Vec<LogRecord>>,
    recent: StdMutex<HashMap<String, Instant>>,
    latest_sensor: RwLock<Option<Value>>,
}

impl ControlLog {
    /// Load existing entries from `settings.log_file`. A missing file starts
    /// empty, and so does a corrupt one (with a warning).
    pub async fn load(settings: &HistorySettings) -> Self {
        let path = settings.log_file.clone();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Vec<LogRecord>>(&content) {
                Ok(entries) => {
                    info!("Loaded {} control log entries from {}", entries.len(), path.display());
                    entries
                }
                Err(e) => {
                    warn!("Ignoring unreadable control log {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Failed to read control log {}: {}", path.display(), e);
                Vec::new()
            }
        };

        Self::with_entries(settings, entries)
    }

    fn with_entries(settings: &HistorySettings, entries: Vec<LogRecord>) -> Self {
        let offset = FixedOffset::east_opt(settings.timezone_offset_hours * 3600)
            .unwrap_or_else(|| {
                warn!(
                    "Invalid timezone offset {}h, using UTC",
                    settings.timezone_offset_hours
                );
                FixedOffset::east_opt(0).expect("zero offset is valid")
            });

        Self {
            path: settings.log_file.clone(),
            settings: settings.clone(),
            offset,
            entries: Mutex::new(entries),
            recent: StdMutex::new(HashMap::new()),
            latest_sensor: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remember the most recent sensor payload.
    pub fn set_latest_sensor(&self, sensor: Value) {
        let mut latest = self.latest_sensor.write().expect("latest sensor lock poisoned");
        *latest = Some(sensor);
    }

    pub fn latest_sensor(&self) -> Option<Value> {
        self.latest_sensor
            .read()
            .expect("latest sensor lock poisoned")
            .clone()
    }

    /// Append an entry, prune, and persist the log.
    pub async fn record(
        &self,
        sensor: Value,
        control: Value,
        source: RecordSource,
    ) -> Result<LogRecord, ControlLogError> {
        let entry = LogRecord {
            timestamp: Utc::now().with_timezone(&self.offset).to_rfc3339(),
            sensor_data: sensor,
            control_command: control,
            source,
        };

        {
            let mut entries = self.entries.lock().await;
            let mut next = entries.clone();
            next.push(entry.clone());
            let next = prune(
                next,
                Utc::now(),
                self.settings.retention_days,
                self.settings.max_entries,
            );
            // Memory only changes once the file is on disk.
            write_atomic(&self.path, &next).await?;
            debug!("Saved {} control log entries to {}", next.len(), self.path.display());
            *entries = next;
        }

        if source.published_by_gateway() {
            let hash = record_hash(&entry.sensor_data, &entry.control_command);
            self.remember(hash);
        }

        info!(source = ?source, "control log entry recorded");
        Ok(entry)
    }

    /// Whether the same sensor/control pair was recorded by the gateway
    /// within the duplicate window.
    pub fn is_recent_duplicate(&self, sensor: &Value, control: &Value) -> bool {
        let hash = record_hash(sensor, control);
        let window = self.window();
        let recent = self.recent.lock().expect("recent hash lock poisoned");
        recent
            .get(&hash)
            .is_some_and(|recorded_at| recorded_at.elapsed() <= window)
    }

    /// Sensor payloads of the newest `limit` entries, oldest first.
    pub async fn sensor_history(&self, limit: Option<usize>) -> Vec<Value> {
        let entries = self.entries.lock().await;
        tail(&entries, self.limit(limit))
            .iter()
            .map(|entry| entry.sensor_data.clone())
            .collect()
    }

    /// The newest `limit` entries, oldest first.
    pub async fn entries(&self, limit: Option<usize>) -> Vec<LogRecord> {
        let entries = self.entries.lock().await;
        tail(&entries, self.limit(limit)).to_vec()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.settings.max_entries)
            .min(self.settings.max_entries)
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.settings.duplicate_window_seconds)
    }

    fn remember(&self, hash: String) {
        let window = self.window();
        let mut recent = self.recent.lock().expect("recent hash lock poisoned");
        recent.retain(|_, recorded_at| recorded_at.elapsed() <= window);
        recent.insert(hash, Instant::now());
    }
}

fn tail(entries: &[LogRecord], limit: usize) -> &[LogRecord] {
    &entries[entries.len().saturating_sub(limit)..]
}

/// Drop entries older than the retention period (entries with no timestamp
/// too; unparsable timestamps are kept), then keep the newest `max_entries`.
fn prune(
    entries: Vec<LogRecord>,
    now: DateTime<Utc>,
    retention_days: i64,
    max_entries: usize,
) -> Vec<LogRecord> {
    let days = retention_days.clamp(1, fieldlink_core::config::MAX_RETENTION_DAYS);
    let cutoff = now - chrono::Duration::days(days);
    let mut kept: Vec<LogRecord> = entries
        .into_iter()
        .filter(|entry| {
            if entry.timestamp.is_empty() {
                return false;
            }
            match DateTime::parse_from_rfc3339(&entry.timestamp) {
                Ok(ts) => ts.with_timezone(&Utc) >= cutoff,
                Err(_) => true,
            }
        })
        .collect();

    if kept.len() > max_entries {
        kept.drain(..kept.len() - max_entries);
    }
    kept
}

async fn write_atomic(path: &Path, entries: &[LogRecord]) -> Result<(), ControlLogError> {
    let io_err = |source| ControlLogError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let content = serde_json::to_vec_pretty(entries)?;
    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    let mut file = tokio::fs::File::create(&tmp_path).await.map_err(io_err)?;
    file.write_all(&content).await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await.map_err(io_err)?;
    Ok(())
}

/// Stable SHA-256 over `{"control": .., "sensor": ..}` with sorted keys.
pub fn record_hash(sensor: &Value, control: &Value) -> String {
    let combined = canonical(&json!({ "sensor": sensor, "control": control }));
    let mut hasher = Sha256::new();
    hasher.update(combined.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonical(v))).collect();
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}
