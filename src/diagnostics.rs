use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::AppConfig;
use crate::errors::AppResult;

/// Where in the pipeline an address fell out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    RetryExhausted,
    NoSuggestions,
    Flatten,
    Scoring,
}

impl FailureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureStage::Fetch => "fetch",
            FailureStage::RetryExhausted => "retry_exhausted",
            FailureStage::NoSuggestions => "no_suggestions",
            FailureStage::Flatten => "flatten",
            FailureStage::Scoring => "scoring",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FailureRecord {
    pub stage: FailureStage,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

/// Collects per-address failures, appending them as JSON lines so a batch
/// can be rerun against exactly the rows that dropped out. Cheap to clone
/// and share across workers.
#[derive(Clone)]
pub struct DiagnosticsSink {
    queue: Arc<Mutex<Vec<FailureRecord>>>,
    counts: Arc<Mutex<HashMap<FailureStage, u64>>>,
    file_path: PathBuf,
    batch_size: usize,
}

impl DiagnosticsSink {
    pub fn new<P: AsRef<Path>>(log_dir: P, config: &AppConfig) -> AppResult<Self> {
        let log_dir = log_dir.as_ref();
        std::fs::create_dir_all(log_dir)?;
        let file_path = log_dir.join(&config.diagnostics_file_name);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;

        Ok(Self {
            queue: Arc::new(Mutex::new(Vec::new())),
            counts: Arc::new(Mutex::new(HashMap::new())),
            file_path,
            batch_size: config.diagnostics_batch_size,
        })
    }

    pub fn record(
        &self,
        stage: FailureStage,
        address: &str,
        attempt: Option<u32>,
        detail: impl Into<String>,
    ) -> AppResult<()> {
        *self.counts.lock().entry(stage).or_insert(0) += 1;

        let mut queue = self.queue.lock();
        queue.push(FailureRecord {
            stage,
            address: address.to_string(),
            attempt,
            detail: detail.into(),
            timestamp: Utc::now(),
        });
        if queue.len() >= self.batch_size {
            self.persist_locked(&mut queue)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> AppResult<()> {
        let mut queue = self.queue.lock();
        self.persist_locked(&mut queue)
    }

    /// Failures seen for one stage so far, buffered or not.
    pub fn count(&self, stage: FailureStage) -> u64 {
        self.counts.lock().get(&stage).copied().unwrap_or(0)
    }

    /// Non-zero stage totals, ordered by stage name for stable logs.
    pub fn totals(&self) -> Vec<(FailureStage, u64)> {
        let counts = self.counts.lock();
        let mut totals: Vec<_> = counts.iter().map(|(stage, n)| (*stage, *n)).collect();
        totals.sort_by_key(|(stage, _)| stage.as_str());
        totals
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    fn persist_locked(&self, queue: &mut Vec<FailureRecord>) -> AppResult<()> {
        if queue.is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        for record in queue.iter() {
            let line = serde_json::to_vec(record)?;
            file.write_all(&line)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        queue.clear();
        Ok(())
    }
}
