// src/monitor/journal.rs

use std::path::{ Path, PathBuf };

use anyhow::{ Context, Result };
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::{ AsyncWriteExt, BufWriter };
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{ error, info, warn };

use crate::models::opportunity::OpportunityReport;
use crate::models::order::OrderStatusEvent;

/// Receives order status changes, never blocks the caller
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OrderStatusEvent);
}

/// Receives finalized opportunities
pub trait ReportSink: Send + Sync {
    fn report(&self, report: OpportunityReport);
}

/// Append-only JSON-lines file fed through a channel
pub struct JsonlJournal<T> {
    tx: mpsc::UnboundedSender<T>,
    path: PathBuf,
}

impl<T> JsonlJournal<T> where T: Serialize + Send + 'static {
    /// Open (or create) `path` and spawn the writer task.
    ///
    /// The task drains the channel and ends once every journal handle is dropped.
    pub async fn open(path: impl AsRef<Path>) -> Result<(Self, JoinHandle<()>)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs
                ::create_dir_all(parent).await
                .with_context(|| format!("Failed to create journal directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path).await
            .with_context(|| format!("Failed to open journal {}", path.display()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(write_records(rx, BufWriter::new(file), path.clone()));
        info!(path = %path.display(), "Journal opened");

        Ok((Self { tx, path }, handle))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn push(&self, record: T) {
        if self.tx.send(record).is_err() {
            warn!(path = %self.path.display(), "Journal writer is gone, record dropped");
        }
    }
}

async fn write_records<T: Serialize>(
    mut rx: mpsc::UnboundedReceiver<T>,
    mut writer: BufWriter<tokio::fs::File>,
    path: PathBuf
) {
    while let Some(record) = rx.recv().await {
        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(e) => {
                error!(path = %path.display(), "Failed to serialize journal record: {}", e);
                continue;
            }
        };
        line.push(b'\n');

        if let Err(e) = writer.write_all(&line).await {
            error!(path = %path.display(), "Failed to write journal record: {}", e);
            continue;
        }
        // flush once the burst is written
        if rx.is_empty() {
            if let Err(e) = writer.flush().await {
                error!(path = %path.display(), "Failed to flush journal: {}", e);
            }
        }
    }

    if let Err(e) = writer.flush().await {
        error!(path = %path.display(), "Failed to flush journal: {}", e);
    }
}

impl EventSink for JsonlJournal<OrderStatusEvent> {
    fn emit(&self, event: OrderStatusEvent) {
        self.push(event);
    }
}

impl ReportSink for JsonlJournal<OpportunityReport> {
    fn report(&self, report: OpportunityReport) {
        self.push(report);
    }
}

/// Keeps records in memory
#[cfg(test)]
pub struct MemoryJournal<T> {
    records: parking_lot::Mutex<Vec<T>>,
}

#[cfg(test)]
impl<T: Clone> MemoryJournal<T> {
    pub fn new() -> Self {
        Self {
            records: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<T> {
        self.records.lock().clone()
    }
}

#[cfg(test)]
impl EventSink for MemoryJournal<OrderStatusEvent> {
    fn emit(&self, event: OrderStatusEvent) {
        self.records.lock().push(event);
    }
}

#[cfg(test)]
impl ReportSink for MemoryJournal<OpportunityReport> {
    fn report(&self, report: OpportunityReport) {
        self.records.lock().push(report);
    }
}
