/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use slog::{Logger, slog_error, slog_info, slog_o, slog_warn};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::config::DumpConfig;
use crate::error::StoreError;
use crate::repo::{ArcRepository, Repository};
use crate::types::{Metric, MetricType};

mod line;

mod task;
use task::SnapshotTask;

/// Result of replaying the dump file at startup.
#[derive(Debug, Default)]
pub struct RestoreSummary {
    /// Distinct gauge names restored.
    pub gauges: usize,
    /// Counter lines replayed.
    pub counters: usize,
    /// Number of lines that could not be restored.
    pub skipped: usize,
    /// All line errors joined together.
    pub error: Option<StoreError>,
    /// Whether the lines were saved into the inner repository. A backend
    /// that already holds data is the source of truth and only rewrites
    /// the file.
    pub replayed: bool,
}

struct DumpCore {
    logger: Logger,
    inner: ArcRepository,
    path: PathBuf,
    tmp_path: PathBuf,
    sync: bool,
    // also serves as the dumper lock
    file: tokio::sync::Mutex<Option<File>>,
}

impl DumpCore {
    async fn open_append(&self) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
    }

    async fn snapshot(&self) -> Result<usize, StoreError> {
        let mut file = self.file.lock().await;
        self.snapshot_locked(&mut file).await
    }

    /// Rewrite the whole file with the reduced view of the inner repository.
    async fn snapshot_locked(&self, file: &mut Option<File>) -> Result<usize, StoreError> {
        let gauges = self.inner.get_reduced(MetricType::Gauge, &[]).await?;
        let counters = self.inner.get_reduced(MetricType::Counter, &[]).await?;
        let content = line::encode_all(gauges.iter().chain(counters.iter()));

        let mut tmp = File::create(&self.tmp_path).await?;
        tmp.write_all(content.as_bytes()).await?;
        tmp.sync_all().await?;
        drop(tmp);
        tokio::fs::rename(&self.tmp_path, &self.path).await?;

        if self.sync {
            // the old handle points to the replaced file
            *file = Some(self.open_append().await?);
        }
        Ok(gauges.len() + counters.len())
    }

    async fn append_locked(
        &self,
        file: &mut Option<File>,
        metrics: &[Metric],
    ) -> Result<(), StoreError> {
        if file.is_none() {
            *file = Some(self.open_append().await?);
        }
        if let Some(f) = file.as_mut() {
            let content = line::encode_all(metrics);
            f.write_all(content.as_bytes()).await?;
            f.flush().await?;
        }
        Ok(())
    }

    async fn restore(&self) -> Result<RestoreSummary, StoreError> {
        let mut file = self.file.lock().await;

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let parsed = line::parse_dump(&content);
        let gauges = parsed.gauges.len();
        let counters = parsed.counters.len();
        let (metrics, errors) = parsed.into_metrics();

        let replayed = self.inner_is_empty().await?;
        if replayed {
            self.inner.save(&metrics).await?;
        } else {
            slog_info!(self.logger, "inner repository is not empty, skip replay");
        }
        self.snapshot_locked(&mut file).await?;

        Ok(RestoreSummary {
            gauges,
            counters,
            skipped: errors.len(),
            error: StoreError::join(errors),
            replayed,
        })
    }

    async fn inner_is_empty(&self) -> Result<bool, StoreError> {
        for kind in [MetricType::Gauge, MetricType::Counter] {
            if !self.inner.get_reduced(kind, &[]).await?.is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn truncate(&self) -> Result<(), StoreError> {
        let mut file = self.file.lock().await;
        *file = Some(File::create(&self.path).await?);
        Ok(())
    }
}

/// Repository wrapper keeping a local text log of the inner repository.
///
/// With a zero interval every save is appended to the log before returning,
/// otherwise a background task rewrites the log periodically and once more
/// on close.
pub struct Dumper {
    core: Arc<DumpCore>,
    task: Mutex<Option<SnapshotTask>>,
    restored: Option<RestoreSummary>,
    closed: AtomicBool,
}

impl Dumper {
    pub async fn new(
        inner: ArcRepository,
        config: &DumpConfig,
        logger: &Logger,
    ) -> Result<Self, StoreError> {
        let logger = logger.new(slog_o!(
            "component" => "dumper",
            "path" => config.path.display().to_string(),
        ));
        let mut tmp_path = OsString::from(config.path.as_os_str());
        tmp_path.push(".tmp");

        let core = Arc::new(DumpCore {
            logger,
            inner,
            path: config.path.clone(),
            tmp_path: PathBuf::from(tmp_path),
            sync: config.is_sync(),
            file: tokio::sync::Mutex::new(None),
        });

        let restored = if config.restore {
            let summary = core.restore().await?;
            slog_info!(core.logger, "dump file restored";
                "gauges" => summary.gauges,
                "counters" => summary.counters,
                "replayed" => summary.replayed,
            );
            if let Some(e) = &summary.error {
                slog_warn!(core.logger, "skipped dumped lines: {}", e; "skipped" => summary.skipped);
            }
            Some(summary)
        } else {
            if core.sync {
                core.truncate().await?;
            }
            None
        };

        let task = if core.sync {
            None
        } else {
            Some(SnapshotTask::spawn(Arc::clone(&core), config.interval))
        };

        Ok(Dumper {
            core,
            task: Mutex::new(task),
            restored,
            closed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.core.path
    }

    pub fn restore_summary(&self) -> Option<&RestoreSummary> {
        self.restored.as_ref()
    }

    /// Rewrite the dump file now.
    pub async fn dump(&self) -> Result<usize, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        self.core.snapshot().await
    }
}

#[async_trait]
impl Repository for Dumper {
    async fn save(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        let mut file = self.core.file.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }

        self.core.inner.save(metrics).await?;
        if self.core.sync && !metrics.is_empty() {
            self.core.append_locked(&mut file, metrics).await?;
        }
        Ok(())
    }

    async fn get(&self, kind: MetricType, names: &[&str]) -> Result<Vec<Metric>, StoreError> {
        self.core.inner.get(kind, names).await
    }

    async fn get_reduced(
        &self,
        kind: MetricType,
        names: &[&str],
    ) -> Result<Vec<Metric>, StoreError> {
        self.core.inner.get_reduced(kind, names).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.core.inner.ping().await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.stop().await {
                slog_error!(self.core.logger, "failed to join snapshot task: {}", e);
            }
        }

        if let Some(f) = self.core.file.lock().await.take() {
            if let Err(e) = f.sync_all().await {
                slog_warn!(self.core.logger, "failed to sync dump file: {}", e);
            }
        }

        self.core.inner.close().await;
        slog_info!(self.core.logger, "dumper closed");
    }
}
