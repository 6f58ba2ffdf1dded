/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::time::Duration;

use slog::{slog_debug, slog_error, slog_info, slog_warn};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::DumpCore;
use crate::error::StoreError;

/// Background task rewriting the dump file every `period`.
///
/// It writes one more snapshot after being cancelled, then exits.
pub(super) struct SnapshotTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotTask {
    pub(super) fn spawn(core: Arc<DumpCore>, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(core, period, cancel.clone()));
        SnapshotTask {
            cancel,
            handle: Some(handle),
        }
    }

    pub(super) async fn stop(mut self) -> Result<(), StoreError> {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await?;
        }
        Ok(())
    }
}

impl Drop for SnapshotTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(core: Arc<DumpCore>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match core.snapshot().await {
                    Ok(n) => slog_debug!(core.logger, "periodic snapshot written"; "lines" => n),
                    Err(e) => slog_warn!(core.logger, "periodic snapshot failed: {}", e),
                }
            }
        }
    }

    match core.snapshot().await {
        Ok(n) => slog_info!(core.logger, "final snapshot written"; "lines" => n),
        Err(e) => slog_error!(core.logger, "final snapshot failed: {}", e),
    }
}
