/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use slog::{Logger, slog_debug, slog_o, slog_warn};
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;

/// Default backoff: immediate try, then after 1s, then after 3s.
pub const DEFAULT_RETRY_DELAYS: [Duration; 3] = [
    Duration::ZERO,
    Duration::from_secs(1),
    Duration::from_secs(3),
];

/// Runs a remote operation with a fixed list of delays.
///
/// Attempt `i` starts after sleeping `delays[i]`, so the operation is tried
/// at most `delays.len()` times (at least once for an empty list).
#[derive(Clone)]
pub struct Repeater {
    delays: Arc<[Duration]>,
    cancel: CancellationToken,
    logger: Logger,
}

impl Repeater {
    pub fn new(delays: &[Duration], cancel: CancellationToken, logger: &Logger) -> Self {
        Repeater {
            delays: Arc::from(delays),
            cancel,
            logger: logger.new(slog_o!("component" => "repeater")),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len().max(1)
    }

    /// Run `f` until it succeeds, fails with a non-retryable error, or the
    /// delay list is used up.
    ///
    /// Cancellation only stops the wait. A blocking SQLite call that has
    /// already started keeps running on its worker thread and may still
    /// commit, so `Cancelled` does not mean the write was not applied.
    pub async fn run<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.max_attempts();
        let mut last_err = None;

        for attempt in 0..max_attempts {
            let delay = self.delays.get(attempt).copied().unwrap_or_default();
            if !delay.is_zero() {
                tokio::select! {
                    biased;

                    _ = self.cancel.cancelled() => return Err(StoreError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            } else if self.cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }

            let r = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Err(StoreError::Cancelled),
                r = f() => r,
            };
            match r {
                Ok(v) => {
                    if attempt > 0 {
                        slog_debug!(self.logger, "{} succeeded after retry", op; "attempt" => attempt + 1);
                    }
                    return Ok(v);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    slog_warn!(self.logger, "{} failed: {}", op, e;
                        "attempt" => attempt + 1,
                        "max_attempts" => max_attempts,
                    );
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if max_attempts > 1 => Err(StoreError::RetryExhausted {
                op,
                attempts: max_attempts,
                source: Box::new(e),
            }),
            Some(e) => Err(e),
            None => Err(StoreError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn new_repeater(delays: &[Duration]) -> (Repeater, CancellationToken) {
        let cancel = CancellationToken::new();
        let r = Repeater::new(delays, cancel.clone(), &crate::log::discard_logger());
        (r, cancel)
    }

    fn transient() -> StoreError {
        StoreError::Io(io::Error::other("connection reset"))
    }

    #[tokio::test(start_paused = true)]
    async fn fail_once_then_succeed() {
        let (repeater, _cancel) = new_repeater(&[Duration::ZERO, Duration::from_secs(1)]);
        let calls = &AtomicUsize::new(0);
        let start = tokio::time::Instant::now();

        let v = repeater
            .run("exec", || async move {
                if calls.fetch_add(1, Ordering::Relaxed) == 0 {
                    Err(transient())
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(v, 7);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn always_fail() {
        let (repeater, _cancel) = new_repeater(&DEFAULT_RETRY_DELAYS);
        let calls = &AtomicUsize::new(0);

        let e = repeater
            .run("query", || async move {
                calls.fetch_add(1, Ordering::Relaxed);
                Err::<(), _>(transient())
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        let StoreError::RetryExhausted { attempts, source, .. } = e else {
            panic!("expect retry exhausted error");
        };
        assert_eq!(attempts, 3);
        assert!(matches!(*source, StoreError::Io(_)));
    }

    #[tokio::test]
    async fn no_retry_on_validation_error() {
        let (repeater, _cancel) = new_repeater(&DEFAULT_RETRY_DELAYS);
        let calls = &AtomicUsize::new(0);

        let e = repeater
            .run("exec", || async move {
                calls.fetch_add(1, Ordering::Relaxed);
                Err::<(), _>(StoreError::Metric(crate::error::MetricError::EmptyName))
            })
            .await
            .unwrap_err();
        assert!(matches!(e, StoreError::Metric(_)));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    fn sqlite_failure(code: std::ffi::c_int) -> StoreError {
        StoreError::Sql(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            None,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn sql_error_kinds() {
        let (repeater, _cancel) = new_repeater(&DEFAULT_RETRY_DELAYS);

        let calls = &AtomicUsize::new(0);
        let e = repeater
            .run("exec", || async move {
                calls.fetch_add(1, Ordering::Relaxed);
                Err::<(), _>(sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT))
            })
            .await
            .unwrap_err();
        assert!(matches!(e, StoreError::Sql(_)));
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        let calls = &AtomicUsize::new(0);
        let e = repeater
            .run("query", || async move {
                calls.fetch_add(1, Ordering::Relaxed);
                Err::<(), _>(StoreError::Sql(rusqlite::Error::QueryReturnedNoRows))
            })
            .await
            .unwrap_err();
        assert!(matches!(e, StoreError::Sql(_)));
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        let calls = &AtomicUsize::new(0);
        let v = repeater
            .run("exec", || async move {
                if calls.fetch_add(1, Ordering::Relaxed) == 0 {
                    Err(sqlite_failure(rusqlite::ffi::SQLITE_BUSY))
                } else {
                    Ok(1)
                }
            })
            .await
            .unwrap();
        assert_eq!(v, 1);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff() {
        let (repeater, cancel) = new_repeater(&[Duration::ZERO, Duration::from_secs(3600)]);
        let calls = Arc::new(AtomicUsize::new(0));

        let calls2 = calls.clone();
        let task = tokio::spawn(async move {
            repeater
                .run("ping", || {
                    let calls = calls2.clone();
                    async move {
                        calls.fetch_add(1, Ordering::Relaxed);
                        Err::<(), _>(transient())
                    }
                })
                .await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let r = task.await.unwrap();
        assert!(matches!(r, Err(StoreError::Cancelled)));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn empty_delays_try_once() {
        let (repeater, _cancel) = new_repeater(&[]);
        let calls = &AtomicUsize::new(0);
        let e = repeater
            .run("exec", || async move {
                calls.fetch_add(1, Ordering::Relaxed);
                Err::<(), _>(transient())
            })
            .await
            .unwrap_err();
        assert!(matches!(e, StoreError::Io(_)));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
