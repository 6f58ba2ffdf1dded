/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

use crate::error::StoreError;

/// Lazily opened SQLite connections, shared by all repository calls.
pub(super) struct SqlPool {
    path: PathBuf,
    busy_timeout: Duration,
    max_idle: usize,
    idle: Mutex<Vec<Connection>>,
}

impl SqlPool {
    pub(super) fn new(path: PathBuf, busy_timeout: Duration, max_idle: usize) -> Arc<Self> {
        Arc::new(SqlPool {
            path,
            busy_timeout,
            max_idle,
            idle: Mutex::new(Vec::with_capacity(max_idle)),
        })
    }

    fn open(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(conn)
    }

    fn acquire(&self) -> Result<Connection, rusqlite::Error> {
        let conn = self.idle.lock().unwrap_or_else(|e| e.into_inner()).pop();
        match conn {
            Some(conn) => Ok(conn),
            None => self.open(),
        }
    }

    fn release(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }

    #[cfg(test)]
    pub(super) fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub(super) fn clear(&self) {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Run `f` on a pooled connection inside the blocking thread pool.
    ///
    /// The connection is put back only if `f` succeeded.
    pub(super) async fn with_conn<T, F>(self: &Arc<Self>, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(self);
        tokio::task::spawn_blocking(move || -> Result<T, StoreError> {
            let mut conn = pool.acquire()?;
            let v = f(&mut conn)?;
            pool.release(conn);
            Ok(v)
        })
        .await?
    }
}
