/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, params, params_from_iter};
use slog::{Logger, slog_info, slog_o};
use tokio_util::sync::CancellationToken;

use super::Repository;
use crate::config::SqlRepositoryConfig;
use crate::error::{MetricError, StoreError};
use crate::types::{Metric, MetricType, MetricValue};

mod pool;
use pool::SqlPool;

mod repeater;
pub use repeater::{DEFAULT_RETRY_DELAYS, Repeater};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS gauges (
    id TEXT PRIMARY KEY,
    value DOUBLE PRECISION NOT NULL
);
CREATE TABLE IF NOT EXISTS counters (
    id TEXT NOT NULL,
    value BIGINT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS counters_id_idx ON counters (id);
";

const UPSERT_GAUGE_SQL: &str = "INSERT INTO gauges (id, value) VALUES (?1, ?2) \
     ON CONFLICT(id) DO UPDATE SET value = excluded.value";
const INSERT_COUNTER_SQL: &str = "INSERT INTO counters (id, value, created_at) VALUES (?1, ?2, ?3)";

/// SQLite backed repository.
///
/// Gauges are upserted, counters keep one row per delta. Every call goes
/// through the [`Repeater`].
pub struct SqlRepository {
    logger: Logger,
    pool: Arc<SqlPool>,
    repeater: Repeater,
    closed: CancellationToken,
}

impl SqlRepository {
    /// Open the database, create the schema and check it is reachable.
    pub async fn open(config: &SqlRepositoryConfig, logger: &Logger) -> Result<Self, StoreError> {
        let logger = logger.new(slog_o!(
            "component" => "sql_repo",
            "path" => config.path.display().to_string(),
        ));
        let closed = CancellationToken::new();
        let repo = SqlRepository {
            pool: SqlPool::new(config.path.clone(), config.busy_timeout, config.pool_size),
            repeater: Repeater::new(&config.retry_delays, closed.clone(), &logger),
            closed,
            logger,
        };

        repo.call("init", |c| c.execute_batch(SCHEMA_SQL)).await?;
        repo.ping().await?;
        slog_info!(repo.logger, "sql repository opened";
            "max_attempts" => repo.repeater.max_attempts(),
        );
        Ok(repo)
    }

    async fn call<T, F>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        F: Fn(&mut Connection) -> Result<T, rusqlite::Error> + Send + Sync + 'static,
        T: Send + 'static,
    {
        if self.closed.is_cancelled() {
            return Err(StoreError::Closed);
        }

        let f = Arc::new(f);
        self.repeater
            .run(op, || {
                let pool = Arc::clone(&self.pool);
                let f = Arc::clone(&f);
                async move { pool.with_conn(move |c| f(c)).await }
            })
            .await
    }
}

fn save_sync(
    conn: &mut Connection,
    gauges: &[(String, f64)],
    counters: &[(String, i64)],
) -> Result<(), rusqlite::Error> {
    let now = Utc::now().timestamp_millis();

    if gauges.len() + counters.len() == 1 {
        if let Some((id, value)) = gauges.first() {
            conn.execute(UPSERT_GAUGE_SQL, params![id, value])?;
        }
        if let Some((id, delta)) = counters.first() {
            conn.execute(INSERT_COUNTER_SQL, params![id, delta, now])?;
        }
        return Ok(());
    }

    // dropping an uncommitted transaction rolls it back
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(UPSERT_GAUGE_SQL)?;
        for (id, value) in gauges {
            stmt.execute(params![id, value])?;
        }
        let mut stmt = tx.prepare_cached(INSERT_COUNTER_SQL)?;
        for (id, delta) in counters {
            stmt.execute(params![id, delta, now])?;
        }
    }
    tx.commit()
}

fn name_filter(names: &[String]) -> String {
    if names.is_empty() {
        return String::new();
    }
    let mut s = String::from(" WHERE id IN (");
    for i in 0..names.len() {
        if i > 0 {
            s.push_str(", ");
        }
        s.push('?');
    }
    s.push(')');
    s
}

fn query_gauges(conn: &mut Connection, names: &[String]) -> Result<Vec<Metric>, rusqlite::Error> {
    let sql = format!(
        "SELECT id, value FROM gauges{} ORDER BY rowid",
        name_filter(names)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(names.iter()), |row| {
        let id: String = row.get(0)?;
        let value: f64 = row.get(1)?;
        Ok(Metric::gauge(&id, value))
    })?;
    rows.collect()
}

fn query_counters(
    conn: &mut Connection,
    names: &[String],
    summed: bool,
) -> Result<Vec<Metric>, rusqlite::Error> {
    let sql = if summed {
        format!(
            "SELECT id, SUM(value) FROM counters{} GROUP BY id ORDER BY MIN(rowid)",
            name_filter(names)
        )
    } else {
        format!(
            "SELECT id, value FROM counters{} ORDER BY rowid",
            name_filter(names)
        )
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(names.iter()), |row| {
        let id: String = row.get(0)?;
        let value: i64 = row.get(1)?;
        Ok(Metric::counter(&id, value))
    })?;
    rows.collect()
}

impl SqlRepository {
    async fn query(
        &self,
        kind: MetricType,
        names: &[&str],
        summed: bool,
    ) -> Result<Vec<Metric>, StoreError> {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        match kind {
            MetricType::Gauge => self.call("query", move |c| query_gauges(c, &names)).await,
            MetricType::Counter => {
                let filter = names.join(",");
                self.call("query", move |c| query_counters(c, &names, summed))
                    .await
                    .map_err(|e| map_sum_overflow(e, filter))
            }
        }
    }
}

// SUM() over INTEGER columns fails instead of wrapping
fn map_sum_overflow(e: StoreError, filter: String) -> StoreError {
    match &e {
        StoreError::Sql(rusqlite::Error::SqliteFailure(_, Some(msg)))
            if msg == "integer overflow" =>
        {
            let name = if filter.is_empty() {
                "*".to_string()
            } else {
                filter
            };
            MetricError::Overflow(name).into()
        }
        _ => e,
    }
}

#[async_trait]
impl Repository for SqlRepository {
    async fn save(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        if metrics.is_empty() {
            return Ok(());
        }

        let mut gauges = Vec::new();
        let mut counters = Vec::new();
        for m in metrics {
            match m.value() {
                MetricValue::Gauge(v) => gauges.push((m.name().to_string(), v)),
                MetricValue::Counter(d) => counters.push((m.name().to_string(), d)),
            }
        }

        self.call("exec", move |c| save_sync(c, &gauges, &counters)).await
    }

    async fn get(&self, kind: MetricType, names: &[&str]) -> Result<Vec<Metric>, StoreError> {
        self.query(kind, names, false).await
    }

    async fn get_reduced(
        &self,
        kind: MetricType,
        names: &[&str],
    ) -> Result<Vec<Metric>, StoreError> {
        self.query(kind, names, true).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.call("ping", |c| c.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .map(|_| ())
    }

    async fn close(&self) {
        if !self.closed.is_cancelled() {
            self.closed.cancel();
            self.pool.clear();
            slog_info!(self.logger, "sql repository closed");
        }
    }
}
