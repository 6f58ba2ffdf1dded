/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::io;

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::types::MetricType;

/// Joined list of errors, displayed as `e1; e2; ...`.
#[derive(Debug)]
pub struct ErrorList<E>(pub Vec<E>);

impl<E> ErrorList<E> {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.0.iter()
    }
}

impl<E: fmt::Display> fmt::Display for ErrorList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.0.iter();
        let Some(first) = iter.next() else {
            return f.write_str("no error");
        };
        write!(f, "{first}")?;
        for e in iter {
            write!(f, "; {e}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("failed to convert raw value {0:?}")]
    ConvertingRawValue(String),
    #[error("unknown metric type {0:?}")]
    UnknownMetricType(String),
    #[error("metric type mismatch: expect {expected}, actual {actual}")]
    TypeMismatch {
        expected: MetricType,
        actual: MetricType,
    },
    #[error("empty metric name")]
    EmptyName,
    #[error("counter {0} overflowed")]
    Overflow(String),
    #[error("{0}")]
    Multiple(ErrorList<MetricError>),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid metric: {0}")]
    Metric(#[from] MetricError),
    #[error("metric {kind} {name} is not exist")]
    MetricIsNotExist { kind: MetricType, name: String },
    #[error("wrong dumped line {line_no}: {line:?}")]
    WrongDumpedLine { line_no: usize, line: String },
    #[error("sql operation failed: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("io failed: {0}")]
    Io(#[from] io::Error),
    #[error("operation cancelled")]
    Cancelled,
    #[error("repository closed")]
    Closed,
    #[error("{op} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        op: &'static str,
        attempts: usize,
        source: Box<StoreError>,
    },
    #[error("task join failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
    #[error("{0}")]
    Multiple(ErrorList<StoreError>),
}

fn is_transient_sql_error(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(f, _) => matches!(
            f.code,
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
        ),
        _ => false,
    }
}

impl StoreError {
    /// Whether the repeater may try the failed operation again.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Sql(e) => is_transient_sql_error(e),
            StoreError::Io(_) => true,
            StoreError::Multiple(list) => list.iter().any(StoreError::is_retryable),
            StoreError::Metric(_)
            | StoreError::MetricIsNotExist { .. }
            | StoreError::WrongDumpedLine { .. }
            | StoreError::Cancelled
            | StoreError::Closed
            | StoreError::RetryExhausted { .. }
            | StoreError::TaskJoin(_) => false,
        }
    }

    /// Collapse a list of errors, returning `None` if it is empty.
    pub fn join(mut errors: Vec<StoreError>) -> Option<StoreError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(StoreError::Multiple(ErrorList(errors))),
        }
    }
}
