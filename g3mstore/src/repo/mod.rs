/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Metric, MetricType};

mod memory;
pub use memory::MemoryRepository;

pub mod sql;
pub use sql::SqlRepository;

/// Storage contract shared by all backends and by the dump wrapper.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Apply all metrics: gauges overwrite, counters accumulate.
    async fn save(&self, metrics: &[Metric]) -> Result<(), StoreError>;

    /// Raw samples of `kind`, filtered by `names` if it is not empty.
    ///
    /// Counters are returned as stored, which may be one sample per delta.
    async fn get(&self, kind: MetricType, names: &[&str]) -> Result<Vec<Metric>, StoreError>;

    /// Same as [`Repository::get`], with at most one metric per name and
    /// counters summed.
    async fn get_reduced(
        &self,
        kind: MetricType,
        names: &[&str],
    ) -> Result<Vec<Metric>, StoreError> {
        let samples = self.get(kind, names).await?;
        let reduced = crate::types::reduce_metrics(samples)?;
        Ok(reduced)
    }

    async fn ping(&self) -> Result<(), StoreError>;

    async fn close(&self);
}

pub type ArcRepository = Arc<dyn Repository>;
