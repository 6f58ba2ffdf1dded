/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use slog::{Logger, slog_debug, slog_o};

use super::Repository;
use crate::error::StoreError;
use crate::types::{Metric, MetricType, MetricValue};

type GaugeMap = IndexMap<Arc<str>, Metric>;
type CounterMap = IndexMap<Arc<str>, Vec<Metric>>;

/// In-process store with independent locks for gauges and counters.
///
/// Counters keep every delta in arrival order; the current value is the sum.
pub struct MemoryRepository {
    logger: Logger,
    gauge: RwLock<GaugeMap>,
    counter: RwLock<CounterMap>,
}

fn unique_names<'a>(names: &[&'a str]) -> IndexSet<&'a str> {
    names.iter().copied().collect()
}

impl MemoryRepository {
    pub fn new(logger: &Logger) -> Self {
        MemoryRepository {
            logger: logger.new(slog_o!("component" => "memory_repo")),
            gauge: RwLock::new(IndexMap::new()),
            counter: RwLock::new(IndexMap::new()),
        }
    }

    fn save_gauges(&self, metrics: &[&Metric]) {
        if metrics.is_empty() {
            return;
        }
        let mut map = self.gauge.write().unwrap_or_else(|e| e.into_inner());
        for m in metrics {
            map.insert(Arc::from(m.name()), (*m).clone());
        }
    }

    fn save_counters(&self, metrics: &[&Metric]) {
        if metrics.is_empty() {
            return;
        }
        let mut map = self.counter.write().unwrap_or_else(|e| e.into_inner());
        for m in metrics {
            match map.get_mut(m.name()) {
                Some(list) => list.push((*m).clone()),
                None => {
                    map.insert(Arc::from(m.name()), vec![(*m).clone()]);
                }
            }
        }
    }

    fn get_gauges(&self, names: &[&str]) -> Vec<Metric> {
        let map = self.gauge.read().unwrap_or_else(|e| e.into_inner());
        if names.is_empty() {
            map.values().cloned().collect()
        } else {
            unique_names(names)
                .into_iter()
                .filter_map(|n| map.get(n).cloned())
                .collect()
        }
    }

    fn get_counters(&self, names: &[&str]) -> Vec<Metric> {
        let map = self.counter.read().unwrap_or_else(|e| e.into_inner());
        if names.is_empty() {
            map.values().flatten().cloned().collect()
        } else {
            unique_names(names)
                .into_iter()
                .filter_map(|n| map.get(n))
                .flatten()
                .cloned()
                .collect()
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn save(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        let mut gauges = Vec::new();
        let mut counters = Vec::new();
        for m in metrics {
            match m.value() {
                MetricValue::Gauge(_) => gauges.push(m),
                MetricValue::Counter(_) => counters.push(m),
            }
        }
        self.save_gauges(&gauges);
        self.save_counters(&counters);
        slog_debug!(self.logger, "metrics saved";
            "gauges" => gauges.len(),
            "counters" => counters.len(),
        );
        Ok(())
    }

    async fn get(&self, kind: MetricType, names: &[&str]) -> Result<Vec<Metric>, StoreError> {
        let metrics = match kind {
            MetricType::Gauge => self.get_gauges(names),
            MetricType::Counter => self.get_counters(names),
        };
        Ok(metrics)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) {}
}
