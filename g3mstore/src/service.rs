/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use slog::{Logger, slog_debug, slog_info, slog_o};

use crate::error::{MetricError, StoreError};
use crate::repo::ArcRepository;
use crate::types::{Metric, MetricType};

/// Entry point used by the transport layer.
pub struct MetricService {
    logger: Logger,
    repo: ArcRepository,
}

impl MetricService {
    pub fn new(repo: ArcRepository, logger: &Logger) -> Self {
        MetricService {
            logger: logger.new(slog_o!("component" => "service")),
            repo,
        }
    }

    pub async fn save(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        if metrics.iter().any(|m| m.name().is_empty()) {
            return Err(MetricError::EmptyName.into());
        }
        self.repo.save(metrics).await
    }

    /// Parse and save one metric, then return its current value.
    pub async fn update(
        &self,
        name: &str,
        r#type: &str,
        raw_value: &str,
    ) -> Result<Metric, StoreError> {
        let metric = Metric::parse(name, raw_value, r#type)?;
        self.save(std::slice::from_ref(&metric)).await?;
        slog_debug!(self.logger, "metric updated";
            "name" => name,
            "type" => metric.r#type().as_str(),
        );
        self.get(metric.r#type(), name).await
    }

    /// Current value of one metric, counters summed.
    pub async fn get(&self, kind: MetricType, name: &str) -> Result<Metric, StoreError> {
        let mut found = self.repo.get_reduced(kind, &[name]).await?;
        match found.pop() {
            Some(m) => Ok(m),
            None => Err(StoreError::MetricIsNotExist {
                kind,
                name: name.to_string(),
            }),
        }
    }

    /// One metric per name, gauges first.
    pub async fn all(&self) -> Result<Vec<Metric>, StoreError> {
        let mut metrics = self.repo.get_reduced(MetricType::Gauge, &[]).await?;
        let counters = self.repo.get_reduced(MetricType::Counter, &[]).await?;
        metrics.extend(counters);
        Ok(metrics)
    }

    /// Every stored sample without any reduction.
    pub async fn stats(&self) -> Result<Vec<Metric>, StoreError> {
        let mut metrics = self.repo.get(MetricType::Gauge, &[]).await?;
        let counters = self.repo.get(MetricType::Counter, &[]).await?;
        metrics.extend(counters);
        Ok(metrics)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.repo.ping().await
    }

    pub async fn close(&self) {
        self.repo.close().await;
        slog_info!(self.logger, "metric service closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::repo::MemoryRepository;

    fn new_service() -> MetricService {
        let logger = crate::log::discard_logger();
        MetricService::new(Arc::new(MemoryRepository::new(&logger)), &logger)
    }

    #[tokio::test]
    async fn get_current_value() {
        let service = new_service();
        service.save(&[Metric::gauge("temp", 12.5)]).await.unwrap();
        service.save(&[Metric::gauge("temp", 13.0)]).await.unwrap();
        for d in [1, 2, 3] {
            service.save(&[Metric::counter("hits", d)]).await.unwrap();
        }

        let temp = service.get(MetricType::Gauge, "temp").await.unwrap();
        assert_eq!(temp.value_string(), "13.0");
        let hits = service.get(MetricType::Counter, "hits").await.unwrap();
        assert_eq!(hits.value_string(), "6");
    }

    #[tokio::test]
    async fn not_exist() {
        let service = new_service();
        service.save(&[Metric::gauge("temp", 1.0)]).await.unwrap();

        let e = service.get(MetricType::Counter, "temp").await.unwrap_err();
        assert!(matches!(
            e,
            StoreError::MetricIsNotExist {
                kind: MetricType::Counter,
                ..
            }
        ));
        assert!(service.get(MetricType::Gauge, "load").await.is_err());
    }

    #[tokio::test]
    async fn empty_name() {
        let service = new_service();
        let e = service
            .save(&[Metric::gauge("temp", 1.0), Metric::counter("", 1)])
            .await
            .unwrap_err();
        assert!(matches!(e, StoreError::Metric(MetricError::EmptyName)));
        assert!(service.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update() {
        let service = new_service();
        let m = service.update("hits", "counter", "4").await.unwrap();
        assert_eq!(m, Metric::counter("hits", 4));
        let m = service.update("hits", "Counter", "-1").await.unwrap();
        assert_eq!(m, Metric::counter("hits", 3));
        let m = service.update("temp", "gauge", "0.25").await.unwrap();
        assert_eq!(m, Metric::gauge("temp", 0.25));

        assert!(matches!(
            service.update("temp", "histogram", "1").await,
            Err(StoreError::Metric(MetricError::UnknownMetricType(_)))
        ));
        assert!(matches!(
            service.update("hits", "counter", "1.5").await,
            Err(StoreError::Metric(MetricError::ConvertingRawValue(_)))
        ));
    }

    #[tokio::test]
    async fn all_and_stats() {
        let service = new_service();
        service
            .save(&[
                Metric::counter("hits", 1),
                Metric::gauge("temp", 1.0),
                Metric::counter("hits", 2),
                Metric::gauge("temp", 2.0),
            ])
            .await
            .unwrap();

        assert_eq!(
            service.all().await.unwrap(),
            vec![Metric::gauge("temp", 2.0), Metric::counter("hits", 3)]
        );
        assert_eq!(
            service.stats().await.unwrap(),
            vec![
                Metric::gauge("temp", 2.0),
                Metric::counter("hits", 1),
                Metric::counter("hits", 2)
            ]
        );
        service.ping().await.unwrap();
        service.close().await;
    }
}
