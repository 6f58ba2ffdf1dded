/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use slog::{Logger, slog_info};

pub mod config;
pub mod dump;
pub mod error;
pub mod log;
pub mod opts;
pub mod repo;
pub mod service;
pub mod types;

use config::{AnyRepositoryConfig, StoreConfig};
use dump::Dumper;
use error::StoreError;
use repo::{ArcRepository, MemoryRepository, SqlRepository};
use service::MetricService;

/// Build the configured backend, wrapped by the dumper if one is set.
pub async fn build_repository(
    config: &StoreConfig,
    logger: &Logger,
) -> Result<ArcRepository, StoreError> {
    let backend: ArcRepository = match &config.repository {
        AnyRepositoryConfig::Memory => Arc::new(MemoryRepository::new(logger)),
        AnyRepositoryConfig::Sqlite(c) => Arc::new(SqlRepository::open(c, logger).await?),
    };
    slog_info!(logger, "repository ready";
        "type" => config.repository.repository_type(),
    );

    let Some(dump_config) = &config.dump else {
        return Ok(backend);
    };
    match Dumper::new(Arc::clone(&backend), dump_config, logger).await {
        Ok(dumper) => Ok(Arc::new(dumper)),
        Err(e) => {
            backend.close().await;
            Err(e)
        }
    }
}

pub async fn build_service(
    config: &StoreConfig,
    logger: &Logger,
) -> Result<MetricService, StoreError> {
    let repo = build_repository(config, logger).await?;
    Ok(MetricService::new(repo, logger))
}
