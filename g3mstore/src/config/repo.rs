/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow};
use yaml_rust::{Yaml, yaml};

use super::value;
use crate::repo::sql::DEFAULT_RETRY_DELAYS;

const CONFIG_KEY_REPOSITORY_TYPE: &str = "type";

const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq)]
pub enum AnyRepositoryConfig {
    Memory,
    Sqlite(SqlRepositoryConfig),
}

impl AnyRepositoryConfig {
    pub fn repository_type(&self) -> &'static str {
        match self {
            AnyRepositoryConfig::Memory => "memory",
            AnyRepositoryConfig::Sqlite(_) => "sqlite",
        }
    }

    pub(crate) fn parse(v: &Yaml) -> anyhow::Result<Self> {
        let Yaml::Hash(map) = v else {
            return Err(anyhow!("repository config should be a map"));
        };

        let repo_type = value::hash_get_required_str(map, CONFIG_KEY_REPOSITORY_TYPE)?;
        match value::normalize_key(repo_type).as_str() {
            "memory" => {
                value::foreach_kv(map, |k, _| match value::normalize_key(k).as_str() {
                    CONFIG_KEY_REPOSITORY_TYPE => Ok(()),
                    _ => Err(anyhow!("invalid key {k}")),
                })
                .context("failed to load this Memory repository")?;
                Ok(AnyRepositoryConfig::Memory)
            }
            "sqlite" | "sql" => {
                let config = SqlRepositoryConfig::parse(map)
                    .context("failed to load this Sqlite repository")?;
                Ok(AnyRepositoryConfig::Sqlite(config))
            }
            _ => Err(anyhow!("unsupported repository type {repo_type}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SqlRepositoryConfig {
    pub path: PathBuf,
    /// Sleep before each attempt, one entry per attempt.
    pub retry_delays: Vec<Duration>,
    /// Max idle connections kept in the pool.
    pub pool_size: usize,
    pub busy_timeout: Duration,
}

impl SqlRepositoryConfig {
    pub fn new(path: PathBuf) -> Self {
        SqlRepositoryConfig {
            path,
            retry_delays: DEFAULT_RETRY_DELAYS.to_vec(),
            pool_size: DEFAULT_POOL_SIZE,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    fn parse(map: &yaml::Hash) -> anyhow::Result<Self> {
        let mut config = SqlRepositoryConfig::new(PathBuf::new());
        value::foreach_kv(map, |k, v| config.set(k, v))?;
        config.check()?;
        Ok(config)
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match value::normalize_key(k).as_str() {
            CONFIG_KEY_REPOSITORY_TYPE => Ok(()),
            "path" => {
                self.path = value::as_path(v).context(format!("invalid path value for key {k}"))?;
                Ok(())
            }
            "retry_delays" => {
                self.retry_delays = value::as_list(v, value::as_duration)
                    .context(format!("invalid list of durations for key {k}"))?;
                Ok(())
            }
            "pool_size" => {
                self.pool_size =
                    value::as_usize(v).context(format!("invalid usize value for key {k}"))?;
                Ok(())
            }
            "busy_timeout" => {
                self.busy_timeout = value::as_duration(v)
                    .context(format!("invalid humanize duration value for key {k}"))?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    fn check(&mut self) -> anyhow::Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(anyhow!("path is not set"));
        }
        if self.pool_size == 0 {
            self.pool_size = 1;
        }
        Ok(())
    }
}
