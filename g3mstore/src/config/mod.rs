/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::Path;

use anyhow::{Context, anyhow};
use slog::Level;
use yaml_rust::{Yaml, YamlLoader, yaml};

mod value;

mod dump;
mod repo;

pub use dump::DumpConfig;
pub use repo::{AnyRepositoryConfig, SqlRepositoryConfig};

#[derive(Clone, Debug, PartialEq)]
pub struct StoreConfig {
    pub log_level: Level,
    pub repository: AnyRepositoryConfig,
    pub dump: Option<DumpConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            log_level: Level::Info,
            repository: AnyRepositoryConfig::Memory,
            dump: None,
        }
    }
}

impl StoreConfig {
    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match value::normalize_key(k).as_str() {
            "log" => self.set_log(v),
            "repository" | "repo" => {
                self.repository = AnyRepositoryConfig::parse(v)?;
                Ok(())
            }
            "dump" => {
                self.dump = match v {
                    Yaml::Null => None,
                    _ => Some(DumpConfig::parse(v)?),
                };
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k} in main conf")),
        }
    }

    fn set_log(&mut self, v: &Yaml) -> anyhow::Result<()> {
        match v {
            Yaml::Hash(map) => value::foreach_kv(map, |k, v| match value::normalize_key(k).as_str()
            {
                "level" => {
                    self.log_level = as_log_level(v)?;
                    Ok(())
                }
                _ => Err(anyhow!("invalid key {k}")),
            }),
            _ => {
                self.log_level = as_log_level(v)?;
                Ok(())
            }
        }
    }
}

fn as_log_level(v: &Yaml) -> anyhow::Result<Level> {
    let s = value::as_string(v)?;
    let level = match s.to_lowercase().as_str() {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "info" => Level::Info,
        "warn" | "warning" => Level::Warning,
        "error" => Level::Error,
        "crit" | "critical" => Level::Critical,
        _ => return Err(anyhow!("invalid log level {s}")),
    };
    Ok(level)
}

fn load_doc(config: &mut StoreConfig, map: &yaml::Hash) -> anyhow::Result<()> {
    value::foreach_kv(map, |k, v| config.set(k, v))
}

/// Parse a config document, multiple yaml docs are merged in order.
pub fn parse_str(s: &str) -> anyhow::Result<StoreConfig> {
    let docs = YamlLoader::load_from_str(s).map_err(|e| anyhow!("invalid yaml: {e}"))?;
    let mut config = StoreConfig::default();
    for (i, doc) in docs.iter().enumerate() {
        match doc {
            Yaml::Hash(map) => {
                load_doc(&mut config, map).context(format!("failed to load yaml doc #{i}"))?
            }
            _ => return Err(anyhow!("yaml doc root should be hash")),
        }
    }
    Ok(config)
}

pub fn load(path: &Path) -> anyhow::Result<StoreConfig> {
    let content = std::fs::read_to_string(path)
        .context(format!("failed to read config file {}", path.display()))?;
    parse_str(&content).context(format!("failed to load config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn empty_doc() {
        let config = parse_str("").unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn full() {
        let config = parse_str(
            r#"
log:
  level: debug
repository:
  type: sqlite
  path: /var/lib/g3mstore/metrics.db
dump:
  path: /var/lib/g3mstore/metrics.log
  interval: 0
  restore: no
"#,
        )
        .unwrap();
        assert_eq!(config.log_level, Level::Debug);
        assert_eq!(config.repository.repository_type(), "sqlite");
        let dump = config.dump.unwrap();
        assert_eq!(dump.interval, Duration::ZERO);
        assert!(!dump.restore);
    }

    #[test]
    fn short_log_level() {
        let config = parse_str("log: warn").unwrap();
        assert_eq!(config.log_level, Level::Warning);
        assert!(parse_str("log: loud").is_err());
    }

    #[test]
    fn invalid() {
        assert!(parse_str("server: 1").is_err());
        assert!(parse_str("- a").is_err());
        assert!(parse_str("repository: {type: memory}\ndump: {interval: 1s}").is_err());
    }

    #[test]
    fn load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g3mstore.yaml");
        std::fs::write(&path, "repository:\n  type: memory\n").unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.repository, AnyRepositoryConfig::Memory);

        assert!(load(&dir.path().join("missing.yaml")).is_err());
    }
}
