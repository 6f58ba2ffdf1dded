/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow};
use yaml_rust::Yaml;

use super::value;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Local durability log settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DumpConfig {
    pub path: PathBuf,
    /// Zero means every save is appended to the log synchronously.
    pub interval: Duration,
    pub restore: bool,
}

impl DumpConfig {
    pub fn new(path: PathBuf) -> Self {
        DumpConfig {
            path,
            interval: DEFAULT_INTERVAL,
            restore: true,
        }
    }

    pub fn is_sync(&self) -> bool {
        self.interval.is_zero()
    }

    pub(crate) fn parse(v: &Yaml) -> anyhow::Result<Self> {
        let Yaml::Hash(map) = v else {
            return Err(anyhow!("dump config should be a map"));
        };
        let mut config = DumpConfig::new(PathBuf::new());
        value::foreach_kv(map, |k, v| config.set(k, v))?;
        config.check()?;
        Ok(config)
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match value::normalize_key(k).as_str() {
            "path" | "file" => {
                self.path = value::as_path(v).context(format!("invalid path value for key {k}"))?;
                Ok(())
            }
            "interval" | "store_interval" => {
                self.interval = value::as_duration(v)
                    .context(format!("invalid humanize duration value for key {k}"))?;
                Ok(())
            }
            "restore" => {
                self.restore =
                    value::as_bool(v).context(format!("invalid bool value for key {k}"))?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(anyhow!("path is not set"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yaml_rust::YamlLoader;

    fn load(s: &str) -> anyhow::Result<DumpConfig> {
        let docs = YamlLoader::load_from_str(s).unwrap();
        DumpConfig::parse(&docs[0])
    }

    #[test]
    fn defaults() {
        let config = load("path: /tmp/metrics.log").unwrap();
        assert_eq!(config.interval, DEFAULT_INTERVAL);
        assert!(config.restore);
        assert!(!config.is_sync());
    }

    #[test]
    fn sync_mode() {
        let config = load("path: m.log\ninterval: 0\nrestore: false").unwrap();
        assert!(config.is_sync());
        assert!(!config.restore);

        let config = load("file: m.log\nstore-interval: 10s").unwrap();
        assert_eq!(config.interval, Duration::from_secs(10));
    }

    #[test]
    fn invalid() {
        assert!(load("interval: 1s").is_err());
        assert!(load("path: m.log\nrestore: maybe").is_err());
        assert!(load("- m.log").is_err());
    }
}
