/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::Context;
use slog::{Level, Logger, slog_debug, slog_error, slog_info};

use g3mstore::opts::ProcArgs;

fn main() -> anyhow::Result<()> {
    let Some(proc_args) =
        g3mstore::opts::parse_clap().context("failed to parse command line options")?
    else {
        return Ok(());
    };

    let config = g3mstore::config::load(&proc_args.config_file)
        .context(format!("failed to load config, opts: {:?}", &proc_args))?;

    let level = match proc_args.verbose_level {
        0 => config.log_level,
        1 => Level::Debug,
        _ => Level::Trace,
    };
    let logger = g3mstore::log::new_stderr_logger(level);
    slog_debug!(logger, "loaded config from {}", proc_args.config_file.display());

    if proc_args.test_config {
        slog_info!(logger, "the format of the config file is ok");
        return Ok(());
    }

    let ret = tokio_run(&config, &logger);
    if let Err(e) = &ret {
        slog_error!(logger, "{:?}", e);
    }
    ret
}

fn tokio_run(config: &g3mstore::config::StoreConfig, logger: &Logger) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("g3mstore")
        .build()
        .context("failed to start runtime")?;
    rt.block_on(async {
        let service = g3mstore::build_service(config, logger)
            .await
            .context("failed to build metric service")?;
        if let Err(e) = service.ping().await {
            service.close().await;
            return Err(anyhow::Error::new(e).context("metric store is not reachable"));
        }

        let metrics = service.all().await.map(|v| v.len()).unwrap_or_default();
        slog_info!(logger, "metric store started"; "metrics" => metrics);

        wait_for_quit().await.context("failed to setup signal handler")?;
        slog_info!(logger, "quit signal received");

        service.close().await;
        Ok(())
    })
}

#[cfg(unix)]
async fn wait_for_quit() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_quit() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
