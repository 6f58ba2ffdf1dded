/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint, value_parser};

const ARGS_VERSION: &str = "version";
const ARGS_VERBOSE: &str = "verbose";
const ARGS_TEST_CONFIG: &str = "test-config";
const ARGS_CONFIG_FILE: &str = "config-file";

#[derive(Debug, Default)]
pub struct ProcArgs {
    pub config_file: PathBuf,
    pub test_config: bool,
    pub verbose_level: u8,
}

fn build_cli_args() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .disable_version_flag(true)
        .arg(
            Arg::new(ARGS_VERBOSE)
                .help("Show verbose output")
                .num_args(0)
                .action(ArgAction::Count)
                .short('v')
                .long("verbose"),
        )
        .arg(
            Arg::new(ARGS_VERSION)
                .help("Show version")
                .action(ArgAction::SetTrue)
                .short('V')
                .long("version"),
        )
        .arg(
            Arg::new(ARGS_TEST_CONFIG)
                .help("Test the format of config file and exit")
                .action(ArgAction::SetTrue)
                .short('t')
                .long("test-config"),
        )
        .arg(
            Arg::new(ARGS_CONFIG_FILE)
                .help("Config file path")
                .num_args(1)
                .value_name("CONFIG FILE")
                .value_hint(ValueHint::FilePath)
                .value_parser(value_parser!(PathBuf))
                .required_unless_present_any([ARGS_VERSION])
                .short('c')
                .long("config-file"),
        )
}

fn parse_matches(args: &ArgMatches) -> anyhow::Result<Option<ProcArgs>> {
    let mut proc_args = ProcArgs::default();

    if let Some(verbose_level) = args.get_one::<u8>(ARGS_VERBOSE) {
        proc_args.verbose_level = *verbose_level;
    }

    if args.get_flag(ARGS_VERSION) {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(None);
    }
    proc_args.test_config = args.get_flag(ARGS_TEST_CONFIG);
    if let Some(config_file) = args.get_one::<PathBuf>(ARGS_CONFIG_FILE) {
        proc_args.config_file = config_file.clone();
    } else {
        return Err(anyhow!("no config file given"));
    }

    Ok(Some(proc_args))
}

pub fn parse_clap() -> anyhow::Result<Option<ProcArgs>> {
    let args = build_cli_args().get_matches();
    parse_matches(&args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Option<ProcArgs>> {
        let matches = build_cli_args().try_get_matches_from(args)?;
        parse_matches(&matches)
    }

    #[test]
    fn config_file() {
        let args = parse(&["g3mstore", "-c", "/etc/g3mstore/main.yaml", "-t", "-vv"])
            .unwrap()
            .unwrap();
        assert_eq!(args.config_file, PathBuf::from("/etc/g3mstore/main.yaml"));
        assert!(args.test_config);
        assert_eq!(args.verbose_level, 2);
    }

    #[test]
    fn version_only() {
        assert!(parse(&["g3mstore", "-V"]).unwrap().is_none());
        assert!(parse(&["g3mstore"]).is_err());
    }
}
