//! Configuration loading helpers for the privstat CLI.
//!
//! Configuration flags are consumed by the layered loader, not by clap, and
//! must appear before the first command token. This module filters them out
//! of the argument list so the loader sees only what it understands and the
//! command parser sees everything else.

use std::ffi::{OsStr, OsString};

use privstat_config::Config;

use crate::AppError;

/// CLI flags recognised by the configuration loader.
///
/// MAINTENANCE: keep in sync with the fields of `privstat_config::Config`.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--daemon-socket",
    "--request-timeout-ms",
    "--log-filter",
    "--log-format",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the filtered argument list.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify_argument(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Stop;
    }
    let flag = text.split('=').next().unwrap_or(&text);
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !text.contains('='),
        }
    } else {
        FlagAction::Stop
    }
}

pub(crate) struct ConfigArgumentSplit {
    /// argv[0] plus every recognised configuration flag (and values).
    pub(crate) config_arguments: Vec<OsString>,
    /// Index of the first command token in the original argument list.
    pub(crate) command_start: usize,
}

/// Splits configuration flags from command tokens.
///
/// Recognised flags (and their values) are collected until the first token
/// that is not one; everything from there on belongs to the command parser.
pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let mut config_arguments: Vec<OsString> = Vec::new();
    let mut command_start = args.len().min(1);
    if let Some(first) = args.first() {
        config_arguments.push(first.clone());
    }

    let mut index = 1_usize;
    while index < args.len() {
        match classify_argument(args[index].as_os_str()) {
            FlagAction::Include { needs_value } => {
                config_arguments.push(args[index].clone());
                index += 1;
                if needs_value && index < args.len() {
                    config_arguments.push(args[index].clone());
                    index += 1;
                }
                command_start = index;
            }
            FlagAction::Stop => break,
        }
    }

    ConfigArgumentSplit {
        config_arguments,
        command_start,
    }
}
