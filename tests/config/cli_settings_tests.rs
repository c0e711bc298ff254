// CLI settings tests - flags and JOBLET_* environment variables
//
// Environment mutation is process-global, so every test here runs serially.

use clap::Parser;
use joblet_mcp::config::{BackendKind, ServerSettings};
use joblet_mcp::Cli;
use serial_test::serial;
use std::path::PathBuf;
use std::time::Duration;

const VARS: &[&str] = &[
    "JOBLET_CONFIG",
    "JOBLET_NODE",
    "JOBLET_BACKEND",
    "RNX_BINARY",
    "JOBLET_MAX_PROCESSES",
    "JOBLET_COMMAND_TIMEOUT",
    "JOBLET_ALLOW_INSECURE",
];

fn clear_env() {
    for var in VARS {
        // SAFETY: tests in this file are serialised and spawn no threads reading the environment.
        unsafe { std::env::remove_var(var) };
    }
}

fn set_env(key: &str, value: &str) {
    // SAFETY: see clear_env.
    unsafe { std::env::set_var(key, value) };
}

#[test]
#[serial]
fn environment_selects_cli_backend() {
    clear_env();
    set_env("JOBLET_CONFIG", "/srv/joblet/rnx-config.yml");
    set_env("JOBLET_BACKEND", "cli");
    set_env("JOBLET_NODE", "gpu");
    set_env("RNX_BINARY", "/opt/joblet/bin/rnx");
    set_env("JOBLET_MAX_PROCESSES", "3");

    let settings = ServerSettings::from(&Cli::parse_from(["joblet-mcp"]));
    clear_env();

    assert_eq!(settings.backend, BackendKind::Cli);
    assert_eq!(settings.config_path, PathBuf::from("/srv/joblet/rnx-config.yml"));
    assert_eq!(settings.node.as_deref(), Some("gpu"));
    assert_eq!(settings.rnx_binary, PathBuf::from("/opt/joblet/bin/rnx"));
    assert_eq!(settings.max_processes, 3);
}

#[test]
#[serial]
fn flags_win_over_environment() {
    clear_env();
    set_env("JOBLET_BACKEND", "cli");
    set_env("JOBLET_COMMAND_TIMEOUT", "30");

    let cli = Cli::parse_from(["joblet-mcp", "--backend", "native", "--command-timeout", "5"]);
    let settings = ServerSettings::from(&cli);
    clear_env();

    assert_eq!(settings.backend, BackendKind::Native);
    assert_eq!(settings.command_timeout, Duration::from_secs(5));
}

#[test]
#[serial]
fn defaults_without_environment() {
    clear_env();
    let settings = ServerSettings::from(&Cli::parse_from(["joblet-mcp"]));

    assert_eq!(settings.backend, BackendKind::Native);
    assert!(settings.node.is_none());
    assert!(!settings.allow_insecure);
    assert!(settings.config_path.ends_with(".rnx/rnx-config.yml"));
}
