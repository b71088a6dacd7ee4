// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ICS_*` environment resolution with the stock filesystem defaults.

use std::path::PathBuf;

fn path_var(name: &str, default: &str) -> PathBuf {
    std::env::var(name)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

/// Installation prefix (templates live under `etc/`).
pub fn ics_home() -> PathBuf {
    path_var("ICS_HOME", "/opt/ICS")
}

pub fn ics_log() -> PathBuf {
    path_var("ICS_LOG", "/var/opt/ics/log")
}

pub fn ics_conf() -> PathBuf {
    path_var("ICS_CONF", "/var/opt/ics/config")
}

pub fn ics_var() -> PathBuf {
    path_var("ICS_VAR", "/var/opt/ics")
}

pub fn ics_uds() -> PathBuf {
    path_var("ICS_UDS", "/var/opt/ics/uds")
}

pub fn conf_file() -> PathBuf {
    ics_conf().join("main.cf")
}

pub fn uds_socket() -> PathBuf {
    ics_uds().join("uds_socket")
}

pub fn lock_file() -> PathBuf {
    ics_var().join("icsd.lock")
}

pub fn alert_template() -> PathBuf {
    ics_home().join("etc").join("alert.html")
}

/// TCP port peers connect to.
pub fn listen_port() -> u16 {
    std::env::var("ICS_PORT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(9090)
}

/// Log to stderr instead of the server log file.
pub fn console_log() -> bool {
    std::env::var("ICS_CONSOLE_LOG").is_ok()
}
