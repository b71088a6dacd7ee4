// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alert levels and records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of an alert. Ordering follows the numeric levels, so
/// `level >= threshold` is the filter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertLevel {
    #[serde(rename = "NOTSET")]
    NotSet,
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl AlertLevel {
    pub fn value(self) -> u8 {
        match self {
            AlertLevel::NotSet => 0,
            AlertLevel::Info => 10,
            AlertLevel::Warning => 20,
            AlertLevel::Error => 30,
            AlertLevel::Critical => 40,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AlertLevel::NotSet => "NOTSET",
            AlertLevel::Info => "INFO",
            AlertLevel::Warning => "WARNING",
            AlertLevel::Error => "ERROR",
            AlertLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NOTSET" => Ok(AlertLevel::NotSet),
            "INFO" => Ok(AlertLevel::Info),
            "WARNING" => Ok(AlertLevel::Warning),
            "ERROR" => Ok(AlertLevel::Error),
            "CRITICAL" => Ok(AlertLevel::Critical),
            other => Err(format!("invalid alert level: {}", other)),
        }
    }
}

/// One alert, as produced by the engine and consumed by the handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub cluster_name: String,
    pub node_name: String,
    pub group_name: String,
    pub resource_name: String,
    pub level: AlertLevel,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub epoch_ms: u64,
}

#[cfg(test)]
#[path = "alert_tests.rs"]
mod tests;
