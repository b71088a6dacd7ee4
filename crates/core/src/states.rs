// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource and group lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    Offline,
    Starting,
    Online,
    Stopping,
    Faulted,
    Unknown,
}

impl ResourceState {
    /// States counted as "online" for fault detection and poll intervals.
    pub fn is_online_state(self) -> bool {
        matches!(self, ResourceState::Starting | ResourceState::Online)
    }

    /// States where a start or stop command is pending.
    pub fn is_transition(self) -> bool {
        matches!(self, ResourceState::Starting | ResourceState::Stopping)
    }

    /// Upper-case name as printed by the CLI front-ends.
    pub fn upper(self) -> &'static str {
        match self {
            ResourceState::Offline => "OFFLINE",
            ResourceState::Starting => "STARTING",
            ResourceState::Online => "ONLINE",
            ResourceState::Stopping => "STOPPING",
            ResourceState::Faulted => "FAULTED",
            ResourceState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceState::Offline => "offline",
            ResourceState::Starting => "starting",
            ResourceState::Online => "online",
            ResourceState::Stopping => "stopping",
            ResourceState::Faulted => "faulted",
            ResourceState::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ResourceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "offline" => Ok(ResourceState::Offline),
            "starting" => Ok(ResourceState::Starting),
            "online" => Ok(ResourceState::Online),
            "stopping" => Ok(ResourceState::Stopping),
            "faulted" => Ok(ResourceState::Faulted),
            "unknown" => Ok(ResourceState::Unknown),
            other => Err(format!("invalid resource state: {}", other)),
        }
    }
}

/// Aggregate state of a service group, derived from its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupState {
    Online,
    Partial,
    Offline,
    Faulted,
    Unknown,
}

impl GroupState {
    /// States counted as "online" for load accounting and the
    /// non-parallel placement guard.
    pub fn is_online_state(self) -> bool {
        matches!(self, GroupState::Online | GroupState::Partial)
    }

    /// Upper-case name as printed by the CLI front-ends.
    pub fn upper(self) -> &'static str {
        match self {
            GroupState::Online => "ONLINE",
            GroupState::Partial => "PARTIAL",
            GroupState::Offline => "OFFLINE",
            GroupState::Faulted => "FAULTED",
            GroupState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupState::Online => "online",
            GroupState::Partial => "partial",
            GroupState::Offline => "offline",
            GroupState::Faulted => "faulted",
            GroupState::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for GroupState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "online" => Ok(GroupState::Online),
            "partial" => Ok(GroupState::Partial),
            "offline" => Ok(GroupState::Offline),
            "faulted" => Ok(GroupState::Faulted),
            "unknown" => Ok(GroupState::Unknown),
            other => Err(format!("invalid group state: {}", other)),
        }
    }
}

#[cfg(test)]
#[path = "states_tests.rs"]
mod tests;
