// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A service group: an ordered set of resources placed as a unit, with
//! an aggregate state derived from its members.

use crate::resource::Resource;
use ics_core::attributes::{group_attributes, AttrTable};
use ics_core::states::{GroupState, ResourceState};

#[derive(Debug)]
pub struct Group {
    pub name: String,
    pub attrs: AttrTable,
    /// Member resource names, in add order.
    pub members: Vec<String>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: AttrTable::new(group_attributes()),
            members: Vec::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.attrs.get_bool("Enabled").unwrap_or(false)
    }

    pub fn auto_start(&self) -> bool {
        self.attrs.get_bool("AutoStart").unwrap_or(false)
    }

    pub fn parallel(&self) -> bool {
        self.attrs.get_bool("Parallel").unwrap_or(false)
    }

    pub fn ignore_disabled(&self) -> bool {
        self.attrs.get_bool("IgnoreDisabled").unwrap_or(false)
    }

    pub fn system_list(&self) -> Vec<String> {
        self.attrs
            .get_list("SystemList")
            .map(|items| items.to_vec())
            .unwrap_or_default()
    }

    /// Aggregate state over member resources.
    ///
    /// MonitorOnly members never count; disabled members are excluded
    /// only when IgnoreDisabled is set. An empty group is UNKNOWN, a
    /// group whose members are all excluded is OFFLINE.
    pub fn state<'a>(&self, members: impl Iterator<Item = &'a Resource>) -> GroupState {
        let mut states: Vec<ResourceState> = Vec::new();
        let mut empty = true;
        let ignore_disabled = self.ignore_disabled();

        for member in members {
            empty = false;
            if member.monitor_only() {
                continue;
            }
            if ignore_disabled && !member.enabled() {
                continue;
            }
            if !states.contains(&member.state) {
                states.push(member.state);
            }
        }

        if empty {
            return GroupState::Unknown;
        }
        match states.as_slice() {
            [] => GroupState::Offline,
            [single] => match single {
                ResourceState::Online => GroupState::Online,
                ResourceState::Offline => GroupState::Offline,
                ResourceState::Faulted => GroupState::Faulted,
                ResourceState::Starting | ResourceState::Stopping => GroupState::Partial,
                ResourceState::Unknown => GroupState::Unknown,
            },
            _ => GroupState::Partial,
        }
    }
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
