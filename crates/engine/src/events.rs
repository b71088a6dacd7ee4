// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event dispatcher: the single place resource state changes.
//!
//! Events arrive strictly FIFO per resource. State events walk the
//! dependency DAG and do the fault accounting, poll events translate
//! monitor answers into states, and request events carry out mutations
//! asked for by the RPC surface.

use crate::node::NodeEngine;
use crate::resource::{CmdType, LaunchError};
use ics_core::alert::AlertLevel;
use ics_core::event::EngineEvent;
use ics_core::states::ResourceState;
use tracing::{debug, error, info, warn};

impl NodeEngine {
    /// Run one event to completion. Only the dispatcher task calls this.
    pub fn dispatch(&mut self, event: EngineEvent) {
        debug!(?event, "running event");
        match event {
            EngineEvent::ResourceStarting { resource, .. } => {
                self.run_program(&resource, CmdType::Start);
            }
            EngineEvent::ResourceStopping { resource, .. } => {
                self.run_program(&resource, CmdType::Stop);
            }
            EngineEvent::ResourceOnline {
                resource,
                last_state,
            } => self.on_online(&resource, last_state),
            EngineEvent::ResourceOffline {
                resource,
                last_state,
            } => self.on_offline(&resource, last_state),
            EngineEvent::ResourceFaulted { resource, .. } => {
                self.flush_resource(&resource);
                self.alert(AlertLevel::Error, &resource, "Resource faulted");
            }
            EngineEvent::ResourceUnknown {
                resource,
                last_state,
            } => {
                if last_state != ResourceState::Unknown {
                    self.alert(AlertLevel::Warning, &resource, "Resource in unknown state");
                }
            }
            EngineEvent::PollRun { resource } => self.on_poll_run(&resource),
            EngineEvent::PollOnline { resource } => {
                if self.state_of(&resource) != Some(ResourceState::Faulted) {
                    self.change_state(&resource, ResourceState::Online, false);
                }
            }
            EngineEvent::PollOffline { resource } => {
                if self.state_of(&resource) != Some(ResourceState::Faulted) {
                    self.change_state(&resource, ResourceState::Offline, false);
                }
            }
            EngineEvent::PollUnknown { resource } => {
                self.change_state(&resource, ResourceState::Unknown, false);
            }
            EngineEvent::StateRequest { resource, target } => {
                self.change_state(&resource, target, false);
            }
            EngineEvent::ResourceFlush { resource } => self.flush_resource(&resource),
            EngineEvent::ResourceClear { resource } => self.clear_resource(&resource),
            EngineEvent::GroupStart { group } => self.group_start(&group),
            EngineEvent::GroupStop { group } => self.group_stop(&group),
            EngineEvent::GroupFlush { group } => self.group_flush(&group),
            EngineEvent::GroupClear { group } => self.group_clear(&group),
        }
    }

    fn state_of(&self, name: &str) -> Option<ResourceState> {
        self.resources.get(name).map(|res| res.state)
    }

    /// Change a resource's state and enqueue the bound event.
    ///
    /// Disabled and monitor-only resources never leave OFFLINE; instead a
    /// synthetic online/offline event with a faked last state is enqueued
    /// so propagation passes through them.
    pub(crate) fn change_state(&mut self, name: &str, new_state: ResourceState, force: bool) {
        let Some(resource) = self.resources.get(name) else {
            warn!(resource = name, "state change for unknown resource");
            return;
        };
        let cur_state = resource.state;
        if !force && new_state == cur_state {
            return;
        }

        if !resource.enabled() || resource.monitor_only() {
            info!(resource = name, "unable to change state, resource is disabled");
            let synthetic = match new_state {
                ResourceState::Starting | ResourceState::Online => {
                    Some(EngineEvent::ResourceOnline {
                        resource: name.to_string(),
                        last_state: ResourceState::Online,
                    })
                }
                ResourceState::Stopping | ResourceState::Offline => {
                    Some(EngineEvent::ResourceOffline {
                        resource: name.to_string(),
                        last_state: ResourceState::Offline,
                    })
                }
                _ => None,
            };
            if let Some(res) = self.resources.get_mut(name) {
                res.state = ResourceState::Offline;
            }
            match synthetic {
                Some(event) => self.events.send(event),
                None => error!(
                    resource = name,
                    state = %new_state,
                    "attempted an invalid state change while resource is disabled"
                ),
            }
            return;
        }

        info!(resource = name, from = %cur_state, to = %new_state, "changing state");
        if let Some(res) = self.resources.get_mut(name) {
            res.state = new_state;
        }
        self.events
            .send(EngineEvent::for_state(name, new_state, cur_state));
    }

    /// Online event: warn on an unexpected online, otherwise walk the
    /// dependency DAG downward.
    fn on_online(&mut self, name: &str, last_state: ResourceState) {
        let Some(resource) = self.resources.get(name) else {
            return;
        };

        if !last_state.is_online_state() {
            warn!(resource = name, "resource came online unexpectedly");
            self.alert(AlertLevel::Warning, name, "Resource came online by itself");
            return;
        }

        if !resource.propagate {
            return;
        }
        let children = resource.children.clone();
        if let Some(res) = self.resources.get_mut(name) {
            res.propagate = false;
        }

        for child in children {
            if !self.parents_ready(&child) {
                debug!(
                    resource = %child,
                    "unable to start, waiting for parents to come online"
                );
                continue;
            }
            let state = match self.resources.get_mut(&child) {
                Some(res) => {
                    res.propagate = true;
                    res.state
                }
                None => continue,
            };
            info!(resource = name, to = %child, "propagating online");
            match state {
                ResourceState::Offline => self.change_state(&child, ResourceState::Starting, false),
                ResourceState::Online => self.change_state(&child, ResourceState::Online, true),
                _ => {}
            }
        }
    }

    /// Offline event: fault accounting on an unexpected offline,
    /// otherwise walk the dependency DAG upward.
    fn on_offline(&mut self, name: &str, last_state: ResourceState) {
        let Some(resource) = self.resources.get(name) else {
            return;
        };

        if last_state.is_online_state() {
            let limit = resource.restart_limit();
            let count = {
                match self.resources.get_mut(name) {
                    Some(res) => {
                        res.fault_count += 1;
                        res.fault_count
                    }
                    None => return,
                }
            };
            info!(resource = name, fault = count, limit, "fault detected");
            if count >= limit {
                info!(resource = name, limit, "reached max fault count");
                self.change_state(name, ResourceState::Faulted, false);
            } else {
                self.change_state(name, ResourceState::Starting, false);
            }
            return;
        }

        if !resource.propagate {
            return;
        }
        let parents = resource.parents.clone();
        if let Some(res) = self.resources.get_mut(name) {
            res.propagate = false;
        }

        for parent in parents {
            if !self.children_ready(&parent) {
                debug!(
                    resource = %parent,
                    "unable to stop, waiting for children to go offline"
                );
                continue;
            }
            let state = match self.resources.get_mut(&parent) {
                Some(res) => {
                    res.propagate = true;
                    res.state
                }
                None => continue,
            };
            info!(resource = name, to = %parent, "propagating offline");
            match state {
                ResourceState::Online => self.change_state(&parent, ResourceState::Stopping, false),
                ResourceState::Offline => self.change_state(&parent, ResourceState::Offline, true),
                _ => {}
            }
        }
    }

    /// A child may start once every parent is online, disabled, or
    /// monitor-only. No parents means always ready.
    pub(crate) fn parents_ready(&self, name: &str) -> bool {
        let Some(resource) = self.resources.get(name) else {
            return false;
        };
        resource.parents.iter().all(|parent| {
            self.resources
                .get(parent)
                .map(|p| p.state == ResourceState::Online || !p.enabled() || p.monitor_only())
                .unwrap_or(false)
        })
    }

    /// A parent may stop once every child is offline, disabled, or
    /// monitor-only.
    pub(crate) fn children_ready(&self, name: &str) -> bool {
        let Some(resource) = self.resources.get(name) else {
            return false;
        };
        resource.children.iter().all(|child| {
            self.resources
                .get(child)
                .map(|c| c.state == ResourceState::Offline || !c.enabled() || c.monitor_only())
                .unwrap_or(false)
        })
    }

    /// Launch a start/stop/monitor program for a resource.
    pub(crate) fn run_program(&mut self, name: &str, cmd_type: CmdType) {
        let log = match self.res_log.open() {
            Ok(file) => Some(file),
            Err(err) => {
                warn!(error = %err, "unable to open resource log");
                None
            }
        };
        let now = self.clock.now();
        let epoch = self.clock.epoch_secs();

        let Some(resource) = self.resources.get_mut(name) else {
            return;
        };
        match resource.launch(cmd_type, log, now) {
            Ok(()) => {}
            Err(LaunchError::Missing) => {
                error!(resource = name, %cmd_type, "unable to run command, no program configured");
                self.command_failed(name, cmd_type, epoch);
            }
            Err(LaunchError::Spawn(err)) => {
                error!(resource = name, %cmd_type, error = %err, "unable to run command");
                self.command_failed(name, cmd_type, epoch);
            }
        }
    }

    /// A program could not be launched: polls resync their bookkeeping,
    /// start/stop failures flush the resource back to a quiescent state.
    fn command_failed(&mut self, name: &str, cmd_type: CmdType, epoch: i64) {
        match cmd_type {
            CmdType::Poll => {
                if let Some(res) = self.resources.get_mut(name) {
                    res.poll_in_flight = false;
                    res.last_poll = epoch;
                }
            }
            CmdType::Start | CmdType::Stop => self.flush_resource(name),
        }
    }

    fn on_poll_run(&mut self, name: &str) {
        let Some(resource) = self.resources.get_mut(name) else {
            return;
        };
        // Start/stop/poll are mutually exclusive per resource.
        if resource.cmd.is_some() {
            resource.poll_in_flight = false;
            return;
        }
        self.run_program(name, CmdType::Poll);
    }

    /// Reset a resource to a quiescent state: drop propagation, kill any
    /// in-flight command, and back out of a half-done transition.
    pub(crate) fn flush_resource(&mut self, name: &str) {
        let state = {
            let Some(resource) = self.resources.get_mut(name) else {
                return;
            };
            resource.propagate = false;
            if resource.cmd_type() == Some(CmdType::Poll) {
                resource.poll_in_flight = false;
            }
            resource.kill_cmd();
            resource.state
        };
        match state {
            ResourceState::Starting => self.change_state(name, ResourceState::Offline, false),
            ResourceState::Stopping => self.change_state(name, ResourceState::Online, false),
            _ => {}
        }
    }

    pub(crate) fn clear_resource(&mut self, name: &str) {
        let state = {
            let Some(resource) = self.resources.get_mut(name) else {
                return;
            };
            resource.fault_count = 0;
            resource.state
        };
        if state == ResourceState::Faulted {
            self.change_state(name, ResourceState::Offline, false);
        }
    }

    /// Flush every member, then seed propagation from resources with no
    /// parents.
    pub(crate) fn group_start(&mut self, name: &str) {
        let Some(group) = self.groups.get(name) else {
            return;
        };
        if !group.enabled() {
            warn!(group = name, "refusing to start disabled group");
            return;
        }
        let members = group.members.clone();
        for member in &members {
            self.flush_resource(member);
        }
        for member in &members {
            let seed = match self.resources.get_mut(member) {
                Some(res) if res.parents.is_empty() => {
                    res.propagate = true;
                    Some(res.state)
                }
                _ => None,
            };
            match seed {
                Some(ResourceState::Online) => {
                    self.change_state(member, ResourceState::Online, true)
                }
                Some(_) => self.change_state(member, ResourceState::Starting, false),
                None => {}
            }
        }
    }

    /// Symmetric to `group_start`: seed from the leaves.
    pub(crate) fn group_stop(&mut self, name: &str) {
        let Some(group) = self.groups.get(name) else {
            return;
        };
        let members = group.members.clone();
        for member in &members {
            self.flush_resource(member);
        }
        for member in &members {
            let seed = match self.resources.get_mut(member) {
                Some(res) if res.children.is_empty() => {
                    res.propagate = true;
                    Some(res.state)
                }
                _ => None,
            };
            match seed {
                Some(ResourceState::Offline) => {
                    self.change_state(member, ResourceState::Offline, true)
                }
                Some(_) => self.change_state(member, ResourceState::Stopping, false),
                None => {}
            }
        }
    }

    pub(crate) fn group_flush(&mut self, name: &str) {
        let members = match self.groups.get(name) {
            Some(group) => group.members.clone(),
            None => return,
        };
        for member in members {
            self.flush_resource(&member);
        }
    }

    pub(crate) fn group_clear(&mut self, name: &str) {
        let members = match self.groups.get(name) {
            Some(group) => group.members.clone(),
            None => return,
        };
        for member in members {
            self.clear_resource(&member);
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
