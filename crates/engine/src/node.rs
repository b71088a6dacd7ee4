// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The node engine: owns the resource and group registries and exposes
//! every local operation behind the RPC surface.
//!
//! Operations that touch resource state enqueue events for the single
//! dispatcher; everything else mutates directly under the engine lock.

use crate::error::EngineError;
use crate::group::Group;
use crate::logs::HourlyLog;
use crate::resource::Resource;
use ics_core::alert::{Alert, AlertLevel};
use ics_core::attributes::{node_attributes, AttrTable, AttrValue, ModifyOp};
use ics_core::clock::Clock;
use ics_core::event::EngineEvent;
use ics_core::states::{GroupState, ResourceState};
use indexmap::IndexMap;
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Handle used to enqueue events onto the dispatcher queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            warn!("event queue closed, dropping event");
        }
    }
}

/// Bound on concurrent monitor polls during the startup probe.
pub(crate) const STARTUP_POLL_LIMIT: usize = 30;

/// Startup probe bookkeeping: every resource is polled once before
/// normal scheduling begins.
#[derive(Debug, Default)]
pub(crate) struct StartupProbe {
    pub(crate) pending: Vec<String>,
    pub(crate) launched: Vec<String>,
}

pub struct NodeEngine {
    pub attrs: AttrTable,
    pub(crate) resources: IndexMap<String, Resource>,
    pub(crate) groups: IndexMap<String, Group>,
    pub(crate) events: EventSender,
    pub(crate) alert_tx: mpsc::UnboundedSender<Alert>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) dirty: Arc<AtomicBool>,
    pub(crate) res_log: HourlyLog,
    pub(crate) startup: Option<StartupProbe>,
}

impl NodeEngine {
    pub fn new(
        clock: Arc<dyn Clock>,
        events: EventSender,
        alert_tx: mpsc::UnboundedSender<Alert>,
        dirty: Arc<AtomicBool>,
        log_dir: &Path,
    ) -> Self {
        let mut attrs = AttrTable::new(node_attributes());
        let node_name = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());
        let _ = attrs.set("NodeName", AttrValue::from(node_name.clone()));
        let _ = attrs.set("NodeList", AttrValue::List(vec![node_name]));

        Self {
            attrs,
            resources: IndexMap::new(),
            groups: IndexMap::new(),
            events,
            alert_tx,
            clock,
            dirty,
            res_log: HourlyLog::new(log_dir, "resource.log"),
            startup: None,
        }
    }

    pub fn node_name(&self) -> String {
        self.attrs.get_str("NodeName").unwrap_or_default().to_string()
    }

    pub fn cluster_name(&self) -> String {
        self.attrs
            .get_str("ClusterName")
            .unwrap_or_default()
            .to_string()
    }

    pub fn node_list(&self) -> Vec<String> {
        self.attrs
            .get_list("NodeList")
            .map(|items| items.to_vec())
            .unwrap_or_default()
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Send an alert for a resource, stamped with this node's identity.
    pub(crate) fn alert(&self, level: AlertLevel, resource: &str, message: impl Into<String>) {
        let group_name = self
            .resources
            .get(resource)
            .map(|res| res.group_name())
            .unwrap_or_default();
        let alert = Alert {
            cluster_name: self.cluster_name(),
            node_name: self.node_name(),
            group_name,
            resource_name: resource.to_string(),
            level,
            message: message.into(),
            epoch_ms: self.clock.epoch_ms(),
        };
        let _ = self.alert_tx.send(alert);
    }

    // -------------------------------------------------------------------
    // node operations
    // -------------------------------------------------------------------

    pub fn node_attr(&self) -> Vec<(String, AttrValue)> {
        self.attrs.list_all()
    }

    pub fn node_value(&self, attr: &str) -> Result<AttrValue, EngineError> {
        Ok(self.attrs.get(attr)?.clone())
    }

    pub fn node_modify(&mut self, attr: &str, op: ModifyOp) -> Result<(), EngineError> {
        if attr == "NodeName" {
            return Err(EngineError::ImmutableAttribute("NodeName".to_string()));
        }
        if attr == "NodeList" {
            // NodeList always contains this node; check on a scratch copy
            // before committing.
            let mut scratch = self.attrs.clone();
            scratch.modify(attr, op.clone())?;
            let node_name = self.node_name();
            let ok = scratch
                .get_list("NodeList")
                .map(|items| items.iter().any(|item| *item == node_name))
                .unwrap_or(false);
            if !ok {
                return Err(EngineError::InvalidNodeList(node_name));
            }
        }
        self.attrs.modify(attr, op)?;
        self.mark_dirty();
        Ok(())
    }

    /// Register a peer node: reject self, append to NodeList.
    pub fn add_node(&mut self, host: &str) -> Result<(), EngineError> {
        if host == self.node_name() {
            return Err(EngineError::NodeIsSelf(host.to_string()));
        }
        if self.node_list().iter().any(|node| node == host) {
            return Err(EngineError::NodeExists(host.to_string()));
        }
        info!(node = host, "adding node");
        self.attrs.append("NodeList", host.to_string())?;
        self.mark_dirty();
        Ok(())
    }

    pub fn delete_node(&mut self, host: &str) -> Result<(), EngineError> {
        if host == self.node_name() {
            return Err(EngineError::NodeIsSelf(host.to_string()));
        }
        if !self.node_list().iter().any(|node| node == host) {
            return Err(EngineError::NodeNotFound(host.to_string()));
        }
        info!(node = host, "deleting node");
        self.attrs.remove("NodeList", host)?;
        self.mark_dirty();
        Ok(())
    }

    /// Sum of member loads of groups currently online on this node.
    pub fn node_load(&self) -> i64 {
        self.groups
            .values()
            .filter(|group| {
                group
                    .state(self.member_resources(group))
                    .is_online_state()
            })
            .map(|group| self.group_load(group))
            .sum()
    }

    fn group_load(&self, group: &Group) -> i64 {
        group
            .members
            .iter()
            .filter_map(|name| self.resources.get(name))
            .map(|res| res.load())
            .sum()
    }

    // -------------------------------------------------------------------
    // resource operations
    // -------------------------------------------------------------------

    pub fn resource(&self, name: &str) -> Result<&Resource, EngineError> {
        self.resources
            .get(name)
            .ok_or_else(|| EngineError::ResourceNotFound(name.to_string()))
    }

    pub fn resource_mut(&mut self, name: &str) -> Result<&mut Resource, EngineError> {
        self.resources
            .get_mut(name)
            .ok_or_else(|| EngineError::ResourceNotFound(name.to_string()))
    }

    pub fn res_add(&mut self, name: &str, group: &str) -> Result<(), EngineError> {
        if self.resources.contains_key(name) {
            return Err(EngineError::ResourceExists(name.to_string()));
        }
        if !self.groups.contains_key(group) {
            return Err(EngineError::GroupNotFound(group.to_string()));
        }
        let limit = self.attrs.get_int("ResourceLimit")?;
        if self.resources.len() as i64 >= limit {
            return Err(EngineError::ResourceLimit(limit));
        }

        info!(resource = name, group, "adding new resource");
        let resource = Resource::new(name, group, self.clock.epoch_secs());
        self.resources.insert(name.to_string(), resource);
        if let Some(grp) = self.groups.get_mut(group) {
            grp.members.push(name.to_string());
        }
        self.mark_dirty();
        Ok(())
    }

    pub fn res_delete(&mut self, name: &str) -> Result<(), EngineError> {
        let resource = self.resource(name)?;
        let parents = resource.parents.clone();
        let children = resource.children.clone();
        let group = resource.group_name();

        for parent in parents {
            if let Some(p) = self.resources.get_mut(&parent) {
                p.children.retain(|child| child != name);
            }
        }
        for child in children {
            if let Some(c) = self.resources.get_mut(&child) {
                c.parents.retain(|parent| parent != name);
            }
        }
        if let Some(grp) = self.groups.get_mut(&group) {
            grp.members.retain(|member| member != name);
        }
        if let Some(mut removed) = self.resources.shift_remove(name) {
            removed.kill_cmd();
        }
        info!(resource = name, "resource deleted");
        self.mark_dirty();
        Ok(())
    }

    pub fn res_online(&mut self, name: &str) -> Result<(), EngineError> {
        let resource = self.resource(name)?;
        if resource.monitor_only() {
            return Err(EngineError::MonitorOnly(name.to_string()));
        }
        if resource.state != ResourceState::Online {
            self.events.send(EngineEvent::StateRequest {
                resource: name.to_string(),
                target: ResourceState::Starting,
            });
        }
        Ok(())
    }

    pub fn res_offline(&mut self, name: &str) -> Result<(), EngineError> {
        let resource = self.resource(name)?;
        if resource.monitor_only() {
            return Err(EngineError::MonitorOnly(name.to_string()));
        }
        if resource.state != ResourceState::Offline {
            self.events.send(EngineEvent::StateRequest {
                resource: name.to_string(),
                target: ResourceState::Stopping,
            });
        }
        Ok(())
    }

    pub fn res_state(&self, names: &[String]) -> Result<Vec<(String, ResourceState)>, EngineError> {
        if names.is_empty() {
            return Ok(self
                .resources
                .iter()
                .map(|(name, res)| (name.clone(), res.state))
                .collect());
        }
        let mut states = Vec::with_capacity(names.len());
        for name in names {
            states.push((name.clone(), self.resource(name)?.state));
        }
        Ok(states)
    }

    pub fn res_link(&mut self, parent: &str, child: &str) -> Result<(), EngineError> {
        let parent_res = self.resource(parent)?;
        let child_res = self.resource(child)?;
        if parent_res.group_name() != child_res.group_name() {
            return Err(EngineError::CrossGroupLink {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        if child_res.parents.iter().any(|name| name == parent) {
            return Err(EngineError::AlreadyLinked {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        if parent == child || self.reachable_via_children(child, parent) {
            return Err(EngineError::DependencyCycle {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        if let Some(c) = self.resources.get_mut(child) {
            c.parents.push(parent.to_string());
        }
        if let Some(p) = self.resources.get_mut(parent) {
            p.children.push(child.to_string());
        }
        info!(resource = child, parent, "created dependency");
        self.mark_dirty();
        Ok(())
    }

    pub fn res_unlink(&mut self, parent: &str, child: &str) -> Result<(), EngineError> {
        self.resource(parent)?;
        let child_res = self.resource(child)?;
        if !child_res.parents.iter().any(|name| name == parent) {
            return Err(EngineError::NotLinked {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        if let Some(c) = self.resources.get_mut(child) {
            c.parents.retain(|name| name != parent);
        }
        if let Some(p) = self.resources.get_mut(parent) {
            p.children.retain(|name| name != child);
        }
        info!(resource = child, parent, "removed dependency");
        self.mark_dirty();
        Ok(())
    }

    /// True if `to` is reachable from `from` by walking child edges.
    fn reachable_via_children(&self, from: &str, to: &str) -> bool {
        let mut queue = vec![from.to_string()];
        let mut seen = Vec::new();
        while let Some(name) = queue.pop() {
            if name == to {
                return true;
            }
            if seen.contains(&name) {
                continue;
            }
            if let Some(res) = self.resources.get(&name) {
                queue.extend(res.children.iter().cloned());
            }
            seen.push(name);
        }
        false
    }

    pub fn res_clear(&mut self, name: &str) -> Result<(), EngineError> {
        self.resource(name)?;
        self.events.send(EngineEvent::ResourceClear {
            resource: name.to_string(),
        });
        Ok(())
    }

    pub fn res_probe(&mut self, name: &str) -> Result<(), EngineError> {
        self.resource(name)?;
        self.events.send(EngineEvent::PollRun {
            resource: name.to_string(),
        });
        Ok(())
    }

    pub fn res_flush(&mut self, name: &str) -> Result<(), EngineError> {
        self.resource(name)?;
        self.events.send(EngineEvent::ResourceFlush {
            resource: name.to_string(),
        });
        Ok(())
    }

    /// Dependency rows `(group, parent, child)`.
    pub fn res_dep(
        &self,
        names: &[String],
    ) -> Result<Vec<(String, String, String)>, EngineError> {
        let mut rows = Vec::new();
        if names.is_empty() {
            for resource in self.resources.values() {
                for parent in &resource.parents {
                    rows.push((resource.group_name(), parent.clone(), resource.name.clone()));
                }
            }
            return Ok(rows);
        }
        for name in names {
            let resource = self.resource(name)?;
            for parent in &resource.parents {
                rows.push((resource.group_name(), parent.clone(), resource.name.clone()));
            }
            for child in &resource.children {
                rows.push((resource.group_name(), resource.name.clone(), child.clone()));
            }
        }
        Ok(rows)
    }

    pub fn res_list(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    pub fn res_value(&self, name: &str, attr: &str) -> Result<AttrValue, EngineError> {
        Ok(self.resource(name)?.attrs.get(attr)?.clone())
    }

    pub fn res_modify(&mut self, name: &str, attr: &str, op: ModifyOp) -> Result<(), EngineError> {
        if attr == "Group" {
            // Group membership is fixed at res_add; moving a resource
            // would desync the member list and dependency links.
            return Err(EngineError::ImmutableAttribute("Group".to_string()));
        }
        self.resource_mut(name)?.attrs.modify(attr, op)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn res_attr(&self, name: &str) -> Result<Vec<(String, AttrValue)>, EngineError> {
        Ok(self.resource(name)?.attrs.list_all())
    }

    // -------------------------------------------------------------------
    // group operations
    // -------------------------------------------------------------------

    pub fn group(&self, name: &str) -> Result<&Group, EngineError> {
        self.groups
            .get(name)
            .ok_or_else(|| EngineError::GroupNotFound(name.to_string()))
    }

    pub(crate) fn member_resources<'a>(
        &'a self,
        group: &'a Group,
    ) -> impl Iterator<Item = &'a Resource> {
        group
            .members
            .iter()
            .filter_map(|name| self.resources.get(name))
    }

    pub fn grp_add(&mut self, name: &str) -> Result<(), EngineError> {
        if self.groups.contains_key(name) {
            return Err(EngineError::GroupExists(name.to_string()));
        }
        let limit = self.attrs.get_int("GroupLimit")?;
        if self.groups.len() as i64 >= limit {
            return Err(EngineError::GroupLimit(limit));
        }
        info!(group = name, "adding new group");
        self.groups.insert(name.to_string(), Group::new(name));
        self.mark_dirty();
        Ok(())
    }

    pub fn grp_delete(&mut self, name: &str) -> Result<(), EngineError> {
        let group = self.group(name)?;
        if !group.members.is_empty() {
            return Err(EngineError::GroupNotEmpty(name.to_string()));
        }
        info!(group = name, "deleting group");
        self.groups.shift_remove(name);
        self.mark_dirty();
        Ok(())
    }

    pub fn grp_online(&mut self, name: &str) -> Result<(), EngineError> {
        let group = self.group(name)?;
        if !group.enabled() {
            return Err(EngineError::GroupDisabled(name.to_string()));
        }
        info!(group = name, "bringing group online");
        self.events.send(EngineEvent::GroupStart {
            group: name.to_string(),
        });
        Ok(())
    }

    pub fn grp_offline(&mut self, name: &str) -> Result<(), EngineError> {
        self.group(name)?;
        info!(group = name, "bringing group offline");
        self.events.send(EngineEvent::GroupStop {
            group: name.to_string(),
        });
        Ok(())
    }

    /// Queue a start for every AutoStart group. Invoked once the startup
    /// probe has established ground truth.
    pub fn grp_online_auto(&mut self) {
        let auto: Vec<String> = self
            .groups
            .values()
            .filter(|group| group.auto_start() && group.enabled())
            .map(|group| group.name.clone())
            .collect();
        for name in auto {
            info!(group = %name, "auto-starting group");
            self.events.send(EngineEvent::GroupStart { group: name });
        }
    }

    pub fn grp_state(&self, names: &[String]) -> Result<Vec<(String, GroupState)>, EngineError> {
        if names.is_empty() {
            return Ok(self
                .groups
                .values()
                .map(|group| {
                    (
                        group.name.clone(),
                        group.state(self.member_resources(group)),
                    )
                })
                .collect());
        }
        let mut states = Vec::with_capacity(names.len());
        for name in names {
            let group = self.group(name)?;
            states.push((name.clone(), group.state(self.member_resources(group))));
        }
        Ok(states)
    }

    pub fn grp_enable(&mut self, name: &str) -> Result<(), EngineError> {
        self.set_group_enabled(name, true)
    }

    pub fn grp_disable(&mut self, name: &str) -> Result<(), EngineError> {
        self.set_group_enabled(name, false)
    }

    fn set_group_enabled(&mut self, name: &str, enabled: bool) -> Result<(), EngineError> {
        let group = self
            .groups
            .get_mut(name)
            .ok_or_else(|| EngineError::GroupNotFound(name.to_string()))?;
        group
            .attrs
            .set("Enabled", AttrValue::from(if enabled { "true" } else { "false" }))?;
        self.mark_dirty();
        Ok(())
    }

    pub fn grp_enable_resources(&mut self, name: &str) -> Result<(), EngineError> {
        self.set_member_enabled(name, true)
    }

    pub fn grp_disable_resources(&mut self, name: &str) -> Result<(), EngineError> {
        self.set_member_enabled(name, false)
    }

    fn set_member_enabled(&mut self, name: &str, enabled: bool) -> Result<(), EngineError> {
        let members = self.group(name)?.members.clone();
        let value = if enabled { "true" } else { "false" };
        for member in members {
            if let Some(res) = self.resources.get_mut(&member) {
                res.attrs.set("Enabled", AttrValue::from(value))?;
            }
        }
        self.mark_dirty();
        Ok(())
    }

    pub fn grp_flush(&mut self, name: &str) -> Result<(), EngineError> {
        self.group(name)?;
        self.events.send(EngineEvent::GroupFlush {
            group: name.to_string(),
        });
        Ok(())
    }

    pub fn grp_clear(&mut self, name: &str) -> Result<(), EngineError> {
        self.group(name)?;
        self.events.send(EngineEvent::GroupClear {
            group: name.to_string(),
        });
        Ok(())
    }

    pub fn grp_resources(&self, name: &str) -> Result<Vec<String>, EngineError> {
        Ok(self.group(name)?.members.clone())
    }

    pub fn grp_list(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    pub fn grp_value(&self, name: &str, attr: &str) -> Result<AttrValue, EngineError> {
        Ok(self.group(name)?.attrs.get(attr)?.clone())
    }

    pub fn grp_modify(&mut self, name: &str, attr: &str, op: ModifyOp) -> Result<(), EngineError> {
        let group = self
            .groups
            .get_mut(name)
            .ok_or_else(|| EngineError::GroupNotFound(name.to_string()))?;
        group.attrs.modify(attr, op)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn grp_attr(&self, name: &str) -> Result<Vec<(String, AttrValue)>, EngineError> {
        Ok(self.group(name)?.attrs.list_all())
    }

    // -------------------------------------------------------------------
    // snapshot
    // -------------------------------------------------------------------

    /// Full snapshot of the node for the `dump` operation.
    pub fn dump(&self) -> serde_json::Value {
        let groups: serde_json::Map<String, serde_json::Value> = self
            .groups
            .values()
            .map(|group| {
                (
                    group.name.clone(),
                    json!({
                        "state": group.state(self.member_resources(group)),
                        "attributes": group.attrs.modified(),
                        "members": group.members,
                    }),
                )
            })
            .collect();
        let resources: serde_json::Map<String, serde_json::Value> = self
            .resources
            .values()
            .map(|res| {
                (
                    res.name.clone(),
                    json!({
                        "state": res.state,
                        "fault_count": res.fault_count,
                        "attributes": res.attrs.modified(),
                        "dependencies": res.parents,
                    }),
                )
            })
            .collect();
        json!({
            "system": { "attributes": self.attrs.modified() },
            "groups": groups,
            "resources": resources,
        })
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
