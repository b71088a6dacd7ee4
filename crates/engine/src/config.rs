// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config persistence: `main.cf` load/save and the dirty-flag persister.
//!
//! Only non-default attributes are written. On load, groups come first,
//! then resources, then dependency links, so parents always exist at
//! link time. Saves keep `main.cf.autobackup` plus a timestamped copy.

use crate::alerts::AlertSettings;
use crate::error::EngineError;
use crate::node::NodeEngine;
use chrono::Local;
use ics_core::alert::AlertLevel;
use ics_core::attributes::{AttrValue, ModifyOp};
use ics_core::config::{AttrSection, ConfigData, GroupConfig, ResourceConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read the config file. A missing file is not an error.
pub fn read_config(path: &Path) -> Result<Option<ConfigData>, ConfigError> {
    if !path.is_file() {
        info!(path = %path.display(), "no config found, skipping load");
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Write the config atomically (temp file + rename).
pub fn write_config(path: &Path, data: &ConfigData) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(data)?;
    let tmp = suffixed(path, "tmp");
    std::fs::write(&tmp, json + "\n")?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Write the config, keeping the previous file as `.autobackup` and
/// copying the fresh one to a `.YYMMDD_HHMMSS` backup.
pub fn persist(path: &Path, data: &ConfigData) -> Result<(), ConfigError> {
    if path.is_file() {
        let _ = std::fs::rename(path, suffixed(path, "autobackup"));
    }
    write_config(path, data)?;
    let stamp = Local::now().format("%y%m%d_%H%M%S").to_string();
    let _ = std::fs::copy(path, suffixed(path, &stamp));
    Ok(())
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("main.cf");
    path.with_file_name(format!("{}.{}", name, suffix))
}

/// Snapshot the engine + alert settings as config data. Only modified
/// attributes are included.
pub fn config_data(engine: &NodeEngine, alerts: &AlertSettings) -> ConfigData {
    let node_name = engine.node_name();
    let mut system = engine.attrs.modified();
    // NodeName is host-derived and never read back; a NodeList holding
    // only this node is the seeded default. Neither is configuration.
    system.shift_remove("NodeName");
    let trivial_node_list = matches!(
        system.get("NodeList"),
        Some(AttrValue::List(nodes)) if nodes.len() == 1 && nodes[0] == node_name
    );
    if trivial_node_list {
        system.shift_remove("NodeList");
    }

    let mut data = ConfigData {
        system: AttrSection { attributes: system },
        ..ConfigData::default()
    };

    data.alerts.attributes.insert(
        "AlertLevel".to_string(),
        AttrValue::from(alerts.level.name()),
    );
    data.alerts.attributes.insert(
        "AlertRecipients".to_string(),
        AttrValue::List(alerts.recipients.clone()),
    );

    for group in engine.groups() {
        data.groups.insert(
            group.name.clone(),
            GroupConfig {
                attributes: group.attrs.modified(),
            },
        );
    }
    for resource in engine.resources() {
        data.resources.insert(
            resource.name.clone(),
            ResourceConfig {
                attributes: resource.attrs.modified(),
                dependencies: resource.parents.clone(),
            },
        );
    }
    data
}

/// Apply config data to a fresh engine. Groups are created before
/// resources, links last.
pub fn apply(
    engine: &mut NodeEngine,
    alerts: &mut AlertSettings,
    data: &ConfigData,
) -> Result<(), EngineError> {
    for (attr, value) in &data.system.attributes {
        // NodeName is never persisted; a value in a hand-edited or
        // foreign config must not change this node's identity.
        if attr == "NodeName" {
            continue;
        }
        engine.attrs.set(attr, value.clone())?;
    }
    // NodeList always contains this node, even from a foreign config.
    let me = engine.node_name();
    if engine.node_list().iter().all(|node| *node != me) {
        engine.attrs.append("NodeList", me)?;
    }

    if let Some(level) = data.alerts.attributes.get("AlertLevel") {
        let raw = level.as_str().unwrap_or_default();
        let parsed = raw
            .parse::<AlertLevel>()
            .map_err(|_| EngineError::InvalidLevel(raw.to_string()))?;
        alerts.level = parsed;
    }
    if let Some(AttrValue::List(recipients)) = data.alerts.attributes.get("AlertRecipients") {
        for recipient in recipients {
            if !alerts.recipients.contains(recipient) {
                alerts.recipients.push(recipient.clone());
            }
        }
    }

    for (name, group) in &data.groups {
        engine.grp_add(name)?;
        for (attr, value) in &group.attributes {
            engine.grp_modify(
                name,
                attr,
                ModifyOp::Set {
                    value: value.clone(),
                },
            )?;
        }
    }

    for (name, resource) in &data.resources {
        let group = resource
            .attributes
            .get("Group")
            .and_then(|value| value.as_str())
            .unwrap_or_default();
        engine.res_add(name, group)?;
        for (attr, value) in &resource.attributes {
            if attr == "Group" {
                continue;
            }
            engine.res_modify(
                name,
                attr,
                ModifyOp::Set {
                    value: value.clone(),
                },
            )?;
        }
    }

    for (name, resource) in &data.resources {
        for parent in &resource.dependencies {
            engine.res_link(parent, name)?;
        }
    }
    Ok(())
}

/// Background task persisting the config when the dirty flag is set,
/// paced by the `BackupInterval` attribute (minutes, 0 disables).
pub struct Persister {
    path: PathBuf,
    engine: Arc<parking_lot::Mutex<NodeEngine>>,
    alerts: Arc<parking_lot::Mutex<AlertSettings>>,
    dirty: Arc<AtomicBool>,
}

impl Persister {
    pub fn new(
        path: PathBuf,
        engine: Arc<parking_lot::Mutex<NodeEngine>>,
        alerts: Arc<parking_lot::Mutex<AlertSettings>>,
        dirty: Arc<AtomicBool>,
    ) -> Self {
        Self {
            path,
            engine,
            alerts,
            dirty,
        }
    }

    /// Snapshot and persist immediately; used at shutdown.
    pub fn persist_now(&self) -> Result<(), ConfigError> {
        let data = {
            let engine = self.engine.lock();
            let alerts = self.alerts.lock();
            config_data(&engine, &alerts)
        };
        persist(&self.path, &data)?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub async fn run(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_write: Option<Instant> = None;

        loop {
            interval.tick().await;

            let backup_minutes = {
                let engine = self.engine.lock();
                engine.attrs.get_int("BackupInterval").unwrap_or(5)
            };
            if backup_minutes <= 0 {
                continue;
            }
            if !self.dirty.load(Ordering::SeqCst) {
                continue;
            }
            let due = last_write
                .map(|at| at.elapsed() >= Duration::from_secs(backup_minutes as u64 * 60))
                .unwrap_or(true);
            if !due {
                continue;
            }

            match self.persist_now() {
                Ok(()) => {
                    debug!(path = %self.path.display(), "config persisted");
                    last_write = Some(Instant::now());
                }
                Err(err) => error!(error = %err, "unable to persist config"),
            }
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
