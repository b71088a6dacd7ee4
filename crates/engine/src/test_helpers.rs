// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine unit tests.

use crate::node::{EventSender, NodeEngine};
use ics_core::alert::Alert;
use ics_core::attributes::{AttrValue, ModifyOp};
use ics_core::clock::FakeClock;
use ics_core::event::EngineEvent;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) struct TestEngine {
    pub engine: NodeEngine,
    pub events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    pub alerts_rx: mpsc::UnboundedReceiver<Alert>,
    pub clock: Arc<FakeClock>,
    pub dirty: Arc<AtomicBool>,
    _tmp: tempfile::TempDir,
}

impl TestEngine {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let clock = Arc::new(FakeClock::new());
        let (event_tx, events_rx) = mpsc::unbounded_channel();
        let (alert_tx, alerts_rx) = mpsc::unbounded_channel();
        let dirty = Arc::new(AtomicBool::new(false));
        let engine = NodeEngine::new(
            clock.clone(),
            EventSender::new(event_tx),
            alert_tx,
            dirty.clone(),
            tmp.path(),
        );
        Self {
            engine,
            events_rx,
            alerts_rx,
            clock,
            dirty,
            _tmp: tmp,
        }
    }

    /// Dispatch queued events until the queue runs dry, returning how
    /// many were processed.
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.engine.dispatch(event);
            processed += 1;
        }
        processed
    }

    /// Pop queued events without dispatching them.
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn take_alerts(&mut self) -> Vec<Alert> {
        let mut alerts = Vec::new();
        while let Ok(alert) = self.alerts_rx.try_recv() {
            alerts.push(alert);
        }
        alerts
    }

    /// Add an enabled group named `name`.
    pub fn add_group(&mut self, name: &str) {
        self.engine.grp_add(name).unwrap();
        self.engine
            .grp_modify(
                name,
                "Enabled",
                ModifyOp::Set {
                    value: AttrValue::from("true"),
                },
            )
            .unwrap();
    }

    /// Add an enabled resource to `group`.
    pub fn add_resource(&mut self, name: &str, group: &str) {
        self.engine.res_add(name, group).unwrap();
        self.set_attr(name, "Enabled", "true");
    }

    pub fn set_attr(&mut self, resource: &str, attr: &str, value: &str) {
        self.engine
            .res_modify(
                resource,
                attr,
                ModifyOp::Set {
                    value: AttrValue::from(value),
                },
            )
            .unwrap();
    }

    /// Write an executable shell script into the fixture dir.
    pub fn script(&self, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = self._tmp.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.display().to_string()
    }
}
