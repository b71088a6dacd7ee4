// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The poll scheduler: a once-per-second sweep over all resources.
//!
//! Reaps finished child processes (non-blocking), kills children past
//! their deadline, and enqueues monitor polls when a resource's interval
//! has elapsed. On engine start every resource is probed once, bounded
//! to 30 concurrent polls, before normal scheduling and AutoStart kick in.

use crate::node::{NodeEngine, StartupProbe, STARTUP_POLL_LIMIT};
use crate::resource::{CmdStatus, CmdType};
use ics_core::alert::AlertLevel;
use ics_core::event::EngineEvent;
use tracing::{debug, info, warn};

impl NodeEngine {
    /// One scheduler tick. Runs under the engine lock; never blocks on a
    /// child process.
    pub fn poll_tick(&mut self) {
        let names: Vec<String> = self.resources.keys().cloned().collect();
        for name in &names {
            let Some(resource) = self.resources.get(name) else {
                continue;
            };
            if !resource.enabled() {
                continue;
            }
            if resource.cmd.is_some() {
                self.check_cmd(name);
            } else if resource.state.is_transition() {
                // Waiting on the start/stop we just kicked off.
            } else if self.startup.is_none() {
                self.update_poll(name);
            }
        }
        if self.startup.is_some() {
            self.startup_tick();
        }
    }

    /// Reap or time out the in-flight command of one resource.
    fn check_cmd(&mut self, name: &str) {
        let now = self.clock.now();
        let status = match self.resources.get_mut(name) {
            Some(res) => res.check_cmd(now),
            None => None,
        };
        match status {
            Some(CmdStatus::Exited(code)) => self.handle_cmd(name, code),
            Some(CmdStatus::TimedOut) => self.cmd_timeout(name),
            _ => {}
        }
    }

    fn cmd_timeout(&mut self, name: &str) {
        let Some(cmd_type) = self.resources.get(name).and_then(|res| res.cmd_type()) else {
            return;
        };
        warn!(resource = name, %cmd_type, "timeout occurred while running command");
        self.alert(
            AlertLevel::Warning,
            name,
            format!("Resource {} timeout", cmd_type),
        );
        let epoch = self.clock.epoch_secs();
        if let Some(res) = self.resources.get_mut(name) {
            res.kill_cmd();
            if cmd_type == CmdType::Poll {
                res.poll_in_flight = false;
                res.last_poll = epoch;
            }
        }
    }

    /// Dispatch on the exit code of a finished command.
    ///
    /// Start/stop results are advisory: a follow-up poll establishes
    /// ground truth. Poll exit codes are the probe answer itself.
    fn handle_cmd(&mut self, name: &str, code: i32) {
        let Some(cmd_type) = self.resources.get(name).and_then(|res| res.cmd_type()) else {
            return;
        };
        debug!(resource = name, %cmd_type, code, "command returned");

        match cmd_type {
            CmdType::Start | CmdType::Stop => {
                if code != 0 {
                    warn!(resource = name, %cmd_type, code, "command returned an error");
                }
                self.events.send(EngineEvent::PollRun {
                    resource: name.to_string(),
                });
            }
            CmdType::Poll => {
                let event = match code {
                    110 => EngineEvent::PollOnline {
                        resource: name.to_string(),
                    },
                    100 => EngineEvent::PollOffline {
                        resource: name.to_string(),
                    },
                    _ => {
                        warn!(resource = name, code, "unexpected monitor exit code");
                        EngineEvent::PollUnknown {
                            resource: name.to_string(),
                        }
                    }
                };
                let epoch = self.clock.epoch_secs();
                if let Some(res) = self.resources.get_mut(name) {
                    res.last_poll = epoch;
                    res.poll_in_flight = false;
                }
                self.events.send(event);
            }
        }

        if let Some(res) = self.resources.get_mut(name) {
            res.reset_cmd();
        }
    }

    /// Enqueue a monitor poll when the state-dependent interval elapsed.
    fn update_poll(&mut self, name: &str) {
        let epoch = self.clock.epoch_secs();
        let Some(resource) = self.resources.get_mut(name) else {
            return;
        };
        if resource.poll_in_flight {
            return;
        }
        if epoch - resource.last_poll >= resource.poll_interval() {
            debug!(resource = name, "ready for interval monitoring poll");
            resource.poll_in_flight = true;
            self.events.send(EngineEvent::PollRun {
                resource: name.to_string(),
            });
        }
    }

    /// Arm the startup probe. Disabled resources are skipped; an empty
    /// set goes straight to AutoStart.
    pub fn begin_startup_probe(&mut self) {
        let pending: Vec<String> = self
            .resources
            .values()
            .filter(|res| res.enabled())
            .map(|res| res.name.clone())
            .collect();
        if pending.is_empty() {
            self.grp_online_auto();
            return;
        }
        info!(count = pending.len(), "starting initial resource probe");
        self.startup = Some(StartupProbe {
            pending,
            launched: Vec::new(),
        });
    }

    fn startup_tick(&mut self) {
        let Some(mut probe) = self.startup.take() else {
            return;
        };

        // A launched resource whose poll finished is done.
        probe.pending.retain(|name| match self.resources.get(name) {
            Some(res) => {
                !(probe.launched.contains(name) && res.cmd.is_none() && !res.poll_in_flight)
            }
            None => false,
        });

        let in_flight = probe
            .pending
            .iter()
            .filter(|name| probe.launched.contains(*name))
            .count();
        let mut slots = STARTUP_POLL_LIMIT.saturating_sub(in_flight);

        let waiting: Vec<String> = probe
            .pending
            .iter()
            .filter(|name| !probe.launched.contains(*name))
            .cloned()
            .collect();
        for name in waiting {
            if slots == 0 {
                break;
            }
            if let Some(res) = self.resources.get_mut(&name) {
                res.poll_in_flight = true;
            }
            self.events.send(EngineEvent::PollRun {
                resource: name.clone(),
            });
            probe.launched.push(name);
            slots -= 1;
        }

        if probe.pending.is_empty() {
            info!("initial resource probe complete");
            self.grp_online_auto();
        } else {
            self.startup = Some(probe);
        }
    }
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
