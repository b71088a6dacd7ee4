// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single managed resource: its attributes, runtime state, and the
//! at-most-one child process running a start/stop/monitor program.

use ics_core::attributes::{resource_attributes, AttrTable, AttrValue};
use ics_core::states::ResourceState;
use std::fs::File;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Which program an in-flight child process is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdType {
    Start,
    Stop,
    Poll,
}

impl std::fmt::Display for CmdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CmdType::Start => write!(f, "start"),
            CmdType::Stop => write!(f, "stop"),
            CmdType::Poll => write!(f, "poll"),
        }
    }
}

/// In-flight child process with its monotonic deadline.
#[derive(Debug)]
pub struct ChildCmd {
    child: Child,
    pub cmd_type: CmdType,
    pub deadline: Instant,
}

/// Result of a non-blocking command check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdStatus {
    Running,
    Exited(i32),
    TimedOut,
}

/// Why a program failed to launch.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no program configured")]
    Missing,
    #[error("spawn failed: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One managed unit. Parents and children are names within the same
/// group, resolved against the engine registry at use time.
#[derive(Debug)]
pub struct Resource {
    pub name: String,
    pub attrs: AttrTable,
    pub state: ResourceState,
    /// Unix seconds of the last completed poll; seeded with a negative
    /// random offset so a freshly-loaded config does not poll-stampede.
    pub last_poll: i64,
    pub poll_in_flight: bool,
    pub fault_count: i64,
    pub propagate: bool,
    pub parents: Vec<String>,
    pub children: Vec<String>,
    pub cmd: Option<ChildCmd>,
}

impl Resource {
    pub fn new(name: impl Into<String>, group: &str, now_epoch: i64) -> Self {
        let mut attrs = AttrTable::new(resource_attributes());
        // Group membership is schema-checked; a plain string always fits.
        let _ = attrs.set("Group", AttrValue::from(group));
        let jitter = rand::random_range(0..60i64);
        Self {
            name: name.into(),
            attrs,
            state: ResourceState::Offline,
            last_poll: now_epoch - jitter,
            poll_in_flight: false,
            fault_count: 0,
            propagate: false,
            parents: Vec::new(),
            children: Vec::new(),
            cmd: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.attrs.get_bool("Enabled").unwrap_or(false)
    }

    pub fn monitor_only(&self) -> bool {
        self.attrs.get_bool("MonitorOnly").unwrap_or(false)
    }

    pub fn group_name(&self) -> String {
        self.attrs.get_str("Group").unwrap_or_default().to_string()
    }

    pub fn load(&self) -> i64 {
        self.attrs.get_int("Load").unwrap_or(0)
    }

    pub fn restart_limit(&self) -> i64 {
        self.attrs.get_int("RestartLimit").unwrap_or(0)
    }

    /// Poll interval for the current state, in seconds.
    pub fn poll_interval(&self) -> i64 {
        let attr = if self.state.is_online_state() {
            "MonitorInterval"
        } else {
            "OfflineMonitorInterval"
        };
        self.attrs.get_int(attr).unwrap_or(60)
    }

    fn program_for(&self, cmd_type: CmdType) -> String {
        let attr = match cmd_type {
            CmdType::Start => "StartProgram",
            CmdType::Stop => "StopProgram",
            CmdType::Poll => "MonitorProgram",
        };
        self.attrs.get_str(attr).unwrap_or_default().to_string()
    }

    fn timeout_for(&self, cmd_type: CmdType) -> u64 {
        let attr = match cmd_type {
            CmdType::Start => "OnlineTimeout",
            CmdType::Stop => "OfflineTimeout",
            CmdType::Poll => "MonitorTimeout",
        };
        self.attrs.get_int(attr).unwrap_or(60).max(0) as u64
    }

    /// Launch the program for `cmd_type`, redirecting output to the
    /// resource log. At most one child is alive per resource: an
    /// in-flight command (a monitor poll overtaken by a start/stop) is
    /// killed first.
    pub fn launch(
        &mut self,
        cmd_type: CmdType,
        log: Option<File>,
        now: Instant,
    ) -> Result<(), LaunchError> {
        if self.cmd_type() == Some(CmdType::Poll) {
            self.poll_in_flight = false;
        }
        self.kill_cmd();

        let program = self.program_for(cmd_type);
        let mut parts = program.split_whitespace();
        let Some(argv0) = parts.next() else {
            return Err(LaunchError::Missing);
        };

        debug!(resource = %self.name, %cmd_type, command = %program, "running command");
        let mut command = Command::new(argv0);
        command.args(parts);
        match log {
            Some(file) => {
                let stderr = file.try_clone()?;
                command.stdout(Stdio::from(file)).stderr(Stdio::from(stderr));
            }
            None => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let child = command.spawn()?;
        self.cmd = Some(ChildCmd {
            child,
            cmd_type,
            deadline: now + Duration::from_secs(self.timeout_for(cmd_type)),
        });
        Ok(())
    }

    /// Non-blocking check of the in-flight command.
    pub fn check_cmd(&mut self, now: Instant) -> Option<CmdStatus> {
        let cmd = self.cmd.as_mut()?;
        match cmd.child.try_wait() {
            Ok(Some(status)) => Some(CmdStatus::Exited(status.code().unwrap_or(-1))),
            Ok(None) if now >= cmd.deadline => Some(CmdStatus::TimedOut),
            Ok(None) => Some(CmdStatus::Running),
            // A wait error means the child is gone; treat as a failed exit.
            Err(_) => Some(CmdStatus::Exited(-1)),
        }
    }

    /// Kill and reap the in-flight command, if any.
    pub fn kill_cmd(&mut self) {
        if let Some(mut cmd) = self.cmd.take() {
            let _ = cmd.child.kill();
            let _ = cmd.child.wait();
        }
    }

    pub fn reset_cmd(&mut self) {
        self.cmd = None;
    }

    pub fn cmd_type(&self) -> Option<CmdType> {
        self.cmd.as_ref().map(|cmd| cmd.cmd_type)
    }
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
