// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ics-engine: the per-node supervision engine.
//!
//! Owns the resource and group registries, the resource state machine and
//! its event dispatcher, the once-per-second poll scheduler that drives
//! monitor/start/stop child processes, the alert pipeline, and config
//! persistence. Cluster fan-out and the wire protocol live in the daemon.

pub mod alerts;
pub mod config;
pub mod error;
pub mod events;
pub mod group;
pub mod logs;
pub mod node;
pub mod poller;
pub mod resource;

pub use alerts::{AlertHandler, AlertSettings, MailError, Mailer, SendmailMailer};
pub use config::{apply, config_data, persist, read_config, write_config, ConfigError, Persister};
pub use error::EngineError;
pub use group::Group;
pub use node::{EventSender, NodeEngine};
pub use resource::{CmdStatus, CmdType, Resource};

#[cfg(any(test, feature = "test-support"))]
pub use alerts::FakeMailer;

#[cfg(test)]
pub(crate) mod test_helpers;
