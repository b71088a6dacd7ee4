// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events driving the engine's state transitions.
//!
//! All resource state mutation happens in the single event dispatcher:
//! state events are emitted by `change_state`, poll events by the poll
//! scheduler and command reaper, and request events are enqueued by the
//! RPC surface so client threads never touch resource state directly.

use crate::states::ResourceState;
use serde::{Deserialize, Serialize};

/// Events consumed by the engine dispatcher, strictly FIFO per resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    // -- resource state events, emitted by change_state --
    #[serde(rename = "resource:offline")]
    ResourceOffline {
        resource: String,
        last_state: ResourceState,
    },

    #[serde(rename = "resource:starting")]
    ResourceStarting {
        resource: String,
        last_state: ResourceState,
    },

    #[serde(rename = "resource:online")]
    ResourceOnline {
        resource: String,
        last_state: ResourceState,
    },

    #[serde(rename = "resource:stopping")]
    ResourceStopping {
        resource: String,
        last_state: ResourceState,
    },

    #[serde(rename = "resource:faulted")]
    ResourceFaulted {
        resource: String,
        last_state: ResourceState,
    },

    #[serde(rename = "resource:unknown")]
    ResourceUnknown {
        resource: String,
        last_state: ResourceState,
    },

    // -- poll events --
    /// Launch the monitor program.
    #[serde(rename = "poll:run")]
    PollRun { resource: String },

    /// Monitor program reported the resource online (exit 110).
    #[serde(rename = "poll:online")]
    PollOnline { resource: String },

    /// Monitor program reported the resource offline (exit 100).
    #[serde(rename = "poll:offline")]
    PollOffline { resource: String },

    /// Monitor program reported anything else.
    #[serde(rename = "poll:unknown")]
    PollUnknown { resource: String },

    // -- request events enqueued by the RPC surface --
    #[serde(rename = "resource:state-request")]
    StateRequest {
        resource: String,
        target: ResourceState,
    },

    #[serde(rename = "resource:flush")]
    ResourceFlush { resource: String },

    #[serde(rename = "resource:clear")]
    ResourceClear { resource: String },

    #[serde(rename = "group:start")]
    GroupStart { group: String },

    #[serde(rename = "group:stop")]
    GroupStop { group: String },

    #[serde(rename = "group:flush")]
    GroupFlush { group: String },

    #[serde(rename = "group:clear")]
    GroupClear { group: String },
}

impl EngineEvent {
    /// Name of the resource this event targets, if any.
    pub fn resource(&self) -> Option<&str> {
        match self {
            EngineEvent::ResourceOffline { resource, .. }
            | EngineEvent::ResourceStarting { resource, .. }
            | EngineEvent::ResourceOnline { resource, .. }
            | EngineEvent::ResourceStopping { resource, .. }
            | EngineEvent::ResourceFaulted { resource, .. }
            | EngineEvent::ResourceUnknown { resource, .. }
            | EngineEvent::PollRun { resource }
            | EngineEvent::PollOnline { resource }
            | EngineEvent::PollOffline { resource }
            | EngineEvent::PollUnknown { resource }
            | EngineEvent::StateRequest { resource, .. }
            | EngineEvent::ResourceFlush { resource }
            | EngineEvent::ResourceClear { resource } => Some(resource),
            _ => None,
        }
    }

    /// Event class bound to a target state, carrying the state it left.
    pub fn for_state(
        resource: impl Into<String>,
        new_state: ResourceState,
        last_state: ResourceState,
    ) -> Self {
        let resource = resource.into();
        match new_state {
            ResourceState::Offline => EngineEvent::ResourceOffline {
                resource,
                last_state,
            },
            ResourceState::Starting => EngineEvent::ResourceStarting {
                resource,
                last_state,
            },
            ResourceState::Online => EngineEvent::ResourceOnline {
                resource,
                last_state,
            },
            ResourceState::Stopping => EngineEvent::ResourceStopping {
                resource,
                last_state,
            },
            ResourceState::Faulted => EngineEvent::ResourceFaulted {
                resource,
                last_state,
            },
            ResourceState::Unknown => EngineEvent::ResourceUnknown {
                resource,
                last_state,
            },
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
