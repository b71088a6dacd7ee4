// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for engine operations.
//!
//! These are the user-facing domain errors: the RPC surface returns them
//! to the caller and engine state is left unchanged.

use ics_core::attributes::AttrError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Attr(#[from] AttrError),

    #[error("resource {0} does not exist")]
    ResourceNotFound(String),

    #[error("resource {0} already exists")]
    ResourceExists(String),

    #[error("group {0} does not exist")]
    GroupNotFound(String),

    #[error("group {0} already exists")]
    GroupExists(String),

    #[error("max resource count reached ({0}), unable to add new resource")]
    ResourceLimit(i64),

    #[error("max group count reached ({0}), unable to add new group")]
    GroupLimit(i64),

    #[error("unable to delete group {0}, group still contains resources")]
    GroupNotEmpty(String),

    #[error("unable to link {child} to {parent}, resources not in same group")]
    CrossGroupLink { parent: String, child: String },

    #[error("unable to link {child} to {parent}, link would create a cycle")]
    DependencyCycle { parent: String, child: String },

    #[error("resources {parent} and {child} are already linked")]
    AlreadyLinked { parent: String, child: String },

    #[error("resources {parent} and {child} are not linked")]
    NotLinked { parent: String, child: String },

    #[error("unable to change state of resource {0}, MonitorOnly mode enabled")]
    MonitorOnly(String),

    #[error("unable to online group {0}, group is disabled")]
    GroupDisabled(String),

    #[error("attribute {0} cannot be modified at runtime")]
    ImmutableAttribute(String),

    #[error("NodeList must contain this node ({0})")]
    InvalidNodeList(String),

    #[error("node {0} is this node")]
    NodeIsSelf(String),

    #[error("node {0} is already in the cluster")]
    NodeExists(String),

    #[error("node {0} is not in the cluster")]
    NodeNotFound(String),

    #[error("invalid alert level: {0}")]
    InvalidLevel(String),
}
