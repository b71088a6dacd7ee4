// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data model of the JSON config file (`main.cf`).
//!
//! Only non-default attributes appear. Resources are created before
//! dependency edges on load, so parents always exist at link time.

use crate::attributes::AttrValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Top-level config file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigData {
    #[serde(default)]
    pub system: AttrSection,
    #[serde(default)]
    pub alerts: AttrSection,
    #[serde(default)]
    pub groups: IndexMap<String, GroupConfig>,
    #[serde(default)]
    pub resources: IndexMap<String, ResourceConfig>,
}

/// A bare `{"attributes": {...}}` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrSection {
    #[serde(default)]
    pub attributes: IndexMap<String, AttrValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    #[serde(default)]
    pub attributes: IndexMap<String, AttrValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub attributes: IndexMap<String, AttrValue>,
    /// Parent resource names this resource depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
