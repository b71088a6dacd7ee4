// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed attribute store backing resources, groups, and the node.
//!
//! Every entity carries an [`AttrTable`] seeded from a static schema of
//! [`AttrSpec`] descriptors. Values are stored as strings (or string
//! lists); the declared kind is checked on `set` so ints and booleans are
//! always parseable at point of use. Only values differing from their
//! default are persisted to the config file.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An attribute value: a scalar string or a list of strings.
///
/// Untagged so config JSON reads naturally: `"10"` or `["h1", "h2"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Str(String),
    List(Vec<String>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            AttrValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            AttrValue::Str(_) => None,
            AttrValue::List(items) => Some(items),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(items: Vec<String>) -> Self {
        AttrValue::List(items)
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Str(s) => write!(f, "{}", s),
            AttrValue::List(items) => write!(f, "{}", items.join(" ")),
        }
    }
}

/// Declared kind of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Str,
    Bool,
    Int,
    List,
}

/// Static default for an attribute descriptor.
#[derive(Debug, Clone, Copy)]
pub enum AttrDefault {
    Str(&'static str),
    List(&'static [&'static str]),
}

/// Descriptor for one attribute: name, kind, default, description.
#[derive(Debug, Clone, Copy)]
pub struct AttrSpec {
    pub name: &'static str,
    pub kind: AttrKind,
    pub default: AttrDefault,
    pub description: &'static str,
}

impl AttrSpec {
    /// Deep-copied default value for a fresh instance.
    pub fn default_value(&self) -> AttrValue {
        match self.default {
            AttrDefault::Str(s) => AttrValue::Str(s.to_string()),
            AttrDefault::List(items) => {
                AttrValue::List(items.iter().map(|s| s.to_string()).collect())
            }
        }
    }
}

/// Errors from attribute access and mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttrError {
    #[error("unknown attribute: {0}")]
    Unknown(String),

    #[error("attribute {0} is not a list")]
    NotAList(String),

    #[error("attribute {0} is a list")]
    IsAList(String),

    #[error("attribute {name} requires a {expected} value")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("attribute {0} does not contain {1}")]
    MissingItem(String, String),
}

/// Modification applied to an attribute: replace, or list append/remove.
///
/// Append/remove are first-class so the CLI `-append`/`-remove` flags
/// preserve list identity instead of round-tripping the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ModifyOp {
    Set { value: AttrValue },
    Append { value: String },
    Remove { value: String },
}

/// Typed key/value bag with defaults and modification tracking.
#[derive(Debug, Clone)]
pub struct AttrTable {
    specs: &'static [AttrSpec],
    values: IndexMap<String, AttrValue>,
}

impl AttrTable {
    /// Create a table seeded with deep-copied defaults from the schema.
    pub fn new(specs: &'static [AttrSpec]) -> Self {
        let values = specs
            .iter()
            .map(|spec| (spec.name.to_string(), spec.default_value()))
            .collect();
        Self { specs, values }
    }

    pub fn spec(&self, name: &str) -> Option<&'static AttrSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    pub fn get(&self, name: &str) -> Result<&AttrValue, AttrError> {
        self.values
            .get(name)
            .ok_or_else(|| AttrError::Unknown(name.to_string()))
    }

    pub fn get_str(&self, name: &str) -> Result<&str, AttrError> {
        self.get(name)?
            .as_str()
            .ok_or_else(|| AttrError::IsAList(name.to_string()))
    }

    pub fn get_list(&self, name: &str) -> Result<&[String], AttrError> {
        self.get(name)?
            .as_list()
            .ok_or_else(|| AttrError::NotAList(name.to_string()))
    }

    pub fn get_int(&self, name: &str) -> Result<i64, AttrError> {
        let raw = self.get_str(name)?;
        raw.parse()
            .map_err(|_| AttrError::TypeMismatch {
                name: name.to_string(),
                expected: "int",
            })
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, AttrError> {
        match self.get_str(name)? {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(AttrError::TypeMismatch {
                name: name.to_string(),
                expected: "boolean",
            }),
        }
    }

    /// Set an attribute, checking the value against the declared kind.
    pub fn set(&mut self, name: &str, value: AttrValue) -> Result<(), AttrError> {
        let spec = self
            .spec(name)
            .ok_or_else(|| AttrError::Unknown(name.to_string()))?;

        match (spec.kind, &value) {
            (AttrKind::List, AttrValue::List(_)) => {}
            (AttrKind::List, AttrValue::Str(_)) => {
                return Err(AttrError::TypeMismatch {
                    name: name.to_string(),
                    expected: "list",
                })
            }
            (_, AttrValue::List(_)) => {
                return Err(AttrError::IsAList(name.to_string()));
            }
            (AttrKind::Str, AttrValue::Str(_)) => {}
            (AttrKind::Bool, AttrValue::Str(raw)) => {
                if raw != "true" && raw != "false" {
                    return Err(AttrError::TypeMismatch {
                        name: name.to_string(),
                        expected: "boolean",
                    });
                }
            }
            (AttrKind::Int, AttrValue::Str(raw)) => {
                if raw.parse::<i64>().is_err() {
                    return Err(AttrError::TypeMismatch {
                        name: name.to_string(),
                        expected: "int",
                    });
                }
            }
        }

        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Append an item to a list attribute.
    pub fn append(&mut self, name: &str, item: String) -> Result<(), AttrError> {
        let spec = self
            .spec(name)
            .ok_or_else(|| AttrError::Unknown(name.to_string()))?;
        if spec.kind != AttrKind::List {
            return Err(AttrError::NotAList(name.to_string()));
        }
        if let Some(AttrValue::List(items)) = self.values.get_mut(name) {
            items.push(item);
        }
        Ok(())
    }

    /// Remove an item from a list attribute.
    pub fn remove(&mut self, name: &str, item: &str) -> Result<(), AttrError> {
        let spec = self
            .spec(name)
            .ok_or_else(|| AttrError::Unknown(name.to_string()))?;
        if spec.kind != AttrKind::List {
            return Err(AttrError::NotAList(name.to_string()));
        }
        if let Some(AttrValue::List(items)) = self.values.get_mut(name) {
            let before = items.len();
            items.retain(|existing| existing != item);
            if items.len() == before {
                return Err(AttrError::MissingItem(name.to_string(), item.to_string()));
            }
        }
        Ok(())
    }

    /// Apply a [`ModifyOp`].
    pub fn modify(&mut self, name: &str, op: ModifyOp) -> Result<(), AttrError> {
        match op {
            ModifyOp::Set { value } => self.set(name, value),
            ModifyOp::Append { value } => self.append(name, value),
            ModifyOp::Remove { value } => self.remove(name, &value),
        }
    }

    /// All attributes in schema order.
    pub fn list_all(&self) -> Vec<(String, AttrValue)> {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Attributes whose current value differs from the schema default.
    pub fn modified(&self) -> IndexMap<String, AttrValue> {
        self.values
            .iter()
            .filter(|(name, value)| {
                self.spec(name)
                    .map(|spec| spec.default_value() != **value)
                    .unwrap_or(true)
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

/// Per-resource attribute schema.
pub fn resource_attributes() -> &'static [AttrSpec] {
    const SPECS: &[AttrSpec] = &[
        AttrSpec {
            name: "Group",
            kind: AttrKind::Str,
            default: AttrDefault::Str(""),
            description: "Service group this resource belongs to",
        },
        AttrSpec {
            name: "Enabled",
            kind: AttrKind::Bool,
            default: AttrDefault::Str("false"),
            description: "",
        },
        AttrSpec {
            name: "MonitorOnly",
            kind: AttrKind::Bool,
            default: AttrDefault::Str("false"),
            description: "Observe the resource without ever starting or stopping it",
        },
        AttrSpec {
            name: "StartProgram",
            kind: AttrKind::Str,
            default: AttrDefault::Str(""),
            description: "",
        },
        AttrSpec {
            name: "StopProgram",
            kind: AttrKind::Str,
            default: AttrDefault::Str(""),
            description: "",
        },
        AttrSpec {
            name: "MonitorProgram",
            kind: AttrKind::Str,
            default: AttrDefault::Str(""),
            description: "",
        },
        AttrSpec {
            name: "OnlineTimeout",
            kind: AttrKind::Int,
            default: AttrDefault::Str("60"),
            description: "Maximum time (in seconds) within which the start \
                          program must complete or else be terminated",
        },
        AttrSpec {
            name: "OfflineTimeout",
            kind: AttrKind::Int,
            default: AttrDefault::Str("60"),
            description: "Maximum time (in seconds) within which the stop \
                          program must complete or else be terminated",
        },
        AttrSpec {
            name: "MonitorTimeout",
            kind: AttrKind::Int,
            default: AttrDefault::Str("60"),
            description: "Maximum time (in seconds) within which the monitor \
                          program must complete or else be terminated",
        },
        AttrSpec {
            name: "MonitorInterval",
            kind: AttrKind::Int,
            default: AttrDefault::Str("55"),
            description: "Seconds between monitor polls while online",
        },
        AttrSpec {
            name: "OfflineMonitorInterval",
            kind: AttrKind::Int,
            default: AttrDefault::Str("55"),
            description: "Seconds between monitor polls while offline",
        },
        AttrSpec {
            name: "RestartLimit",
            kind: AttrKind::Int,
            default: AttrDefault::Str("3"),
            description: "Number of times to retry bringing the resource online \
                          when it is taken offline unexpectedly before declaring \
                          it faulted",
        },
        AttrSpec {
            name: "Load",
            kind: AttrKind::Int,
            default: AttrDefault::Str("0"),
            description: "Weight used for least-loaded group placement",
        },
    ];
    SPECS
}

/// Per-group attribute schema.
pub fn group_attributes() -> &'static [AttrSpec] {
    const SPECS: &[AttrSpec] = &[
        AttrSpec {
            name: "SystemList",
            kind: AttrKind::List,
            default: AttrDefault::List(&[]),
            description: "Ordered list of node names allowed to host this group",
        },
        AttrSpec {
            name: "Enabled",
            kind: AttrKind::Bool,
            default: AttrDefault::Str("false"),
            description: "",
        },
        AttrSpec {
            name: "AutoStart",
            kind: AttrKind::Bool,
            default: AttrDefault::Str("false"),
            description: "Bring the group online automatically after startup",
        },
        AttrSpec {
            name: "IgnoreDisabled",
            kind: AttrKind::Bool,
            default: AttrDefault::Str("false"),
            description: "Exclude disabled members from the aggregate state",
        },
        AttrSpec {
            name: "Parallel",
            kind: AttrKind::Bool,
            default: AttrDefault::Str("false"),
            description: "Allow the group online on multiple nodes at once",
        },
    ];
    SPECS
}

/// Node (system) attribute schema.
pub fn node_attributes() -> &'static [AttrSpec] {
    const SPECS: &[AttrSpec] = &[
        AttrSpec {
            name: "ClusterName",
            kind: AttrKind::Str,
            default: AttrDefault::Str(""),
            description: "",
        },
        AttrSpec {
            name: "NodeName",
            kind: AttrKind::Str,
            default: AttrDefault::Str(""),
            description: "This node's name; fixed at startup",
        },
        AttrSpec {
            name: "NodeList",
            kind: AttrKind::List,
            default: AttrDefault::List(&[]),
            description: "All nodes in the cluster, including this one",
        },
        AttrSpec {
            name: "GroupLimit",
            kind: AttrKind::Int,
            default: AttrDefault::Str("200"),
            description: "Maximum number of groups",
        },
        AttrSpec {
            name: "ResourceLimit",
            kind: AttrKind::Int,
            default: AttrDefault::Str("5000"),
            description: "Maximum number of resources",
        },
        AttrSpec {
            name: "BackupInterval",
            kind: AttrKind::Int,
            default: AttrDefault::Str("5"),
            description: "Minutes between config backups when modified",
        },
    ];
    SPECS
}

#[cfg(test)]
#[path = "attributes_tests.rs"]
mod tests;
