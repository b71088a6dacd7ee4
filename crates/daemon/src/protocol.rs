// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol for the engine's RPC surface.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. The
//! same framing runs over the local Unix socket and the peer TCP port.
//!
//! Mutating requests carry a `remote` flag: set on fan-out hops so a
//! peer applies the change without re-broadcasting it. Read requests
//! accept a `cluster` flag to collect one row per node.

use ics_core::alert::Alert;
use ics_core::attributes::{AttrValue, ModifyOp};
use ics_core::config::ConfigData;
use ics_core::states::{GroupState, ResourceState};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Request from a CLI or a peer node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Liveness check
    Ping,

    // -- node --
    NodeAdd {
        host: String,
    },
    NodeDelete {
        host: String,
    },
    NodeList,
    NodeAttr,
    NodeValue {
        attr: String,
    },
    NodeModify {
        attr: String,
        op: ModifyOp,
        #[serde(default)]
        remote: bool,
    },
    /// Current load of this node, for placement.
    NodeLoad,

    // -- resources --
    ResAdd {
        name: String,
        group: String,
        #[serde(default)]
        remote: bool,
    },
    ResDelete {
        name: String,
        #[serde(default)]
        remote: bool,
    },
    ResOnline {
        name: String,
        #[serde(default)]
        node: Option<String>,
    },
    ResOffline {
        name: String,
        #[serde(default)]
        node: Option<String>,
    },
    ResState {
        #[serde(default)]
        names: Vec<String>,
        #[serde(default)]
        cluster: bool,
    },
    ResLink {
        parent: String,
        child: String,
        #[serde(default)]
        remote: bool,
    },
    ResUnlink {
        parent: String,
        child: String,
        #[serde(default)]
        remote: bool,
    },
    ResClear {
        name: String,
        #[serde(default)]
        remote: bool,
    },
    ResProbe {
        name: String,
    },
    ResFlush {
        name: String,
    },
    ResDep {
        #[serde(default)]
        names: Vec<String>,
    },
    ResList {
        #[serde(default)]
        cluster: bool,
    },
    ResValue {
        name: String,
        attr: String,
        #[serde(default)]
        cluster: bool,
    },
    ResModify {
        name: String,
        attr: String,
        op: ModifyOp,
        #[serde(default)]
        remote: bool,
    },
    ResAttr {
        name: String,
    },
    /// Block until the resource reaches `state` or the timeout elapses.
    ResWait {
        name: String,
        state: ResourceState,
        timeout_secs: u64,
    },

    // -- groups --
    GrpAdd {
        name: String,
        #[serde(default)]
        remote: bool,
    },
    GrpDelete {
        name: String,
        #[serde(default)]
        remote: bool,
    },
    GrpOnline {
        name: String,
        #[serde(default)]
        node: Option<String>,
    },
    GrpOffline {
        name: String,
        #[serde(default)]
        node: Option<String>,
    },
    GrpState {
        #[serde(default)]
        names: Vec<String>,
        #[serde(default)]
        cluster: bool,
    },
    GrpEnable {
        name: String,
        #[serde(default)]
        remote: bool,
    },
    GrpDisable {
        name: String,
        #[serde(default)]
        remote: bool,
    },
    GrpEnableResources {
        name: String,
        #[serde(default)]
        remote: bool,
    },
    GrpDisableResources {
        name: String,
        #[serde(default)]
        remote: bool,
    },
    GrpFlush {
        name: String,
        #[serde(default)]
        node: Option<String>,
    },
    GrpClear {
        name: String,
        #[serde(default)]
        node: Option<String>,
    },
    GrpResources {
        name: String,
    },
    GrpList {
        #[serde(default)]
        cluster: bool,
    },
    GrpValue {
        name: String,
        attr: String,
        #[serde(default)]
        cluster: bool,
    },
    GrpModify {
        name: String,
        attr: String,
        op: ModifyOp,
        #[serde(default)]
        remote: bool,
    },
    GrpAttr {
        name: String,
    },
    GrpWait {
        name: String,
        state: GroupState,
        timeout_secs: u64,
    },

    // -- server --
    /// Full snapshot of the node.
    Dump,
    /// Apply a config snapshot (inverse of Dump for configuration).
    LoadConfig {
        data: ConfigData,
        #[serde(default)]
        remote: bool,
    },
    /// Append a client-issued command line to the audit log.
    LogCommand {
        line: String,
        #[serde(default)]
        remote: bool,
    },
    SetLogLevel {
        level: String,
    },

    // -- alerts --
    AlertAdd {
        alert: Alert,
    },
    AlertLevel,
    AlertSetLevel {
        level: String,
        #[serde(default)]
        remote: bool,
    },
    AlertAddRecipient {
        address: String,
        #[serde(default)]
        remote: bool,
    },
    AlertRemoveRecipient {
        address: String,
        #[serde(default)]
        remote: bool,
    },
}

/// One state row; `node` is set when the result spans the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    pub name: String,
    pub state: String,
}

/// One dependency edge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepRow {
    pub group: String,
    pub parent: String,
    pub child: String,
}

/// One per-node attribute value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValueRow {
    pub node: String,
    pub value: AttrValue,
}

/// One per-node name listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NameRow {
    pub node: String,
    pub names: Vec<String>,
}

/// Response to a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    Ok,

    /// Liveness response
    Pong,

    /// Error response; engine state is unchanged
    Error { message: String },

    Value { value: AttrValue },

    /// Per-node values for cluster reads
    Values { rows: Vec<ValueRow> },

    Attrs { attrs: Vec<(String, AttrValue)> },

    Names { names: Vec<String> },

    /// Per-node name listings for cluster reads
    NameRows { rows: Vec<NameRow> },

    States { rows: Vec<StateRow> },

    Deps { rows: Vec<DepRow> },

    Dump { data: serde_json::Value },

    Load { load: i64 },

    Level { level: String },
}

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout")]
    Timeout,
}

/// Maximum message size (16 MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default IPC timeout
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Encode a message to JSON bytes (without length prefix)
///
/// Use with `write_message()` which handles the length-prefix wire format.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(msg)?;

    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    Ok(json)
}

/// Decode a message from wire format
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read a length-prefixed message from an async reader
pub async fn read_message<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Vec<u8>, ProtocolError> {
    // Read length prefix
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    // Read payload
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write a length-prefixed message to an async writer
pub async fn write_message<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    let len = data.len();
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a request with timeout
pub async fn read_request<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

/// Write a response with timeout
pub async fn write_response<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
