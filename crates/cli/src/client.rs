// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client: one request/response exchange over the Unix socket.

use ics_daemon::protocol::{self, ProtocolError, Request, Response};
use ics_daemon::env;
use thiserror::Error;
use tokio::net::UnixStream;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("icsd is not running (socket {0})")]
    DaemonNotRunning(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

pub struct Client {
    stream: UnixStream,
}

impl Client {
    pub async fn connect() -> Result<Self, ClientError> {
        let path = env::uds_socket();
        let stream = UnixStream::connect(&path)
            .await
            .map_err(|_| ClientError::DaemonNotRunning(path.display().to_string()))?;
        Ok(Self { stream })
    }

    /// Send one request and wait for its response. Wait-style requests
    /// block server-side, so there is no client read timeout.
    pub async fn call(&mut self, request: &Request) -> Result<Response, ClientError> {
        let data = protocol::encode(request)?;
        protocol::write_message(&mut self.stream, &data).await?;
        let bytes = protocol::read_message(&mut self.stream).await?;
        Ok(protocol::decode(&bytes)?)
    }

    /// Fire-and-forget variant used for command audit logging.
    pub async fn log_command(&mut self, line: String) {
        let _ = self
            .call(&Request::LogCommand {
                line,
                remote: false,
            })
            .await;
    }
}
