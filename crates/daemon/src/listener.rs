// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task: accepts local (Unix socket) and peer (TCP) connections
//! and serves protocol requests without blocking the engine loop.

use crate::cluster::Cluster;
use crate::protocol::{self, ProtocolError, DEFAULT_TIMEOUT};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tracing::{debug, warn};

/// Idle connections are dropped after this long without a request.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

pub struct Listener {
    unix: UnixListener,
    tcp: TcpListener,
    cluster: Arc<Cluster>,
}

impl Listener {
    pub fn new(unix: UnixListener, tcp: TcpListener, cluster: Arc<Cluster>) -> Self {
        Self { unix, tcp, cluster }
    }

    pub async fn run(self) {
        loop {
            tokio::select! {
                result = self.unix.accept() => match result {
                    Ok((stream, _)) => {
                        tokio::spawn(serve(stream, Arc::clone(&self.cluster)));
                    }
                    Err(e) => warn!(error = %e, "unix accept failed"),
                },
                result = self.tcp.accept() => match result {
                    Ok((stream, addr)) => {
                        debug!(%addr, "peer connected");
                        tokio::spawn(serve(stream, Arc::clone(&self.cluster)));
                    }
                    Err(e) => warn!(error = %e, "tcp accept failed"),
                },
            }
        }
    }
}

/// Serve one connection: requests in, responses out, until EOF.
async fn serve<S>(mut stream: S, cluster: Arc<Cluster>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let request = match protocol::read_request(&mut stream, IDLE_TIMEOUT).await {
            Ok(request) => request,
            Err(ProtocolError::ConnectionClosed) | Err(ProtocolError::Timeout) => break,
            Err(e) => {
                debug!(error = %e, "dropping connection");
                break;
            }
        };
        let response = cluster.handle(request).await;
        if let Err(e) = protocol::write_response(&mut stream, &response, DEFAULT_TIMEOUT).await {
            debug!(error = %e, "unable to write response");
            break;
        }
    }
}
