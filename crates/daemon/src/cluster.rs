// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster layer: the `clus_*` semantics on top of the local engine.
//!
//! Mutating requests apply locally, then fan out to every peer with the
//! `remote` flag set so peers do not re-broadcast. Peer failures are
//! transient: logged and skipped, never rolled back. Group placement
//! picks the least-loaded eligible node, with a uniform random tie-break
//! and an exclusivity guard for non-parallel groups.

use crate::protocol::{
    self, DepRow, NameRow, ProtocolError, Request, Response, StateRow, ValueRow,
};
use async_trait::async_trait;
use ics_core::alert::Alert;
use ics_core::alert::AlertLevel;
use ics_core::states::{GroupState, ResourceState};
use ics_engine::logs::HourlyLog;
use ics_engine::{AlertSettings, EngineError, NodeEngine};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Transport seam to one peer node.
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn call(&self, request: Request) -> Result<Response, ProtocolError>;
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Production peer: one TCP connection per call.
pub struct TcpPeer {
    host: String,
    port: u16,
}

impl TcpPeer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl PeerLink for TcpPeer {
    async fn call(&self, request: Request) -> Result<Response, ProtocolError> {
        let mut stream = tokio::time::timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| ProtocolError::Timeout)??;

        let data = protocol::encode(&request)?;
        protocol::write_message(&mut stream, &data).await?;
        let bytes = tokio::time::timeout(
            protocol::DEFAULT_TIMEOUT,
            protocol::read_message(&mut stream),
        )
        .await
        .map_err(|_| ProtocolError::Timeout)??;
        protocol::decode(&bytes)
    }
}

/// Builds a [`PeerLink`] for a host name.
pub type Connector = Box<dyn Fn(&str) -> Arc<dyn PeerLink> + Send + Sync>;

/// Applies a runtime log-level change; returns false for invalid levels.
pub type LevelSetter = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Poll cadence for the wait operations.
const WAIT_POLL: Duration = Duration::from_millis(200);

pub struct Cluster {
    engine: Arc<Mutex<NodeEngine>>,
    alerts: Arc<Mutex<AlertSettings>>,
    alert_tx: mpsc::UnboundedSender<Alert>,
    peers: Mutex<IndexMap<String, Arc<dyn PeerLink>>>,
    connector: Connector,
    level_setter: LevelSetter,
    command_log: HourlyLog,
    dirty: Arc<AtomicBool>,
}

fn err(error: EngineError) -> Response {
    Response::Error {
        message: error.to_string(),
    }
}

fn refuse(message: impl Into<String>) -> Response {
    Response::Error {
        message: message.into(),
    }
}

impl Cluster {
    pub fn new(
        engine: Arc<Mutex<NodeEngine>>,
        alerts: Arc<Mutex<AlertSettings>>,
        alert_tx: mpsc::UnboundedSender<Alert>,
        connector: Connector,
        level_setter: LevelSetter,
        log_dir: &Path,
        dirty: Arc<AtomicBool>,
    ) -> Self {
        Self {
            engine,
            alerts,
            alert_tx,
            peers: Mutex::new(IndexMap::new()),
            connector,
            level_setter,
            command_log: HourlyLog::new(log_dir, "command.log"),
            dirty,
        }
    }

    /// Rebuild the peer table from the engine's NodeList.
    pub fn connect_peers(&self) {
        let (me, nodes) = {
            let engine = self.engine.lock();
            (engine.node_name(), engine.node_list())
        };
        let mut peers = self.peers.lock();
        for host in nodes {
            if host != me && !peers.contains_key(&host) {
                info!(node = %host, "connecting peer");
                peers.insert(host.clone(), (self.connector)(&host));
            }
        }
    }

    fn add_peer(&self, host: &str) {
        self.peers
            .lock()
            .insert(host.to_string(), (self.connector)(host));
    }

    fn remove_peer(&self, host: &str) {
        self.peers.lock().shift_remove(host);
    }

    fn peer(&self, host: &str) -> Option<Arc<dyn PeerLink>> {
        self.peers.lock().get(host).cloned()
    }

    fn peer_snapshot(&self) -> Vec<(String, Arc<dyn PeerLink>)> {
        self.peers
            .lock()
            .iter()
            .map(|(host, peer)| (host.clone(), peer.clone()))
            .collect()
    }

    fn node_name(&self) -> String {
        self.engine.lock().node_name()
    }

    /// Broadcast a fan-out hop to every peer, best effort.
    async fn fan_out(&self, request: Request) {
        for (host, peer) in self.peer_snapshot() {
            match peer.call(request.clone()).await {
                Ok(Response::Error { message }) => {
                    error!(node = %host, %message, "fan-out rejected by peer");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(node = %host, error = %e, "fan-out failed, peer unreachable");
                }
            }
        }
    }

    /// Handle one request to completion.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,

            // -- node --
            Request::NodeAdd { host } => {
                let result = self.engine.lock().add_node(&host);
                match result {
                    Ok(()) => {
                        self.add_peer(&host);
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::NodeDelete { host } => {
                let result = self.engine.lock().delete_node(&host);
                match result {
                    Ok(()) => {
                        self.remove_peer(&host);
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::NodeList => Response::Names {
                names: self.engine.lock().node_list(),
            },
            Request::NodeAttr => Response::Attrs {
                attrs: self.engine.lock().node_attr(),
            },
            Request::NodeValue { attr } => {
                match self.engine.lock().node_value(&attr) {
                    Ok(value) => Response::Value { value },
                    Err(e) => err(e),
                }
            }
            Request::NodeModify { attr, op, remote } => {
                let result = self.engine.lock().node_modify(&attr, op.clone());
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::NodeModify {
                                attr,
                                op,
                                remote: true,
                            })
                            .await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::NodeLoad => Response::Load {
                load: self.engine.lock().node_load(),
            },

            // -- resources --
            Request::ResAdd {
                name,
                group,
                remote,
            } => {
                let result = self.engine.lock().res_add(&name, &group);
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::ResAdd {
                                name,
                                group,
                                remote: true,
                            })
                            .await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::ResDelete { name, remote } => {
                let result = self.engine.lock().res_delete(&name);
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::ResDelete { name, remote: true }).await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::ResOnline { name, node } => {
                self.delegated(node, Request::ResOnline { name: name.clone(), node: None }, |engine| {
                    engine.res_online(&name)
                })
                .await
            }
            Request::ResOffline { name, node } => {
                self.delegated(node, Request::ResOffline { name: name.clone(), node: None }, |engine| {
                    engine.res_offline(&name)
                })
                .await
            }
            Request::ResState { names, cluster } => self.res_state(names, cluster).await,
            Request::ResLink {
                parent,
                child,
                remote,
            } => {
                let result = self.engine.lock().res_link(&parent, &child);
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::ResLink {
                                parent,
                                child,
                                remote: true,
                            })
                            .await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::ResUnlink {
                parent,
                child,
                remote,
            } => {
                let result = self.engine.lock().res_unlink(&parent, &child);
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::ResUnlink {
                                parent,
                                child,
                                remote: true,
                            })
                            .await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::ResClear { name, remote } => {
                let result = self.engine.lock().res_clear(&name);
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::ResClear { name, remote: true }).await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::ResProbe { name } => {
                let result = self.engine.lock().res_probe(&name);
                match result {
                    Ok(()) => Response::Ok,
                    Err(e) => err(e),
                }
            }
            Request::ResFlush { name } => {
                let result = self.engine.lock().res_flush(&name);
                match result {
                    Ok(()) => Response::Ok,
                    Err(e) => err(e),
                }
            }
            Request::ResDep { names } => match self.engine.lock().res_dep(&names) {
                Ok(rows) => Response::Deps {
                    rows: rows
                        .into_iter()
                        .map(|(group, parent, child)| DepRow {
                            group,
                            parent,
                            child,
                        })
                        .collect(),
                },
                Err(e) => err(e),
            },
            Request::ResList { cluster } => self.name_listing(cluster, true).await,
            Request::ResValue {
                name,
                attr,
                cluster,
            } => self.res_value(name, attr, cluster).await,
            Request::ResModify {
                name,
                attr,
                op,
                remote,
            } => {
                let result = self.engine.lock().res_modify(&name, &attr, op.clone());
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::ResModify {
                                name,
                                attr,
                                op,
                                remote: true,
                            })
                            .await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::ResAttr { name } => match self.engine.lock().res_attr(&name) {
                Ok(attrs) => Response::Attrs { attrs },
                Err(e) => err(e),
            },
            Request::ResWait {
                name,
                state,
                timeout_secs,
            } => self.res_wait(name, state, timeout_secs).await,

            // -- groups --
            Request::GrpAdd { name, remote } => {
                let result = self.engine.lock().grp_add(&name);
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::GrpAdd { name, remote: true }).await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::GrpDelete { name, remote } => {
                let result = self.engine.lock().grp_delete(&name);
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::GrpDelete { name, remote: true }).await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::GrpOnline { name, node } => self.grp_online(name, node).await,
            Request::GrpOffline { name, node } => self.grp_offline(name, node).await,
            Request::GrpState { names, cluster } => self.grp_state(names, cluster).await,
            Request::GrpEnable { name, remote } => {
                let result = self.engine.lock().grp_enable(&name);
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::GrpEnable { name, remote: true }).await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::GrpDisable { name, remote } => {
                let result = self.engine.lock().grp_disable(&name);
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::GrpDisable { name, remote: true }).await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::GrpEnableResources { name, remote } => {
                let result = self.engine.lock().grp_enable_resources(&name);
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::GrpEnableResources { name, remote: true })
                                .await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::GrpDisableResources { name, remote } => {
                let result = self.engine.lock().grp_disable_resources(&name);
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::GrpDisableResources { name, remote: true })
                                .await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::GrpFlush { name, node } => {
                self.delegated(node, Request::GrpFlush { name: name.clone(), node: None }, |engine| {
                    engine.grp_flush(&name)
                })
                .await
            }
            Request::GrpClear { name, node } => {
                self.delegated(node, Request::GrpClear { name: name.clone(), node: None }, |engine| {
                    engine.grp_clear(&name)
                })
                .await
            }
            Request::GrpResources { name } => match self.engine.lock().grp_resources(&name) {
                Ok(names) => Response::Names { names },
                Err(e) => err(e),
            },
            Request::GrpList { cluster } => self.name_listing(cluster, false).await,
            Request::GrpValue {
                name,
                attr,
                cluster,
            } => self.grp_value(name, attr, cluster).await,
            Request::GrpModify {
                name,
                attr,
                op,
                remote,
            } => {
                let result = self.engine.lock().grp_modify(&name, &attr, op.clone());
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::GrpModify {
                                name,
                                attr,
                                op,
                                remote: true,
                            })
                            .await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::GrpAttr { name } => match self.engine.lock().grp_attr(&name) {
                Ok(attrs) => Response::Attrs { attrs },
                Err(e) => err(e),
            },
            Request::GrpWait {
                name,
                state,
                timeout_secs,
            } => self.grp_wait(name, state, timeout_secs).await,

            // -- server --
            Request::Dump => Response::Dump {
                data: self.engine.lock().dump(),
            },
            Request::LoadConfig { data, remote } => {
                let result = {
                    let mut engine = self.engine.lock();
                    let mut alerts = self.alerts.lock();
                    ics_engine::apply(&mut engine, &mut alerts, &data)
                };
                match result {
                    Ok(()) => {
                        if !remote {
                            self.fan_out(Request::LoadConfig { data, remote: true }).await;
                        }
                        Response::Ok
                    }
                    Err(e) => err(e),
                }
            }
            Request::LogCommand { line, remote } => {
                if let Err(e) = self.command_log.append_line(&line) {
                    warn!(error = %e, "unable to write command log");
                }
                if !remote {
                    self.fan_out(Request::LogCommand { line, remote: true }).await;
                }
                Response::Ok
            }
            Request::SetLogLevel { level } => {
                if (self.level_setter)(&level) {
                    Response::Ok
                } else {
                    refuse(format!("invalid logging level: {}", level))
                }
            }

            // -- alerts --
            Request::AlertAdd { alert } => {
                let _ = self.alert_tx.send(alert);
                Response::Ok
            }
            Request::AlertLevel => Response::Level {
                level: self.alerts.lock().level.name().to_string(),
            },
            Request::AlertSetLevel { level, remote } => {
                match level.parse::<AlertLevel>() {
                    Ok(parsed) => {
                        self.alerts.lock().set_level(parsed);
                        self.mark_dirty();
                        if !remote {
                            self.fan_out(Request::AlertSetLevel {
                                level,
                                remote: true,
                            })
                            .await;
                        }
                        Response::Ok
                    }
                    Err(message) => refuse(message),
                }
            }
            Request::AlertAddRecipient { address, remote } => {
                self.alerts.lock().add_recipient(address.clone());
                self.mark_dirty();
                if !remote {
                    self.fan_out(Request::AlertAddRecipient {
                        address,
                        remote: true,
                    })
                    .await;
                }
                Response::Ok
            }
            Request::AlertRemoveRecipient { address, remote } => {
                if !self.alerts.lock().remove_recipient(&address) {
                    return refuse(format!("recipient {} does not exist", address));
                }
                self.mark_dirty();
                if !remote {
                    self.fan_out(Request::AlertRemoveRecipient {
                        address,
                        remote: true,
                    })
                    .await;
                }
                Response::Ok
            }
        }
    }

    /// Alert settings live outside the engine but persist with it.
    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Run an operation locally or delegate it to the named node.
    async fn delegated<F>(&self, node: Option<String>, forward: Request, local: F) -> Response
    where
        F: FnOnce(&mut NodeEngine) -> Result<(), EngineError>,
    {
        let me = self.node_name();
        match node {
            None => {
                let result = local(&mut self.engine.lock());
                match result {
                    Ok(()) => Response::Ok,
                    Err(e) => err(e),
                }
            }
            Some(target) if target == me => {
                let result = local(&mut self.engine.lock());
                match result {
                    Ok(()) => Response::Ok,
                    Err(e) => err(e),
                }
            }
            Some(target) => match self.peer(&target) {
                Some(peer) => match peer.call(forward).await {
                    Ok(response) => response,
                    Err(e) => refuse(format!("node {} unreachable: {}", target, e)),
                },
                None => refuse(format!("node {} is not in the cluster", target)),
            },
        }
    }

    // -------------------------------------------------------------------
    // group placement
    // -------------------------------------------------------------------

    /// `clus_grp_online`: pick a target node and bring the group online
    /// there.
    async fn grp_online(&self, name: String, node: Option<String>) -> Response {
        let me = self.node_name();
        let lookup = {
            let engine = self.engine.lock();
            engine.group(&name).map(|group| {
                (group.system_list(), group.parallel())
            })
        };
        let (system_list, parallel) = match lookup {
            Ok(info) => info,
            Err(e) => return err(e),
        };

        let target = match node {
            Some(target) => {
                if !system_list.iter().any(|host| *host == target) {
                    return refuse(format!(
                        "node {} is not in SystemList of group {}",
                        target, name
                    ));
                }
                target
            }
            None => match self.pick_least_loaded(&system_list, &me).await {
                Some(target) => target,
                None => {
                    return refuse(format!(
                        "no eligible node found for group {} (SystemList empty or unreachable)",
                        name
                    ))
                }
            },
        };

        if !parallel {
            if let Some(holder) = self.online_elsewhere(&name, &target, &me).await {
                warn!(
                    group = %name,
                    node = %holder,
                    "refusing online, non-parallel group is active elsewhere"
                );
                return refuse(format!(
                    "group {} is already active on node {}",
                    name, holder
                ));
            }
        }

        info!(group = %name, node = %target, "group placement selected");
        if target == me {
            let result = self.engine.lock().grp_online(&name);
            match result {
                Ok(()) => Response::Ok,
                Err(e) => err(e),
            }
        } else {
            match self.peer(&target) {
                Some(peer) => match peer
                    .call(Request::GrpOnline {
                        name,
                        node: Some(target.clone()),
                    })
                    .await
                {
                    Ok(response) => response,
                    Err(e) => refuse(format!("node {} unreachable: {}", target, e)),
                },
                None => refuse(format!("node {} is not in the cluster", target)),
            }
        }
    }

    /// Least-loaded node in the SystemList; ties resolve uniformly at
    /// random. Unreachable peers are skipped.
    async fn pick_least_loaded(&self, system_list: &[String], me: &str) -> Option<String> {
        let mut loads: Vec<(String, i64)> = Vec::new();
        for host in system_list {
            if host == me {
                loads.push((host.clone(), self.engine.lock().node_load()));
                continue;
            }
            let Some(peer) = self.peer(host) else {
                warn!(node = %host, "SystemList node is not in the cluster, skipping");
                continue;
            };
            match peer.call(Request::NodeLoad).await {
                Ok(Response::Load { load }) => loads.push((host.clone(), load)),
                Ok(other) => {
                    warn!(node = %host, ?other, "unexpected load response, skipping")
                }
                Err(e) => warn!(node = %host, error = %e, "load query failed, skipping"),
            }
        }

        let min = loads.iter().map(|(_, load)| *load).min()?;
        let tied: Vec<&String> = loads
            .iter()
            .filter(|(_, load)| *load == min)
            .map(|(host, _)| host)
            .collect();
        let pick = rand::random_range(0..tied.len());
        Some(tied[pick].clone())
    }

    /// Name of a node (other than the target) where the group is online,
    /// partial, or unknown. Unreachable peers count as not hosting.
    async fn online_elsewhere(&self, group: &str, target: &str, me: &str) -> Option<String> {
        let nodes = self.engine.lock().node_list();
        for host in nodes {
            if host == target {
                continue;
            }
            let state = if host == me {
                self.engine
                    .lock()
                    .grp_state(&[group.to_string()])
                    .ok()
                    .and_then(|rows| rows.first().map(|(_, state)| *state))
            } else {
                let Some(peer) = self.peer(&host) else {
                    continue;
                };
                match peer
                    .call(Request::GrpState {
                        names: vec![group.to_string()],
                        cluster: false,
                    })
                    .await
                {
                    Ok(Response::States { rows }) => rows
                        .first()
                        .and_then(|row| row.state.parse::<GroupState>().ok()),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(node = %host, error = %e, "state query failed during placement");
                        None
                    }
                }
            };
            if matches!(
                state,
                Some(GroupState::Online) | Some(GroupState::Partial) | Some(GroupState::Unknown)
            ) {
                return Some(host);
            }
        }
        None
    }

    /// `clus_grp_offline`: no node means every node.
    async fn grp_offline(&self, name: String, node: Option<String>) -> Response {
        let me = self.node_name();
        match node {
            None => {
                let result = self.engine.lock().grp_offline(&name);
                if let Err(e) = result {
                    return err(e);
                }
                for (host, peer) in self.peer_snapshot() {
                    let request = Request::GrpOffline {
                        name: name.clone(),
                        node: Some(host.clone()),
                    };
                    if let Err(e) = peer.call(request).await {
                        error!(node = %host, error = %e, "offline fan-out failed");
                    }
                }
                Response::Ok
            }
            Some(target) if target == me => {
                let result = self.engine.lock().grp_offline(&name);
                match result {
                    Ok(()) => Response::Ok,
                    Err(e) => err(e),
                }
            }
            Some(target) => match self.peer(&target) {
                Some(peer) => match peer
                    .call(Request::GrpOffline {
                        name,
                        node: Some(target.clone()),
                    })
                    .await
                {
                    Ok(response) => response,
                    Err(e) => refuse(format!("node {} unreachable: {}", target, e)),
                },
                None => refuse(format!("node {} is not in the cluster", target)),
            },
        }
    }

    // -------------------------------------------------------------------
    // cluster reads
    // -------------------------------------------------------------------

    async fn res_state(&self, names: Vec<String>, cluster: bool) -> Response {
        let me = self.node_name();
        let local = self.engine.lock().res_state(&names);
        let mut rows: Vec<StateRow> = match local {
            Ok(states) => states
                .into_iter()
                .map(|(name, state)| StateRow {
                    node: cluster.then(|| me.clone()),
                    name,
                    state: state.to_string(),
                })
                .collect(),
            Err(e) => return err(e),
        };

        if cluster {
            for (host, peer) in self.peer_snapshot() {
                match peer
                    .call(Request::ResState {
                        names: names.clone(),
                        cluster: false,
                    })
                    .await
                {
                    Ok(Response::States { rows: peer_rows }) => {
                        rows.extend(peer_rows.into_iter().map(|row| StateRow {
                            node: Some(host.clone()),
                            ..row
                        }));
                    }
                    Ok(Response::Error { message }) => {
                        warn!(node = %host, %message, "state query rejected")
                    }
                    Ok(_) => {}
                    Err(e) => warn!(node = %host, error = %e, "state query failed"),
                }
            }
        }
        Response::States { rows }
    }

    async fn grp_state(&self, names: Vec<String>, cluster: bool) -> Response {
        let me = self.node_name();
        let local = self.engine.lock().grp_state(&names);
        let mut rows: Vec<StateRow> = match local {
            Ok(states) => states
                .into_iter()
                .map(|(name, state)| StateRow {
                    node: cluster.then(|| me.clone()),
                    name,
                    state: state.to_string(),
                })
                .collect(),
            Err(e) => return err(e),
        };

        if cluster {
            for (host, peer) in self.peer_snapshot() {
                match peer
                    .call(Request::GrpState {
                        names: names.clone(),
                        cluster: false,
                    })
                    .await
                {
                    Ok(Response::States { rows: peer_rows }) => {
                        rows.extend(peer_rows.into_iter().map(|row| StateRow {
                            node: Some(host.clone()),
                            ..row
                        }));
                    }
                    Ok(Response::Error { message }) => {
                        warn!(node = %host, %message, "state query rejected")
                    }
                    Ok(_) => {}
                    Err(e) => warn!(node = %host, error = %e, "state query failed"),
                }
            }
        }
        Response::States { rows }
    }

    async fn name_listing(&self, cluster: bool, resources: bool) -> Response {
        let names = {
            let engine = self.engine.lock();
            if resources {
                engine.res_list()
            } else {
                engine.grp_list()
            }
        };
        if !cluster {
            return Response::Names { names };
        }

        let me = self.node_name();
        let mut rows = vec![NameRow { node: me, names }];
        let forward = if resources {
            Request::ResList { cluster: false }
        } else {
            Request::GrpList { cluster: false }
        };
        for (host, peer) in self.peer_snapshot() {
            match peer.call(forward.clone()).await {
                Ok(Response::Names { names }) => rows.push(NameRow { node: host, names }),
                Ok(_) => {}
                Err(e) => warn!(node = %host, error = %e, "list query failed"),
            }
        }
        Response::NameRows { rows }
    }

    async fn res_value(&self, name: String, attr: String, cluster: bool) -> Response {
        let local = self.engine.lock().res_value(&name, &attr);
        let value = match local {
            Ok(value) => value,
            Err(e) => return err(e),
        };
        if !cluster {
            return Response::Value { value };
        }

        let mut rows = vec![ValueRow {
            node: self.node_name(),
            value,
        }];
        for (host, peer) in self.peer_snapshot() {
            match peer
                .call(Request::ResValue {
                    name: name.clone(),
                    attr: attr.clone(),
                    cluster: false,
                })
                .await
            {
                Ok(Response::Value { value }) => rows.push(ValueRow { node: host, value }),
                Ok(_) => {}
                Err(e) => warn!(node = %host, error = %e, "value query failed"),
            }
        }
        Response::Values { rows }
    }

    async fn grp_value(&self, name: String, attr: String, cluster: bool) -> Response {
        let local = self.engine.lock().grp_value(&name, &attr);
        let value = match local {
            Ok(value) => value,
            Err(e) => return err(e),
        };
        if !cluster {
            return Response::Value { value };
        }

        let mut rows = vec![ValueRow {
            node: self.node_name(),
            value,
        }];
        for (host, peer) in self.peer_snapshot() {
            match peer
                .call(Request::GrpValue {
                    name: name.clone(),
                    attr: attr.clone(),
                    cluster: false,
                })
                .await
            {
                Ok(Response::Value { value }) => rows.push(ValueRow { node: host, value }),
                Ok(_) => {}
                Err(e) => warn!(node = %host, error = %e, "value query failed"),
            }
        }
        Response::Values { rows }
    }

    // -------------------------------------------------------------------
    // waits
    // -------------------------------------------------------------------

    async fn res_wait(&self, name: String, state: ResourceState, timeout_secs: u64) -> Response {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            let current = {
                let engine = self.engine.lock();
                match engine.res_state(&[name.clone()]) {
                    Ok(rows) => rows.first().map(|(_, state)| *state),
                    Err(e) => return err(e),
                }
            };
            if current == Some(state) {
                return Response::Ok;
            }
            if tokio::time::Instant::now() >= deadline {
                return refuse(format!(
                    "timed out waiting for resource {} to become {}",
                    name, state
                ));
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    async fn grp_wait(&self, name: String, state: GroupState, timeout_secs: u64) -> Response {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            let current = {
                let engine = self.engine.lock();
                match engine.grp_state(&[name.clone()]) {
                    Ok(rows) => rows.first().map(|(_, state)| *state),
                    Err(e) => return err(e),
                }
            };
            if current == Some(state) {
                return Response::Ok;
            }
            if tokio::time::Instant::now() >= deadline {
                return refuse(format!(
                    "timed out waiting for group {} to become {}",
                    name, state
                ));
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod tests;
