// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::protocol::{Request, Response, StateRow};
use ics_core::attributes::{AttrValue, ModifyOp};
use ics_core::clock::FakeClock;
use ics_core::event::EngineEvent;
use ics_engine::EventSender;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;

/// Canned peer: fixed load and group state, records every call.
#[derive(Default)]
struct FakePeer {
    load: i64,
    group_state: String,
    calls: Mutex<Vec<Request>>,
}

impl FakePeer {
    fn new(load: i64, group_state: &str) -> Arc<Self> {
        Arc::new(Self {
            load,
            group_state: group_state.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls_of(&self, tag: fn(&Request) -> bool) -> usize {
        self.calls.lock().iter().filter(|r| tag(r)).count()
    }
}

#[async_trait]
impl PeerLink for FakePeer {
    async fn call(&self, request: Request) -> Result<Response, ProtocolError> {
        self.calls.lock().push(request.clone());
        Ok(match request {
            Request::NodeLoad => Response::Load { load: self.load },
            Request::GrpState { names, .. } => Response::States {
                rows: names
                    .into_iter()
                    .map(|name| StateRow {
                        node: None,
                        name,
                        state: self.group_state.clone(),
                    })
                    .collect(),
            },
            _ => Response::Ok,
        })
    }
}

struct Harness {
    cluster: Arc<Cluster>,
    engine: Arc<Mutex<NodeEngine>>,
    events: tokio::sync::mpsc::UnboundedReceiver<EngineEvent>,
    me: String,
    _tmp: tempfile::TempDir,
}

impl Harness {
    fn new(peers: Vec<(&str, Arc<FakePeer>)>) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let (event_tx, events) = tokio::sync::mpsc::unbounded_channel();
        let (alert_tx, _alert_rx) = tokio::sync::mpsc::unbounded_channel();
        let dirty = Arc::new(AtomicBool::new(false));

        let engine = Arc::new(Mutex::new(NodeEngine::new(
            Arc::new(FakeClock::new()),
            EventSender::new(event_tx),
            alert_tx.clone(),
            dirty.clone(),
            tmp.path(),
        )));
        let me = engine.lock().node_name();

        let map: HashMap<String, Arc<FakePeer>> = peers
            .iter()
            .map(|(host, peer)| (host.to_string(), peer.clone()))
            .collect();
        let connector: Connector = Box::new(move |host| {
            map.get(host)
                .cloned()
                .map(|peer| peer as Arc<dyn PeerLink>)
                .unwrap_or_else(|| Arc::new(FakePeer::default()))
        });

        let cluster = Arc::new(Cluster::new(
            engine.clone(),
            Arc::new(Mutex::new(AlertSettings::default())),
            alert_tx,
            connector,
            Box::new(|_| true),
            tmp.path(),
            dirty,
        ));
        for (host, _) in &peers {
            engine.lock().add_node(host).unwrap();
        }
        cluster.connect_peers();
        Self {
            cluster,
            engine,
            events,
            me,
            _tmp: tmp,
        }
    }

    /// Enabled group placed on me + the given peers.
    fn add_group(&self, name: &str, system_list: Vec<String>) {
        let engine = &mut *self.engine.lock();
        engine.grp_add(name).unwrap();
        engine
            .grp_modify(
                name,
                "Enabled",
                ModifyOp::Set {
                    value: AttrValue::from("true"),
                },
            )
            .unwrap();
        engine
            .grp_modify(
                name,
                "SystemList",
                ModifyOp::Set {
                    value: AttrValue::List(system_list),
                },
            )
            .unwrap();
    }

    fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

#[tokio::test]
async fn grp_online_rejects_node_outside_system_list() {
    let mut h = Harness::new(vec![]);
    let me = h.me.clone();
    h.add_group("G", vec![me]);

    let response = h
        .cluster
        .handle(Request::GrpOnline {
            name: "G".to_string(),
            node: Some("stranger".to_string()),
        })
        .await;
    assert!(matches!(response, Response::Error { .. }));
    assert!(h.drain_events().is_empty());
}

#[tokio::test]
async fn non_parallel_group_active_elsewhere_is_refused() {
    // The group is online on n2; placement targets us (lower load) and
    // the exclusivity guard must refuse.
    let peer = FakePeer::new(5, "online");
    let mut h = Harness::new(vec![("n2", peer.clone())]);
    let me = h.me.clone();
    h.add_group("G", vec![me, "n2".to_string()]);
    h.drain_events();

    let response = h
        .cluster
        .handle(Request::GrpOnline {
            name: "G".to_string(),
            node: None,
        })
        .await;

    assert!(matches!(response, Response::Error { .. }));
    // No GroupStart was queued locally.
    assert!(h.drain_events().is_empty());
    assert_eq!(
        h.engine.lock().grp_state(&["G".to_string()]).unwrap()[0].1,
        ics_core::states::GroupState::Unknown
    );
}

#[tokio::test]
async fn parallel_group_skips_the_exclusivity_guard() {
    let peer = FakePeer::new(5, "online");
    let mut h = Harness::new(vec![("n2", peer.clone())]);
    let me = h.me.clone();
    h.add_group("G", vec![me, "n2".to_string()]);
    {
        let engine = &mut *h.engine.lock();
        engine
            .grp_modify(
                "G",
                "Parallel",
                ModifyOp::Set {
                    value: AttrValue::from("true"),
                },
            )
            .unwrap();
    }
    h.drain_events();

    let response = h
        .cluster
        .handle(Request::GrpOnline {
            name: "G".to_string(),
            node: None,
        })
        .await;
    assert_eq!(response, Response::Ok);
    assert_eq!(
        h.drain_events(),
        vec![EngineEvent::GroupStart {
            group: "G".to_string()
        }]
    );
    assert_eq!(peer.calls_of(|r| matches!(r, Request::GrpState { .. })), 0);
}

#[tokio::test]
async fn loaded_node_loses_placement() {
    // n2 carries load 5, we carry 0: the group must come online here.
    let peer = FakePeer::new(5, "offline");
    let mut h = Harness::new(vec![("n2", peer.clone())]);
    let me = h.me.clone();
    h.add_group("G", vec![me, "n2".to_string()]);
    h.drain_events();

    let response = h
        .cluster
        .handle(Request::GrpOnline {
            name: "G".to_string(),
            node: None,
        })
        .await;
    assert_eq!(response, Response::Ok);
    assert_eq!(
        h.drain_events(),
        vec![EngineEvent::GroupStart {
            group: "G".to_string()
        }]
    );
    assert_eq!(peer.calls_of(|r| matches!(r, Request::GrpOnline { .. })), 0);
}

#[tokio::test]
async fn placement_delegates_to_the_less_loaded_peer() {
    // We carry load 5 (an online group with a loaded member), n2 carries 0.
    let peer = FakePeer::new(0, "offline");
    let mut h = Harness::new(vec![("n2", peer.clone())]);
    let me = h.me.clone();

    h.add_group("Busy", vec![me.clone()]);
    {
        let engine = &mut *h.engine.lock();
        engine.res_add("loaded", "Busy").unwrap();
        engine
            .res_modify(
                "loaded",
                "Enabled",
                ModifyOp::Set {
                    value: AttrValue::from("true"),
                },
            )
            .unwrap();
        engine
            .res_modify(
                "loaded",
                "Load",
                ModifyOp::Set {
                    value: AttrValue::from("5"),
                },
            )
            .unwrap();
        engine.resource_mut("loaded").unwrap().state = ics_core::states::ResourceState::Online;
    }

    h.add_group("G", vec![me, "n2".to_string()]);
    h.drain_events();

    let response = h
        .cluster
        .handle(Request::GrpOnline {
            name: "G".to_string(),
            node: None,
        })
        .await;
    assert_eq!(response, Response::Ok);
    // Delegated: nothing queued locally, one GrpOnline sent to n2.
    assert!(h.drain_events().is_empty());
    assert_eq!(peer.calls_of(|r| matches!(r, Request::GrpOnline { .. })), 1);
}

#[tokio::test]
async fn tied_loads_pick_uniformly_at_random() {
    let peer = FakePeer::new(0, "offline");
    let mut h = Harness::new(vec![("n2", peer.clone())]);
    let me = h.me.clone();
    h.add_group("G", vec![me, "n2".to_string()]);
    {
        let engine = &mut *h.engine.lock();
        engine
            .grp_modify(
                "G",
                "Parallel",
                ModifyOp::Set {
                    value: AttrValue::from("true"),
                },
            )
            .unwrap();
    }
    h.drain_events();

    let rounds = 1000;
    for _ in 0..rounds {
        let response = h
            .cluster
            .handle(Request::GrpOnline {
                name: "G".to_string(),
                node: None,
            })
            .await;
        assert_eq!(response, Response::Ok);
    }

    let remote = peer.calls_of(|r| matches!(r, Request::GrpOnline { .. }));
    let local = h
        .drain_events()
        .iter()
        .filter(|event| matches!(event, EngineEvent::GroupStart { .. }))
        .count();
    assert_eq!(remote + local, rounds);
    // Uniform tie-break: each side within [0.4, 0.6] of the picks.
    assert!(remote >= rounds * 2 / 5, "remote picked {} times", remote);
    assert!(remote <= rounds * 3 / 5, "remote picked {} times", remote);
}

#[tokio::test]
async fn mutations_fan_out_once_with_the_remote_flag() {
    let peer = FakePeer::new(0, "offline");
    let h = Harness::new(vec![("n2", peer.clone())]);

    let response = h
        .cluster
        .handle(Request::GrpAdd {
            name: "G".to_string(),
            remote: false,
        })
        .await;
    assert_eq!(response, Response::Ok);
    {
        let calls = peer.calls.lock();
        assert!(calls.contains(&Request::GrpAdd {
            name: "G".to_string(),
            remote: true,
        }));
    }

    // Remote-originated hops are not re-broadcast.
    let response = h
        .cluster
        .handle(Request::GrpAdd {
            name: "H".to_string(),
            remote: true,
        })
        .await;
    assert_eq!(response, Response::Ok);
    let calls = peer.calls.lock();
    assert!(!calls
        .iter()
        .any(|request| matches!(request, Request::GrpAdd { name, .. } if name == "H")));
}

#[tokio::test]
async fn failed_local_mutation_does_not_fan_out() {
    let peer = FakePeer::new(0, "offline");
    let h = Harness::new(vec![("n2", peer.clone())]);

    let response = h
        .cluster
        .handle(Request::ResAdd {
            name: "r1".to_string(),
            group: "missing".to_string(),
            remote: false,
        })
        .await;
    assert!(matches!(response, Response::Error { .. }));
    assert!(peer.calls.lock().is_empty());
}

#[tokio::test]
async fn cluster_state_reads_collect_per_node_rows() {
    let peer = FakePeer::new(0, "offline");
    let mut h = Harness::new(vec![("n2", peer.clone())]);
    let me = h.me.clone();
    h.add_group("G", vec![me.clone()]);
    h.drain_events();

    let response = h
        .cluster
        .handle(Request::GrpState {
            names: vec!["G".to_string()],
            cluster: true,
        })
        .await;
    let Response::States { rows } = response else {
        panic!("expected state rows");
    };
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].node.as_deref(), Some(me.as_str()));
    assert_eq!(rows[1].node.as_deref(), Some("n2"));
    assert_eq!(rows[1].state, "offline");
}

#[tokio::test]
async fn res_wait_times_out_with_an_error() {
    let mut h = Harness::new(vec![]);
    {
        let engine = &mut *h.engine.lock();
        engine.grp_add("G").unwrap();
        engine.res_add("r1", "G").unwrap();
    }
    h.drain_events();

    let response = h
        .cluster
        .handle(Request::ResWait {
            name: "r1".to_string(),
            state: ics_core::states::ResourceState::Online,
            timeout_secs: 0,
        })
        .await;
    assert!(matches!(response, Response::Error { .. }));
}
