// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::TestEngine;
use ics_core::alert::AlertLevel;
use ics_core::event::EngineEvent;
use ics_core::states::ResourceState;

#[test]
fn change_state_is_a_no_op_without_force() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");

    t.engine.change_state("r1", ResourceState::Offline, false);
    assert!(t.take_events().is_empty());

    t.engine.change_state("r1", ResourceState::Offline, true);
    assert_eq!(
        t.take_events(),
        vec![EngineEvent::ResourceOffline {
            resource: "r1".to_string(),
            last_state: ResourceState::Offline,
        }]
    );
}

#[test]
fn disabled_resource_stays_offline_and_passes_through() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");
    t.set_attr("r1", "Enabled", "false");

    t.engine.change_state("r1", ResourceState::Starting, false);
    assert_eq!(t.engine.resource("r1").unwrap().state, ResourceState::Offline);
    // Synthetic online event with a faked last state keeps propagation moving.
    assert_eq!(
        t.take_events(),
        vec![EngineEvent::ResourceOnline {
            resource: "r1".to_string(),
            last_state: ResourceState::Online,
        }]
    );

    t.engine.change_state("r1", ResourceState::Stopping, false);
    assert_eq!(
        t.take_events(),
        vec![EngineEvent::ResourceOffline {
            resource: "r1".to_string(),
            last_state: ResourceState::Offline,
        }]
    );

    // Faulted is not a valid target for a disabled resource.
    t.engine.change_state("r1", ResourceState::Faulted, false);
    assert!(t.take_events().is_empty());
}

#[test]
fn unexpected_online_raises_a_warning_alert() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");

    t.engine.dispatch(EngineEvent::PollOnline {
        resource: "r1".to_string(),
    });
    t.pump();

    assert_eq!(t.engine.resource("r1").unwrap().state, ResourceState::Online);
    let alerts = t.take_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].level, AlertLevel::Warning);
    assert_eq!(alerts[0].message, "Resource came online by itself");
}

#[test]
fn poll_results_never_override_faulted() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");
    t.engine.resource_mut("r1").unwrap().state = ResourceState::Faulted;

    t.engine.dispatch(EngineEvent::PollOnline {
        resource: "r1".to_string(),
    });
    t.engine.dispatch(EngineEvent::PollOffline {
        resource: "r1".to_string(),
    });
    assert!(t.take_events().is_empty());
    assert_eq!(t.engine.resource("r1").unwrap().state, ResourceState::Faulted);
}

#[test]
fn fault_at_restart_limit_goes_faulted_with_one_error_alert() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");
    t.set_attr("r1", "RestartLimit", "0");
    t.engine.resource_mut("r1").unwrap().state = ResourceState::Online;

    // Monitor says offline while we believed it online.
    t.engine.dispatch(EngineEvent::PollOffline {
        resource: "r1".to_string(),
    });
    t.pump();

    assert_eq!(t.engine.resource("r1").unwrap().state, ResourceState::Faulted);
    let alerts = t.take_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].level, AlertLevel::Error);
    assert_eq!(alerts[0].message, "Resource faulted");
}

#[test]
fn fault_below_restart_limit_restarts() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");
    t.set_attr("r1", "RestartLimit", "2");
    t.set_attr("r1", "StartProgram", "/bin/true");
    t.engine.resource_mut("r1").unwrap().state = ResourceState::Online;

    t.engine.dispatch(EngineEvent::PollOffline {
        resource: "r1".to_string(),
    });
    t.pump();

    let resource = t.engine.resource("r1").unwrap();
    assert_eq!(resource.state, ResourceState::Starting);
    assert_eq!(resource.fault_count, 1);
    assert!(t.take_alerts().is_empty());
}

#[test]
fn clear_resets_fault_count_and_leaves_faulted() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");
    {
        let resource = t.engine.resource_mut("r1").unwrap();
        resource.state = ResourceState::Faulted;
        resource.fault_count = 3;
    }

    t.engine.dispatch(EngineEvent::ResourceClear {
        resource: "r1".to_string(),
    });
    let resource = t.engine.resource("r1").unwrap();
    assert_eq!(resource.fault_count, 0);
    assert_eq!(resource.state, ResourceState::Offline);
}

#[test]
fn flush_backs_out_of_transitions() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");
    {
        let resource = t.engine.resource_mut("r1").unwrap();
        resource.state = ResourceState::Starting;
        resource.propagate = true;
    }

    t.engine.flush_resource("r1");
    let resource = t.engine.resource("r1").unwrap();
    assert_eq!(resource.state, ResourceState::Offline);
    assert!(!resource.propagate);

    t.engine.resource_mut("r1").unwrap().state = ResourceState::Stopping;
    t.engine.flush_resource("r1");
    assert_eq!(t.engine.resource("r1").unwrap().state, ResourceState::Online);
}

#[test]
fn readiness_counts_disabled_and_monitor_only_parents() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("a", "G");
    t.add_resource("b", "G");
    t.add_resource("c", "G");
    t.engine.res_link("a", "c").unwrap();
    t.engine.res_link("b", "c").unwrap();

    // Both parents offline: not ready.
    assert!(!t.engine.parents_ready("c"));

    t.engine.resource_mut("a").unwrap().state = ResourceState::Online;
    assert!(!t.engine.parents_ready("c"));

    // A disabled parent counts as ready.
    t.set_attr("b", "Enabled", "false");
    assert!(t.engine.parents_ready("c"));

    // No parents is always ready.
    assert!(t.engine.parents_ready("a"));
}

#[test]
fn group_start_seeds_only_roots() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("a", "G");
    t.add_resource("b", "G");
    t.set_attr("a", "StartProgram", "/bin/true");
    t.set_attr("b", "StartProgram", "/bin/true");
    t.engine.res_link("a", "b").unwrap();

    t.engine.group_start("G");
    assert_eq!(t.engine.resource("a").unwrap().state, ResourceState::Starting);
    assert!(t.engine.resource("a").unwrap().propagate);
    // b waits for propagation from a.
    assert_eq!(t.engine.resource("b").unwrap().state, ResourceState::Offline);
    assert!(!t.engine.resource("b").unwrap().propagate);
}

#[test]
fn group_start_refuses_when_disabled() {
    let mut t = TestEngine::new();
    t.engine.grp_add("G").unwrap();
    t.engine.res_add("r1", "G").unwrap();
    t.set_attr("r1", "Enabled", "true");

    t.engine.group_start("G");
    assert!(t.take_events().is_empty());
    assert_eq!(t.engine.resource("r1").unwrap().state, ResourceState::Offline);
}

#[test]
fn online_propagates_to_ready_children() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("a", "G");
    t.add_resource("b", "G");
    t.set_attr("b", "StartProgram", "/bin/true");
    t.engine.res_link("a", "b").unwrap();

    {
        let a = t.engine.resource_mut("a").unwrap();
        a.state = ResourceState::Online;
        a.propagate = true;
    }
    t.engine.dispatch(EngineEvent::ResourceOnline {
        resource: "a".to_string(),
        last_state: ResourceState::Starting,
    });

    let a = t.engine.resource("a").unwrap();
    assert!(!a.propagate);
    let b = t.engine.resource("b").unwrap();
    assert_eq!(b.state, ResourceState::Starting);
    assert!(b.propagate);
}

#[test]
fn offline_propagates_to_ready_parents() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("a", "G");
    t.add_resource("b", "G");
    t.set_attr("a", "StopProgram", "/bin/true");
    t.engine.res_link("a", "b").unwrap();

    {
        let a = t.engine.resource_mut("a").unwrap();
        a.state = ResourceState::Online;
    }
    {
        let b = t.engine.resource_mut("b").unwrap();
        b.state = ResourceState::Offline;
        b.propagate = true;
    }
    t.engine.dispatch(EngineEvent::ResourceOffline {
        resource: "b".to_string(),
        last_state: ResourceState::Stopping,
    });

    let a = t.engine.resource("a").unwrap();
    assert_eq!(a.state, ResourceState::Stopping);
    assert!(a.propagate);
}
