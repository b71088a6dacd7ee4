// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::resource::CmdType;
use crate::test_helpers::TestEngine;
use ics_core::alert::AlertLevel;
use ics_core::attributes::{AttrValue, ModifyOp};
use ics_core::clock::Clock;
use ics_core::event::EngineEvent;
use ics_core::states::ResourceState;
use std::time::Duration;

fn poll_ready(t: &mut TestEngine, name: &str) {
    // Push last_poll far enough back that the interval has elapsed.
    let epoch = t.clock.epoch_secs();
    t.engine.resource_mut(name).unwrap().last_poll = epoch - 3600;
}

#[test]
fn disabled_resources_are_skipped() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");
    t.set_attr("r1", "Enabled", "false");
    poll_ready(&mut t, "r1");

    t.engine.poll_tick();
    assert!(t.take_events().is_empty());
}

#[test]
fn poll_fires_when_interval_elapses() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");
    t.set_attr("r1", "OfflineMonitorInterval", "30");
    let epoch = t.clock.epoch_secs();
    t.engine.resource_mut("r1").unwrap().last_poll = epoch;

    t.engine.poll_tick();
    assert!(t.take_events().is_empty());

    t.clock.advance(Duration::from_secs(31));
    t.engine.poll_tick();
    assert_eq!(
        t.take_events(),
        vec![EngineEvent::PollRun {
            resource: "r1".to_string()
        }]
    );
    assert!(t.engine.resource("r1").unwrap().poll_in_flight);

    // Still in flight: no second poll.
    t.clock.advance(Duration::from_secs(60));
    t.engine.poll_tick();
    assert!(t.take_events().is_empty());
}

#[test]
fn transition_states_are_not_polled() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");
    t.engine.resource_mut("r1").unwrap().state = ResourceState::Starting;
    poll_ready(&mut t, "r1");

    t.engine.poll_tick();
    assert!(t.take_events().is_empty());
}

#[test]
fn finished_start_command_triggers_a_resync_poll() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");
    t.set_attr("r1", "StartProgram", "/bin/true");

    t.engine.run_program("r1", CmdType::Start);
    assert!(t.engine.resource("r1").unwrap().cmd.is_some());

    // Wait for /bin/true to exit, then reap it.
    std::thread::sleep(Duration::from_millis(200));
    t.engine.poll_tick();

    let resource = t.engine.resource("r1").unwrap();
    assert!(resource.cmd.is_none());
    assert_eq!(
        t.take_events(),
        vec![EngineEvent::PollRun {
            resource: "r1".to_string()
        }]
    );
}

#[yare::parameterized(
    online  = { 110, "poll:online" },
    offline = { 100, "poll:offline" },
    unknown = { 7, "poll:unknown" },
)]
fn poll_exit_codes_map_to_probe_answers(code: i32, expected_tag: &str) {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");
    let probe = t.script("probe.sh", &format!("exit {}", code));
    t.set_attr("r1", "MonitorProgram", &probe);

    t.engine.run_program("r1", CmdType::Poll);
    std::thread::sleep(Duration::from_millis(200));
    t.engine.poll_tick();

    let events = t.take_events();
    assert_eq!(events.len(), 1);
    let tag = serde_json::to_value(&events[0]).unwrap()["type"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(tag, expected_tag);

    let resource = t.engine.resource("r1").unwrap();
    assert!(!resource.poll_in_flight);
    assert!(resource.cmd.is_none());
}

#[test]
fn command_timeout_kills_and_alerts() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");
    t.set_attr("r1", "StartProgram", "/bin/sleep 600");
    t.set_attr("r1", "OnlineTimeout", "1");

    t.engine.run_program("r1", CmdType::Start);
    assert!(t.engine.resource("r1").unwrap().cmd.is_some());

    // Deadline exactly reached counts as a timeout.
    t.clock.advance(Duration::from_secs(1));
    t.engine.poll_tick();

    assert!(t.engine.resource("r1").unwrap().cmd.is_none());
    let alerts = t.take_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].level, AlertLevel::Warning);
    assert_eq!(alerts[0].message, "Resource start timeout");
    assert!(t.take_events().is_empty());
}

#[test]
fn startup_probe_polls_everything_once_then_autostarts() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.engine
        .grp_modify(
            "G",
            "AutoStart",
            ModifyOp::Set {
                value: AttrValue::from("true"),
            },
        )
        .unwrap();
    t.add_resource("a", "G");
    t.add_resource("b", "G");
    t.add_resource("c", "G");
    t.set_attr("c", "Enabled", "false");

    t.engine.begin_startup_probe();
    t.engine.poll_tick();

    // Both enabled resources probed; the disabled one skipped.
    let events = t.take_events();
    assert_eq!(
        events,
        vec![
            EngineEvent::PollRun {
                resource: "a".to_string()
            },
            EngineEvent::PollRun {
                resource: "b".to_string()
            },
        ]
    );

    // No monitor program configured: the poll resolves on dispatch.
    for event in events {
        t.engine.dispatch(event);
    }
    t.engine.poll_tick();

    // Probe complete: AutoStart group queued.
    let events = t.take_events();
    assert!(events.contains(&EngineEvent::GroupStart {
        group: "G".to_string()
    }));
}

#[test]
fn startup_probe_bounds_concurrent_polls() {
    let mut t = TestEngine::new();
    t.add_group("G");
    for i in 0..40 {
        let name = format!("r{}", i);
        t.add_resource(&name, "G");
        t.set_attr(&name, "MonitorProgram", "/bin/sleep 60");
    }

    t.engine.begin_startup_probe();
    t.engine.poll_tick();
    assert_eq!(t.take_events().len(), 30);
}
