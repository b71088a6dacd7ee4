// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::TestEngine;
use ics_core::alert::AlertLevel;
use ics_core::attributes::AttrValue;
use ics_core::config::ConfigData;

const SAMPLE: &str = r#"{
    "system": {"attributes": {"ResourceLimit": "10"}},
    "alerts": {"attributes": {"AlertLevel": "WARNING", "AlertRecipients": ["ops@example.com"]}},
    "groups": {
        "G": {"attributes": {"Enabled": "true", "AutoStart": "true", "SystemList": ["h1"]}}
    },
    "resources": {
        "r1": {"attributes": {"Group": "G", "Enabled": "true", "StartProgram": "/bin/true"}, "dependencies": []},
        "r2": {"attributes": {"Group": "G", "Enabled": "true"}, "dependencies": ["r1"]}
    }
}"#;

fn load_sample(t: &mut TestEngine) -> AlertSettings {
    let data: ConfigData = serde_json::from_str(SAMPLE).unwrap();
    let mut alerts = AlertSettings::default();
    apply(&mut t.engine, &mut alerts, &data).unwrap();
    alerts
}

#[test]
fn apply_builds_groups_resources_and_links() {
    let mut t = TestEngine::new();
    let alerts = load_sample(&mut t);

    assert_eq!(t.engine.attrs.get_int("ResourceLimit").unwrap(), 10);
    assert_eq!(alerts.level, AlertLevel::Warning);
    assert_eq!(alerts.recipients, ["ops@example.com"]);
    assert_eq!(t.engine.grp_list(), ["G"]);
    assert_eq!(t.engine.res_list(), ["r1", "r2"]);
    assert_eq!(
        t.engine.res_dep(&[]).unwrap(),
        vec![("G".to_string(), "r1".to_string(), "r2".to_string())]
    );
}

#[test]
fn host_identity_is_not_persisted() {
    let mut t = TestEngine::new();

    // A node at its defaults writes an empty system section.
    let data = config_data(&t.engine, &AlertSettings::default());
    assert!(data.system.attributes.is_empty());

    // A real cluster NodeList is configuration and survives; NodeName
    // never does.
    t.engine.add_node("peer1").unwrap();
    let data = config_data(&t.engine, &AlertSettings::default());
    assert!(!data.system.attributes.contains_key("NodeName"));
    assert_eq!(
        data.system.attributes.get("NodeList"),
        Some(&AttrValue::List(vec![
            t.engine.node_name(),
            "peer1".to_string()
        ]))
    );
}

#[test]
fn node_list_from_config_keeps_this_node() {
    let mut t = TestEngine::new();
    let data: ConfigData = serde_json::from_str(
        r#"{"system": {"attributes": {"NodeList": ["n8", "n9"]}}}"#,
    )
    .unwrap();
    let mut alerts = AlertSettings::default();
    apply(&mut t.engine, &mut alerts, &data).unwrap();

    let list = t.engine.node_list();
    assert!(list.contains(&"n8".to_string()));
    assert!(list.contains(&"n9".to_string()));
    assert!(list.contains(&t.engine.node_name()));
}

#[test]
fn apply_never_takes_node_name_from_config() {
    let mut t = TestEngine::new();
    let original = t.engine.node_name();
    let data: ConfigData = serde_json::from_str(
        r#"{"system": {"attributes": {"NodeName": "impostor"}}}"#,
    )
    .unwrap();
    let mut alerts = AlertSettings::default();
    apply(&mut t.engine, &mut alerts, &data).unwrap();
    assert_eq!(t.engine.node_name(), original);
}

#[test]
fn config_data_round_trips_through_apply() {
    let mut t = TestEngine::new();
    let alerts = load_sample(&mut t);
    let written = config_data(&t.engine, &alerts);

    let mut t2 = TestEngine::new();
    let mut alerts2 = AlertSettings::default();
    apply(&mut t2.engine, &mut alerts2, &written).unwrap();
    let rewritten = config_data(&t2.engine, &alerts2);

    assert_eq!(written, rewritten);
}

#[test]
fn only_non_default_attributes_are_written() {
    let mut t = TestEngine::new();
    t.add_group("G");
    t.add_resource("r1", "G");
    let data = config_data(&t.engine, &AlertSettings::default());

    let attrs = &data.resources["r1"].attributes;
    assert_eq!(attrs.get("Group"), Some(&AttrValue::from("G")));
    assert_eq!(attrs.get("Enabled"), Some(&AttrValue::from("true")));
    assert!(!attrs.contains_key("RestartLimit"));
    assert!(!attrs.contains_key("StartProgram"));
}

#[test]
fn write_read_persist_cycle() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config").join("main.cf");

    assert!(read_config(&path).unwrap().is_none());

    let data: ConfigData = serde_json::from_str(SAMPLE).unwrap();
    write_config(&path, &data).unwrap();
    let back = read_config(&path).unwrap().unwrap();
    assert_eq!(back, data);

    // Persisting keeps the previous file as .autobackup plus a
    // timestamped copy of the fresh one.
    persist(&path, &back).unwrap();
    assert!(path.with_file_name("main.cf.autobackup").is_file());
    let backups: Vec<String> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert!(backups
        .iter()
        .any(|name| name.starts_with("main.cf.2") && !name.ends_with("autobackup")));
}

#[test]
fn invalid_alert_level_fails_the_load() {
    let mut t = TestEngine::new();
    let data: ConfigData = serde_json::from_str(
        r#"{"alerts": {"attributes": {"AlertLevel": "LOUD"}}}"#,
    )
    .unwrap();
    let mut alerts = AlertSettings::default();
    assert!(matches!(
        apply(&mut t.engine, &mut alerts, &data),
        Err(EngineError::InvalidLevel(_))
    ));
}
