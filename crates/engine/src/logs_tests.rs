// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn path_carries_an_hourly_suffix() {
    let log = HourlyLog::new("/var/opt/ics/log", "resource.log");
    let name = log
        .current_path()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .to_string();
    // resource.log.YYYY-MM-DD_HH
    assert!(name.starts_with("resource.log."));
    assert_eq!(name.len(), "resource.log.".len() + 13);
}

#[test]
fn append_creates_directory_and_file() {
    let tmp = tempfile::tempdir().unwrap();
    let log = HourlyLog::new(tmp.path().join("logs"), "alerts.log");
    log.append_line("one").unwrap();
    log.append_line("two").unwrap();

    let content = std::fs::read_to_string(log.current_path()).unwrap();
    assert_eq!(content, "one\ntwo\n");
}
