// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

// Installs the global subscriber, so this file holds a single test.

use clap::Parser;
use memvfs_cli::{run, Cli};
use memvfs_logging::{init_with_writer, BufferWriter, Level, LogFormat};

#[test]
fn test_denials_and_conflicts_are_logged() {
    let logs = BufferWriter::new();
    init_with_writer("memvfs-cli", Level::WARN, LogFormat::Json, logs.clone()).unwrap();

    let cli = Cli::try_parse_from([
        "memvfs",
        "--uid",
        "0",
        "--gid",
        "0",
        "exec",
        "--keep-going",
        "touch /f",
        "open a /f",
        "open b /f",
        "lock a ex",
        "lock b sh",
        "chmod 0600 /f",
        "su 1000 1000",
        "chmod 0777 /f",
    ])
    .unwrap();
    let report = run(&cli, Vec::new()).unwrap();
    assert_eq!(report.failures.len(), 2);

    let contents = logs.contents();
    let events: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let messages: Vec<&str> = events
        .iter()
        .filter_map(|e| e["fields"]["message"].as_str())
        .collect();

    assert!(messages.contains(&"lock conflict"), "{contents}");
    assert!(messages.contains(&"metadata change denied"), "{contents}");
    assert!(messages.contains(&"command failed"), "{contents}");
    assert!(events.iter().all(|e| e["level"] != "DEBUG"), "{contents}");
}
