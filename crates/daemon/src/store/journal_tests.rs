// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::{load, save, JournalDoc};

#[test]
fn round_trips_document() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("runtime-state.json");

    let raw = json!({
        "version": 2,
        "updatedAt": "2026-02-14T01:23:45Z",
        "daemon": { "startTs": 1000, "heartbeatTs": 2000 },
        "devices": {
            "192.168.1.100": {
                "displayOn": false,
                "brightness": 42,
                "activeScene": "clock",
                "playState": "playing"
            }
        }
    });
    std::fs::write(&path, serde_json::to_string(&raw)?)?;

    let doc = load(&path)?;
    assert_eq!(doc.version, 2);
    assert_eq!(doc.daemon.start_ts, 1000);
    assert_eq!(doc.daemon.heartbeat_ts, 2000);
    let dev = &doc.devices["192.168.1.100"];
    assert_eq!(dev["displayOn"], json!(false));
    assert_eq!(dev["brightness"], json!(42));

    save(&path, &doc)?;
    let again = load(&path)?;
    assert_eq!(again.devices, doc.devices);
    Ok(())
}

#[test]
fn preserves_unknown_keys_on_rewrite() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state.json");

    let raw = json!({
        "version": 2,
        "updatedAt": "",
        "daemon": { "startTs": 1, "heartbeatTs": 1, "futureMeta": "x" },
        "devices": { "d1": { "displayOn": true, "futureKey": [1, 2, 3] } },
        "futureTopLevel": { "a": 1 }
    });
    std::fs::write(&path, serde_json::to_string(&raw)?)?;

    let doc = load(&path)?;
    save(&path, &doc)?;

    let reread: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(reread["futureTopLevel"]["a"], json!(1));
    assert_eq!(reread["devices"]["d1"]["futureKey"], json!([1, 2, 3]));
    assert_eq!(reread["daemon"]["futureMeta"], json!("x"));
    Ok(())
}

#[test]
fn save_is_atomic_leaves_no_tmp() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state.json");

    save(&path, &JournalDoc::default())?;
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
    Ok(())
}

#[test]
fn iso8601_now_shape() {
    let ts = super::iso8601_now();
    // e.g. 2026-08-01T12:34:56Z
    assert_eq!(ts.len(), 20);
    assert!(ts.ends_with('Z'));
    assert_eq!(&ts[4..5], "-");
    assert_eq!(&ts[10..11], "T");
}
