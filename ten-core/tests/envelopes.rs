//! Acceptance tests for the envelope model and documents.
//!
//! Tests cover:
//! - Envelopes are Send + Sync and can cross slot boundaries
//! - Envelope identity and property bags
//! - Buffer lock discipline
//! - Graph and app documents in their JSON shapes

use serde_json::json;
use ten_core::*;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Thread safety
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn _assert_send_sync<T: Send + Sync>() {}

#[test]
fn envelopes_are_send_sync() {
    _assert_send_sync::<Cmd>();
    _assert_send_sync::<CmdResult>();
    _assert_send_sync::<Data>();
    _assert_send_sync::<AudioFrame>();
    _assert_send_sync::<VideoFrame>();
    _assert_send_sync::<Msg>();
    _assert_send_sync::<BufLock>();
}

#[test]
fn errors_are_send_sync() {
    _assert_send_sync::<TenError>();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelopes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn msg_wrapper_exposes_kind_and_name() {
    let cases: Vec<(Msg, MsgKind)> = vec![
        (Cmd::new("c").into(), MsgKind::Cmd),
        (Data::new("d").into(), MsgKind::Data),
        (AudioFrame::new("a").into(), MsgKind::AudioFrame),
        (VideoFrame::new("v").into(), MsgKind::VideoFrame),
        (CmdResult::ok(&Cmd::new("r")).into(), MsgKind::CmdResult),
    ];
    for (msg, kind) in cases {
        assert_eq!(msg.kind(), kind);
        assert_eq!(msg.name().len(), 1);
        assert!(!msg.is_buf_locked());
    }
}

#[test]
fn cmd_property_types() {
    let mut cmd = Cmd::new("configure");
    cmd.set_property("enabled", true).unwrap();
    cmd.set_property("retries", 3i64).unwrap();
    cmd.set_property("gain", 1.5).unwrap();
    cmd.set_property_from_json("voice", r#"{"id": "x", "rate": [1, 2]}"#)
        .unwrap();

    assert!(cmd.get_property_bool("enabled").unwrap());
    assert_eq!(cmd.get_property_int("retries").unwrap(), 3);
    assert_eq!(cmd.get_property_float("gain").unwrap(), 1.5);
    assert_eq!(cmd.get_property_string("voice.id").unwrap(), "x");
    assert_eq!(cmd.get_property_int("voice.rate[1]").unwrap(), 2);
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&cmd.get_property_to_json("voice").unwrap())
            .unwrap(),
        json!({"id": "x", "rate": [1, 2]})
    );
    assert!(cmd.is_property_exist("voice.rate"));
    assert!(!cmd.is_property_exist("voice.pitch"));
    assert_eq!(
        cmd.get_property_string("missing").unwrap_err().code(),
        ErrorCode::UnresolvedProperty
    );
}

#[test]
fn explicit_destinations() {
    let mut data = Data::new("chunk");
    data.add_dest(Loc::extension("b").with_group("g"));
    data.add_dest(Loc::extension("c").with_app("localhost"));
    assert_eq!(data.dests().len(), 2);
    assert!(data.dests()[1].is_local_to("localhost"));
    assert!(!Loc::extension("x").with_app("remote").is_local_to("localhost"));

    data.set_dests(vec![]);
    assert!(data.dests().is_empty());
}

#[test]
fn locked_buffer_blocks_reads_until_unlocked() {
    let mut frame = AudioFrame::new("pcm");
    frame.alloc_buf(4).unwrap();
    let mut lock = frame.lock_buf().unwrap();
    lock.fill(7);
    assert!(frame.buf().is_err());
    assert!(frame.lock_buf().is_err());
    frame.unlock_buf(lock).unwrap();
    assert_eq!(frame.buf().unwrap(), &[7, 7, 7, 7]);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Documents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn result_return_policy_wire_names() {
    assert_eq!(
        serde_json::to_value(ResultReturnPolicy::FirstErrorOrFirstOk).unwrap(),
        json!("first_error_or_first_ok")
    );
    assert_eq!(ResultReturnPolicy::default(), ResultReturnPolicy::FirstErrorOrLastOk);
}

#[test]
fn state_and_kind_display() {
    assert_eq!(ExtensionState::Deinitializing.to_string(), "deinitializing");
    assert_eq!(MsgKind::VideoFrame.to_string(), "video_frame");
    assert_eq!(Phase::Stop.to_string(), "on_stop");
}

#[test]
fn app_config_with_graph() {
    let config = AppConfig::from_property_json(
        &json!({
            "_ten": {
                "predefined_graphs": [{
                    "name": "default",
                    "auto_start": true,
                    "nodes": [
                        {"type": "extension", "name": "a", "addon": "x"},
                        {"type": "extension", "name": "b", "addon": "y"}
                    ],
                    "connections": [
                        {"extension": "a", "cmd": [{"name": "hello", "dest": [{"extension": "b"}]}]}
                    ]
                }]
            }
        })
        .to_string(),
    )
    .unwrap();
    let graph = &config.auto_start_graph().unwrap().graph;
    assert!(graph.flow_for("a", MsgKind::Cmd, "hello").is_some());
    assert!(graph.flow_for("a", MsgKind::Cmd, "bye").is_none());
}
