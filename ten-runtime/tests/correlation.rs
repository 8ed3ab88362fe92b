//! Result correlation tests: single and multi result modes, fan-out
//! policies, forwarding and teardown drains, driven through a tester.
//! Run with: cargo test -p ten-runtime --features test-utils --test correlation

#![cfg(feature = "test-utils")]

use std::sync::{Arc, Mutex};
use std::time::Duration;
use ten_core::{
    Cmd, CmdResult, Data, Envelope, ErrorCode, GraphDefinition, Loc, StatusCode, TenError,
};
use ten_runtime::test_utils::{EventLog, FixedReply, RecordingExtension, RecordingFaultPolicy};
use ten_runtime::*;

const TIMEOUT: Duration = Duration::from_secs(10);

/// Runs a closure once the tester has started.
struct Scripted<F>(F);

impl<F> Tester for Scripted<F>
where
    F: FnMut(&TenEnvTester) + Send + 'static,
{
    fn on_start(&mut self, env: &TenEnvTester) {
        env.on_start_done();
        (self.0)(env);
    }
}

type Seen = Arc<Mutex<Vec<(StatusCode, bool, bool, Option<String>)>>>;

fn record(seen: &Seen, result: &CmdResult) {
    seen.lock().unwrap().push((
        result.status_code(),
        result.is_final(),
        result.is_completed(),
        result.detail_str().map(str::to_owned),
    ));
}

fn single(
    script: impl FnMut(&TenEnvTester) + Send + 'static,
    addon: &str,
    make: impl Addon + 'static,
) -> ExtensionTester {
    let mut tester = ExtensionTester::new(Scripted(script));
    tester.register_addon(addon, make).unwrap();
    tester.set_test_mode_single(addon, None).unwrap();
    tester.set_timeout(TIMEOUT);
    tester
}

/// Answers with `parts` non-final results, then a final one.
struct Streaming {
    parts: usize,
}

impl Extension for Streaming {
    fn on_cmd(&mut self, env: &TenEnv, cmd: Cmd) {
        for i in 0..self.parts {
            let mut part = CmdResult::ok(&cmd).with_detail(format!("part {i}"));
            part.set_final(false);
            env.return_result(part, &cmd, None);
        }
        env.return_result(CmdResult::ok(&cmd).with_detail("done"), &cmd, None);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result modes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn multi_result_mode_streams_until_final() {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    single(
        move |env| {
            let sink = Arc::clone(&sink);
            env.send_cmd_ex(Cmd::new("hello"), move |env, outcome| match outcome {
                Ok(result) => {
                    record(&sink, &result);
                    if result.is_completed() {
                        env.stop_test();
                    }
                }
                Err(e) => env.stop_test_with_error(e.to_string()),
            });
        },
        "hello_1",
        |_: &str| Streaming { parts: 1 },
    )
    .run()
    .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (StatusCode::Ok, false, false, Some("part 0".to_owned())),
            (StatusCode::Ok, true, true, Some("done".to_owned())),
        ]
    );
}

#[test]
fn multi_result_mode_with_no_intermediate_results() {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    single(
        move |env| {
            let sink = Arc::clone(&sink);
            env.send_cmd_ex(Cmd::new("hello"), move |env, outcome| {
                if let Ok(result) = outcome {
                    record(&sink, &result);
                }
                env.stop_test();
            });
        },
        "hello_1",
        |_: &str| Streaming { parts: 0 },
    )
    .run()
    .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(StatusCode::Ok, true, true, Some("done".to_owned()))]
    );
}

#[test]
fn single_result_mode_rejects_streamed_results() {
    let faults = Arc::new(RecordingFaultPolicy::new());
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let mut tester = single(
        move |env| {
            let sink = Arc::clone(&sink);
            env.send_cmd(Cmd::new("hello"), move |env, outcome| {
                if let Ok(result) = outcome {
                    record(&sink, &result);
                }
                env.stop_test();
            });
        },
        "hello_1",
        |_: &str| Streaming { parts: 1 },
    );
    tester.set_fault_policy(faults.clone());
    tester.run().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(StatusCode::Ok, true, true, Some("done".to_owned()))]
    );
    let violations = faults.faults_with(ErrorCode::CorrelationProtocolViolation);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].extension.as_str(), "hello_1");
}

/// Returns two final results for every command.
struct DoubleFinal;

impl Extension for DoubleFinal {
    fn on_cmd(&mut self, env: &TenEnv, cmd: Cmd) {
        env.return_result(CmdResult::ok(&cmd), &cmd, None);
        env.return_result(CmdResult::ok(&cmd), &cmd, None);
    }
}

#[test]
fn result_after_final_is_a_violation() {
    let faults = Arc::new(RecordingFaultPolicy::new());
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let mut tester = single(
        move |env| {
            let sink = Arc::clone(&sink);
            env.send_cmd_ex(Cmd::new("twice"), move |env, outcome| {
                if let Ok(result) = outcome {
                    record(&sink, &result);
                }
                env.stop_test();
            });
        },
        "double",
        |_: &str| DoubleFinal,
    );
    tester.set_fault_policy(faults.clone());
    tester.run().unwrap();

    assert_eq!(seen.lock().unwrap().len(), 1);
    let violations = faults.faults_with(ErrorCode::CorrelationProtocolViolation);
    assert_eq!(violations.len(), 1);
    assert!(violations[0].message.contains("after the final"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Routing failures
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// On any command, sends `unconnected_cmd` and reports what came back.
struct SendsUnconnected;

impl Extension for SendsUnconnected {
    fn on_cmd(&mut self, env: &TenEnv, cmd: Cmd) {
        env.send_cmd(
            Cmd::new("unconnected_cmd"),
            Some(ResultHandler::new(move |env, outcome| {
                let detail = match outcome {
                    Ok(_) => "unexpected result".to_owned(),
                    Err(e) => format!("{:?}", e.code()),
                };
                env.return_result(CmdResult::ok(&cmd).with_detail(detail), &cmd, None);
            })),
        );
    }
}

#[test]
fn unconnected_cmd_reports_no_destination() {
    let graph = GraphDefinition::from_json(
        r#"{
            "nodes": [
                {"type": "extension", "name": "ten:test_extension", "addon": "ten:test_extension"},
                {"type": "extension", "name": "sender", "addon": "sender"}
            ],
            "connections": [
                {"extension": "ten:test_extension", "cmd": [{"name": "go", "dest": [{"extension": "sender"}]}]}
            ]
        }"#,
    )
    .unwrap();

    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let mut tester = ExtensionTester::new(Scripted(move |env: &TenEnvTester| {
        let sink = Arc::clone(&sink);
        env.send_cmd(Cmd::new("go"), move |env, outcome| {
            if let Ok(result) = outcome {
                record(&sink, &result);
            }
            env.stop_test();
        });
    }));
    tester.register_addon("sender", |_: &str| SendsUnconnected).unwrap();
    tester.set_test_mode_graph(graph);
    tester.set_timeout(TIMEOUT);
    tester.run().unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].3.as_deref(), Some("NoDestination"));
}

#[test]
fn one_way_sends_report_through_the_error_handler() {
    let log = EventLog::new();
    let addon_log = log.clone();
    let outcomes: Arc<Mutex<Vec<Result<(), ErrorCode>>>> = Arc::default();
    let sink = Arc::clone(&outcomes);
    single(
        move |env| {
            let delivered = Data::new("frame");

            let mut lost = Data::new("frame");
            lost.add_dest(Loc::extension("ghost"));

            let mut locked = Data::new("frame");
            locked.alloc_buf(8).unwrap();
            let _guard = locked.lock_buf().unwrap();

            for (i, data) in [delivered, lost, locked].into_iter().enumerate() {
                let sink = Arc::clone(&sink);
                env.send_data(data, move |env, outcome| {
                    sink.lock().unwrap().push(outcome.map_err(|e| e.code()));
                    if i == 2 {
                        env.stop_test();
                    }
                });
            }
        },
        "rec",
        move |_: &str| RecordingExtension::new("rec", addon_log.clone()),
    )
    .run()
    .unwrap();

    assert_eq!(
        *outcomes.lock().unwrap(),
        vec![
            Ok(()),
            Err(ErrorCode::NoDestination),
            Err(ErrorCode::InvalidArgument)
        ]
    );
    let data_seen: Vec<_> = log
        .entries_of("rec")
        .into_iter()
        .filter(|e| e.starts_with("on_data"))
        .collect();
    assert_eq!(data_seen, vec!["on_data:frame"]);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fan-out
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn fan_out_graph(policy: &str) -> GraphDefinition {
    GraphDefinition::from_json(&format!(
        r#"{{
            "nodes": [
                {{"type": "extension", "name": "ten:test_extension", "addon": "ten:test_extension"}},
                {{"type": "extension", "name": "b", "addon": "ok_b"}},
                {{"type": "extension", "name": "c", "addon": "second"}}
            ],
            "connections": [{{
                "extension": "ten:test_extension",
                "cmd": [{{
                    "name": "fan",
                    "dest": [{{"extension": "b"}}, {{"extension": "c"}}],
                    "result_return_policy": "{policy}"
                }}]
            }}]
        }}"#
    ))
    .unwrap()
}

fn fan_out(
    policy: &str,
    second: FixedReply,
    multi: bool,
) -> Vec<(StatusCode, bool, bool, Option<String>)> {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let mut tester = ExtensionTester::new(Scripted(move |env: &TenEnvTester| {
        let sink = Arc::clone(&sink);
        let handler = move |env: &TenEnvTester, outcome: Result<CmdResult, TenError>| {
            match outcome {
                Ok(result) => {
                    record(&sink, &result);
                    if result.is_completed() {
                        env.stop_test();
                    }
                }
                Err(e) => env.stop_test_with_error(e.to_string()),
            }
        };
        if multi {
            env.send_cmd_ex(Cmd::new("fan"), handler);
        } else {
            env.send_cmd(Cmd::new("fan"), handler);
        }
    }));
    tester
        .register_addon("ok_b", |_: &str| FixedReply::ok("b"))
        .unwrap();
    tester
        .register_addon("second", move |_: &str| second.clone())
        .unwrap();
    tester.set_test_mode_graph(fan_out_graph(policy));
    tester.set_timeout(TIMEOUT);
    tester.run().unwrap();
    let seen = seen.lock().unwrap().clone();
    seen
}

#[test]
fn each_ok_and_error_delivers_every_result() {
    let seen = fan_out("each_ok_and_error", FixedReply::error("c"), true);
    assert_eq!(seen.len(), 2);
    assert!(!seen[0].2, "first result must not be completed");
    assert!(seen[1].2, "last result must be completed");
    let mut details: Vec<_> = seen.iter().filter_map(|s| s.3.clone()).collect();
    details.sort();
    assert_eq!(details, vec!["b", "c"]);
}

#[test]
fn first_error_or_last_ok_surfaces_the_error() {
    let seen = fan_out("first_error_or_last_ok", FixedReply::error("c"), false);
    assert_eq!(
        seen,
        vec![(StatusCode::Error, true, true, Some("c".to_owned()))]
    );
}

#[test]
fn first_error_or_last_ok_waits_for_every_ok() {
    let seen = fan_out("first_error_or_last_ok", FixedReply::ok("c"), false);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, StatusCode::Ok);
    assert!(seen[0].2);
}

#[test]
fn first_error_or_first_ok_delivers_one_result() {
    let seen = fan_out("first_error_or_first_ok", FixedReply::ok("c"), true);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, StatusCode::Ok);
    assert!(seen[0].2);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Forwarding and teardown
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Forwards every command downstream without a handler.
struct Forwarder;

impl Extension for Forwarder {
    fn on_cmd(&mut self, env: &TenEnv, cmd: Cmd) {
        assert!(cmd.dests().is_empty());
        env.send_cmd(cmd, None);
    }
}

#[test]
fn forwarded_cmd_results_reach_the_original_sender() {
    let graph = GraphDefinition::from_json(
        r#"{
            "nodes": [
                {"type": "extension", "name": "ten:test_extension", "addon": "ten:test_extension"},
                {"type": "extension", "name": "a", "addon": "forwarder"},
                {"type": "extension", "name": "b", "addon": "reply"}
            ],
            "connections": [
                {"extension": "ten:test_extension", "cmd": [{"name": "hello", "dest": [{"extension": "a"}]}]},
                {"extension": "a", "cmd": [{"name": "hello", "dest": [{"extension": "b"}]}]}
            ]
        }"#,
    )
    .unwrap();

    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let mut tester = ExtensionTester::new(Scripted(move |env: &TenEnvTester| {
        let sink = Arc::clone(&sink);
        env.send_cmd(Cmd::new("hello"), move |env, outcome| {
            if let Ok(result) = outcome {
                record(&sink, &result);
            }
            env.stop_test();
        });
    }));
    let faults = Arc::new(RecordingFaultPolicy::new());
    tester.register_addon("forwarder", |_: &str| Forwarder).unwrap();
    tester
        .register_addon("reply", |_: &str| FixedReply::ok("from b"))
        .unwrap();
    tester.set_test_mode_graph(graph);
    tester.set_fault_policy(faults.clone());
    tester.set_timeout(TIMEOUT);
    tester.run().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(StatusCode::Ok, true, true, Some("from b".to_owned()))]
    );
    assert!(faults.faults().is_empty(), "faults: {:?}", faults.faults());
}

/// Never answers, and takes a while to stop.
struct SlowToStop;

impl Extension for SlowToStop {
    fn on_cmd(&mut self, _env: &TenEnv, _cmd: Cmd) {}

    fn on_stop(&mut self, env: &TenEnv) {
        let env = env.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            env.on_stop_done();
        });
    }
}

#[test]
fn teardown_resolves_pending_handlers_once() {
    let outcomes: Arc<Mutex<Vec<Result<StatusCode, ErrorCode>>>> = Arc::default();
    let sink = Arc::clone(&outcomes);
    single(
        move |env| {
            let sink = Arc::clone(&sink);
            env.send_cmd(Cmd::new("hang"), move |_, outcome| {
                sink.lock()
                    .unwrap()
                    .push(outcome.map(|r| r.status_code()).map_err(|e| e.code()));
            });
            env.stop_test();
        },
        "slow",
        |_: &str| SlowToStop,
    )
    .run()
    .unwrap();

    assert_eq!(
        *outcomes.lock().unwrap(),
        vec![Err(ErrorCode::ContextDestroyed)]
    );
}
