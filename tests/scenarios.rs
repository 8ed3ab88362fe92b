//! End-to-end scenarios through the umbrella crate: a command relayed
//! across two extensions, and the property surface of an extension.
//! Run with: cargo test --test scenarios

use std::sync::{Arc, Mutex};
use std::time::Duration;
use ten::prelude::*;
use ten_core::{PropertySchema, PropertyType};
use ten_runtime::Addon;
use ten_runtime::test_utils::FixedReply;

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

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hello from A to B
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Asks its peer `hello` and answers the incoming command with the
/// peer's detail.
struct Relay {
    replies: Arc<Mutex<Vec<Option<String>>>>,
}

impl Extension for Relay {
    fn on_cmd(&mut self, env: &TenEnv, cmd: Cmd) {
        let replies = Arc::clone(&self.replies);
        let handler = ResultHandler::new(move |env: &TenEnv, outcome| {
            let detail = outcome
                .ok()
                .and_then(|result| result.detail_str().map(str::to_owned));
            replies.lock().unwrap().push(detail.clone());
            let reply = CmdResult::ok(&cmd).with_detail(detail.unwrap_or_default());
            env.return_result(reply, &cmd, None);
        });
        env.send_cmd(Cmd::new("hello"), Some(handler));
    }
}

#[test]
fn hello_from_a_reaches_b_and_comes_back() {
    let graph = GraphDefinition::from_json(
        r#"{
            "nodes": [
                {"type": "extension", "name": "ten:test_extension", "addon": "ten:test_extension"},
                {"type": "extension", "name": "a", "addon": "relay"},
                {"type": "extension", "name": "b", "addon": "reply_x"}
            ],
            "connections": [
                {"extension": "ten:test_extension", "cmd": [{"name": "go", "dest": [{"extension": "a"}]}]},
                {"extension": "a", "cmd": [{"name": "hello", "dest": [{"extension": "b"}]}]}
            ]
        }"#,
    )
    .unwrap();

    let replies: Arc<Mutex<Vec<Option<String>>>> = Arc::default();
    let seen: Arc<Mutex<Vec<(StatusCode, Option<String>)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let mut tester = ExtensionTester::new(Scripted(move |env: &TenEnvTester| {
        let sink = Arc::clone(&sink);
        env.send_cmd(Cmd::new("go"), move |env, outcome| {
            match outcome {
                Ok(result) => sink.lock().unwrap().push((
                    result.status_code(),
                    result.detail_str().map(str::to_owned),
                )),
                Err(e) => env.stop_test_with_error(e.to_string()),
            }
            env.stop_test();
        });
    }));

    let relay_replies = Arc::clone(&replies);
    tester
        .register_addon("relay", move |_: &str| Relay {
            replies: Arc::clone(&relay_replies),
        })
        .unwrap();
    tester
        .register_addon("reply_x", |_: &str| FixedReply::ok("x"))
        .unwrap();
    tester.set_test_mode_graph(graph);
    tester.set_timeout(TIMEOUT);
    tester.run().unwrap();

    assert_eq!(*replies.lock().unwrap(), vec![Some("x".to_owned())]);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(StatusCode::Ok, Some("x".to_owned()))]
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Properties
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type Checks = Arc<Mutex<Vec<(&'static str, bool)>>>;

/// Exercises its own property store during `on_init`.
struct PropertyProbe {
    checks: Checks,
}

impl PropertyProbe {
    fn check(&self, what: &'static str, ok: bool) {
        self.checks.lock().unwrap().push((what, ok));
    }
}

impl Extension for PropertyProbe {
    fn on_init(&mut self, env: &TenEnv) {
        self.check(
            "seeded string",
            env.get_property_string("name").ok().as_deref() == Some("probe"),
        );
        self.check(
            "seeded nested int",
            env.get_property_int("nested.n").ok() == Some(1),
        );
        self.check(
            "seeded json",
            env.get_property_to_json("nested").ok().as_deref() == Some(r#"{"n":1}"#),
        );
        self.check(
            "schema default",
            env.get_property_int("level").ok() == Some(3),
        );

        env.set_property_bool("flag", true).unwrap();
        env.set_property_float("ratio", 0.5).unwrap();
        env.set_property_string("greeting", "hi").unwrap();
        env.set_property_from_json("list", "[1, 2]").unwrap();
        self.check("bool", env.get_property_bool("flag").ok() == Some(true));
        self.check("float", env.get_property_float("ratio").ok() == Some(0.5));
        self.check(
            "string",
            env.get_property_string("greeting").ok().as_deref() == Some("hi"),
        );
        self.check("exists", env.is_property_exist("list"));

        self.check(
            "missing",
            env.get_property("missing")
                .is_err_and(|e| e.code() == ErrorCode::UnresolvedProperty),
        );
        self.check(
            "schema type",
            env.set_property_string("level", "loud")
                .is_err_and(|e| e.code() == ErrorCode::TypeMismatch),
        );
        self.check(
            "wrong getter",
            env.get_property_bool("greeting")
                .is_err_and(|e| e.code() == ErrorCode::TypeMismatch),
        );
        env.on_init_done();
    }
}

/// An addon that declares a property schema.
struct ProbeAddon {
    checks: Checks,
}

impl Addon for ProbeAddon {
    fn create_instance(&self, _name: &str) -> Result<Box<dyn Extension>, TenError> {
        Ok(Box::new(PropertyProbe {
            checks: Arc::clone(&self.checks),
        }))
    }

    fn property_schema(&self) -> Option<PropertySchema> {
        Some(PropertySchema::default().declare(
            "level",
            PropertyType::Int,
            Some(serde_json::json!(3)),
        ))
    }
}

#[test]
fn extension_properties_round_trip() {
    let checks: Checks = Arc::default();
    let mut tester = ExtensionTester::new(Scripted(|env: &TenEnvTester| env.stop_test()));
    tester
        .register_addon(
            "probe",
            ProbeAddon {
                checks: Arc::clone(&checks),
            },
        )
        .unwrap();
    tester
        .set_test_mode_single("probe", Some(r#"{"name": "probe", "nested": {"n": 1}}"#))
        .unwrap();
    tester.set_timeout(TIMEOUT);
    tester.run().unwrap();

    let checks = checks.lock().unwrap();
    assert_eq!(checks.len(), 11);
    let failed: Vec<_> = checks.iter().filter(|(_, ok)| !ok).collect();
    assert!(failed.is_empty(), "failed checks: {failed:?}");
}
