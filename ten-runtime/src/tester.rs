//! Isolation testing of extensions.
//!
//! [`ExtensionTester`] hosts the extension under test in a real app
//! next to a pseudo extension named [`TESTER_EXTENSION_NAME`] that
//! forwards to a [`Tester`]. The tester starts after every other
//! extension is `Started`, talks to them through a [`TenEnvTester`]
//! and ends the test with [`TenEnvTester::stop_test`] or
//! [`TenEnvTester::stop_test_with_error`].

use crate::addon::{Addon, AddonRegistry};
use crate::app::{AppBuilder, RunMode};
use crate::callback::{ErrorHandler, ResultHandler};
use crate::env::TenEnv;
use crate::extension::Extension;
use crate::fault::FaultPolicy;
use crate::lock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ten_core::{
    AddonName, AppConfig, AudioFrame, Cmd, CmdResult, Data, GraphConnection, GraphDefinition,
    GraphNode, MsgFlow, MsgKind, TenError, VideoFrame, graph::WILDCARD,
};
use thiserror::Error;

/// Graph node name of the tester pseudo extension.
pub const TESTER_EXTENSION_NAME: &str = "ten:test_extension";

/// Why a test run failed.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TesterError {
    /// The tester called `stop_test_with_error`.
    #[error("test failed: {0}")]
    Failed(String),

    /// Neither `stop_test` nor `stop_test_with_error` was called in time.
    #[error("test timed out after {0:?}")]
    Timeout(Duration),

    /// `run` was called before a test mode was set.
    #[error("no test mode was set")]
    NoTestMode,

    /// The app closed without the tester stopping the test.
    #[error("app closed before the test was stopped")]
    NotStopped,

    /// Building or running the app failed.
    #[error(transparent)]
    Runtime(#[from] TenError),
}

/// Test logic driving the extension under test.
///
/// Every method runs on the tester's slot.
pub trait Tester: Send + 'static {
    /// The extensions under test are `Started`.
    fn on_start(&mut self, env: &TenEnvTester) {
        env.on_start_done();
    }

    /// The app is closing.
    fn on_stop(&mut self, env: &TenEnvTester) {
        env.on_stop_done();
    }

    /// A command from an extension under test. Answered OK by default.
    fn on_cmd(&mut self, env: &TenEnvTester, cmd: Cmd) {
        env.return_result(CmdResult::ok(&cmd), &cmd);
    }

    /// A data message from an extension under test.
    fn on_data(&mut self, _env: &TenEnvTester, _data: Data) {}

    /// An audio frame from an extension under test.
    fn on_audio_frame(&mut self, _env: &TenEnvTester, _frame: AudioFrame) {}

    /// A video frame from an extension under test.
    fn on_video_frame(&mut self, _env: &TenEnvTester, _frame: VideoFrame) {}
}

type Outcome = Arc<Mutex<Option<Result<(), String>>>>;

/// The tester's handle to the app.
#[derive(Clone, Debug)]
pub struct TenEnvTester {
    env: TenEnv,
    outcome: Outcome,
}

impl TenEnvTester {
    fn rewrap(&self, env: &TenEnv) -> Self {
        Self {
            env: env.clone(),
            outcome: Arc::clone(&self.outcome),
        }
    }

    /// Finish the tester's `on_start`.
    pub fn on_start_done(&self) {
        self.env.on_start_done();
    }

    /// Finish the tester's `on_stop`.
    pub fn on_stop_done(&self) {
        self.env.on_stop_done();
    }

    /// Send a command; `handler` gets its completed result.
    pub fn send_cmd<F>(&self, cmd: Cmd, mut handler: F)
    where
        F: FnMut(&TenEnvTester, Result<CmdResult, TenError>) + Send + 'static,
    {
        let this = self.clone();
        self.env.send_cmd(
            cmd,
            Some(ResultHandler::new(move |env, outcome| {
                handler(&this.rewrap(env), outcome)
            })),
        );
    }

    /// Send a command; `handler` gets every result.
    pub fn send_cmd_ex<F>(&self, cmd: Cmd, mut handler: F)
    where
        F: FnMut(&TenEnvTester, Result<CmdResult, TenError>) + Send + 'static,
    {
        let this = self.clone();
        self.env.send_cmd_ex(
            cmd,
            Some(ResultHandler::new(move |env, outcome| {
                handler(&this.rewrap(env), outcome)
            })),
        );
    }

    fn error_handler<F>(&self, handler: F) -> ErrorHandler
    where
        F: FnOnce(&TenEnvTester, Result<(), TenError>) + Send + 'static,
    {
        let this = self.clone();
        ErrorHandler::new(move |env, outcome| handler(&this.rewrap(env), outcome))
    }

    /// Send a data message.
    pub fn send_data<F>(&self, data: Data, handler: F)
    where
        F: FnOnce(&TenEnvTester, Result<(), TenError>) + Send + 'static,
    {
        self.env.send_data(data, Some(self.error_handler(handler)));
    }

    /// Send an audio frame.
    pub fn send_audio_frame<F>(&self, frame: AudioFrame, handler: F)
    where
        F: FnOnce(&TenEnvTester, Result<(), TenError>) + Send + 'static,
    {
        self.env
            .send_audio_frame(frame, Some(self.error_handler(handler)));
    }

    /// Send a video frame.
    pub fn send_video_frame<F>(&self, frame: VideoFrame, handler: F)
    where
        F: FnOnce(&TenEnvTester, Result<(), TenError>) + Send + 'static,
    {
        self.env
            .send_video_frame(frame, Some(self.error_handler(handler)));
    }

    /// Answer a command sent to the tester. Failures are logged.
    pub fn return_result(&self, result: CmdResult, target: &Cmd) {
        self.env.return_result(
            result,
            target,
            Some(ErrorHandler::new(|env, outcome| {
                if let Err(e) = outcome {
                    env.log_warn(&format!("return_result failed: {e}"));
                }
            })),
        );
    }

    /// End the test successfully.
    pub fn stop_test(&self) {
        self.stop(Ok(()));
    }

    /// End the test with a failure.
    pub fn stop_test_with_error(&self, msg: impl Into<String>) {
        self.stop(Err(msg.into()));
    }

    fn stop(&self, outcome: Result<(), String>) {
        {
            let mut slot = lock(&self.outcome);
            if slot.is_none() {
                *slot = Some(outcome);
            }
        }
        self.env.close_app();
    }

    /// Log at debug level.
    pub fn log_debug(&self, msg: &str) {
        self.env.log_debug(msg);
    }

    /// Log at info level.
    pub fn log_info(&self, msg: &str) {
        self.env.log_info(msg);
    }

    /// Log at warn level.
    pub fn log_warn(&self, msg: &str) {
        self.env.log_warn(msg);
    }

    /// Log at error level.
    pub fn log_error(&self, msg: &str) {
        self.env.log_error(msg);
    }
}

struct TesterExtension {
    tester: Box<dyn Tester>,
    outcome: Outcome,
}

impl TesterExtension {
    fn env(&self, env: &TenEnv) -> TenEnvTester {
        TenEnvTester {
            env: env.clone(),
            outcome: Arc::clone(&self.outcome),
        }
    }
}

impl Extension for TesterExtension {
    fn on_start(&mut self, env: &TenEnv) {
        let env = self.env(env);
        self.tester.on_start(&env);
    }

    fn on_stop(&mut self, env: &TenEnv) {
        let env = self.env(env);
        self.tester.on_stop(&env);
    }

    fn on_cmd(&mut self, env: &TenEnv, cmd: Cmd) {
        let env = self.env(env);
        self.tester.on_cmd(&env, cmd);
    }

    fn on_data(&mut self, env: &TenEnv, data: Data) {
        let env = self.env(env);
        self.tester.on_data(&env, data);
    }

    fn on_audio_frame(&mut self, env: &TenEnv, frame: AudioFrame) {
        let env = self.env(env);
        self.tester.on_audio_frame(&env, frame);
    }

    fn on_video_frame(&mut self, env: &TenEnv, frame: VideoFrame) {
        let env = self.env(env);
        self.tester.on_video_frame(&env, frame);
    }
}

enum TestMode {
    Single {
        addon: String,
        property: Option<serde_json::Value>,
    },
    Graph(GraphDefinition),
}

/// Runs a [`Tester`] against extensions in a real app.
pub struct ExtensionTester {
    tester: Box<dyn Tester>,
    addons: AddonRegistry,
    mode: Option<TestMode>,
    timeout: Option<Duration>,
    config: AppConfig,
    fault: Option<Arc<dyn FaultPolicy>>,
}

impl ExtensionTester {
    /// A tester driven by `tester`.
    pub fn new(tester: impl Tester) -> Self {
        Self {
            tester: Box::new(tester),
            addons: AddonRegistry::new(),
            mode: None,
            timeout: None,
            config: AppConfig::default(),
            fault: None,
        }
    }

    /// Make an addon available to the test graph.
    pub fn register_addon(
        &mut self,
        name: impl Into<AddonName>,
        addon: impl Addon + 'static,
    ) -> Result<(), TenError> {
        self.addons.register(name, addon)
    }

    /// Test one extension created by `addon`, wired to the tester in
    /// both directions for every message name.
    pub fn set_test_mode_single(
        &mut self,
        addon: &str,
        property_json: Option<&str>,
    ) -> Result<(), TenError> {
        let property: Option<serde_json::Value> =
            property_json.map(serde_json::from_str).transpose()?;
        self.mode = Some(TestMode::Single {
            addon: addon.to_owned(),
            property,
        });
        Ok(())
    }

    /// Test a whole graph. The tester node is added when missing; its
    /// connections are up to the graph.
    pub fn set_test_mode_graph(&mut self, graph: GraphDefinition) {
        self.mode = Some(TestMode::Graph(graph));
    }

    /// Fail with [`TesterError::Timeout`] if the test is not stopped
    /// within `timeout`.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// Replace the app fault policy.
    pub fn set_fault_policy(&mut self, policy: Arc<dyn FaultPolicy>) {
        self.fault = Some(policy);
    }

    /// Replace the app configuration.
    pub fn set_config(&mut self, config: AppConfig) {
        self.config = config;
    }

    /// Run until the tester stops the test.
    pub fn run(self) -> Result<(), TesterError> {
        let graph = match self.mode {
            None => return Err(TesterError::NoTestMode),
            Some(TestMode::Single { addon, property }) => single_graph(&addon, property),
            Some(TestMode::Graph(mut graph)) => {
                if graph.node(TESTER_EXTENSION_NAME).is_none() {
                    graph
                        .nodes
                        .push(GraphNode::new(TESTER_EXTENSION_NAME, TESTER_EXTENSION_NAME));
                }
                graph
            }
        };

        let outcome: Outcome = Arc::default();
        let ext = TesterExtension {
            tester: self.tester,
            outcome: Arc::clone(&outcome),
        };
        let mut builder = AppBuilder::new(self.config)
            .addons(self.addons)
            .graph(graph)
            .instance(TESTER_EXTENSION_NAME, Box::new(ext))
            .start_last(TESTER_EXTENSION_NAME);
        if let Some(fault) = self.fault {
            builder = builder.fault_policy(fault);
        }
        let app = builder.build()?;
        app.run(RunMode::Background)?;

        if let Some(timeout) = self.timeout {
            if app.wait_timeout(timeout).is_none() {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "ten.tester.timeout");
                app.close();
                app.wait()?;
                return Err(TesterError::Timeout(timeout));
            }
        }
        let report = app.wait()?;
        if !report.is_clean() {
            tracing::warn!(forced = ?report.forced, "ten.tester.unclean_close");
        }

        match lock(&outcome).take() {
            Some(Ok(())) => Ok(()),
            Some(Err(msg)) => Err(TesterError::Failed(msg)),
            None => Err(TesterError::NotStopped),
        }
    }
}

fn single_graph(addon: &str, property: Option<serde_json::Value>) -> GraphDefinition {
    let mut node = GraphNode::new(addon, addon);
    node.property = property;

    let wire = |from: &str, to: &str| {
        [
            MsgKind::Cmd,
            MsgKind::Data,
            MsgKind::AudioFrame,
            MsgKind::VideoFrame,
        ]
        .into_iter()
        .fold(GraphConnection::from_extension(from), |conn, kind| {
            conn.with_flow(kind, MsgFlow::to_extensions(WILDCARD, [to]))
        })
    };

    GraphDefinition {
        nodes: vec![
            GraphNode::new(TESTER_EXTENSION_NAME, TESTER_EXTENSION_NAME),
            node,
        ],
        connections: vec![
            wire(TESTER_EXTENSION_NAME, addon),
            wire(addon, TESTER_EXTENSION_NAME),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_mode_graph_wires_both_directions() {
        let graph = single_graph("echo", Some(serde_json::json!({"greeting": "hi"})));
        graph.validate().unwrap();
        let flow = graph
            .flow_for(TESTER_EXTENSION_NAME, MsgKind::Cmd, "anything")
            .unwrap();
        assert_eq!(flow.dest[0].extension.as_ref().unwrap().as_str(), "echo");
        let back = graph.flow_for("echo", MsgKind::Data, "frame").unwrap();
        assert_eq!(
            back.dest[0].extension.as_ref().unwrap().as_str(),
            TESTER_EXTENSION_NAME
        );
        assert_eq!(graph.node("echo").unwrap().property.as_ref().unwrap()["greeting"], "hi");
    }

    #[test]
    fn run_without_mode_fails() {
        struct Idle;
        impl Tester for Idle {}
        let err = ExtensionTester::new(Idle).run().unwrap_err();
        assert!(matches!(err, TesterError::NoTestMode));
    }
}
