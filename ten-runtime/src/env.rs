//! The handle an extension uses to talk to the runtime.

use crate::callback::{Callback, ErrorHandler, ResultHandler};
use crate::context::AppContext;
use crate::lock;
use crate::path::Registration;
use crate::slot::{SlotShared, SlotTask, resolve_unprocessed};
use std::sync::{Arc, MutexGuard};
use ten_core::{
    AudioFrame, Cmd, CmdId, CmdResult, Data, Envelope, ExtensionName, ExtensionState, Msg,
    MsgKind, Phase, PropertyStore, ResultMode, TenError, Value, VideoFrame,
};

/// An extension's view of the runtime.
///
/// Cheap to clone; clones may be moved to other threads. Everything a
/// `TenEnv` triggers that calls back into the extension (result
/// handlers, error handlers) runs on the extension's own slot, never
/// inline in the caller.
#[derive(Clone)]
pub struct TenEnv {
    pub(crate) slot: Arc<SlotShared>,
    pub(crate) ctx: Arc<AppContext>,
}

impl std::fmt::Debug for TenEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenEnv")
            .field("extension", &self.slot.name)
            .field("state", &self.slot.state())
            .finish()
    }
}

impl TenEnv {
    pub(crate) fn new(slot: Arc<SlotShared>, ctx: Arc<AppContext>) -> Self {
        Self { slot, ctx }
    }

    /// Name of the extension this env belongs to.
    pub fn extension_name(&self) -> &ExtensionName {
        &self.slot.name
    }

    /// URI of the app hosting the extension.
    pub fn app_uri(&self) -> &str {
        &self.ctx.uri
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExtensionState {
        self.slot.state()
    }

    // ━━━ Lifecycle ━━━

    /// Finish `on_configure`.
    pub fn on_configure_done(&self) {
        self.signal_done(Phase::Configure);
    }

    /// Finish `on_init`.
    pub fn on_init_done(&self) {
        self.signal_done(Phase::Init);
    }

    /// Finish `on_start`. The extension starts receiving envelopes.
    pub fn on_start_done(&self) {
        self.signal_done(Phase::Start);
    }

    /// Finish `on_stop`.
    pub fn on_stop_done(&self) {
        self.signal_done(Phase::Stop);
    }

    /// Finish `on_deinit`. The env is unusable afterwards.
    pub fn on_deinit_done(&self) {
        self.signal_done(Phase::Deinit);
    }

    pub(crate) fn signal_done(&self, phase: Phase) {
        self.enqueue_own(SlotTask::Done(phase));
    }

    // ━━━ Sending ━━━

    /// Send a command and receive its single, completed result.
    ///
    /// Forwarding a received command with no handler keeps its result
    /// mode and relays every result back to the original sender.
    pub fn send_cmd(&self, cmd: Cmd, handler: Option<ResultHandler>) {
        let mode = match (&handler, cmd.cmd_id()) {
            (None, Some(_)) => cmd.result_mode(),
            _ => ResultMode::Single,
        };
        self.dispatch_cmd(cmd, Callback::for_result(handler), mode);
    }

    /// Send a command and receive every result, streamed, ending with
    /// one marked completed.
    pub fn send_cmd_ex(&self, cmd: Cmd, handler: Option<ResultHandler>) {
        self.dispatch_cmd(cmd, Callback::for_result(handler), ResultMode::Multi);
    }

    fn dispatch_cmd(&self, mut cmd: Cmd, callback: Callback, mode: ResultMode) {
        let parent = cmd.take_cmd_id();
        let route = match self.ctx.router.resolve(
            &self.slot.name,
            MsgKind::Cmd,
            cmd.name(),
            cmd.dests(),
        ) {
            Ok(route) => route,
            Err(e) => return self.complete(callback, Err(e)),
        };

        let members: Vec<CmdId> = route.targets.iter().map(|_| CmdId::generate()).collect();
        let registration = Registration {
            cmd_name: cmd.name().to_owned(),
            mode,
            policy: route.policy,
            callback,
            parent: parent.clone(),
            members: members.clone(),
        };
        if let Err(task) = self.slot.enqueue(SlotTask::Register(registration)) {
            return resolve_unprocessed(self, task);
        }

        cmd.set_source(self.slot.loc.clone());
        for (target, cmd_id) in route.targets.iter().zip(members) {
            let mut copy = cmd.clone();
            copy.stamp(cmd_id.clone(), parent.clone(), mode);
            copy.set_dests(vec![target.loc.clone()]);
            if target.enqueue(SlotTask::Deliver(Msg::Cmd(copy))).is_err() {
                let result = CmdResult::error_for(cmd_id, cmd.name())
                    .with_detail(format!("extension '{}' is gone", target.name));
                self.enqueue_own(SlotTask::Result(result));
            }
        }
    }

    /// Send a data message.
    pub fn send_data(&self, data: Data, handler: Option<ErrorHandler>) {
        self.dispatch_oneway(Msg::Data(data), handler);
    }

    /// Send an audio frame.
    pub fn send_audio_frame(&self, frame: AudioFrame, handler: Option<ErrorHandler>) {
        self.dispatch_oneway(Msg::AudioFrame(frame), handler);
    }

    /// Send a video frame.
    pub fn send_video_frame(&self, frame: VideoFrame, handler: Option<ErrorHandler>) {
        self.dispatch_oneway(Msg::VideoFrame(frame), handler);
    }

    fn dispatch_oneway(&self, msg: Msg, handler: Option<ErrorHandler>) {
        let outcome = self.route_oneway(msg);
        self.complete(Callback::for_error(handler), outcome);
    }

    fn route_oneway(&self, mut msg: Msg) -> Result<(), TenError> {
        if msg.is_buf_locked() {
            return Err(TenError::InvalidArgument(
                "locked resources are not allowed in messages sent from an extension".into(),
            ));
        }
        let route = self
            .ctx
            .router
            .resolve(&self.slot.name, msg.kind(), msg.name(), msg.dests())?;
        msg.set_source(self.slot.loc.clone());
        for target in &route.targets {
            let mut copy = msg.clone();
            copy.set_dests(vec![target.loc.clone()]);
            if target.enqueue(SlotTask::Deliver(copy)).is_err() {
                tracing::warn!(
                    extension = %self.slot.name,
                    target = %target.name,
                    kind = %msg.kind(),
                    msg_name = msg.name(),
                    "ten.router.target_gone"
                );
            }
        }
        Ok(())
    }

    /// Answer a command this extension received.
    ///
    /// `target` is the received command. A result marked final closes
    /// the command; non-final results are only allowed when the sender
    /// used [`send_cmd_ex`](Self::send_cmd_ex).
    pub fn return_result(&self, mut result: CmdResult, target: &Cmd, handler: Option<ErrorHandler>) {
        let callback = Callback::for_error(handler);
        let Some(cmd_id) = target.cmd_id() else {
            return self.complete(
                callback,
                Err(TenError::InvalidArgument(format!(
                    "cmd '{}' was not received from another extension",
                    target.name()
                ))),
            );
        };
        result.set_cmd_id(cmd_id.clone());
        result.set_source(self.slot.loc.clone());
        self.enqueue_own(SlotTask::Return { result, callback });
    }

    fn complete(&self, callback: Callback, outcome: Result<(), TenError>) {
        self.enqueue_own(SlotTask::Complete { callback, outcome });
    }

    fn enqueue_own(&self, task: SlotTask) {
        if let Err(task) = self.slot.enqueue(task) {
            resolve_unprocessed(self, task);
        }
    }

    // ━━━ Properties ━━━

    fn properties(&self) -> Result<MutexGuard<'_, PropertyStore>, TenError> {
        if self.slot.state() == ExtensionState::Deinited {
            return Err(TenError::ContextDestroyed {
                extension: self.slot.name.to_string(),
            });
        }
        Ok(lock(&self.slot.properties))
    }

    /// Read a property; falls back to the declared default.
    pub fn get_property(&self, path: &str) -> Result<Value, TenError> {
        self.properties()?.get(path)
    }

    /// Read a `bool` property.
    pub fn get_property_bool(&self, path: &str) -> Result<bool, TenError> {
        self.properties()?.get_bool(path)
    }

    /// Read an integer property.
    pub fn get_property_int(&self, path: &str) -> Result<i64, TenError> {
        self.properties()?.get_int(path)
    }

    /// Read a float property. Integers are widened.
    pub fn get_property_float(&self, path: &str) -> Result<f64, TenError> {
        self.properties()?.get_float(path)
    }

    /// Read a string property.
    pub fn get_property_string(&self, path: &str) -> Result<String, TenError> {
        self.properties()?.get_string(path)
    }

    /// Read a binary property.
    pub fn get_property_buf(&self, path: &str) -> Result<Vec<u8>, TenError> {
        self.properties()?.get_buf(path)
    }

    /// Read a property as JSON text.
    pub fn get_property_to_json(&self, path: &str) -> Result<String, TenError> {
        self.properties()?.get_json(path)
    }

    /// Store a property, creating intermediate objects.
    pub fn set_property(&self, path: &str, value: impl Into<Value>) -> Result<(), TenError> {
        self.properties()?.set(path, value)
    }

    /// Store a `bool` property.
    pub fn set_property_bool(&self, path: &str, value: bool) -> Result<(), TenError> {
        self.set_property(path, value)
    }

    /// Store an integer property.
    pub fn set_property_int(&self, path: &str, value: i64) -> Result<(), TenError> {
        self.set_property(path, value)
    }

    /// Store a float property.
    pub fn set_property_float(&self, path: &str, value: f64) -> Result<(), TenError> {
        self.set_property(path, value)
    }

    /// Store a string property.
    pub fn set_property_string(&self, path: &str, value: &str) -> Result<(), TenError> {
        self.set_property(path, value)
    }

    /// Store a binary property.
    pub fn set_property_buf(&self, path: &str, value: Vec<u8>) -> Result<(), TenError> {
        self.set_property(path, value)
    }

    /// Store a property parsed from JSON text.
    pub fn set_property_from_json(&self, path: &str, json: &str) -> Result<(), TenError> {
        self.properties()?.set_json(path, json)
    }

    /// Whether a property is set or has a declared default.
    pub fn is_property_exist(&self, path: &str) -> bool {
        self.properties().is_ok_and(|props| props.contains(path))
    }

    /// Replace all properties with the object in `json`.
    pub fn init_property_from_json(&self, json: &str) -> Result<(), TenError> {
        self.properties()?.init_from_json(json)
    }

    // ━━━ Logging ━━━

    /// Log at debug level, tagged with the extension name.
    pub fn log_debug(&self, msg: &str) {
        tracing::debug!(app = %self.ctx.uri, extension = %self.slot.name, "{msg}");
    }

    /// Log at info level, tagged with the extension name.
    pub fn log_info(&self, msg: &str) {
        tracing::info!(app = %self.ctx.uri, extension = %self.slot.name, "{msg}");
    }

    /// Log at warn level, tagged with the extension name.
    pub fn log_warn(&self, msg: &str) {
        tracing::warn!(app = %self.ctx.uri, extension = %self.slot.name, "{msg}");
    }

    /// Log at error level, tagged with the extension name.
    pub fn log_error(&self, msg: &str) {
        tracing::error!(app = %self.ctx.uri, extension = %self.slot.name, "{msg}");
    }

    // ━━━ App ━━━

    /// Ask the hosting app to close. Returns immediately.
    pub fn close_app(&self) {
        tracing::info!(extension = %self.slot.name, "ten.env.close_app");
        self.ctx.request_close();
    }
}
