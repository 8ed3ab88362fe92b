//! Extension execution slot.
//!
//! One slot per extension instance. A slot owns a FIFO task queue and
//! a tokio task that drains it; every lifecycle hook, message handler
//! and callback of that extension runs on this task, one at a time.
//! Other parts of the runtime never call the extension directly: they
//! push a [`SlotTask`].
//!
//! The lifecycle is a strict ladder:
//!
//! ```text
//! unconfigured -> configuring -> configured -> initializing -> initialized
//!   -> starting -> started -> stopping -> stopped -> deinitializing -> deinited
//! ```
//!
//! The host begins each phase; the extension finishes it by calling
//! the matching `on_*_done` on its [`TenEnv`]. Signals outside the
//! awaited phase are rejected and escalated.
//!
//! Closing is driven by the slot itself once asked: a started slot is
//! stopped then deinitialized, a slot that got as far as `configured`
//! or `initialized` goes straight to deinit, and an unconfigured one
//! ends without any hook. A phase still in progress finishes first.
//! Startup phases queued behind a close are skipped.

use crate::callback::Callback;
use crate::context::AppContext;
use crate::env::TenEnv;
use crate::extension::Extension;
use crate::lock;
use crate::path::{Accepted, InPath, PathTable, Registration, ReturnCheck};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use ten_core::{
    Cmd, CmdResult, Envelope, ExtensionName, ExtensionState, Loc, Msg, Phase, PropertyStore,
    TenError,
};
use tokio::sync::{Notify, mpsc, watch};

/// Work queued for a slot.
#[derive(Debug)]
pub(crate) enum SlotTask {
    /// Host asks the slot to enter `phase`.
    Begin(Phase),
    /// Host asks the slot to wind down from wherever it is.
    Close,
    /// The extension finished `phase`.
    Done(Phase),
    /// An envelope routed to this extension.
    Deliver(Msg),
    /// A command this extension is sending. Queued before the command
    /// leaves, so it is always processed ahead of the command's results.
    Register(Registration),
    /// A result for a command this extension sent.
    Result(CmdResult),
    /// A result this extension returns for a command it received.
    Return { result: CmdResult, callback: Callback },
    /// Report the outcome of a send to its handler.
    Complete {
        callback: Callback,
        outcome: Result<(), TenError>,
    },
}

/// The parts of a slot other threads may touch.
pub(crate) struct SlotShared {
    pub(crate) name: ExtensionName,
    pub(crate) loc: Loc,
    tx: mpsc::UnboundedSender<SlotTask>,
    state: watch::Sender<ExtensionState>,
    pub(crate) properties: Mutex<PropertyStore>,
    teardown: Notify,
    forced: AtomicBool,
}

impl SlotShared {
    pub(crate) fn new(
        name: ExtensionName,
        loc: Loc,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SlotTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ExtensionState::Unconfigured);
        let shared = Arc::new(Self {
            name,
            loc,
            tx,
            state,
            properties: Mutex::new(PropertyStore::new()),
            teardown: Notify::new(),
            forced: AtomicBool::new(false),
        });
        (shared, rx)
    }

    pub(crate) fn state(&self) -> ExtensionState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, state: ExtensionState) {
        self.state.send_replace(state);
    }

    /// Queue a task. Hands the task back if the slot has exited.
    pub(crate) fn enqueue(&self, task: SlotTask) -> Result<(), SlotTask> {
        self.tx.send(task).map_err(|e| e.0)
    }

    pub(crate) fn begin(&self, phase: Phase) {
        if self.enqueue(SlotTask::Begin(phase)).is_err() {
            tracing::debug!(extension = %self.name, phase = %phase, "ten.slot.begin_after_exit");
        }
    }

    /// Ask the slot to wind down. False if the slot already exited.
    pub(crate) fn request_close(&self) -> bool {
        self.enqueue(SlotTask::Close).is_ok()
    }

    /// Wait until the slot reached `target` or any later state.
    pub(crate) async fn reached(&self, target: ExtensionState) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state >= target).await;
    }

    /// Wait until the slot is no longer in `state`.
    pub(crate) async fn left(&self, state: ExtensionState) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|current| *current != state).await;
    }

    /// Ask the slot task to drop everything and exit.
    pub(crate) fn force_teardown(&self) {
        self.teardown.notify_one();
    }

    /// Whether the slot was torn down without finishing its lifecycle.
    pub(crate) fn was_forced(&self) -> bool {
        self.forced.load(Ordering::Acquire)
    }
}

enum Next {
    Task(SlotTask),
    Teardown,
    Closed,
}

/// The task side of a slot.
pub(crate) struct SlotRunner {
    ext: Box<dyn Extension>,
    env: TenEnv,
    rx: mpsc::UnboundedReceiver<SlotTask>,
    paths: PathTable,
    closing: bool,
}

impl SlotRunner {
    pub(crate) fn new(
        ext: Box<dyn Extension>,
        shared: Arc<SlotShared>,
        rx: mpsc::UnboundedReceiver<SlotTask>,
        ctx: Arc<AppContext>,
    ) -> Self {
        Self {
            ext,
            env: TenEnv::new(shared, ctx),
            rx,
            paths: PathTable::new(),
            closing: false,
        }
    }

    pub(crate) async fn run(mut self) {
        let shared = Arc::clone(&self.env.slot);
        loop {
            let next = tokio::select! {
                biased;
                _ = shared.teardown.notified() => Next::Teardown,
                task = self.rx.recv() => task.map_or(Next::Closed, Next::Task),
            };
            match next {
                Next::Task(task) => {
                    if self.handle(task) {
                        break;
                    }
                }
                Next::Teardown => {
                    tracing::warn!(
                        extension = %shared.name,
                        state = %shared.state(),
                        "ten.slot.forced_teardown"
                    );
                    shared.forced.store(true, Ordering::Release);
                    self.drain();
                    self.transition(ExtensionState::Deinited);
                    break;
                }
                Next::Closed => break,
            }
        }

        self.rx.close();
        while let Ok(task) = self.rx.try_recv() {
            resolve_unprocessed(&self.env, task);
        }
        tracing::debug!(extension = %shared.name, "ten.slot.exited");
    }

    /// Returns true once the slot is finished.
    fn handle(&mut self, task: SlotTask) -> bool {
        match task {
            SlotTask::Begin(phase) => self.begin(phase),
            SlotTask::Close => {
                if !self.closing {
                    self.closing = true;
                    return self.advance_close();
                }
            }
            SlotTask::Done(phase) => return self.done(phase),
            SlotTask::Deliver(msg) => self.deliver(msg),
            SlotTask::Register(reg) => {
                self.paths.register(reg);
            }
            SlotTask::Result(result) => self.on_result(result),
            SlotTask::Return { result, callback } => self.on_return(result, callback),
            SlotTask::Complete { callback, outcome } => {
                let env = &self.env;
                guarded(env, "send handler", || callback.complete(env, outcome));
            }
        }
        false
    }

    fn transition(&self, to: ExtensionState) {
        let from = self.env.slot.state();
        self.env.slot.set_state(to);
        tracing::debug!(
            extension = %self.env.slot.name,
            from = %from,
            to = %to,
            "ten.slot.transition"
        );
    }

    fn begin(&mut self, phase: Phase) {
        let state = self.env.slot.state();
        if self.closing && matches!(phase, Phase::Configure | Phase::Init | Phase::Start) {
            tracing::debug!(
                extension = %self.env.slot.name,
                phase = %phase,
                "ten.slot.skipped_phase"
            );
            return;
        }
        let early_deinit = phase == Phase::Deinit
            && self.closing
            && matches!(state, ExtensionState::Configured | ExtensionState::Initialized);
        if state != phase.precondition() && !early_deinit {
            self.env.ctx.escalate(
                &self.env.slot.name,
                TenError::InvalidStateTransition {
                    extension: self.env.slot.name.to_string(),
                    detail: format!("cannot begin {phase} from state {state}"),
                },
            );
            return;
        }
        if phase == Phase::Deinit {
            self.drain();
        }
        self.transition(phase.in_progress());

        let (ext, env) = (&mut self.ext, &self.env);
        guarded(env, phase.hook_name(), || match phase {
            Phase::Configure => ext.on_configure(env),
            Phase::Init => ext.on_init(env),
            Phase::Start => ext.on_start(env),
            Phase::Stop => ext.on_stop(env),
            Phase::Deinit => ext.on_deinit(env),
        });
    }

    fn done(&mut self, phase: Phase) -> bool {
        let state = self.env.slot.state();
        if state.awaiting() != Some(phase) {
            self.env.ctx.escalate(
                &self.env.slot.name,
                TenError::InvalidStateTransition {
                    extension: self.env.slot.name.to_string(),
                    detail: format!(
                        "failed to {}_done() because of incorrect timing: state is {state}",
                        phase.hook_name()
                    ),
                },
            );
            return false;
        }
        self.transition(phase.completed());
        if phase == Phase::Deinit {
            self.drain();
            return true;
        }
        self.closing && self.advance_close()
    }

    /// Take the next step towards `deinited`. Returns true once the
    /// slot is finished.
    fn advance_close(&mut self) -> bool {
        match self.env.slot.state() {
            ExtensionState::Unconfigured => {
                self.drain();
                self.transition(ExtensionState::Deinited);
                true
            }
            ExtensionState::Configured
            | ExtensionState::Initialized
            | ExtensionState::Stopped => {
                self.begin(Phase::Deinit);
                false
            }
            ExtensionState::Started => {
                self.begin(Phase::Stop);
                false
            }
            // a phase is in progress; its done signal comes back here
            _ => false,
        }
    }

    fn deliver(&mut self, mut msg: Msg) {
        let state = self.env.slot.state();
        if !state.accepts_messages() {
            tracing::warn!(
                extension = %self.env.slot.name,
                kind = %msg.kind(),
                msg_name = msg.name(),
                state = %state,
                "ten.slot.rejected_delivery"
            );
            if let Msg::Cmd(cmd) = msg {
                answer_undeliverable(
                    &self.env.ctx,
                    &cmd,
                    format!("extension '{}' is {state}", self.env.slot.name),
                );
            }
            return;
        }

        // Routing is done; a re-sent envelope must be routed afresh
        // from this extension.
        msg.set_dests(Vec::new());
        let (ext, env) = (&mut self.ext, &self.env);
        match msg {
            Msg::Cmd(cmd) => {
                let sender = cmd.source().and_then(|loc| loc.extension.clone());
                if let (Some(cmd_id), Some(sender)) = (cmd.cmd_id().cloned(), sender) {
                    self.paths.insert_in(
                        cmd_id,
                        InPath {
                            sender,
                            cmd_name: cmd.name().to_owned(),
                            mode: cmd.result_mode(),
                        },
                    );
                }
                guarded(env, "on_cmd", || ext.on_cmd(env, cmd));
            }
            Msg::Data(data) => guarded(env, "on_data", || ext.on_data(env, data)),
            Msg::AudioFrame(frame) => {
                guarded(env, "on_audio_frame", || ext.on_audio_frame(env, frame))
            }
            Msg::VideoFrame(frame) => {
                guarded(env, "on_video_frame", || ext.on_video_frame(env, frame))
            }
            Msg::CmdResult(result) => self.on_result(result),
        }
    }

    fn on_result(&mut self, result: CmdResult) {
        let (group, deliver, retire) = match self.paths.accept(result) {
            Accepted::Group {
                group,
                deliver,
                retire,
            } => (group, deliver, retire),
            Accepted::Orphan { after_final: true } => {
                tracing::warn!(extension = %self.env.slot.name, "ten.correlator.result_after_final");
                return;
            }
            Accepted::Orphan { after_final: false } => {
                tracing::debug!(extension = %self.env.slot.name, "ten.correlator.orphan_result");
                return;
            }
        };

        if let Some(result) = deliver {
            let relay = match self.paths.group_mut(group) {
                Some(out) => match &mut out.callback {
                    Callback::Result(handler) => {
                        let env = &self.env;
                        guarded(env, "result handler", || handler.call(env, Ok(result)));
                        None
                    }
                    _ => out.parent.clone().map(|parent| (parent, result)),
                },
                None => None,
            };
            if let Some((parent, mut result)) = relay {
                let completed = result.is_completed();
                result.set_cmd_id(parent);
                result.set_final(completed);
                result.set_completed(false);
                result.set_source(self.env.slot.loc.clone());
                self.on_return(result, Callback::None);
            }
        }

        if retire {
            self.paths.retire(group);
        }
    }

    fn on_return(&mut self, result: CmdResult, callback: Callback) {
        let Some(cmd_id) = result.cmd_id().cloned() else {
            let env = &self.env;
            let err = TenError::InvalidArgument("the result carries no command id".into());
            guarded(env, "return handler", || callback.complete(env, Err(err)));
            return;
        };

        let violation = |detail: &str| TenError::CorrelationProtocolViolation {
            cmd_id: cmd_id.to_string(),
            detail: detail.to_owned(),
        };
        let outcome = match self.paths.check_return(&cmd_id, result.is_final()) {
            ReturnCheck::Route { sender } => self.send_result_to(&sender, result),
            ReturnCheck::AfterFinal => {
                let detail = "a result was returned after the final one";
                self.env.ctx.escalate(&self.env.slot.name, violation(detail));
                Err(violation(detail))
            }
            ReturnCheck::NonFinalInSingleMode => {
                let detail = "a non-final result was returned for a command expecting one result";
                self.env.ctx.escalate(&self.env.slot.name, violation(detail));
                Err(violation(detail))
            }
            ReturnCheck::Unknown => Err(TenError::InvalidArgument(format!(
                "no received command with id {cmd_id} is waiting for a result"
            ))),
        };
        let env = &self.env;
        guarded(env, "return handler", || callback.complete(env, outcome));
    }

    fn send_result_to(&self, sender: &ExtensionName, result: CmdResult) -> Result<(), TenError> {
        let destroyed = || TenError::ContextDestroyed {
            extension: sender.to_string(),
        };
        let slot = self.env.ctx.router.slot(sender).ok_or_else(destroyed)?;
        slot.enqueue(SlotTask::Result(result))
            .map_err(|_| destroyed())
    }

    /// Settle everything still in flight: outgoing commands learn the
    /// context is gone, incoming ones get an error result.
    fn drain(&mut self) {
        let out = self.paths.drain_out();
        let incoming = self.paths.drain_in();
        if out.is_empty() && incoming.is_empty() {
            return;
        }
        tracing::debug!(
            extension = %self.env.slot.name,
            out = out.len(),
            incoming = incoming.len(),
            "ten.slot.drained"
        );

        let env = &self.env;
        for group in out {
            tracing::debug!(
                extension = %env.slot.name,
                msg_name = %group.cmd_name,
                "ten.correlator.context_destroyed"
            );
            let err = TenError::ContextDestroyed {
                extension: env.slot.name.to_string(),
            };
            guarded(env, "result handler", || group.callback.complete(env, Err(err)));
        }
        for (cmd_id, path) in incoming {
            let result = CmdResult::error_for(cmd_id, &path.cmd_name).with_detail(format!(
                "extension '{}' was torn down before answering",
                env.slot.name
            ));
            let _ = self.send_result_to(&path.sender, result);
        }
    }
}

/// Resolve a task that will never reach a running slot.
pub(crate) fn resolve_unprocessed(env: &TenEnv, task: SlotTask) {
    let destroyed = || TenError::ContextDestroyed {
        extension: env.slot.name.to_string(),
    };
    match task {
        SlotTask::Register(reg) => {
            guarded(env, "result handler", || reg.callback.complete(env, Err(destroyed())))
        }
        SlotTask::Return { callback, .. } => {
            guarded(env, "return handler", || callback.complete(env, Err(destroyed())))
        }
        SlotTask::Complete { callback, outcome } => {
            guarded(env, "send handler", || callback.complete(env, outcome))
        }
        SlotTask::Deliver(Msg::Cmd(cmd)) => answer_undeliverable(
            &env.ctx,
            &cmd,
            format!("extension '{}' is gone", env.slot.name),
        ),
        SlotTask::Done(phase) if env.slot.was_forced() => {
            tracing::warn!(
                extension = %env.slot.name,
                phase = %phase,
                "ten.slot.late_done"
            );
        }
        SlotTask::Done(phase) => env.ctx.escalate(
            &env.slot.name,
            TenError::InvalidStateTransition {
                extension: env.slot.name.to_string(),
                detail: format!("{}_done() called after teardown", phase.hook_name()),
            },
        ),
        other => {
            tracing::debug!(extension = %env.slot.name, task = ?other, "ten.slot.dropped_task");
        }
    }
}

/// Send an error result back to the extension that sent `cmd`.
pub(crate) fn answer_undeliverable(ctx: &AppContext, cmd: &Cmd, detail: String) {
    let sender = cmd.source().and_then(|loc| loc.extension.as_ref());
    let (Some(sender), Some(cmd_id)) = (sender, cmd.cmd_id()) else {
        return;
    };
    let result = CmdResult::error_for(cmd_id.clone(), cmd.name()).with_detail(detail);
    if let Some(slot) = ctx.router.slot(sender) {
        let _ = slot.enqueue(SlotTask::Result(result));
    }
}

/// Run user code, turning a panic into an `ExtensionFault`.
pub(crate) fn guarded(env: &TenEnv, what: &str, f: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        env.ctx.escalate(
            &env.slot.name,
            TenError::ExtensionFault {
                extension: env.slot.name.to_string(),
                detail: format!("panic in {what}: {}", panic_message(payload.as_ref())),
            },
        );
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

pub(crate) fn replace_properties(slot: &SlotShared, props: PropertyStore) {
    *lock(&slot.properties) = props;
}
