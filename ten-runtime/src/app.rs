//! The App/Engine host.
//!
//! An [`App`] owns one slot per graph node and drives them in waves:
//! every slot is configured, then every slot is initialized, then
//! started. Extensions marked to start last (the test harness) only
//! start once all others are `Started`. Closing runs `stop` then
//! `deinit` on every slot concurrently; slots that have not reached
//! `Deinited` within the grace period are torn down by force and the
//! close is reported as an anomaly.

use crate::addon::{Addon, AddonRegistry};
use crate::context::{AppContext, closed};
use crate::extension::Extension;
use crate::fault::{AbortOnFault, FaultPolicy};
use crate::lock;
use crate::router::Router;
use crate::slot::{SlotRunner, SlotShared, replace_properties};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use ten_core::{
    AddonName, AppConfig, ExtensionName, ExtensionState, GraphDefinition, Loc, Phase,
    PropertyStore, TenError, Value,
};
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};

/// How long forcibly torn down slots get to exit.
const JOIN_GRACE: Duration = Duration::from_millis(500);

/// How [`App::run`] hosts the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run on the calling thread until the app closes.
    Blocking,
    /// Run on a new thread; use [`App::wait`] to join it.
    Background,
}

/// Outcome of a close.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReport {
    /// Extensions that missed the grace period and were torn down by
    /// force.
    pub forced: Vec<ExtensionName>,
}

impl CloseReport {
    /// Whether every extension went through `stop` and `deinit`.
    pub fn is_clean(&self) -> bool {
        self.forced.is_empty()
    }
}

/// Builds an [`App`].
pub struct AppBuilder {
    config: AppConfig,
    addons: AddonRegistry,
    graph: Option<GraphDefinition>,
    fault: Arc<dyn FaultPolicy>,
    instances: HashMap<String, Box<dyn Extension>>,
    start_last: HashSet<String>,
}

impl AppBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            addons: AddonRegistry::new(),
            graph: None,
            fault: Arc::new(AbortOnFault),
            instances: HashMap::new(),
            start_last: HashSet::new(),
        }
    }

    /// Use `addons` to create extension instances.
    #[must_use]
    pub fn addons(mut self, addons: AddonRegistry) -> Self {
        self.addons = addons;
        self
    }

    /// Register one more addon.
    pub fn addon(
        mut self,
        name: impl Into<AddonName>,
        addon: impl Addon + 'static,
    ) -> Result<Self, TenError> {
        self.addons.register(name, addon)?;
        Ok(self)
    }

    /// Run `graph` instead of the configuration's auto-start graph.
    #[must_use]
    pub fn graph(mut self, graph: GraphDefinition) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Replace the fault policy. Defaults to [`AbortOnFault`].
    #[must_use]
    pub fn fault_policy(mut self, policy: Arc<dyn FaultPolicy>) -> Self {
        self.fault = policy;
        self
    }

    /// Host a ready-made instance for node `node` instead of asking its
    /// addon.
    pub(crate) fn instance(mut self, node: &str, ext: Box<dyn Extension>) -> Self {
        self.instances.insert(node.to_owned(), ext);
        self
    }

    /// Start node `node` after every other extension is `Started`.
    pub(crate) fn start_last(mut self, node: &str) -> Self {
        self.start_last.insert(node.to_owned());
        self
    }

    /// Validate the graph, create every instance and wire the slots.
    pub fn build(self) -> Result<App, TenError> {
        let AppBuilder {
            config,
            mut addons,
            graph,
            fault,
            mut instances,
            start_last,
        } = self;

        if let Some(level) = &config.log_level {
            crate::logging::init(level);
        }

        let graph = match graph {
            Some(graph) => graph,
            None => config
                .auto_start_graph()
                .map(|predefined| predefined.graph.clone())
                .unwrap_or_default(),
        };
        graph.validate()?;
        addons.freeze();

        let mut built = Vec::with_capacity(graph.nodes.len());
        for node in &graph.nodes {
            if node.app.as_deref().is_some_and(|app| app != config.uri) {
                tracing::debug!(app = %config.uri, node = %node.name, "ten.app.foreign_node");
                continue;
            }
            let (ext, schema) = match instances.remove(&node.name) {
                Some(ext) => (ext, None),
                None => addons.create(&node.addon, &node.name)?,
            };

            let mut props = PropertyStore::new();
            if let Some(schema) = schema {
                props.set_schema(schema);
            }
            if let Some(seed) = &node.property {
                props.merge_json(seed.clone())?;
            }

            let name = ExtensionName::from(node.name.as_str());
            let mut loc = Loc::extension(name.clone()).with_app(config.uri.clone());
            if let Some(group) = &node.extension_group {
                loc = loc.with_group(group.clone());
            }
            let (shared, rx) = SlotShared::new(name, loc);
            replace_properties(&shared, props);
            built.push((shared, rx, ext, start_last.contains(&node.name)));
        }

        let router = Router::new(
            config.uri.clone(),
            graph,
            built.iter().map(|(shared, ..)| Arc::clone(shared)),
        );
        let ctx = Arc::new(AppContext::new(config.uri.clone(), router, fault));

        let mut slots = Vec::with_capacity(built.len());
        let mut runners = Vec::with_capacity(built.len());
        for (shared, rx, ext, last) in built {
            runners.push(SlotRunner::new(ext, Arc::clone(&shared), rx, Arc::clone(&ctx)));
            slots.push(SlotEntry {
                shared,
                start_last: last,
            });
        }

        let mut properties = PropertyStore::new();
        properties.merge_json(serde_json::Value::Object(config.properties.clone()))?;

        tracing::debug!(app = %config.uri, extensions = slots.len(), "ten.app.built");
        Ok(App {
            core: Arc::new(AppCore {
                config,
                ctx,
                slots,
                runners: Mutex::new(runners),
                addons: Mutex::new(addons),
                properties: Mutex::new(properties),
                started: AtomicBool::new(false),
                background: Mutex::new(None),
                latch: CloseLatch::new(),
            }),
        })
    }
}

struct SlotEntry {
    shared: Arc<SlotShared>,
    start_last: bool,
}

struct AppCore {
    config: AppConfig,
    ctx: Arc<AppContext>,
    slots: Vec<SlotEntry>,
    runners: Mutex<Vec<SlotRunner>>,
    addons: Mutex<AddonRegistry>,
    properties: Mutex<PropertyStore>,
    started: AtomicBool,
    background: Mutex<Option<thread::JoinHandle<Result<(), TenError>>>>,
    latch: CloseLatch,
}

/// A running set of extensions.
///
/// Cheap to clone; clones control the same app.
#[derive(Clone)]
pub struct App {
    core: Arc<AppCore>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("uri", &self.core.config.uri)
            .field("extensions", &self.core.slots.len())
            .finish()
    }
}

impl App {
    /// Shorthand for [`AppBuilder::new`].
    #[must_use]
    pub fn builder(config: AppConfig) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The app URI.
    pub fn uri(&self) -> &str {
        &self.core.config.uri
    }

    /// Lifecycle state of extension `name`.
    pub fn extension_state(&self, name: &str) -> Option<ExtensionState> {
        self.core
            .ctx
            .router
            .slot(&ExtensionName::from(name))
            .map(|slot| slot.state())
    }

    /// Read an app property.
    pub fn get_property(&self, path: &str) -> Result<Value, TenError> {
        lock(&self.core.properties).get(path)
    }

    /// Read an app property as JSON text.
    pub fn get_property_to_json(&self, path: &str) -> Result<String, TenError> {
        lock(&self.core.properties).get_json(path)
    }

    /// Spawn the slots on the current tokio runtime and bring every
    /// extension up. Returns once all are `Started`, or once a close
    /// interrupted startup.
    pub async fn start(&self) -> Result<(), TenError> {
        self.claim_start()?;
        self.launch().await;
        Ok(())
    }

    fn claim_start(&self) -> Result<(), TenError> {
        if self.core.started.swap(true, Ordering::SeqCst) {
            return Err(TenError::InvalidArgument(format!(
                "app '{}' was already started",
                self.core.config.uri
            )));
        }
        Ok(())
    }

    async fn launch(&self) {
        let runners = std::mem::take(&mut *lock(&self.core.runners));
        let tasks: Vec<JoinHandle<()>> = runners
            .into_iter()
            .map(|runner| tokio::spawn(runner.run()))
            .collect();

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(Arc::clone(&self.core).drive(tasks, ready_tx));
        let _ = ready_rx.await;
    }

    /// Start a close and wait for it to finish.
    pub async fn close_async(&self) -> CloseReport {
        self.request_close();
        self.core.latch.wait().await
    }

    /// Wait until the app has closed.
    pub async fn wait_async(&self) -> CloseReport {
        self.core.latch.wait().await
    }

    /// Run the app on a runtime of its own.
    ///
    /// [`RunMode::Blocking`] returns once the app has closed;
    /// [`RunMode::Background`] returns at once. Either way the app
    /// counts as started, so a [`close`](Self::close) right after a
    /// background run goes through the full cascade.
    pub fn run(&self, mode: RunMode) -> Result<(), TenError> {
        self.claim_start()?;
        match mode {
            RunMode::Blocking => self.run_to_close(),
            RunMode::Background => {
                let app = self.clone();
                let spawned = thread::Builder::new()
                    .name(format!("ten-app:{}", self.core.config.uri))
                    .spawn(move || app.run_to_close());
                match spawned {
                    Ok(handle) => {
                        *lock(&self.core.background) = Some(handle);
                        Ok(())
                    }
                    Err(e) => {
                        self.core.finish(CloseReport::default());
                        Err(TenError::Other(Box::new(e)))
                    }
                }
            }
        }
    }

    fn run_to_close(&self) -> Result<(), TenError> {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("ten-slot")
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                self.core.finish(CloseReport::default());
                return Err(TenError::Other(Box::new(e)));
            }
        };
        runtime.block_on(async {
            self.launch().await;
            self.wait_async().await;
        });
        runtime.shutdown_timeout(JOIN_GRACE);
        Ok(())
    }

    /// Block until the app has closed. Joins the background thread of
    /// [`RunMode::Background`].
    pub fn wait(&self) -> Result<CloseReport, TenError> {
        let background = lock(&self.core.background).take();
        if let Some(handle) = background {
            handle
                .join()
                .map_err(|_| TenError::Other("app thread panicked".into()))??;
        }
        Ok(self.core.latch.wait_blocking())
    }

    /// Block until the app has closed or `timeout` elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CloseReport> {
        self.core.latch.wait_blocking_timeout(timeout)
    }

    /// Start a close and block until it finished. Must not be called
    /// from inside the app's runtime; use [`close_async`](Self::close_async)
    /// there.
    pub fn close(&self) -> CloseReport {
        self.request_close();
        self.core.latch.wait_blocking()
    }

    fn request_close(&self) {
        if !self.core.started.swap(true, Ordering::SeqCst) {
            tracing::debug!(app = %self.core.config.uri, "ten.app.closed_before_start");
            self.core.finish(CloseReport::default());
            return;
        }
        self.core.ctx.request_close();
    }
}

impl AppCore {
    async fn drive(self: Arc<Self>, tasks: Vec<JoinHandle<()>>, ready: oneshot::Sender<()>) {
        let uri = self.config.uri.clone();
        let mut close = self.ctx.close_signal();

        let started = tokio::select! {
            () = self.bring_up() => true,
            () = closed(&mut close) => false,
        };
        let _ = ready.send(());

        if started {
            tracing::info!(app = %uri, extensions = self.slots.len(), "ten.app.started");
            if self.slots.is_empty() && !self.config.long_running_mode {
                self.ctx.request_close();
            }
            closed(&mut close).await;
        } else {
            tracing::warn!(app = %uri, "ten.app.closed_during_startup");
        }

        let report = self.bring_down(tasks).await;
        tracing::info!(app = %uri, clean = report.is_clean(), "ten.app.closed");
        self.finish(report);
    }

    async fn bring_up(&self) {
        for phase in [Phase::Configure, Phase::Init] {
            for entry in &self.slots {
                entry.shared.begin(phase);
            }
            for entry in &self.slots {
                entry.shared.reached(phase.completed()).await;
            }
        }
        for last in [false, true] {
            let wave: Vec<&SlotEntry> = self
                .slots
                .iter()
                .filter(|entry| entry.start_last == last)
                .collect();
            for entry in &wave {
                entry.shared.begin(Phase::Start);
            }
            for entry in &wave {
                entry.shared.reached(ExtensionState::Started).await;
            }
        }
    }

    async fn bring_down(&self, tasks: Vec<JoinHandle<()>>) -> CloseReport {
        let mut cascade = JoinSet::new();
        for entry in &self.slots {
            let shared = Arc::clone(&entry.shared);
            cascade.spawn(async move {
                if shared.request_close() {
                    shared.reached(ExtensionState::Deinited).await;
                }
            });
        }

        let grace = self.config.close_grace();
        let finished = tokio::time::timeout(grace, async {
            while cascade.join_next().await.is_some() {}
        })
        .await;
        drop(cascade);

        let mut report = CloseReport::default();
        if finished.is_err() {
            report.forced = self
                .slots
                .iter()
                .filter(|entry| entry.shared.state() != ExtensionState::Deinited)
                .map(|entry| entry.shared.name.clone())
                .collect();
            tracing::error!(
                app = %self.config.uri,
                grace_ms = grace.as_millis() as u64,
                forced = ?report.forced,
                "ten.app.close_anomaly"
            );
            for entry in &self.slots {
                if entry.shared.state() != ExtensionState::Deinited {
                    entry.shared.force_teardown();
                }
            }
        }

        let joined = tokio::time::timeout(JOIN_GRACE, async {
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::error!(app = %self.config.uri, error = %e, "ten.app.slot_task_failed");
                }
            }
        })
        .await;
        if joined.is_err() {
            tracing::warn!(app = %self.config.uri, "ten.app.slot_task_stuck");
        }
        report
    }

    fn finish(&self, report: CloseReport) {
        lock(&self.addons).destroy();
        self.latch.release(report);
    }
}

/// One-shot close notification usable from sync and async callers.
struct CloseLatch {
    report: Mutex<Option<CloseReport>>,
    cond: Condvar,
    signal: watch::Sender<bool>,
}

impl CloseLatch {
    fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            report: Mutex::new(None),
            cond: Condvar::new(),
            signal,
        }
    }

    fn release(&self, report: CloseReport) {
        let mut slot = lock(&self.report);
        if slot.is_none() {
            *slot = Some(report);
        }
        drop(slot);
        self.cond.notify_all();
        self.signal.send_replace(true);
    }

    fn current(&self) -> Option<CloseReport> {
        lock(&self.report).clone()
    }

    fn wait_blocking(&self) -> CloseReport {
        let mut slot = lock(&self.report);
        loop {
            if let Some(report) = slot.as_ref() {
                return report.clone();
            }
            slot = self
                .cond
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wait_blocking_timeout(&self, timeout: Duration) -> Option<CloseReport> {
        let slot = lock(&self.report);
        let (slot, _) = self
            .cond
            .wait_timeout_while(slot, timeout, |report| report.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.clone()
    }

    async fn wait(&self) -> CloseReport {
        let mut released = self.signal.subscribe();
        closed(&mut released).await;
        self.current().unwrap_or_default()
    }
}
