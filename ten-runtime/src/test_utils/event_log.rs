//! RecordingExtension: records every hook it sees.

use crate::env::TenEnv;
use crate::extension::Extension;
use crate::lock;
use std::sync::{Arc, Mutex};
use ten_core::{AudioFrame, Cmd, CmdResult, Data, Envelope, VideoFrame};

/// A shared, ordered log of `"<extension>:<event>"` entries.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&self, entry: impl Into<String>) {
        lock(&self.0).push(entry.into());
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    /// Entries of one extension, without the name prefix.
    pub fn entries_of(&self, extension: &str) -> Vec<String> {
        let prefix = format!("{extension}:");
        lock(&self.0)
            .iter()
            .filter_map(|e| e.strip_prefix(&prefix).map(str::to_owned))
            .collect()
    }
}

/// Records each lifecycle hook and message, completes every phase at
/// once and answers commands OK.
#[derive(Debug, Clone)]
pub struct RecordingExtension {
    name: String,
    log: EventLog,
}

impl RecordingExtension {
    /// Record into `log` under `name`.
    pub fn new(name: impl Into<String>, log: EventLog) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }

    fn record(&self, event: impl std::fmt::Display) {
        self.log.push(format!("{}:{event}", self.name));
    }
}

impl Extension for RecordingExtension {
    fn on_configure(&mut self, env: &TenEnv) {
        self.record("on_configure");
        env.on_configure_done();
    }

    fn on_init(&mut self, env: &TenEnv) {
        self.record("on_init");
        env.on_init_done();
    }

    fn on_start(&mut self, env: &TenEnv) {
        self.record("on_start");
        env.on_start_done();
    }

    fn on_stop(&mut self, env: &TenEnv) {
        self.record("on_stop");
        env.on_stop_done();
    }

    fn on_deinit(&mut self, env: &TenEnv) {
        self.record("on_deinit");
        env.on_deinit_done();
    }

    fn on_cmd(&mut self, env: &TenEnv, cmd: Cmd) {
        self.record(format_args!("on_cmd:{}", cmd.name()));
        env.return_result(CmdResult::ok(&cmd), &cmd, None);
    }

    fn on_data(&mut self, _env: &TenEnv, data: Data) {
        self.record(format_args!("on_data:{}", data.name()));
    }

    fn on_audio_frame(&mut self, _env: &TenEnv, frame: AudioFrame) {
        self.record(format_args!("on_audio_frame:{}", frame.name()));
    }

    fn on_video_frame(&mut self, _env: &TenEnv, frame: VideoFrame) {
        self.record(format_args!("on_video_frame:{}", frame.name()));
    }
}
