//! The extension contract.

use crate::env::TenEnv;
use ten_core::{AudioFrame, Cmd, CmdResult, Data, Envelope, VideoFrame};

/// A unit of behavior hosted in a slot.
///
/// Every method runs on the extension's slot task, one at a time. The
/// lifecycle hooks must eventually call the matching `on_*_done` on
/// `env`; they may do so later from another thread holding a clone of
/// the env. The provided hooks signal completion immediately.
///
/// A received [`Cmd`] must be answered with
/// [`TenEnv::return_result`]; the provided `on_cmd` answers with an
/// error result.
pub trait Extension: Send + 'static {
    /// First lifecycle hook; properties from the graph are in place.
    fn on_configure(&mut self, env: &TenEnv) {
        env.on_configure_done();
    }

    /// Initialize resources.
    fn on_init(&mut self, env: &TenEnv) {
        env.on_init_done();
    }

    /// Envelopes are delivered once this phase is done.
    fn on_start(&mut self, env: &TenEnv) {
        env.on_start_done();
    }

    /// No envelopes are delivered from here on.
    fn on_stop(&mut self, env: &TenEnv) {
        env.on_stop_done();
    }

    /// Release resources. Unanswered commands have been failed.
    fn on_deinit(&mut self, env: &TenEnv) {
        env.on_deinit_done();
    }

    /// Handle a command.
    fn on_cmd(&mut self, env: &TenEnv, cmd: Cmd) {
        let result = CmdResult::error(&cmd)
            .with_detail(format!("cmd '{}' is not handled", cmd.name()));
        env.return_result(result, &cmd, None);
    }

    /// Handle a data message.
    fn on_data(&mut self, _env: &TenEnv, _data: Data) {}

    /// Handle an audio frame.
    fn on_audio_frame(&mut self, _env: &TenEnv, _frame: AudioFrame) {}

    /// Handle a video frame.
    fn on_video_frame(&mut self, _env: &TenEnv, _frame: VideoFrame) {}
}
