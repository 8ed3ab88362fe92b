//! `async` extensions.
//!
//! An [`AsyncExtension`] runs on a dedicated tokio task. Its slot feeds
//! that task through a queue, so hooks still run one at a time and in
//! delivery order; each lifecycle hook signals its `on_*_done` when
//! the returned future completes.

use crate::async_env::AsyncTenEnv;
use crate::env::TenEnv;
use crate::extension::Extension;
use crate::slot::panic_message;
use async_trait::async_trait;
use ten_core::{AudioFrame, Cmd, CmdResult, Data, Envelope, Phase, TenError, VideoFrame};
use tokio::sync::mpsc;

/// An extension written with `async` hooks.
#[async_trait]
pub trait AsyncExtension: Send + 'static {
    /// Configure. Completion is signalled when this returns.
    async fn on_configure(&mut self, _env: &AsyncTenEnv) {}

    /// Initialize.
    async fn on_init(&mut self, _env: &AsyncTenEnv) {}

    /// Start.
    async fn on_start(&mut self, _env: &AsyncTenEnv) {}

    /// Stop.
    async fn on_stop(&mut self, _env: &AsyncTenEnv) {}

    /// Deinitialize. The task ends after this.
    async fn on_deinit(&mut self, _env: &AsyncTenEnv) {}

    /// Handle a command.
    async fn on_cmd(&mut self, env: &AsyncTenEnv, cmd: Cmd) {
        let result = CmdResult::error(&cmd)
            .with_detail(format!("cmd '{}' is not handled", cmd.name()));
        if let Err(e) = env.return_result(result, &cmd).await {
            env.log_warn(&format!("failed to answer '{}': {e}", cmd.name()));
        }
    }

    /// Handle a data message.
    async fn on_data(&mut self, _env: &AsyncTenEnv, _data: Data) {}

    /// Handle an audio frame.
    async fn on_audio_frame(&mut self, _env: &AsyncTenEnv, _frame: AudioFrame) {}

    /// Handle a video frame.
    async fn on_video_frame(&mut self, _env: &AsyncTenEnv, _frame: VideoFrame) {}
}

enum Job {
    Lifecycle(Phase),
    Cmd(Cmd),
    Data(Data),
    AudioFrame(AudioFrame),
    VideoFrame(VideoFrame),
}

/// Hosts an [`AsyncExtension`] in a slot.
pub struct AsyncAdapter<E> {
    pending: Option<E>,
    jobs: Option<mpsc::UnboundedSender<Job>>,
}

impl<E: AsyncExtension> AsyncAdapter<E> {
    /// Wrap `ext`.
    pub fn new(ext: E) -> Self {
        Self {
            pending: Some(ext),
            jobs: None,
        }
    }

    fn push(&mut self, env: &TenEnv, job: Job) {
        if self.jobs.is_none() {
            self.spawn(env);
        }
        let Some(jobs) = &self.jobs else { return };
        if jobs.send(job).is_err() {
            tracing::warn!(extension = %env.extension_name(), "ten.async.worker_gone");
        }
    }

    fn spawn(&mut self, env: &TenEnv) {
        let Some(ext) = self.pending.take() else { return };
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                env.ctx.escalate(
                    env.extension_name(),
                    TenError::ExtensionFault {
                        extension: env.extension_name().to_string(),
                        detail: format!("no tokio runtime for the async extension: {e}"),
                    },
                );
                return;
            }
        };
        let (tx, rx) = mpsc::unbounded_channel();
        self.jobs = Some(tx);

        let worker = handle.spawn(work(ext, AsyncTenEnv::new(env.clone()), rx));
        let env = env.clone();
        handle.spawn(async move {
            if let Err(e) = worker.await {
                if e.is_panic() {
                    let detail = panic_message(e.into_panic().as_ref());
                    env.ctx.escalate(
                        env.extension_name(),
                        TenError::ExtensionFault {
                            extension: env.extension_name().to_string(),
                            detail: format!("panic in async extension: {detail}"),
                        },
                    );
                }
            }
        });
    }
}

async fn work<E: AsyncExtension>(
    mut ext: E,
    env: AsyncTenEnv,
    mut jobs: mpsc::UnboundedReceiver<Job>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Lifecycle(phase) => {
                match phase {
                    Phase::Configure => ext.on_configure(&env).await,
                    Phase::Init => ext.on_init(&env).await,
                    Phase::Start => ext.on_start(&env).await,
                    Phase::Stop => ext.on_stop(&env).await,
                    Phase::Deinit => ext.on_deinit(&env).await,
                }
                env.env().signal_done(phase);
                if phase == Phase::Deinit {
                    break;
                }
            }
            Job::Cmd(cmd) => ext.on_cmd(&env, cmd).await,
            Job::Data(data) => ext.on_data(&env, data).await,
            Job::AudioFrame(frame) => ext.on_audio_frame(&env, frame).await,
            Job::VideoFrame(frame) => ext.on_video_frame(&env, frame).await,
        }
    }
}

impl<E: AsyncExtension> Extension for AsyncAdapter<E> {
    fn on_configure(&mut self, env: &TenEnv) {
        self.push(env, Job::Lifecycle(Phase::Configure));
    }

    fn on_init(&mut self, env: &TenEnv) {
        self.push(env, Job::Lifecycle(Phase::Init));
    }

    fn on_start(&mut self, env: &TenEnv) {
        self.push(env, Job::Lifecycle(Phase::Start));
    }

    fn on_stop(&mut self, env: &TenEnv) {
        self.push(env, Job::Lifecycle(Phase::Stop));
    }

    fn on_deinit(&mut self, env: &TenEnv) {
        self.push(env, Job::Lifecycle(Phase::Deinit));
    }

    fn on_cmd(&mut self, env: &TenEnv, cmd: Cmd) {
        self.push(env, Job::Cmd(cmd));
    }

    fn on_data(&mut self, env: &TenEnv, data: Data) {
        self.push(env, Job::Data(data));
    }

    fn on_audio_frame(&mut self, env: &TenEnv, frame: AudioFrame) {
        self.push(env, Job::AudioFrame(frame));
    }

    fn on_video_frame(&mut self, env: &TenEnv, frame: VideoFrame) {
        self.push(env, Job::VideoFrame(frame));
    }
}
