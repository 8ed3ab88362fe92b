//! `async` facade over [`TenEnv`].

use crate::callback::{ErrorHandler, ResultHandler};
use crate::env::TenEnv;
use ten_core::{AudioFrame, Cmd, CmdResult, Data, TenError, Value, VideoFrame};
use tokio::sync::{mpsc, oneshot};

/// [`TenEnv`] with awaitable sends.
///
/// Handed to [`AsyncExtension`](crate::AsyncExtension) hooks. Clones
/// share the same extension.
#[derive(Clone, Debug)]
pub struct AsyncTenEnv {
    env: TenEnv,
}

impl AsyncTenEnv {
    /// Wrap a callback-style env.
    pub fn new(env: TenEnv) -> Self {
        Self { env }
    }

    /// The callback-style env underneath.
    pub fn env(&self) -> &TenEnv {
        &self.env
    }

    fn destroyed(&self) -> TenError {
        TenError::ContextDestroyed {
            extension: self.env.extension_name().to_string(),
        }
    }

    /// Send a command and await its completed result.
    pub async fn send_cmd(&self, cmd: Cmd) -> Result<CmdResult, TenError> {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        self.env.send_cmd(
            cmd,
            Some(ResultHandler::new(move |_, outcome| {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(outcome);
                }
            })),
        );
        rx.await.unwrap_or_else(|_| Err(self.destroyed()))
    }

    /// Send a command and stream every result.
    pub fn send_cmd_ex(&self, cmd: Cmd) -> CmdResultStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.env.send_cmd_ex(
            cmd,
            Some(ResultHandler::new(move |_, outcome| {
                let _ = tx.send(outcome);
            })),
        );
        CmdResultStream { rx, done: false }
    }

    async fn acked(&self, send: impl FnOnce(ErrorHandler)) -> Result<(), TenError> {
        let (tx, rx) = oneshot::channel();
        send(ErrorHandler::new(move |_, outcome| {
            let _ = tx.send(outcome);
        }));
        rx.await.unwrap_or_else(|_| Err(self.destroyed()))
    }

    /// Send a data message and await acceptance.
    pub async fn send_data(&self, data: Data) -> Result<(), TenError> {
        self.acked(|h| self.env.send_data(data, Some(h))).await
    }

    /// Send an audio frame and await acceptance.
    pub async fn send_audio_frame(&self, frame: AudioFrame) -> Result<(), TenError> {
        self.acked(|h| self.env.send_audio_frame(frame, Some(h))).await
    }

    /// Send a video frame and await acceptance.
    pub async fn send_video_frame(&self, frame: VideoFrame) -> Result<(), TenError> {
        self.acked(|h| self.env.send_video_frame(frame, Some(h))).await
    }

    /// Return a result for `target` and await acceptance.
    pub async fn return_result(&self, result: CmdResult, target: &Cmd) -> Result<(), TenError> {
        self.acked(|h| self.env.return_result(result, target, Some(h)))
            .await
    }

    /// Read a property.
    pub async fn get_property(&self, path: &str) -> Result<Value, TenError> {
        self.env.get_property(path)
    }

    /// Read a `bool` property.
    pub async fn get_property_bool(&self, path: &str) -> Result<bool, TenError> {
        self.env.get_property_bool(path)
    }

    /// Read an integer property.
    pub async fn get_property_int(&self, path: &str) -> Result<i64, TenError> {
        self.env.get_property_int(path)
    }

    /// Read a float property.
    pub async fn get_property_float(&self, path: &str) -> Result<f64, TenError> {
        self.env.get_property_float(path)
    }

    /// Read a string property.
    pub async fn get_property_string(&self, path: &str) -> Result<String, TenError> {
        self.env.get_property_string(path)
    }

    /// Read a property as JSON text.
    pub async fn get_property_to_json(&self, path: &str) -> Result<String, TenError> {
        self.env.get_property_to_json(path)
    }

    /// Store a property.
    pub async fn set_property(&self, path: &str, value: impl Into<Value>) -> Result<(), TenError> {
        self.env.set_property(path, value)
    }

    /// Store a property parsed from JSON text.
    pub async fn set_property_from_json(&self, path: &str, json: &str) -> Result<(), TenError> {
        self.env.set_property_from_json(path, json)
    }

    /// Whether a property exists.
    pub async fn is_property_exist(&self, path: &str) -> bool {
        self.env.is_property_exist(path)
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

    /// Ask the hosting app to close.
    pub fn close_app(&self) {
        self.env.close_app();
    }
}

/// Results of a command sent with [`AsyncTenEnv::send_cmd_ex`].
///
/// Yields each result in arrival order. The stream ends after the
/// result marked completed, or after the first error.
#[derive(Debug)]
pub struct CmdResultStream {
    rx: mpsc::UnboundedReceiver<Result<CmdResult, TenError>>,
    done: bool,
}

impl CmdResultStream {
    /// Next result, or `None` once the command is settled.
    pub async fn next(&mut self) -> Option<Result<CmdResult, TenError>> {
        if self.done {
            return None;
        }
        let item = self.rx.recv().await;
        self.done = match &item {
            Some(Ok(result)) => result.is_completed(),
            Some(Err(_)) | None => true,
        };
        item
    }
}
