//! State shared by every [`TenEnv`](crate::TenEnv) of one app.

use crate::fault::FaultPolicy;
use crate::router::Router;
use std::sync::Arc;
use ten_core::{ExtensionName, TenError};
use tokio::sync::watch;

pub(crate) struct AppContext {
    pub(crate) uri: String,
    pub(crate) router: Router,
    fault: Arc<dyn FaultPolicy>,
    close_requested: watch::Sender<bool>,
}

impl AppContext {
    pub(crate) fn new(uri: String, router: Router, fault: Arc<dyn FaultPolicy>) -> Self {
        let (close_requested, _) = watch::channel(false);
        Self {
            uri,
            router,
            fault,
            close_requested,
        }
    }

    /// Log an unrecoverable error and hand it to the fault policy.
    pub(crate) fn escalate(&self, extension: &ExtensionName, error: TenError) {
        tracing::error!(
            app = %self.uri,
            extension = %extension,
            code = %error.code(),
            error = %error,
            "ten.fault.escalated"
        );
        self.fault.escalate(extension, &error);
    }

    pub(crate) fn request_close(&self) {
        if !self.close_requested.send_replace(true) {
            tracing::info!(app = %self.uri, "ten.app.close_requested");
        }
    }

    pub(crate) fn close_signal(&self) -> watch::Receiver<bool> {
        self.close_requested.subscribe()
    }
}

/// Resolve once `signal` turns true.
pub(crate) async fn closed(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|requested| *requested).await;
}
