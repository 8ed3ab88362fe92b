//! RecordingFaultPolicy: records faults instead of aborting.

use crate::fault::FaultPolicy;
use crate::lock;
use std::sync::Mutex;
use ten_core::{ErrorCode, ExtensionName, TenError};

/// A fault seen by [`RecordingFaultPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRecord {
    /// The extension that raised it.
    pub extension: ExtensionName,
    /// Error class.
    pub code: ErrorCode,
    /// Rendered error.
    pub message: String,
}

/// A fault policy that keeps every fault for inspection.
/// Use `.faults()` to read them.
#[derive(Debug, Default)]
pub struct RecordingFaultPolicy {
    faults: Mutex<Vec<FaultRecord>>,
}

impl RecordingFaultPolicy {
    /// An empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded faults.
    pub fn faults(&self) -> Vec<FaultRecord> {
        lock(&self.faults).clone()
    }

    /// Recorded faults of class `code`.
    pub fn faults_with(&self, code: ErrorCode) -> Vec<FaultRecord> {
        lock(&self.faults)
            .iter()
            .filter(|f| f.code == code)
            .cloned()
            .collect()
    }
}

impl FaultPolicy for RecordingFaultPolicy {
    fn escalate(&self, extension: &ExtensionName, error: &TenError) {
        lock(&self.faults).push(FaultRecord {
            extension: extension.clone(),
            code: error.code(),
            message: error.to_string(),
        });
    }
}
