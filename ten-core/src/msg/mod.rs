//! Typed envelopes: [`Cmd`], [`CmdResult`], [`Data`], [`AudioFrame`], [`VideoFrame`].
//!
//! Every envelope carries a [`MsgHeader`]: its name, the address of the
//! extension that sent it, its explicit destinations and a property bag.
//! The name is fixed at construction. The source is stamped by the
//! runtime at send time; the sender gives up ownership when it sends, so
//! only a local clone can be mutated and re-sent.

mod buf;
mod cmd;
mod frame;
mod result;

pub use buf::{Buf, BufLock};
pub use cmd::{Cmd, ResultMode};
pub use frame::{AudioFrame, AudioFrameDataFmt, Data, PixelFmt, VideoFrame};
pub use result::{CmdResult, StatusCode};

use crate::error::TenError;
use crate::loc::Loc;
use crate::property::PropertyStore;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgKind {
    /// [`Cmd`]
    Cmd,
    /// [`CmdResult`]
    CmdResult,
    /// [`Data`]
    Data,
    /// [`AudioFrame`]
    AudioFrame,
    /// [`VideoFrame`]
    VideoFrame,
}

impl fmt::Display for MsgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MsgKind::Cmd => "cmd",
            MsgKind::CmdResult => "cmd_result",
            MsgKind::Data => "data",
            MsgKind::AudioFrame => "audio_frame",
            MsgKind::VideoFrame => "video_frame",
        };
        f.write_str(s)
    }
}

/// Fields shared by all envelopes.
#[derive(Debug, Clone, Default)]
pub struct MsgHeader {
    name: String,
    src: Option<Loc>,
    dests: Vec<Loc>,
    properties: PropertyStore,
}

impl MsgHeader {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Accessors shared by all envelope types.
pub trait Envelope {
    /// Kind of this envelope.
    fn kind(&self) -> MsgKind;

    /// The shared header.
    fn header(&self) -> &MsgHeader;

    /// The shared header, mutably.
    fn header_mut(&mut self) -> &mut MsgHeader;

    /// Whether the binary buffer is currently locked.
    fn is_buf_locked(&self) -> bool {
        false
    }

    /// Envelope name.
    fn name(&self) -> &str {
        &self.header().name
    }

    /// Address of the sending extension, once sent.
    fn source(&self) -> Option<&Loc> {
        self.header().src.as_ref()
    }

    /// Record the sender. Done by the runtime when the envelope is sent.
    fn set_source(&mut self, src: Loc) {
        self.header_mut().src = Some(src);
    }

    /// Explicit destinations. Empty means "use the graph".
    fn dests(&self) -> &[Loc] {
        &self.header().dests
    }

    /// Replace the explicit destinations.
    fn set_dests(&mut self, dests: Vec<Loc>) {
        self.header_mut().dests = dests;
    }

    /// Add one explicit destination.
    fn add_dest(&mut self, dest: Loc) {
        self.header_mut().dests.push(dest);
    }

    /// The property bag.
    fn properties(&self) -> &PropertyStore {
        &self.header().properties
    }

    /// The property bag, mutably.
    fn properties_mut(&mut self) -> &mut PropertyStore {
        &mut self.header_mut().properties
    }

    /// Store a property.
    fn set_property(&mut self, path: &str, value: impl Into<Value>) -> Result<(), TenError>
    where
        Self: Sized,
    {
        self.properties_mut().set(path, value)
    }

    /// Read a property.
    fn get_property(&self, path: &str) -> Result<Value, TenError> {
        self.properties().get(path)
    }

    /// Read a `bool` property.
    fn get_property_bool(&self, path: &str) -> Result<bool, TenError> {
        self.properties().get_bool(path)
    }

    /// Read an integer property.
    fn get_property_int(&self, path: &str) -> Result<i64, TenError> {
        self.properties().get_int(path)
    }

    /// Read a float property.
    fn get_property_float(&self, path: &str) -> Result<f64, TenError> {
        self.properties().get_float(path)
    }

    /// Read a string property.
    fn get_property_string(&self, path: &str) -> Result<String, TenError> {
        self.properties().get_string(path)
    }

    /// Read a property as JSON text.
    fn get_property_to_json(&self, path: &str) -> Result<String, TenError> {
        self.properties().get_json(path)
    }

    /// Store a property parsed from JSON text.
    fn set_property_from_json(&mut self, path: &str, json: &str) -> Result<(), TenError> {
        self.properties_mut().set_json(path, json)
    }

    /// Whether a property exists.
    fn is_property_exist(&self, path: &str) -> bool {
        self.properties().contains(path)
    }
}

macro_rules! impl_envelope {
    ($ty:ty, $kind:expr) => {
        impl $crate::msg::Envelope for $ty {
            fn kind(&self) -> $crate::msg::MsgKind {
                $kind
            }

            fn header(&self) -> &$crate::msg::MsgHeader {
                &self.header
            }

            fn header_mut(&mut self) -> &mut $crate::msg::MsgHeader {
                &mut self.header
            }
        }
    };
}

macro_rules! impl_buf_envelope {
    ($ty:ty, $kind:expr) => {
        impl $crate::msg::Envelope for $ty {
            fn kind(&self) -> $crate::msg::MsgKind {
                $kind
            }

            fn header(&self) -> &$crate::msg::MsgHeader {
                &self.header
            }

            fn header_mut(&mut self) -> &mut $crate::msg::MsgHeader {
                &mut self.header
            }

            fn is_buf_locked(&self) -> bool {
                self.buf.is_locked()
            }
        }

        impl $ty {
            /// Replace the buffer with `size` zeroed bytes.
            pub fn alloc_buf(&mut self, size: usize) -> Result<(), $crate::error::TenError> {
                self.buf.replace(vec![0; size])
            }

            /// Replace the buffer contents.
            pub fn set_buf(&mut self, bytes: Vec<u8>) -> Result<(), $crate::error::TenError> {
                self.buf.replace(bytes)
            }

            /// Read the buffer. Fails while it is locked.
            pub fn buf(&self) -> Result<&[u8], $crate::error::TenError> {
                self.buf.bytes()
            }

            /// Take exclusive access to the buffer. See [`BufLock`](crate::msg::BufLock).
            pub fn lock_buf(&mut self) -> Result<$crate::msg::BufLock, $crate::error::TenError> {
                self.buf.lock()
            }

            /// Return the buffer taken by [`lock_buf`](Self::lock_buf).
            pub fn unlock_buf(
                &mut self,
                lock: $crate::msg::BufLock,
            ) -> Result<(), $crate::error::TenError> {
                self.buf.unlock(lock)
            }
        }
    };
}

pub(crate) use impl_buf_envelope;
pub(crate) use impl_envelope;

/// Any envelope.
#[derive(Debug, Clone)]
pub enum Msg {
    /// A command.
    Cmd(Cmd),
    /// A command result.
    CmdResult(CmdResult),
    /// A data message.
    Data(Data),
    /// An audio frame.
    AudioFrame(AudioFrame),
    /// A video frame.
    VideoFrame(VideoFrame),
}

impl Msg {
    fn as_envelope(&self) -> &dyn Envelope {
        match self {
            Msg::Cmd(m) => m,
            Msg::CmdResult(m) => m,
            Msg::Data(m) => m,
            Msg::AudioFrame(m) => m,
            Msg::VideoFrame(m) => m,
        }
    }

    fn as_envelope_mut(&mut self) -> &mut dyn Envelope {
        match self {
            Msg::Cmd(m) => m,
            Msg::CmdResult(m) => m,
            Msg::Data(m) => m,
            Msg::AudioFrame(m) => m,
            Msg::VideoFrame(m) => m,
        }
    }

    /// Kind of the wrapped envelope.
    pub fn kind(&self) -> MsgKind {
        self.as_envelope().kind()
    }

    /// Name of the wrapped envelope.
    pub fn name(&self) -> &str {
        &self.header().name
    }

    /// Header of the wrapped envelope.
    pub fn header(&self) -> &MsgHeader {
        self.as_envelope().header()
    }

    /// Whether the wrapped envelope holds a locked buffer.
    pub fn is_buf_locked(&self) -> bool {
        self.as_envelope().is_buf_locked()
    }

    /// Sender of the wrapped envelope.
    pub fn source(&self) -> Option<&Loc> {
        self.as_envelope().source()
    }

    /// Record the sender of the wrapped envelope.
    pub fn set_source(&mut self, src: Loc) {
        self.as_envelope_mut().set_source(src);
    }

    /// Explicit destinations of the wrapped envelope.
    pub fn dests(&self) -> &[Loc] {
        self.as_envelope().dests()
    }

    /// Replace the explicit destinations of the wrapped envelope.
    pub fn set_dests(&mut self, dests: Vec<Loc>) {
        self.as_envelope_mut().set_dests(dests);
    }
}

macro_rules! impl_from_for_msg {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Msg {
                fn from(m: $variant) -> Self {
                    Msg::$variant(m)
                }
            }
        )*
    };
}

impl_from_for_msg!(Cmd, CmdResult, Data, AudioFrame, VideoFrame);
