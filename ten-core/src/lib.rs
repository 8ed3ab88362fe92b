//! # ten-core: envelopes and documents for the TEN extension runtime
//!
//! The runtime composes independently written *extensions* into a
//! directed message-passing graph. This crate holds the parts every
//! layer shares and that carry no runtime behaviour:
//!
//! | Module | What it holds |
//! |--------|---------------|
//! | [`msg`] | The five envelope types and the [`Envelope`] accessors |
//! | [`value`], [`property`] | Dynamically typed values, `a.b[0]` paths, property bags and schemas |
//! | [`lifecycle`] | [`ExtensionState`] and [`Phase`] |
//! | [`graph`] | Graph documents: nodes, connections, result return policies |
//! | [`config`] | The `_ten` app configuration section |
//! | [`error`] | [`TenError`] and its [`ErrorCode`] classification |
//! | [`id`], [`loc`] | Typed identifiers and addresses |
//!
//! The engine that moves envelopes between extensions lives in
//! `ten-runtime`.

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod graph;
pub mod id;
pub mod lifecycle;
pub mod loc;
pub mod msg;
pub mod property;
pub mod value;

pub use config::{AppConfig, PredefinedGraph};
pub use error::{ErrorCode, TenError};
pub use graph::{GraphConnection, GraphDefinition, GraphNode, MsgFlow, ResultReturnPolicy};
pub use id::{AddonName, CmdId, ExtensionName};
pub use lifecycle::{ExtensionState, Phase};
pub use loc::Loc;
pub use msg::{
    AudioFrame, AudioFrameDataFmt, BufLock, Cmd, CmdResult, Data, Envelope, Msg, MsgKind,
    PixelFmt, ResultMode, StatusCode, VideoFrame,
};
pub use property::{PropertySchema, PropertyStore, PropertyType};
pub use value::Value;
