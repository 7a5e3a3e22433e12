//! Legacy FET command core (spec.md §4.2, §4.6, L2a/L3).

pub mod commands;
pub mod core;
pub mod errors;
pub mod proto;

pub use core::FetDevice;
pub use proto::{FetProto, FetReply, ProtoFlags};
