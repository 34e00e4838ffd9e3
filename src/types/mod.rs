//! Core data shapes for Conduit.

pub mod message;
pub mod source;

pub use message::*;
pub use source::*;
