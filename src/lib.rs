//! A universal bridge between a managed host heap and native extension
//! code, built around three pieces: a handle table with NaN-boxed scalar
//! wires, a trampoline that calls attached native entry points by
//! physical shape, and a type builder that turns declarative specs into
//! managed classes. A debug mode wraps every wire in a heap capsule to
//! catch use-after-close at the boundary.

#[macro_use]
pub mod bridge;
pub mod value;

pub use bridge::trampoline::BackendKind;
pub use bridge::{Bridge, BridgeContext, BridgeError, BridgeMode, ErrorKind, InvokeResult};
