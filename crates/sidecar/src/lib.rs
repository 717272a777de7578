//! Sidecar runner: executes store helper tools with a hard deadline.
//!
//! One [`SidecarCommand`] per helper call. The runner never shares state
//! between invocations, so it can be cloned freely into adapter tasks.

pub mod error;
pub mod runner;

pub use error::SidecarError;
pub use runner::{SidecarCommand, SidecarOutput, SidecarRunner};
