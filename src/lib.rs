//! A flash driver for Android "optimized factory archive" images delivered
//! over the fastboot wire protocol.
//!
//! The crate is organized bottom-up: [`archive`] and [`chunked_writer`] are
//! the streaming I/O primitives, [`script`] and [`plan`] turn an archive's
//! `script.txt` into an executable plan, and [`executor`] walks that plan
//! against a [`connection::FastbootSession`]. [`cli`] (behind the `cli`
//! feature) wires all of the above into the `fastboot-flash` binary.

pub mod archive;
pub mod chunked_writer;
#[cfg(feature = "cli")]
pub mod cli;
pub mod connection;
mod error;
pub mod executor;
pub mod plan;
pub mod requirements;
pub mod script;

pub use error::{Error, Result};
