//! Shared building blocks for the vault client workspace
//!
//! `Secret` keeps tokens out of logs and zeroes them on drop. `Error` covers
//! configuration loading for the binaries.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
