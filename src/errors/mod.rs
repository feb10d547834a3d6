//! # Error Handling
//!
//! Error types for the secrets provider. Every fallible operation returns
//! [`Result`], and every [`Error`] classifies into one of the [`ErrorKind`]s
//! callers use to decide between retrying, reconfiguring or giving up.

pub mod tls;
mod types;

pub use tls::TlsError;
pub use types::{Error, ErrorKind, GroupErrors, Result, Stage};
