//! # Access Tokens
//!
//! Storage for the short-lived vault access token produced by authentication
//! and consumed by secret retrieval.

mod file;
mod memory;

pub use file::FileAccessToken;
pub use memory::MemoryAccessToken;

use std::fmt::Debug;

use crate::errors::Result;
use crate::secrets::SecretBytes;

/// Holder of the current access token.
///
/// Writes replace the previous value completely; readers never observe a
/// partially written token.
pub trait AccessToken: Send + Sync + Debug {
    /// Return the current token.
    fn read(&self) -> Result<SecretBytes>;

    /// Replace the stored token.
    fn write(&self, data: &[u8]) -> Result<()>;

    /// Remove the stored token.
    fn delete(&self) -> Result<()>;
}
