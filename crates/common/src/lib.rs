//! Common types shared by the session crates and the session proxy

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
