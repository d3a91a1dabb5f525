//! ragfuse-core - Core types and traits for hybrid retrieval
//!
//! This crate provides the domain types, collaborator traits, configuration
//! and error taxonomy shared by every ragfuse crate.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{ErrorKind, RagError, Result};
pub use traits::*;
pub use types::*;
