//! Starchat Common - Shared types for the DIDComm question handlers
//!
//! Message model, credential payloads, the host-agent contract, the error
//! taxonomy and configuration.

pub mod agent;
pub mod config;
pub mod credential;
pub mod error;
pub mod message;

pub use agent::*;
pub use config::*;
pub use credential::*;
pub use error::*;
pub use message::*;
