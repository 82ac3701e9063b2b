//! # citelens
//!
//! HTTP service around [`citelens_core`]: submit prompts to several
//! search-augmented LLM providers as a batch, then poll for the reconciled
//! citation records.
//!
//! The provider calls themselves go through an external gateway reached via
//! [`gateway::HttpGateway`]; completed interactions land in a
//! [`citelens_core::Repository`].

pub mod config;
pub mod error;
pub mod gateway;
pub mod server;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use gateway::HttpGateway;
pub use server::{ApiServer, router};
