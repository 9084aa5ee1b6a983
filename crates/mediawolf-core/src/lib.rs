//! # MediaWolf Core
//!
//! Configuration and the shared error type used by every MediaWolf crate.

pub mod config;
pub mod error;

pub use config::MediaWolfConfig;
pub use error::{MediaWolfError, Result};
