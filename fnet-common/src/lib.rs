//! # FNET Common Library
//!
//! Shared code for the fibre-network editing tools including:
//! - Database initialization, schema and row models
//! - Settings table access
//! - Configuration loading and root folder resolution
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
