//! Shared building blocks for the FITKIT notification services.

pub mod config;
pub mod db;
pub mod error;
pub mod types;
