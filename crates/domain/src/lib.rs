//! `tw-domain`: configuration and shared error types for toolwire.
//!
//! Kept free of async and process dependencies so that anything which only
//! needs to read or validate a `toolwire.toml` can depend on it cheaply.

pub mod config;
pub mod error;
