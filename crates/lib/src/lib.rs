//! Worksgate core library: configuration, payload validation, the LINE WORKS client,
//! and the HTTP gateway used by the CLI.

pub mod config;
pub mod error;
pub mod gateway;
pub mod validate;
pub mod works;
