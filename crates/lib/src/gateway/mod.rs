//! Gateway: the HTTP surface in front of the LINE WORKS Bot API.
//!
//! Message routes validate the payload before any token is minted. Attachment routes proxy
//! uploads and downloads. Every route except `/health` sits behind Basic auth when configured.

mod auth;
mod server;

pub use auth::BasicCredentials;
pub use server::{build_router, run_gateway, GatewayState};
