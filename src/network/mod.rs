//! Network Layer
//!
//! WebSocket gateway exposing event ingestion and room sessions to browser
//! clients. Everything here is a thin shell over [`crate::bridge::Bridge`].

pub mod auth;
pub mod protocol;
pub mod server;

pub use auth::{validate_token, AuthConfig, AuthError, TokenClaims};
pub use protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
pub use server::{GatewayConfig, GatewayError, GatewayServer};
