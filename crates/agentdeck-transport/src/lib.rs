//! Transport layer for the agentdeck client.
//!
//! Provides:
//! - HTTP request gateway (ask, config save/fetch)
//! - Inbound frame decoding
//! - WebSocket interactive channel (feature: websocket)

pub mod gateway;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use gateway::HttpGateway;

#[cfg(feature = "websocket")]
pub use websocket::{WsChannel, WsConnector};
