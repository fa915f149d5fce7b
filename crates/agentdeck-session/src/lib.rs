//! Session protocol engine.
//!
//! Drives one conversation from a plain ask call to either a direct answer
//! or an upgraded interactive channel, behind a single `send` entry point.

pub mod engine;
pub mod state;

pub use engine::{EngineOptions, SessionEngine};
pub use state::{Phase, SendOutcome, SessionError};
