//! Transport adapters for the chat contract.
//!
//! [`chat::ChatService`] is the one place that validates a chat request, runs
//! the agent loop, and maps its outcome to a status and JSON body. The axum
//! server ([`server`]) and the serverless handler ([`function`]) only
//! translate their transport to and from that contract.

pub mod chat;
pub mod function;
pub mod health;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod server;
pub mod state;

pub use chat::{ChatReply, ChatService};
pub use server::{build_router, start_gateway};
pub use state::GatewayState;
