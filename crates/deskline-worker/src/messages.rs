//! Client control message protocol
//!
//! The hosting page talks to the worker over a small JSON protocol:
//! `{"type":"SKIP_WAITING"}` forces immediate activation and
//! `{"type":"GET_VERSION"}` asks for the active namespace identifier.

use serde::{Deserialize, Serialize};

/// Messages a client page may post to the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Force immediate activation instead of waiting for clients to close
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
    /// Ask the worker for its current version identifier
    #[serde(rename = "GET_VERSION")]
    GetVersion,
}

/// Replies the worker sends back over the same channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerReply {
    /// Response to `GET_VERSION`
    #[serde(rename = "VERSION")]
    Version {
        /// The active app-shell namespace identifier
        version: String,
    },
}
