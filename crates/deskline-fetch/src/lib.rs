//! Network fetch capability for the Deskline offline worker
//!
//! This crate provides the HTTP side of the offline caching layer:
//! - Request and response snapshot types that can be stored and replayed
//! - The [`NetworkFetch`] trait, the seam between caching strategies and
//!   the actual network
//! - [`HttpFetcher`], a reqwest-backed implementation with a bounded
//!   timeout and optional retry with exponential backoff

pub mod client;
pub mod error;
pub mod types;

pub use client::{HttpFetcher, NetworkFetch};
pub use error::{Error, Result};
pub use types::{FetchRequest, FetchResponse, Method};
