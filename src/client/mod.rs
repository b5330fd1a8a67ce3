//! SockJS client.
//!
//! This module provides the application-facing entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Connects with fallback and forwards reads/writes |
//! | [`ClientBuilder`] | Fluent configuration builder |
//!
//! # Example
//!
//! ```no_run
//! use sockjs_client::{Client, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = Client::builder()
//!     .address("http://127.0.0.1:8081/echo")
//!     .build()?;
//!
//! client.connect().await?;
//! client.write_msg("hello").await?;
//! let reply = client.read_msg().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::Client;
