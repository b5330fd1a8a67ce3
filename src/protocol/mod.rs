//! SockJS protocol message types.
//!
//! This module defines the wire format shared by every transport and the
//! server capability document fetched before connecting.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | `o` | Remote → Local | Session opened |
//! | `h` | Remote → Local | Liveness heartbeat |
//! | `a[...]` | Remote → Local | Batch of messages |
//! | `c[code,reason]` | Remote → Local | Session closed |
//! | `[...]` | Local → Remote | Batch of messages |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Frame parsing and batch serialization |
//! | `info` | `/info` capability document |

// ============================================================================
// Submodules
// ============================================================================

/// Frame parsing and batch serialization.
pub mod frame;

/// Server capability discovery.
pub mod info;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{Frame, FrameType, decode_messages, parse, serialize};
pub use info::{ServerInfo, fetch_server_info, http_base, info_url};
