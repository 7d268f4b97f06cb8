//! RPC wire messages and codecs.
//!
//! This module is the seam to the RPC encoding layer. The pooled client
//! only needs to turn a method name, a sequence id and arguments into
//! bytes, and to read replies back.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Binary/JSON encodings over framed/buffered transports |
//! | `message` | Message envelope and reply interpretation |

// ============================================================================
// Submodules
// ============================================================================

/// Message encoding and framing.
pub mod codec;

/// RPC message envelope.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{Codec, MAX_FRAME_SIZE, ProtocolKind, TransportKind};
pub use message::{Message, MessageType};
