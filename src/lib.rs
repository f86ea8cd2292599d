//! # simstor
//!
//! A minimal persistent key-value store with:
//! - One flat file per table, divided into fixed-width slots
//! - An in-memory pointer index for O(1) lookups by record ID
//! - In-place updates and compaction by rewrite-and-rename
//! - A registry that routes operations by table name
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      StoreRegistry                           │
//! │                 (table name → RecordStore)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      RecordStore                             │
//! │        (Mutex: pointer index + file handle + cursor)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Codec    │          │ SlotLayout  │
//!   │ (id, value) │          │ (line fmt)  │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │ <table>     │
//!                           │  .simstor   │
//!                           └─────────────┘
//! ```
//!
//! Not a transactional engine: there is no write-ahead log and no
//! multi-record atomicity. What is on disk at open is what you get.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod slot;
pub mod store;
pub mod registry;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{SimstorError, Result};
pub use config::{ScanMode, StoreConfig, SyncStrategy};
pub use codec::{Codec, CodecError, F64VectorCodec, FnCodec, StringCodec};
pub use store::{Record, RecordStore};
pub use registry::{StoreFactory, StoreRegistry};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of simstor
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
