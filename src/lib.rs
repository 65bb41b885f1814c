//! # statehist_db
//!
//! A compact, read-only database for historical Ethereum state.
//!
//! A single memory-mapped file holds a fully ordered, delta-compressed
//! encoding of account and storage-slot values per block, answering
//! point-in-time queries of the form "what was account A (or storage slot S
//! of A) at block N?" with a bounded number of page reads.
//!
//! ## Architecture
//!
//! 1. **HistoryDb** - Opens a built file and resolves queries with a paged,
//!    two-level binary search (page-level probe, then in-page scan).
//! 2. **FileBuilder** - Encodes a batch of records into the file format.
//!
//! ## Modules
//!
//! - `data` - Byte-stream primitives, logical entries and the search ordering
//! - `format` - File header, page opcodes, encoder and decoder
//! - `store` - Memory-mapped access, page scanning and the public queries

pub mod data;
pub mod format;
pub mod store;
