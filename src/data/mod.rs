//! Core data structures: byte-stream primitives and logical entries.

mod entry;
mod stream;

pub use entry::{compare_general, Account, Entry, EntryKind, SearchKey};
pub use stream::{
    write_u256_fixed, write_u256_var, write_u64_var, ByteReader, DecodeError, DecodeResult,
    VARINT_THRESHOLD,
};
