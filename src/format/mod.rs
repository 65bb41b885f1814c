//! On-disk format: header, opcodes, encoder and decoder.

mod builder;
mod decoder;
mod header;

pub use builder::{BuildError, FileBuilder};
pub use decoder::{DecodeStep, EntryDecoder};
pub use header::{FileHeader, HeaderError, FILE_VERSION, HEADER_SIZE};
