//! File header layout and open-time validation.

use thiserror::Error;

/// The only supported format revision.
pub const FILE_VERSION: u64 = 202202111;

/// Size of the packed header in bytes.
pub const HEADER_SIZE: usize = 64;

/// Header validation failures; all of them are fatal at open time.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    #[error("file too small for a header")]
    Truncated,
    #[error("unknown file version {0}")]
    UnknownVersion(u64),
    #[error("page shift {0} outside 8..=24")]
    InvalidPageShift(u64),
    #[error("state region [{start}, {end}) does not fit a file of {file_size} bytes")]
    InvalidStateRegion {
        start: u64,
        end: u64,
        file_size: u64,
    },
}

/// The fixed header at the start of every state-history file.
///
/// Layout: eight little-endian 64-bit fields, in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHeader {
    /// Format magic; must equal [`FILE_VERSION`].
    pub file_version: u64,
    /// Byte offset of the first state page (page-aligned).
    pub states_start: u64,
    /// Byte offset one past the last state page.
    pub states_end: u64,
    /// Page size exponent, 8..=24.
    pub page_shift: u64,
    /// First block number covered by the file (inclusive).
    pub block_first: u64,
    /// Last block number covered by the file (inclusive).
    pub block_last: u64,
    /// Informational: number of account records.
    pub count_accounts: u64,
    /// Informational: number of storage records.
    pub count_storages: u64,
}

fn read_u64_le(data: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(buf)
}

impl FileHeader {
    /// Page size in bytes.
    pub fn page_size(&self) -> u64 {
        1u64 << self.page_shift
    }

    /// Parses a header and validates it against the total file size.
    pub fn read(data: &[u8], file_size: u64) -> Result<Self, HeaderError> {
        if data.len() < HEADER_SIZE {
            return Err(HeaderError::Truncated);
        }
        let header = Self {
            file_version: read_u64_le(data, 0),
            states_start: read_u64_le(data, 8),
            states_end: read_u64_le(data, 16),
            page_shift: read_u64_le(data, 24),
            block_first: read_u64_le(data, 32),
            block_last: read_u64_le(data, 40),
            count_accounts: read_u64_le(data, 48),
            count_storages: read_u64_le(data, 56),
        };
        header.validate(file_size)?;
        Ok(header)
    }

    fn validate(&self, file_size: u64) -> Result<(), HeaderError> {
        if self.file_version != FILE_VERSION {
            return Err(HeaderError::UnknownVersion(self.file_version));
        }
        if !(8..=24).contains(&self.page_shift) {
            return Err(HeaderError::InvalidPageShift(self.page_shift));
        }
        let page_size = self.page_size();
        let region_ok = self.states_start <= self.states_end
            && self.states_end <= file_size
            && self.states_start % page_size == 0
            && (self.states_end - self.states_start) % page_size == 0;
        if !region_ok {
            return Err(HeaderError::InvalidStateRegion {
                start: self.states_start,
                end: self.states_end,
                file_size,
            });
        }
        Ok(())
    }

    /// Serializes the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let fields = [
            self.file_version,
            self.states_start,
            self.states_end,
            self.page_shift,
            self.block_first,
            self.block_last,
            self.count_accounts,
            self.count_storages,
        ];
        let mut bytes = [0u8; HEADER_SIZE];
        for (i, field) in fields.iter().enumerate() {
            bytes[i * 8..i * 8 + 8].copy_from_slice(&field.to_le_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileHeader {
        FileHeader {
            file_version: FILE_VERSION,
            states_start: 512,
            states_end: 2048,
            page_shift: 9,
            block_first: 100,
            block_last: 200,
            count_accounts: 10,
            count_storages: 20,
        }
    }

    #[test]
    fn test_roundtrip() {
        let header = sample();
        let bytes = header.to_bytes();
        assert_eq!(FileHeader::read(&bytes, 2048).unwrap(), header);
    }

    #[test]
    fn test_truncated() {
        let bytes = sample().to_bytes();
        assert_eq!(
            FileHeader::read(&bytes[..HEADER_SIZE - 1], 2048),
            Err(HeaderError::Truncated)
        );
    }

    #[test]
    fn test_unknown_version() {
        let mut header = sample();
        header.file_version = 1;
        assert_eq!(
            FileHeader::read(&header.to_bytes(), 2048),
            Err(HeaderError::UnknownVersion(1))
        );
    }

    #[test]
    fn test_page_shift_bounds() {
        for shift in [0, 7, 25, 64] {
            let mut header = sample();
            header.page_shift = shift;
            assert_eq!(
                FileHeader::read(&header.to_bytes(), 1 << 30),
                Err(HeaderError::InvalidPageShift(shift))
            );
        }
        let mut header = sample();
        header.page_shift = 8;
        header.states_start = 256;
        header.states_end = 1024;
        assert!(FileHeader::read(&header.to_bytes(), 1024).is_ok());
    }

    #[test]
    fn test_region_bounds() {
        // End past the file.
        assert!(FileHeader::read(&sample().to_bytes(), 1024).is_err());

        // Inverted region.
        let mut header = sample();
        header.states_end = 0;
        assert!(FileHeader::read(&header.to_bytes(), 2048).is_err());

        // Start not page-aligned.
        let mut header = sample();
        header.states_start = 256;
        assert!(FileHeader::read(&header.to_bytes(), 2048).is_err());

        // Region not a whole number of pages.
        let mut header = sample();
        header.states_end = 1792 + 17;
        assert!(FileHeader::read(&header.to_bytes(), 2048).is_err());
    }

    #[test]
    fn test_empty_region_is_valid() {
        let mut header = sample();
        header.states_start = 512;
        header.states_end = 512;
        assert!(FileHeader::read(&header.to_bytes(), 512).is_ok());
    }
}
