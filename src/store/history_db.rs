//! Read-only access to a state-history file.

use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;
use primitive_types::{H160, U256};
use thiserror::Error;
use tracing::debug;

use crate::data::{Account, Entry, EntryKind, SearchKey};
use crate::format::{FileHeader, HeaderError, HEADER_SIZE};
use crate::store::metrics::{QueryMetrics, StatsSnapshot};
use crate::store::page_scan::{scan_page, ScanOutcome};

/// Errors surfaced by [`HistoryDb::open`].
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid header: {0}")]
    Format(#[from] HeaderError),
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// A read-only, memory-mapped state-history database.
///
/// The file is immutable once built. The mapping is shared and never written,
/// so queries may run concurrently; the statistics counters are the only
/// mutable state and they are atomic. Dropping the handle releases the
/// mapping.
pub struct HistoryDb {
    mmap: Mmap,
    header: FileHeader,
    metrics: QueryMetrics,
}

impl HistoryDb {
    /// Opens and validates a state-history file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE as u64 {
            return Err(HeaderError::Truncated.into());
        }
        // Safety: the mapping is read-only and the file format is immutable
        // once built; concurrent truncation of the file is unsupported.
        let mmap = unsafe { Mmap::map(&file)? };
        let header = FileHeader::read(&mmap, file_size)?;
        debug!(
            states_start = header.states_start,
            states_end = header.states_end,
            page_shift = header.page_shift,
            block_first = header.block_first,
            block_last = header.block_last,
            "opened state-history file"
        );
        Ok(Self {
            mmap,
            header,
            metrics: QueryMetrics::new(),
        })
    }

    /// Returns the parsed file header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Returns the number of content bytes (the end of the state region).
    pub fn size(&self) -> u64 {
        self.header.states_end
    }

    /// Returns the inclusive block range covered by the file.
    pub fn block_range(&self) -> (u64, u64) {
        (self.header.block_first, self.header.block_last)
    }

    /// Returns a snapshot of the query counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.metrics.snapshot()
    }

    /// Returns the account state of `address` as of `block_number`.
    ///
    /// Blocks outside the covered range resolve to `None`; the file does not
    /// extrapolate beyond what it stores.
    pub fn account_at(&self, block_number: u64, address: H160) -> Option<Account> {
        self.metrics.inc_queries();
        self.account_entry(block_number, address)
    }

    /// Returns the value of `slot` under `address` as of `block_number`.
    ///
    /// Storage is keyed by the owning account's incarnation, so the account
    /// resolves first; a missing account or an incarnation of 0 means the
    /// slot cannot have a value at that block.
    pub fn storage_at(&self, block_number: u64, address: H160, slot: U256) -> Option<U256> {
        self.metrics.inc_queries();
        let account = self.account_entry(block_number, address)?;
        if account.incarnation == 0 {
            return None;
        }
        let key = SearchKey::storage(block_number, address, account.incarnation, slot);
        match self.search(&key)?.kind {
            EntryKind::Storage { value, .. } => Some(value),
            EntryKind::Account(_) => None,
        }
    }

    fn account_entry(&self, block_number: u64, address: H160) -> Option<Account> {
        if block_number < self.header.block_first || block_number > self.header.block_last {
            return None;
        }
        match self.search(&SearchKey::account(block_number, address))?.kind {
            EntryKind::Account(account) => Some(account),
            EntryKind::Storage { .. } => None,
        }
    }

    /// Two-level search: a page-level binary probe narrows the state region
    /// to one page, then a full scan of that page yields the entry.
    fn search(&self, key: &SearchKey) -> Option<Entry> {
        let header = &self.header;
        if header.states_start == header.states_end {
            return None;
        }
        let page_mask = header.page_size() - 1;
        let mut low = header.states_start;
        let mut high = header.states_end - 1;

        loop {
            if low > high {
                return None;
            }
            // Upward-biased midpoint: with nearest-not-greater keys the
            // target page is more often the later one.
            let mid = high - ((high - low) >> 1);
            let mut page_start = mid & !page_mask;
            let mut page_end = page_start | page_mask;
            if page_start <= low {
                if page_end >= high {
                    break;
                }
                // The interval fits in two pages; probe the second one, as
                // the first remaining page gets re-scanned by the full pass
                // whenever the probe lands Greater.
                page_start += header.page_size();
                page_end = page_start | page_mask;
            }
            if page_end > high {
                page_end = high;
            }
            self.metrics.inc_pages_l1();
            match scan_page(self.region(page_start, page_end), key, false) {
                ScanOutcome::Found(entry) => return Some(entry),
                ScanOutcome::Before => high = page_start - 1,
                // Not one past the page: the target may still sit inside it
                // under nearest-not-greater block semantics.
                ScanOutcome::Nearest(_) => low = page_start,
                ScanOutcome::NotFound => return None,
            }
        }

        self.metrics.inc_pages_l2();
        match scan_page(self.region(low, high), key, true) {
            ScanOutcome::Found(entry) => Some(entry),
            // A nearest candidate only proves ordering on the block number;
            // the identity fields have to match exactly.
            ScanOutcome::Nearest(entry) if key.matches_identity(&entry) => Some(entry),
            _ => None,
        }
    }

    fn region(&self, start: u64, end_inclusive: u64) -> &[u8] {
        &self.mmap[start as usize..=end_inclusive as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{FileBuilder, FILE_VERSION};

    fn addr(byte: u8) -> H160 {
        H160::repeat_byte(byte)
    }

    fn build_db(build: impl FnOnce(&mut FileBuilder)) -> (tempfile::TempDir, HistoryDb) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let mut builder = FileBuilder::new(8, 0, 1_000_000).unwrap();
        build(&mut builder);
        builder.write_to(&path).unwrap();
        (dir, HistoryDb::open(&path).unwrap())
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            HistoryDb::open(dir.path().join("missing.db")),
            Err(DbError::Io(_))
        ));
    }

    #[test]
    fn test_open_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.db");
        std::fs::write(&path, [0u8; 10]).unwrap();
        assert!(matches!(
            HistoryDb::open(&path),
            Err(DbError::Format(HeaderError::Truncated))
        ));
    }

    #[test]
    fn test_open_bad_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.db");
        let mut bytes = FileBuilder::new(8, 0, 10).unwrap().build().unwrap();
        bytes[0] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();
        match HistoryDb::open(&path) {
            Err(DbError::Format(HeaderError::UnknownVersion(version))) => {
                assert_ne!(version, FILE_VERSION);
            }
            Err(other) => panic!("expected version error, got {other:?}"),
            Ok(_) => panic!("expected version error, got a handle"),
        }
    }

    #[test]
    fn test_empty_file_queries() {
        let (_dir, db) = build_db(|_| {});
        assert_eq!(db.account_at(5, addr(0x01)), None);
        assert_eq!(db.storage_at(5, addr(0x01), U256::zero()), None);
    }

    #[test]
    fn test_queries_across_many_pages() {
        // Pages of 256 bytes force the search through several L1 probes.
        let (_dir, db) = build_db(|builder| {
            for i in 0..500u64 {
                let mut account = Account::with_balance(U256::from(i) + U256::from(1));
                account.nonce = i;
                builder.add_account(i * 10, addr((i % 200) as u8 + 1), account);
            }
        });
        assert!(db.size() > db.header().page_size() * 4);

        for i in 0..500u64 {
            let account = db.account_at(i * 10, addr((i % 200) as u8 + 1)).unwrap();
            assert_eq!(account.nonce, i);
        }
    }

    #[test]
    fn test_stats_accumulate() {
        let (_dir, db) = build_db(|builder| {
            builder.add_account(10, addr(0x01), Account::with_balance(U256::from(5)));
            builder.add_storage(10, addr(0x01), 1, U256::from(1), U256::from(2));
        });

        assert_eq!(db.stats(), StatsSnapshot::default());

        db.account_at(10, addr(0x01)).unwrap();
        let after_account = db.stats();
        assert_eq!(after_account.queries, 1);
        assert!(after_account.pages_l2 >= 1);

        db.storage_at(10, addr(0x01), U256::from(1)).unwrap();
        let after_storage = db.stats();
        assert_eq!(after_storage.queries, 2);
        assert!(after_storage.pages_l2 > after_account.pages_l2);

        // Out-of-range queries count but touch no pages.
        db.account_at(2_000_000, addr(0x01));
        let after_miss = db.stats();
        assert_eq!(after_miss.queries, 3);
        assert_eq!(after_miss.pages_l1, after_storage.pages_l1);
        assert_eq!(after_miss.pages_l2, after_storage.pages_l2);
    }

    #[test]
    fn test_size_reports_states_end() {
        let (_dir, db) = build_db(|builder| {
            builder.add_account(1, addr(0x01), Account::default());
        });
        assert_eq!(db.size(), db.header().states_end);
        assert_eq!(db.block_range(), (0, 1_000_000));
    }
}
