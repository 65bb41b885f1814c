//! Single-page scan with the composite comparator.

use std::cmp::Ordering;

use tracing::debug;

use crate::data::{compare_general, Entry, SearchKey};
use crate::format::{DecodeStep, EntryDecoder};

/// Outcome of scanning one page against a key.
#[derive(Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// An entry compared equal to the key.
    Found(Entry),
    /// The rightmost entry the key is still greater than.
    Nearest(Entry),
    /// The key sorts before every entry seen.
    Before,
    /// Empty page, exhausted page, or undecodable page.
    NotFound,
}

/// Scans a page for `key`.
///
/// With `all` false only the first entry is compared, which is how the
/// page-level binary search probes a page. With `all` true the scan keeps
/// going while the key is greater than the entries, holding on to the last
/// such entry as the nearest-not-greater candidate.
///
/// Decode failures (unknown opcode, truncated entry) end the scan as if the
/// page had no further entries; the failure stays contained to this page.
pub fn scan_page(page: &[u8], key: &SearchKey, all: bool) -> ScanOutcome {
    let mut decoder = EntryDecoder::new(page);
    let mut saved: Option<Entry> = None;
    loop {
        let entry = match decoder.next_entry() {
            Ok(DecodeStep::Entry(entry)) => entry,
            Ok(DecodeStep::PageEnd) => break,
            Err(err) => {
                debug!(%err, "page scan aborted");
                break;
            }
        };
        match compare_general(key, &entry) {
            Ordering::Equal => return ScanOutcome::Found(entry),
            Ordering::Less => {
                return match saved {
                    Some(saved) => ScanOutcome::Nearest(saved),
                    None => ScanOutcome::Before,
                };
            }
            Ordering::Greater => {
                if !all {
                    return ScanOutcome::Nearest(entry);
                }
                saved = Some(entry);
            }
        }
    }
    match saved {
        Some(saved) => ScanOutcome::Nearest(saved),
        None => ScanOutcome::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::{H160, U256};

    use crate::data::Account;
    use crate::format::FileBuilder;

    fn addr(byte: u8) -> H160 {
        H160::repeat_byte(byte)
    }

    /// Builds a single page holding accounts for `addr(0x01)` at the given
    /// blocks.
    fn account_page(blocks: &[u64]) -> Vec<u8> {
        let mut builder = FileBuilder::new(9, 0, 1_000_000).unwrap();
        for &block in blocks {
            builder.add_account(block, addr(0x01), Account::with_balance(U256::from(block)));
        }
        let bytes = builder.build().unwrap();
        bytes[512..1024].to_vec()
    }

    #[test]
    fn test_empty_page_not_found() {
        let key = SearchKey::account(100, addr(0x01));
        assert_eq!(scan_page(&[0], &key, false), ScanOutcome::NotFound);
        assert_eq!(scan_page(&[0], &key, true), ScanOutcome::NotFound);
    }

    #[test]
    fn test_first_entry_only_without_all() {
        let page = account_page(&[100, 200, 300]);

        // Key beyond every entry still compares only against the first.
        let key = SearchKey::account(500, addr(0x01));
        match scan_page(&page, &key, false) {
            ScanOutcome::Nearest(entry) => assert_eq!(entry.block_number, 100),
            other => panic!("expected nearest, got {other:?}"),
        }

        let key = SearchKey::account(50, addr(0x01));
        assert_eq!(scan_page(&page, &key, false), ScanOutcome::Before);

        let key = SearchKey::account(100, addr(0x01));
        assert!(matches!(scan_page(&page, &key, false), ScanOutcome::Found(_)));
    }

    #[test]
    fn test_full_scan_nearest_not_greater() {
        let page = account_page(&[100, 200, 300]);

        let key = SearchKey::account(250, addr(0x01));
        match scan_page(&page, &key, true) {
            ScanOutcome::Nearest(entry) => assert_eq!(entry.block_number, 200),
            other => panic!("expected nearest, got {other:?}"),
        }

        // Greater than everything: the last entry is the saved candidate.
        let key = SearchKey::account(999, addr(0x01));
        match scan_page(&page, &key, true) {
            ScanOutcome::Nearest(entry) => assert_eq!(entry.block_number, 300),
            other => panic!("expected nearest, got {other:?}"),
        }

        let key = SearchKey::account(50, addr(0x01));
        assert_eq!(scan_page(&page, &key, true), ScanOutcome::Before);

        let key = SearchKey::account(200, addr(0x01));
        match scan_page(&page, &key, true) {
            ScanOutcome::Found(entry) => assert_eq!(entry.block_number, 200),
            other => panic!("expected found, got {other:?}"),
        }
    }

    #[test]
    fn test_nearest_candidate_can_cross_identities() {
        // The key's address sorts after every stored entry, so the scan ends
        // with the last entry as the candidate; it is the caller's job to
        // re-check identity before trusting it.
        let page = account_page(&[100, 200]);
        let key = SearchKey::account(100, addr(0x02));
        match scan_page(&page, &key, true) {
            ScanOutcome::Nearest(entry) => {
                assert_eq!(entry.address, addr(0x01));
                assert!(!key.matches_identity(&entry));
            }
            other => panic!("expected nearest, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_page_not_found() {
        let key = SearchKey::account(100, addr(0x01));
        assert_eq!(scan_page(&[0xFE, 0xFF], &key, true), ScanOutcome::NotFound);
    }
}
