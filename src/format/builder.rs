//! Building state-history files.
//!
//! The builder is the write-side counterpart of the decoder: it takes a batch
//! of account and storage records, sorts them into the file ordering and
//! packs them into pages. Entries never cross a page boundary and every page
//! starts from empty context registers, so each page decodes on its own.

use std::path::Path;

use primitive_types::{H160, U256};
use thiserror::Error;

use super::decoder::{
    ACCOUNT_HAS_BALANCE, ACCOUNT_HAS_CODE_HASH, ACCOUNT_INCARNATION_SHIFT, ACCOUNT_NONCE_SHIFT,
    FIELD_ESCAPE, OP_ACCOUNT_BASE, OP_ADDRESS, OP_INCARNATION, OP_PAGE_END, OP_STORAGE_BASE,
    STORAGE_SLOT_DELTA, STORAGE_SLOT_FIXED, STORAGE_SLOT_SHIFT, STORAGE_SLOT_VAR,
    STORAGE_VALUE_VAR, STORAGE_VALUE_VAR_INV,
};
use super::header::{FileHeader, FILE_VERSION, HEADER_SIZE};
use crate::data::{
    write_u256_fixed, write_u256_var, write_u64_var, Account, Entry, EntryKind, VARINT_THRESHOLD,
};

/// Builder misuse errors.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("page shift {0} outside 8..=24")]
    InvalidPageShift(u64),
    #[error("block range first={first} last={last} is inverted")]
    InvalidBlockRange { first: u64, last: u64 },
    #[error("entry does not fit in an empty page")]
    EntryTooLarge,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Assembles a state-history file from unsorted records.
pub struct FileBuilder {
    page_shift: u64,
    block_first: u64,
    block_last: u64,
    entries: Vec<Entry>,
}

/// Encoder-side mirror of the decoder's context registers.
#[derive(Clone, Default)]
struct EncodeContext {
    block_number: u64,
    address: Option<H160>,
    incarnation: u64,
    prev_slot: U256,
}

impl FileBuilder {
    /// Creates a builder for a file covering blocks `block_first..=block_last`
    /// with pages of `1 << page_shift` bytes.
    pub fn new(page_shift: u64, block_first: u64, block_last: u64) -> Result<Self, BuildError> {
        if !(8..=24).contains(&page_shift) {
            return Err(BuildError::InvalidPageShift(page_shift));
        }
        if block_first > block_last {
            return Err(BuildError::InvalidBlockRange {
                first: block_first,
                last: block_last,
            });
        }
        Ok(Self {
            page_shift,
            block_first,
            block_last,
            entries: Vec::new(),
        })
    }

    /// Records the state of `address` as of `block_number`.
    pub fn add_account(&mut self, block_number: u64, address: H160, account: Account) {
        self.entries.push(Entry {
            block_number,
            address,
            kind: EntryKind::Account(account),
        });
    }

    /// Records a storage write under (`address`, `incarnation`) as of
    /// `block_number`.
    pub fn add_storage(
        &mut self,
        block_number: u64,
        address: H160,
        incarnation: u64,
        slot: U256,
        value: U256,
    ) {
        self.entries.push(Entry {
            block_number,
            address,
            kind: EntryKind::Storage {
                incarnation,
                slot,
                value,
            },
        });
    }

    /// Encodes the complete file image.
    pub fn build(mut self) -> Result<Vec<u8>, BuildError> {
        let page_size = 1usize << self.page_shift;
        self.entries
            .sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

        let mut count_accounts = 0u64;
        let mut count_storages = 0u64;
        let mut state: Vec<u8> = Vec::new();
        let mut page: Vec<u8> = Vec::with_capacity(page_size);
        let mut ctx = EncodeContext::default();
        let mut scratch: Vec<u8> = Vec::new();

        for entry in &self.entries {
            match &entry.kind {
                EntryKind::Account(_) => count_accounts += 1,
                EntryKind::Storage { .. } => count_storages += 1,
            }

            scratch.clear();
            let mut attempt = ctx.clone();
            encode_entry(&mut attempt, entry, &mut scratch);

            // The terminator byte must still fit after the entry.
            if page.len() + scratch.len() + 1 > page_size {
                page.push(OP_PAGE_END);
                page.resize(page_size, 0);
                state.append(&mut page);

                scratch.clear();
                attempt = EncodeContext::default();
                encode_entry(&mut attempt, entry, &mut scratch);
                if scratch.len() + 1 > page_size {
                    return Err(BuildError::EntryTooLarge);
                }
            }
            ctx = attempt;
            page.extend_from_slice(&scratch);
        }
        if !page.is_empty() {
            page.push(OP_PAGE_END);
            page.resize(page_size, 0);
            state.append(&mut page);
        }

        let states_start = (HEADER_SIZE as u64).next_multiple_of(page_size as u64);
        let header = FileHeader {
            file_version: FILE_VERSION,
            states_start,
            states_end: states_start + state.len() as u64,
            page_shift: self.page_shift,
            block_first: self.block_first,
            block_last: self.block_last,
            count_accounts,
            count_storages,
        };

        let mut out = vec![0u8; states_start as usize];
        out[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        out.extend_from_slice(&state);
        Ok(out)
    }

    /// Builds and writes the file to `path`.
    pub fn write_to<P: AsRef<Path>>(self, path: P) -> Result<(), BuildError> {
        let bytes = self.build()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// File ordering: address, accounts before storage, incarnation, slot, block.
fn sort_key(entry: &Entry) -> (H160, bool, u64, U256, u64) {
    match &entry.kind {
        EntryKind::Account(_) => (entry.address, false, 0, U256::zero(), entry.block_number),
        EntryKind::Storage {
            incarnation, slot, ..
        } => (entry.address, true, *incarnation, *slot, entry.block_number),
    }
}

fn encode_entry(ctx: &mut EncodeContext, entry: &Entry, out: &mut Vec<u8>) {
    if entry.block_number != ctx.block_number {
        let bytes = entry.block_number.to_be_bytes();
        let skip = (entry.block_number.leading_zeros() / 8) as usize;
        let len = (bytes.len() - skip).max(1);
        out.push(len as u8);
        out.extend_from_slice(&bytes[bytes.len() - len..]);
        ctx.block_number = entry.block_number;
    }
    if ctx.address != Some(entry.address) {
        out.push(OP_ADDRESS);
        out.extend_from_slice(entry.address.as_bytes());
        ctx.address = Some(entry.address);
        ctx.incarnation = 0;
    }
    match &entry.kind {
        EntryKind::Account(account) => encode_account(ctx, account, out),
        EntryKind::Storage {
            incarnation,
            slot,
            value,
        } => encode_storage(ctx, *incarnation, *slot, *value, out),
    }
}

fn encode_account(ctx: &mut EncodeContext, account: &Account, out: &mut Vec<u8>) {
    let mut flags = 0u8;
    if !account.balance.is_zero() {
        flags |= ACCOUNT_HAS_BALANCE;
    }
    if account.has_code() {
        flags |= ACCOUNT_HAS_CODE_HASH;
    }
    let nonce_class = field_class(account.nonce);
    let incarnation_class = field_class(account.incarnation);
    flags |= nonce_class << ACCOUNT_NONCE_SHIFT;
    flags |= incarnation_class << ACCOUNT_INCARNATION_SHIFT;

    out.push(OP_ACCOUNT_BASE + flags);
    if flags & ACCOUNT_HAS_BALANCE != 0 {
        write_u256_var(out, account.balance);
    }
    if flags & ACCOUNT_HAS_CODE_HASH != 0 {
        out.extend_from_slice(account.code_hash.as_bytes());
    }
    if nonce_class == FIELD_ESCAPE {
        write_u64_var(out, account.nonce);
    }
    if incarnation_class == FIELD_ESCAPE {
        write_u64_var(out, account.incarnation);
    }
    ctx.incarnation = account.incarnation;
}

/// Two-bit field: values below the escape are stored in the opcode itself.
fn field_class(value: u64) -> u8 {
    if value < FIELD_ESCAPE as u64 {
        value as u8
    } else {
        FIELD_ESCAPE
    }
}

fn encode_storage(ctx: &mut EncodeContext, incarnation: u64, slot: U256, value: U256, out: &mut Vec<u8>) {
    let base = if ctx.incarnation == 0 {
        1
    } else {
        ctx.incarnation
    };
    if incarnation != base {
        out.push(OP_INCARNATION);
        write_u64_var(out, incarnation.wrapping_sub(base));
    }

    let delta = if slot > ctx.prev_slot {
        Some(slot - ctx.prev_slot - 1)
    } else {
        None
    };

    let max_literal = U256::from(STORAGE_SLOT_VAR - 1);
    let (slot_class, delta_bit, slot_payload) = if slot <= max_literal {
        (slot.low_u64() as u8, 0, None)
    } else if let Some(delta) = delta.filter(|delta| *delta <= max_literal) {
        (delta.low_u64() as u8, STORAGE_SLOT_DELTA, None)
    } else {
        let plain_len = var_len(slot);
        let delta_len = delta.map(var_len).unwrap_or(usize::MAX);
        if plain_len.min(delta_len) > 32 {
            (STORAGE_SLOT_FIXED, 0, Some(SlotPayload::Fixed(slot)))
        } else if delta_len < plain_len {
            let delta = delta.unwrap_or_default();
            (STORAGE_SLOT_VAR, STORAGE_SLOT_DELTA, Some(SlotPayload::Var(delta)))
        } else {
            (STORAGE_SLOT_VAR, 0, Some(SlotPayload::Var(slot)))
        }
    };

    let (value_class, value_payload) = if value <= U256::from(STORAGE_VALUE_VAR - 1) {
        (value.low_u64() as u8, None)
    } else if var_len(!value) < var_len(value) {
        (STORAGE_VALUE_VAR_INV, Some(!value))
    } else {
        (STORAGE_VALUE_VAR, Some(value))
    };

    let flags = (slot_class << STORAGE_SLOT_SHIFT) | delta_bit | value_class;
    out.push(OP_STORAGE_BASE + flags);
    match slot_payload {
        Some(SlotPayload::Var(payload)) => write_u256_var(out, payload),
        Some(SlotPayload::Fixed(payload)) => write_u256_fixed(out, payload),
        None => {}
    }
    if let Some(payload) = value_payload {
        write_u256_var(out, payload);
    }

    // The decoder's incarnation register is only written by account emission
    // and address resets; the override is consumed per entry.
    ctx.prev_slot = slot;
}

enum SlotPayload {
    Var(U256),
    Fixed(U256),
}

/// Encoded length of the variable form of `value`.
fn var_len(value: U256) -> usize {
    if value < U256::from(VARINT_THRESHOLD) {
        1
    } else {
        1 + 32 - (value.leading_zeros() / 8) as usize
    }
}
