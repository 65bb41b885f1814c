//! Entry decoding for one page of the state region.
//!
//! Each page is a self-contained opcode stream. A lead byte selects the
//! opcode class, with flag bits packed into the short emission forms:
//!
//! | Lead byte | Meaning |
//! |-----------|---------|
//! | 0         | End of page (padding follows) |
//! | 1..=8     | Set block number from that many big-endian bytes |
//! | 9         | Set address from 20 bytes, reset incarnation |
//! | 10..=73   | Emit account entry, 6 flag bits |
//! | 74..=249  | Emit storage entry, slot class / delta bit / value class |
//! | 250       | Additive incarnation override for the next storage entry |
//! | 251..=255 | Invalid |

use primitive_types::{H160, H256, U256};

use crate::data::{Account, ByteReader, DecodeError, DecodeResult, Entry, EntryKind};

pub(crate) const OP_PAGE_END: u8 = 0;
pub(crate) const OP_BLOCK_MAX: u8 = 8;
pub(crate) const OP_ADDRESS: u8 = 9;
pub(crate) const OP_ACCOUNT_BASE: u8 = 10;
pub(crate) const OP_ACCOUNT_MAX: u8 = 73;
pub(crate) const OP_STORAGE_BASE: u8 = 74;
pub(crate) const OP_STORAGE_MAX: u8 = 249;
pub(crate) const OP_INCARNATION: u8 = 250;

// Account emission flags.
pub(crate) const ACCOUNT_HAS_BALANCE: u8 = 0x01;
pub(crate) const ACCOUNT_HAS_CODE_HASH: u8 = 0x02;
pub(crate) const ACCOUNT_NONCE_SHIFT: u8 = 2;
pub(crate) const ACCOUNT_INCARNATION_SHIFT: u8 = 4;
/// Two-bit account fields: 0..=2 are the literal value, 3 means a varint follows.
pub(crate) const FIELD_ESCAPE: u8 = 3;

// Storage emission flags: bits 7..4 slot class, bit 3 delta, bits 2..0 value class.
pub(crate) const STORAGE_SLOT_SHIFT: u8 = 4;
/// Slot classes 0..=8 are the literal slot; 9 is a varint; 10..=15 a fixed 32-byte slot.
pub(crate) const STORAGE_SLOT_VAR: u8 = 9;
pub(crate) const STORAGE_SLOT_FIXED: u8 = 10;
pub(crate) const STORAGE_SLOT_DELTA: u8 = 0x08;
pub(crate) const STORAGE_VALUE_MASK: u8 = 0x07;
/// Value classes 0..=5 are the literal value; 6 is a varint; 7 a bit-inverted varint.
pub(crate) const STORAGE_VALUE_VAR: u8 = 6;
pub(crate) const STORAGE_VALUE_VAR_INV: u8 = 7;

/// One step of the page decode loop.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeStep {
    /// A logical entry was emitted.
    Entry(Entry),
    /// The page terminator was reached.
    PageEnd,
}

/// Context registers carried while decoding one page.
///
/// Reset at page start, so every page decodes independently.
#[derive(Debug, Default)]
struct Context {
    block_number: u64,
    address: H160,
    incarnation: u64,
    prev_slot: U256,
    incarnation_override: Option<u64>,
}

/// Streaming decoder over one page's bytes.
pub struct EntryDecoder<'a> {
    reader: ByteReader<'a>,
    ctx: Context,
}

impl<'a> EntryDecoder<'a> {
    pub fn new(page: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(page),
            ctx: Context::default(),
        }
    }

    /// Decodes until the next logical entry or the page terminator.
    pub fn next_entry(&mut self) -> DecodeResult<DecodeStep> {
        loop {
            let op = self.reader.get_byte()?;
            match op {
                OP_PAGE_END => return Ok(DecodeStep::PageEnd),
                1..=OP_BLOCK_MAX => {
                    let mut block = 0u64;
                    for _ in 0..op {
                        block = (block << 8) | self.reader.get_byte()? as u64;
                    }
                    self.ctx.block_number = block;
                }
                OP_ADDRESS => {
                    self.ctx.address = H160::from_slice(self.reader.get_bytes(20)?);
                    self.ctx.incarnation = 0;
                }
                OP_ACCOUNT_BASE..=OP_ACCOUNT_MAX => {
                    return Ok(DecodeStep::Entry(self.decode_account(op - OP_ACCOUNT_BASE)?));
                }
                OP_STORAGE_BASE..=OP_STORAGE_MAX => {
                    return Ok(DecodeStep::Entry(self.decode_storage(op - OP_STORAGE_BASE)?));
                }
                OP_INCARNATION => {
                    self.ctx.incarnation_override = Some(self.reader.read_u64_var()?);
                }
                _ => return Err(DecodeError::UnknownOpcode(op)),
            }
        }
    }

    fn decode_account(&mut self, flags: u8) -> DecodeResult<Entry> {
        let balance = if flags & ACCOUNT_HAS_BALANCE != 0 {
            self.reader.read_u256_var()?
        } else {
            U256::zero()
        };
        let code_hash = if flags & ACCOUNT_HAS_CODE_HASH != 0 {
            H256::from_slice(self.reader.get_bytes(32)?)
        } else {
            H256::zero()
        };
        let nonce = match (flags >> ACCOUNT_NONCE_SHIFT) & 0x03 {
            FIELD_ESCAPE => self.reader.read_u64_var()?,
            literal => literal as u64,
        };
        let incarnation = match (flags >> ACCOUNT_INCARNATION_SHIFT) & 0x03 {
            FIELD_ESCAPE => self.reader.read_u64_var()?,
            literal => literal as u64,
        };
        self.ctx.incarnation = incarnation;
        Ok(Entry {
            block_number: self.ctx.block_number,
            address: self.ctx.address,
            kind: EntryKind::Account(Account {
                nonce,
                incarnation,
                balance,
                code_hash,
            }),
        })
    }

    fn decode_storage(&mut self, flags: u8) -> DecodeResult<Entry> {
        let slot_class = flags >> STORAGE_SLOT_SHIFT;
        let mut slot = match slot_class {
            STORAGE_SLOT_VAR => self.reader.read_u256_var()?,
            class if class < STORAGE_SLOT_VAR => U256::from(class),
            _ => self.reader.read_u256_fixed()?,
        };
        if flags & STORAGE_SLOT_DELTA != 0 {
            // The delta form encodes the distance past the previous slot.
            slot = slot
                .overflowing_add(self.ctx.prev_slot)
                .0
                .overflowing_add(U256::one())
                .0;
        }
        let value = match flags & STORAGE_VALUE_MASK {
            STORAGE_VALUE_VAR => self.reader.read_u256_var()?,
            STORAGE_VALUE_VAR_INV => !self.reader.read_u256_var()?,
            literal => U256::from(literal),
        };
        let mut incarnation = if self.ctx.incarnation == 0 {
            1
        } else {
            self.ctx.incarnation
        };
        if let Some(add) = self.ctx.incarnation_override.take() {
            incarnation = incarnation.wrapping_add(add);
        }
        self.ctx.prev_slot = slot;
        Ok(Entry {
            block_number: self.ctx.block_number,
            address: self.ctx.address,
            kind: EntryKind::Storage {
                incarnation,
                slot,
                value,
            },
        })
    }
}
