//! Logical entries and the composite search ordering.

use std::cmp::Ordering;

use primitive_types::{H160, H256, U256};

/// An account as stored in the history file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    /// Account nonce.
    pub nonce: u64,
    /// Lifetime counter; bumped when the account is destroyed and re-created.
    /// An incarnation of 0 means the account has no storage to speak of.
    pub incarnation: u64,
    /// Account balance.
    pub balance: U256,
    /// keccak256 of the contract code; all-zero means "no code recorded".
    pub code_hash: H256,
}

impl Account {
    /// Creates an account with the given balance and incarnation 1.
    pub fn with_balance(balance: U256) -> Self {
        Self {
            incarnation: 1,
            balance,
            ..Default::default()
        }
    }

    /// Returns true if a code hash is recorded.
    pub fn has_code(&self) -> bool {
        self.code_hash != H256::zero()
    }
}

/// Payload of a decoded entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Account(Account),
    Storage {
        incarnation: u64,
        slot: U256,
        value: U256,
    },
}

/// One logical record from the state region.
///
/// A record at block N stands for the state from N until the next record for
/// the same identity (the address for accounts; address, incarnation and slot
/// for storage).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub block_number: u64,
    pub address: H160,
    pub kind: EntryKind,
}

impl Entry {
    /// Returns true for storage entries.
    pub fn is_storage(&self) -> bool {
        matches!(self.kind, EntryKind::Storage { .. })
    }
}

/// A point-in-time lookup key.
///
/// Fields are optional; present fields take part in [`compare_general`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchKey {
    pub block_number: Option<u64>,
    pub address: Option<H160>,
    pub incarnation: Option<u64>,
    pub slot: Option<U256>,
}

impl SearchKey {
    /// Key for an account lookup.
    pub fn account(block_number: u64, address: H160) -> Self {
        Self {
            block_number: Some(block_number),
            address: Some(address),
            ..Default::default()
        }
    }

    /// Key for a storage-slot lookup under a known incarnation.
    pub fn storage(block_number: u64, address: H160, incarnation: u64, slot: U256) -> Self {
        Self {
            block_number: Some(block_number),
            address: Some(address),
            incarnation: Some(incarnation),
            slot: Some(slot),
        }
    }

    /// Whether `entry` carries exactly the identity this key names.
    ///
    /// [`compare_general`] treats the block number as nearest-not-greater, so
    /// a Greater comparison alone does not prove the identity fields matched;
    /// callers holding a nearest candidate re-check it here.
    pub fn matches_identity(&self, entry: &Entry) -> bool {
        if self.address != Some(entry.address) {
            return false;
        }
        match &entry.kind {
            EntryKind::Account(_) => self.incarnation.is_none() && self.slot.is_none(),
            EntryKind::Storage {
                incarnation, slot, ..
            } => self.incarnation == Some(*incarnation) && self.slot.as_ref() == Some(slot),
        }
    }
}

/// Composite ordering of a search key against a decoded entry.
///
/// The identity components compare first, each deciding the result when it
/// differs: presence of an address (absent sorts first), the address bytes,
/// presence of an incarnation against the entry being storage, the
/// incarnation, presence of a slot against the entry being storage, the slot.
/// The block number is the tail component, which is what gives queries their
/// nearest-not-greater behavior over blocks.
pub fn compare_general(key: &SearchKey, entry: &Entry) -> Ordering {
    // Entries always carry an address; a key without one sorts first.
    let Some(address) = key.address else {
        return Ordering::Less;
    };
    match address.as_bytes().cmp(entry.address.as_bytes()) {
        Ordering::Equal => {}
        ord => return ord,
    }

    let (entry_incarnation, entry_slot) = match &entry.kind {
        EntryKind::Account(_) => (None, None),
        EntryKind::Storage {
            incarnation, slot, ..
        } => (Some(*incarnation), Some(*slot)),
    };

    match (key.incarnation, entry_incarnation) {
        (None, None) => {}
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(key_inc), Some(entry_inc)) => match key_inc.cmp(&entry_inc) {
            Ordering::Equal => {}
            ord => return ord,
        },
    }

    match (key.slot, entry_slot) {
        (None, None) => {}
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(key_slot), Some(entry_slot)) => match key_slot.cmp(&entry_slot) {
            Ordering::Equal => {}
            ord => return ord,
        },
    }

    match key.block_number {
        None => Ordering::Less,
        Some(block) => block.cmp(&entry.block_number),
    }
}
