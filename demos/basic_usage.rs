//! Basic usage: build a small history file, open it and run point queries.
//!
//! Run with: cargo run --example basic_usage

use primitive_types::{H160, H256, U256};

use statehist_db::data::Account;
use statehist_db::format::FileBuilder;
use statehist_db::store::HistoryDb;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("example.db");

    // A file covering blocks 100..=200 with one contract account.
    let contract = H160::from_low_u64_be(0xC0FFEE);
    let mut builder = FileBuilder::new(12, 100, 200)?;
    builder.add_account(
        100,
        contract,
        Account {
            nonce: 1,
            incarnation: 1,
            balance: U256::from(1_000_000u64),
            code_hash: H256::repeat_byte(0xAA),
        },
    );
    builder.add_account(
        160,
        contract,
        Account {
            nonce: 1,
            incarnation: 1,
            balance: U256::from(750_000u64),
            code_hash: H256::repeat_byte(0xAA),
        },
    );
    builder.add_storage(120, contract, 1, U256::from(0), U256::from(42));
    builder.add_storage(180, contract, 1, U256::from(0), U256::from(43));
    builder.write_to(&path)?;

    let db = HistoryDb::open(&path)?;
    let (first, last) = db.block_range();
    println!("opened {} bytes covering blocks {first}..={last}", db.size());

    for block in [100, 150, 170, 190] {
        let account = db.account_at(block, contract);
        let slot0 = db.storage_at(block, contract, U256::from(0));
        println!(
            "block {block}: balance = {:?}, slot 0 = {:?}",
            account.map(|a| a.balance),
            slot0
        );
    }

    println!("stats: {}", db.stats());
    Ok(())
}
