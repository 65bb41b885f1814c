#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use primitive_types::{H160, U256};
use statehist_db::data::SearchKey;
use statehist_db::store::scan_page;

#[derive(Arbitrary, Debug)]
struct ScanInput {
    page: Vec<u8>,
    all: bool,
    block_number: Option<u64>,
    address: Option<[u8; 20]>,
    incarnation: Option<u64>,
    slot: Option<[u8; 32]>,
}

fuzz_target!(|input: ScanInput| {
    if input.page.len() > 1 << 24 {
        return;
    }

    let key = SearchKey {
        block_number: input.block_number,
        address: input.address.map(H160::from),
        incarnation: input.incarnation,
        slot: input.slot.map(|bytes| U256::from_big_endian(&bytes)),
    };

    // Any page bytes against any key: the scan must terminate cleanly.
    let _ = scan_page(&input.page, &key, input.all);
});
