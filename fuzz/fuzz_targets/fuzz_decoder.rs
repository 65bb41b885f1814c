#![no_main]

use libfuzzer_sys::fuzz_target;
use statehist_db::format::{DecodeStep, EntryDecoder};

fuzz_target!(|data: &[u8]| {
    // Largest supported page size.
    if data.len() > 1 << 24 {
        return;
    }

    // Arbitrary page bytes must decode to entries, end-of-page or an error,
    // never panic.
    let mut decoder = EntryDecoder::new(data);
    loop {
        match decoder.next_entry() {
            Ok(DecodeStep::Entry(_)) => {}
            Ok(DecodeStep::PageEnd) | Err(_) => break,
        }
    }
});
