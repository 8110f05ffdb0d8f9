#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use paradox_format::{OpenOptions, ParadoxTable};

/// Keep the harness itself bounded: headers are at most 64 KiB and blocks at most 32 KiB, so a
/// few megabytes cover every interesting chain shape.
const MAX_INPUT_BYTES: usize = 4 << 20;
const MAX_ROWS: usize = 100_000;

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(MAX_INPUT_BYTES)];

    // The first byte picks how much of the input becomes the large-object image.
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let cut = rest.len() * usize::from(split) / 255;
    let (table, blob) = rest.split_at(rest.len() - cut);
    let blob: Option<Arc<[u8]>> = (!blob.is_empty()).then(|| blob.into());

    // Malformed input must surface as errors, never panics or unbounded loops.
    let Ok(table) = ParadoxTable::from_bytes("FUZZ", table, blob, &OpenOptions::default()) else {
        return;
    };
    let Ok(rows) = table.rows() else {
        return;
    };
    for row in rows.take(MAX_ROWS) {
        if row.is_err() {
            break;
        }
    }
});
