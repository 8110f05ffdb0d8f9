#![no_main]

use libfuzzer_sys::fuzz_target;
use paradox_query::{CollationStrength, LikePattern, Locale, DEFAULT_LIKE_ESCAPE};

const MAX_INPUT_BYTES: usize = 4_096;

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(MAX_INPUT_BYTES)];
    let input = String::from_utf8_lossy(data);

    // Pattern and subject are separated by the first NUL; without one the input matches itself.
    let (pattern, text) = input.split_once('\0').unwrap_or((&*input, &*input));

    let compiled = LikePattern::compile(pattern, Some(DEFAULT_LIKE_ESCAPE));
    for strength in [
        CollationStrength::Primary,
        CollationStrength::Secondary,
        CollationStrength::Tertiary,
    ] {
        let locale = Locale::new(strength);
        std::hint::black_box(compiled.matches(text, false, &locale));
        std::hint::black_box(compiled.matches(text, true, &locale));
    }
});
