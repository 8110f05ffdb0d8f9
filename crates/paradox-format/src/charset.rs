use std::collections::BTreeSet;
use std::sync::{Mutex, OnceLock};

use encoding_rs::{
    Encoding, BIG5, EUC_KR, GBK, IBM866, ISO_8859_2, ISO_8859_5, ISO_8859_7, KOI8_R, MACINTOSH,
    SHIFT_JIS, UTF_8, WINDOWS_1250, WINDOWS_1251, WINDOWS_1252, WINDOWS_1253, WINDOWS_1254,
    WINDOWS_1255, WINDOWS_1256, WINDOWS_1257, WINDOWS_1258, WINDOWS_874,
};

use crate::options::{Advisory, OpenOptions};

pub(crate) fn encoding_for_code_page(code_page: u16) -> Option<&'static Encoding> {
    Some(match code_page as u32 {
        866 => IBM866,
        874 => WINDOWS_874,
        932 => SHIFT_JIS,
        936 => GBK,
        949 => EUC_KR,
        950 => BIG5,
        1250 => WINDOWS_1250,
        1251 => WINDOWS_1251,
        1252 => WINDOWS_1252,
        1253 => WINDOWS_1253,
        1254 => WINDOWS_1254,
        1255 => WINDOWS_1255,
        1256 => WINDOWS_1256,
        1257 => WINDOWS_1257,
        1258 => WINDOWS_1258,
        10000 => MACINTOSH,
        20866 => KOI8_R,
        28592 => ISO_8859_2,
        28595 => ISO_8859_5,
        28597 => ISO_8859_7,
        65001 => UTF_8,
        _ => return None,
    })
}

/// Pick the text decoding for a table.
///
/// Order: explicit override, the header's code page, the configured default. Falling back from
/// an unsupported header code page is recorded as an advisory, never an error.
pub(crate) fn resolve_encoding(
    table: &str,
    code_page: Option<u16>,
    options: &OpenOptions,
    advisories: &mut Vec<Advisory>,
) -> &'static Encoding {
    if let Some(encoding) = options.encoding {
        return encoding;
    }

    if let Some(code_page) = code_page.filter(|cp| *cp != 0) {
        if let Some(encoding) = encoding_for_code_page(code_page) {
            return encoding;
        }
        warn_unsupported_code_page(code_page);
        let fallback = encoding_for_code_page(options.default_code_page).unwrap_or(WINDOWS_1252);
        advisories.push(Advisory::new(format!(
            "table {table}: code page {code_page} is not supported; decoding text as {}",
            fallback.name()
        )));
        return fallback;
    }

    encoding_for_code_page(options.default_code_page).unwrap_or(WINDOWS_1252)
}

/// Decode a NUL-terminated fixed-width text run.
pub(crate) fn decode_text(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    let (cow, _had_errors) = encoding.decode_without_bom_handling(&bytes[..end]);
    cow.into_owned()
}

fn warn_unsupported_code_page(code_page: u16) {
    static WARNED: OnceLock<Mutex<BTreeSet<u16>>> = OnceLock::new();

    let warned = WARNED.get_or_init(|| Mutex::new(BTreeSet::new()));
    let mut warned = match warned.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    if warned.insert(code_page) {
        log::warn!("unsupported table code page {code_page}; falling back to the default decoding");
    }
}
