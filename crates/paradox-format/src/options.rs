use encoding_rs::Encoding;
use rust_decimal::RoundingStrategy;

/// Code page assumed when a table does not record one (legacy versions) and no override is set.
pub const DEFAULT_CODE_PAGE: u16 = 1252;

/// Ambient settings consumed while opening and decoding a table.
///
/// Nothing here is read from global state; every table handle carries its own copy.
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    /// Forces the text decoding for alpha and memo fields, ignoring the table's code page.
    pub encoding: Option<&'static Encoding>,
    /// Code page used when the header does not carry one.
    pub default_code_page: u16,
    /// Rounding applied when a BCD value carries more significant digits than `Decimal` holds.
    pub decimal_rounding: RoundingStrategy,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            encoding: None,
            default_code_page: DEFAULT_CODE_PAGE,
            decimal_rounding: RoundingStrategy::MidpointNearestEven,
        }
    }
}

impl OpenOptions {
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn with_decimal_rounding(mut self, rounding: RoundingStrategy) -> Self {
        self.decimal_rounding = rounding;
        self
    }
}

/// Non-fatal observation recorded while opening a table (for example a code-page fallback).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    pub message: String,
}

impl Advisory {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
