//! Text collation used by comparisons, grouping and `LIKE`.

use std::cmp::Ordering;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization as _;

/// How much of a text difference is significant when ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CollationStrength {
    /// Base letters only: case and accents are ignored (`"resume" == "RÉSUMÉ"`).
    Primary,
    /// Case-insensitive; accents are significant.
    Secondary,
    /// Case-insensitive order with an exact tie-break, so only identical strings are equal.
    #[default]
    Tertiary,
}

/// Collation settings applied to text operands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Locale {
    pub strength: CollationStrength,
}

impl Locale {
    pub fn new(strength: CollationStrength) -> Self {
        Self { strength }
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self.strength {
            CollationStrength::Primary => {
                if a.is_ascii() && b.is_ascii() {
                    return cmp_ascii_case_insensitive(a, b);
                }
                fold_primary(a).cmp(fold_primary(b))
            }
            CollationStrength::Secondary => cmp_text_case_insensitive(a, b),
            CollationStrength::Tertiary => cmp_text_case_insensitive(a, b).then_with(|| a.cmp(b)),
        }
    }

    /// Case-folded form of `text` under this locale, for matching that walks characters.
    pub fn fold(&self, text: &str) -> String {
        match self.strength {
            CollationStrength::Primary => fold_primary(text).collect(),
            CollationStrength::Secondary | CollationStrength::Tertiary => {
                if text.is_ascii() {
                    text.to_ascii_uppercase()
                } else {
                    text.chars().flat_map(char::to_uppercase).collect()
                }
            }
        }
    }
}

fn fold_primary(text: &str) -> impl Iterator<Item = char> + '_ {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_uppercase)
}

fn cmp_text_case_insensitive(a: &str, b: &str) -> Ordering {
    if a.is_ascii() && b.is_ascii() {
        return cmp_ascii_case_insensitive(a, b);
    }

    // Unicode uppercasing can expand a character (ß -> SS).
    let a_iter = a.chars().flat_map(char::to_uppercase);
    let b_iter = b.chars().flat_map(char::to_uppercase);
    a_iter.cmp(b_iter)
}

fn cmp_ascii_case_insensitive(a: &str, b: &str) -> Ordering {
    let a_iter = a.bytes().map(|c| c.to_ascii_uppercase());
    let b_iter = b.bytes().map(|c| c.to_ascii_uppercase());
    a_iter.cmp(b_iter)
}
