//! `LIKE` patterns: `%` matches any run of characters (including none), `?` exactly one, and the
//! escape character makes the following character literal.

use crate::collation::{CollationStrength, Locale};

pub const DEFAULT_LIKE_ESCAPE: char = '\\';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LikeToken<T> {
    Literal(T),
    AnyOne,
    AnyRun,
}

/// A compiled pattern, pre-folded for every way it can be matched.
///
/// Folding is applied one character at a time, so a character that expands when uppercased
/// (`ß` to `SS`) still counts as a single character for `?`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LikePattern {
    source: String,
    exact: Vec<LikeToken<char>>,
    /// Literals uppercased, for case-insensitive matching.
    upper: Vec<LikeToken<String>>,
    /// Literals reduced to base letters, for [`CollationStrength::Primary`].
    base: Vec<LikeToken<String>>,
}

impl LikePattern {
    pub fn compile(pattern: &str, escape: Option<char>) -> Self {
        let exact = tokenize(pattern, escape);
        let fold_with = |locale: Locale| -> Vec<LikeToken<String>> {
            exact
                .iter()
                .filter_map(|token| match *token {
                    LikeToken::Literal(c) => fold_char(&locale, c).map(LikeToken::Literal),
                    LikeToken::AnyOne => Some(LikeToken::AnyOne),
                    LikeToken::AnyRun => Some(LikeToken::AnyRun),
                })
                .collect()
        };
        let upper = fold_with(Locale::new(CollationStrength::Secondary));
        let base = fold_with(Locale::new(CollationStrength::Primary));
        Self {
            source: pattern.to_string(),
            exact,
            upper,
            base,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, text: &str, case_sensitive: bool, locale: &Locale) -> bool {
        if case_sensitive {
            let text: Vec<char> = text.chars().collect();
            return match_tokens(&self.exact, &text);
        }
        let tokens = match locale.strength {
            CollationStrength::Primary => &self.base,
            CollationStrength::Secondary | CollationStrength::Tertiary => &self.upper,
        };
        let text: Vec<String> = text.chars().filter_map(|c| fold_char(locale, c)).collect();
        match_tokens(tokens, &text)
    }
}

/// Folded form of one character, or `None` when folding erases it (a lone combining accent).
fn fold_char(locale: &Locale, c: char) -> Option<String> {
    let mut buf = [0u8; 4];
    let folded = locale.fold(c.encode_utf8(&mut buf));
    (!folded.is_empty()).then_some(folded)
}

fn tokenize(pattern: &str, escape: Option<char>) -> Vec<LikeToken<char>> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        let token = if Some(c) == escape {
            // A trailing escape stands for itself.
            LikeToken::Literal(chars.next().unwrap_or(c))
        } else {
            match c {
                '%' => {
                    if tokens.last() == Some(&LikeToken::AnyRun) {
                        continue;
                    }
                    LikeToken::AnyRun
                }
                '?' => LikeToken::AnyOne,
                c => LikeToken::Literal(c),
            }
        };
        tokens.push(token);
    }
    tokens
}

fn match_tokens<T: PartialEq>(tokens: &[LikeToken<T>], text: &[T]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    // Position of the last `%` and the text index it is currently absorbing up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match tokens.get(p) {
            Some(LikeToken::AnyRun) => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some(LikeToken::AnyOne) => {
                p += 1;
                t += 1;
                continue;
            }
            Some(LikeToken::Literal(c)) if *c == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((star, absorbed)) => {
                p = star + 1;
                t = absorbed + 1;
                backtrack = Some((star, absorbed + 1));
            }
            None => return false,
        }
    }
    tokens[p..]
        .iter()
        .all(|token| matches!(token, LikeToken::AnyRun))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn like(text: &str, pattern: &str) -> bool {
        LikePattern::compile(pattern, Some(DEFAULT_LIKE_ESCAPE)).matches(
            text,
            false,
            &Locale::default(),
        )
    }

    #[test]
    fn percent_matches_any_run() {
        assert!(like("Apple", "A%"));
        assert!(like("A", "A%"));
        assert!(!like("Banana", "A%"));
        assert!(like("Banana", "%an%"));
        assert!(like("", "%"));
        assert!(like("abcabd", "%ab?"));
    }

    #[test]
    fn question_mark_matches_exactly_one() {
        assert!(like("AXB", "A?B"));
        assert!(!like("AB", "A?B"));
        assert!(!like("AXXB", "A?B"));
    }

    #[test]
    fn question_mark_counts_expanding_characters_once() {
        assert!(like("aßc", "a?c"));
        assert!(!like("aßc", "a??c"));
        assert!(like("\u{FB01}", "?"));
        assert!(like("STRAßE", "stra?e"));
        assert!(like("straße", "STRAßE"));

        let primary = LikePattern::compile("a?c", None);
        let locale = Locale::new(CollationStrength::Primary);
        assert!(primary.matches("aßc", false, &locale));
        assert!(primary.matches("a\u{e9}c", false, &locale));
        // A decomposed accent folds away with its mark.
        assert!(primary.matches("ae\u{301}c", false, &locale));
    }

    #[test]
    fn escaped_wildcards_match_literally() {
        assert!(like("100%", "100\\%"));
        assert!(!like("1000", "100\\%"));
        assert!(like("a?", "a\\?"));
        assert!(!like("ab", "a\\?"));
        assert!(like("a\\", "a\\"));

        let bang = LikePattern::compile("5!%", Some('!'));
        assert!(bang.matches("5%", true, &Locale::default()));
        assert!(!bang.matches("55", true, &Locale::default()));
    }

    #[test]
    fn case_folding_follows_locale() {
        assert!(like("apple", "A%"));
        let pattern = LikePattern::compile("A%", None);
        assert!(!pattern.matches("apple", true, &Locale::default()));

        let accents = LikePattern::compile("resum?", None);
        assert!(!accents.matches("résumé", false, &Locale::default()));
        assert!(accents.matches(
            "résumé",
            false,
            &Locale::new(CollationStrength::Primary)
        ));
    }
}
