use std::cmp::Ordering;
use std::collections::BTreeSet;

use paradox_format::{Row, Value};

use crate::collation::Locale;
use crate::compare::compare_keys;

/// A composite key ordered column by column with [`compare_keys`], so NULL keys are equal to
/// each other.
#[derive(Clone, Debug)]
pub(crate) struct KeyRow {
    values: Vec<Value>,
    locale: Locale,
}

impl KeyRow {
    pub(crate) fn new(values: Vec<Value>, locale: Locale) -> Self {
        Self { values, locale }
    }
}

impl Ord for KeyRow {
    fn cmp(&self, other: &Self) -> Ordering {
        self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| compare_keys(a, b, &self.locale))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| self.values.len().cmp(&other.values.len()))
    }
}

impl PartialOrd for KeyRow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyRow {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for KeyRow {}

/// First-occurrence-wins duplicate elimination over the visible columns of output rows.
#[derive(Debug)]
pub(crate) struct DistinctFilter {
    seen: BTreeSet<KeyRow>,
    visible: Vec<usize>,
    locale: Locale,
}

impl DistinctFilter {
    pub(crate) fn new(hidden: &[bool], locale: Locale) -> Self {
        Self {
            seen: BTreeSet::new(),
            visible: (0..hidden.len()).filter(|&i| !hidden[i]).collect(),
            locale,
        }
    }

    /// `true` the first time an equal row is offered.
    pub(crate) fn insert(&mut self, row: &Row) -> bool {
        let key = self
            .visible
            .iter()
            .map(|&i| row.get(i).cloned().unwrap_or_default())
            .collect();
        self.seen.insert(KeyRow::new(key, self.locale))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collation::CollationStrength;

    #[test]
    fn nulls_collapse_and_hidden_columns_are_ignored() {
        let mut filter = DistinctFilter::new(&[false, true], Locale::default());
        assert!(filter.insert(&vec![Value::Null, Value::Integer(1)]));
        assert!(!filter.insert(&vec![Value::Null, Value::Integer(2)]));
        assert!(filter.insert(&vec![Value::Integer(0), Value::Integer(2)]));
        assert!(!filter.insert(&vec![Value::Number(0.0), Value::Null]));
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn text_equality_follows_locale() {
        let mut strict = DistinctFilter::new(&[false], Locale::default());
        assert!(strict.insert(&vec![Value::from("abc")]));
        assert!(strict.insert(&vec![Value::from("ABC")]));

        let mut folded = DistinctFilter::new(&[false], Locale::new(CollationStrength::Secondary));
        assert!(folded.insert(&vec![Value::from("abc")]));
        assert!(!folded.insert(&vec![Value::from("ABC")]));
    }
}
