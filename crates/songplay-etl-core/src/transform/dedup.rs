//! Exact-row deduplication.

use std::{collections::HashSet, hash::Hash};

/// A row type that can be compared for exact duplicates.
///
/// The key must treat two rows as equal exactly when every projected field
/// is equal, with doubles compared through [`F64Key`].
pub trait DedupKey {
    /// Hashable image of the whole row.
    type Key: Eq + Hash;

    /// Build the key for this row.
    fn dedup_key(&self) -> Self::Key;
}

/// Remove exact-duplicate rows, keeping the first occurrence of each.
///
/// Order of the surviving rows follows the input, so the result is
/// deterministic and `dedup(dedup(x)) == dedup(x)`.
pub fn dedup<T: DedupKey>(rows: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter()
        .filter(|row| seen.insert(row.dedup_key()))
        .collect()
}

/// Hashable, totally-equal image of an `f64`.
///
/// Every NaN maps to one canonical value and `-0.0` maps to `0.0`; all other
/// values compare by bit pattern, which matches `==` for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct F64Key(u64);

impl F64Key {
    /// Normalize `v` into a key.
    pub fn new(v: f64) -> Self {
        if v.is_nan() {
            F64Key(f64::NAN.to_bits())
        } else if v == 0.0 {
            F64Key(0.0_f64.to_bits())
        } else {
            F64Key(v.to_bits())
        }
    }

    /// Key for an optional double.
    pub fn of(v: Option<f64>) -> Option<Self> {
        v.map(F64Key::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row(&'static str, Option<f64>);

    impl DedupKey for Row {
        type Key = (&'static str, Option<F64Key>);

        fn dedup_key(&self) -> Self::Key {
            (self.0, F64Key::of(self.1))
        }
    }

    #[test]
    fn keeps_first_occurrence_in_input_order() {
        let rows = vec![
            Row("b", Some(1.0)),
            Row("a", None),
            Row("b", Some(1.0)),
            Row("a", Some(1.0)),
            Row("a", None),
        ];
        assert_eq!(
            dedup(rows),
            vec![Row("b", Some(1.0)), Row("a", None), Row("a", Some(1.0))]
        );
    }

    #[test]
    fn dedup_is_idempotent() {
        let rows = vec![
            Row("x", Some(f64::NAN)),
            Row("x", Some(-f64::NAN)),
            Row("y", Some(0.0)),
            Row("y", Some(-0.0)),
        ];
        let once = dedup(rows);
        assert_eq!(once.len(), 2);
        let twice = dedup(once.clone());
        assert_eq!(twice.len(), once.len());
        assert_eq!(twice[1], once[1]);
    }

    #[test]
    fn f64_key_normalizes_nan_and_signed_zero() {
        assert_eq!(F64Key::new(f64::NAN), F64Key::new(-f64::NAN));
        assert_eq!(F64Key::new(-0.0), F64Key::new(0.0));
        assert_ne!(F64Key::new(210.5), F64Key::new(210.500_000_000_1));
    }
}
