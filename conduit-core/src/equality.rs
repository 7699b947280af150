//! Snapshot identity.
//!
//! Snapshots are compared by identity, never by deep equality. Shared
//! values (`Rc`, `Arc`) compare by pointer; plain values compare by value,
//! with floats following SameValue semantics: `NaN` equals itself and `0.0`
//! differs from `-0.0`. JSON values are owned and have no identity, so they
//! compare structurally.

use std::hash::Hash;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

/// Identity comparison used to decide whether a snapshot changed.
pub trait SameValue {
    /// Returns true if `self` and `other` are the same snapshot.
    fn same_value(&self, other: &Self) -> bool;
}

impl<T: ?Sized> SameValue for Rc<T> {
    fn same_value(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> SameValue for Arc<T> {
    fn same_value(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

macro_rules! same_value_by_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SameValue for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

same_value_by_eq!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, String,
    &'static str,
);

macro_rules! same_value_float {
    ($($ty:ty),*) => {
        $(
            impl SameValue for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    if self.is_nan() && other.is_nan() {
                        return true;
                    }
                    self.to_bits() == other.to_bits()
                }
            }
        )*
    };
}

same_value_float!(f32, f64);

impl SameValue for Value {
    fn same_value(&self, other: &Self) -> bool {
        self == other
    }
}

impl<T: SameValue> SameValue for Option<T> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_value(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<A: SameValue, B: SameValue> SameValue for (A, B) {
    fn same_value(&self, other: &Self) -> bool {
        self.0.same_value(&other.0) && self.1.same_value(&other.1)
    }
}

impl<A: SameValue, B: SameValue, C: SameValue> SameValue for (A, B, C) {
    fn same_value(&self, other: &Self) -> bool {
        self.0.same_value(&other.0) && self.1.same_value(&other.1) && self.2.same_value(&other.2)
    }
}

/// One-level comparison of two records: same keys, and every value the
/// same by [`SameValue`]. Key order is ignored.
pub fn shallow_equal<K, V>(a: &IndexMap<K, V>, b: &IndexMap<K, V>) -> bool
where
    K: Hash + Eq,
    V: SameValue,
{
    if std::ptr::eq(a, b) {
        return true;
    }
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| value.same_value(other)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shared_values_compare_by_pointer() {
        let a = Rc::new(vec![1, 2]);
        let b = Rc::new(vec![1, 2]);
        assert!(a.same_value(&a.clone()));
        assert!(!a.same_value(&b));
    }

    #[test]
    fn floats_follow_same_value_semantics() {
        assert!(f64::NAN.same_value(&f64::NAN));
        assert!(!0.0f64.same_value(&-0.0));
        assert!(1.5f64.same_value(&1.5));
    }

    #[test]
    fn composites_compare_elementwise() {
        let shared = Rc::new(3);
        assert!((1, shared.clone()).same_value(&(1, shared.clone())));
        assert!(!(1, shared.clone()).same_value(&(1, Rc::new(3))));
        assert!(Some(2u8).same_value(&Some(2)));
        assert!(!Some(2u8).same_value(&None));
    }

    #[test]
    fn shallow_equal_compares_one_level() {
        let shared = Rc::new(1);
        let mut a = IndexMap::new();
        a.insert("x", shared.clone());
        let mut b = IndexMap::new();
        b.insert("x", shared);
        assert!(shallow_equal(&a, &b));

        b.insert("x", Rc::new(1));
        assert!(!shallow_equal(&a, &b));

        let mut c: IndexMap<&str, Value> = IndexMap::new();
        c.insert("a", json!(1));
        c.insert("b", json!({ "nested": true }));
        let mut d = IndexMap::new();
        d.insert("b", json!({ "nested": true }));
        d.insert("a", json!(1));
        assert!(shallow_equal(&c, &d));

        d.insert("extra", Value::Null);
        assert!(!shallow_equal(&c, &d));
    }
}
