//! Index scan-key construction from an index relation is a collaborator
//! concern; this module only models the comparison semantics the merge
//! builder needs: per-attribute direction and null ordering.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanKey {
    /// `SK_BT_DESC`
    pub desc: bool,
    /// `SK_BT_NULLS_FIRST`
    pub nulls_first: bool,
}

impl ScanKey {
    pub fn asc() -> Self {
        Self {
            desc: false,
            nulls_first: false,
        }
    }
}

/// One attribute value in an index key. `None` is SQL NULL.
pub type KeyValue = Option<i64>;

fn compare_value(a: &KeyValue, b: &KeyValue, key: &ScanKey) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => {
            if key.nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (Some(_), None) => {
            if key.nulls_first {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (Some(x), Some(y)) => {
            let ord = x.cmp(y);
            if key.desc {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}

/// Compares two index keys attribute by attribute, honoring each
/// attribute's `SK_BT_DESC`/`SK_BT_NULLS_FIRST` flags. Returns the
/// ordering and whether any attribute on either side was NULL
/// (`hasnull`), which the merge builder uses to decide whether a
/// `cmp = 0` tie still counts as a genuine duplicate.
pub fn compare_keys(a: &[KeyValue], b: &[KeyValue], keys: &[ScanKey]) -> (Ordering, bool) {
    debug_assert_eq!(a.len(), keys.len());
    debug_assert_eq!(b.len(), keys.len());
    let hasnull = a.iter().any(|v| v.is_none()) || b.iter().any(|v| v.is_none());
    for ((av, bv), key) in a.iter().zip(b.iter()).zip(keys.iter()) {
        let ord = compare_value(av, bv, key);
        if ord != Ordering::Equal {
            return (ord, hasnull);
        }
    }
    (Ordering::Equal, hasnull)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascending_orders_numerically() {
        let keys = [ScanKey::asc()];
        let (ord, hasnull) = compare_keys(&[Some(1)], &[Some(2)], &keys);
        assert_eq!(ord, Ordering::Less);
        assert!(!hasnull);
    }

    #[test]
    fn descending_reverses_order() {
        let keys = [ScanKey {
            desc: true,
            nulls_first: false,
        }];
        let (ord, _) = compare_keys(&[Some(1)], &[Some(2)], &keys);
        assert_eq!(ord, Ordering::Greater);
    }

    #[test]
    fn nulls_first_orders_null_before_value() {
        let keys = [ScanKey {
            desc: false,
            nulls_first: true,
        }];
        let (ord, hasnull) = compare_keys(&[None], &[Some(2)], &keys);
        assert_eq!(ord, Ordering::Less);
        assert!(hasnull);
    }

    #[test]
    fn nulls_last_is_the_default() {
        let keys = [ScanKey::asc()];
        let (ord, _) = compare_keys(&[None], &[Some(2)], &keys);
        assert_eq!(ord, Ordering::Greater);
    }
}
