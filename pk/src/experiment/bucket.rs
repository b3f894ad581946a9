//! Deterministic variant assignment
//!
//! A key is hashed with xxHash32 (seed 0) over its UTF-8 bytes and the hash is
//! mapped onto `[0, 1)`. The split table is walked in declaration order and
//! the first variant whose cumulative proportion exceeds that value wins.
//! Every process, on every platform, puts the same key in the same bucket.

use xxhash_rust::xxh32::xxh32;

/// Variant names with their traffic proportions, in declaration order
pub type SplitTable = [(String, f64)];

const HASH_SEED: u32 = 0;
const HASH_SPACE: f64 = 4_294_967_296.0; // 2^32

/// Normalized hash of `key` in `[0, 1)`
pub fn hash_unit(key: &str) -> f64 {
    f64::from(xxh32(key.as_bytes(), HASH_SEED)) / HASH_SPACE
}

/// Pick the variant for `key`
///
/// Falls back to the first variant when rounding leaves the cumulative sum
/// short of the hash value. An empty table yields no variant.
pub fn bucket<'a>(key: &str, split: &'a SplitTable) -> Option<&'a str> {
    let (first, _) = split.first()?;
    let point = hash_unit(key);

    let mut cumulative = 0.0;
    for (variant, proportion) in split {
        cumulative += proportion;
        if cumulative > point {
            return Some(variant.as_str());
        }
    }
    Some(first.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table(entries: &[(&str, f64)]) -> Vec<(String, f64)> {
        entries.iter().map(|(v, p)| (v.to_string(), *p)).collect()
    }

    #[test]
    fn test_hash_unit_known_values() {
        // xxh32("", 0) = 0x02CC5D05, xxh32("abc", 0) = 0x32D153FF
        assert!((hash_unit("") - 0x02CC_5D05 as f64 / HASH_SPACE).abs() < 1e-12);
        assert!((hash_unit("abc") - 0x32D1_53FF as f64 / HASH_SPACE).abs() < 1e-12);
        assert!((hash_unit("abc") - 0.1985).abs() < 1e-3);
    }

    #[test]
    fn test_bucket_walks_in_declaration_order() {
        let split = table(&[("A", 0.1), ("B", 0.9)]);
        assert_eq!(bucket("abc", &split), Some("B"));
        assert_eq!(bucket("", &split), Some("A"));

        let even = table(&[("A", 0.5), ("B", 0.5)]);
        assert_eq!(bucket("abc", &even), Some("A"));
    }

    #[test]
    fn test_bucket_short_table_falls_back_to_first() {
        let split = table(&[("A", 0.01), ("B", 0.01)]);
        assert_eq!(bucket("abc", &split), Some("A"));
    }

    #[test]
    fn test_bucket_empty_table() {
        assert_eq!(bucket("abc", &[]), None);
    }

    #[test]
    fn test_bucket_is_stable_across_calls() {
        let split = table(&[("control", 0.34), ("treatment", 0.33), ("holdout", 0.33)]);
        for key in ["exp:user-1", "exp:user-2", "exp:user-3"] {
            assert_eq!(bucket(key, &split), bucket(key, &split));
        }
    }

    fn normalized_table() -> impl Strategy<Value = Vec<(String, f64)>> {
        prop::collection::vec(1u32..100, 1..6).prop_map(|weights| {
            let total: u32 = weights.iter().sum();
            weights
                .into_iter()
                .enumerate()
                .map(|(i, w)| (format!("v{}", i), f64::from(w) / f64::from(total)))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_hash_unit_in_range(key in ".*") {
            let h = hash_unit(&key);
            prop_assert!((0.0..1.0).contains(&h));
        }

        #[test]
        fn prop_bucket_is_total_and_deterministic(key in ".*", split in normalized_table()) {
            let picked = bucket(&key, &split);
            prop_assert!(picked.is_some());
            let picked = picked.unwrap();
            prop_assert!(split.iter().any(|(v, _)| v == picked));
            prop_assert_eq!(bucket(&key, &split), Some(picked));
        }
    }
}
