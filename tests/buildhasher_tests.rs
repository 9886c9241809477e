use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};

use stripemap_rs::ConcurrentMap;

// Custom hasher for testing
#[derive(Default, Clone)]
struct TestHasher {
    value: u64,
}

impl Hasher for TestHasher {
    fn finish(&self) -> u64 {
        self.value
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.value = self.value.wrapping_mul(31).wrapping_add(byte as u64);
        }
    }
}

#[derive(Default, Clone)]
struct TestBuildHasher;

impl BuildHasher for TestBuildHasher {
    type Hasher = TestHasher;

    fn build_hasher(&self) -> Self::Hasher {
        TestHasher::default()
    }
}

/// Sends every key to the same bucket.
#[derive(Default, Clone)]
struct ConstantBuildHasher;

struct ConstantHasher;

impl Hasher for ConstantHasher {
    fn finish(&self) -> u64 {
        7
    }

    fn write(&mut self, _bytes: &[u8]) {}
}

impl BuildHasher for ConstantBuildHasher {
    type Hasher = ConstantHasher;

    fn build_hasher(&self) -> Self::Hasher {
        ConstantHasher
    }
}

#[test]
fn test_with_hasher() {
    let map: ConcurrentMap<String, i32, TestBuildHasher> = ConcurrentMap::with_hasher(TestBuildHasher);

    map.insert("key1".to_string(), 100);
    map.insert("key2".to_string(), 200);

    assert_eq!(map.get("key1"), Some(100));
    assert_eq!(map.get("key2"), Some(200));
    assert_eq!(map.len(), 2);
}

#[test]
fn test_with_capacity_and_hasher() {
    let map: ConcurrentMap<String, i32, TestBuildHasher> =
        ConcurrentMap::with_capacity_and_hasher(100, TestBuildHasher).unwrap();
    assert_eq!(map.capacity(), 128);

    map.insert("test".to_string(), 42);
    assert_eq!(map.get("test"), Some(42));
}

#[test]
fn test_contains_key_with_custom_hasher() {
    let map: ConcurrentMap<String, i32, TestBuildHasher> = ConcurrentMap::with_hasher(TestBuildHasher);

    map.insert("exists".to_string(), 1);

    assert!(map.contains_key("exists"));
    assert!(!map.contains_key("not_exists"));
}

#[test]
fn test_keys_with_custom_hasher() {
    let map: ConcurrentMap<String, i32, TestBuildHasher> = ConcurrentMap::with_hasher(TestBuildHasher);

    map.insert("key1".to_string(), 1);
    map.insert("key2".to_string(), 2);
    map.insert("key3".to_string(), 3);

    let mut keys: Vec<String> = map.keys().collect();
    keys.sort();
    assert_eq!(keys, vec!["key1", "key2", "key3"]);

    let mut values: Vec<i32> = map.values().collect();
    values.sort_unstable();
    assert_eq!(values, vec![1, 2, 3]);
}

#[test]
fn test_default_with_std_random_state() {
    let map: ConcurrentMap<u64, u64, RandomState> = ConcurrentMap::default();
    map.insert(1, 10);
    assert_eq!(map.get(&1), Some(10));
    assert_eq!(map.capacity(), 16);
}

#[test]
fn test_into_iter_with_custom_hasher() {
    let map: ConcurrentMap<u32, u32, TestBuildHasher> = ConcurrentMap::with_hasher(TestBuildHasher);
    for i in 0..20 {
        map.insert(i, i + 1);
    }

    let mut pairs: Vec<(u32, u32)> = (&map).into_iter().collect();
    pairs.sort_unstable();
    assert_eq!(pairs, (0..20).map(|i| (i, i + 1)).collect::<Vec<_>>());

    let mut total = 0;
    for (_, v) in &map {
        total += v;
    }
    assert_eq!(total, (1..=20).sum::<u32>());
}

#[test]
fn test_degenerate_hasher_keeps_keys_apart() {
    let map: ConcurrentMap<u32, String, ConstantBuildHasher> =
        ConcurrentMap::with_hasher(ConstantBuildHasher);

    for i in 0..200 {
        map.insert(i, i.to_string());
    }
    assert_eq!(map.len(), 200);
    assert!(map.capacity() >= 256);
    for i in 0..200 {
        assert_eq!(map.get(&i), Some(i.to_string()));
    }

    for i in (0..200).step_by(2) {
        assert_eq!(map.remove(&i), Some(i.to_string()));
    }
    assert_eq!(map.len(), 100);
    for i in 0..200 {
        assert_eq!(map.contains_key(&i), i % 2 == 1);
    }
}

#[test]
fn test_clone_keeps_hasher() {
    let map: ConcurrentMap<String, i32, TestBuildHasher> = ConcurrentMap::with_hasher(TestBuildHasher);
    map.insert("a".to_string(), 1);
    let copy = map.clone();
    map.insert("b".to_string(), 2);

    assert_eq!(copy.get("a"), Some(1));
    assert_eq!(copy.get("b"), None);
    assert_eq!(copy.len(), 1);
}
