use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use stripemap_rs::{ConcurrentMap, MapConfig};

/// One bucket that never grows, so every entry shares a chain.
fn single_bucket_map() -> ConcurrentMap<u32, u32> {
    let config = MapConfig::new().initial_capacity(1).load_factor(100.0);
    ConcurrentMap::with_config(config).unwrap()
}

#[test]
fn test_clear_basic() {
    let m: ConcurrentMap<u64, String> = ConcurrentMap::with_capacity(16).unwrap();

    m.insert(1, "one".to_string());
    m.insert(2, "two".to_string());
    m.insert(3, "three".to_string());
    assert_eq!(m.len(), 3);
    assert!(!m.is_empty());

    m.clear();

    assert_eq!(m.len(), 0);
    assert!(m.is_empty());
    assert_eq!(m.get(&1), None);
    assert_eq!(m.get(&2), None);
    assert_eq!(m.get(&3), None);
}

#[test]
fn test_clear_empty_map() {
    let m: ConcurrentMap<u64, String> = ConcurrentMap::new();
    m.clear();
    assert_eq!(m.len(), 0);
    assert!(m.is_empty());
}

#[test]
fn test_clear_and_reinsert() {
    let m: ConcurrentMap<u64, String> = ConcurrentMap::with_capacity(32).unwrap();
    for i in 0..10 {
        m.insert(i, format!("value_{}", i));
    }
    m.clear();
    assert!(m.is_empty());

    // Clearing keeps the grown table; reinserting works as usual.
    for i in 0..5 {
        m.insert(i, format!("new_value_{}", i));
    }
    assert_eq!(m.len(), 5);
    for i in 0..5 {
        assert_eq!(m.get(&i), Some(format!("new_value_{}", i)));
    }
    for i in 5..10 {
        assert_eq!(m.get(&i), None);
    }
}

#[test]
fn test_clear_after_resize() {
    let m: ConcurrentMap<u64, u64> = ConcurrentMap::with_capacity(2).unwrap();
    for i in 0..1_000 {
        m.insert(i, i);
    }
    let capacity = m.capacity();
    m.clear();
    assert!(m.is_empty());
    assert_eq!(m.capacity(), capacity);
    assert_eq!(m.iter().count(), 0);
}

#[test]
fn test_retain_removes_and_edits() {
    let m: ConcurrentMap<u32, u32> = (0..100).map(|i| (i, i)).collect();

    m.retain(|k, v| {
        *v *= 10;
        k % 2 == 0
    });

    assert_eq!(m.len(), 50);
    for i in 0..100 {
        if i % 2 == 0 {
            assert_eq!(m.get(&i), Some(i * 10));
        } else {
            assert_eq!(m.get(&i), None);
        }
    }
}

#[test]
fn test_retain_sees_each_entry_once() {
    let m: ConcurrentMap<u32, ()> = (0..500).map(|i| (i, ())).collect();
    let mut seen = Vec::new();
    m.retain(|k, _| {
        seen.push(*k);
        true
    });
    seen.sort_unstable();
    assert_eq!(seen, (0..500).collect::<Vec<_>>());
    assert_eq!(m.len(), 500);
}

#[test]
fn test_replace_all() {
    let m: ConcurrentMap<String, usize> = ConcurrentMap::new();
    for word in ["a", "bb", "ccc"] {
        m.insert(word.to_string(), 0);
    }
    m.replace_all(|k, _| k.len());
    assert_eq!(m.get("a"), Some(1));
    assert_eq!(m.get("bb"), Some(2));
    assert_eq!(m.get("ccc"), Some(3));
    assert_eq!(m.len(), 3);
}

#[test]
fn test_concurrent_clear() {
    let m: Arc<ConcurrentMap<u64, String>> = Arc::new(ConcurrentMap::with_capacity(64).unwrap());
    for i in 0..100 {
        m.insert(i, format!("value_{}", i));
    }

    let mut handles = vec![];
    for t in 0..4u64 {
        let m = Arc::clone(&m);
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                m.insert(1_000 + t * 100 + i, format!("thread_{}_{}", t, i));
                let _ = m.get(&i);
            }
        }));
    }
    {
        let m = Arc::clone(&m);
        handles.push(thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(1));
            m.clear();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Whatever survived the clear must be counted exactly.
    assert_eq!(m.len(), m.iter().count());
    for i in 0..100 {
        assert_eq!(m.get(&i), None, "pre-existing key {} survived clear", i);
    }
}

#[test]
fn test_clear_while_resizing() {
    let m: Arc<ConcurrentMap<u64, u64>> = Arc::new(ConcurrentMap::with_capacity(1).unwrap());
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let m = m.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut k = 0u64;
            while !stop.load(Ordering::Relaxed) {
                m.insert(k, k);
                k += 1;
            }
        })
    };

    for _ in 0..50 {
        m.clear();
    }
    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();

    assert_eq!(m.len(), m.iter().count());
    m.clear();
    assert!(m.is_empty());
    assert_eq!(m.iter().count(), 0);
}

#[test]
fn test_retain_panic_keeps_len_exact() {
    let m = single_bucket_map();
    for i in 0..5 {
        m.insert(i, i);
    }

    let mut calls = 0;
    let result = catch_unwind(AssertUnwindSafe(|| {
        m.retain(|_, _| {
            calls += 1;
            if calls == 3 {
                panic!("retain callback failed");
            }
            false
        });
    }));
    assert!(result.is_err());

    // The two entries removed before the panic stay removed and are no longer counted.
    assert_eq!(m.len(), 3);
    assert_eq!(m.len(), m.iter().count());

    // The bucket lock was released and the count keeps tracking later writes.
    m.insert(100, 100);
    assert_eq!(m.len(), 4);
    m.clear();
    assert!(m.is_empty());
    assert_eq!(m.iter().count(), 0);
}

#[test]
fn test_remove_if_panic_keeps_len_exact() {
    let m = single_bucket_map();
    for i in 0..8 {
        m.insert(i, i);
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        m.remove_if(|k, _| {
            if *k == 0 {
                panic!("predicate failed");
            }
            k % 2 == 1
        });
    }));
    assert!(result.is_err());
    assert_eq!(m.len(), m.iter().count());
    assert!(m.contains_key(&0));
}

#[test]
fn test_remove_if() {
    let m: ConcurrentMap<u32, String> = (0..100).map(|i| (i, i.to_string())).collect();

    m.remove_if(|k, v| k % 3 == 0 || v.ends_with('7'));

    for i in 0..100u32 {
        let gone = i % 3 == 0 || i % 10 == 7;
        assert_eq!(m.get(&i), if gone { None } else { Some(i.to_string()) });
    }
    assert_eq!(m.len(), m.iter().count());
}
