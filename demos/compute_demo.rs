use std::sync::Arc;
use std::thread;

use stripemap_rs::ConcurrentMap;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let map = ConcurrentMap::new();

    map.insert(1, 10);
    map.insert(2, 20);
    map.insert(3, 30);

    println!("Initial map:");
    for (k, v) in map.iter() {
        println!("  {} -> {}", k, v);
    }

    // Alter key 2: increment its value if it exists, otherwise insert 10
    let old_val = map.alter(2, |old| match old {
        Some(v) => Some(v + 5),
        None => Some(10),
    });
    println!("Alter key 2: old={:?}, new={:?}", old_val, map.get(&2));

    // compute returning None deletes the entry
    let new_val = map.compute(3, |_, _| None);
    println!("Compute key 3 to None: new={:?}, present={}", new_val, map.contains_key(&3));

    let merged = map.merge(1, 7, |old, new| Some(old + new));
    println!("Merge 7 into key 1: {:?}", merged);

    // Word count from several threads; the table grows while they run.
    let words = Arc::new(ConcurrentMap::with_capacity(2).expect("capacity is non-zero"));
    let text = "the quick brown fox jumps over the lazy dog the end";
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let words = Arc::clone(&words);
            thread::spawn(move || {
                for word in text.split_whitespace() {
                    words.merge(word.to_string(), 1u32, |old, new| Some(old + new));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    println!(
        "\n'the' seen {} times, {} distinct words, capacity {}",
        words.get("the").unwrap_or(0),
        words.len(),
        words.capacity()
    );

    // Retain: increment all values by 1 and drop the odd ones
    let mut count = 0;
    map.retain(|_, v| {
        count += 1;
        *v += 1;
        *v % 2 == 0
    });
    println!("\nRetain processed {} entries", count);

    println!("\nFinal map: {:?}", map);
}
