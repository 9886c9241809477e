//! Weakly consistent iterators.
//!
//! Iterators clone one bucket at a time into a small buffer, pinning the epoch only while
//! that bucket is read, so a long-lived iterator never holds back memory reclamation or a
//! resize. The table only ever doubles, and the entries of bucket `i` move to buckets
//! `i + k * old_capacity` of the new table, so continuing at the same index after a resize
//! may revisit an entry but never skips one that stayed in the map.

use std::collections::VecDeque;

use crossbeam_epoch as epoch;

use crate::ConcurrentMap;

struct Cursor<'a, K, V, S> {
    map: &'a ConcurrentMap<K, V, S>,
    bucket_index: usize,
}

impl<'a, K, V, S> Cursor<'a, K, V, S> {
    fn new(map: &'a ConcurrentMap<K, V, S>) -> Self {
        Self {
            map,
            bucket_index: 0,
        }
    }

    /// Append the next non-empty bucket to `out`. Returns false once the table is exhausted.
    fn fill<T, F>(&mut self, out: &mut VecDeque<T>, mut project: F) -> bool
    where
        F: FnMut(&K, &V) -> T,
    {
        let guard = epoch::pin();
        let table = self.map.load_table(&guard);
        while self.bucket_index < table.capacity() {
            let bucket = table.bucket_at(self.bucket_index);
            self.bucket_index += 1;

            let mut current = bucket.head(&guard);
            while let Some(entry) = current {
                out.push_back(project(&entry.key, entry.value(&guard)));
                current = entry.next(&guard);
            }
            if !out.is_empty() {
                return true;
            }
        }
        false
    }
}

/// Iterator over cloned key-value pairs of a [`ConcurrentMap`].
pub struct Iter<'a, K, V, S> {
    cursor: Cursor<'a, K, V, S>,
    buffer: VecDeque<(K, V)>,
}

impl<'a, K, V, S> Iter<'a, K, V, S> {
    pub(crate) fn new(map: &'a ConcurrentMap<K, V, S>) -> Self {
        Self {
            cursor: Cursor::new(map),
            buffer: VecDeque::new(),
        }
    }
}

impl<K: Clone, V: Clone, S> Iterator for Iter<'_, K, V, S> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            self.cursor
                .fill(&mut self.buffer, |k, v| (k.clone(), v.clone()));
        }
        self.buffer.pop_front()
    }
}

/// Iterator over cloned keys of a [`ConcurrentMap`].
pub struct Keys<'a, K, V, S> {
    cursor: Cursor<'a, K, V, S>,
    buffer: VecDeque<K>,
}

impl<'a, K, V, S> Keys<'a, K, V, S> {
    pub(crate) fn new(map: &'a ConcurrentMap<K, V, S>) -> Self {
        Self {
            cursor: Cursor::new(map),
            buffer: VecDeque::new(),
        }
    }
}

impl<K: Clone, V, S> Iterator for Keys<'_, K, V, S> {
    type Item = K;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            self.cursor.fill(&mut self.buffer, |k, _| k.clone());
        }
        self.buffer.pop_front()
    }
}

/// Iterator over cloned values of a [`ConcurrentMap`].
pub struct Values<'a, K, V, S> {
    cursor: Cursor<'a, K, V, S>,
    buffer: VecDeque<V>,
}

impl<'a, K, V, S> Values<'a, K, V, S> {
    pub(crate) fn new(map: &'a ConcurrentMap<K, V, S>) -> Self {
        Self {
            cursor: Cursor::new(map),
            buffer: VecDeque::new(),
        }
    }
}

impl<K, V: Clone, S> Iterator for Values<'_, K, V, S> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            self.cursor.fill(&mut self.buffer, |_, v| v.clone());
        }
        self.buffer.pop_front()
    }
}
