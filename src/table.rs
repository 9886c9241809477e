//! Entries, buckets and the bucket array.
//!
//! Lock granularity is one mutex per bucket. A lock per entry would spend more time on
//! lock bookkeeping than on the chain itself, and a lock per table serializes every
//! writer. One lock per bucket lets writers on different buckets run in parallel while
//! keeping each critical section to a short chain walk.
//!
//! Readers never take the lock. Every pointer a reader follows is an epoch-managed
//! [`Atomic`], and anything unlinked or replaced under the lock is retired through
//! [`Guard::defer_destroy`], so a reader pinned before the unlink can finish its walk.

use std::borrow::Borrow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use parking_lot::{Mutex, MutexGuard};

// ================================================================================================
// ENTRY
// ================================================================================================

/// One key/value pair in a bucket chain.
///
/// `hash` and `key` never change after creation. `value` and `next` are only written while
/// the owning bucket is locked.
pub(crate) struct Entry<K, V> {
    pub(crate) hash: u64,
    pub(crate) key: K,
    value: Atomic<V>,
    next: Atomic<Entry<K, V>>,
}

impl<K, V> Entry<K, V> {
    fn new(hash: u64, key: K, value: V) -> Self {
        Self {
            hash,
            key,
            value: Atomic::new(value),
            next: Atomic::null(),
        }
    }

    /// Current value. Valid for as long as `guard` stays pinned.
    #[inline]
    pub(crate) fn value<'g>(&'g self, guard: &'g Guard) -> &'g V {
        let value = self.value.load(Ordering::Acquire, guard);
        // SAFETY: a linked entry always holds a value, and a replaced value is only
        // destroyed after every guard pinned before the swap has been dropped.
        unsafe { value.deref() }
    }

    #[inline]
    pub(crate) fn next<'g>(&'g self, guard: &'g Guard) -> Option<&'g Entry<K, V>> {
        let next = self.next.load(Ordering::Acquire, guard);
        // SAFETY: unlinked entries are retired through the epoch, see `Locked::unlink`.
        unsafe { next.as_ref() }
    }
}

impl<K, V> Drop for Entry<K, V> {
    fn drop(&mut self) {
        // SAFETY: we have exclusive access, nobody else can reach this value any more.
        unsafe {
            let guard = epoch::unprotected();
            let value = self.value.swap(Shared::null(), Ordering::Relaxed, guard);
            if !value.is_null() {
                drop(value.into_owned());
            }
        }
    }
}

// ================================================================================================
// BUCKET
// ================================================================================================

/// A lock plus the head of a chain of entries.
pub(crate) struct Bucket<K, V> {
    lock: Mutex<()>,
    // Set under `lock` once the chain has been copied into the next table.
    moved: AtomicBool,
    head: Atomic<Entry<K, V>>,
}

impl<K, V> Bucket<K, V> {
    fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            moved: AtomicBool::new(false),
            head: Atomic::null(),
        }
    }

    #[inline]
    pub(crate) fn head<'g>(&'g self, guard: &'g Guard) -> Option<&'g Entry<K, V>> {
        let head = self.head.load(Ordering::Acquire, guard);
        // SAFETY: see `Entry::next`.
        unsafe { head.as_ref() }
    }

    /// Lock-free lookup.
    pub(crate) fn find<'g, Q>(&'g self, hash: u64, key: &Q, guard: &'g Guard) -> Option<&'g Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let mut current = self.head(guard);
        while let Some(entry) = current {
            if entry.hash == hash && entry.key.borrow() == key {
                return Some(entry);
            }
            current = entry.next(guard);
        }
        None
    }

    #[inline]
    pub(crate) fn is_moved(&self) -> bool {
        self.moved.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn lock(&self) -> Locked<'_, K, V> {
        Locked {
            bucket: self,
            _guard: self.lock.lock(),
        }
    }

    /// Prepend to a bucket of a table that has not been published yet.
    fn push_detached(&self, entry: Entry<K, V>, guard: &Guard) {
        let entry = Owned::new(entry);
        entry
            .next
            .store(self.head.load(Ordering::Relaxed, guard), Ordering::Relaxed);
        // Made visible to other threads by the release swap that publishes the table.
        self.head.store(entry, Ordering::Relaxed);
    }
}

// ================================================================================================
// LOCKED BUCKET
// ================================================================================================

/// What a scan callback wants done with the entry it was shown.
pub(crate) enum Action<V> {
    Keep,
    Replace(V),
    Remove,
}

/// Position of an entry found under the lock, used to update or unlink it.
pub(crate) struct Slot<'g, K, V> {
    prev: Shared<'g, Entry<K, V>>,
    entry: Shared<'g, Entry<K, V>>,
}

impl<'g, K, V> Slot<'g, K, V> {
    #[inline]
    pub(crate) fn entry(&self) -> &'g Entry<K, V> {
        // SAFETY: `entry` is never null, and it cannot be retired while the bucket lock is
        // held by the caller that found it.
        unsafe { self.entry.deref() }
    }
}

/// A bucket whose lock is held. All chain mutation goes through this type, so holding one
/// is the proof that the caller may write. The lock is released on drop, including when a
/// user callback unwinds.
pub(crate) struct Locked<'b, K, V> {
    bucket: &'b Bucket<K, V>,
    _guard: MutexGuard<'b, ()>,
}

impl<'b, K, V> Locked<'b, K, V> {
    #[inline]
    pub(crate) fn is_moved(&self) -> bool {
        self.bucket.moved.load(Ordering::Relaxed)
    }

    pub(crate) fn set_moved(&self, moved: bool) {
        self.bucket.moved.store(moved, Ordering::Release);
    }

    pub(crate) fn search<'g, Q>(&self, hash: u64, key: &Q, guard: &'g Guard) -> Option<Slot<'g, K, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let mut prev = Shared::null();
        let mut current = self.bucket.head.load(Ordering::Relaxed, guard);
        // SAFETY: the lock keeps the chain stable and the guard keeps every node alive.
        while let Some(entry) = unsafe { current.as_ref() } {
            if entry.hash == hash && entry.key.borrow() == key {
                return Some(Slot {
                    prev,
                    entry: current,
                });
            }
            prev = current;
            current = entry.next.load(Ordering::Relaxed, guard);
        }
        None
    }

    /// Link a new entry at the head of the chain.
    pub(crate) fn insert(&self, hash: u64, key: K, value: V, guard: &Guard) {
        let entry = Owned::new(Entry::new(hash, key, value));
        entry
            .next
            .store(self.bucket.head.load(Ordering::Relaxed, guard), Ordering::Relaxed);
        self.bucket.head.store(entry, Ordering::Release);
    }

    /// Swap in a new value; the old one is retired once current readers are done with it.
    pub(crate) fn set_value<'g>(&self, slot: &Slot<'g, K, V>, value: V, guard: &'g Guard) {
        let old = slot
            .entry()
            .value
            .swap(Owned::new(value), Ordering::AcqRel, guard);
        // SAFETY: `old` is unreachable from the map now.
        unsafe { guard.defer_destroy(old) };
    }

    pub(crate) fn unlink<'g>(&self, slot: Slot<'g, K, V>, guard: &'g Guard) {
        let next = slot.entry().next.load(Ordering::Relaxed, guard);
        // The unlinked entry keeps its `next` so a reader standing on it can walk on.
        // SAFETY: `prev` was found under the same lock acquisition and is still linked.
        match unsafe { slot.prev.as_ref() } {
            Some(prev) => prev.next.store(next, Ordering::Release),
            None => self.bucket.head.store(next, Ordering::Release),
        }
        // SAFETY: the entry is no longer reachable from the bucket.
        unsafe { guard.defer_destroy(slot.entry) };
    }

    /// Show every entry to `f` and apply what it asks for. Each unlink is subtracted from
    /// `size` right away, so a panicking `f` leaves the count matching the chain.
    /// Returns the number of entries removed.
    pub(crate) fn scan<F>(&self, guard: &Guard, size: &AtomicUsize, f: &mut F) -> usize
    where
        F: FnMut(&K, &V) -> Action<V>,
    {
        let mut removed = 0;
        let mut prev: Shared<'_, Entry<K, V>> = Shared::null();
        let mut current = self.bucket.head.load(Ordering::Relaxed, guard);
        // SAFETY: same as `search`.
        while let Some(entry) = unsafe { current.as_ref() } {
            let next = entry.next.load(Ordering::Relaxed, guard);
            let slot = Slot {
                prev,
                entry: current,
            };
            match f(&entry.key, entry.value(guard)) {
                Action::Keep => prev = current,
                Action::Replace(value) => {
                    self.set_value(&slot, value, guard);
                    prev = current;
                }
                Action::Remove => {
                    self.unlink(slot, guard);
                    size.fetch_sub(1, Ordering::Relaxed);
                    removed += 1;
                }
            }
            current = next;
        }
        removed
    }

    /// Clone the chain into `dest`. Every entry lands either at this bucket's index or at
    /// index + old capacity, since `dest` is exactly twice as large.
    pub(crate) fn copy_into(&self, dest: &Table<K, V>, guard: &Guard) -> usize
    where
        K: Clone,
        V: Clone,
    {
        let mut copied = 0;
        let mut current = self.bucket.head(guard);
        while let Some(entry) = current {
            let clone = Entry::new(entry.hash, entry.key.clone(), entry.value(guard).clone());
            dest.bucket(entry.hash).push_detached(clone, guard);
            copied += 1;
            current = entry.next(guard);
        }
        copied
    }
}

// ================================================================================================
// TABLE
// ================================================================================================

/// Fixed array of buckets. Never resized in place: growing builds a new `Table`.
pub(crate) struct Table<K, V> {
    buckets: Box<[Bucket<K, V>]>,
    mask: usize,
}

impl<K, V> Table<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        Self {
            buckets: (0..capacity).map(|_| Bucket::new()).collect(),
            mask: capacity - 1,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.mask + 1
    }

    #[inline]
    pub(crate) fn bucket(&self, hash: u64) -> &Bucket<K, V> {
        &self.buckets[hash as usize & self.mask]
    }

    #[inline]
    pub(crate) fn bucket_at(&self, index: usize) -> &Bucket<K, V> {
        &self.buckets[index]
    }

    pub(crate) fn buckets(&self) -> impl Iterator<Item = &Bucket<K, V>> {
        self.buckets.iter()
    }
}

impl<K, V> Drop for Table<K, V> {
    fn drop(&mut self) {
        // SAFETY: a table is dropped either by the map's own drop or as deferred garbage
        // after it was swapped out, in both cases nothing else can reach its chains.
        let guard = unsafe { epoch::unprotected() };
        for bucket in self.buckets.iter() {
            let mut current = bucket.head.swap(Shared::null(), Ordering::Relaxed, guard);
            while !current.is_null() {
                let entry = unsafe { current.into_owned() };
                current = entry.next.load(Ordering::Relaxed, guard);
                drop(entry);
            }
        }
    }
}
