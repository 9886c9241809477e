//! StripeMap: a concurrent hash map with one lock per bucket and lock-free reads.
//!
//! Writers lock only the bucket their key hashes to, so writers on different buckets never
//! contend. Readers never lock: they follow epoch-protected pointers and may observe a value
//! that is being replaced, but never a torn one. When the entry count passes
//! `capacity * load_factor` one writer builds a table twice as large, copies every bucket
//! into it under that bucket's lock, and publishes it with a single pointer swap.
//!
//! ```
//! use stripemap_rs::ConcurrentMap;
//!
//! let map = ConcurrentMap::new();
//! map.insert("apples", 3);
//! map.merge("apples", 2, |old, new| Some(old + new));
//! assert_eq!(map.get("apples"), Some(5));
//! ```
//!
//! # Callbacks
//!
//! `alter`, `compute*`, `merge`, `retain` and friends run the user function while the
//! bucket lock is held. The function must not call back into the same map; doing so may
//! deadlock. If it panics (or, for [`ConcurrentMap::try_compute`], returns `Err`) the lock
//! is released and the map is left exactly as it was before the call. Whole-map operations
//! such as `retain` keep whatever they already applied to earlier entries, and `len()`
//! stays exact either way.

use std::borrow::Borrow;
use std::convert::Infallible;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use ahash::RandomState;
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use tracing::{debug, trace};

mod config;
mod error;
mod iter;
mod table;

pub use config::{MapConfig, DEFAULT_CAPACITY, DEFAULT_LOAD_FACTOR, MAX_CAPACITY};
pub use error::{Error, Result};
pub use iter::{Iter, Keys, Values};

use config::threshold;
use table::{Action, Bucket, Locked, Table};

/// pure CPU hints before any yield
const SPIN_BEFORE_YIELD: i32 = 128;

// ================================================================================================
// MAIN MAP STRUCTURE
// ================================================================================================

/// A hash map that can be shared between threads and mutated through `&self`.
///
/// `len()` is exact: the counter is updated inside the bucket's critical section.
/// Iteration is weakly consistent: it never fails because of concurrent writes, sees every
/// entry that stays in the map for the whole traversal, and may or may not see entries
/// added or removed meanwhile.
pub struct ConcurrentMap<K, V, S = RandomState> {
    table: Atomic<Table<K, V>>,
    size: AtomicUsize,
    resizing: AtomicBool,
    load_factor: f32,
    hasher: S,
}

// ================================================================================================
// CONSTRUCTORS
// ================================================================================================

impl<K, V> ConcurrentMap<K, V, RandomState>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty map with 16 buckets and a load factor of 0.75.
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    /// Create an empty map with at least `capacity` buckets.
    ///
    /// Fails with [`Error::InvalidCapacity`] when `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_config(MapConfig::new().initial_capacity(capacity))
    }

    pub fn with_config(config: MapConfig) -> Result<Self> {
        Self::with_config_and_hasher(config, RandomState::new())
    }
}

impl<K, V, S> ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    /// Create an empty map using the provided hasher.
    ///
    /// The hasher cannot be changed later since it decides which bucket every key lives in.
    pub fn with_hasher(hasher: S) -> Self {
        Self::from_parts(MapConfig::default(), hasher)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Result<Self> {
        Self::with_config_and_hasher(MapConfig::new().initial_capacity(capacity), hasher)
    }

    pub fn with_config_and_hasher(config: MapConfig, hasher: S) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, hasher))
    }

    fn from_parts(config: MapConfig, hasher: S) -> Self {
        Self {
            table: Atomic::new(Table::new(config.table_capacity())),
            size: AtomicUsize::new(0),
            resizing: AtomicBool::new(false),
            load_factor: config.load_factor,
            hasher,
        }
    }

    // ============================================================================================
    // LOOKUPS
    // ============================================================================================

    /// Returns a clone of the value for `key`. Never blocks.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get_with(key, V::clone)
    }

    /// Run `f` on the value for `key` without cloning it. Never blocks.
    pub fn get_with<Q, R, F>(&self, key: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&V) -> R,
    {
        let hash = self.hash(key);
        let guard = epoch::pin();
        let table = self.load_table(&guard);
        table
            .bucket(hash)
            .find(hash, key, &guard)
            .map(|entry| f(entry.value(&guard)))
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get_with(key, |_| ()).is_some()
    }

    /// Returns the value for `key`, or `default` when it is absent.
    pub fn get_or_default<Q>(&self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get(key).unwrap_or(default)
    }

    // ============================================================================================
    // SINGLE-KEY WRITES
    // ============================================================================================

    /// Inserts a key-value pair, returning the value it replaced.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.alter(key, |_| Some(value))
    }

    /// Inserts only if `key` is absent. Returns the value already present, in which case the
    /// map is left untouched.
    pub fn insert_if_absent(&self, key: K, value: V) -> Option<V> {
        let hash = self.hash(&key);
        self.update(hash, |bucket, guard| match bucket.search(hash, &key, guard) {
            Some(slot) => (Some(slot.entry().value(guard).clone()), 0),
            None => {
                bucket.insert(hash, key, value, guard);
                (None, 1)
            }
        })
    }

    /// Returns the value for `key`, inserting the result of `f` first if it is absent.
    ///
    /// The boolean is `true` when the value already existed. `f` runs at most once and only
    /// while the bucket is locked, so concurrent callers never both insert.
    pub fn get_or_insert_with<F>(&self, key: K, f: F) -> (V, bool)
    where
        F: FnOnce() -> V,
    {
        let hash = self.hash(&key);
        self.update(hash, |bucket, guard| match bucket.search(hash, &key, guard) {
            Some(slot) => ((slot.entry().value(guard).clone(), true), 0),
            None => {
                let value = f();
                bucket.insert(hash, key, value.clone(), guard);
                ((value, false), 1)
            }
        })
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_where(key, |_| true)
    }

    /// Removes `key` only if it currently maps to `expected`. Returns the removed value.
    pub fn remove_if_eq<Q>(&self, key: &Q, expected: &V) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: PartialEq,
    {
        self.remove_where(key, |current| current == expected)
    }

    fn remove_where<Q, F>(&self, key: &Q, pred: F) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&V) -> bool,
    {
        let hash = self.hash(key);
        self.update(hash, |bucket, guard| match bucket.search(hash, key, guard) {
            Some(slot) => {
                let current = slot.entry().value(guard);
                if !pred(current) {
                    return (None, 0);
                }
                let old = current.clone();
                bucket.unlink(slot, guard);
                (Some(old), -1)
            }
            None => (None, 0),
        })
    }

    /// Replaces the value for `key` only if it is present. Returns the previous value.
    pub fn replace<Q>(&self, key: &Q, value: V) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash(key);
        self.update(hash, |bucket, guard| match bucket.search(hash, key, guard) {
            Some(slot) => {
                let old = slot.entry().value(guard).clone();
                bucket.set_value(&slot, value, guard);
                (Some(old), 0)
            }
            None => (None, 0),
        })
    }

    /// Replaces the value for `key` only if it currently equals `expected`.
    pub fn replace_if_eq<Q>(&self, key: &Q, expected: &V, value: V) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: PartialEq,
    {
        let hash = self.hash(key);
        self.update(hash, |bucket, guard| match bucket.search(hash, key, guard) {
            Some(slot) if slot.entry().value(guard) == expected => {
                bucket.set_value(&slot, value, guard);
                (true, 0)
            }
            _ => (false, 0),
        })
    }

    // ============================================================================================
    // READ-MODIFY-WRITE
    // ============================================================================================

    /// Apply `f` to the current value for `key` and store what it returns.
    ///
    /// Returning `None` deletes the entry; returning `Some(v)` inserts or updates it.
    /// Returns the previous value.
    pub fn alter<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let hash = self.hash(&key);
        self.update(hash, |bucket, guard| match bucket.search(hash, &key, guard) {
            Some(slot) => {
                let old = slot.entry().value(guard);
                match f(Some(old)) {
                    Some(value) => {
                        let old = old.clone();
                        bucket.set_value(&slot, value, guard);
                        (Some(old), 0)
                    }
                    None => {
                        let old = old.clone();
                        bucket.unlink(slot, guard);
                        (Some(old), -1)
                    }
                }
            }
            None => match f(None) {
                Some(value) => {
                    bucket.insert(hash, key, value, guard);
                    (None, 1)
                }
                None => (None, 0),
            },
        })
    }

    /// Recompute the mapping for `key` atomically. Returns the new value, or `None` if the
    /// key ends up absent.
    pub fn compute<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(&K, Option<&V>) -> Option<V>,
    {
        match self.try_compute(key, |k, v| Ok::<_, Infallible>(f(k, v))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`compute`](Self::compute) with a fallible function. An `Err` leaves the map
    /// unchanged and is handed back to the caller.
    pub fn try_compute<F, E>(&self, key: K, f: F) -> Result<Option<V>, E>
    where
        F: FnOnce(&K, Option<&V>) -> Result<Option<V>, E>,
    {
        let hash = self.hash(&key);
        self.update(hash, |bucket, guard| match bucket.search(hash, &key, guard) {
            Some(slot) => match f(&key, Some(slot.entry().value(guard))) {
                Ok(Some(value)) => {
                    bucket.set_value(&slot, value.clone(), guard);
                    (Ok(Some(value)), 0)
                }
                Ok(None) => {
                    bucket.unlink(slot, guard);
                    (Ok(None), -1)
                }
                Err(e) => (Err(e), 0),
            },
            None => match f(&key, None) {
                Ok(Some(value)) => {
                    bucket.insert(hash, key, value.clone(), guard);
                    (Ok(Some(value)), 1)
                }
                Ok(None) => (Ok(None), 0),
                Err(e) => (Err(e), 0),
            },
        })
    }

    /// If `key` is absent, insert the value produced by `f` (unless it returns `None`).
    /// Returns the value now mapped to `key`.
    pub fn compute_if_absent<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(&K) -> Option<V>,
    {
        let hash = self.hash(&key);
        self.update(hash, |bucket, guard| match bucket.search(hash, &key, guard) {
            Some(slot) => (Some(slot.entry().value(guard).clone()), 0),
            None => match f(&key) {
                Some(value) => {
                    bucket.insert(hash, key, value.clone(), guard);
                    (Some(value), 1)
                }
                None => (None, 0),
            },
        })
    }

    /// If `key` is present, replace its value with `f(key, value)`, removing it when `f`
    /// returns `None`. Returns the new value.
    pub fn compute_if_present<Q, F>(&self, key: &Q, f: F) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&K, &V) -> Option<V>,
    {
        let hash = self.hash(key);
        self.update(hash, |bucket, guard| match bucket.search(hash, key, guard) {
            Some(slot) => {
                let entry = slot.entry();
                match f(&entry.key, entry.value(guard)) {
                    Some(value) => {
                        bucket.set_value(&slot, value.clone(), guard);
                        (Some(value), 0)
                    }
                    None => {
                        bucket.unlink(slot, guard);
                        (None, -1)
                    }
                }
            }
            None => (None, 0),
        })
    }

    /// Insert `value` if `key` is absent, otherwise combine it with the current value using
    /// `f(current, value)`. `f` returning `None` removes the entry. Returns the new value.
    pub fn merge<F>(&self, key: K, value: V, f: F) -> Option<V>
    where
        F: FnOnce(&V, V) -> Option<V>,
    {
        let hash = self.hash(&key);
        self.update(hash, |bucket, guard| match bucket.search(hash, &key, guard) {
            Some(slot) => match f(slot.entry().value(guard), value) {
                Some(merged) => {
                    bucket.set_value(&slot, merged.clone(), guard);
                    (Some(merged), 0)
                }
                None => {
                    bucket.unlink(slot, guard);
                    (None, -1)
                }
            },
            None => {
                bucket.insert(hash, key, value.clone(), guard);
                (Some(value), 1)
            }
        })
    }

    // ============================================================================================
    // WHOLE-MAP OPERATIONS
    // ============================================================================================

    /// Keep entries for which `f` returns `true`; `f` may also edit the value in place.
    ///
    /// Buckets are processed one at a time under their own lock, so each entry is shown to
    /// `f` exactly once even if the table grows meanwhile. Every kept value is written back;
    /// use [`remove_if`](Self::remove_if) when the values are only inspected.
    pub fn retain<F>(&self, mut f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.scan_all(|key, value| {
            let mut value = value.clone();
            if f(key, &mut value) {
                Action::Replace(value)
            } else {
                Action::Remove
            }
        });
    }

    /// Remove entries for which `f` returns `true`. Kept entries are left untouched.
    pub fn remove_if<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.scan_all(|key, value| {
            if f(key, value) {
                Action::Remove
            } else {
                Action::Keep
            }
        });
    }

    /// Replace every value with `f(key, value)`.
    pub fn replace_all<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V) -> V,
    {
        self.scan_all(|key, value| Action::Replace(f(key, value)));
    }

    /// Remove every entry. Entries inserted while the clear is running may survive it.
    pub fn clear(&self) {
        self.scan_all(|_, _| Action::Remove);
    }

    /// Visit every entry without cloning it. Weakly consistent and lock-free.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        let guard = epoch::pin();
        let table = self.load_table(&guard);
        for bucket in table.buckets() {
            let mut current = bucket.head(&guard);
            while let Some(entry) = current {
                f(&entry.key, entry.value(&guard));
                current = entry.next(&guard);
            }
        }
    }

    // ============================================================================================
    // PRIVATE HELPERS
    // ============================================================================================

    #[inline]
    fn hash<Q: ?Sized + Hash>(&self, key: &Q) -> u64 {
        let h = self.hasher.hash_one(key);
        // Fold the high half in so that weak hashers still spread over the low mask bits.
        h ^ (h >> 32)
    }

    /// Lock the bucket for `hash` in the current table, run `op`, and account for the size
    /// change it reports before releasing the lock.
    fn update<R, F>(&self, hash: u64, op: F) -> R
    where
        F: FnOnce(&Locked<'_, K, V>, &Guard) -> (R, isize),
    {
        let guard = epoch::pin();
        let (table, bucket) = self.lock_bucket(hash, &guard);
        let (out, delta) = op(&bucket, &guard);
        self.add_size(delta);
        drop(bucket);
        if delta > 0 {
            self.maybe_grow(table, &guard);
        }
        out
    }

    /// Lock the bucket for `hash`, retrying until the locked bucket belongs to the live
    /// table. A migrated bucket is never written to.
    fn lock_bucket<'g>(&self, hash: u64, guard: &'g Guard) -> (Shared<'g, Table<K, V>>, Locked<'g, K, V>) {
        loop {
            let table = self.table.load(Ordering::Acquire, guard);
            // SAFETY: the table pointer is never null while the map is alive, and a retired
            // table is only destroyed after every guard that could have loaded it is gone.
            let bucket = unsafe { table.deref() }.bucket(hash);
            let locked = bucket.lock();
            if !locked.is_moved() {
                return (table, locked);
            }
            drop(locked);
            self.wait_for_resize(table, bucket, guard);
        }
    }

    fn wait_for_resize<'g>(&self, table: Shared<'g, Table<K, V>>, bucket: &Bucket<K, V>, guard: &'g Guard) {
        trace!("bucket already migrated, waiting for table swap");
        let mut spins = 0;
        while bucket.is_moved() && self.table.load(Ordering::Acquire, guard) == table {
            delay(&mut spins);
        }
    }

    #[inline]
    fn add_size(&self, delta: isize) {
        if delta > 0 {
            self.size.fetch_add(delta as usize, Ordering::Relaxed);
        } else if delta < 0 {
            self.size.fetch_sub((-delta) as usize, Ordering::Relaxed);
        }
    }

    fn maybe_grow<'g>(&self, table: Shared<'g, Table<K, V>>, guard: &'g Guard) {
        let mut table = table;
        loop {
            // SAFETY: see `lock_bucket`.
            let capacity = unsafe { table.deref() }.capacity();
            if capacity >= MAX_CAPACITY || self.len() <= threshold(capacity, self.load_factor) {
                return;
            }
            if self
                .resizing
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // The running resize doubles the table; the next insert re-checks.
                return;
            }
            let current = self.table.load(Ordering::Acquire, guard);
            if current != table {
                // Somebody finished a resize after we inserted. Judge the new table instead.
                self.resizing.store(false, Ordering::Release);
                table = current;
                continue;
            }
            self.transfer(table, guard);
            table = self.table.load(Ordering::Acquire, guard);
        }
    }

    /// Copy `table` into a table twice its size and publish it.
    ///
    /// Buckets are migrated one at a time under their own lock and marked moved; the old
    /// chains are cloned rather than relinked so readers still on the old table see a
    /// complete, unchanging map until the swap.
    fn transfer<'g>(&self, table: Shared<'g, Table<K, V>>, guard: &'g Guard) {
        // SAFETY: see `lock_bucket`.
        let old = unsafe { table.deref() };
        let old_capacity = old.capacity();
        let new_capacity = old_capacity << 1;
        debug!(old_capacity, new_capacity, len = self.len(), "resizing table");

        let mut abort = AbortResize {
            resizing: &self.resizing,
            table: old,
            migrated: 0,
            armed: true,
        };
        let next = Table::new(new_capacity);
        let mut copied = 0;
        for index in 0..old_capacity {
            let bucket = old.bucket_at(index).lock();
            copied += bucket.copy_into(&next, guard);
            bucket.set_moved(true);
            abort.migrated = index + 1;
        }

        let retired = self.table.swap(Owned::new(next), Ordering::AcqRel, guard);
        abort.armed = false;
        // SAFETY: the old table is unreachable for new operations; pinned readers keep it
        // alive until they unpin.
        unsafe { guard.defer_destroy(retired) };
        self.resizing.store(false, Ordering::Release);
        debug!(new_capacity, copied, "resize complete");
    }

    fn scan_all<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V) -> Action<V>,
    {
        let guard = epoch::pin();
        let table = self.table.load(Ordering::Acquire, &guard);
        // SAFETY: see `lock_bucket`.
        let capacity = unsafe { table.deref() }.capacity();
        for index in 0..capacity {
            self.scan_bucket(table, index, &mut f, &guard);
        }
    }

    fn scan_bucket<'g, F>(&self, table: Shared<'g, Table<K, V>>, index: usize, f: &mut F, guard: &'g Guard)
    where
        F: FnMut(&K, &V) -> Action<V>,
    {
        // SAFETY: see `lock_bucket`.
        let current = unsafe { table.deref() };
        let bucket = current.bucket_at(index);
        let locked = bucket.lock();
        if !locked.is_moved() {
            locked.scan(guard, &self.size, &mut *f);
            return;
        }
        drop(locked);
        self.wait_for_resize(table, bucket, guard);

        let next = self.table.load(Ordering::Acquire, guard);
        if next == table {
            // The resize was abandoned and the bucket is live again.
            return self.scan_bucket(table, index, &mut *f, guard);
        }
        // Everything that hashed to `index` now lives at `index + k * capacity`, and nothing
        // else does, so no entry is visited twice.
        let stride = current.capacity();
        // SAFETY: see `lock_bucket`.
        let grown = unsafe { next.deref() }.capacity();
        for next_index in (index..grown).step_by(stride) {
            self.scan_bucket(next, next_index, &mut *f, guard);
        }
    }
}

impl<K, V, S> ConcurrentMap<K, V, S> {
    /// Number of entries. Exact with respect to completed operations.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of buckets in the current table.
    pub fn capacity(&self) -> usize {
        let guard = epoch::pin();
        self.load_table(&guard).capacity()
    }

    /// Entry count above which the current table will be doubled.
    pub fn threshold(&self) -> usize {
        threshold(self.capacity(), self.load_factor)
    }

    pub fn load_factor(&self) -> f32 {
        self.load_factor
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Iterate over cloned key-value pairs. Weakly consistent, see the type docs.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        Iter::new(self)
    }

    pub fn keys(&self) -> Keys<'_, K, V, S> {
        Keys::new(self)
    }

    pub fn values(&self) -> Values<'_, K, V, S> {
        Values::new(self)
    }

    #[inline]
    pub(crate) fn load_table<'g>(&self, guard: &'g Guard) -> &'g Table<K, V> {
        let table = self.table.load(Ordering::Acquire, guard);
        // SAFETY: see `lock_bucket`.
        unsafe { table.deref() }
    }
}

// ================================================================================================
// RESIZE ROLLBACK
// ================================================================================================

/// Undo a half-finished resize if cloning a key or value panics: un-mark the buckets
/// already migrated so writers waiting on them resume against the old table.
struct AbortResize<'a, K, V> {
    resizing: &'a AtomicBool,
    table: &'a Table<K, V>,
    migrated: usize,
    armed: bool,
}

impl<K, V> Drop for AbortResize<'_, K, V> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for index in 0..self.migrated {
            self.table.bucket_at(index).lock().set_moved(false);
        }
        self.resizing.store(false, Ordering::Release);
    }
}

// ================================================================================================
// DROP
// ================================================================================================

impl<K, V, S> Drop for ConcurrentMap<K, V, S> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread holds a reference to the map, and
        // retired tables were handed to the collector already.
        unsafe {
            let guard = epoch::unprotected();
            let table = self.table.swap(Shared::null(), Ordering::Relaxed, guard);
            if !table.is_null() {
                drop(table.into_owned());
            }
        }
    }
}

// ================================================================================================
// STANDARD TRAIT IMPLEMENTATIONS
// ================================================================================================

impl<K, V, S> Default for ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> Clone for ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone,
{
    fn clone(&self) -> Self {
        let config = MapConfig::new()
            .initial_capacity(self.capacity())
            .load_factor(self.load_factor);
        let clone = Self::from_parts(config, self.hasher.clone());
        self.for_each(|k, v| {
            clone.insert(k.clone(), v.clone());
        });
        clone
    }
}

impl<K, V, S> fmt::Debug for ConcurrentMap<K, V, S>
where
    K: fmt::Debug + Clone,
    V: fmt::Debug + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K: Clone, V: Clone, S> IntoIterator for &'a ConcurrentMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = Iter<'a, K, V, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, S> FromIterator<(K, V)> for ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

impl<K, V, S> Extend<(K, V)> for ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V, S> Extend<(K, V)> for &ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

// ================================================================================================
// UTILITY FUNCTIONS
// ================================================================================================

#[inline(always)]
fn try_spin(spins: &mut i32) -> bool {
    if *spins < SPIN_BEFORE_YIELD {
        *spins += *spins + 1;
        std::hint::spin_loop();
        true
    } else {
        false
    }
}

#[inline(always)]
fn delay(spins: &mut i32) {
    if !try_spin(spins) {
        *spins = 0;
        thread::yield_now();
    }
}
