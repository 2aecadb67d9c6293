// MIT License
//
// Copyright (c) 2019 Gregory Meyer
//
// Permission is hereby granted, free of charge, to any person
// obtaining a copy of this software and associated documentation files
// (the "Software"), to deal in the Software without restriction,
// including without limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of the Software,
// and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
// BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
// ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! A concurrent hash map with lockfree reads, tuned for workloads where
//! reads vastly outnumber writes and the key set is mostly stable.

mod entry;


use entry::{Candidate, Entry, Value};

use std::{
    borrow::Borrow,
    fmt::{self, Debug, Formatter},
    hash::{BuildHasher, Hash},
    iter::FromIterator,
    mem,
    sync::{
        atomic::{self, Ordering},
        Arc,
    },
};

use crossbeam_epoch::{self, Atomic, Guard, Owned, Shared};
use log::trace;
use parking_lot::Mutex;

/// Default hasher for `HashMap`.
///
/// This is currently [aHash], a hashing algorithm designed around acceleration
/// by the [AES-NI] instruction set on x86 processors. aHash is not
/// cryptographically secure, but is fast and resistant to DoS attacks.
///
/// [aHash]: https://docs.rs/ahash
/// [AES-NI]: https://en.wikipedia.org/wiki/AES_instruction_set
pub type DefaultHashBuilder = ahash::RandomState;

type EntryMap<K, V, S> = hashbrown::HashMap<K, Arc<Entry<V>>, S>;

/// A concurrent hash map with lockfree reads, tuned for read-mostly access.
///
/// `HashMap` keeps two views of its contents. The *read snapshot* is an
/// immutable table of entries that is swapped in atomically and can be
/// consulted without taking any lock. The *dirty map* is a mutable table
/// guarded by a mutex; it holds every live entry of the snapshot plus the keys
/// inserted since the snapshot was taken. Both tables share the same entries,
/// so updating a key that is already in the snapshot is a single
/// compare-and-swap on its entry and never touches the mutex.
///
/// Lookups that cannot be answered by the snapshot count as *misses*. Once
/// the misses reach the size of the dirty map, the dirty map becomes the new
/// snapshot, so a stable key set is read lock-free again after a bounded
/// number of slow lookups.
///
/// This makes `HashMap` a good fit when keys are written once and read many
/// times, or when threads work on disjoint sets of existing keys. Workloads
/// that keep inserting fresh keys are better served by a map with
/// finer-grained locking.
///
/// Key types must implement [`Hash`], [`Eq`] and [`Clone`]; keys are copied
/// whenever a new dirty map is built from the snapshot. Values are never moved
/// out of the map, since other threads may still be reading them: operations
/// that return a value either clone it or pass a reference to a closure (the
/// `_and` variants).
///
/// Values that are replaced or removed are reclaimed through
/// [`crossbeam_epoch`], once no thread can still observe them.
///
/// [`Hash`]: https://doc.rust-lang.org/std/hash/trait.Hash.html
/// [`Eq`]: https://doc.rust-lang.org/std/cmp/trait.Eq.html
/// [`Clone`]: https://doc.rust-lang.org/std/clone/trait.Clone.html
/// [`crossbeam_epoch`]: https://docs.rs/crossbeam-epoch
pub struct HashMap<K, V, S = DefaultHashBuilder> {
    read: Atomic<ReadOnly<K, V, S>>,
    dirty: Mutex<Dirty<K, V, S>>,
    hash_builder: S,
}

/// An immutable snapshot. Its entries may be updated in place, but the set of
/// keys never changes once it has been installed.
struct ReadOnly<K, V, S> {
    entries: Arc<EntryMap<K, V, S>>,
    // true iff the dirty map holds a key that `entries` does not
    amended: bool,
}

struct Dirty<K, V, S> {
    // `None` means the snapshot is complete
    entries: Option<EntryMap<K, V, S>>,
    misses: usize,
}

impl<K, V> HashMap<K, V, DefaultHashBuilder> {
    /// Creates an empty `HashMap`.
    ///
    /// Nothing is allocated until the first insertion.
    pub fn new() -> HashMap<K, V, DefaultHashBuilder> {
        HashMap::with_hasher(DefaultHashBuilder::default())
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty `HashMap` that will use `hash_builder` to hash keys.
    ///
    /// Every snapshot and dirty map built by this map carries a clone of
    /// `hash_builder`.
    pub fn with_hasher(hash_builder: S) -> HashMap<K, V, S> {
        HashMap {
            read: Atomic::null(),
            dirty: Mutex::new(Dirty {
                entries: None,
                misses: 0,
            }),
            hash_builder,
        }
    }

    /// Returns a reference to this map's hash builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }
}

impl<K: Hash + Eq + Clone, V, S: BuildHasher + Clone> HashMap<K, V, S> {
    /// Returns a copy of the value corresponding to `key`.
    ///
    /// `Q` can be any borrowed form of `K`, but [`Hash`] and [`Eq`] on `Q`
    /// *must* match that of `K`. In addition, `V` must implement [`Clone`], as
    /// the value may be concurrently removed at any moment, so the best we can
    /// do is return a copy of it.
    ///
    /// If your `V` does not implement [`Clone`], you will have to use
    /// [`load_and`] instead.
    ///
    /// [`Hash`]: https://doc.rust-lang.org/std/hash/trait.Hash.html
    /// [`Eq`]: https://doc.rust-lang.org/std/cmp/trait.Eq.html
    /// [`Clone`]: https://doc.rust-lang.org/std/clone/trait.Clone.html
    /// [`load_and`]: #method.load_and
    pub fn load<Q: ?Sized + Hash + Eq>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        V: Clone,
    {
        self.load_and(key, V::clone)
    }

    /// Invokes `func` with a reference to the value corresponding to `key`.
    ///
    /// `func` will only be invoked if there is a value associated with `key`.
    /// If the key was inserted since the last promotion, the lookup takes the
    /// map's lock and counts as a miss.
    ///
    /// `Q` can be any borrowed form of `K`, but [`Hash`] and [`Eq`] on `Q`
    /// *must* match that of `K`.
    ///
    /// [`Hash`]: https://doc.rust-lang.org/std/hash/trait.Hash.html
    /// [`Eq`]: https://doc.rust-lang.org/std/cmp/trait.Eq.html
    pub fn load_and<Q: ?Sized + Hash + Eq, F: FnOnce(&V) -> T, T>(
        &self,
        key: &Q,
        func: F,
    ) -> Option<T>
    where
        K: Borrow<Q>,
    {
        let guard = &crossbeam_epoch::pin();

        self.with_entry(key, false, guard, |entry| entry.get(guard))
            .map(func)
    }

    /// Returns true if there is a value associated with `key`.
    pub fn contains_key<Q: ?Sized + Hash + Eq>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
    {
        self.load_and(key, |_| ()).is_some()
    }

    /// Associates `value` with `key`, discarding any previous value.
    pub fn store(&self, key: K, value: V) {
        self.swap_and(key, value, |_| ());
    }

    /// Associates `value` with `key`, then returns a copy of the previous
    /// value.
    ///
    /// If the key had no value, [`None`] is returned.
    ///
    /// `V` must implement [`Clone`] for this function, as it is possible that
    /// other threads may still hold references to the value previously
    /// associated with `key`. As such, the associated value cannot be moved
    /// from.
    ///
    /// [`None`]: https://doc.rust-lang.org/std/option/enum.Option.html#variant.None
    /// [`Clone`]: https://doc.rust-lang.org/std/clone/trait.Clone.html
    pub fn swap(&self, key: K, value: V) -> Option<V>
    where
        V: Clone,
    {
        self.swap_and(key, value, V::clone)
    }

    /// Associates `value` with `key`, then invokes `func` with the previous
    /// value.
    ///
    /// If the key had no value, [`None`] is returned and `func` is not
    /// invoked.
    ///
    /// If `key` is already in the read snapshot this is a single atomic
    /// update of its entry. Otherwise the map's lock is taken; the first new
    /// key since the last promotion also builds the dirty map, which is
    /// linear in the size of the snapshot.
    ///
    /// [`None`]: https://doc.rust-lang.org/std/option/enum.Option.html#variant.None
    pub fn swap_and<F: FnOnce(&V) -> T, T>(&self, key: K, value: V, func: F) -> Option<T> {
        let guard = &crossbeam_epoch::pin();

        self.do_swap(key, Value::new(value), guard).map(func)
    }

    /// Returns a copy of the value associated with `key` if there is one;
    /// otherwise associates `value` with `key`.
    ///
    /// The returned flag is true if the value was loaded and false if `value`
    /// was stored. When several threads race to store into the same key,
    /// exactly one of them stores and all others load the winner's value.
    pub fn load_or_store(&self, key: K, value: V) -> (V, bool)
    where
        V: Clone,
    {
        self.load_or_store_with_and(key, move || value, |v, loaded| (v.clone(), loaded))
    }

    /// Like [`load_or_store`], but the value to store is only built if `key`
    /// currently has no value.
    ///
    /// `on_store` is invoked at most once and never while the map's lock is
    /// held, so it may call methods on this map. It may be invoked even if
    /// `key` turns out to have a value, for instance when another thread wins
    /// the race to store into it, in which case its result is dropped.
    ///
    /// [`load_or_store`]: #method.load_or_store
    pub fn load_or_store_with<F: FnOnce() -> V>(&self, key: K, on_store: F) -> (V, bool)
    where
        V: Clone,
    {
        self.load_or_store_with_and(key, on_store, |v, loaded| (v.clone(), loaded))
    }

    /// Like [`load_or_store_with`], but invokes `func` with a reference to the
    /// resulting value and the loaded flag instead of cloning the value.
    ///
    /// [`load_or_store_with`]: #method.load_or_store_with
    pub fn load_or_store_with_and<F: FnOnce() -> V, G: FnOnce(&V, bool) -> T, T>(
        &self,
        key: K,
        on_store: F,
        func: G,
    ) -> T {
        let guard = &crossbeam_epoch::pin();
        let (actual, loaded) = self.do_load_or_store(key, Candidate::Pending(on_store), guard);

        func(actual, loaded)
    }

    /// Removes the value associated with `key`, returning a copy of it if
    /// there was one.
    ///
    /// `Q` can be any borrowed form of `K`, but [`Hash`] and [`Eq`] on `Q`
    /// *must* match that of `K`. `V` must implement [`Clone`], as the
    /// previously-associated value cannot be moved from while other threads
    /// may still hold references to it.
    ///
    /// [`Hash`]: https://doc.rust-lang.org/std/hash/trait.Hash.html
    /// [`Eq`]: https://doc.rust-lang.org/std/cmp/trait.Eq.html
    /// [`Clone`]: https://doc.rust-lang.org/std/clone/trait.Clone.html
    pub fn load_and_delete<Q: ?Sized + Hash + Eq>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        V: Clone,
    {
        self.load_and_delete_and(key, V::clone)
    }

    /// Removes the value associated with `key`, then returns the result of
    /// invoking `func` with the previously-associated value.
    ///
    /// Removing a key only clears its entry. The entry itself is retired the
    /// next time a dirty map is built while it is still empty.
    pub fn load_and_delete_and<Q: ?Sized + Hash + Eq, F: FnOnce(&V) -> T, T>(
        &self,
        key: &Q,
        func: F,
    ) -> Option<T>
    where
        K: Borrow<Q>,
    {
        let guard = &crossbeam_epoch::pin();

        self.with_entry(key, true, guard, |entry| entry.delete(guard))
            .map(func)
    }

    /// Removes the value associated with `key`.
    pub fn delete<Q: ?Sized + Hash + Eq>(&self, key: &Q)
    where
        K: Borrow<Q>,
    {
        self.load_and_delete_and(key, |_| ());
    }

    /// Replaces the value associated with `key` with `new` if the current
    /// value equals `old`.
    ///
    /// Returns false without storing anything if `key` has no value or its
    /// value differs from `old`.
    pub fn compare_and_swap<Q: ?Sized + Hash + Eq>(&self, key: &Q, old: &V, new: V) -> bool
    where
        K: Borrow<Q>,
        V: PartialEq,
    {
        let guard = &crossbeam_epoch::pin();

        self.with_entry(key, false, guard, |entry| {
            Some(entry.try_compare_and_swap(old, new, guard))
        })
        .unwrap_or(false)
    }

    /// Removes the value associated with `key` if it equals `old`.
    ///
    /// Returns false if `key` has no value or its value differs from `old`.
    pub fn compare_and_delete<Q: ?Sized + Hash + Eq>(&self, key: &Q, old: &V) -> bool
    where
        K: Borrow<Q>,
        V: PartialEq,
    {
        let guard = &crossbeam_epoch::pin();

        self.with_entry(key, false, guard, |entry| {
            Some(entry.try_compare_and_delete(old, guard))
        })
        .unwrap_or(false)
    }

    /// Invokes `visit` for each key and value in the map, stopping early if
    /// `visit` returns false.
    ///
    /// If keys were inserted since the last promotion, the dirty map is
    /// promoted first so that every key is visible; this costs one pass over
    /// the map per call at most.
    ///
    /// `range` does not take a consistent snapshot. Each key is visited at
    /// most once, but values may reflect writes that happen concurrently with
    /// the traversal, and keys inserted or removed during the traversal may or
    /// may not be visited. `visit` may call any method on this map.
    pub fn range<F: FnMut(&K, &V) -> bool>(&self, mut visit: F) {
        let guard = &crossbeam_epoch::pin();
        let mut read = self.load_read(guard);

        if is_amended(read) {
            let mut dirty = self.dirty.lock();
            read = self.load_read(guard);

            if is_amended(read) {
                self.promote_locked(&mut dirty, guard);
                read = self.load_read(guard);
            }
        }

        let read = match read {
            Some(r) => r,
            None => return,
        };

        for (key, entry) in read.entries.iter() {
            if let Some(value) = entry.get(guard) {
                if !visit(key, value) {
                    break;
                }
            }
        }
    }

    /// Removes every key from the map.
    ///
    /// Both the read snapshot and the dirty map are discarded together while
    /// holding the lock. Writes that race with `clear` through an entry of
    /// the discarded snapshot are lost.
    pub fn clear(&self) {
        let guard = &crossbeam_epoch::pin();

        if is_empty_snapshot(self.load_read(guard)) {
            return;
        }

        let mut dirty = self.dirty.lock();

        if !is_empty_snapshot(self.load_read(guard)) {
            self.install_read(
                ReadOnly {
                    entries: Arc::new(self.new_entry_map(0)),
                    amended: false,
                },
                guard,
            );
        }

        dirty.entries = None;
        dirty.misses = 0;

        trace!("cleared map");
    }

    /// Returns the number of keys that currently have a value.
    ///
    /// This visits every entry with [`range`], so it is linear in the size of
    /// the map and may be inaccurate under concurrent modification.
    ///
    /// [`range`]: #method.range
    pub fn len(&self) -> usize {
        let mut len = 0;
        self.range(|_, _| {
            len += 1;

            true
        });

        len
    }

    /// Returns true if no key currently has a value.
    pub fn is_empty(&self) -> bool {
        let mut is_empty = true;
        self.range(|_, _| {
            is_empty = false;

            false
        });

        is_empty
    }
}

impl<'g, K: 'g + Hash + Eq + Clone, V: 'g, S: 'g + BuildHasher + Clone> HashMap<K, V, S> {
    fn load_read(&self, guard: &'g Guard) -> Option<&'g ReadOnly<K, V, S>> {
        unsafe { self.read.load(Ordering::Acquire, guard).as_ref() }
    }

    fn install_read(&self, read: ReadOnly<K, V, S>, guard: &'g Guard) {
        let previous = self.read.swap(Owned::new(read), Ordering::AcqRel, guard);

        if !previous.is_null() {
            unsafe { guard.defer_destroy(previous) };
        }
    }

    fn new_entry_map(&self, capacity: usize) -> EntryMap<K, V, S> {
        EntryMap::with_capacity_and_hasher(capacity, self.hash_builder.clone())
    }

    /// Looks `key` up in the snapshot, falling back to the dirty map under the
    /// lock if the snapshot is amended, then runs `on_entry` on what was
    /// found. Consulting the dirty map counts as a miss.
    ///
    /// If `remove` is set, a key found only in the dirty map is removed from
    /// it before `on_entry` runs.
    fn with_entry<Q, F, T>(&self, key: &Q, remove: bool, guard: &'g Guard, on_entry: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&Entry<V>) -> Option<T>,
    {
        let read = self.load_read(guard);

        if let Some(entry) = read.and_then(|r| r.entries.get(key)) {
            return on_entry(entry);
        }

        if !is_amended(read) {
            return None;
        }

        let mut dirty = self.dirty.lock();

        // the dirty map may have been promoted while we waited
        let read = self.load_read(guard);

        if let Some(entry) = read.and_then(|r| r.entries.get(key)) {
            mem::drop(dirty);

            return on_entry(entry);
        }

        if !is_amended(read) {
            return None;
        }

        let result = match dirty.entries.as_mut() {
            Some(entries) if remove => entries.remove(key).and_then(|entry| on_entry(&entry)),
            Some(entries) => entries.get(key).and_then(|entry| on_entry(entry)),
            None => None,
        };

        self.miss_locked(&mut dirty, guard);

        result
    }

    fn do_swap(&self, key: K, new: Owned<Value<V>>, guard: &'g Guard) -> Option<&'g V> {
        let read = self.load_read(guard);

        let new = match read.and_then(|r| r.entries.get(&key)) {
            Some(entry) => match entry.try_swap(new, guard) {
                Ok(previous) => return previous,
                Err(new) => new,
            },
            None => new,
        };

        let mut dirty = self.dirty.lock();
        let read = self.load_read(guard);

        if let Some(entry) = read.and_then(|r| r.entries.get(&key)) {
            self.restore_expunged_locked(&mut dirty, read, key, entry, guard);

            return entry.swap_locked(new, guard);
        }

        if let Some(entry) = dirty.entries.as_ref().and_then(|d| d.get(&key)) {
            return entry.swap_locked(new, guard);
        }

        self.insert_new_locked(&mut dirty, read, key, new, guard);

        None
    }

    fn do_load_or_store<F: FnOnce() -> V>(
        &self,
        key: K,
        candidate: Candidate<V, F>,
        guard: &'g Guard,
    ) -> (&'g V, bool) {
        let read = self.load_read(guard);

        let candidate = match read.and_then(|r| r.entries.get(&key)) {
            Some(entry) => match entry.try_load_or_store(candidate, guard) {
                Ok(result) => return result,
                Err(candidate) => candidate,
            },
            None => candidate,
        };

        // on_store may use the map, so it never runs under the lock
        let candidate: Candidate<V, F> = Candidate::Built(candidate.build());

        let mut dirty = self.dirty.lock();
        let read = self.load_read(guard);

        if let Some(entry) = read.and_then(|r| r.entries.get(&key)) {
            self.restore_expunged_locked(&mut dirty, read, key, entry, guard);

            return load_or_store_locked(entry, candidate, guard);
        }

        if let Some(entry) = dirty.entries.as_ref().and_then(|d| d.get(&key)) {
            let result = load_or_store_locked(entry, candidate, guard);
            self.miss_locked(&mut dirty, guard);

            return result;
        }

        (self.insert_new_locked(&mut dirty, read, key, candidate.build(), guard), false)
    }

    /// Puts an expunged snapshot entry back into the dirty map so that it can
    /// be written to again.
    fn restore_expunged_locked(
        &self,
        dirty: &mut Dirty<K, V, S>,
        read: Option<&'g ReadOnly<K, V, S>>,
        key: K,
        entry: &Arc<Entry<V>>,
        guard: &'g Guard,
    ) {
        // only lock holders expunge, so this can't change under us
        if !entry.is_expunged(guard) {
            return;
        }

        self.dirty_locked(dirty, read, guard)
            .insert(key, Arc::clone(entry));

        let was_expunged = entry.unexpunge_locked(guard);
        debug_assert!(was_expunged);
    }

    /// Inserts a key that is in neither the snapshot nor the dirty map,
    /// marking the snapshot as amended if this is the first such key since
    /// the last promotion.
    fn insert_new_locked(
        &self,
        dirty: &mut Dirty<K, V, S>,
        read: Option<&'g ReadOnly<K, V, S>>,
        key: K,
        value: Owned<Value<V>>,
        guard: &'g Guard,
    ) -> &'g V {
        if !is_amended(read) {
            self.dirty_locked(dirty, read, guard);

            let entries = match read {
                Some(r) => Arc::clone(&r.entries),
                None => Arc::new(self.new_entry_map(0)),
            };

            self.install_read(
                ReadOnly {
                    entries,
                    amended: true,
                },
                guard,
            );
        }

        let (entry, stored) = Entry::with_value(value, guard);
        self.dirty_locked(dirty, read, guard)
            .insert(key, Arc::new(entry));

        stored
    }

    /// Returns the dirty map, building it from the snapshot if there is none.
    fn dirty_locked<'d>(
        &self,
        dirty: &'d mut Dirty<K, V, S>,
        read: Option<&'g ReadOnly<K, V, S>>,
        guard: &'g Guard,
    ) -> &'d mut EntryMap<K, V, S> {
        dirty
            .entries
            .get_or_insert_with(|| self.build_dirty(read, guard))
    }

    /// Copies the snapshot's entries into a fresh dirty map.
    ///
    /// Deleted entries are expunged instead of being copied; this is the only
    /// place where entries leave the map for good.
    fn build_dirty(
        &self,
        read: Option<&'g ReadOnly<K, V, S>>,
        guard: &'g Guard,
    ) -> EntryMap<K, V, S> {
        let read = match read {
            Some(r) => r,
            None => return self.new_entry_map(0),
        };

        let mut entries = self.new_entry_map(read.entries.len());
        let mut num_expunged = 0;

        for (key, entry) in read.entries.iter() {
            if entry.try_expunge_locked(guard) {
                num_expunged += 1;
            } else {
                entries.insert(key.clone(), Arc::clone(entry));
            }
        }

        trace!(
            "built dirty map: copied {} entries, expunged {}",
            entries.len(),
            num_expunged
        );

        entries
    }

    fn miss_locked(&self, dirty: &mut Dirty<K, V, S>, guard: &'g Guard) {
        dirty.misses += 1;

        let len = dirty.entries.as_ref().map_or(0, |d| d.len());

        if dirty.misses < len {
            return;
        }

        self.promote_locked(dirty, guard);
    }

    /// Installs the dirty map as the new snapshot. This moves the table, it
    /// does not copy it.
    fn promote_locked(&self, dirty: &mut Dirty<K, V, S>, guard: &'g Guard) {
        let entries = match dirty.entries.take() {
            Some(entries) => entries,
            None => self.new_entry_map(0),
        };

        trace!(
            "promoting dirty map with {} entries after {} misses",
            entries.len(),
            dirty.misses
        );

        self.install_read(
            ReadOnly {
                entries: Arc::new(entries),
                amended: false,
            },
            guard,
        );

        dirty.misses = 0;
    }
}

fn load_or_store_locked<'g, V: 'g, F: FnOnce() -> V>(
    entry: &Entry<V>,
    candidate: Candidate<V, F>,
    guard: &'g Guard,
) -> (&'g V, bool) {
    match entry.try_load_or_store(candidate, guard) {
        Ok(result) => result,
        Err(_) => unreachable!("entry was expunged while the lock was held"),
    }
}

fn is_amended<K, V, S>(read: Option<&ReadOnly<K, V, S>>) -> bool {
    read.map_or(false, |r| r.amended)
}

fn is_empty_snapshot<K, V, S>(read: Option<&ReadOnly<K, V, S>>) -> bool {
    read.map_or(true, |r| r.entries.is_empty() && !r.amended)
}

impl<K, V, S: Default> Default for HashMap<K, V, S> {
    fn default() -> Self {
        HashMap::with_hasher(S::default())
    }
}

impl<K: Hash + Eq + Clone + Debug, V: Debug, S: BuildHasher + Clone> Debug for HashMap<K, V, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        self.range(|k, v| {
            map.entry(k, v);

            true
        });

        map.finish()
    }
}

impl<K: Hash + Eq + Clone, V, S: BuildHasher + Clone> Extend<(K, V)> for HashMap<K, V, S> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.store(key, value);
        }
    }
}

impl<K: Hash + Eq + Clone, V, S: BuildHasher + Clone + Default> FromIterator<(K, V)>
    for HashMap<K, V, S>
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HashMap::default();
        map.extend(iter);

        map
    }
}

impl<K, V, S> Drop for HashMap<K, V, S> {
    fn drop(&mut self) {
        // ensure all loads have the most recent data available
        atomic::fence(Ordering::Acquire);

        let guard = unsafe { crossbeam_epoch::unprotected() };
        let read_ptr: Shared<'_, ReadOnly<K, V, S>> =
            self.read.swap(Shared::null(), Ordering::Relaxed, guard);

        if !read_ptr.is_null() {
            // entries retire their values through the epoch themselves
            mem::drop(unsafe { read_ptr.into_owned() });
        }
    }
}
