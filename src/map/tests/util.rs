// MIT License
//
// Copyright (c) 2020 Gregory Meyer
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

use crate::map::HashMap;

use std::{
    borrow::Borrow,
    fmt::Debug,
    hash::{BuildHasher, Hash},
    ops::Deref,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crossbeam_epoch::Owned;

/// A value that asserts it is dropped exactly once and reports the drop to
/// its parent.
#[derive(Debug)]
pub(crate) struct NoisyDropper<T: ?Sized> {
    parent: Arc<DropNotifier>,
    pub elem: T,
}

impl<T> NoisyDropper<T> {
    pub(crate) fn new(parent: Arc<DropNotifier>, elem: T) -> Self {
        Self { parent, elem }
    }
}

impl<T: ?Sized> Drop for NoisyDropper<T> {
    fn drop(&mut self) {
        assert_eq!(self.parent.dropped.swap(true, Ordering::Relaxed), false);
    }
}

impl<T: ?Sized + PartialEq> PartialEq<T> for NoisyDropper<T> {
    fn eq(&self, other: &T) -> bool {
        &self.elem == other
    }
}

impl<T: ?Sized> Deref for NoisyDropper<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.elem
    }
}

#[derive(Debug)]
pub(crate) struct DropNotifier {
    dropped: AtomicBool,
}

impl DropNotifier {
    pub(crate) fn new() -> Self {
        Self {
            dropped: AtomicBool::new(false),
        }
    }

    pub(crate) fn was_dropped(&self) -> bool {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Pushes enough garbage through this thread's epoch bag that everything
/// retired before the call gets destroyed.
pub(crate) fn run_deferred() {
    for _ in 0..65536 {
        let guard = crossbeam_epoch::pin();

        unsafe { guard.defer_destroy(Owned::new(0).into_shared(&guard)) };

        guard.flush();
    }
}

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What the map looks like on the inside, read while holding its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Internals {
    pub(crate) read_len: usize,
    pub(crate) amended: bool,
    pub(crate) dirty_len: Option<usize>,
    pub(crate) misses: usize,
}

pub(crate) fn internals<K: Hash + Eq + Clone, V, S: BuildHasher + Clone>(
    map: &HashMap<K, V, S>,
) -> Internals {
    let guard = &crossbeam_epoch::pin();
    let dirty = map.dirty.lock();
    let read = map.load_read(guard);

    Internals {
        read_len: read.map_or(0, |r| r.entries.len()),
        amended: read.map_or(false, |r| r.amended),
        dirty_len: dirty.entries.as_ref().map(|d| d.len()),
        misses: dirty.misses,
    }
}

/// Panics if the snapshot and the dirty map disagree with each other.
pub(crate) fn check_invariants<K, V, S>(map: &HashMap<K, V, S>)
where
    K: Hash + Eq + Clone + Debug,
    S: BuildHasher + Clone,
{
    let guard = &crossbeam_epoch::pin();
    let dirty = map.dirty.lock();
    let read = map.load_read(guard);

    match (read, dirty.entries.as_ref()) {
        (Some(read), Some(dirty_entries)) => {
            for (key, entry) in read.entries.iter() {
                if entry.is_expunged(guard) {
                    assert!(!dirty_entries.contains_key(key), "{:?} is expunged", key);

                    continue;
                }

                match dirty_entries.get(key) {
                    Some(dirty_entry) => assert!(Arc::ptr_eq(entry, dirty_entry)),
                    None => panic!("{:?} is missing from the dirty map", key),
                }
            }

            for (key, entry) in dirty_entries.iter() {
                assert!(!entry.is_expunged(guard), "{:?} is expunged", key);

                if !read.entries.contains_key(key) {
                    assert!(read.amended, "{:?} is new but not amended", key);
                }
            }
        }
        (Some(read), None) => {
            assert!(!read.amended);

            for (key, entry) in read.entries.iter() {
                assert!(!entry.is_expunged(guard), "{:?} is expunged", key);
            }
        }
        (None, Some(_)) => panic!("dirty map without a snapshot"),
        (None, None) => (),
    }
}

/// Returns whether the snapshot holds an expunged entry for `key`.
pub(crate) fn is_expunged_in_snapshot<K, V, S, Q>(map: &HashMap<K, V, S>, key: &Q) -> bool
where
    K: Hash + Eq + Clone + Borrow<Q>,
    S: BuildHasher + Clone,
    Q: ?Sized + Hash + Eq,
{
    let guard = &crossbeam_epoch::pin();
    let _dirty = map.dirty.lock();

    map.load_read(guard)
        .and_then(|r| r.entries.get(key))
        .map_or(false, |e| e.is_expunged(guard))
}

/// Returns whether the dirty map currently holds an entry for `key`.
pub(crate) fn is_in_dirty<K, V, S, Q>(map: &HashMap<K, V, S>, key: &Q) -> bool
where
    K: Hash + Eq + Clone + Borrow<Q>,
    S: BuildHasher + Clone,
    Q: ?Sized + Hash + Eq,
{
    map.dirty
        .lock()
        .entries
        .as_ref()
        .map_or(false, |d| d.contains_key(key))
}
