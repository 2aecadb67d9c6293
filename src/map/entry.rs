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

//! Per-key value slots.
//!
//! An [`Entry`] holds one atomically swappable pointer to a heap-allocated
//! value. The pointer encodes three states:
//!
//! * non-null: the key is associated with a value,
//! * null: the key was deleted, but the entry may still be resurrected by a
//!   store because it is reachable from the dirty map (or there is no dirty
//!   map),
//! * null tagged with [`EXPUNGED_TAG`]: the entry was retired while building
//!   a dirty map and is not reachable from it.
//!
//! Raw pointers are always decoded into a [`Slot`] before being inspected.

use std::sync::atomic::Ordering;

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};

const EXPUNGED_TAG: usize = 1;

// alignment of 2 leaves the low bit free for EXPUNGED_TAG
#[repr(align(2))]
pub(crate) struct Value<V> {
    value: V,
}

impl<V> Value<V> {
    pub(crate) fn new(value: V) -> Owned<Value<V>> {
        Owned::new(Value { value })
    }
}

pub(crate) enum Slot<'g, V> {
    Present(&'g V),
    Deleted,
    Expunged,
}

impl<'g, V> Slot<'g, V> {
    fn of(ptr: Shared<'g, Value<V>>) -> Slot<'g, V> {
        if ptr.tag() & EXPUNGED_TAG != 0 {
            debug_assert!(ptr.is_null());

            return Slot::Expunged;
        }

        match unsafe { ptr.as_ref() } {
            Some(v) => Slot::Present(&v.value),
            None => Slot::Deleted,
        }
    }
}

/// A value that has not been allocated yet.
///
/// `load_or_store_with` only runs its closure once it has seen an empty slot;
/// if the entry then turns out to be expunged the already-built value is
/// handed back so the slow path can reuse it.
pub(crate) enum Candidate<V, F> {
    Pending(F),
    Built(Owned<Value<V>>),
}

impl<V, F: FnOnce() -> V> Candidate<V, F> {
    pub(crate) fn build(self) -> Owned<Value<V>> {
        match self {
            Candidate::Pending(on_store) => Value::new(on_store()),
            Candidate::Built(owned) => owned,
        }
    }
}

pub(crate) struct Entry<V> {
    slot: Atomic<Value<V>>,
}

impl<'g, V: 'g> Entry<V> {
    /// Creates an entry holding `value`, along with a reference to the stored
    /// value that stays valid for the lifetime of `guard`.
    pub(crate) fn with_value(value: Owned<Value<V>>, guard: &'g Guard) -> (Entry<V>, &'g V) {
        let value_ptr = value.into_shared(guard);
        let entry = Entry {
            slot: Atomic::from(value_ptr),
        };

        (entry, unsafe { &value_ptr.deref().value })
    }

    pub(crate) fn load(&self, guard: &'g Guard) -> Slot<'g, V> {
        Slot::of(self.slot.load(Ordering::Acquire, guard))
    }

    pub(crate) fn get(&self, guard: &'g Guard) -> Option<&'g V> {
        match self.load(guard) {
            Slot::Present(v) => Some(v),
            Slot::Deleted | Slot::Expunged => None,
        }
    }

    pub(crate) fn is_expunged(&self, guard: &'g Guard) -> bool {
        matches!(self.load(guard), Slot::Expunged)
    }

    /// Replaces the value unless this entry is expunged, returning the
    /// previous value if there was one.
    ///
    /// If the entry is expunged, `new` is handed back untouched.
    pub(crate) fn try_swap(
        &self,
        mut new: Owned<Value<V>>,
        guard: &'g Guard,
    ) -> Result<Option<&'g V>, Owned<Value<V>>> {
        let mut current = self.slot.load(Ordering::Acquire, guard);

        loop {
            if let Slot::Expunged = Slot::of(current) {
                return Err(new);
            }

            match self.slot.compare_exchange_weak(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => return Ok(unsafe { retire(current, guard) }),
                Err(e) => {
                    current = e.current;
                    new = e.new;
                }
            }
        }
    }

    /// Unconditionally replaces the value. The entry must not be expunged,
    /// which only holders of the map's lock can guarantee.
    pub(crate) fn swap_locked(&self, new: Owned<Value<V>>, guard: &'g Guard) -> Option<&'g V> {
        let previous = self.slot.swap(new, Ordering::AcqRel, guard);
        debug_assert_eq!(previous.tag(), 0);

        unsafe { retire(previous, guard) }
    }

    /// Returns the current value if there is one; otherwise tries to store the
    /// candidate.
    ///
    /// `Ok((value, true))` is a loaded value, `Ok((value, false))` is the
    /// value that was just stored. An expunged entry yields `Err` with the
    /// candidate, built or not.
    pub(crate) fn try_load_or_store<F: FnOnce() -> V>(
        &self,
        candidate: Candidate<V, F>,
        guard: &'g Guard,
    ) -> Result<(&'g V, bool), Candidate<V, F>> {
        let mut current = self.slot.load(Ordering::Acquire, guard);

        match Slot::of(current) {
            Slot::Present(v) => return Ok((v, true)),
            Slot::Expunged => return Err(candidate),
            Slot::Deleted => (),
        }

        let mut new = candidate.build();

        loop {
            match self.slot.compare_exchange_weak(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(stored) => return Ok((unsafe { &stored.deref().value }, false)),
                Err(e) => {
                    current = e.current;
                    new = e.new;

                    match Slot::of(current) {
                        Slot::Present(v) => return Ok((v, true)),
                        Slot::Expunged => return Err(Candidate::Built(new)),
                        Slot::Deleted => (),
                    }
                }
            }
        }
    }

    /// Clears the value, returning it if there was one.
    pub(crate) fn delete(&self, guard: &'g Guard) -> Option<&'g V> {
        let mut current = self.slot.load(Ordering::Acquire, guard);

        loop {
            match Slot::of(current) {
                Slot::Deleted | Slot::Expunged => return None,
                Slot::Present(_) => (),
            }

            match self.slot.compare_exchange_weak(
                current,
                Shared::null(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => return unsafe { retire(current, guard) },
                Err(e) => current = e.current,
            }
        }
    }

    /// Transitions an expunged entry back to deleted. Returns true if the
    /// entry was expunged.
    ///
    /// Must only be called with the map's lock held; the entry has to be put
    /// back into the dirty map before the lock is released.
    pub(crate) fn unexpunge_locked(&self, guard: &'g Guard) -> bool {
        self.slot
            .compare_exchange(
                Shared::null().with_tag(EXPUNGED_TAG),
                Shared::null(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            )
            .is_ok()
    }

    /// Transitions a deleted entry to expunged. Returns true if the entry is
    /// expunged afterwards.
    ///
    /// Must only be called with the map's lock held, while building a dirty
    /// map.
    pub(crate) fn try_expunge_locked(&self, guard: &'g Guard) -> bool {
        let mut current = self.slot.load(Ordering::Acquire, guard);

        while current.is_null() && current.tag() == 0 {
            match self.slot.compare_exchange(
                current,
                Shared::null().with_tag(EXPUNGED_TAG),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => return true,
                Err(e) => current = e.current,
            }
        }

        current.tag() & EXPUNGED_TAG != 0
    }
}

impl<'g, V: 'g + PartialEq> Entry<V> {
    /// Replaces the value with `new` if it currently equals `old`.
    pub(crate) fn try_compare_and_swap(&self, old: &V, new: V, guard: &'g Guard) -> bool {
        let mut current = self.slot.load(Ordering::Acquire, guard);

        match Slot::of(current) {
            Slot::Present(v) if v == old => (),
            _ => return false,
        }

        // allocate once, outside of the retry loop
        let mut new = Value::new(new);

        loop {
            match self.slot.compare_exchange_weak(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    unsafe { retire(current, guard) };

                    return true;
                }
                Err(e) => {
                    current = e.current;
                    new = e.new;

                    match Slot::of(current) {
                        Slot::Present(v) if v == old => (),
                        _ => return false,
                    }
                }
            }
        }
    }

    /// Clears the value if it currently equals `old`.
    pub(crate) fn try_compare_and_delete(&self, old: &V, guard: &'g Guard) -> bool {
        let mut current = self.slot.load(Ordering::Acquire, guard);

        loop {
            match Slot::of(current) {
                Slot::Present(v) if v == old => (),
                _ => return false,
            }

            match self.slot.compare_exchange_weak(
                current,
                Shared::null(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    unsafe { retire(current, guard) };

                    return true;
                }
                Err(e) => current = e.current,
            }
        }
    }
}

impl<V> Drop for Entry<V> {
    fn drop(&mut self) {
        // a reader may have loaded the value through a snapshot or an Arc
        // that has since been released, so the value still goes through the
        // epoch
        let guard = &crossbeam_epoch::pin();
        let ptr = self
            .slot
            .swap(Shared::null(), Ordering::Acquire, guard)
            .with_tag(0);

        if !ptr.is_null() {
            unsafe { guard.defer_destroy(ptr) };
        }
    }
}

/// Schedules a value that was just unlinked from a slot for destruction and
/// returns a reference to it that is valid for the lifetime of `guard`.
///
/// # Safety
///
/// `ptr` must have been unlinked by the caller's successful swap or CAS, so
/// that no other thread will retire it as well.
unsafe fn retire<'g, V>(ptr: Shared<'g, Value<V>>, guard: &'g Guard) -> Option<&'g V> {
    if ptr.is_null() {
        return None;
    }

    guard.defer_destroy(ptr);

    Some(&ptr.deref().value)
}
