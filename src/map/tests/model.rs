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

//! Single-threaded runs of random operations, checked against
//! `std::collections::HashMap`.

use super::util;
use crate::map::HashMap;

use std::collections;

use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Load(u8),
    Store(u8, u32),
    Swap(u8, u32),
    LoadOrStore(u8, u32),
    LoadAndDelete(u8),
    Delete(u8),
    CompareAndSwap(u8, u32, u32),
    CompareAndDelete(u8, u32),
    Range,
    Clear,
}

// few keys and values, so that operations keep running into each other
fn op() -> impl Strategy<Value = Op> {
    let key = 0u8..12;
    let value = 0u32..4;

    prop_oneof![
        6 => key.clone().prop_map(Op::Load),
        4 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::Store(k, v)),
        2 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::Swap(k, v)),
        2 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::LoadOrStore(k, v)),
        2 => key.clone().prop_map(Op::LoadAndDelete),
        2 => key.clone().prop_map(Op::Delete),
        2 => (key.clone(), value.clone(), value.clone())
            .prop_map(|(k, old, new)| Op::CompareAndSwap(k, old, new)),
        2 => (key, value).prop_map(|(k, old)| Op::CompareAndDelete(k, old)),
        1 => Just(Op::Range),
        1 => Just(Op::Clear),
    ]
}

fn apply(map: &HashMap<u8, u32>, model: &mut collections::HashMap<u8, u32>, op: &Op) {
    match *op {
        Op::Load(k) => assert_eq!(map.load(&k), model.get(&k).copied()),
        Op::Store(k, v) => {
            map.store(k, v);
            model.insert(k, v);
        }
        Op::Swap(k, v) => assert_eq!(map.swap(k, v), model.insert(k, v)),
        Op::LoadOrStore(k, v) => {
            let expected = match model.get(&k) {
                Some(&actual) => (actual, true),
                None => {
                    model.insert(k, v);

                    (v, false)
                }
            };

            assert_eq!(map.load_or_store(k, v), expected);
        }
        Op::LoadAndDelete(k) => assert_eq!(map.load_and_delete(&k), model.remove(&k)),
        Op::Delete(k) => {
            map.delete(&k);
            model.remove(&k);
        }
        Op::CompareAndSwap(k, old, new) => {
            let expected = model.get(&k) == Some(&old);

            if expected {
                model.insert(k, new);
            }

            assert_eq!(map.compare_and_swap(&k, &old, new), expected);
        }
        Op::CompareAndDelete(k, old) => {
            let expected = model.get(&k) == Some(&old);

            if expected {
                model.remove(&k);
            }

            assert_eq!(map.compare_and_delete(&k, &old), expected);
        }
        Op::Range => {
            let mut visited = Vec::new();
            map.range(|k, v| {
                visited.push((*k, *v));

                true
            });
            visited.sort_unstable();

            let mut expected: Vec<_> = model.iter().map(|(k, v)| (*k, *v)).collect();
            expected.sort_unstable();

            assert_eq!(visited, expected);
        }
        Op::Clear => {
            map.clear();
            model.clear();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn matches_sequential_model(ops in prop::collection::vec(op(), 1..256)) {
        let map = HashMap::new();
        let mut model = collections::HashMap::new();

        for op in ops.iter() {
            apply(&map, &mut model, op);
            util::check_invariants(&map);
        }

        for k in 0..=u8::MAX {
            prop_assert_eq!(map.load(&k), model.get(&k).copied());
        }

        prop_assert_eq!(map.len(), model.len());
    }
}
