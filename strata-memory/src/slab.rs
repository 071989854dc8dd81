// Copyright 2026 strata Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! An arena of slots with circular lists threaded through them.
//!
//! A slot that is not linked anywhere forms a list of its own.

use std::num::NonZeroU32;

/// Index of a slot, `1`-based so that `Option<Token>` stays 4 bytes wide.
pub type Token = NonZeroU32;

#[derive(Debug)]
struct Slot<T> {
    item: Option<T>,
    /// Next slot of the list, or next free slot if `item` is `None`.
    next: Token,
    /// Previous slot of the list. Unused if `item` is `None`.
    prev: Token,
}

#[derive(Debug)]
pub struct LinkedSlab<T> {
    slots: Vec<Slot<T>>,
    next_free: Token,
    len: usize,
}

impl<T> Default for LinkedSlab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LinkedSlab<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            next_free: Token::MIN,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg_attr(not(test), expect(dead_code))]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn slot(&self, token: Token) -> &Slot<T> {
        &self.slots[token.get() as usize - 1]
    }

    fn slot_mut(&mut self, token: Token) -> &mut Slot<T> {
        &mut self.slots[token.get() as usize - 1]
    }

    /// Stores `item` in a free slot, as a list only containing itself.
    ///
    /// # Panics
    ///
    /// Panics if the slab holds `u32::MAX` items.
    pub fn insert(&mut self, item: T) -> Token {
        let token = self.next_free;
        let idx = token.get() as usize - 1;
        if idx < self.slots.len() {
            let slot = &mut self.slots[idx];
            debug_assert!(slot.item.is_none());
            self.next_free = slot.next;
            *slot = Slot {
                item: Some(item),
                next: token,
                prev: token,
            };
        } else {
            debug_assert_eq!(idx, self.slots.len());
            self.next_free = token.checked_add(1).unwrap_or_else(|| panic!("slab capacity overflow"));
            self.slots.push(Slot {
                item: Some(item),
                next: token,
                prev: token,
            });
        }
        self.len += 1;
        token
    }

    pub fn get(&self, token: Token) -> Option<&T> {
        self.slots.get(token.get() as usize - 1)?.item.as_ref()
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut T> {
        self.slots.get_mut(token.get() as usize - 1)?.item.as_mut()
    }

    /// Whether the slot at `token` forms a list of its own.
    #[cfg_attr(not(test), expect(dead_code))]
    pub fn is_alone(&self, token: Token) -> bool {
        self.slot(token).next == token
    }

    /// Links the item at `token` right before `head`, i.e. at the tail of the list of `head`.
    ///
    /// The item must not be linked into any other list.
    pub fn link(&mut self, token: Token, head: Option<Token>) {
        debug_assert!(self.slot(token).item.is_some());
        debug_assert_eq!(self.slot(token).next, token);
        let Some(head) = head else {
            return;
        };
        let tail = self.slot(head).prev;
        self.slot_mut(head).prev = token;
        self.slot_mut(tail).next = token;
        let slot = self.slot_mut(token);
        slot.prev = tail;
        slot.next = head;
    }

    /// Unlinks the item at `token` from its list. Returns the item that followed it, if not itself.
    pub fn unlink(&mut self, token: Token) -> Option<Token> {
        let (prev, next) = {
            let slot = self.slot(token);
            debug_assert!(slot.item.is_some());
            (slot.prev, slot.next)
        };
        if next == token {
            debug_assert_eq!(prev, token);
            return None;
        }
        self.slot_mut(next).prev = prev;
        self.slot_mut(prev).next = next;
        let slot = self.slot_mut(token);
        (slot.prev, slot.next) = (token, token);
        Some(next)
    }

    /// Unlinks and removes the item at `token`.
    pub fn remove(&mut self, token: Token) -> Option<T> {
        self.get(token)?;
        self.unlink(token);
        let next_free = self.next_free;
        let slot = self.slot_mut(token);
        let item = slot.item.take();
        slot.next = next_free;
        self.next_free = token;
        self.len -= 1;
        item
    }

    /// Items with their tokens, starting right after `continuation`.
    pub fn iter_from(&self, continuation: Option<Token>) -> impl Iterator<Item = (Token, &T)> + '_ {
        let skip = continuation.map_or(0, |c| c.get() as usize);
        self.slots
            .iter()
            .enumerate()
            .skip(skip)
            .filter_map(|(i, slot)| Some((Token::new(i as u32 + 1)?, slot.item.as_ref()?)))
    }

    /// All occupied tokens.
    pub fn tokens(&self) -> Vec<Token> {
        self.iter_from(None).map(|(token, _)| token).collect()
    }

    /// Walks the list starting at `head`, in order.
    #[cfg(test)]
    pub fn walk(&self, head: Option<Token>) -> Vec<Token> {
        let mut res = vec![];
        if let Some(head) = head {
            let mut cur = head;
            loop {
                res.push(cur);
                cur = self.slot(cur).next;
                if cur == head {
                    break;
                }
            }
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_at_tail() {
        let mut slab = LinkedSlab::new();
        let a = slab.insert("a");
        let b = slab.insert("b");
        let c = slab.insert("c");
        assert!(slab.is_alone(a));

        slab.link(b, Some(a));
        slab.link(c, Some(a));
        assert_eq!(slab.walk(Some(a)), vec![a, b, c]);
        assert!(!slab.is_alone(a));

        assert_eq!(slab.unlink(b), Some(c));
        assert_eq!(slab.walk(Some(a)), vec![a, c]);
        assert!(slab.is_alone(b));

        assert_eq!(slab.unlink(a), Some(c));
        assert_eq!(slab.walk(Some(c)), vec![c]);
        assert_eq!(slab.unlink(c), None);
    }

    #[test]
    fn test_remove_reuses_slot() {
        let mut slab = LinkedSlab::new();
        let a = slab.insert(1);
        let b = slab.insert(2);
        slab.link(b, Some(a));
        assert_eq!(slab.len(), 2);

        assert_eq!(slab.remove(a), Some(1));
        assert_eq!(slab.remove(a), None);
        assert_eq!(slab.walk(Some(b)), vec![b]);
        assert_eq!(slab.len(), 1);

        let c = slab.insert(3);
        assert_eq!(c, a);
        assert_eq!(slab.get(c), Some(&3));
        assert_eq!(slab.tokens(), vec![a, b]);
        assert!(!slab.is_empty());
    }

    #[test]
    fn test_iter_from() {
        let mut slab = LinkedSlab::new();
        let tokens = (0..10).map(|i| slab.insert(i)).collect::<Vec<_>>();
        slab.remove(tokens[3]);

        let first = slab.iter_from(None).take(4).collect::<Vec<_>>();
        assert_eq!(first.iter().map(|(_, v)| **v).collect::<Vec<_>>(), vec![0, 1, 2, 4]);
        let continuation = first.last().map(|(t, _)| *t);
        let rest = slab.iter_from(continuation).map(|(_, v)| *v).collect::<Vec<_>>();
        assert_eq!(rest, vec![5, 6, 7, 8, 9]);
    }
}
