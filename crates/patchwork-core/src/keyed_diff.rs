//! Keyed reconciliation of two sibling lists.
//!
//! The diff walks four cursors inward from both ends of the old and new
//! lists, comparing the four end pairs. When none of them match, it falls
//! back to a key to old-index map built once per pass. Matched old entries
//! are tombstoned so they are never visited twice. Once either range is
//! exhausted the remainder is created or removed in bulk.
//!
//! Keyless nodes are only ever matched head to head or tail to tail.

use crate::collections::map::{HashMap, HashSet};
use crate::vnode::VKey;

/// Where a created or moved node should land, in terms of the lists being
/// diffed. Resolved to a host node by the [`ListPatcher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    /// Before the realized node of an old entry.
    BeforeOld(usize),
    /// Right after the realized node of an old entry.
    AfterOld(usize),
    /// Before the realized node of an already patched new entry.
    BeforeNew(usize),
    /// Append to the parent.
    End,
}

/// The operations the diff needs from whoever owns the lists.
pub trait ListPatcher {
    fn old_len(&self) -> usize;
    fn new_len(&self) -> usize;
    fn old_key(&self, index: usize) -> Option<&VKey>;
    fn new_key(&self, index: usize) -> Option<&VKey>;
    /// Whether the old entry can be patched into the new one.
    fn same(&self, old: usize, new: usize) -> bool;
    fn patch(&mut self, old: usize, new: usize);
    fn move_before(&mut self, new: usize, anchor: Anchor);
    fn create(&mut self, new: usize, anchor: Anchor);
    fn remove(&mut self, old: usize);

    fn warn(&self, message: &str) {
        log::warn!("[patchwork] {message}");
    }
}

#[derive(Clone, Copy, Debug)]
pub struct KeyedDiff {
    can_move: bool,
}

impl Default for KeyedDiff {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyedDiff {
    pub fn new() -> Self {
        Self { can_move: true }
    }

    /// Patches and removes but never moves; the order of the surviving
    /// nodes must already match.
    pub fn remove_only() -> Self {
        Self { can_move: false }
    }

    pub fn run<P: ListPatcher + ?Sized>(&self, list: &mut P) {
        check_duplicate_keys(list);

        let mut consumed = vec![false; list.old_len()];
        let mut key_map: Option<HashMap<VKey, usize>> = None;
        let (mut old_start, mut old_end) = (0, list.old_len());
        let (mut new_start, mut new_end) = (0, list.new_len());

        while old_start < old_end && new_start < new_end {
            if consumed[old_start] {
                old_start += 1;
            } else if consumed[old_end - 1] {
                old_end -= 1;
            } else if list.same(old_start, new_start) {
                list.patch(old_start, new_start);
                old_start += 1;
                new_start += 1;
            } else if list.same(old_end - 1, new_end - 1) {
                list.patch(old_end - 1, new_end - 1);
                old_end -= 1;
                new_end -= 1;
            } else if list.old_key(old_start).is_some() && list.same(old_start, new_end - 1) {
                // Old head moved to the tail.
                list.patch(old_start, new_end - 1);
                if self.can_move {
                    list.move_before(new_end - 1, Anchor::AfterOld(old_end - 1));
                }
                old_start += 1;
                new_end -= 1;
            } else if list.old_key(old_end - 1).is_some() && list.same(old_end - 1, new_start) {
                // Old tail moved to the head.
                list.patch(old_end - 1, new_start);
                if self.can_move {
                    list.move_before(new_start, Anchor::BeforeOld(old_start));
                }
                old_end -= 1;
                new_start += 1;
            } else {
                let map = key_map.get_or_insert_with(|| build_key_map(list, old_start, old_end));
                let matched = list
                    .new_key(new_start)
                    .and_then(|key| map.get(key).copied())
                    .filter(|index| {
                        (old_start..old_end).contains(index) && !consumed[*index]
                    });
                match matched {
                    Some(index) if list.same(index, new_start) => {
                        list.patch(index, new_start);
                        consumed[index] = true;
                        if self.can_move {
                            list.move_before(new_start, Anchor::BeforeOld(old_start));
                        }
                    }
                    // Same key but a different element: treat as new.
                    _ => list.create(new_start, Anchor::BeforeOld(old_start)),
                }
                new_start += 1;
            }
        }

        if old_start >= old_end {
            let anchor = if new_end < list.new_len() {
                Anchor::BeforeNew(new_end)
            } else {
                Anchor::End
            };
            for index in new_start..new_end {
                list.create(index, anchor);
            }
        } else if new_start >= new_end {
            for index in old_start..old_end {
                if !consumed[index] {
                    list.remove(index);
                }
            }
        }
    }
}

fn build_key_map<P: ListPatcher + ?Sized>(
    list: &P,
    start: usize,
    end: usize,
) -> HashMap<VKey, usize> {
    let mut map = HashMap::default();
    for index in start..end {
        if let Some(key) = list.old_key(index) {
            // First occurrence wins; later duplicates are never matched.
            map.entry(key.clone()).or_insert(index);
        }
    }
    map
}

fn check_duplicate_keys<P: ListPatcher + ?Sized>(list: &P) {
    let mut seen: HashSet<&VKey> = HashSet::default();
    for index in 0..list.new_len() {
        if let Some(key) = list.new_key(index) {
            if !seen.insert(key) {
                list.warn(&format!(
                    "Duplicate keys detected: '{key}'. This may cause an update error."
                ));
            }
        }
    }
}

/// One step of a list reconciliation, as produced by [`plan`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListOp {
    Patch { old: usize, new: usize },
    Move { new: usize, anchor: Anchor },
    Create { new: usize, anchor: Anchor },
    Remove { old: usize },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub patched: usize,
    pub moved: usize,
    pub created: usize,
    pub removed: usize,
}

impl DiffStats {
    pub fn from_ops(ops: &[ListOp]) -> Self {
        let mut stats = Self::default();
        for op in ops {
            stats.record(op);
        }
        stats
    }

    pub(crate) fn record(&mut self, op: &ListOp) {
        match op {
            ListOp::Patch { .. } => self.patched += 1,
            ListOp::Move { .. } => self.moved += 1,
            ListOp::Create { .. } => self.created += 1,
            ListOp::Remove { .. } => self.removed += 1,
        }
    }
}

struct KeyPlan<'a> {
    old: &'a [Option<VKey>],
    new: &'a [Option<VKey>],
    ops: Vec<ListOp>,
}

impl ListPatcher for KeyPlan<'_> {
    fn old_len(&self) -> usize {
        self.old.len()
    }

    fn new_len(&self) -> usize {
        self.new.len()
    }

    fn old_key(&self, index: usize) -> Option<&VKey> {
        self.old[index].as_ref()
    }

    fn new_key(&self, index: usize) -> Option<&VKey> {
        self.new[index].as_ref()
    }

    fn same(&self, old: usize, new: usize) -> bool {
        self.old[old] == self.new[new]
    }

    fn patch(&mut self, old: usize, new: usize) {
        self.ops.push(ListOp::Patch { old, new });
    }

    fn move_before(&mut self, new: usize, anchor: Anchor) {
        self.ops.push(ListOp::Move { new, anchor });
    }

    fn create(&mut self, new: usize, anchor: Anchor) {
        self.ops.push(ListOp::Create { new, anchor });
    }

    fn remove(&mut self, old: usize) {
        self.ops.push(ListOp::Remove { old });
    }
}

/// Runs the diff over bare key lists, treating equal keys (or two missing
/// keys) as the same node.
pub fn plan(old: &[Option<VKey>], new: &[Option<VKey>]) -> Vec<ListOp> {
    let mut list = KeyPlan {
        old,
        new,
        ops: Vec::new(),
    };
    KeyedDiff::new().run(&mut list);
    list.ops
}

#[cfg(test)]
#[path = "tests/keyed_diff_tests.rs"]
mod tests;
