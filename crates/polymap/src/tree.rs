//! Shared substrate for the binary-search-tree engines.
//!
//! Every tree engine stores its entries in [`Node`]s owned through raw
//! pointers: a parent owns its children (allocated with `Box::into_raw`),
//! while `parent` is a non-owning back link. Null means "no node". The
//! substrate provides navigation, rotations, bounded search, order selection,
//! iteration, clearing, and the structural half of verification; engines add
//! only their balancing metadata (`M`), their fixups, and their per-node
//! verification hook.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::ptr;

pub(crate) struct Node<K, V, M> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) meta: M,
    pub(crate) parent: *mut Node<K, V, M>,
    pub(crate) left: *mut Node<K, V, M>,
    pub(crate) right: *mut Node<K, V, M>,
}

impl<K, V, M> Node<K, V, M> {
    pub(crate) fn alloc(key: K, value: V, meta: M, parent: *mut Self) -> *mut Self {
        Box::into_raw(Box::new(Self {
            key,
            value,
            meta,
            parent,
            left: ptr::null_mut(),
            right: ptr::null_mut(),
        }))
    }

    /// Frees the node and hands back its entry. The caller must have already
    /// unlinked it.
    pub(crate) unsafe fn free(node: *mut Self) -> (K, V) {
        let node = unsafe { Box::from_raw(node) };
        (node.key, node.value)
    }
}

/// Shared (&K, &V) projection for nullable node pointers. The caller
/// guarantees the node, if non-null, stays alive for `'a`.
pub(crate) fn entry_ref<'a, K, V, M>(node: *mut Node<K, V, M>) -> Option<(&'a K, &'a V)> {
    if node.is_null() {
        None
    } else {
        unsafe { Some((&(*node).key, &(*node).value)) }
    }
}

pub(crate) struct TreeCore<K, V, M> {
    pub(crate) root: *mut Node<K, V, M>,
    pub(crate) len: usize,
}

impl<K, V, M> TreeCore<K, V, M> {
    pub(crate) fn new() -> Self {
        Self {
            root: ptr::null_mut(),
            len: 0,
        }
    }

    pub(crate) fn first(&self) -> *mut Node<K, V, M> {
        if self.root.is_null() {
            ptr::null_mut()
        } else {
            Self::leftmost(self.root)
        }
    }

    pub(crate) fn last(&self) -> *mut Node<K, V, M> {
        if self.root.is_null() {
            ptr::null_mut()
        } else {
            Self::rightmost(self.root)
        }
    }

    pub(crate) fn leftmost(mut node: *mut Node<K, V, M>) -> *mut Node<K, V, M> {
        debug_assert!(!node.is_null());
        unsafe {
            while !(*node).left.is_null() {
                node = (*node).left;
            }
        }
        node
    }

    pub(crate) fn rightmost(mut node: *mut Node<K, V, M>) -> *mut Node<K, V, M> {
        debug_assert!(!node.is_null());
        unsafe {
            while !(*node).right.is_null() {
                node = (*node).right;
            }
        }
        node
    }

    /// In-order successor, or null at the maximum.
    pub(crate) fn successor(node: *mut Node<K, V, M>) -> *mut Node<K, V, M> {
        unsafe {
            if !(*node).right.is_null() {
                return Self::leftmost((*node).right);
            }
            let mut node = node;
            let mut parent = (*node).parent;
            while !parent.is_null() && (*parent).right == node {
                node = parent;
                parent = (*node).parent;
            }
            parent
        }
    }

    /// In-order predecessor, or null at the minimum.
    pub(crate) fn predecessor(node: *mut Node<K, V, M>) -> *mut Node<K, V, M> {
        unsafe {
            if !(*node).left.is_null() {
                return Self::rightmost((*node).left);
            }
            let mut node = node;
            let mut parent = (*node).parent;
            while !parent.is_null() && (*parent).left == node {
                node = parent;
                parent = (*node).parent;
            }
            parent
        }
    }

    /// Rotates `node` down to the left. `node.right` must exist. Fixes the
    /// three parent links and the root.
    pub(crate) unsafe fn rotate_left(&mut self, node: *mut Node<K, V, M>) {
        unsafe {
            let pivot = (*node).right;
            debug_assert!(!pivot.is_null(), "rotate_left needs a right child");
            (*node).right = (*pivot).left;
            if !(*pivot).left.is_null() {
                (*(*pivot).left).parent = node;
            }
            let parent = (*node).parent;
            (*pivot).parent = parent;
            if parent.is_null() {
                self.root = pivot;
            } else if (*parent).left == node {
                (*parent).left = pivot;
            } else {
                (*parent).right = pivot;
            }
            (*pivot).left = node;
            (*node).parent = pivot;
        }
    }

    /// Mirror of [`rotate_left`](Self::rotate_left); `node.left` must exist.
    pub(crate) unsafe fn rotate_right(&mut self, node: *mut Node<K, V, M>) {
        unsafe {
            let pivot = (*node).left;
            debug_assert!(!pivot.is_null(), "rotate_right needs a left child");
            (*node).left = (*pivot).right;
            if !(*pivot).right.is_null() {
                (*(*pivot).right).parent = node;
            }
            let parent = (*node).parent;
            (*pivot).parent = parent;
            if parent.is_null() {
                self.root = pivot;
            } else if (*parent).left == node {
                (*parent).left = pivot;
            } else {
                (*parent).right = pivot;
            }
            (*pivot).right = node;
            (*node).parent = pivot;
        }
    }

    /// Points `parent`'s link at `old` to `new` instead (or the root when
    /// `parent` is null) and fixes `new`'s back link.
    pub(crate) unsafe fn replace_child(
        &mut self,
        parent: *mut Node<K, V, M>,
        old: *mut Node<K, V, M>,
        new: *mut Node<K, V, M>,
    ) {
        unsafe {
            if parent.is_null() {
                self.root = new;
            } else if (*parent).left == old {
                (*parent).left = new;
            } else {
                debug_assert!((*parent).right == old);
                (*parent).right = new;
            }
            if !new.is_null() {
                (*new).parent = parent;
            }
        }
    }

    /// Hooks `node` under `parent` (on `parent`'s left when `left` holds, at
    /// the root when `parent` is null) and counts it.
    pub(crate) unsafe fn attach(
        &mut self,
        parent: *mut Node<K, V, M>,
        left: bool,
        node: *mut Node<K, V, M>,
    ) {
        unsafe {
            (*node).parent = parent;
            if parent.is_null() {
                self.root = node;
            } else if left {
                (*parent).left = node;
            } else {
                (*parent).right = node;
            }
        }
        self.len += 1;
    }

    /// n-th entry in key order, O(n) from whichever end is nearer.
    pub(crate) fn select(&self, rank: usize) -> *mut Node<K, V, M> {
        if rank >= self.len {
            return ptr::null_mut();
        }
        if rank <= self.len / 2 {
            let mut node = Self::leftmost(self.root);
            for _ in 0..rank {
                node = Self::successor(node);
            }
            node
        } else {
            let mut node = Self::rightmost(self.root);
            for _ in 0..(self.len - 1 - rank) {
                node = Self::predecessor(node);
            }
            node
        }
    }

    /// Iterative post-order teardown using only the child/parent links; no
    /// recursion stack, so arbitrarily deep (splayed) trees are safe.
    pub(crate) fn clear_with(&mut self, mut each: impl FnMut(K, V)) {
        let mut node = self.root;
        unsafe {
            while !node.is_null() {
                if !(*node).left.is_null() {
                    node = (*node).left;
                    continue;
                }
                if !(*node).right.is_null() {
                    node = (*node).right;
                    continue;
                }
                let parent = (*node).parent;
                if !parent.is_null() {
                    if (*parent).left == node {
                        (*parent).left = ptr::null_mut();
                    } else {
                        (*parent).right = ptr::null_mut();
                    }
                }
                let (key, value) = Node::free(node);
                each(key, value);
                node = parent;
            }
        }
        self.root = ptr::null_mut();
        self.len = 0;
    }

    pub(crate) fn traverse(&self, visit: &mut dyn FnMut(&K, &V) -> bool) -> usize {
        let mut visited = 0;
        let mut node = self.first();
        while !node.is_null() {
            visited += 1;
            unsafe {
                if !visit(&(*node).key, &(*node).value) {
                    break;
                }
            }
            node = Self::successor(node);
        }
        visited
    }

    pub(crate) fn iter(&self) -> Iter<'_, K, V, M> {
        Iter {
            front: self.first(),
            back: self.last(),
            done: self.len == 0,
            _tree: PhantomData,
        }
    }
}

impl<K: Ord, V, M> TreeCore<K, V, M> {
    pub(crate) fn find(&self, key: &K) -> *mut Node<K, V, M> {
        let mut node = self.root;
        unsafe {
            while !node.is_null() {
                match key.cmp(&(*node).key) {
                    Ordering::Less => node = (*node).left,
                    Ordering::Greater => node = (*node).right,
                    Ordering::Equal => break,
                }
            }
        }
        node
    }

    /// Locates `key` or the leaf position where it belongs:
    /// `Err((parent, left))` names the null link to attach under.
    pub(crate) fn descend(
        &self,
        key: &K,
    ) -> Result<*mut Node<K, V, M>, (*mut Node<K, V, M>, bool)> {
        let mut parent = ptr::null_mut();
        let mut left = false;
        let mut node = self.root;
        unsafe {
            while !node.is_null() {
                match key.cmp(&(*node).key) {
                    Ordering::Less => {
                        parent = node;
                        left = true;
                        node = (*node).left;
                    }
                    Ordering::Greater => {
                        parent = node;
                        left = false;
                        node = (*node).right;
                    }
                    Ordering::Equal => return Ok(node),
                }
            }
        }
        Err((parent, left))
    }

    /// Greatest key ≤ `key`; records the last node the comparison passed on
    /// the high side.
    pub(crate) fn find_le(&self, key: &K) -> *mut Node<K, V, M> {
        let mut node = self.root;
        let mut candidate = ptr::null_mut();
        unsafe {
            while !node.is_null() {
                match key.cmp(&(*node).key) {
                    Ordering::Less => node = (*node).left,
                    Ordering::Greater => {
                        candidate = node;
                        node = (*node).right;
                    }
                    Ordering::Equal => return node,
                }
            }
        }
        candidate
    }

    pub(crate) fn find_lt(&self, key: &K) -> *mut Node<K, V, M> {
        let mut node = self.root;
        let mut candidate = ptr::null_mut();
        unsafe {
            while !node.is_null() {
                if key.cmp(&(*node).key) == Ordering::Greater {
                    candidate = node;
                    node = (*node).right;
                } else {
                    node = (*node).left;
                }
            }
        }
        candidate
    }

    pub(crate) fn find_ge(&self, key: &K) -> *mut Node<K, V, M> {
        let mut node = self.root;
        let mut candidate = ptr::null_mut();
        unsafe {
            while !node.is_null() {
                match key.cmp(&(*node).key) {
                    Ordering::Less => {
                        candidate = node;
                        node = (*node).left;
                    }
                    Ordering::Greater => node = (*node).right,
                    Ordering::Equal => return node,
                }
            }
        }
        candidate
    }

    pub(crate) fn find_gt(&self, key: &K) -> *mut Node<K, V, M> {
        let mut node = self.root;
        let mut candidate = ptr::null_mut();
        unsafe {
            while !node.is_null() {
                if key.cmp(&(*node).key) == Ordering::Less {
                    candidate = node;
                    node = (*node).left;
                } else {
                    node = (*node).right;
                }
            }
        }
        candidate
    }

    /// Forward iterator seeded at the first key ≥ `key`.
    pub(crate) fn iter_from(&self, key: &K) -> Iter<'_, K, V, M> {
        let front = self.find_ge(key);
        Iter {
            front,
            back: self.last(),
            done: front.is_null(),
            _tree: PhantomData,
        }
    }

    /// Structural half of `verify`: count, strict key order, child back-link
    /// coherence, root parentage, plus an engine hook per node.
    pub(crate) fn verify_structure(
        &self,
        mut hook: impl FnMut(*const Node<K, V, M>) -> bool,
    ) -> bool {
        if self.root.is_null() {
            return self.len == 0;
        }
        unsafe {
            if !(*self.root).parent.is_null() {
                return false;
            }
            let mut seen = 0usize;
            let mut prev: *mut Node<K, V, M> = ptr::null_mut();
            let mut node = Self::leftmost(self.root);
            while !node.is_null() {
                seen += 1;
                let left = (*node).left;
                if !left.is_null() && (*left).parent != node {
                    return false;
                }
                let right = (*node).right;
                if !right.is_null() && (*right).parent != node {
                    return false;
                }
                if !prev.is_null() && (*prev).key.cmp(&(*node).key) != Ordering::Less {
                    return false;
                }
                if !hook(node) {
                    return false;
                }
                prev = node;
                node = Self::successor(node);
            }
            seen == self.len
        }
    }
}

/// In-order cursor pair over a tree. `front`/`back` are the next nodes each
/// direction yields; the borrow on the map keeps the nodes alive and blocks
/// mutation for the iterator's whole lifetime.
pub(crate) struct Iter<'a, K, V, M> {
    front: *mut Node<K, V, M>,
    back: *mut Node<K, V, M>,
    done: bool,
    _tree: PhantomData<&'a TreeCore<K, V, M>>,
}

impl<K, V, M> Clone for Iter<'_, K, V, M> {
    fn clone(&self) -> Self {
        Self {
            front: self.front,
            back: self.back,
            done: self.done,
            _tree: PhantomData,
        }
    }
}

impl<K, V, M> PartialEq for Iter<'_, K, V, M> {
    fn eq(&self, other: &Self) -> bool {
        self.front == other.front && self.back == other.back && self.done == other.done
    }
}

impl<'a, K, V, M> Iterator for Iter<'a, K, V, M> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let node = self.front;
        if node == self.back {
            self.done = true;
        } else {
            self.front = TreeCore::successor(node);
        }
        unsafe { Some((&(*node).key, &(*node).value)) }
    }
}

impl<K, V, M> DoubleEndedIterator for Iter<'_, K, V, M> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let node = self.back;
        if node == self.front {
            self.done = true;
        } else {
            self.back = TreeCore::predecessor(node);
        }
        unsafe { Some((&(*node).key, &(*node).value)) }
    }
}

impl<K, V, M> std::iter::FusedIterator for Iter<'_, K, V, M> {}

/// Shared trait plumbing for the tree engines: entry iterator, seeded
/// iteration, teardown, and the [`crate::SortedMap`] surface. Engines still
/// implement [`crate::Map`] (and their fixups) by hand.
macro_rules! tree_map_shared {
    ($map:ident, $meta:ty) => {
        pub struct Iter<'a, K, V> {
            inner: $crate::tree::Iter<'a, K, V, $meta>,
        }

        impl<K, V> Clone for Iter<'_, K, V> {
            fn clone(&self) -> Self {
                Self {
                    inner: self.inner.clone(),
                }
            }
        }

        impl<K, V> PartialEq for Iter<'_, K, V> {
            fn eq(&self, other: &Self) -> bool {
                self.inner == other.inner
            }
        }

        impl<'a, K, V> Iterator for Iter<'a, K, V> {
            type Item = (&'a K, &'a V);

            fn next(&mut self) -> Option<Self::Item> {
                self.inner.next()
            }
        }

        impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
            fn next_back(&mut self) -> Option<Self::Item> {
                self.inner.next_back()
            }
        }

        impl<K, V> std::iter::FusedIterator for Iter<'_, K, V> {}

        impl<K: Ord, V> $map<K, V> {
            /// Entries in ascending key order; reversible with `.rev()`.
            pub fn iter(&self) -> Iter<'_, K, V> {
                Iter {
                    inner: self.core.iter(),
                }
            }

            /// Entries from the first key ≥ `key` onward.
            pub fn iter_from(&self, key: &K) -> Iter<'_, K, V> {
                Iter {
                    inner: self.core.iter_from(key),
                }
            }
        }

        impl<K: Ord, V> Drop for $map<K, V> {
            fn drop(&mut self) {
                self.core.clear_with(|_, _| ());
            }
        }

        impl<K: Ord, V> $crate::SortedMap for $map<K, V> {
            fn first(&self) -> Option<(&K, &V)> {
                $crate::tree::entry_ref(self.core.first())
            }

            fn last(&self) -> Option<(&K, &V)> {
                $crate::tree::entry_ref(self.core.last())
            }

            fn find_le(&self, key: &K) -> Option<(&K, &V)> {
                $crate::tree::entry_ref(self.core.find_le(key))
            }

            fn find_lt(&self, key: &K) -> Option<(&K, &V)> {
                $crate::tree::entry_ref(self.core.find_lt(key))
            }

            fn find_ge(&self, key: &K) -> Option<(&K, &V)> {
                $crate::tree::entry_ref(self.core.find_ge(key))
            }

            fn find_gt(&self, key: &K) -> Option<(&K, &V)> {
                $crate::tree::entry_ref(self.core.find_gt(key))
            }

            fn select(&self, rank: usize) -> Option<(&K, &V)> {
                $crate::tree::entry_ref(self.core.select(rank))
            }
        }
    };
}

pub(crate) use tree_map_shared;
