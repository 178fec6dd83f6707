//! Red-black tree engine.
//!
//! Classic two-color scheme: new nodes are red, the root is black, no red
//! node has a red child, and every root-to-leaf path crosses the same number
//! of black nodes. Null links stand in for the shared nil leaf and read as
//! black. Insert fixup walks grandparent/uncle cases; delete fixup resolves
//! the double-black replacement (possibly null) through the four sibling
//! cases per side.

use std::mem;

use crate::tree::{self, Node, TreeCore};
use crate::Map;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Color {
    Red,
    Black,
}

type RbNode<K, V> = Node<K, V, Color>;

pub struct RbTreeMap<K: Ord, V> {
    core: TreeCore<K, V, Color>,
}

tree::tree_map_shared!(RbTreeMap, Color);

impl<K: Ord, V> RbTreeMap<K, V> {
    pub fn new() -> Self {
        Self {
            core: TreeCore::new(),
        }
    }

    fn is_red(node: *const RbNode<K, V>) -> bool {
        !node.is_null() && unsafe { (*node).meta == Color::Red }
    }

    fn probe_insert(&mut self, key: K, value: V) -> (*mut RbNode<K, V>, bool, Option<V>) {
        match self.core.descend(&key) {
            Ok(node) => (node, false, Some(value)),
            Err((parent, left)) => unsafe {
                let node = Node::alloc(key, value, Color::Red, parent);
                self.core.attach(parent, left, node);
                self.insert_fixup(node);
                (node, true, None)
            },
        }
    }

    unsafe fn insert_fixup(&mut self, mut node: *mut RbNode<K, V>) {
        unsafe {
            while Self::is_red((*node).parent) {
                let parent = (*node).parent;
                // A red parent is never the root, so the grandparent exists.
                let grand = (*parent).parent;
                if parent == (*grand).left {
                    let uncle = (*grand).right;
                    if Self::is_red(uncle) {
                        (*parent).meta = Color::Black;
                        (*uncle).meta = Color::Black;
                        (*grand).meta = Color::Red;
                        node = grand;
                    } else {
                        if node == (*parent).right {
                            node = parent;
                            self.core.rotate_left(node);
                        }
                        let parent = (*node).parent;
                        let grand = (*parent).parent;
                        (*parent).meta = Color::Black;
                        (*grand).meta = Color::Red;
                        self.core.rotate_right(grand);
                    }
                } else {
                    let uncle = (*grand).left;
                    if Self::is_red(uncle) {
                        (*parent).meta = Color::Black;
                        (*uncle).meta = Color::Black;
                        (*grand).meta = Color::Red;
                        node = grand;
                    } else {
                        if node == (*parent).left {
                            node = parent;
                            self.core.rotate_right(node);
                        }
                        let parent = (*node).parent;
                        let grand = (*parent).parent;
                        (*parent).meta = Color::Black;
                        (*grand).meta = Color::Red;
                        self.core.rotate_left(grand);
                    }
                }
            }
            (*self.core.root).meta = Color::Black;
        }
    }

    unsafe fn remove_node(&mut self, mut node: *mut RbNode<K, V>) -> (K, V) {
        unsafe {
            if !(*node).left.is_null() && !(*node).right.is_null() {
                let successor = TreeCore::leftmost((*node).right);
                mem::swap(&mut (*node).key, &mut (*successor).key);
                mem::swap(&mut (*node).value, &mut (*successor).value);
                node = successor;
            }
            let child = if (*node).left.is_null() {
                (*node).right
            } else {
                (*node).left
            };
            let parent = (*node).parent;
            let was_left = !parent.is_null() && (*parent).left == node;
            self.core.replace_child(parent, node, child);
            self.core.len -= 1;
            if (*node).meta == Color::Black {
                if Self::is_red(child) {
                    // A red child absorbs the missing black.
                    (*child).meta = Color::Black;
                } else {
                    self.remove_fixup(child, parent, was_left);
                }
            }
            Node::free(node)
        }
    }

    /// `node` (possibly null) carries a double black under `parent`;
    /// `node_is_left` disambiguates the side while `node` is null.
    unsafe fn remove_fixup(
        &mut self,
        mut node: *mut RbNode<K, V>,
        mut parent: *mut RbNode<K, V>,
        mut node_is_left: bool,
    ) {
        unsafe {
            while !parent.is_null() && !Self::is_red(node) {
                if node_is_left {
                    // Sibling exists: the removed side was black-height ≥ 1.
                    let mut sibling = (*parent).right;
                    if Self::is_red(sibling) {
                        (*sibling).meta = Color::Black;
                        (*parent).meta = Color::Red;
                        self.core.rotate_left(parent);
                        sibling = (*parent).right;
                    }
                    if !Self::is_red((*sibling).left) && !Self::is_red((*sibling).right) {
                        (*sibling).meta = Color::Red;
                        node = parent;
                        parent = (*node).parent;
                    } else {
                        if !Self::is_red((*sibling).right) {
                            (*(*sibling).left).meta = Color::Black;
                            (*sibling).meta = Color::Red;
                            self.core.rotate_right(sibling);
                            sibling = (*parent).right;
                        }
                        (*sibling).meta = (*parent).meta;
                        (*parent).meta = Color::Black;
                        (*(*sibling).right).meta = Color::Black;
                        self.core.rotate_left(parent);
                        node = self.core.root;
                        parent = std::ptr::null_mut();
                    }
                } else {
                    let mut sibling = (*parent).left;
                    if Self::is_red(sibling) {
                        (*sibling).meta = Color::Black;
                        (*parent).meta = Color::Red;
                        self.core.rotate_right(parent);
                        sibling = (*parent).left;
                    }
                    if !Self::is_red((*sibling).left) && !Self::is_red((*sibling).right) {
                        (*sibling).meta = Color::Red;
                        node = parent;
                        parent = (*node).parent;
                    } else {
                        if !Self::is_red((*sibling).left) {
                            (*(*sibling).right).meta = Color::Black;
                            (*sibling).meta = Color::Red;
                            self.core.rotate_left(sibling);
                            sibling = (*parent).left;
                        }
                        (*sibling).meta = (*parent).meta;
                        (*parent).meta = Color::Black;
                        (*(*sibling).left).meta = Color::Black;
                        self.core.rotate_right(parent);
                        node = self.core.root;
                        parent = std::ptr::null_mut();
                    }
                }
                node_is_left = !parent.is_null() && (*parent).left == node;
            }
            if !node.is_null() {
                (*node).meta = Color::Black;
            }
        }
    }

    /// Black height when the subtree is a legal red-black tree.
    fn check_colors(node: *const RbNode<K, V>) -> Option<u32> {
        if node.is_null() {
            return Some(1);
        }
        unsafe {
            if Self::is_red(node) && (Self::is_red((*node).left) || Self::is_red((*node).right)) {
                return None;
            }
            let left = Self::check_colors((*node).left)?;
            let right = Self::check_colors((*node).right)?;
            if left != right {
                return None;
            }
            Some(left + if Self::is_red(node) { 0 } else { 1 })
        }
    }
}

impl<K: Ord, V> Default for RbTreeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> Map for RbTreeMap<K, V> {
    type Key = K;
    type Value = V;

    fn len(&self) -> usize {
        self.core.len
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        tree::entry_ref(self.core.find(key)).map(|(_, value)| value)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let node = self.core.find(key);
        if node.is_null() {
            None
        } else {
            unsafe { Some(&mut (*node).value) }
        }
    }

    fn insert(&mut self, key: K, value: V) -> Option<V> {
        let (node, inserted, unused) = self.probe_insert(key, value);
        if inserted {
            None
        } else {
            let value = unused.expect("hit returns the value");
            unsafe { Some(mem::replace(&mut (*node).value, value)) }
        }
    }

    fn try_insert(&mut self, key: K, value: V) -> (&mut V, bool) {
        let (node, inserted, _) = self.probe_insert(key, value);
        (unsafe { &mut (*node).value }, inserted)
    }

    fn remove(&mut self, key: &K) -> Option<(K, V)> {
        let node = self.core.find(key);
        if node.is_null() {
            None
        } else {
            unsafe { Some(self.remove_node(node)) }
        }
    }

    fn clear(&mut self) {
        self.core.clear_with(|_, _| ());
    }

    fn traverse(&self, visit: &mut dyn FnMut(&K, &V) -> bool) -> usize {
        self.core.traverse(visit)
    }

    fn verify(&self) -> bool {
        self.core.verify_structure(|_| true)
            && !Self::is_red(self.core.root)
            && Self::check_colors(self.core.root).is_some()
    }
}
