use alloc::boxed::Box;
use alloc::fmt;
use alloc::string::String;
use core::marker::PhantomData;
use core::mem;
use core::ptr;

use hashbrown::HashMap;

extern crate alloc;

/// A node in the recency list.
///
/// Contains an identifier and pointers to the previous and next entries.
/// Not meant to be used directly by users of the `RecencyList`.
struct Entry {
    /// The identifier stored in this entry. Uses MaybeUninit to allow for
    /// sigil nodes.
    id: mem::MaybeUninit<String>,
    /// Pointer to the previous entry in the list.
    prev: *mut Entry,
    /// Pointer to the next entry in the list.
    next: *mut Entry,
}

impl Entry {
    /// Creates a new entry holding the given identifier.
    fn new(id: String) -> Self {
        Entry {
            id: mem::MaybeUninit::new(id),
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }
    }

    /// Creates a new sigil (sentinel) entry without initializing the
    /// identifier.
    ///
    /// Sigil entries are used as head and tail markers in the list.
    fn new_sigil() -> Self {
        Entry {
            id: mem::MaybeUninit::uninit(),
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }
    }
}

/// An ordered sequence of identifiers, most-recent-first, with a side index
/// from identifier to list node.
///
/// Backs the LRU eviction order: [`touch`](RecencyList::touch) repositions an
/// identifier at the head and [`pop_tail`](RecencyList::pop_tail) removes the
/// least-recent identifier, both in O(1) amortised time. The list uses
/// sentinel nodes (sigils) at the head and tail to simplify operations.
///
/// Each identifier appears at most once; the identifiers in the list are
/// exactly the keys of the side index.
pub(crate) struct RecencyList {
    /// Pointer to the head sentinel node.
    head: *mut Entry,
    /// Pointer to the tail sentinel node.
    tail: *mut Entry,
    /// Side index from identifier to its node.
    index: HashMap<String, *mut Entry>,
}

impl RecencyList {
    /// Creates an empty list.
    ///
    /// Sets up the sentinel nodes and links them together.
    pub(crate) fn new() -> RecencyList {
        let head = Box::into_raw(Box::new(Entry::new_sigil()));
        let tail = Box::into_raw(Box::new(Entry::new_sigil()));

        let list = RecencyList {
            head,
            tail,
            index: HashMap::new(),
        };

        unsafe {
            // SAFETY: head and tail are newly allocated and valid pointers
            (*list.head).next = list.tail;
            (*list.tail).prev = list.head;
        }

        list
    }

    /// Returns the current number of identifiers in the list.
    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if the list contains no identifiers.
    pub(crate) fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns true if the identifier is present.
    #[allow(dead_code)] // Used by the cache invariant checks in tests
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Marks an identifier as most recently used.
    ///
    /// If the identifier is already at the head this is a no-op; if it is
    /// elsewhere in the list it is unlinked first; otherwise a new node is
    /// allocated. Either way the identifier ends up at the head.
    pub(crate) fn touch(&mut self, id: &str) {
        if let Some(&node) = self.index.get(id) {
            unsafe {
                // SAFETY: node comes from our index and is a valid non-sigil
                // entry of this list
                self.move_to_front(node);
            }
        } else {
            let node = Box::into_raw(Box::new(Entry::new(String::from(id))));
            unsafe {
                // SAFETY: node is a newly allocated entry not part of any list
                self.attach(node);
            }
            self.index.insert(String::from(id), node);
        }
    }

    /// Removes and returns the least-recent identifier.
    ///
    /// Updates both endpoints and the side index. Returns `None` when the
    /// list is empty.
    pub(crate) fn pop_tail(&mut self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: both sentinels are valid pointers initialized in `new`, and
        // the list is not empty, so there is at least one entry between them
        let last = unsafe { (*self.tail).prev };
        if last == self.head {
            return None;
        }
        unsafe {
            // SAFETY: last is a valid non-sigil entry of this list
            self.detach(last);
            // SAFETY: last was detached above and is no longer reachable
            let entry = Box::from_raw(last);
            // SAFETY: last is a non-sigil node, so its identifier is
            // initialized
            let id = entry.id.assume_init();
            self.index.remove(&id);
            Some(id)
        }
    }

    /// Returns an iterator over the identifiers, most-recent-first.
    #[allow(dead_code)] // Used by the cache invariant checks in tests
    pub(crate) fn iter(&self) -> Iter<'_> {
        Iter {
            // SAFETY: head is a valid sentinel whose next pointer is always a
            // valid entry or the tail sentinel
            next: unsafe { (*self.head).next },
            tail: self.tail,
            marker: PhantomData,
        }
    }

    /// Removes all identifiers from the list.
    pub(crate) fn clear(&mut self) {
        while self.pop_tail().is_some() {}
    }

    /// Detaches a node from the list without deallocating it.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `node` is a valid pointer to a non-sigil
    /// node of this list (not null, not freed).
    unsafe fn detach(&mut self, node: *mut Entry) {
        // SAFETY: the caller guarantees that node is a valid entry in the
        // list, which means its prev and next pointers are also valid entries
        unsafe {
            (*(*node).prev).next = (*node).next;
            (*(*node).next).prev = (*node).prev;
        }
    }

    /// Attaches a node after the head sentinel node, making it the
    /// most-recent entry.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `node` is a valid pointer to a node that
    /// is not currently linked into the list.
    unsafe fn attach(&mut self, node: *mut Entry) {
        // SAFETY: head is a valid sentinel initialized in `new`, and the
        // caller guarantees node is a valid unlinked entry
        unsafe {
            (*node).next = (*self.head).next;
            (*node).prev = self.head;
            (*self.head).next = node;
            (*(*node).next).prev = node;
        }
    }

    /// Moves a node to the front of the list (after the head sentinel).
    ///
    /// # Safety
    ///
    /// The caller must ensure that `node` points to a valid non-sigil entry
    /// of this list.
    unsafe fn move_to_front(&mut self, node: *mut Entry) {
        // SAFETY: head is a valid sentinel; node is guaranteed by the caller
        if unsafe { (*self.head).next } == node {
            return;
        }
        // SAFETY: node is a linked entry of this list
        unsafe {
            self.detach(node);
            self.attach(node);
        }
    }
}

impl Drop for RecencyList {
    /// Removes and deallocates all entries, then frees the sentinel nodes.
    fn drop(&mut self) {
        self.clear();

        // SAFETY: head and tail are valid pointers initialized in `new` and
        // never freed before this point
        unsafe {
            let _ = Box::from_raw(self.head);
            let _ = Box::from_raw(self.tail);
        }
        self.head = ptr::null_mut();
        self.tail = ptr::null_mut();
    }
}

impl fmt::Debug for RecencyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecencyList")
            .field("length", &self.len())
            .finish()
    }
}

/// Iterator over the identifiers of a [`RecencyList`], most-recent-first.
#[allow(dead_code)]
pub(crate) struct Iter<'a> {
    next: *mut Entry,
    tail: *mut Entry,
    marker: PhantomData<&'a Entry>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == self.tail {
            return None;
        }
        // SAFETY: next is a valid non-sigil entry; the borrow on the list
        // keeps it alive for 'a
        let entry = unsafe { &*self.next };
        self.next = entry.next;
        // SAFETY: non-sigil nodes always hold an initialized identifier
        Some(unsafe { entry.id.assume_init_ref() }.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec::Vec;

    fn ids(list: &RecencyList) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_is_empty() {
        let list = RecencyList::new();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_pop_empty_returns_none() {
        let mut list = RecencyList::new();
        assert!(list.pop_tail().is_none());
    }

    #[test]
    fn test_touch_orders_most_recent_first() {
        let mut list = RecencyList::new();
        list.touch("a");
        list.touch("b");
        list.touch("c");
        assert_eq!(ids(&list), ["c", "b", "a"]);
    }

    #[test]
    fn test_touch_repositions_existing() {
        let mut list = RecencyList::new();
        list.touch("a");
        list.touch("b");
        list.touch("c");
        list.touch("a");
        assert_eq!(ids(&list), ["a", "c", "b"]);
        assert_eq!(list.len(), 3);
        // After A B C A the least-recent identifier is B.
        assert_eq!(list.pop_tail().as_deref(), Some("b"));
    }

    #[test]
    fn test_touch_head_is_noop() {
        let mut list = RecencyList::new();
        list.touch("a");
        list.touch("b");
        list.touch("b");
        assert_eq!(ids(&list), ["b", "a"]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_pop_tail_returns_least_recent() {
        let mut list = RecencyList::new();
        list.touch("a");
        list.touch("b");
        list.touch("c");
        assert_eq!(list.pop_tail().as_deref(), Some("a"));
        assert_eq!(list.pop_tail().as_deref(), Some("b"));
        assert_eq!(list.pop_tail().as_deref(), Some("c"));
        assert_eq!(list.pop_tail(), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_index_matches_list() {
        let mut list = RecencyList::new();
        list.touch("a");
        list.touch("b");
        assert!(list.contains("a"));
        assert!(list.contains("b"));
        list.pop_tail();
        assert!(!list.contains("a"));
        assert!(list.contains("b"));
    }

    #[test]
    fn test_clear_allows_reuse() {
        let mut list = RecencyList::new();
        list.touch("a");
        list.touch("b");
        list.clear();
        assert!(list.is_empty());
        list.touch("c");
        assert_eq!(ids(&list), ["c"]);
    }

    #[test]
    fn test_single_item_pop() {
        let mut list = RecencyList::new();
        list.touch("only");
        assert_eq!(list.pop_tail().as_deref(), Some("only"));
        assert!(list.pop_tail().is_none());
        list.touch("again");
        assert_eq!(list.len(), 1);
    }
}
