//! The runtime handle: the record through which the external module finds the
//! surface it renders into.
//!
//! A host writes it once per mount cycle, strictly before the module loader
//! starts the external program; the program reads it once during its own setup.

use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeHandle<S> {
    pub surface: S,
}

impl<S> RuntimeHandle<S> {
    pub fn new(surface: S) -> Self {
        Self { surface }
    }
}

/// Single-threaded registry holding the most recently published handle.
///
/// Clones share the slot.
#[derive(Debug)]
pub struct HandleSlot<S> {
    inner: Rc<RefCell<SlotState<S>>>,
}

#[derive(Debug)]
struct SlotState<S> {
    current: Option<RuntimeHandle<S>>,
    publications: u32,
}

impl<S> Clone for HandleSlot<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S> Default for HandleSlot<S> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SlotState {
                current: None,
                publications: 0,
            })),
        }
    }
}

impl<S: Clone> HandleSlot<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published handle.
    pub fn publish(&self, handle: RuntimeHandle<S>) {
        let mut state = self.inner.borrow_mut();
        state.current = Some(handle);
        state.publications += 1;
    }

    pub fn current(&self) -> Option<RuntimeHandle<S>> {
        self.inner.borrow().current.clone()
    }

    pub fn is_published(&self) -> bool {
        self.inner.borrow().current.is_some()
    }

    /// How many times a handle has been written.
    pub fn publications(&self) -> u32 {
        self.inner.borrow().publications
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_replaces_and_counts() {
        let slot = HandleSlot::new();
        assert!(!slot.is_published());
        assert_eq!(slot.current(), None);

        slot.publish(RuntimeHandle::new("first"));
        let shared = slot.clone();
        shared.publish(RuntimeHandle::new("second"));

        assert_eq!(slot.current().map(|h| h.surface), Some("second"));
        assert_eq!(slot.publications(), 2);
    }
}
