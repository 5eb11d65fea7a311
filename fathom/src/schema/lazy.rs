//! Lazily populated, memoised collections.
//!
//! Every collection on the schema graph goes through [`Lazy`]: the first read
//! fetches through the inspector and caches the result, later reads return
//! the cached value. A collection can also be assigned by hand, which is how
//! synthetic graphs are built without a database.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};

enum Slot<T> {
    Unfetched,
    Fetched(Rc<T>),
    Assigned(Rc<T>),
}

/// A collection in one of three states: unfetched, fetched, manually set.
pub(crate) struct Lazy<T> {
    label: &'static str,
    slot: RefCell<Slot<T>>,
}

impl<T> Lazy<T> {
    pub(crate) fn new(label: &'static str) -> Self {
        Self {
            label,
            slot: RefCell::new(Slot::Unfetched),
        }
    }

    fn cached(&self) -> Option<Rc<T>> {
        match &*self.slot.borrow() {
            Slot::Unfetched => None,
            Slot::Fetched(value) | Slot::Assigned(value) => Some(Rc::clone(value)),
        }
    }

    /// Returns the cached value, running `fetch` only while unfetched.
    ///
    /// A failing fetch leaves the slot unfetched so the next read retries.
    pub(crate) fn get_or_fetch(&self, fetch: impl FnOnce() -> Result<T>) -> Result<Rc<T>> {
        if let Some(value) = self.cached() {
            return Ok(value);
        }
        // no borrow is held while the inspector runs
        let value = Rc::new(fetch()?);
        *self.slot.borrow_mut() = Slot::Fetched(Rc::clone(&value));
        Ok(value)
    }

    /// Sets the value by hand.
    ///
    /// When the owner is backed by a live inspector the value is fixed once
    /// populated: overwriting fetched or previously assigned data is refused.
    pub(crate) fn assign(&self, value: T, live: bool) -> Result<()> {
        let mut slot = self.slot.borrow_mut();
        if live && !matches!(&*slot, Slot::Unfetched) {
            return Err(Error::AlreadyPopulated(self.label.to_string()));
        }
        *slot = Slot::Assigned(Rc::new(value));
        Ok(())
    }

    /// Forget the cached value; the next read fetches again.
    pub(crate) fn invalidate(&self) {
        *self.slot.borrow_mut() = Slot::Unfetched;
    }

    #[cfg(test)]
    pub(crate) fn is_populated(&self) -> bool {
        !matches!(&*self.slot.borrow(), Slot::Unfetched)
    }

    #[cfg(test)]
    pub(crate) fn is_assigned(&self) -> bool {
        matches!(&*self.slot.borrow(), Slot::Assigned(_))
    }
}

impl<T: Clone> Lazy<T> {
    /// Edit a populated value in place, keeping its state.
    pub(crate) fn update<R>(&self, edit: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut slot = self.slot.borrow_mut();
        match &mut *slot {
            Slot::Unfetched => None,
            Slot::Fetched(value) | Slot::Assigned(value) => Some(edit(Rc::make_mut(value))),
        }
    }
}
