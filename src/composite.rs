#![forbid(unsafe_code)]

//! Bulk disposal: an unordered collection of [`Disposable`]s released
//! together, exactly once.
//!
//! # Design
//!
//! Membership is identity-keyed (`AHashMap<DisposableId, Disposable>`), so
//! re-adding a token or one of its clones collapses to a single entry, and
//! removal works from any clone. Insertion order is not preserved and member
//! dispose order is unspecified.
//!
//! Ownership is non-exclusive: a token may sit in several composites or be
//! held directly by its creator. The composite guarantees only that *it*
//! calls `dispose()` on each current member at its own dispose time; member
//! idempotence makes overlapping ownership safe.
//!
//! # Reentrancy
//!
//! A member's release action may call back into the composite that is
//! disposing it (subscription tokens do exactly this). The disposed flag is
//! latched and the member map is taken out of its cell *before* iteration, so
//! reentrant `add`/`remove`/`clear`/`dispose` calls are no-ops and never
//! observe a half-drained set.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::debug;

use crate::disposable::{Disposable, DisposableId, Dispose};

struct CompositeInner {
    disposed: Cell<bool>,
    members: RefCell<AHashMap<DisposableId, Disposable>>,
}

/// An unordered set of [`Disposable`]s disposed together.
///
/// Cloning yields another handle to the same set. Frozen permanently on
/// `dispose()`: the member storage is released and later mutations have no
/// effect.
pub struct CompositeDisposable {
    inner: Rc<CompositeInner>,
}

impl CompositeDisposable {
    /// Create an empty composite.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(CompositeInner {
                disposed: Cell::new(false),
                members: RefCell::new(AHashMap::new()),
            }),
        }
    }

    /// Add a token to the set. No-op once the composite is disposed.
    ///
    /// Re-adding a member (or any clone of it) is harmless: membership is
    /// keyed by [`DisposableId`], so duplicates collapse. Values that are
    /// merely dispose-capable go through [`add_owned`](Self::add_owned).
    pub fn add(&self, disposable: Disposable) {
        if self.inner.disposed.get() {
            return;
        }
        self.inner
            .members
            .borrow_mut()
            .insert(disposable.id(), disposable);
    }

    /// Accept any [`Dispose`] value, wrapping it into a [`Disposable`] token
    /// and adding that.
    ///
    /// Returns the token so the caller can [`remove`](Self::remove) or share
    /// it later. Each call wraps afresh, so adding the same value twice
    /// yields two members; keep the returned token and [`add`](Self::add) a
    /// clone when collapse matters. If the composite is already disposed the
    /// token is returned un-added (and undisposed).
    pub fn add_owned(&self, target: impl Dispose + 'static) -> Disposable {
        let token = Disposable::wrap(target);
        self.add(token.clone());
        token
    }

    /// Add every token from `iter`. No-op once the composite is disposed.
    pub fn add_all(&self, iter: impl IntoIterator<Item = Disposable>) {
        for disposable in iter {
            self.add(disposable);
        }
    }

    /// Remove a member without disposing it. No-op if the composite is
    /// disposed or the token is not a member.
    pub fn remove(&self, disposable: &Disposable) {
        self.remove_by_id(disposable.id());
    }

    /// Alias for [`remove`](Self::remove).
    pub fn delete(&self, disposable: &Disposable) {
        self.remove(disposable);
    }

    /// Identity-keyed removal; used by subscription tokens to detach
    /// themselves without holding a handle to their own wrapper.
    pub(crate) fn remove_by_id(&self, id: DisposableId) {
        if self.inner.disposed.get() {
            return;
        }
        self.inner.members.borrow_mut().remove(&id);
    }

    /// Empty the set without disposing members. No-op once disposed.
    pub fn clear(&self) {
        if self.inner.disposed.get() {
            return;
        }
        self.inner.members.borrow_mut().clear();
    }

    /// Number of current members (0 after dispose).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.members.borrow().len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this composite has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl Dispose for CompositeDisposable {
    fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        // Take the set out before iterating: member actions may reenter this
        // composite and must find it already disposed and empty.
        let members = self.inner.members.take();
        debug!(members = members.len(), "composite disposed");
        for member in members.values() {
            member.dispose();
        }
    }
}

impl Default for CompositeDisposable {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CompositeDisposable {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// The `Extend` trait forces `&mut self`; every other mutator on this handle
/// takes `&self`. [`add_all`](CompositeDisposable::add_all) is the same bulk
/// insert through a shared handle.
impl Extend<Disposable> for CompositeDisposable {
    fn extend<I: IntoIterator<Item = Disposable>>(&mut self, iter: I) {
        self.add_all(iter);
    }
}

impl fmt::Debug for CompositeDisposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeDisposable")
            .field("disposed", &self.inner.disposed.get())
            .field("members", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting() -> (Disposable, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0u32));
        let count_in = Rc::clone(&count);
        let disposable = Disposable::new(move || count_in.set(count_in.get() + 1));
        (disposable, count)
    }

    #[test]
    fn dispose_releases_all_members_once() {
        let (a, a_count) = counting();
        let (b, b_count) = counting();

        let composite = CompositeDisposable::new();
        composite.add(a);
        composite.add(b);
        assert_eq!(composite.len(), 2);

        composite.dispose();
        assert!(composite.is_disposed());
        assert_eq!(a_count.get(), 1);
        assert_eq!(b_count.get(), 1);

        composite.dispose();
        assert_eq!(a_count.get(), 1);
        assert_eq!(b_count.get(), 1);
    }

    #[test]
    fn removed_member_is_spared() {
        let (a, a_count) = counting();
        let (b, b_count) = counting();
        let (c, c_count) = counting();

        let composite = CompositeDisposable::new();
        composite.add(a);
        composite.add(b.clone());
        composite.add(c);

        composite.remove(&b);
        composite.dispose();

        assert_eq!(a_count.get(), 1);
        assert_eq!(b_count.get(), 0);
        assert_eq!(c_count.get(), 1);
        assert!(!b.is_disposed());
    }

    #[test]
    fn delete_is_remove() {
        let (a, a_count) = counting();
        let composite = CompositeDisposable::new();
        composite.add(a.clone());
        composite.delete(&a);
        composite.dispose();
        assert_eq!(a_count.get(), 0);
    }

    #[test]
    fn removing_non_member_is_noop() {
        let (a, _) = counting();
        let composite = CompositeDisposable::new();
        composite.remove(&a);
        assert!(composite.is_empty());
    }

    #[test]
    fn duplicates_collapse() {
        let (a, a_count) = counting();

        let composite = CompositeDisposable::new();
        composite.add(a.clone());
        composite.add(a.clone());
        composite.add(a);
        assert_eq!(composite.len(), 1);

        composite.dispose();
        assert_eq!(a_count.get(), 1);
    }

    #[test]
    fn clear_spares_members() {
        let (a, a_count) = counting();
        let composite = CompositeDisposable::new();
        composite.add(a);
        composite.clear();
        assert!(composite.is_empty());

        composite.dispose();
        assert_eq!(a_count.get(), 0);
    }

    #[test]
    fn mutation_after_dispose_has_no_effect() {
        let composite = CompositeDisposable::new();
        composite.dispose();

        let (a, a_count) = counting();
        composite.add(a.clone());
        assert!(composite.is_empty());

        composite.clear();
        composite.remove(&a);
        composite.dispose();
        assert_eq!(a_count.get(), 0);
    }

    #[test]
    fn shared_member_survives_double_ownership() {
        let (a, a_count) = counting();

        let first = CompositeDisposable::new();
        let second = CompositeDisposable::new();
        first.add(a.clone());
        second.add(a);

        first.dispose();
        second.dispose();
        assert_eq!(a_count.get(), 1);
    }

    #[test]
    fn reentrant_removal_during_dispose_is_safe() {
        let composite = CompositeDisposable::new();

        // A member whose release action reaches back into the disposing
        // composite, the way subscription tokens do.
        let composite_in = composite.clone();
        let slot: Rc<RefCell<Option<Disposable>>> = Rc::new(RefCell::new(None));
        let slot_in = Rc::clone(&slot);
        let member = Disposable::new(move || {
            if let Some(token) = slot_in.borrow().as_ref() {
                composite_in.remove(token);
                composite_in.dispose();
            }
        });
        *slot.borrow_mut() = Some(member.clone());

        let (plain, plain_count) = counting();
        composite.add(member.clone());
        composite.add(plain);

        composite.dispose();
        assert!(member.is_disposed());
        assert_eq!(plain_count.get(), 1);
        assert_eq!(composite.len(), 0);
    }

    #[test]
    fn extend_adds_in_bulk() {
        let (a, a_count) = counting();
        let (b, b_count) = counting();

        let mut composite = CompositeDisposable::new();
        composite.extend([a, b]);
        assert_eq!(composite.len(), 2);

        composite.dispose();
        assert_eq!(a_count.get(), 1);
        assert_eq!(b_count.get(), 1);
    }

    #[test]
    fn add_owned_accepts_any_dispose_value() {
        struct Connection {
            open: Rc<Cell<bool>>,
        }
        impl Dispose for Connection {
            fn dispose(&self) {
                self.open.set(false);
            }
        }

        let open = Rc::new(Cell::new(true));
        let composite = CompositeDisposable::new();
        let token = composite.add_owned(Connection {
            open: Rc::clone(&open),
        });
        assert_eq!(composite.len(), 1);

        composite.dispose();
        assert!(!open.get());
        assert!(token.is_disposed());
    }

    #[test]
    fn add_owned_token_can_be_removed() {
        struct Connection {
            open: Rc<Cell<bool>>,
        }
        impl Dispose for Connection {
            fn dispose(&self) {
                self.open.set(false);
            }
        }

        let open = Rc::new(Cell::new(true));
        let composite = CompositeDisposable::new();
        let token = composite.add_owned(Connection {
            open: Rc::clone(&open),
        });

        composite.remove(&token);
        composite.dispose();
        assert!(open.get());
        assert!(!token.is_disposed());
    }

    #[test]
    fn add_all_goes_through_the_shared_handle() {
        let (a, a_count) = counting();
        let (b, b_count) = counting();

        let composite = CompositeDisposable::new();
        composite.add_all([a, b]);
        assert_eq!(composite.len(), 2);

        composite.dispose();
        assert_eq!(a_count.get(), 1);
        assert_eq!(b_count.get(), 1);
    }

    #[test]
    fn nested_composites_via_wrap() {
        let (a, a_count) = counting();
        let child = CompositeDisposable::new();
        child.add(a);

        let parent = CompositeDisposable::new();
        parent.add(Disposable::wrap(child.clone()));

        parent.dispose();
        assert!(child.is_disposed());
        assert_eq!(a_count.get(), 1);
    }
}
