#![forbid(unsafe_code)]

//! One-shot resource release tokens.
//!
//! - [`Dispose`]: capability trait for anything that can release what it
//!   holds.
//! - [`Disposable`]: a cloneable, idempotent release token wrapping an
//!   optional zero-argument action.
//! - [`DisposableId`]: process-unique identity, shared by all clones of a
//!   handle, used by [`CompositeDisposable`](crate::CompositeDisposable) for
//!   membership.
//!
//! # Design
//!
//! `Disposable` is a cheap handle (`Rc` inside): clones share the disposed
//! flag, the action slot, and the identity. Disposal is explicit only —
//! dropping a handle never releases anything, so a token can be handed to
//! several owners without surprise teardown.
//!
//! # Invariants
//!
//! 1. `disposed` latches true and never resets.
//! 2. The release action runs at most once, and its storage is cleared
//!    immediately after it is taken, so captured resources drop even while
//!    handles to the token remain alive.
//! 3. The disposed flag is set *before* the action runs; reentrant
//!    `dispose()` calls from inside the action are no-ops.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

// ─── Identity ────────────────────────────────────────────────────────────────

static NEXT_DISPOSABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Disposable`].
///
/// Clones of a handle share the same id, so identity survives cloning and a
/// token can be located in a composite regardless of which clone is in hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisposableId(u64);

impl DisposableId {
    pub(crate) fn next() -> Self {
        Self(NEXT_DISPOSABLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DisposableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Capability trait ────────────────────────────────────────────────────────

/// Capability to release a held resource.
///
/// Implementations must be idempotent: a second `dispose()` call observes the
/// same state as the first. Any implementor can be folded into a
/// [`Disposable`] token via [`Disposable::wrap`] and from there tracked by a
/// [`CompositeDisposable`](crate::CompositeDisposable).
pub trait Dispose {
    /// Release the resource. Idempotent.
    fn dispose(&self);
}

// ─── Disposable ──────────────────────────────────────────────────────────────

type ReleaseAction = Box<dyn FnOnce()>;

struct DisposableInner {
    id: DisposableId,
    disposed: Cell<bool>,
    action: RefCell<Option<ReleaseAction>>,
}

/// A one-shot release token wrapping an optional zero-argument action.
///
/// Remains a valid, inert object after disposal.
pub struct Disposable {
    inner: Rc<DisposableInner>,
}

impl Disposable {
    /// Create a token that runs `action` on first dispose.
    #[must_use]
    pub fn new(action: impl FnOnce() + 'static) -> Self {
        Self::from_parts(DisposableId::next(), Some(Box::new(action)))
    }

    /// Create a token with no release action (state tracking only).
    #[must_use]
    pub fn noop() -> Self {
        Self::from_parts(DisposableId::next(), None)
    }

    /// Adapt any [`Dispose`] value into a `Disposable` token.
    ///
    /// The wrapped value is disposed when the token is first disposed.
    #[must_use]
    pub fn wrap(target: impl Dispose + 'static) -> Self {
        Self::new(move || target.dispose())
    }

    /// Create a token whose action needs to know the token's own identity
    /// before the token exists (subscription self-detachment).
    pub(crate) fn with_id(id: DisposableId, action: impl FnOnce() + 'static) -> Self {
        Self::from_parts(id, Some(Box::new(action)))
    }

    fn from_parts(id: DisposableId, action: Option<ReleaseAction>) -> Self {
        Self {
            inner: Rc::new(DisposableInner {
                id,
                disposed: Cell::new(false),
                action: RefCell::new(action),
            }),
        }
    }

    /// Identity shared by all clones of this handle.
    #[must_use]
    pub fn id(&self) -> DisposableId {
        self.inner.id
    }

    /// Whether this token has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Whether the release action is still held.
    ///
    /// False once the action has run (or if the token never had one); the
    /// slot is cleared on dispose so captured resources can be reclaimed.
    #[must_use]
    pub fn has_action(&self) -> bool {
        self.inner.action.borrow().is_some()
    }
}

impl Dispose for Disposable {
    fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        // Take the action out before running it: reentrant dispose() sees the
        // latched flag, and the slot is empty once the action returns.
        let action = self.inner.action.borrow_mut().take();
        if let Some(action) = action {
            trace!(id = %self.inner.id, "disposable released");
            action();
        }
    }
}

impl Clone for Disposable {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("id", &self.inner.id)
            .field("disposed", &self.inner.disposed.get())
            .field("has_action", &self.has_action())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
