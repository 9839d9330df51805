#![forbid(unsafe_code)]

//! Named-event multicast emitter with disposable subscriptions.
//!
//! [`Emitter<T>`] maps event names to ordered handler lists and hands every
//! registration back as a [`Disposable`]; unsubscription and generic resource
//! cleanup share one mechanism. The emitter owns a
//! [`CompositeDisposable`] of all outstanding subscription tokens, so
//! disposing the emitter tears every subscription down in one pass.
//!
//! # Design
//!
//! `Emitter<T>` is a cheap handle (`Rc` inside); clones share state. Handlers
//! are `Rc<dyn Fn(&T) -> Result<(), HandlerError>>`: immutable callables, so
//! dispatch never needs a mutable borrow and a handler may reenter the
//! emitter freely. Captured state mutates through `Cell`/`RefCell`.
//!
//! Each subscription token's release action captures only a `Weak` reference
//! to the emitter interior plus the event name and its own
//! [`DisposableId`] — no back-pointer cycle through the composite, so tokens
//! outliving the emitter are inert rather than leaky.
//!
//! # Ordering
//!
//! Within one `emit` call, handlers fire in the snapshot order taken at call
//! time: preempted (front-inserted) handlers before appended ones, and
//! registration order within each class. Mutations made by a handler during
//! dispatch are visible only to later `emit` calls. No ordering is defined
//! across different event names.
//!
//! # Invariants
//!
//! 1. An event name is present in the map iff it has ≥1 handler.
//! 2. Every live subscription token is a member of the current subscriptions
//!    composite; `clear()` and `dispose()` detach all of them.
//! 3. After `dispose()`, `on` fails with
//!    [`EmitterError::Disposed`](crate::EmitterError::Disposed) and all
//!    counts read 0; `off`/`emit`/`clear` degrade to no-ops.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::{debug, trace};

use crate::composite::CompositeDisposable;
use crate::disposable::{Disposable, DisposableId, Dispose};
use crate::error::{EmitError, EmitterError, HandlerError, Result};

type Handler<T> = Rc<dyn Fn(&T) -> std::result::Result<(), HandlerError>>;

/// One handler registration; identity is the subscription token's id.
struct Registration<T> {
    id: DisposableId,
    handler: Handler<T>,
}

/// Where a new registration lands in the delivery order.
#[derive(Clone, Copy)]
enum Placement {
    Append,
    Prepend,
}

struct EmitterInner<T> {
    disposed: Cell<bool>,
    subscriptions: RefCell<CompositeDisposable>,
    handlers: RefCell<AHashMap<String, Vec<Registration<T>>>>,
}

/// A named-event multicast emitter for single-threaded, callback-driven code.
///
/// Generic over the payload type `T`; handlers receive `&T`.
pub struct Emitter<T> {
    inner: Rc<EmitterInner<T>>,
}

impl<T: 'static> Emitter<T> {
    /// Create a live emitter with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(EmitterInner {
                disposed: Cell::new(false),
                subscriptions: RefCell::new(CompositeDisposable::new()),
                handlers: RefCell::new(AHashMap::new()),
            }),
        }
    }

    // ─── Registration ────────────────────────────────────────────────────

    /// Register `handler` for `event_name`, appended to the delivery order.
    ///
    /// Returns a subscription token whose disposal removes exactly this
    /// registration. Registering the same closure twice yields two
    /// independent subscriptions, each delivered per emit.
    ///
    /// # Errors
    ///
    /// [`EmitterError::Disposed`] if the emitter has been disposed.
    pub fn on(
        &self,
        event_name: impl Into<String>,
        handler: impl Fn(&T) -> std::result::Result<(), HandlerError> + 'static,
    ) -> Result<Disposable> {
        self.subscribe(event_name.into(), Rc::new(handler), Placement::Append)
    }

    /// Register `handler` at the *front* of the delivery order, so it runs
    /// before previously registered handlers for `event_name`.
    ///
    /// # Errors
    ///
    /// [`EmitterError::Disposed`] if the emitter has been disposed.
    pub fn preempt(
        &self,
        event_name: impl Into<String>,
        handler: impl Fn(&T) -> std::result::Result<(), HandlerError> + 'static,
    ) -> Result<Disposable> {
        self.subscribe(event_name.into(), Rc::new(handler), Placement::Prepend)
    }

    /// Like [`on`](Self::on), but the subscription is disposed right before
    /// the first delivery, guaranteeing at most one invocation — even when
    /// the handler itself fails.
    ///
    /// # Errors
    ///
    /// [`EmitterError::Disposed`] if the emitter has been disposed.
    pub fn once(
        &self,
        event_name: impl Into<String>,
        handler: impl Fn(&T) -> std::result::Result<(), HandlerError> + 'static,
    ) -> Result<Disposable> {
        self.subscribe_once(event_name.into(), handler, Placement::Append)
    }

    /// Like [`preempt`](Self::preempt), but one-shot: inserted at the front
    /// of the delivery order and disposed right before its first delivery.
    ///
    /// # Errors
    ///
    /// [`EmitterError::Disposed`] if the emitter has been disposed.
    pub fn once_preempt(
        &self,
        event_name: impl Into<String>,
        handler: impl Fn(&T) -> std::result::Result<(), HandlerError> + 'static,
    ) -> Result<Disposable> {
        self.subscribe_once(event_name.into(), handler, Placement::Prepend)
    }

    fn subscribe_once(
        &self,
        event_name: String,
        handler: impl Fn(&T) -> std::result::Result<(), HandlerError> + 'static,
        placement: Placement,
    ) -> Result<Disposable> {
        let slot: Rc<RefCell<Option<Disposable>>> = Rc::new(RefCell::new(None));

        let slot_in = Rc::clone(&slot);
        let wrapped = move |value: &T| {
            // Unsubscribe before delivery so a failing handler is still gone.
            if let Some(subscription) = slot_in.borrow_mut().take() {
                subscription.dispose();
            }
            handler(value)
        };

        let subscription = self.subscribe(event_name, Rc::new(wrapped), placement)?;
        *slot.borrow_mut() = Some(subscription.clone());
        Ok(subscription)
    }

    fn subscribe(
        &self,
        event_name: String,
        handler: Handler<T>,
        placement: Placement,
    ) -> Result<Disposable> {
        if self.inner.disposed.get() {
            return Err(EmitterError::Disposed);
        }

        let id = DisposableId::next();
        {
            let mut handlers = self.inner.handlers.borrow_mut();
            let list = handlers.entry(event_name.clone()).or_default();
            let registration = Registration { id, handler };
            match placement {
                Placement::Append => list.push(registration),
                Placement::Prepend => list.insert(0, registration),
            }
        }
        trace!(event = %event_name, subscription = %id, "handler registered");

        let weak = Rc::downgrade(&self.inner);
        let cleanup = Disposable::with_id(id, move || {
            if let Some(inner) = weak.upgrade() {
                Self::detach(&inner, &event_name, id);
            }
        });
        self.inner.subscriptions.borrow().add(cleanup.clone());
        Ok(cleanup)
    }

    /// Release action of a subscription token: detach from the composite and
    /// drop the registration. Runs at most once per token, but must tolerate
    /// the composite or emitter being mid-teardown.
    fn detach(inner: &Rc<EmitterInner<T>>, event_name: &str, id: DisposableId) {
        let subscriptions = inner.subscriptions.borrow().clone();
        subscriptions.remove_by_id(id);
        Self::remove_registration(inner, event_name, id);
    }

    fn remove_registration(inner: &EmitterInner<T>, event_name: &str, id: DisposableId) {
        if inner.disposed.get() {
            return;
        }
        let mut handlers = inner.handlers.borrow_mut();
        if let Some(list) = handlers.get_mut(event_name) {
            if let Some(index) = list.iter().position(|r| r.id == id) {
                list.remove(index);
                trace!(event = %event_name, subscription = %id, "handler removed");
            }
            if list.is_empty() {
                handlers.remove(event_name);
            }
        }
    }

    /// Remove the registration held by `subscription` from `event_name`'s
    /// list, without running the token's release action. No-op if the
    /// emitter is disposed or the registration is already gone; the token's
    /// own later disposal is a harmless double-removal.
    pub fn off(&self, event_name: &str, subscription: &Disposable) {
        Self::remove_registration(&self.inner, event_name, subscription.id());
    }

    // ─── Dispatch ────────────────────────────────────────────────────────

    /// Invoke every handler currently registered for `event_name`, in order,
    /// with `value`.
    ///
    /// Dispatch iterates a snapshot taken at call time: a handler that
    /// subscribes or unsubscribes during delivery affects only future emits,
    /// never this one. Emitting a name with no handlers is a no-op.
    ///
    /// # Errors
    ///
    /// The first handler failure is returned as an [`EmitError`] carrying the
    /// handler's snapshot index; earlier handlers have already run and later
    /// ones are skipped.
    pub fn emit(&self, event_name: &str, value: &T) -> std::result::Result<(), EmitError> {
        let snapshot: Vec<Handler<T>> = {
            let handlers = self.inner.handlers.borrow();
            match handlers.get(event_name) {
                Some(list) => list.iter().map(|r| Rc::clone(&r.handler)).collect(),
                None => return Ok(()),
            }
        };

        for (index, handler) in snapshot.iter().enumerate() {
            handler(value).map_err(|source| EmitError {
                event_name: event_name.to_string(),
                handler_index: index,
                source,
            })?;
        }
        Ok(())
    }

    /// Fire-and-forget dispatch with a deliberately weak contract: the live
    /// handler list is walked without a snapshot, every handler found is
    /// invoked, and handler failures are dropped (logged at debug level).
    ///
    /// Use [`emit`](Self::emit) when ordering or failure reporting matters.
    pub fn emit_async(&self, event_name: &str, value: &T) {
        let mut index = 0;
        loop {
            let handler = {
                let handlers = self.inner.handlers.borrow();
                handlers
                    .get(event_name)
                    .and_then(|list| list.get(index))
                    .map(|r| Rc::clone(&r.handler))
            };
            let Some(handler) = handler else { break };
            if let Err(error) = handler(value) {
                debug!(event = %event_name, index, %error, "emit_async dropped handler error");
            }
            index += 1;
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Drop every subscription and handler while leaving the emitter live.
    ///
    /// The current subscriptions composite is disposed (detaching every
    /// outstanding token) and replaced with a fresh one; the handler map is
    /// reset. New `on` calls keep working afterwards.
    pub fn clear(&self) {
        let old = self.inner.subscriptions.replace(CompositeDisposable::new());
        old.dispose();
        self.inner.handlers.borrow_mut().clear();
        debug!("emitter cleared");
    }

    // ─── Inspection ──────────────────────────────────────────────────────

    /// Names currently holding at least one handler. Unordered.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.inner.handlers.borrow().keys().cloned().collect()
    }

    /// Handler count for `event_name`; 0 if absent.
    #[must_use]
    pub fn listener_count(&self, event_name: &str) -> usize {
        self.inner
            .handlers
            .borrow()
            .get(event_name)
            .map_or(0, Vec::len)
    }

    /// Sum of handler counts across all event names.
    #[must_use]
    pub fn total_listener_count(&self) -> usize {
        self.inner.handlers.borrow().values().map(Vec::len).sum()
    }

    /// Whether this emitter has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl<T> Dispose for Emitter<T> {
    /// Tear the emitter down permanently: dispose every subscription token,
    /// empty the handler map, and refuse further `on` calls.
    fn dispose(&self) {
        if self.inner.disposed.get() {
            return;
        }
        let subscriptions = self.inner.subscriptions.borrow().clone();
        subscriptions.dispose();
        self.inner.handlers.borrow_mut().clear();
        self.inner.disposed.set(true);
        debug!("emitter disposed");
    }
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners: usize = self.inner.handlers.borrow().values().map(Vec::len).sum();
        f.debug_struct("Emitter")
            .field("disposed", &self.inner.disposed.get())
            .field("listeners", &listeners)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
