#![forbid(unsafe_code)]

//! Disposable-based event subscription primitives for single-threaded,
//! callback-driven code.
//!
//! Two cooperating primitives:
//!
//! - A **disposal protocol**: [`Dispose`], [`Disposable`], and
//!   [`CompositeDisposable`] — one-shot, idempotent resource release, singly
//!   or in bulk.
//! - A **named-event multicast emitter** built on top of it: [`Emitter`],
//!   whose subscription handles are themselves [`Disposable`]s, so
//!   unsubscription and generic resource cleanup share one mechanism.
//!
//! # Architecture
//!
//! Everything is `Rc`/`RefCell`-based single-threaded shared ownership;
//! handles are cheap to clone and clones share state. Emission iterates a
//! snapshot of the handler list, so handlers may freely subscribe,
//! unsubscribe, or dispose during dispatch without affecting the delivery in
//! progress.
//!
//! # Example
//!
//! ```
//! use evkit::{Dispose, Emitter};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let emitter: Emitter<u32> = Emitter::new();
//! let seen = Rc::new(Cell::new(0u32));
//!
//! let seen_in = Rc::clone(&seen);
//! let subscription = emitter
//!     .on("tick", move |value| {
//!         seen_in.set(seen_in.get() + *value);
//!         Ok(())
//!     })
//!     .expect("emitter is live");
//!
//! emitter.emit("tick", &2).unwrap();
//! subscription.dispose();
//! emitter.emit("tick", &3).unwrap();
//!
//! assert_eq!(seen.get(), 2);
//! ```

pub mod composite;
pub mod disposable;
pub mod emitter;
pub mod error;

pub use composite::CompositeDisposable;
pub use disposable::{Disposable, DisposableId, Dispose};
pub use emitter::Emitter;
pub use error::{EmitError, EmitterError, HandlerError, Result};
