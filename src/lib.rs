//! Callback-driven promises.
//!
//! A [`Promise`] is the eventual result of an operation that may succeed,
//! fail, or never finish. It settles once, through the [`Resolver`] and
//! [`Rejecter`] handed out when it is created, and every continuation attached
//! to it runs exactly once, in attachment order. Nothing is scheduled: the
//! continuations run on whichever thread settles the promise, or on the
//! attaching thread if the promise has already settled.
//!
//! Continuations may return another promise, which the derived promise then
//! follows. [`all`], [`all_settled`], [`race`] and [`any`] combine several
//! promises into one.
//!
//! # Examples
//!
//! ```
//! use promise_then::{all, Promise, Resolution};
//!
//! let (fetch, resolver, _rejecter) = Promise::<String, String>::deferred();
//! let length = fetch
//!     .and_then(|body| Ok(Resolution::Value(body.len())))
//!     .catch(|_| Ok(Resolution::Value(0)));
//! let both = all(vec![length.into(), Resolution::Value(10)]);
//!
//! resolver.fulfill("hello".into());
//! assert_eq!(both.outcome(), Some(Ok(vec![5, 10])));
//! ```
//!
//! A settled promise can also be awaited on any executor:
//!
//! ```
//! use futures::executor::block_on;
//! use promise_then::Promise;
//!
//! let answer = Promise::<i32, String>::resolved(42);
//! assert_eq!(block_on(answer), Ok(42));
//! ```
use thiserror::Error;

mod combinators;
mod promise;
mod resolve;
mod state;

pub use combinators::{all, all_settled, any, race};
pub use promise::{Promise, Rejecter, Resolver};
pub use resolve::Resolution;
pub use state::PromiseState;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A promise was offered itself as its resolution.
    #[error("a promise cannot be resolved with itself")]
    SelfResolution,
}
