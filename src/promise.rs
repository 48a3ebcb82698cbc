use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::resolve::{adopt, resolve, Resolution};
use crate::state::{PromiseState, Shared};
use crate::Error;

/// The eventual result of an operation: a value of type `T` once fulfilled,
/// a reason of type `E` once rejected, or neither while pending.
///
/// Cloning a `Promise` yields another handle to the same settlement.
/// Continuations attached with [`then`](Promise::then) and friends run exactly
/// once, in the order they were attached. If the promise has already settled
/// they run before the attaching call returns.
///
/// # Examples
///
/// ```
/// use promise_then::{Promise, Resolution};
///
/// let (promise, resolver, _rejecter) = Promise::<i32, String>::deferred();
/// let doubled = promise.map(|n| n * 2);
/// resolver.fulfill(21);
/// assert_eq!(doubled.outcome(), Some(Ok(42)));
/// ```
pub struct Promise<T, E> {
    pub(crate) shared: Arc<Shared<T, E>>,
}

/// Fulfills, or adopts the settlement of another promise into, the promise
/// it was created with.
pub struct Resolver<T, E> {
    shared: Arc<Shared<T, E>>,
}

/// Rejects the promise it was created with.
pub struct Rejecter<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<T, E> Clone for Rejecter<T, E> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").field("state", &self.shared.state()).finish()
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("state", &self.shared.state()).finish()
    }
}

impl<T, E> fmt::Debug for Rejecter<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejecter").field("state", &self.shared.state()).finish()
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Resolves the promise. A promise given here is adopted: ours settles
    /// the way it does. Does nothing if ours has already settled.
    ///
    /// # Errors
    ///
    /// [`Error::SelfResolution`] if `resolution` is the promise this resolver
    /// belongs to. The promise is left untouched.
    pub fn resolve(&self, resolution: impl Into<Resolution<T, E>>) -> Result<(), Error> {
        resolve(&self.shared, resolution.into())
    }

    /// Fulfills the promise with a plain value. Does nothing if it has
    /// already settled.
    pub fn fulfill(&self, value: T) {
        self.shared.settle(Ok(value));
    }
}

impl<T, E> Rejecter<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Rejects the promise. Does nothing if it has already settled.
    pub fn reject(&self, reason: E) {
        self.shared.settle(Err(reason));
    }
}

impl<T, E> Promise<T, E> {
    pub fn state(&self) -> PromiseState {
        self.shared.state()
    }

    pub fn is_pending(&self) -> bool {
        self.shared.is_pending()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn pending() -> Self {
        Self { shared: Arc::new(Shared::new()) }
    }

    /// Creates a promise and runs `initializer` with its triggers before
    /// returning. An `Err` from the initializer rejects the promise, unless
    /// the initializer already settled it.
    ///
    /// ```
    /// use promise_then::{Promise, PromiseState};
    ///
    /// let failed = Promise::<i32, &str>::new(|_resolve, _reject| Err("no input"));
    /// assert_eq!(failed.state(), PromiseState::Rejected);
    ///
    /// let kept = Promise::<i32, &str>::new(|resolve, _reject| {
    ///     resolve.fulfill(1);
    ///     Err("too late")
    /// });
    /// assert_eq!(kept.outcome(), Some(Ok(1)));
    /// ```
    pub fn new<F>(initializer: F) -> Self
    where
        F: FnOnce(Resolver<T, E>, Rejecter<T, E>) -> Result<(), E>,
    {
        let (promise, resolver, rejecter) = Self::deferred();
        if let Err(reason) = initializer(resolver, rejecter.clone()) {
            rejecter.reject(reason);
        }
        promise
    }

    /// A pending promise together with the triggers that settle it.
    pub fn deferred() -> (Self, Resolver<T, E>, Rejecter<T, E>) {
        let promise = Self::pending();
        let resolver = Resolver { shared: promise.shared.clone() };
        let rejecter = Rejecter { shared: promise.shared.clone() };
        (promise, resolver, rejecter)
    }

    /// A promise already fulfilled with `value`.
    pub fn resolved(value: T) -> Self {
        let promise = Self::pending();
        promise.shared.settle(Ok(value));
        promise
    }

    /// A promise already rejected with `reason`.
    pub fn rejected(reason: E) -> Self {
        let promise = Self::pending();
        promise.shared.settle(Err(reason));
        promise
    }

    /// A promise resolved with `resolution`; given a promise, the result
    /// follows it.
    pub fn resolve_with(resolution: Resolution<T, E>) -> Result<Self, Error> {
        let promise = Self::pending();
        resolve(&promise.shared, resolution)?;
        Ok(promise)
    }

    /// The settled value or reason, or `None` while pending.
    pub fn outcome(&self) -> Option<Result<T, E>> {
        self.shared.outcome()
    }

    /// Runs `on_fulfilled` or `on_rejected` once this promise settles, before
    /// returning if it already has. Nothing is derived from what they do.
    pub fn on_settled<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + Send + 'static,
        R: FnOnce(E) + Send + 'static,
    {
        self.shared.register(move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(reason) => on_rejected(reason),
        });
    }

    /// Derives a promise from the settlement of this one.
    ///
    /// Whichever handler matches the settlement runs with the value or
    /// reason. The derived promise is resolved with what the handler returns
    /// (adopting it if it is a promise), or rejected if it returns `Err`.
    ///
    /// # Panics
    ///
    /// A panicking handler does not unwind into the caller: the panic is
    /// caught and logged, and the derived promise never settles. Return
    /// `Err` to reject it instead. The same holds for [`and_then`],
    /// [`map`], [`catch`] and [`finally`].
    ///
    /// [`and_then`]: Promise::and_then
    /// [`map`]: Promise::map
    /// [`catch`]: Promise::catch
    /// [`finally`]: Promise::finally
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + Send + 'static,
        R: FnOnce(E) -> Result<Resolution<U, E>, E> + Send + 'static,
    {
        self.chain(move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(reason) => on_rejected(reason),
        })
    }

    /// Like [`then`](Promise::then), passing a rejection through unchanged.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + Send + 'static,
    {
        self.then(on_fulfilled, Err)
    }

    /// Maps the fulfillment value, passing a rejection through unchanged.
    pub fn map<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.and_then(move |value| Ok(Resolution::Value(f(value))))
    }

    /// Handles a rejection, passing a fulfillment value through unchanged.
    ///
    /// ```
    /// use promise_then::{Promise, Resolution};
    ///
    /// let recovered = Promise::<&str, &str>::rejected("offline")
    ///     .catch(|reason| Ok(Resolution::Value(reason)));
    /// assert_eq!(recovered.outcome(), Some(Ok("offline")));
    /// ```
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> Result<Resolution<T, E>, E> + Send + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }

    /// Runs `on_finally` whatever the settlement, then settles the derived
    /// promise the same way as this one. An `Err` from `on_finally` rejects
    /// it instead.
    ///
    /// # Panics
    ///
    /// If `on_finally` panics, the panic is caught and logged and the
    /// derived promise never settles.
    pub fn finally<F>(&self, on_finally: F) -> Promise<T, E>
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
    {
        self.chain(move |outcome| {
            on_finally()?;
            outcome.map(Resolution::Value)
        })
    }

    fn chain<U, C>(&self, continuation: C) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        C: FnOnce(Result<T, E>) -> Result<Resolution<U, E>, E> + Send + 'static,
    {
        let derived = Promise::pending();
        let target = derived.shared.clone();
        self.shared.register(move |outcome| adopt(&target, continuation(outcome)));
        derived
    }
}

impl<T, E> Future for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.shared.poll_outcome(cx.waker()) {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}
