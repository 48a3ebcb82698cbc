//! The settlement state machine shared by every handle to one promise.
//!
//! A promise moves from pending to fulfilled or rejected exactly once. Reactions
//! registered while it is pending wait in a FIFO queue and are drained by the
//! thread that settles it; reactions registered afterwards run right away on the
//! registering thread.
use std::any::Any;
use std::collections::VecDeque;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::Waker;

/// Where a promise is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

/// A continuation waiting for the settlement of a promise.
pub(crate) type Reaction<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

#[derive(Debug)]
enum Settlement<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> From<Result<T, E>> for Settlement<T, E> {
    fn from(outcome: Result<T, E>) -> Self {
        match outcome {
            Ok(value) => Settlement::Fulfilled(value),
            Err(reason) => Settlement::Rejected(reason),
        }
    }
}

struct Inner<T, E> {
    settlement: Settlement<T, E>,
    reactions: VecDeque<Reaction<T, E>>,
    // Set between the state transition and the end of the drain. New reactions
    // queue up behind the ones already waiting instead of jumping ahead.
    draining: bool,
    wakers: Vec<Waker>,
    // A reaction was registered, the promise was awaited, or its outcome read.
    observed: bool,
}

impl<T: Clone, E: Clone> Inner<T, E> {
    fn outcome(&self) -> Option<Result<T, E>> {
        match &self.settlement {
            Settlement::Pending => None,
            Settlement::Fulfilled(value) => Some(Ok(value.clone())),
            Settlement::Rejected(reason) => Some(Err(reason.clone())),
        }
    }
}

impl<T, E> Drop for Inner<T, E> {
    fn drop(&mut self) {
        if matches!(self.settlement, Settlement::Rejected(_)) && !self.observed {
            tracing::warn!("promise rejected and dropped without a rejection handler");
        }
    }
}

pub(crate) struct Shared<T, E> {
    inner: Mutex<Inner<T, E>>,
}

/// Locks `mutex`, ignoring poisoning. No user code ever runs while one of
/// this crate's locks is held, so the protected data is always consistent.
pub(crate) fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T, E> Shared<T, E> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                settlement: Settlement::Pending,
                reactions: VecDeque::new(),
                draining: false,
                wakers: vec![],
                observed: false,
            }),
        }
    }

    pub(crate) fn state(&self) -> PromiseState {
        match lock(&self.inner).settlement {
            Settlement::Pending => PromiseState::Pending,
            Settlement::Fulfilled(_) => PromiseState::Fulfilled,
            Settlement::Rejected(_) => PromiseState::Rejected,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }
}

impl<T: Clone, E: Clone> Shared<T, E> {
    /// The settled outcome. Reading a rejection counts as handling it.
    pub(crate) fn outcome(&self) -> Option<Result<T, E>> {
        let mut inner = lock(&self.inner);
        let outcome = inner.outcome();
        if outcome.is_some() {
            inner.observed = true;
        }
        outcome
    }

    #[cfg(test)]
    fn observed(&self) -> bool {
        lock(&self.inner).observed
    }

    /// Settles a pending promise and drains its reactions in registration
    /// order. Returns `false`, changing nothing, if it was already settled.
    pub(crate) fn settle(&self, outcome: Result<T, E>) -> bool {
        {
            let mut inner = lock(&self.inner);
            if !matches!(inner.settlement, Settlement::Pending) {
                tracing::trace!("ignoring settlement of an already settled promise");
                return false;
            }
            tracing::trace!(
                fulfilled = outcome.is_ok(),
                queued = inner.reactions.len(),
                "settling promise"
            );
            inner.settlement = outcome.into();
            inner.draining = true;
        }
        self.drain();
        true
    }

    fn drain(&self) {
        loop {
            let (reaction, outcome) = {
                let mut inner = lock(&self.inner);
                let next = match inner.reactions.pop_front() {
                    Some(reaction) => inner.outcome().map(|outcome| (reaction, outcome)),
                    None => None,
                };
                match next {
                    Some(next) => next,
                    None => {
                        // The queue is empty and draining ends under the same
                        // lock, so a concurrent `register` either lands in the
                        // queue before this point or runs its reaction itself.
                        inner.draining = false;
                        let wakers = mem::take(&mut inner.wakers);
                        drop(inner);
                        for waker in wakers {
                            waker.wake()
                        }
                        return;
                    }
                }
            };
            run_isolated(reaction, outcome);
        }
    }

    /// Queues `reaction` while the promise is pending (or still draining),
    /// otherwise runs it before returning.
    pub(crate) fn register<F>(&self, reaction: F)
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        let outcome = {
            let mut inner = lock(&self.inner);
            inner.observed = true;
            match inner.outcome() {
                Some(outcome) if !inner.draining => outcome,
                _ => {
                    inner.reactions.push_back(Box::new(reaction));
                    return;
                }
            }
        };
        run_isolated(Box::new(reaction), outcome);
    }

    /// The settled outcome, or `None` after remembering `waker` to be woken
    /// once the pending reactions have run.
    pub(crate) fn poll_outcome(&self, waker: &Waker) -> Option<Result<T, E>> {
        let mut inner = lock(&self.inner);
        inner.observed = true;
        if !inner.draining {
            if let Some(outcome) = inner.outcome() {
                return Some(outcome);
            }
        }
        if !inner.wakers.iter().any(|known| known.will_wake(waker)) {
            inner.wakers.push(waker.clone());
        }
        None
    }
}

/// Runs one reaction. A panic is logged and swallowed so the remaining
/// reactions still run.
fn run_isolated<T, E>(reaction: Reaction<T, E>, outcome: Result<T, E>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || reaction(outcome))) {
        tracing::error!(panic = panic_message(payload.as_ref()), "promise reaction panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::{PromiseState, Shared};
    use std::sync::{Arc, Mutex};

    type Recording = Box<dyn FnOnce(Result<i32, String>) + Send>;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Recording) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &str| {
            let sink = sink.clone();
            let name = name.to_owned();
            Box::new(move |outcome: Result<i32, String>| {
                sink.lock().unwrap().push(format!("{name}:{outcome:?}"));
            }) as Recording
        };
        (log, make)
    }

    #[test]
    fn test_reading_rejection_marks_it_observed() {
        let shared = Shared::<i32, String>::new();
        assert_eq!(shared.outcome(), None);
        assert!(!shared.observed());
        shared.settle(Err("seen".into()));
        assert_eq!(shared.outcome(), Some(Err("seen".to_owned())));
        assert!(shared.observed());
    }

    #[test]
    fn test_queue_is_empty_once_drain_finishes() {
        let (log, make) = recorder();
        let shared = Shared::<i32, String>::new();
        shared.register(make("queued"));
        shared.settle(Ok(4));
        shared.register(make("after"));
        assert!(super::lock(&shared.inner).reactions.is_empty());
        assert!(!super::lock(&shared.inner).draining);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["queued:Ok(4)".to_owned(), "after:Ok(4)".to_owned()]
        );
    }

    #[test]
    fn test_settles_once() {
        let shared = Shared::<i32, String>::new();
        assert_eq!(shared.state(), PromiseState::Pending);
        assert!(shared.settle(Ok(1)));
        assert!(!shared.settle(Ok(2)));
        assert!(!shared.settle(Err("late".into())));
        assert_eq!(shared.state(), PromiseState::Fulfilled);
        assert_eq!(shared.outcome(), Some(Ok(1)));
    }

    #[test]
    fn test_reactions_drain_in_order() {
        let (log, make) = recorder();
        let shared = Shared::<i32, String>::new();
        shared.register(make("h1"));
        shared.register(make("h2"));
        shared.register(make("h3"));
        assert!(log.lock().unwrap().is_empty());
        shared.settle(Err("boom".into()));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "h1:Err(\"boom\")".to_owned(),
                "h2:Err(\"boom\")".to_owned(),
                "h3:Err(\"boom\")".to_owned(),
            ]
        );
    }

    #[test]
    fn test_late_registration_runs_immediately() {
        let (log, make) = recorder();
        let shared = Shared::<i32, String>::new();
        shared.settle(Ok(7));
        shared.register(make("late"));
        assert_eq!(*log.lock().unwrap(), vec!["late:Ok(7)".to_owned()]);
    }

    #[test]
    fn test_panicking_reaction_does_not_stop_drain() {
        let (log, make) = recorder();
        let shared = Shared::<i32, String>::new();
        shared.register(make("before"));
        shared.register(|_| panic!("reaction failed"));
        shared.register(make("after"));
        shared.settle(Ok(3));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["before:Ok(3)".to_owned(), "after:Ok(3)".to_owned()]
        );
    }

    #[test]
    fn test_registration_during_drain_is_queued() {
        let (log, make) = recorder();
        let shared = Arc::new(Shared::<i32, String>::new());
        let reentrant = shared.clone();
        let nested = make("nested");
        shared.register(move |_| reentrant.register(nested));
        shared.register(make("second"));
        shared.settle(Ok(5));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["second:Ok(5)".to_owned(), "nested:Ok(5)".to_owned()]
        );
    }
}
