//! Promises built from collections of promises and plain values.
//!
//! Every combinator here sits on top of [`Promise::then`] and the public
//! triggers; none of them touches a promise's internals.
use std::mem;
use std::sync::{Arc, Mutex};

use crate::state::lock;
use crate::{Promise, Resolution};

/// Results gathered by position, remembering how many are still missing.
struct Gather<V> {
    slots: Vec<Option<V>>,
    remaining: usize,
}

impl<V> Gather<V> {
    fn new(len: usize) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            slots: (0..len).map(|_| None).collect(),
            remaining: len,
        }))
    }

    /// Stores `value` at `index`. Returns every slot, in order, once the last
    /// one has been filled.
    fn fill(&mut self, index: usize, value: V) -> Option<Vec<V>> {
        if let Some(slot) = self.slots.get_mut(index) {
            if slot.replace(value).is_none() {
                self.remaining -= 1;
            }
        }
        if self.remaining == 0 {
            Some(mem::take(&mut self.slots).into_iter().flatten().collect())
        } else {
            None
        }
    }
}

// The guard is released before the caller settles anything with the result.
fn fill<V>(gather: &Mutex<Gather<V>>, index: usize, value: V) -> Option<Vec<V>> {
    lock(gather).fill(index, value)
}

/// Fulfills with every value, in input order, once all have fulfilled, or
/// rejects with the first rejection.
///
/// Plain values take their slot straight away. An empty input fulfills with
/// an empty `Vec` before returning.
///
/// ```
/// use promise_then::{all, Promise, Resolution};
///
/// let (late, resolver, _) = Promise::<i32, String>::deferred();
/// let joined = all(vec![
///     Resolution::Value(1),
///     late.into(),
///     Resolution::Value(3),
/// ]);
/// assert!(joined.is_pending());
/// resolver.fulfill(2);
/// assert_eq!(joined.outcome(), Some(Ok(vec![1, 2, 3])));
/// ```
pub fn all<T, E, I>(items: I) -> Promise<Vec<T>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Resolution<T, E>>,
{
    let items: Vec<_> = items.into_iter().collect();
    let (joined, resolver, rejecter) = Promise::deferred();
    if items.is_empty() {
        resolver.fulfill(Vec::new());
        return joined;
    }
    let gather = Gather::new(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Resolution::Value(value) => {
                if let Some(values) = fill(&gather, index, value) {
                    resolver.fulfill(values);
                }
            }
            Resolution::Promise(promise) => {
                let gather = gather.clone();
                let resolver = resolver.clone();
                let rejecter = rejecter.clone();
                promise.then(
                    move |value| {
                        if let Some(values) = fill(&gather, index, value) {
                            resolver.fulfill(values);
                        }
                        Ok(Resolution::Value(()))
                    },
                    move |reason| {
                        rejecter.reject(reason);
                        Ok(Resolution::Value(()))
                    },
                );
            }
        }
    }
    joined
}

/// Fulfills with the outcome of every input, in input order, once all have
/// settled. Never rejects.
pub fn all_settled<T, E, I>(items: I) -> Promise<Vec<Result<T, E>>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Resolution<T, E>>,
{
    let items: Vec<_> = items.into_iter().collect();
    let (joined, resolver, _) = Promise::deferred();
    if items.is_empty() {
        resolver.fulfill(Vec::new());
        return joined;
    }
    let gather = Gather::new(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let promise = match item {
            Resolution::Value(value) => Promise::resolved(value),
            Resolution::Promise(promise) => promise,
        };
        let on_fulfilled = (gather.clone(), resolver.clone());
        let on_rejected = (gather.clone(), resolver.clone());
        promise.then(
            move |value| {
                let (gather, resolver) = on_fulfilled;
                if let Some(outcomes) = fill(&gather, index, Ok(value)) {
                    resolver.fulfill(outcomes);
                }
                Ok(Resolution::Value(()))
            },
            move |reason| {
                let (gather, resolver) = on_rejected;
                if let Some(outcomes) = fill(&gather, index, Err(reason)) {
                    resolver.fulfill(outcomes);
                }
                Ok(Resolution::Value(()))
            },
        );
    }
    joined
}

/// Settles the same way as the first input to settle.
///
/// Plain values count as settled when they are reached, so one that comes
/// before any promise always wins. An empty input never settles.
///
/// ```
/// use promise_then::{race, Promise, Resolution};
///
/// let winner = race(vec![Resolution::Value(1), Promise::<i32, String>::resolved(2).into()]);
/// assert_eq!(winner.outcome(), Some(Ok(1)));
/// ```
pub fn race<T, E, I>(items: I) -> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Resolution<T, E>>,
{
    let (winner, resolver, rejecter) = Promise::deferred();
    for item in items {
        match item {
            Resolution::Value(value) => resolver.fulfill(value),
            Resolution::Promise(promise) => {
                let resolver = resolver.clone();
                let rejecter = rejecter.clone();
                promise.then(
                    move |value| {
                        resolver.fulfill(value);
                        Ok(Resolution::Value(()))
                    },
                    move |reason| {
                        rejecter.reject(reason);
                        Ok(Resolution::Value(()))
                    },
                );
            }
        }
    }
    winner
}

/// Fulfills with the first fulfillment, or rejects with every reason, in
/// input order, once all inputs have rejected. An empty input rejects with
/// no reasons.
pub fn any<T, E, I>(items: I) -> Promise<T, Vec<E>>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Resolution<T, E>>,
{
    let items: Vec<_> = items.into_iter().collect();
    let (first, resolver, rejecter) = Promise::deferred();
    if items.is_empty() {
        rejecter.reject(Vec::new());
        return first;
    }
    let gather = Gather::new(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Resolution::Value(value) => resolver.fulfill(value),
            Resolution::Promise(promise) => {
                let gather = gather.clone();
                let resolver = resolver.clone();
                let rejecter = rejecter.clone();
                promise.then(
                    move |value| {
                        resolver.fulfill(value);
                        Ok(Resolution::Value(()))
                    },
                    move |reason| {
                        if let Some(reasons) = fill(&gather, index, reason) {
                            rejecter.reject(reasons);
                        }
                        Ok(Resolution::Value(()))
                    },
                );
            }
        }
    }
    first
}

#[cfg(test)]
mod tests {
    use super::{all, all_settled, any, race};
    use crate::{Promise, PromiseState, Resolution};

    #[test]
    fn test_all_keeps_input_order() {
        let (first, first_resolver, _) = Promise::<i32, String>::deferred();
        let (second, second_resolver, _) = Promise::<i32, String>::deferred();
        let joined = all(vec![first.into(), second.into(), Resolution::Value(3)]);
        second_resolver.fulfill(2);
        assert!(joined.is_pending());
        first_resolver.fulfill(1);
        assert_eq!(joined.outcome(), Some(Ok(vec![1, 2, 3])));
    }

    #[test]
    fn test_all_of_plain_values() {
        let joined = all(vec![
            Resolution::Value(1),
            Resolution::Value(2),
            Promise::<i32, String>::resolved(3).into(),
        ]);
        assert_eq!(joined.outcome(), Some(Ok(vec![1, 2, 3])));
    }

    #[test]
    fn test_all_empty_fulfills_immediately() {
        let joined = all(Vec::<Resolution<i32, String>>::new());
        assert_eq!(joined.outcome(), Some(Ok(vec![])));
    }

    #[test]
    fn test_all_rejects_on_first_rejection() {
        let (pending, _resolver, _) = Promise::<i32, String>::deferred();
        let joined = all(vec![
            pending.into(),
            Promise::<i32, String>::rejected("broken".to_owned()).into(),
            Resolution::Value(3),
        ]);
        assert_eq!(joined.outcome(), Some(Err("broken".to_owned())));
    }

    #[test]
    fn test_all_settled_collects_both_kinds() {
        let (late, _, rejecter) = Promise::<i32, String>::deferred();
        let joined = all_settled(vec![Resolution::Value(1), late.into()]);
        assert!(joined.is_pending());
        rejecter.reject("nope".into());
        assert_eq!(joined.outcome(), Some(Ok(vec![Ok(1), Err("nope".to_owned())])));
    }

    #[test]
    fn test_race_plain_value_wins() {
        let winner = race(vec![Resolution::Value(1), Promise::<i32, String>::resolved(2).into()]);
        assert_eq!(winner.outcome(), Some(Ok(1)));
    }

    #[test]
    fn test_race_first_settled_promise_wins() {
        let (slow, slow_resolver, _) = Promise::<i32, String>::deferred();
        let (fast, _, fast_rejecter) = Promise::<i32, String>::deferred();
        let winner = race(vec![slow.into(), fast.into()]);
        fast_rejecter.reject("fast".into());
        slow_resolver.fulfill(1);
        assert_eq!(winner.outcome(), Some(Err("fast".to_owned())));
    }

    #[test]
    fn test_race_empty_stays_pending() {
        let winner = race(Vec::<Resolution<i32, String>>::new());
        assert_eq!(winner.state(), PromiseState::Pending);
    }

    #[test]
    fn test_any_takes_first_fulfillment() {
        let first = any(vec![
            Promise::<i32, String>::rejected("a".into()).into(),
            Promise::<i32, String>::resolved(2).into(),
        ]);
        assert_eq!(first.outcome(), Some(Ok(2)));
    }

    #[test]
    fn test_any_rejects_with_all_reasons() {
        let (late, _, rejecter) = Promise::<i32, String>::deferred();
        let first = any(vec![late.into(), Promise::<i32, String>::rejected("b".to_owned()).into()]);
        assert!(first.is_pending());
        rejecter.reject("a".into());
        assert_eq!(first.outcome(), Some(Err(vec!["a".to_owned(), "b".to_owned()])));
    }

    #[test]
    fn test_any_empty_rejects() {
        let first = any(Vec::<Resolution<i32, String>>::new());
        assert_eq!(first.outcome(), Some(Err(vec![])));
    }
}
