//! Resolving a promise with something that may itself be a promise.
use std::sync::Arc;

use crate::state::Shared;
use crate::{Error, Promise};

/// What a promise can be resolved with: a plain value, or another promise
/// whose eventual settlement is adopted.
#[derive(Debug)]
pub enum Resolution<T, E> {
    Value(T),
    Promise(Promise<T, E>),
}

impl<T, E> From<Promise<T, E>> for Resolution<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Resolution::Promise(promise)
    }
}

/// Settles `target` with `resolution`, adopting the state of a promise.
///
/// A promise offered in a resolution is fully flattened: its own fulfillment
/// was already unwrapped when it settled, so fulfilling `target` with that
/// value needs no further recursion. Adoption is deferred through a reaction
/// on the offered promise, which runs at once if that promise has settled.
pub(crate) fn resolve<T, E>(
    target: &Arc<Shared<T, E>>,
    resolution: Resolution<T, E>,
) -> Result<(), Error>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    match resolution {
        Resolution::Promise(offered) if Arc::ptr_eq(target, &offered.shared) => {
            Err(Error::SelfResolution)
        }
        _ if !target.is_pending() => Ok(()),
        Resolution::Value(value) => {
            target.settle(Ok(value));
            Ok(())
        }
        Resolution::Promise(offered) => {
            let target = Arc::clone(target);
            offered.shared.register(move |outcome| {
                target.settle(outcome);
            });
            Ok(())
        }
    }
}

/// Settles the promise derived by a continuation from what the continuation
/// returned. An `Err` rejects it; a resolution goes through [`resolve`].
pub(crate) fn adopt<T, E>(target: &Arc<Shared<T, E>>, returned: Result<Resolution<T, E>, E>)
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    match returned {
        Ok(resolution) => {
            if let Err(error) = resolve(target, resolution) {
                tracing::error!(%error, "continuation returned its own derived promise");
            }
        }
        Err(reason) => {
            target.settle(Err(reason));
        }
    }
}
