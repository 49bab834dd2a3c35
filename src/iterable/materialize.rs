use super::{
    super::{
        error::Error,
        result::Result,
        session::{Cursor, Mode},
    },
    LazyIterable,
};
use futures::{
    future::{self, LocalBoxFuture, Shared},
    task::noop_waker_ref,
    FutureExt,
};
use serde::{ser::Error as SerError, Serialize, Serializer};
use std::{
    fmt,
    rc::Rc,
    result::Result as StdResult,
    task::{Context, Poll},
};
use tracing::Instrument;

type Drain<T> = Shared<LocalBoxFuture<'static, Result<Rc<Vec<T>>>>>;

/// The materialization state of an iterable.
pub(crate) enum Cache<T> {
    Unresolved,
    /// A drain is underway; every caller shares it.
    InFlight(Drain<T>),
    Resolved(Rc<Vec<T>>),
}

impl<T> fmt::Debug for Cache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved => write!(f, "Unresolved"),
            Self::InFlight(_) => write!(f, "InFlight"),
            Self::Resolved(items) => write!(f, "Resolved({} items)", items.len()),
        }
    }
}

/// Pulls every element out of the cursor, in order.
async fn drain<T: 'static>(mut cursor: Cursor<T>) -> Result<Rc<Vec<T>>> {
    let mut items = Vec::new();

    loop {
        match cursor.next().await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => return Ok(Rc::new(items)),
            Err(e) => {
                cursor.fail(e.clone());

                return Err(e);
            }
        }
    }
}

impl<T: 'static> LazyIterable<T> {
    /// Drains the iterable into a sequence, at most once per instance.
    ///
    /// The first call opens an asynchronous session and starts the drain.
    /// Calls made while it is underway share the same pending computation;
    /// calls made after it finished get the cached sequence. A failed drain
    /// leaves the iterable unresolved, so a later call starts over.
    #[tracing::instrument(skip(self))]
    pub fn materialize(&self) -> LocalBoxFuture<'static, Result<Rc<Vec<T>>>> {
        match &*self.cache.borrow() {
            Cache::Resolved(items) => {
                tracing::trace!("serving materialized sequence from cache");

                return future::ready(Ok(items.clone())).boxed_local();
            }
            Cache::InFlight(shared) => {
                tracing::trace!("joining in-flight materialization");

                return shared.clone().boxed_local();
            }
            Cache::Unresolved => {}
        }

        tracing::debug!("starting materialization");

        let cursor = self.open(Mode::Async);
        let slot = Rc::downgrade(&self.cache);

        let pending = async move {
            let res = drain(cursor).await;

            if let Some(cache) = slot.upgrade() {
                *cache.borrow_mut() = match &res {
                    Ok(items) => {
                        tracing::debug!("materialized {} items", items.len());

                        Cache::Resolved(items.clone())
                    }
                    Err(e) => {
                        tracing::debug!("materialization failed: {}", e);

                        Cache::Unresolved
                    }
                };
            }

            res
        }
        .instrument(tracing::Span::current())
        .boxed_local()
        .shared();

        *self.cache.borrow_mut() = Cache::InFlight(pending.clone());

        pending.boxed_local()
    }

    /// Materializes without waiting.
    ///
    /// Fails with [`Error::UnexpectedSuspension`] if the drain suspends; the
    /// drain stays in flight and a later [`LazyIterable::materialize`]
    /// resumes it.
    pub fn materialize_now(&self) -> Result<Rc<Vec<T>>> {
        let mut cx = Context::from_waker(noop_waker_ref());

        match self.materialize().poll_unpin(&mut cx) {
            Poll::Ready(res) => res,
            Poll::Pending => Err(Error::UnexpectedSuspension),
        }
    }

    /// The materialized sequence, if materialization has completed.
    pub fn snapshot(&self) -> Result<Rc<Vec<T>>> {
        match &*self.cache.borrow() {
            Cache::Resolved(items) => Ok(items.clone()),
            _ => Err(Error::NotResolved),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(&*self.cache.borrow(), Cache::Resolved(_))
    }
}

/// Serializes the materialized sequence. Serializing an iterable that has
/// not been materialized yet is an error.
impl<T: Serialize + 'static> Serialize for LazyIterable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        let items = self.snapshot().map_err(S::Error::custom)?;

        serializer.collect_seq(items.iter())
    }
}
