pub mod concat;
pub mod control;
pub mod flat_map;
pub mod map;
pub mod materialize;

use super::{
    error::Error,
    result::Result,
    session::{
        source::{OwnedSession, SliceSession, StreamSession},
        Cursor, Iter, Mode, Session,
    },
};
use futures::{Stream, StreamExt};
use materialize::Cache;
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

type Factory<T> = dyn Fn(Mode) -> Box<dyn Session<T>>;

/// A composable iteration pipeline that has not run yet.
///
/// A `LazyIterable` only holds the function that starts an iteration.
/// Every call to [`LazyIterable::open`] produces an independent session;
/// operators such as [`LazyIterable::map`] wrap the iterable in a new one
/// without touching the source.
///
/// Clones share the factory, the session counter and the materialization
/// cache: they are handles to the same iterable.
pub struct LazyIterable<T> {
    factory: Rc<Factory<T>>,
    opened: Rc<Cell<usize>>,
    cache: Rc<RefCell<Cache<T>>>,
}

impl<T> Clone for LazyIterable<T> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            opened: self.opened.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<T> fmt::Debug for LazyIterable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyIterable")
            .field("opened", &self.opened.get())
            .field("cache", &*self.cache.borrow())
            .finish()
    }
}

impl<T: 'static> LazyIterable<T> {
    /// Builds an iterable from a custom start-iteration function.
    pub fn new<F, S>(factory: F) -> Self
    where
        F: Fn(Mode) -> S + 'static,
        S: Session<T> + 'static,
    {
        Self::from_factory(Rc::new(move |mode| {
            Box::new(factory(mode)) as Box<dyn Session<T>>
        }))
    }

    /// Builds an iterable whose sessions pull from a freshly created stream.
    pub fn from_stream<F, St>(factory: F) -> Self
    where
        F: Fn(Mode) -> St + 'static,
        St: Stream<Item = Result<T>> + 'static,
    {
        Self::new(move |mode| StreamSession::new(factory(mode).boxed_local()))
    }

    pub fn empty() -> Self {
        Self::new(|_| OwnedSession::<T>::new(Vec::new()))
    }

    fn from_factory(factory: Rc<Factory<T>>) -> Self {
        Self {
            factory,
            opened: Rc::new(Cell::new(0)),
            cache: Rc::new(RefCell::new(Cache::Unresolved)),
        }
    }

    /// Starts a new, independent session.
    pub fn open(&self, mode: Mode) -> Cursor<T> {
        Cursor::new(self.open_session(mode), mode)
    }

    pub(crate) fn open_session(&self, mode: Mode) -> Box<dyn Session<T>> {
        self.opened.set(self.opened.get() + 1);

        tracing::trace!(
            "opening session {} in {:?} mode",
            self.opened.get(),
            mode
        );

        (self.factory)(mode)
    }

    /// Wraps this iterable: every session of the result pulls from a fresh
    /// session of `self`.
    pub(crate) fn wrap<U, F, S>(&self, build: F) -> LazyIterable<U>
    where
        U: 'static,
        F: Fn(Box<dyn Session<T>>, Mode) -> S + 'static,
        S: Session<U> + 'static,
    {
        let source = self.clone();

        LazyIterable::new(move |mode| build(source.open_session(mode), mode))
    }

    /// The number of sessions this iterable has started.
    pub fn sessions_opened(&self) -> usize {
        self.opened.get()
    }

    /// Iterates synchronously.
    ///
    /// A suspension anywhere in the chain yields
    /// [`Error::UnexpectedSuspension`] and ends the iteration.
    pub fn iter(&self) -> Iter<T> {
        Iter::new(self.open(Mode::Sync))
    }

    /// Drains a synchronous session, handing every value to `callback`.
    pub fn for_each(&self, mut callback: impl FnMut(T)) -> Result<()> {
        let mut cursor = self.open(Mode::Sync);

        loop {
            match cursor.next_now() {
                Ok(Some(v)) => callback(v),
                Ok(None) => return Ok(()),
                Err(Error::UnexpectedSuspension) => {
                    cursor.cancel();

                    return Err(Error::UnexpectedSuspension);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<T: Clone + 'static> LazyIterable<T> {
    /// Builds an iterable over a fixed, ordered sequence.
    pub fn from_vec(items: Vec<T>) -> Self {
        let items: Rc<[T]> = Rc::from(items);

        Self::new(move |_| SliceSession::new(items.clone()))
    }
}

impl<T: Clone + 'static> From<Vec<T>> for LazyIterable<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T: Clone + 'static> FromIterator<T> for LazyIterable<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{super::session::tests::YieldingSession, *};
    use futures::stream;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_construction_is_lazy() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();

        let iterable = LazyIterable::<i32>::new(move |_| {
            counter.set(counter.get() + 1);

            SliceSession::new(Rc::from(vec![1, 2, 3]))
        });
        let chained = iterable.map(|x| x * 2).filter(|x| *x > 2).slice(0, 10);

        assert_eq!(calls.get(), 0);

        let items = chained.iter().collect::<Result<Vec<i32>>>().unwrap();
        assert_eq!(items, vec![4, 6]);
        assert_eq!(calls.get(), 1);
        assert_eq!(iterable.sessions_opened(), 1);
    }

    #[traced_test]
    #[test]
    fn test_sessions_are_independent() {
        let iterable: LazyIterable<i32> = (1..=3).collect();

        let mut a = iterable.open(Mode::Sync);
        let mut b = iterable.open(Mode::Sync);

        assert_eq!(a.next_now().unwrap(), Some(1));
        assert_eq!(a.next_now().unwrap(), Some(2));
        assert_eq!(b.next_now().unwrap(), Some(1));
        assert_eq!(iterable.sessions_opened(), 2);
    }

    #[traced_test]
    #[test]
    fn test_terminal_session_stays_done() {
        let iterable = LazyIterable::from(vec![1]);
        let mut cursor = iterable.open(Mode::Sync);

        assert_eq!(cursor.next_now().unwrap(), Some(1));
        assert_eq!(cursor.next_now().unwrap(), None);
        assert_eq!(cursor.next_now().unwrap(), None);
    }

    #[traced_test]
    #[test]
    fn test_for_each() {
        let mut seen = Vec::new();

        LazyIterable::from_vec(vec!["a", "b", "c"])
            .for_each(|v| seen.push(v))
            .unwrap();

        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[traced_test]
    #[test]
    fn test_for_each_rejects_suspension() {
        let session = YieldingSession::new(vec![1, 2]);
        let cancels = session.cancels.clone();
        let slot = RefCell::new(Some(session));

        let iterable = LazyIterable::<i32>::new(move |_| {
            slot.borrow_mut()
                .take()
                .unwrap_or_else(|| YieldingSession::new(Vec::new()))
        });

        let mut seen = Vec::new();
        let res = iterable.for_each(|v| seen.push(v));

        assert!(matches!(res, Err(Error::UnexpectedSuspension)));
        assert!(seen.is_empty());
        assert_eq!(cancels.get(), 1);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_from_stream() {
        let iterable = LazyIterable::from_stream(|_| {
            stream::iter(vec![1, 2, 3])
                .then(|x| async move {
                    tokio::task::yield_now().await;

                    Ok(x)
                })
        });

        let mut cursor = iterable.open(Mode::Async);
        let mut items = Vec::new();
        while let Some(v) = cursor.next().await.unwrap() {
            items.push(v);
        }

        assert_eq!(items, vec![1, 2, 3]);
    }

    #[traced_test]
    #[test]
    fn test_empty() {
        let iterable = LazyIterable::<u8>::empty();

        assert_eq!(iterable.iter().count(), 0);
    }
}
