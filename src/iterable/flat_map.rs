use super::{
    super::{
        error::Error,
        result::Result,
        session::{source::OwnedSession, Mode, Session},
    },
    control::Expansion,
    LazyIterable,
};
use futures::ready;
use std::{
    rc::Rc,
    task::{Context, Poll},
};

type Callback<T, U> = dyn Fn(T) -> Result<Expansion<U>>;

struct FlatMapSession<T, U> {
    source: Box<dyn Session<T>>,
    callback: Rc<Callback<T, U>>,
    inner: Option<Box<dyn Session<U>>>,
    mode: Mode,
    done: bool,
    released: bool,
}

impl<T, U> FlatMapSession<T, U> {
    fn release(&mut self, error: Option<Error>) {
        self.done = true;

        if self.released {
            return;
        }
        self.released = true;

        // The sub-sequence goes first, then the outer source
        if let Some(mut inner) = self.inner.take() {
            match &error {
                Some(e) => inner.fail(e.clone()),
                None => inner.cancel(),
            }
        }

        match error {
            Some(e) => self.source.fail(e),
            None => self.source.cancel(),
        }
    }
}

impl<T, U: 'static> Session<U> for FlatMapSession<T, U> {
    fn poll_advance(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<U>>> {
        loop {
            if self.done {
                return Poll::Ready(Ok(None));
            }

            if let Some(inner) = self.inner.as_mut() {
                match ready!(inner.poll_advance(cx))? {
                    Some(v) => return Poll::Ready(Ok(Some(v))),
                    None => self.inner = None,
                }
            }

            let value = match ready!(self.source.poll_advance(cx))? {
                Some(v) => v,
                None => {
                    self.done = true;

                    return Poll::Ready(Ok(None));
                }
            };

            match (self.callback)(value)? {
                Expansion::One(v) => return Poll::Ready(Ok(Some(v))),
                Expansion::Many(items) => {
                    self.inner = Some(Box::new(OwnedSession::new(items)));
                }
                Expansion::Lazy(iterable) => {
                    self.inner = Some(iterable.open_session(self.mode));
                }
            }
        }
    }

    fn cancel(&mut self) {
        self.release(None);
    }

    fn fail(&mut self, error: Error) {
        self.release(Some(error));
    }
}

impl<T: 'static> LazyIterable<T> {
    /// Maps each element to a scalar or a sequence and flattens sequences
    /// by one level.
    pub fn flat_map<U, E, F>(&self, callback: F) -> LazyIterable<U>
    where
        U: 'static,
        E: Into<Expansion<U>>,
        F: Fn(T) -> E + 'static,
    {
        self.try_flat_map(move |v| Ok(callback(v)))
    }

    /// Like [`LazyIterable::flat_map`], with a fallible callback.
    pub fn try_flat_map<U, E, F>(&self, callback: F) -> LazyIterable<U>
    where
        U: 'static,
        E: Into<Expansion<U>>,
        F: Fn(T) -> Result<E> + 'static,
    {
        let callback: Rc<Callback<T, U>> =
            Rc::new(move |v: T| -> Result<Expansion<U>> { callback(v).map(Into::into) });

        self.wrap(move |source, mode| FlatMapSession {
            source,
            callback: callback.clone(),
            inner: None,
            mode,
            done: false,
            released: false,
        })
    }
}
