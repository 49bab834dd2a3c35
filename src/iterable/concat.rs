use super::{
    super::{
        error::Error,
        result::Result,
        session::{Mode, Session},
    },
    LazyIterable,
};
use futures::ready;
use std::task::{Context, Poll};

/// Drains the first session, then switches to the second exactly once.
struct ConcatSession<T> {
    active: Box<dyn Session<T>>,
    second: Option<LazyIterable<T>>,
    mode: Mode,
    done: bool,
    released: bool,
}

impl<T: 'static> ConcatSession<T> {
    fn release(&mut self, error: Option<Error>) {
        // A released session must never open the second source
        self.second = None;

        if self.released {
            return;
        }
        self.released = true;

        match error {
            Some(e) => self.active.fail(e),
            None => self.active.cancel(),
        }
    }
}

impl<T: 'static> Session<T> for ConcatSession<T> {
    fn poll_advance(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<T>>> {
        if self.done || self.released {
            return Poll::Ready(Ok(None));
        }

        loop {
            if let Some(v) = ready!(self.active.poll_advance(cx))? {
                return Poll::Ready(Ok(Some(v)));
            }

            match self.second.take() {
                Some(second) => {
                    tracing::trace!("first source exhausted, switching to the second");

                    self.active = second.open_session(self.mode);
                }
                None => {
                    self.done = true;

                    return Poll::Ready(Ok(None));
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
    /// Yields every element of `self`, then every element of `second`.
    pub fn concat(&self, second: &LazyIterable<T>) -> LazyIterable<T> {
        let second = second.clone();

        self.wrap(move |active, mode| ConcatSession {
            active,
            second: Some(second.clone()),
            mode,
            done: false,
            released: false,
        })
    }
}
