use super::{
    super::{error::Error, result::Result},
    Session,
};
use futures::{stream::LocalBoxStream, StreamExt};
use std::{
    rc::Rc,
    task::{Context, Poll},
    vec,
};

/// Iterates a shared, fixed sequence by cloning each element out.
pub struct SliceSession<T> {
    items: Rc<[T]>,
    position: usize,
    done: bool,
}

impl<T> SliceSession<T> {
    pub fn new(items: Rc<[T]>) -> Self {
        Self {
            items,
            position: 0,
            done: false,
        }
    }
}

impl<T: Clone> Session<T> for SliceSession<T> {
    fn poll_advance(&mut self, _cx: &mut Context<'_>) -> Poll<Result<Option<T>>> {
        if self.done {
            return Poll::Ready(Ok(None));
        }

        match self.items.get(self.position) {
            Some(item) => {
                self.position += 1;

                Poll::Ready(Ok(Some(item.clone())))
            }
            None => {
                self.done = true;

                Poll::Ready(Ok(None))
            }
        }
    }

    fn cancel(&mut self) {
        self.done = true;
    }

    fn fail(&mut self, _error: Error) {
        self.done = true;
    }
}

/// Iterates an owned sequence, moving each element out.
pub struct OwnedSession<T> {
    items: Option<vec::IntoIter<T>>,
}

impl<T> OwnedSession<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: Some(items.into_iter()),
        }
    }
}

impl<T> Session<T> for OwnedSession<T> {
    fn poll_advance(&mut self, _cx: &mut Context<'_>) -> Poll<Result<Option<T>>> {
        let next = self.items.as_mut().and_then(|items| items.next());

        // Drop the remaining elements as soon as the sequence is exhausted
        if next.is_none() {
            self.items = None;
        }

        Poll::Ready(Ok(next))
    }

    fn cancel(&mut self) {
        self.items = None;
    }

    fn fail(&mut self, _error: Error) {
        self.items = None;
    }
}

/// Pulls from an asynchronous stream of results.
///
/// Cancelling or failing the session drops the stream, which releases
/// whatever resource the stream holds.
pub struct StreamSession<T> {
    stream: Option<LocalBoxStream<'static, Result<T>>>,
}

impl<T> StreamSession<T> {
    pub fn new(stream: LocalBoxStream<'static, Result<T>>) -> Self {
        Self {
            stream: Some(stream),
        }
    }
}

impl<T> Session<T> for StreamSession<T> {
    fn poll_advance(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<T>>> {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Poll::Ready(Ok(None)),
        };

        match stream.poll_next_unpin(cx) {
            Poll::Ready(Some(res)) => Poll::Ready(res.map(Some)),
            Poll::Ready(None) => {
                self.stream = None;

                Poll::Ready(Ok(None))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn cancel(&mut self) {
        self.stream = None;
    }

    fn fail(&mut self, error: Error) {
        tracing::debug!("releasing stream after failure: {}", error);

        self.stream = None;
    }
}
