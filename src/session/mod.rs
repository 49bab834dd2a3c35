pub mod arena;
pub mod source;

use super::{error::Error, result::Result};
use futures::{
    future::{self, LocalBoxFuture},
    stream::LocalBoxStream,
    task::noop_waker_ref,
    Stream, StreamExt,
};
use std::{
    pin::Pin,
    task::{Context, Poll},
};

/// The flavor of consumption a session is opened for.
///
/// Sources may use the flag to pick a blocking or non-blocking read path.
/// Synchronous consumers treat a pending step as a programming error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Sync,
    Async,
}

/// The outcome of a single advance: either available now or still pending.
///
/// `None` marks completion of the session.
pub enum Step<'a, T> {
    Ready(Result<Option<T>>),
    Pending(LocalBoxFuture<'a, Result<Option<T>>>),
}

impl<'a, T> Step<'a, T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Waits for the step to settle.
    pub async fn resolve(self) -> Result<Option<T>> {
        match self {
            Self::Ready(res) => res,
            Self::Pending(fut) => fut.await,
        }
    }
}

/// A live cursor over a lazy iterable.
///
/// Implementors only provide the poll form of advancing; `advance` wraps it
/// into a [`Step`]. Once `poll_advance` has returned `Ok(None)` every later
/// call must return `Ok(None)` without touching upstream state.
pub trait Session<T> {
    fn poll_advance(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<T>>>;

    /// Signals early termination to the active upstream session.
    fn cancel(&mut self);

    /// Signals an abort with a reason to the active upstream session.
    fn fail(&mut self, error: Error);

    fn advance<'a>(&'a mut self) -> Step<'a, T>
    where
        T: 'a,
    {
        let mut cx = Context::from_waker(noop_waker_ref());

        match self.poll_advance(&mut cx) {
            Poll::Ready(res) => Step::Ready(res),
            Poll::Pending => Step::Pending(Box::pin(future::poll_fn(move |cx| {
                self.poll_advance(cx)
            }))),
        }
    }
}

/// An owned session handed out to consumers.
pub struct Cursor<T> {
    session: Box<dyn Session<T>>,
    mode: Mode,
}

impl<T: 'static> Cursor<T> {
    pub(crate) fn new(session: Box<dyn Session<T>>, mode: Mode) -> Self {
        Self { session, mode }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn advance(&mut self) -> Step<'_, T> {
        self.session.advance()
    }

    /// Advances the cursor, awaiting any suspension along the way.
    pub async fn next(&mut self) -> Result<Option<T>> {
        future::poll_fn(|cx| self.session.poll_advance(cx)).await
    }

    /// Advances the cursor without waiting.
    ///
    /// Fails with [`Error::UnexpectedSuspension`] if the chain suspends. The
    /// suspended step stays parked in the session and is resumed by the
    /// next call.
    pub fn next_now(&mut self) -> Result<Option<T>> {
        let mut cx = Context::from_waker(noop_waker_ref());

        match self.session.poll_advance(&mut cx) {
            Poll::Ready(res) => res,
            Poll::Pending => Err(Error::UnexpectedSuspension),
        }
    }

    pub fn cancel(&mut self) {
        tracing::debug!("cancelling session");

        self.session.cancel();
    }

    pub fn fail(&mut self, error: Error) {
        tracing::debug!("failing session: {}", error);

        self.session.fail(error);
    }

    pub fn into_stream(self) -> LocalBoxStream<'static, Result<T>> {
        self.boxed_local()
    }
}

impl<T: 'static> Stream for Cursor<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut()
            .session
            .poll_advance(cx)
            .map(|res| res.transpose())
    }
}

/// A synchronous iterator over a session opened in [`Mode::Sync`].
///
/// A pending step ends the iteration with [`Error::UnexpectedSuspension`]
/// after cancelling the session.
pub struct Iter<T> {
    cursor: Cursor<T>,
    done: bool,
}

impl<T: 'static> Iter<T> {
    pub(crate) fn new(cursor: Cursor<T>) -> Self {
        Self {
            cursor,
            done: false,
        }
    }

    pub fn cancel(&mut self) {
        self.done = true;
        self.cursor.cancel();
    }
}

impl<T: 'static> Iterator for Iter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.cursor.next_now() {
            Ok(Some(v)) => Some(Ok(v)),
            Ok(None) => {
                self.done = true;

                None
            }
            Err(Error::UnexpectedSuspension) => {
                self.cancel();

                Some(Err(Error::UnexpectedSuspension))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
