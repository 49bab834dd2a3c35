use super::{super::result::Result, LazyIterable};
use futures::future::LocalBoxFuture;
use std::future::Future;

/// What a transform decided to do with one source element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control<T> {
    /// The element produced no output; pull the next one.
    Continue,
    /// Emit the value and keep going.
    Emit(T),
    /// Emit the value as the final output of the session.
    Stop(T),
}

/// The result of invoking a transform: decided now, or once a future settles.
pub enum Transformed<T> {
    Ready(Result<Control<T>>),
    Pending(LocalBoxFuture<'static, Result<Control<T>>>),
}

impl<T> Transformed<T> {
    pub fn pending(fut: impl Future<Output = Result<Control<T>>> + 'static) -> Self {
        Self::Pending(Box::pin(fut))
    }
}

impl<T> From<Control<T>> for Transformed<T> {
    fn from(control: Control<T>) -> Self {
        Self::Ready(Ok(control))
    }
}

impl<T> From<Result<Control<T>>> for Transformed<T> {
    fn from(res: Result<Control<T>>) -> Self {
        Self::Ready(res)
    }
}

/// The output of a flat map callback for one source element.
///
/// Sequences are flattened a single level. A `Many` whose elements are
/// themselves sequences is emitted element by element, unflattened.
pub enum Expansion<T> {
    One(T),
    Many(Vec<T>),
    Lazy(LazyIterable<T>),
}

impl<T> From<Vec<T>> for Expansion<T> {
    fn from(items: Vec<T>) -> Self {
        Self::Many(items)
    }
}

impl<T> From<LazyIterable<T>> for Expansion<T> {
    fn from(iterable: LazyIterable<T>) -> Self {
        Self::Lazy(iterable)
    }
}
