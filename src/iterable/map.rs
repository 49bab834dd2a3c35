use super::{
    super::{error::Error, result::Result, session::Session},
    control::{Control, Transformed},
    LazyIterable,
};
use futures::{future::LocalBoxFuture, ready};
use std::{
    future::Future,
    rc::Rc,
    task::{Context, Poll},
};

type Transform<T, U> = dyn Fn(T, usize) -> Transformed<U>;

/// Applies a transform to each pulled element.
///
/// A pending transform is parked in the session; the source is not pulled
/// again until it settles.
struct MapSession<T, U> {
    source: Box<dyn Session<T>>,
    transform: Rc<Transform<T, U>>,
    pending: Option<LocalBoxFuture<'static, Result<Control<U>>>>,
    index: usize,
    done: bool,
    released: bool,
}

impl<T, U> MapSession<T, U> {
    fn release(&mut self, error: Option<Error>) {
        self.pending = None;
        self.done = true;

        if self.released {
            return;
        }
        self.released = true;

        match error {
            Some(e) => self.source.fail(e),
            None => self.source.cancel(),
        }
    }
}

impl<T, U> Session<U> for MapSession<T, U> {
    fn poll_advance(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<U>>> {
        loop {
            if self.done {
                return Poll::Ready(Ok(None));
            }

            let control = match self.pending.as_mut() {
                Some(pending) => {
                    let res = ready!(pending.as_mut().poll(cx));
                    self.pending = None;

                    res?
                }
                None => {
                    let value = match ready!(self.source.poll_advance(cx))? {
                        Some(v) => v,
                        None => {
                            self.done = true;

                            return Poll::Ready(Ok(None));
                        }
                    };

                    let index = self.index;
                    self.index += 1;

                    match (self.transform)(value, index) {
                        Transformed::Ready(res) => res?,
                        Transformed::Pending(fut) => {
                            self.pending = Some(fut);

                            continue;
                        }
                    }
                }
            };

            match control {
                Control::Continue => continue,
                Control::Emit(v) => return Poll::Ready(Ok(Some(v))),
                Control::Stop(v) => {
                    // The stopping element is the last one pulled
                    tracing::trace!("transform stopped the session at index {}", self.index - 1);

                    // Nothing more will be pulled, so let the source go now
                    self.release(None);

                    return Poll::Ready(Ok(Some(v)));
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
    /// The general transform operator.
    ///
    /// `transform` receives each element with its zero-based position in the
    /// source and decides whether to emit, skip or stop, possibly
    /// asynchronously.
    pub fn map_with<U, F>(&self, transform: F) -> LazyIterable<U>
    where
        U: 'static,
        F: Fn(T, usize) -> Transformed<U> + 'static,
    {
        let transform: Rc<Transform<T, U>> = Rc::new(transform);

        self.wrap(move |source, _mode| MapSession {
            source,
            transform: transform.clone(),
            pending: None,
            index: 0,
            done: false,
            released: false,
        })
    }

    pub fn map<U: 'static>(&self, f: impl Fn(T) -> U + 'static) -> LazyIterable<U> {
        self.map_with(move |v, _| Control::Emit(f(v)).into())
    }

    pub fn map_indexed<U: 'static>(&self, f: impl Fn(T, usize) -> U + 'static) -> LazyIterable<U> {
        self.map_with(move |v, i| Control::Emit(f(v, i)).into())
    }

    /// Maps with a fallible function. An error aborts the current advance.
    pub fn try_map<U: 'static>(
        &self,
        f: impl Fn(T) -> Result<U> + 'static,
    ) -> LazyIterable<U> {
        self.map_with(move |v, _| f(v).map(Control::Emit).into())
    }

    /// Maps with an asynchronous function, awaited before the next pull.
    pub fn map_async<U, F, Fut>(&self, f: F) -> LazyIterable<U>
    where
        U: 'static,
        F: Fn(T) -> Fut + 'static,
        Fut: Future<Output = Result<U>> + 'static,
    {
        self.map_with(move |v, _| {
            let fut = f(v);

            Transformed::pending(async move { fut.await.map(Control::Emit) })
        })
    }

    pub fn filter(&self, predicate: impl Fn(&T) -> bool + 'static) -> LazyIterable<T> {
        self.map_with(move |v, _| {
            if predicate(&v) {
                Control::Emit(v).into()
            } else {
                Control::Continue.into()
            }
        })
    }

    /// Keeps the elements from index `start` through index `end`, both
    /// included.
    ///
    /// The bound is closed: `[10, 20, 30, 40].slice(1, 2)` yields
    /// `[20, 30]`. Reaching `end` stops the session and releases the source.
    /// When `start > end` the element at `start` is the only one emitted.
    pub fn slice(&self, start: usize, end: usize) -> LazyIterable<T> {
        self.map_with(move |v, i| {
            if i < start {
                Control::Continue.into()
            } else if i >= end {
                Control::Stop(v).into()
            } else {
                Control::Emit(v).into()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        super::super::session::{
            tests::{yield_once, YieldingSession},
            Mode,
        },
        *,
    };
    use rand::Rng;
    use std::cell::{Cell, RefCell};
    use tracing_test::traced_test;

    fn random_items(len: usize) -> Vec<i64> {
        let mut rng = rand::thread_rng();

        (0..len).map(|_| rng.gen_range(-1_000..1_000)).collect()
    }

    fn yielding(items: Vec<i32>) -> (LazyIterable<i32>, Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let session = YieldingSession::new(items);
        let pulls = session.pulls.clone();
        let cancels = session.cancels.clone();
        let slot = RefCell::new(Some(session));

        let iterable = LazyIterable::<i32>::new(move |_| {
            slot.borrow_mut()
                .take()
                .unwrap_or_else(|| YieldingSession::new(Vec::new()))
        });

        (iterable, pulls, cancels)
    }

    #[traced_test]
    #[test]
    fn test_map() {
        let items = LazyIterable::from_vec(vec![1, 2, 3, 4, 5])
            .map(|x| x * 2)
            .iter()
            .collect::<Result<Vec<i32>>>()
            .unwrap();

        assert_eq!(items, vec![2, 4, 6, 8, 10]);
    }

    #[traced_test]
    #[test]
    fn test_map_matches_elementwise() {
        for len in [0, 1, 17, 256] {
            let source = random_items(len);
            let expected = source.iter().map(|x| x * 3 - 1).collect::<Vec<i64>>();

            let mapped = LazyIterable::from_vec(source)
                .map(|x| x * 3 - 1)
                .iter()
                .collect::<Result<Vec<i64>>>()
                .unwrap();

            assert_eq!(mapped, expected);
        }
    }

    #[traced_test]
    #[test]
    fn test_map_indexed() {
        let items = LazyIterable::from_vec(vec!["a", "b", "c"])
            .filter(|s| *s != "b")
            .map_indexed(|s, i| format!("{}{}", s, i))
            .iter()
            .collect::<Result<Vec<String>>>()
            .unwrap();

        // The index counts elements reaching this operator
        assert_eq!(items, vec!["a0", "c1"]);
    }

    #[traced_test]
    #[test]
    fn test_filter() {
        let items = LazyIterable::from_vec(vec![1, 2, 3, 4, 5])
            .filter(|x| x % 2 == 0)
            .iter()
            .collect::<Result<Vec<i32>>>()
            .unwrap();

        assert_eq!(items, vec![2, 4]);
    }

    #[traced_test]
    #[test]
    fn test_filter_matches_retain() {
        let source = random_items(200);
        let mut expected = source.clone();
        expected.retain(|x| x % 3 == 0);

        let filtered = LazyIterable::from_vec(source)
            .filter(|x| x % 3 == 0)
            .iter()
            .collect::<Result<Vec<i64>>>()
            .unwrap();

        assert_eq!(filtered, expected);
    }

    #[traced_test]
    #[test]
    fn test_slice_inclusive_end() {
        let items = LazyIterable::from_vec(vec![10, 20, 30, 40])
            .slice(1, 2)
            .iter()
            .collect::<Result<Vec<i32>>>()
            .unwrap();

        assert_eq!(items, vec![20, 30]);
    }

    #[traced_test]
    #[test]
    fn test_slice_bounds() {
        let source = (0..10).collect::<LazyIterable<i32>>();
        let collect = |it: LazyIterable<i32>| it.iter().collect::<Result<Vec<i32>>>().unwrap();

        assert_eq!(collect(source.slice(0, 0)), vec![0]);
        assert_eq!(collect(source.slice(8, 20)), vec![8, 9]);
        assert_eq!(collect(source.slice(12, 20)), Vec::<i32>::new());
        assert_eq!(collect(source.slice(4, 1)), vec![4]);

        for start in 0..10 {
            for end in start..10 {
                let expected = (start as i32..=end as i32).collect::<Vec<i32>>();

                assert_eq!(collect(source.slice(start, end)), expected);
            }
        }
    }

    #[traced_test]
    #[test]
    fn test_stop_releases_source_once() {
        let cancels = Rc::new(Cell::new(0));
        let pulls = Rc::new(Cell::new(0));
        let (c, p) = (cancels.clone(), pulls.clone());

        let source = LazyIterable::<i32>::new(move |_| CountingSession {
            next: 0,
            pulls: p.clone(),
            cancels: c.clone(),
        });

        let mut cursor = source.slice(0, 1).open(Mode::Sync);
        assert_eq!(cursor.next_now().unwrap(), Some(0));
        assert_eq!(cursor.next_now().unwrap(), Some(1));
        assert_eq!(cancels.get(), 1);

        assert_eq!(cursor.next_now().unwrap(), None);
        cursor.cancel();

        assert_eq!(cancels.get(), 1);
        assert_eq!(pulls.get(), 2);
        assert!(logs_contain("transform stopped the session at index 1"));
        assert!(!logs_contain("transform stopped the session at index 2"));
    }

    #[traced_test]
    #[test]
    fn test_cancel_mid_iteration() {
        let cancels = Rc::new(Cell::new(0));
        let pulls = Rc::new(Cell::new(0));
        let (c, p) = (cancels.clone(), pulls.clone());

        let source = LazyIterable::<i32>::new(move |_| CountingSession {
            next: 0,
            pulls: p.clone(),
            cancels: c.clone(),
        });

        let mut cursor = source.map(|x| x + 1).filter(|_| true).open(Mode::Sync);
        assert_eq!(cursor.next_now().unwrap(), Some(1));
        assert_eq!(cursor.next_now().unwrap(), Some(2));

        cursor.cancel();
        cursor.cancel();

        assert_eq!(cursor.next_now().unwrap(), None);
        assert_eq!(cancels.get(), 1);
        assert_eq!(pulls.get(), 2);
    }

    #[traced_test]
    #[test]
    fn test_fail_is_forwarded() {
        let seen = Rc::new(RefCell::new(None));
        let slot = seen.clone();

        let source = LazyIterable::<i32>::new(move |_| FailRecorder { seen: slot.clone() });
        let mut cursor = source.map(|x| x).open(Mode::Sync);

        cursor.fail(Error::aborted("client went away"));

        assert!(matches!(&*seen.borrow(), Some(Error::Aborted(reason)) if reason == "client went away"));
        assert_eq!(cursor.next_now().unwrap(), None);
    }

    #[traced_test]
    #[test]
    fn test_transform_error() {
        let mut cursor = LazyIterable::from_vec(vec![1, 0, 2])
            .try_map(|x| {
                if x == 0 {
                    Err(Error::aborted("zero"))
                } else {
                    Ok(10 / x)
                }
            })
            .open(Mode::Sync);

        assert_eq!(cursor.next_now().unwrap(), Some(10));
        assert!(matches!(cursor.next_now(), Err(Error::Aborted(_))));

        // The error does not end the session
        assert_eq!(cursor.next_now().unwrap(), Some(5));
        assert_eq!(cursor.next_now().unwrap(), None);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_map_over_suspending_source() {
        let (iterable, pulls, _) = yielding(vec![1, 2, 3]);
        let mut cursor = iterable.map(|x| x * 10).filter(|x| *x != 20).open(Mode::Async);

        let mut items = Vec::new();
        while let Some(v) = cursor.next().await.unwrap() {
            items.push(v);
        }

        assert_eq!(items, vec![10, 30]);
        assert_eq!(pulls.get(), 4);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_map_async() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let log = order.clone();

        let iterable = LazyIterable::from_vec(vec![1, 2, 3]).map_async(move |x| {
            let log = log.clone();

            async move {
                tokio::task::yield_now().await;
                log.borrow_mut().push(x);

                Ok(x + 100)
            }
        });

        let mut cursor = iterable.open(Mode::Async);
        assert!(cursor.advance().is_pending());

        let mut items = Vec::new();
        while let Some(v) = cursor.next().await.unwrap() {
            items.push(v);
        }

        assert_eq!(items, vec![101, 102, 103]);
        assert_eq!(*order.borrow(), vec![1, 2, 3]);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_async_skip_and_stop() {
        let iterable = LazyIterable::from_vec(vec![1, 2, 3, 4, 5]).map_with(|x, _| {
            Transformed::pending(async move {
                tokio::task::yield_now().await;

                Ok(match x {
                    2 => Control::Continue,
                    4 => Control::Stop(x),
                    _ => Control::Emit(x),
                })
            })
        });

        let mut cursor = iterable.open(Mode::Async);
        let mut items = Vec::new();
        while let Some(v) = cursor.next().await.unwrap() {
            items.push(v);
        }

        assert_eq!(items, vec![1, 3, 4]);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_async_transform_error() {
        let iterable = LazyIterable::from_vec(vec![1, 2]).map_async(|x| async move {
            if x == 1 {
                Err(Error::NotResolved)
            } else {
                Ok(x)
            }
        });

        let mut cursor = iterable.open(Mode::Async);
        assert!(matches!(cursor.next().await, Err(Error::NotResolved)));
        assert_eq!(cursor.next().await.unwrap(), Some(2));
    }

    #[traced_test]
    #[test]
    fn test_sync_consumer_rejects_async_transform() {
        let iterable = LazyIterable::from_vec(vec![1]).map_async(|x| async move {
            yield_once().await;

            Ok(x)
        });

        let res = iterable.iter().collect::<Result<Vec<i32>>>();
        assert!(matches!(res, Err(Error::UnexpectedSuspension)));
    }

    struct CountingSession {
        next: i32,
        pulls: Rc<Cell<usize>>,
        cancels: Rc<Cell<usize>>,
    }

    impl Session<i32> for CountingSession {
        fn poll_advance(&mut self, _cx: &mut Context<'_>) -> Poll<Result<Option<i32>>> {
            self.pulls.set(self.pulls.get() + 1);
            self.next += 1;

            Poll::Ready(Ok(Some(self.next - 1)))
        }

        fn cancel(&mut self) {
            self.cancels.set(self.cancels.get() + 1);
        }

        fn fail(&mut self, _error: Error) {
            self.cancels.set(self.cancels.get() + 1);
        }
    }

    struct FailRecorder {
        seen: Rc<RefCell<Option<Error>>>,
    }

    impl Session<i32> for FailRecorder {
        fn poll_advance(&mut self, _cx: &mut Context<'_>) -> Poll<Result<Option<i32>>> {
            Poll::Ready(Ok(Some(1)))
        }

        fn cancel(&mut self) {}

        fn fail(&mut self, error: Error) {
            *self.seen.borrow_mut() = Some(error);
        }
    }
}
