//! One-shot hand-off of a computed value between threads.
//!
//! Both the query engine and the memos use these to let a thread wait for a
//! computation that another thread already started.

use std::mem;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
enum State<T> {
    Pending,
    Fulfilled(T),
    /// The promise was dropped without a value, or the value was taken.
    Broken,
}

#[derive(Debug)]
struct Shared<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

/// Waits for the value of a [`Promise`].
#[derive(Debug)]
pub(crate) struct Future<T> {
    shared: Arc<Shared<T>>,
}

/// Provides the value for a [`Future`]; dropping it unfulfilled wakes the
/// waiting thread with nothing.
#[derive(Debug)]
pub(crate) struct Promise<T> {
    shared: Arc<Shared<T>>,
    fulfilled: bool,
}

impl<T> Future<T> {
    pub(crate) fn new() -> (Future<T>, Promise<T>) {
        let shared = Arc::new(Shared { state: Mutex::new(State::Pending), ready: Condvar::new() });
        let future = Future { shared: Arc::clone(&shared) };
        let promise = Promise { shared, fulfilled: false };
        (future, promise)
    }

    /// Blocks until the promise is fulfilled or dropped.
    pub(crate) fn wait(self) -> Option<T> {
        let mut state = self.shared.state.lock();
        while matches!(*state, State::Pending) {
            self.shared.ready.wait(&mut state);
        }
        match mem::replace(&mut *state, State::Broken) {
            State::Fulfilled(value) => Some(value),
            State::Broken => None,
            State::Pending => unreachable!("invariant violated: woken while pending"),
        }
    }
}

impl<T> Promise<T> {
    pub(crate) fn fulfill(mut self, value: T) {
        self.fulfilled = true;
        self.settle(State::Fulfilled(value));
    }

    fn settle(&mut self, state: State<T>) {
        *self.shared.state.lock() = state;
        self.shared.ready.notify_all();
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if !self.fulfilled {
            self.settle(State::Broken);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::Future;

    #[test]
    fn test_fulfilled() {
        let (future, promise) = Future::new();
        promise.fulfill("page");
        assert_eq!(future.wait(), Some("page"));
    }

    #[test]
    fn test_dropped_promise() {
        let (future, promise) = Future::<u32>::new();
        drop(promise);
        assert_eq!(future.wait(), None);
    }

    #[test]
    fn test_fulfilled_from_another_thread() {
        let (future, promise) = Future::new();
        let waiter = thread::spawn(move || future.wait());
        thread::spawn(move || promise.fulfill(7)).join().unwrap();
        assert_eq!(waiter.join().unwrap(), Some(7));
    }

    #[test]
    fn test_dropped_on_another_thread() {
        let (future, promise) = Future::<()>::new();
        let waiter = thread::spawn(move || future.wait());
        thread::spawn(move || drop(promise)).join().unwrap();
        assert_eq!(waiter.join().unwrap(), None);
    }
}
