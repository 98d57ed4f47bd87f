use crate::error::LoadError;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};

/// The outcome shared by every caller of one load.
pub(crate) type LoadResult<V> = Result<Arc<V>, LoadError>;

/// Represents a waiter in the queue for a `LoadFuture`.
pub(crate) enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }
}

/// The internal state of a value being loaded.
enum State<V> {
  Computing,
  Complete(LoadResult<V>),
}

/// The internal, mutex-protected core of the LoadFuture.
struct Inner<V> {
  state: State<V>,
  waiters: VecDeque<Waiter>,
}

/// A value being computed for the cache.
///
/// It sits in its shard's pending table while the load runs and can be waited
/// on by multiple sync threads and async tasks simultaneously. Every waiter
/// observes the same value or the same error.
pub(crate) struct LoadFuture<V> {
  inner: Mutex<Inner<V>>,
}

impl<V> LoadFuture<V> {
  /// Creates a new `LoadFuture` in the "Computing" state.
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Computing,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Completes the future, waking all waiters. Only the first completion counts.
  pub(crate) fn complete(&self, result: LoadResult<V>) {
    let waiters = {
      let mut inner = self.inner.lock();
      if matches!(inner.state, State::Complete(_)) {
        return;
      }
      inner.state = State::Complete(result);
      std::mem::take(&mut inner.waiters)
    };
    for waiter in waiters {
      waiter.wake();
    }
  }

  /// Blocks the current thread until the load completes.
  pub(crate) fn wait(&self) -> LoadResult<V> {
    loop {
      {
        let mut inner = self.inner.lock();
        if let State::Complete(result) = &inner.state {
          return result.clone();
        }
        inner.waiters.push_back(Waiter::Sync(thread::current()));
      }
      // Unparks that race ahead of this call make it return immediately.
      thread::park();
    }
  }

  fn poll_result(&self, cx: &mut Context<'_>) -> Poll<LoadResult<V>> {
    let mut inner = self.inner.lock();
    match &inner.state {
      State::Complete(result) => Poll::Ready(result.clone()),
      State::Computing => {
        let waker = cx.waker();
        if !inner.waiters.iter().any(|w| matches!(w, Waiter::Async(other) if other.will_wake(waker))) {
          inner.waiters.push_back(Waiter::Async(waker.clone()));
        }
        Poll::Pending
      }
    }
  }
}

/// A future resolving to the value of a cache lookup.
///
/// It is returned by the lookups of [`AsyncCache`](crate::AsyncCache). The
/// load behind it has already started and keeps running even if the handle
/// is dropped; every handle for the same load resolves to the same outcome.
#[must_use = "futures do nothing unless polled"]
pub struct LoadHandle<V> {
  state: HandleState<V>,
}

enum HandleState<V> {
  Ready(Option<LoadResult<V>>),
  Waiting(Arc<LoadFuture<V>>),
}

impl<V> LoadHandle<V> {
  pub(crate) fn ready(result: LoadResult<V>) -> Self {
    Self {
      state: HandleState::Ready(Some(result)),
    }
  }

  pub(crate) fn waiting(future: Arc<LoadFuture<V>>) -> Self {
    Self {
      state: HandleState::Waiting(future),
    }
  }
}

impl<V> Unpin for LoadHandle<V> {}

impl<V> Future for LoadHandle<V> {
  type Output = Result<Arc<V>, LoadError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    match &mut this.state {
      HandleState::Ready(result) => match result.take() {
        Some(result) => Poll::Ready(result),
        None => Poll::Ready(Err(LoadError::Abandoned)),
      },
      HandleState::Waiting(future) => future.poll_result(cx),
    }
  }
}

impl<V> fmt::Debug for LoadHandle<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let ready = matches!(self.state, HandleState::Ready(_));
    f.debug_struct("LoadHandle").field("ready", &ready).finish()
  }
}

/// A synchronous loader, already normalized to return a `LoadError`.
pub(crate) type SyncLoadFn<K, V> = dyn Fn(&K) -> Result<V, LoadError> + Send + Sync;

/// An asynchronous loader producing a boxed, `'static` future.
pub(crate) type AsyncLoadFn<K, V> =
  dyn Fn(K) -> BoxFuture<'static, Result<V, LoadError>> + Send + Sync;

/// Holds either a synchronous or an asynchronous loader function.
///
/// This is stored in the `CacheBuilder` and `CacheShared` to define how
/// missing and stale values are computed.
pub(crate) enum Loader<K, V> {
  Sync(Arc<SyncLoadFn<K, V>>),
  Async(Arc<AsyncLoadFn<K, V>>),
}

impl<K, V> Loader<K, V> {
  pub(crate) fn is_async(&self) -> bool {
    matches!(self, Loader::Async(_))
  }
}

impl<K, V> Clone for Loader<K, V> {
  fn clone(&self) -> Self {
    match self {
      Loader::Sync(f) => Loader::Sync(f.clone()),
      Loader::Async(f) => Loader::Async(f.clone()),
    }
  }
}

impl<K, V> fmt::Debug for Loader<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Loader::Sync(_) => f.write_str("Loader::Sync"),
      Loader::Async(_) => f.write_str("Loader::Async"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[test]
  fn sync_waiters_receive_the_completed_value() {
    let future = Arc::new(LoadFuture::<u32>::new());
    let waiters: Vec<_> = (0..4)
      .map(|_| {
        let future = future.clone();
        thread::spawn(move || future.wait())
      })
      .collect();

    thread::sleep(Duration::from_millis(20));
    future.complete(Ok(Arc::new(7)));

    for waiter in waiters {
      assert_eq!(*waiter.join().unwrap().unwrap(), 7);
    }
  }

  #[test]
  fn first_completion_wins() {
    let future = LoadFuture::<u32>::new();
    future.complete(Err(LoadError::Abandoned));
    future.complete(Ok(Arc::new(1)));
    assert!(matches!(future.wait(), Err(LoadError::Abandoned)));
  }

  #[test]
  fn handles_resolve_to_the_shared_outcome() {
    let future = Arc::new(LoadFuture::<&str>::new());
    let first = LoadHandle::waiting(future.clone());
    let second = LoadHandle::waiting(future.clone());
    future.complete(Err(LoadError::failed("offline")));

    let first = futures_executor::block_on(first).unwrap_err();
    let second = futures_executor::block_on(second).unwrap_err();
    assert_eq!(first.to_string(), second.to_string());

    let ready = futures_executor::block_on(LoadHandle::ready(Ok(Arc::new("v"))));
    assert_eq!(*ready.unwrap(), "v");
  }
}
