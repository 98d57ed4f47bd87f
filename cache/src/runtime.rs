use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::thread;

/// A type-erased unit of background work.
pub type BoxTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A trait for handing background loads and refreshes to an execution context.
pub trait TaskSpawner: Send + Sync + 'static {
  /// Spawns a type-erased future.
  fn spawn(&self, future: BoxTask);

  /// Runs a blocking closure, such as a synchronous loader, off the caller's thread.
  fn spawn_blocking(&self, task: Box<dyn FnOnce() + Send>);
}

#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioSpawner(tokio::runtime::Handle);

#[cfg(feature = "tokio")]
impl TokioSpawner {
  /// Creates a spawner that uses the current Tokio runtime context.
  /// Panics if called outside of a Tokio runtime.
  pub fn new() -> Self {
    Self(tokio::runtime::Handle::current())
  }

  /// Creates a spawner for the runtime behind `handle`.
  pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
    Self(handle)
  }

  /// Returns a spawner for the current runtime, if there is one.
  pub fn try_current() -> Option<Self> {
    tokio::runtime::Handle::try_current().ok().map(Self)
  }
}

#[cfg(feature = "tokio")]
impl TaskSpawner for TokioSpawner {
  fn spawn(&self, future: BoxTask) {
    self.0.spawn(future);
  }

  fn spawn_blocking(&self, task: Box<dyn FnOnce() + Send>) {
    self.0.spawn_blocking(task);
  }
}

/// Runs every task on a fresh, named OS thread.
///
/// Futures are driven to completion on their thread with a local executor,
/// so they must not depend on a runtime's reactor or timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl ThreadSpawner {
  fn run(task: Box<dyn FnOnce() + Send>) {
    let spawned = thread::Builder::new()
      .name("steep-cache-loader".into())
      .spawn(task);
    if let Err(e) = spawned {
      tracing::error!(error = %e, "failed to start a loader thread");
    }
  }
}

impl TaskSpawner for ThreadSpawner {
  fn spawn(&self, future: BoxTask) {
    Self::run(Box::new(move || futures_executor::block_on(future)));
  }

  fn spawn_blocking(&self, task: Box<dyn FnOnce() + Send>) {
    Self::run(task);
  }
}

/// Picks the executor used when the builder was not given one: the ambient
/// Tokio runtime if there is one, otherwise a thread per task.
pub(crate) fn default_spawner() -> Arc<dyn TaskSpawner> {
  #[cfg(feature = "tokio")]
  {
    if let Some(spawner) = TokioSpawner::try_current() {
      return Arc::new(spawner);
    }
  }
  Arc::new(ThreadSpawner)
}

/// Whether an async runtime is available to run async loaders by default.
pub(crate) fn runtime_available() -> bool {
  #[cfg(feature = "tokio")]
  {
    tokio::runtime::Handle::try_current().is_ok()
  }
  #[cfg(not(feature = "tokio"))]
  {
    false
  }
}
