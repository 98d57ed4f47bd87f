use crate::error::ListenerError;
use crate::listener::{RemovalCause, RemovalListener};

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A removal collected while shard locks are held, delivered once they are released.
pub(crate) type Notification<K, V> = (K, Arc<V>, RemovalCause);

/// Delivers removal notifications to the user's listener.
pub(crate) struct Notifier<K, V> {
  listener: Arc<dyn RemovalListener<K, V>>,
}

impl<K, V> Notifier<K, V> {
  pub(crate) fn new(listener: Arc<dyn RemovalListener<K, V>>) -> Self {
    Self { listener }
  }

  /// Invokes the listener, containing any panic it raises.
  pub(crate) fn notify(&self, key: K, value: Arc<V>, cause: RemovalCause) {
    let listener = &self.listener;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
      listener.on_removal(key, value, cause)
    }));
    if let Err(payload) = outcome {
      let error = ListenerError::from_panic(payload);
      tracing::error!(%cause, error = %error, "removal listener failed");
    }
  }

  pub(crate) fn notify_all(&self, notifications: Vec<Notification<K, V>>) {
    for (key, value, cause) in notifications {
      self.notify(key, value, cause);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use parking_lot::Mutex;

  #[test]
  fn panicking_listener_does_not_stop_delivery() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let notifier = Notifier::new(Arc::new({
      let seen = seen.clone();
      move |key: i32, _value: Arc<&str>, cause: RemovalCause| {
        if key == 1 {
          panic!("listener rejects key 1");
        }
        seen.lock().push((key, cause));
      }
    }));

    notifier.notify_all(vec![
      (1, Arc::new("one"), RemovalCause::Explicit),
      (2, Arc::new("two"), RemovalCause::Size),
    ]);

    assert_eq!(*seen.lock(), vec![(2, RemovalCause::Size)]);
  }
}
