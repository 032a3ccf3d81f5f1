use std::sync::{Mutex, PoisonError};

type Callback<T> = Box<dyn FnOnce(T) + Send>;

/// One-shot resolution point: the first `settle` wins and invokes the
/// callback, every later `settle` or `discard` is a no-op.
pub struct Settlement<T> {
    callback: Mutex<Option<Callback<T>>>,
}

impl<T> Settlement<T> {
    pub fn new(callback: impl FnOnce(T) + Send + 'static) -> Self {
        Self {
            callback: Mutex::new(Some(Box::new(callback))),
        }
    }

    /// Resolves with `value`. Returns `false` if already settled or discarded.
    pub fn settle(&self, value: T) -> bool {
        // Take under the lock, call outside it.
        let callback = self.take();
        match callback {
            Some(callback) => {
                callback(value);
                true
            }
            None => false,
        }
    }

    /// Drops the callback without invoking it. Returns `false` if the
    /// settlement was already consumed.
    pub fn discard(&self) -> bool {
        self.take().is_some()
    }

    pub fn is_settled(&self) -> bool {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn take(&self) -> Option<Callback<T>> {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<T> std::fmt::Debug for Settlement<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settlement")
            .field("settled", &self.is_settled())
            .finish()
    }
}
