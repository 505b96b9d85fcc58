//! Typed object pool with a reset/clear contract.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Number of idle values a pool keeps by default.
pub const DEFAULT_CAPACITY: usize = 64;

/// A value that can be handed out again after use.
pub trait Recycle: Default {
    /// Brings the value back to its initial state. Called on every acquire.
    fn reset(&mut self);

    /// Drops anything that belongs to the previous user. Called before the
    /// value goes back to the pool.
    fn clear(&mut self);
}

/// Pool of reusable `T` values shared by concurrent requests.
///
/// Cloning the pool shares the idle values. A value is owned by exactly one
/// [`Pooled`] guard at a time and returns to the pool when the guard is
/// dropped.
pub struct Pool<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    idle: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T> Inner<T> {
    fn idle(&self) -> MutexGuard<'_, Vec<T>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Recycle> Pool<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Pool retaining at most `capacity` idle values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                idle: Mutex::new(Vec::with_capacity(capacity)),
                capacity,
            }),
        }
    }

    /// Takes an idle value, or builds a new one, and resets it.
    pub fn acquire(&self) -> Pooled<T> {
        let idle = self.inner.idle().pop();
        let mut value = match idle {
            Some(value) => value,
            None => {
                tracing::trace!("pool empty, allocating");
                T::default()
            }
        };
        value.reset();

        Pooled {
            value,
            pool: Arc::clone(&self.inner),
        }
    }

    /// Number of values waiting to be reused.
    pub fn idle(&self) -> usize {
        self.inner.idle().len()
    }
}

impl<T: Recycle> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.inner.idle().len())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

/// Value borrowed from a [`Pool`], released on drop.
pub struct Pooled<T: Recycle> {
    value: T,
    pool: Arc<Inner<T>>,
}

impl<T: Recycle> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Recycle> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Recycle + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.value, f)
    }
}

impl<T: Recycle> Drop for Pooled<T> {
    fn drop(&mut self) {
        let mut value = std::mem::take(&mut self.value);
        value.clear();

        let mut idle = self.pool.idle();
        if idle.len() < self.pool.capacity {
            idle.push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Scratch {
        data: Vec<u8>,
        resets: usize,
        owner: Option<usize>,
    }

    impl Recycle for Scratch {
        fn reset(&mut self) {
            self.data.clear();
            self.resets += 1;
        }

        fn clear(&mut self) {
            self.owner = None;
        }
    }

    #[test]
    fn values_are_reset_and_reused() {
        let pool = Pool::<Scratch>::new();
        {
            let mut scratch = pool.acquire();
            scratch.data.extend_from_slice(b"first");
            scratch.owner = Some(1);
        }
        assert_eq!(pool.idle(), 1);

        let scratch = pool.acquire();
        assert!(scratch.data.is_empty());
        assert_eq!(scratch.owner, None);
        assert_eq!(scratch.resets, 2);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn capacity_bounds_idle_values() {
        let pool = Pool::<Scratch>::with_capacity(1);
        let first = pool.acquire();
        let second = pool.acquire();
        drop(first);
        drop(second);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn concurrent_users_never_share_a_value() {
        let pool = Pool::<Scratch>::with_capacity(4);

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let pool = pool.clone();
                scope.spawn(move || {
                    for _ in 0..200 {
                        let mut scratch = pool.acquire();
                        assert!(scratch.data.is_empty());
                        assert_eq!(scratch.owner, None);
                        scratch.owner = Some(worker);
                        scratch.data.push(worker as u8);
                        std::thread::yield_now();
                        assert_eq!(scratch.owner, Some(worker));
                        assert_eq!(scratch.data, [worker as u8]);
                    }
                });
            }
        });

        assert!(pool.idle() <= 4);
    }
}
