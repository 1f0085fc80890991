// SPDX-License-Identifier: MIT
//! Lazily computed, shareable, forgettable values
//!
//! A [`Memoized`] wraps a factory. The first [`Memoized::get`] runs it and
//! caches the result; later calls return the cached value until
//! [`Memoized::forget`] drops it. Clones share one cache, so every array that
//! refers to the same block sees the same payload.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

type Factory<T> = dyn Fn() -> Result<Arc<T>> + Send + Sync;

struct Inner<T> {
    factory: Box<Factory<T>>,
    value: Mutex<Option<Arc<T>>>,
}

/// Shared handle to a lazily computed value
pub struct Memoized<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Memoized<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> Memoized<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                factory: Box::new(factory),
                value: Mutex::new(None),
            }),
        }
    }

    /// A value that is already materialized; `forget` re-yields the same value
    pub fn constant(value: T) -> Self {
        let value = Arc::new(value);
        let cached = Arc::clone(&value);
        let memo = Self::new(move || Ok(Arc::clone(&value)));
        *memo.inner.value.lock() = Some(cached);
        memo
    }
}

impl<T> Memoized<T> {
    /// Return the cached value, computing it first if needed.
    ///
    /// The lock is held while the factory runs, so concurrent callers
    /// materialize the value once.
    pub fn get(&self) -> Result<Arc<T>> {
        let mut slot = self.inner.value.lock();
        if let Some(value) = slot.as_ref() {
            return Ok(Arc::clone(value));
        }
        let value = (self.inner.factory)()?;
        tracing::trace!("memoized value materialized");
        *slot = Some(Arc::clone(&value));
        Ok(value)
    }

    /// Drop the cached value; the next `get` recomputes it
    pub fn forget(&self) {
        if self.inner.value.lock().take().is_some() {
            tracing::trace!("memoized value forgotten");
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.inner.value.lock().is_some()
    }

    /// Whether two handles share one cache
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> fmt::Debug for Memoized<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("materialized", &self.is_materialized())
            .finish()
    }
}
