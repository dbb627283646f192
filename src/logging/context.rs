// SPDX-License-Identifier: Apache-2.0 OR MIT
// Calling-context identity and naming

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

/// Name used for contexts that carry no name of their own
pub const ANONYMOUS_CONTEXT_NAME: &str = "Anonymous";

/// Stable, comparable identity of whoever is calling the logger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    /// A named OS thread
    Thread(ThreadId),
    /// An explicitly registered handle (async task, callback owner, ...)
    Handle(u64),
    /// Any context without a distinguishable identity
    Anonymous,
}

/// Calling context resolved at the point of a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallingContext {
    pub key: ContextKey,
    pub name: String,
}

impl CallingContext {
    /// Identify the current thread
    ///
    /// Named threads get their own key. Unnamed threads cannot be told apart
    /// by name, so they all collapse onto [`ContextKey::Anonymous`].
    pub fn current() -> Self {
        let current = thread::current();
        match current.name() {
            Some(name) => Self {
                key: ContextKey::Thread(current.id()),
                name: name.to_string(),
            },
            None => Self::anonymous(),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            key: ContextKey::Anonymous,
            name: ANONYMOUS_CONTEXT_NAME.to_string(),
        }
    }
}

/// Explicit producer identity for contexts without a stable thread
///
/// Obtained from [`Logger::register_context`](super::Logger::register_context).
/// Each handle owns a single-writer channel, so the type is `Send` but
/// neither `Clone` nor `Sync`: it can move to another thread or task, but two
/// threads can never write through it at once.
///
/// ```compile_fail
/// use background_logger::Logger;
///
/// let logger = Logger::new();
/// let handle = logger.register_context("Worker");
/// std::thread::scope(|s| {
///     s.spawn(|| logger.write_with(&handle, "one"));
///     s.spawn(|| logger.write_with(&handle, "two"));
/// });
/// ```
///
/// ```compile_fail
/// use background_logger::Logger;
///
/// let logger = Logger::new();
/// let handle = logger.register_context("Worker");
/// let copy = handle.clone();
/// ```
///
/// Contexts that need to share one identity can put it behind a mutex.
#[derive(Debug, PartialEq, Eq)]
pub struct ContextHandle {
    id: u64,
    name: String,
    _not_sync: PhantomData<Cell<()>>,
}

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

impl ContextHandle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            _not_sync: PhantomData,
        }
    }

    pub fn key(&self) -> ContextKey {
        ContextKey::Handle(self.id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}
