//! Owned handles for objects allocated by the tree-sitter C runtime.
//!
//! Every parser and tree the adapter obtains is wrapped in a
//! [`ForeignHandle`]. Creating one increments the shared
//! [`AllocationLedger`]; dropping it (normally or while unwinding) or
//! releasing it decrements the ledger again. A non-zero outstanding count
//! with no calls in flight means a handle escaped.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tree_sitter::{Language, Parser};

use crate::error::ParseError;

/// Idle parsers kept between calls.
pub const MAX_IDLE_PARSERS: usize = 16;

/// Atomic bookkeeping of live foreign handles.
#[derive(Debug, Default)]
pub struct AllocationLedger {
    outstanding: AtomicI64,
    allocated: AtomicU64,
    released: AtomicU64,
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_acquire(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.allocated.fetch_add(1, Ordering::Relaxed);
    }

    fn record_release(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    /// Handles currently alive.
    pub fn outstanding(&self) -> i64 {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }
}

/// Decrements the ledger exactly once, when dropped.
#[derive(Debug)]
struct LedgerGuard(Arc<AllocationLedger>);

impl Drop for LedgerGuard {
    fn drop(&mut self) {
        self.0.record_release();
    }
}

/// A foreign object counted by an [`AllocationLedger`] for as long as it
/// lives.
#[derive(Debug)]
pub struct ForeignHandle<T> {
    inner: T,
    _guard: LedgerGuard,
}

impl<T> ForeignHandle<T> {
    /// Start tracking `inner`.
    pub fn track(inner: T, ledger: &Arc<AllocationLedger>) -> Self {
        ledger.record_acquire();
        Self {
            inner,
            _guard: LedgerGuard(Arc::clone(ledger)),
        }
    }

    /// Stop tracking and hand the object back, e.g. to an idle pool.
    pub fn release(self) -> T {
        let ForeignHandle { inner, _guard } = self;
        drop(_guard);
        inner
    }
}

impl<T> Deref for ForeignHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for ForeignHandle<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

/// Free list of configured tree-sitter parsers.
///
/// Parsers sitting in the pool are not counted as outstanding; only
/// checked-out ones are.
pub struct ParserPool {
    language: Language,
    idle: Mutex<Vec<Parser>>,
    ledger: Arc<AllocationLedger>,
}

impl ParserPool {
    pub fn new(language: Language, ledger: Arc<AllocationLedger>) -> Self {
        Self {
            language,
            idle: Mutex::new(Vec::new()),
            ledger,
        }
    }

    /// Take an idle parser or configure a new one.
    pub fn checkout(&self) -> Result<ForeignHandle<Parser>, ParseError> {
        let reused = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let parser = match reused {
            Some(parser) => parser,
            None => {
                let mut parser = Parser::new();
                parser
                    .set_language(&self.language)
                    .map_err(|e| ParseError::Backend(format!("rust grammar: {}", e)))?;
                parser
            }
        };
        Ok(ForeignHandle::track(parser, &self.ledger))
    }

    /// Return a parser for reuse. Extra parsers beyond the idle cap are freed.
    pub fn checkin(&self, handle: ForeignHandle<Parser>) {
        let mut parser = handle.release();
        parser.reset();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_IDLE_PARSERS {
            idle.push(parser);
        }
    }

    /// Free idle parsers down to `keep`. Returns how many were freed.
    pub fn trim(&self, keep: usize) -> usize {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let before = idle.len();
        idle.truncate(keep);
        before - idle.len()
    }

    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn language(&self) -> &Language {
        &self.language
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_drop_releases() {
        let ledger = Arc::new(AllocationLedger::new());
        {
            let a = ForeignHandle::track(vec![1u8], &ledger);
            let _b = ForeignHandle::track(String::from("tree"), &ledger);
            assert_eq!(ledger.outstanding(), 2);
            assert_eq!(a.len(), 1);
        }
        assert_eq!(ledger.outstanding(), 0);
        assert_eq!(ledger.allocated(), 2);
        assert_eq!(ledger.released(), 2);
    }

    #[test]
    fn test_release_returns_inner_once() {
        let ledger = Arc::new(AllocationLedger::new());
        let handle = ForeignHandle::track(7u32, &ledger);
        let value = handle.release();
        assert_eq!(value, 7);
        assert_eq!(ledger.outstanding(), 0);
        assert_eq!(ledger.released(), 1);
    }

    #[test]
    fn test_release_on_unwind() {
        let ledger = Arc::new(AllocationLedger::new());
        let cloned = Arc::clone(&ledger);
        let result = std::panic::catch_unwind(move || {
            let _handle = ForeignHandle::track((), &cloned);
            panic!("translation failed");
        });
        assert!(result.is_err());
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn test_parser_pool_reuse_and_trim() {
        let ledger = Arc::new(AllocationLedger::new());
        let pool = ParserPool::new(tree_sitter_go::LANGUAGE.into(), Arc::clone(&ledger));

        let first = pool.checkout().unwrap();
        let second = pool.checkout().unwrap();
        assert_eq!(ledger.outstanding(), 2);

        pool.checkin(first);
        pool.checkin(second);
        assert_eq!(ledger.outstanding(), 0);
        assert_eq!(pool.idle(), 2);

        let reused = pool.checkout().unwrap();
        assert_eq!(pool.idle(), 1);
        pool.checkin(reused);

        assert_eq!(pool.trim(0), 2);
        assert_eq!(pool.idle(), 0);
    }
}
