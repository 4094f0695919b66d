//! Object pools for syntax trees and scan results.
//!
//! Pooled objects come back truncated but with their backing capacity
//! retained. Objects that grew past a size limit are dropped instead of
//! returned, so one huge file cannot pin its allocation in the pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::analysis::FileAst;

/// Maximum number of idle objects a pool keeps by default.
pub const DEFAULT_MAX_IDLE: usize = 256;

/// Above this many functions, types or imports a tree is not pooled.
const AST_RETAIN_LIMIT: usize = 100;

/// A type that can be recycled through an [`ObjectPool`].
pub trait Poolable: Send {
    /// Fresh object with pre-sized collections.
    fn fresh() -> Self;
    /// Clear contents, keeping allocated capacity.
    fn reset(&mut self);
    /// Whether the object is too large to keep around.
    fn is_oversized(&self) -> bool;
}

impl Poolable for FileAst {
    fn fresh() -> Self {
        FileAst {
            functions: Vec::with_capacity(10),
            types: Vec::with_capacity(5),
            imports: Vec::with_capacity(20),
            values: Vec::with_capacity(5),
            impls: Vec::with_capacity(10),
            modules: Vec::with_capacity(3),
            macros: Vec::with_capacity(2),
            ..FileAst::default()
        }
    }

    fn reset(&mut self) {
        self.path.clear();
        self.module = None;
        self.has_syntax_errors = false;
        self.functions.clear();
        self.types.clear();
        self.imports.clear();
        self.values.clear();
        self.impls.clear();
        self.modules.clear();
        self.macros.clear();
    }

    fn is_oversized(&self) -> bool {
        self.functions.len() > AST_RETAIN_LIMIT
            || self.types.len() > AST_RETAIN_LIMIT
            || self.imports.len() > AST_RETAIN_LIMIT
    }
}

/// Pool counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub created: u64,
    pub reused: u64,
    pub returned: u64,
    pub rejected: u64,
    pub idle: usize,
}

/// A bounded free list of reusable objects.
pub struct ObjectPool<T: Poolable> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
    created: AtomicU64,
    reused: AtomicU64,
    returned: AtomicU64,
    rejected: AtomicU64,
}

impl<T: Poolable> ObjectPool<T> {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            returned: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Take an object from the pool, creating one if the pool is empty.
    pub fn acquire(&self) -> T {
        let recycled = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        match recycled {
            Some(obj) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                obj
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                T::fresh()
            }
        }
    }

    /// Hand an object back. Oversized objects are dropped.
    pub fn release(&self, mut obj: T) {
        if obj.is_oversized() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }
        obj.reset();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(obj);
            self.returned.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop every idle object.
    pub fn drain(&self) {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            idle: self.idle.lock().unwrap_or_else(PoisonError::into_inner).len(),
        }
    }
}

impl<T: Poolable> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE)
    }
}

static AST_POOL: Lazy<ObjectPool<FileAst>> = Lazy::new(ObjectPool::default);

/// Process-wide pool of syntax tree containers shared by every parser.
pub fn ast_pool() -> &'static ObjectPool<FileAst> {
    &AST_POOL
}
