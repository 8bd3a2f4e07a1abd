//! Lock manager ("the vault")
//!
//! The domain layer is LOCKED by default. Direct, unguarded mutation is only
//! sanctioned inside an unlock scope, which the engine opens for the duration
//! of a process invocation or an explicit `edit()` block.
//!
//! The lock is a depth counter rather than a flag: scopes nest, and the
//! context stays unlocked until the outermost scope ends. [`UnlockScope`]
//! decrements the counter in `Drop`, so the lock is restored on every exit
//! path: normal return, `?` early return, or unwinding.
//!
//! # Strict Mode
//!
//! What happens to a direct mutation attempted while LOCKED depends on
//! `strict_mode`:
//!
//! | strict_mode | Locked mutation |
//! |-------------|-----------------|
//! | `true` | rejected with [`Error::Locked`] |
//! | `false` (default) | allowed, with a `warn!` on target `pop::lock` |
//!
//! Resolution order: explicit argument, then the `POP_STRICT_MODE`
//! environment variable, then permissive.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{trace, warn};

/// Environment variable consulted when strict mode is not given explicitly
pub const STRICT_MODE_ENV: &str = "POP_STRICT_MODE";

/// Parse a boolean-like toggle
///
/// `1`, `true`, `yes` and `on` (case-insensitive, surrounding whitespace
/// ignored) are true; anything else is false.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Resolve strict mode from an explicit argument and an environment value
pub fn resolve_strict_mode_from(explicit: Option<bool>, env_value: Option<&str>) -> bool {
    match explicit {
        Some(strict) => strict,
        None => env_value.map(parse_flag).unwrap_or(false),
    }
}

/// Resolve strict mode from an explicit argument and `POP_STRICT_MODE`
pub fn resolve_strict_mode(explicit: Option<bool>) -> bool {
    let env_value = std::env::var(STRICT_MODE_ENV).ok();
    resolve_strict_mode_from(explicit, env_value.as_deref())
}

/// Lock state observed by [`LockManager::state`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Direct mutation is not sanctioned
    Locked,
    /// Inside at least one unlock scope
    Unlocked,
}

/// Gate for direct context mutation
///
/// Owned by the engine; every direct mutator of the domain layer takes a
/// reference to it and calls [`LockManager::check_mutation`] first.
///
/// `depth > 0` means unlocked. The counter is atomic so the gate can be
/// consulted through `&self` while the engine holds the context mutably.
#[derive(Debug)]
pub struct LockManager {
    depth: AtomicUsize,
    strict_mode: bool,
}

impl LockManager {
    /// Create a locked manager
    ///
    /// `strict_mode` of `None` falls back to `POP_STRICT_MODE`, then to
    /// permissive.
    pub fn new(strict_mode: Option<bool>) -> Self {
        Self {
            depth: AtomicUsize::new(0),
            strict_mode: resolve_strict_mode(strict_mode),
        }
    }

    /// Create a strict manager
    pub fn strict() -> Self {
        Self::new(Some(true))
    }

    /// Create a permissive manager
    pub fn permissive() -> Self {
        Self::new(Some(false))
    }

    /// Whether locked mutations are rejected
    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    /// Current nesting depth of unlock scopes
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Current lock state
    pub fn state(&self) -> LockState {
        if self.depth() > 0 {
            LockState::Unlocked
        } else {
            LockState::Locked
        }
    }

    /// True when no unlock scope is open
    pub fn is_locked(&self) -> bool {
        self.state() == LockState::Locked
    }

    /// Open an unlock scope
    ///
    /// The context is unlocked until the returned scope (and every scope
    /// opened before it) is dropped.
    pub fn scoped_unlock(&self) -> UnlockScope<'_> {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(target: "pop::lock", depth, "Unlock scope opened");
        UnlockScope { manager: self }
    }

    /// Gate a direct mutation
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] if the context is locked and strict mode is
    /// on. In permissive mode a locked mutation is logged and allowed.
    pub fn check_mutation(&self, operation: &str) -> Result<()> {
        if !self.is_locked() {
            return Ok(());
        }
        if self.strict_mode {
            warn!(target: "pop::lock", operation, "Direct mutation denied: context is locked");
            return Err(Error::Locked {
                operation: operation.to_string(),
            });
        }
        warn!(
            target: "pop::lock",
            operation,
            "Direct mutation outside a process while context is locked (permissive mode)"
        );
        Ok(())
    }

    fn release(&self) {
        let previous = self
            .depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |x| Some(x.saturating_sub(1)))
            .unwrap_or(0);
        trace!(target: "pop::lock", depth = previous.saturating_sub(1), "Unlock scope closed");
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(None)
    }
}

/// RAII unlock window returned by [`LockManager::scoped_unlock`]
#[must_use = "the context relocks as soon as the scope is dropped"]
#[derive(Debug)]
pub struct UnlockScope<'a> {
    manager: &'a LockManager,
}

impl UnlockScope<'_> {
    /// Depth including this scope
    pub fn depth(&self) -> usize {
        self.manager.depth()
    }
}

impl Drop for UnlockScope<'_> {
    fn drop(&mut self) {
        self.manager.release();
    }
}
