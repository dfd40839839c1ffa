//! Scoped re-entrancy guards.
//!
//! A [`Reentrancy`] is a shared depth counter. Entering returns a guard
//! that decrements the counter when dropped, so the count is restored on
//! every exit path including `?` returns.

use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug, Clone, Default)]
pub struct Reentrancy {
    depth: Rc<Cell<u32>>,
}

impl Reentrancy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.depth.get() > 0
    }

    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    /// Enter unconditionally; nesting is allowed.
    pub fn enter(&self) -> ReentrancyGuard {
        self.depth.set(self.depth.get() + 1);
        ReentrancyGuard {
            depth: Rc::clone(&self.depth),
        }
    }

    /// Enter only if nobody holds the guard.
    pub fn try_enter(&self) -> Option<ReentrancyGuard> {
        if self.is_held() {
            None
        } else {
            Some(self.enter())
        }
    }
}

#[derive(Debug)]
#[must_use = "the guard is released as soon as it is dropped"]
pub struct ReentrancyGuard {
    depth: Rc<Cell<u32>>,
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_releases_on_drop() {
        let r = Reentrancy::new();
        {
            let _a = r.enter();
            let _b = r.enter();
            assert_eq!(r.depth(), 2);
        }
        assert!(!r.is_held());
    }

    #[test]
    fn test_try_enter_refuses_nesting() {
        let r = Reentrancy::new();
        let guard = r.try_enter();
        assert!(guard.is_some());
        assert!(r.try_enter().is_none());
        drop(guard);
        assert!(r.try_enter().is_some());
    }
}
