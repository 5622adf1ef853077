//! Active → Disposing → Disposed lifecycle gate
//!
//! Every operation that touches the buffer holds an access ticket for its
//! duration. Disposal closes the gate by CAS; the buffer is released by
//! whoever observes "disposing with no tickets outstanding" first, which is
//! either the disposer itself or the last ticket holder to leave.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

const ACTIVE: u8 = 0;
const DISPOSING: u8 = 1;
const DISPOSED: u8 = 2;

/// Observable lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Active,
    Disposing,
    Disposed,
}

#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
    in_flight: AtomicUsize,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        match self.state.load(Ordering::Acquire) {
            ACTIVE => LifecycleState::Active,
            DISPOSING => LifecycleState::Disposing,
            _ => LifecycleState::Disposed,
        }
    }

    /// Take an access ticket; `false` once disposal has started
    ///
    /// `release` runs if backing out leaves a disposing gate empty.
    pub fn try_enter(&self, release: impl FnOnce()) -> bool {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.state.load(Ordering::SeqCst) == ACTIVE {
            true
        } else {
            self.leave(release);
            false
        }
    }

    /// Return an access ticket
    pub fn leave(&self, release: impl FnOnce()) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1
            && self.state.load(Ordering::SeqCst) == DISPOSING
        {
            self.finish(release);
        }
    }

    /// Close the gate; `true` only for the first caller
    pub fn dispose(&self, release: impl FnOnce()) -> bool {
        if self
            .state
            .compare_exchange(ACTIVE, DISPOSING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if self.in_flight.load(Ordering::SeqCst) == 0 {
            self.finish(release);
        }
        true
    }

    /// Mark released during teardown when no ticket can exist; `true` if `release` still has to run
    pub fn take_unreleased(&mut self) -> bool {
        let state = self.state.get_mut();
        let pending = *state != DISPOSED;
        *state = DISPOSED;
        pending
    }

    fn finish(&self, release: impl FnOnce()) {
        if self
            .state
            .compare_exchange(DISPOSING, DISPOSED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            release();
        }
    }
}
