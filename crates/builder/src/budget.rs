//! Limits on how long a build may occupy the model authority.
//!
//! A build checks its [`ExecutionBudget`] between steps. Tripping the
//! [`CancelFlag`] from another thread (client cancellation or the watchdog)
//! makes the next check fail, and the builder rolls back.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const NOT_TRIPPED: u8 = 0;
const CANCELLED: u8 = 1;
const TIMED_OUT: u8 = 2;

/// Why a build stopped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    Timeout,
}

/// Shared cancellation flag. The first reason recorded wins.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicU8>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the flag. Returns `false` if it was already tripped.
    pub fn trip(&self, reason: Interrupt) -> bool {
        let value = match reason {
            Interrupt::Cancelled => CANCELLED,
            Interrupt::Timeout => TIMED_OUT,
        };
        self.0
            .compare_exchange(NOT_TRIPPED, value, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn reason(&self) -> Option<Interrupt> {
        match self.0.load(Ordering::Acquire) {
            CANCELLED => Some(Interrupt::Cancelled),
            TIMED_OUT => Some(Interrupt::Timeout),
            _ => None,
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.reason().is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionBudget {
    deadline: Option<Instant>,
    cancel: CancelFlag,
}

impl ExecutionBudget {
    /// No deadline and a flag nobody else holds.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn new(timeout: Option<Duration>, cancel: CancelFlag) -> Self {
        Self {
            deadline: timeout.map(|t| Instant::now() + t),
            cancel,
        }
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Fail if the flag is tripped or the deadline has passed.
    pub fn check(&self) -> Result<(), Interrupt> {
        if let Some(reason) = self.cancel.reason() {
            return Err(reason);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel.trip(Interrupt::Timeout);
                Err(Interrupt::Timeout)
            }
            _ => Ok(()),
        }
    }
}
