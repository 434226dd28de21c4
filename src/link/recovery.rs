//! Failure recovery policies.
//!
//! Two configurations behind one interface:
//!
//! | Policy             | Used by          | On failure                        |
//! |--------------------|------------------|-----------------------------------|
//! | Unbounded          | BLE roles        | always retry immediately          |
//! | Bounded (`max`)    | WiFi station     | retry while `count <= max`, then  |
//! |                    |                  | give up once and stay exhausted   |
//!
//! The bounded counter increments once per failure and gives up the
//! instant it exceeds `max`, so with `max = 3` the fourth consecutive
//! failure gives up and the counter reads 4.  Failures that arrive after
//! giving up do not move the counter.  Any success resets it to 0.

/// Consecutive-failure counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter {
    pub count: u32,
    pub max: u32,
}

/// What the caller should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Reissue the connect or discovery action now.
    Retry,
    /// Budget just ran out.  Signal the terminal failure, once.
    GiveUp,
    /// Budget already spent.  Do nothing until an explicit restart.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPolicy {
    UnboundedImmediate,
    Bounded { counter: RetryCounter, exhausted: bool },
}

impl RecoveryPolicy {
    pub const fn unbounded() -> Self {
        Self::UnboundedImmediate
    }

    pub const fn bounded(max: u32) -> Self {
        Self::Bounded {
            counter: RetryCounter { count: 0, max },
            exhausted: false,
        }
    }

    pub fn on_failure(&mut self) -> RecoveryDecision {
        match self {
            Self::UnboundedImmediate => RecoveryDecision::Retry,
            Self::Bounded { exhausted: true, .. } => RecoveryDecision::Exhausted,
            Self::Bounded { counter, exhausted } => {
                counter.count = counter.count.saturating_add(1);
                if counter.count <= counter.max {
                    RecoveryDecision::Retry
                } else {
                    *exhausted = true;
                    RecoveryDecision::GiveUp
                }
            }
        }
    }

    pub fn on_success(&mut self) {
        self.reset();
    }

    /// Clear the counter and leave the exhausted state.
    pub fn reset(&mut self) {
        if let Self::Bounded { counter, exhausted } = self {
            counter.count = 0;
            *exhausted = false;
        }
    }

    pub fn count(&self) -> u32 {
        match self {
            Self::UnboundedImmediate => 0,
            Self::Bounded { counter, .. } => counter.count,
        }
    }

    pub fn max(&self) -> Option<u32> {
        match self {
            Self::UnboundedImmediate => None,
            Self::Bounded { counter, .. } => Some(counter.max),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Bounded { exhausted: true, .. })
    }
}
