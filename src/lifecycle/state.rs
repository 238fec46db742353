//! Relay lifecycle state.

use tokio::sync::watch;

/// Lifecycle state of a relay. Ordered: a relay only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelayState {
    NotStarted,
    Running,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RelayState::NotStarted => "not-started",
            RelayState::Running => "running",
            RelayState::ShuttingDown => "shutting-down",
            RelayState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Monotonic state cell observable by any number of tasks.
#[derive(Debug)]
pub struct Lifecycle {
    tx: watch::Sender<RelayState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(RelayState::NotStarted);
        Self { tx }
    }

    pub fn current(&self) -> RelayState {
        *self.tx.borrow()
    }

    /// Move to `next` if it is strictly later than the current state.
    ///
    /// Returns the state that was left, or the current state when the
    /// transition is refused.
    pub fn advance(&self, next: RelayState) -> Result<RelayState, RelayState> {
        let mut outcome = Err(next);
        self.tx.send_if_modified(|state| {
            if next > *state {
                outcome = Ok(*state);
                *state = next;
                true
            } else {
                outcome = Err(*state);
                false
            }
        });
        if let Ok(previous) = outcome {
            tracing::debug!(from = %previous, to = %next, "Relay state changed");
        }
        outcome
    }

    /// Wait until the state reaches at least `target`.
    pub async fn reached(&self, target: RelayState) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|state| *state >= target).await;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn transitions_only_move_forward() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.current(), RelayState::NotStarted);

        assert_eq!(lifecycle.advance(RelayState::Running), Ok(RelayState::NotStarted));
        assert_eq!(lifecycle.advance(RelayState::Running), Err(RelayState::Running));
        assert_eq!(lifecycle.advance(RelayState::NotStarted), Err(RelayState::Running));

        assert_eq!(lifecycle.advance(RelayState::Stopped), Ok(RelayState::Running));
        assert_eq!(lifecycle.advance(RelayState::ShuttingDown), Err(RelayState::Stopped));
        assert_eq!(lifecycle.current(), RelayState::Stopped);
    }

    #[tokio::test]
    async fn reached_wakes_on_later_states() {
        let lifecycle = std::sync::Arc::new(Lifecycle::new());
        let waiter = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.reached(RelayState::ShuttingDown).await })
        };

        lifecycle.advance(RelayState::Running).unwrap();
        lifecycle.advance(RelayState::Stopped).unwrap();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
