//! The engine's order checkpoint: a monotone gate verifying that
//! operations reach the engine in the order their tokens were issued.
//!
//! Writes are totally ordered. Reads are admitted concurrently, so they
//! are only checked against the last write: two reads may reach the gate
//! in either order, but never before a write issued after them exits.

use parking_lot::Mutex;

use shrike_common::order::OrderToken;

#[derive(Debug, Default)]
struct CheckpointState {
    last_write: Option<OrderToken>,
    last_read: Option<OrderToken>,
}

#[derive(Debug, Default)]
pub struct OrderCheckpoint {
    state: Mutex<CheckpointState>,
}

impl OrderCheckpoint {
    pub fn new() -> OrderCheckpoint {
        OrderCheckpoint::default()
    }

    /// Record a shared-access token. Must have been issued after the last
    /// write the engine observed. `OrderToken::IGNORE` passes unchecked.
    pub fn check_read(&self, token: OrderToken) {
        if token.is_ignore() {
            return;
        }
        let mut state = self.state.lock();
        if let Some(write) = state.last_write {
            debug_assert!(
                token > write,
                "read order token regression: {token:?} observed after write {write:?}"
            );
            if token <= write {
                tracing::warn!(?token, ?write, "read token observed out of issue order");
                return;
            }
        }
        state.last_read = state.last_read.max(Some(token));
    }

    /// Record an exclusive-access token. Must have been issued after every
    /// token the engine has observed.
    pub fn check_write(&self, token: OrderToken) {
        if token.is_ignore() {
            return;
        }
        let mut state = self.state.lock();
        let newest = state.last_write.max(state.last_read);
        if let Some(prev) = newest {
            debug_assert!(
                token > prev,
                "write order token regression: {token:?} observed after {prev:?}"
            );
            if token <= prev {
                tracing::warn!(?token, ?prev, "write token observed out of issue order");
                return;
            }
        }
        state.last_write = Some(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shrike_common::order::OrderSource;

    #[test]
    fn test_writes_in_order_pass() {
        let source = OrderSource::new();
        let checkpoint = OrderCheckpoint::new();
        checkpoint.check_write(source.check_in("w1"));
        checkpoint.check_write(source.check_in("w2"));
    }

    #[test]
    fn test_reads_may_race_each_other() {
        let source = OrderSource::new();
        let checkpoint = OrderCheckpoint::new();
        checkpoint.check_write(source.check_in("w"));
        let r1 = source.check_in("r1");
        let r2 = source.check_in("r2");
        // Admitted concurrently: either order is legal.
        checkpoint.check_read(r2);
        checkpoint.check_read(r1);
    }

    #[test]
    fn test_ignore_token_passes() {
        let checkpoint = OrderCheckpoint::new();
        let source = OrderSource::new();
        checkpoint.check_write(source.check_in("w"));
        checkpoint.check_read(OrderToken::IGNORE);
        checkpoint.check_write(OrderToken::IGNORE);
    }

    #[test]
    #[should_panic(expected = "write order token regression")]
    #[cfg(debug_assertions)]
    fn test_write_regression_panics_in_debug() {
        let source = OrderSource::new();
        let a = source.check_in("a");
        let b = source.check_in("b");
        let checkpoint = OrderCheckpoint::new();
        checkpoint.check_write(b);
        checkpoint.check_write(a);
    }

    #[test]
    #[should_panic(expected = "read order token regression")]
    #[cfg(debug_assertions)]
    fn test_read_before_prior_write_panics_in_debug() {
        let source = OrderSource::new();
        let r = source.check_in("r");
        let w = source.check_in("w");
        let checkpoint = OrderCheckpoint::new();
        checkpoint.check_write(w);
        checkpoint.check_read(r);
    }
}
