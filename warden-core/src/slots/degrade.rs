//! DegradeSlot: reject while any configured circuit
//! breaker for the resource is open, and return the breaker that is
//! currently probing (if any) so the caller's exit can report its result.

use std::sync::Arc;

use crate::degrade_checker::CircuitState;
use crate::degrade_checker::DegradeChecker;
use crate::error::BlockError;

pub fn check(checkers: &[Arc<DegradeChecker>], now_ms: u64) -> Result<Option<Arc<DegradeChecker>>, BlockError> {
    for checker in checkers {
        if !checker.can_pass(now_ms) {
            return Err(BlockError::Degrade { rule: checker.rule().clone() });
        }
        if checker.state() == CircuitState::HalfOpen {
            return Ok(Some(checker.clone()));
        }
    }
    Ok(None)
}
