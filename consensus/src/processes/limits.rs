use crate::constants::{GAS_LIMIT_BOUND_DIVISOR, MIN_GAS_LIMIT, MIN_STATE_LIMIT, STATE_LIMIT_BOUND_DIVISOR};

/// Gas limit for a child block: the parent limit moved toward the configured
/// ceiling by at most parent/1024, floored at the protocol minimum.
pub fn calc_gas_limit(parent_gas_limit: u64, gas_ceil: u64) -> u64 {
    step_toward(parent_gas_limit, gas_ceil, parent_gas_limit / GAS_LIMIT_BOUND_DIVISOR).max(MIN_GAS_LIMIT)
}

/// State size limit for a child block, adjusted with the same bounded step.
pub fn calc_state_limit(parent_state_limit: u64, state_ceil: u64) -> u64 {
    step_toward(parent_state_limit, state_ceil, parent_state_limit / STATE_LIMIT_BOUND_DIVISOR).max(MIN_STATE_LIMIT)
}

fn step_toward(current: u64, desired: u64, bound: u64) -> u64 {
    if current < desired {
        (current + bound).min(desired)
    } else {
        (current - bound.min(current)).max(desired)
    }
}
