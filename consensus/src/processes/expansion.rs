use crate::constants::{EXPANSION_MANIFEST_TARGET, TREE_EXPANSION_THRESHOLD, TREE_EXPANSION_TRIGGER_WINDOW, TREE_EXPANSION_WAIT_COUNT};

const SCORE_SCALE: u64 = 10_000;

/// Efficiency score expected on a prime block, derived from its parent: a
/// damped moving ratio (basis points) of the parent's sub-manifest length
/// against the expansion target.
pub fn expected_efficiency_score(parent_score: u16, parent_manifest_len: usize) -> u16 {
    let instantaneous = (parent_manifest_len as u64 * SCORE_SCALE / EXPANSION_MANIFEST_TARGET as u64).min(SCORE_SCALE);
    ((3 * parent_score as u64 + instantaneous) / 4) as u16
}

/// The threshold-count state machine: counting starts once the score exceeds
/// the expansion threshold, resets if the score drops before the trigger
/// window is reached or once the count has run past the window plus the wait
/// count, and increments otherwise.
pub fn expected_threshold_count(parent_threshold_count: u16, efficiency_score: u16) -> u16 {
    if parent_threshold_count == 0 {
        if efficiency_score > TREE_EXPANSION_THRESHOLD {
            parent_threshold_count + 1
        } else {
            0
        }
    } else if (parent_threshold_count < TREE_EXPANSION_TRIGGER_WINDOW && efficiency_score < TREE_EXPANSION_THRESHOLD)
        || parent_threshold_count >= TREE_EXPANSION_TRIGGER_WINDOW + TREE_EXPANSION_WAIT_COUNT
    {
        0
    } else {
        parent_threshold_count + 1
    }
}

/// The expansion number increments exactly when the parent's threshold count
/// has completed the trigger window plus the announcement wait.
pub fn expected_expansion_number(parent_threshold_count: u16, parent_expansion_number: u8) -> u8 {
    if parent_threshold_count >= TREE_EXPANSION_TRIGGER_WINDOW + TREE_EXPANSION_WAIT_COUNT {
        parent_expansion_number + 1
    } else {
        parent_expansion_number
    }
}
