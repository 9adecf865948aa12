use crate::constants::{ALLOWED_FUTURE_BLOCK_TIME_SECS, MAX_EXTRA_DATA_SIZE, MAX_GAS_LIMIT, MAX_WORK_SHARE_COUNT, WORK_SHARES_INCLUSION_DEPTH};
use crate::errors::{RuleError, RuleResult};
use crate::model::ChainHeaderReader;
use crate::params::Params;
use crate::pow::PowEngine;
use crate::processes::difficulty::{calc_difficulty, delta_log_entropy, total_log_entropy, uncled_delta_log_entropy};
use crate::processes::expansion::{expected_efficiency_score, expected_expansion_number, expected_threshold_count};
use crate::processes::limits::{calc_gas_limit, calc_state_limit};
use braid_consensus_core::block::Block;
use braid_consensus_core::header::Header;
use braid_consensus_core::{Context, Ledger};
use braid_hashes::Hash;
use num_traits::Zero;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A block's order: genesis counts for every level, everything else is
/// classified by its proof-of-work.
pub fn order_of<R: ChainHeaderReader>(engine: &PowEngine, chain: &R, header: &Header) -> RuleResult<Context> {
    if chain.is_genesis(header.hash()) {
        return Ok(Context::Prime);
    }
    engine.calc_order(header)
}

/// Checks whether `header` conforms to the consensus rules on top of its
/// parent at this node's context. Every rule must hold; the first violation
/// is returned.
pub fn verify_header<R: ChainHeaderReader>(
    params: &Params,
    engine: &PowEngine,
    chain: &R,
    header: &Header,
    unix_now: u64,
) -> RuleResult<()> {
    let node_ctx = params.node_ctx();

    // Size bound on extra-data
    if header.extra.len() > MAX_EXTRA_DATA_SIZE {
        return Err(RuleError::ExtraDataTooLong(header.extra.len(), MAX_EXTRA_DATA_SIZE));
    }

    // The carried portion must match its commitment
    let expected_inner = header.compute_inner_hash();
    if header.inner_hash != expected_inner {
        return Err(RuleError::InvalidInnerHash { have: header.inner_hash, want: expected_inner });
    }

    let parent =
        chain.get_header(header.parent_hash(node_ctx)).ok_or(RuleError::UnknownAncestor(header.parent_hash(node_ctx)))?;

    // Timestamps
    if header.time > unix_now + ALLOWED_FUTURE_BLOCK_TIME_SECS {
        return Err(RuleError::FutureBlock(header.time, unix_now + ALLOWED_FUTURE_BLOCK_TIME_SECS));
    }
    if header.time < parent.time {
        return Err(RuleError::OlderBlockTime(header.time, parent.time));
    }

    // Difficulty adjustment can only be checked in zone
    if node_ctx == Context::Zone {
        let expected = calc_difficulty(params, chain, &parent);
        if *header.difficulty(Context::Zone) != expected {
            return Err(RuleError::InvalidDifficulty { have: header.difficulty(Context::Zone).clone(), want: expected });
        }
    }

    // The block's order, derived from the parent classification, must fit
    // this node's context
    let parent_order = order_of(engine, chain, &parent)?;
    if parent_order > node_ctx {
        return Err(RuleError::OrderExceedsContext);
    }

    if !params.location.in_same_slice_as(&header.location) {
        return Err(RuleError::LocationOutOfSlice(header.location));
    }

    verify_entropy_fields(chain, header, &parent, parent_order, node_ctx)?;

    if node_ctx == Context::Prime {
        verify_expansion_fields(params, chain, header, &parent)?;
    }

    if node_ctx == Context::Zone {
        verify_zone_fields(params, header, &parent, parent_order, chain)?;
    }

    // Block number is parent's + 1
    let parent_number = if chain.is_genesis(parent.hash()) { 0 } else { parent.number(node_ctx) };
    if header.number(node_ctx) != parent_number + 1 {
        return Err(RuleError::InvalidNumber { have: header.number(node_ctx), want: parent_number + 1 });
    }

    // The engine-specific seal securing the block
    engine.verify_seal(header)?;
    Ok(())
}

fn verify_entropy_fields<R: ChainHeaderReader>(
    chain: &R,
    header: &Header,
    parent: &Header,
    parent_order: Context,
    node_ctx: Context,
) -> RuleResult<()> {
    let parent_uncles: Vec<Header> =
        chain.get_block(parent.hash()).map(|block| block.uncles().to_vec()).unwrap_or_default();

    for ctx_idx in 0..=node_ctx.index() {
        let ctx = Context::from_index(ctx_idx).unwrap();
        let expected = total_log_entropy(parent, ctx);
        if header.parent_entropy[ctx_idx] != expected {
            return Err(RuleError::InvalidParentEntropy(ctx_idx, header.parent_entropy[ctx_idx].clone(), expected));
        }

        // Below Prime: delta entropy is zero when the parent was a dom block
        if ctx_idx > Context::Prime.index() {
            let expected_delta =
                if parent_order.index() < ctx_idx { Zero::zero() } else { delta_log_entropy(parent, ctx) };
            if header.parent_delta_entropy[ctx_idx] != expected_delta {
                return Err(RuleError::InvalidParentDeltaEntropy(
                    ctx_idx,
                    header.parent_delta_entropy[ctx_idx].clone(),
                    expected_delta,
                ));
            }

            let expected_uncled = if parent_order.index() < ctx_idx {
                Zero::zero()
            } else {
                uncled_delta_log_entropy(parent, &parent_uncles, ctx)
            };
            if header.parent_uncled_delta_entropy[ctx_idx] != expected_uncled {
                return Err(RuleError::InvalidParentUncledDeltaEntropy(
                    ctx_idx,
                    header.parent_uncled_delta_entropy[ctx_idx].clone(),
                    expected_uncled,
                ));
            }
        }
    }
    Ok(())
}

fn verify_expansion_fields<R: ChainHeaderReader>(params: &Params, chain: &R, header: &Header, parent: &Header) -> RuleResult<()> {
    if chain.is_genesis(parent.hash()) {
        if header.efficiency_score != 0 {
            return Err(RuleError::InvalidEfficiencyScore(header.efficiency_score, 0));
        }
        if header.threshold_count != 0 {
            return Err(RuleError::InvalidThresholdCount(header.threshold_count, 0));
        }
        let genesis_expansion = params.genesis_header().expansion_number;
        if header.expansion_number != genesis_expansion {
            return Err(RuleError::InvalidExpansionNumber(header.expansion_number, genesis_expansion));
        }
        return Ok(());
    }

    let parent_manifest_len = chain.get_block(parent.hash()).map(|block| block.sub_manifest().len()).unwrap_or_default();
    let expected_score = expected_efficiency_score(parent.efficiency_score, parent_manifest_len);
    if header.efficiency_score != expected_score {
        return Err(RuleError::InvalidEfficiencyScore(header.efficiency_score, expected_score));
    }

    let expected_count = expected_threshold_count(parent.threshold_count, expected_score);
    if header.threshold_count != expected_count {
        return Err(RuleError::InvalidThresholdCount(header.threshold_count, expected_count));
    }

    let expected_expansion = expected_expansion_number(parent.threshold_count, parent.expansion_number);
    if header.expansion_number != expected_expansion {
        return Err(RuleError::InvalidExpansionNumber(header.expansion_number, expected_expansion));
    }
    Ok(())
}

fn verify_zone_fields<R: ChainHeaderReader>(
    params: &Params,
    header: &Header,
    parent: &Header,
    parent_order: Context,
    chain: &R,
) -> RuleResult<()> {
    let zone = Context::Zone.index();

    // Coinbases must be in scope, one per ledger
    if !header.primary_coinbase.is_in_scope_of(&params.location) {
        return Err(RuleError::OutOfScopeCoinbase("primary", header.primary_coinbase));
    }
    if !header.secondary_coinbase.is_in_scope_of(&params.location) {
        return Err(RuleError::OutOfScopeCoinbase("secondary", header.secondary_coinbase));
    }
    let split = match header.primary_coinbase.ledger() {
        Ledger::Account => header.secondary_coinbase.ledger() == Ledger::Utxo,
        Ledger::Utxo => header.secondary_coinbase.ledger() == Ledger::Account,
    };
    if !split {
        return Err(RuleError::CoinbaseLedgerMismatch(header.primary_coinbase, header.secondary_coinbase));
    }

    // Gas bounds
    if header.gas_limit[zone] > MAX_GAS_LIMIT {
        return Err(RuleError::GasLimitTooHigh(header.gas_limit[zone]));
    }
    if header.gas_used[zone] > header.gas_limit[zone] {
        return Err(RuleError::GasUsedExceedsLimit { used: header.gas_used[zone], limit: header.gas_limit[zone] });
    }
    let expected_gas_limit = calc_gas_limit(parent.gas_limit[zone], params.gas_ceil);
    if header.gas_limit[zone] != expected_gas_limit {
        return Err(RuleError::InvalidGasLimit(header.gas_limit[zone], expected_gas_limit));
    }

    // State bounds
    if header.state_used > header.state_limit {
        return Err(RuleError::StateUsedExceedsLimit { used: header.state_used, limit: header.state_limit });
    }
    let expected_state_limit = calc_state_limit(parent.state_limit, params.state_ceil);
    if header.state_limit != expected_state_limit {
        return Err(RuleError::InvalidStateLimit(header.state_limit, expected_state_limit));
    }

    // Prime terminus points at the last Prime-context ancestor
    let (expected_hash, expected_number) = if parent_order == Context::Prime || chain.is_genesis(parent.hash()) {
        (parent.hash(), parent.number(Context::Prime))
    } else {
        (parent.prime_terminus_hash, parent.prime_terminus_number)
    };
    if header.prime_terminus_hash != expected_hash {
        return Err(RuleError::InvalidPrimeTerminus { have: header.prime_terminus_hash, want: expected_hash });
    }
    if header.prime_terminus_number != expected_number {
        return Err(RuleError::InvalidNumber { have: header.prime_terminus_number, want: expected_number });
    }
    Ok(())
}

/// Verifies that the block's uncles conform to the consensus rules: bounded
/// count, recent but not ancestral, rewarded once, and each carrying either a
/// full seal or at least a work-share seal.
pub fn verify_uncles<R: ChainHeaderReader>(params: &Params, engine: &PowEngine, chain: &R, block: &Block) -> RuleResult<()> {
    let node_ctx = params.node_ctx();
    if block.uncles().len() > MAX_WORK_SHARE_COUNT {
        return Err(RuleError::TooManyUncles(block.uncles().len(), MAX_WORK_SHARE_COUNT));
    }
    if block.uncles().is_empty() {
        return Ok(());
    }

    // Gather the set of past uncles and ancestors
    let mut uncles: HashSet<Hash> = HashSet::new();
    let mut ancestors: HashMap<Hash, Arc<Header>> = HashMap::new();
    let mut parent = block.parent_hash(node_ctx);
    for _ in 0..WORK_SHARES_INCLUSION_DEPTH {
        let Some(ancestor) = chain.get_header(parent) else { break };
        ancestors.insert(parent, Arc::clone(&ancestor));
        if let Some(ancestor_block) = chain.get_block(parent) {
            for uncle in ancestor_block.uncles() {
                uncles.insert(uncle.hash());
            }
        }
        parent = ancestor.parent_hash(node_ctx);
    }
    uncles.insert(block.hash());

    for uncle in block.uncles() {
        // Every uncle is rewarded only once
        let hash = uncle.hash();
        if !uncles.insert(hash) {
            return Err(RuleError::DuplicateUncle(hash));
        }
        if ancestors.contains_key(&hash) {
            return Err(RuleError::UncleIsAncestor(hash));
        }

        // A sibling may only be included as a work share, never as a sealed
        // uncle
        let work_share = engine.verify_seal(uncle).is_err();
        if work_share {
            engine.check_work_share(uncle)?;
        }
        if !ancestors.contains_key(&uncle.parent_hash(node_ctx))
            || (!work_share && uncle.parent_hash(node_ctx) == block.parent_hash(node_ctx))
        {
            return Err(RuleError::DanglingUncle(hash));
        }
        engine.compute_pow_hash(uncle)?;

        if node_ctx == Context::Zone {
            let uncle_parent = ancestors.get(&uncle.parent_hash(node_ctx)).expect("checked above");
            let expected = calc_difficulty(params, chain, uncle_parent);
            if *uncle.difficulty(Context::Zone) != expected {
                return Err(RuleError::InvalidDifficulty { have: uncle.difficulty(Context::Zone).clone(), want: expected });
            }
            let parent_number = if chain.is_genesis(uncle_parent.hash()) { 0 } else { uncle_parent.number(node_ctx) };
            if uncle.number(node_ctx) != parent_number + 1 {
                return Err(RuleError::InvalidNumber { have: uncle.number(node_ctx), want: parent_number + 1 });
            }
        }
    }
    Ok(())
}
