use crate::location::{Address, Location};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AllocError {
    #[error("invalid genesis allocation: {0}")]
    InvalidGenesis(String),

    #[error("allocation address {0} is out of scope for this node")]
    OutOfScopeAddress(Address),
}

#[derive(Clone, Copy)]
struct VestingSchedule {
    /// Total vesting duration in years. The first year cliff is not part of vesting.
    vest_duration: u64,
    /// One-time percentage unlocked at TGE, in whole percent.
    tge_percentage: u64,
}

const VESTING_SCHEDULES: [VestingSchedule; 3] = [
    // schedule 0: 5 years, 30% TGE
    VestingSchedule { vest_duration: 5, tge_percentage: 30 },
    // schedule 1: 3 years, 25% TGE
    VestingSchedule { vest_duration: 3, tge_percentage: 25 },
    // schedule 2: 3 years, no TGE
    VestingSchedule { vest_duration: 3, tge_percentage: 0 },
];

/// An account in the state of the genesis block, with its derived
/// block-height → unlock-amount schedule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenesisAccount {
    pub vest_schedule: u8,
    pub address: Address,
    pub total_balance: u64,
    /// Map of block number -> balance unlocked at that block.
    pub balance_schedule: BTreeMap<u64, u128>,
}

#[derive(Deserialize)]
struct RawGenesisAccount {
    #[serde(rename = "Vest Schedule")]
    vest_schedule: u8,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Amount")]
    amount: u64,
}

/// Returns all genesis accounts from the allocation file with their vesting
/// schedules calculated.
pub fn allocate_genesis_accounts(path: impl AsRef<Path>, blocks_per_month: u64) -> Result<Vec<GenesisAccount>, AllocError> {
    let file = std::fs::File::open(path).map_err(|err| AllocError::InvalidGenesis(format!("failed to open file: {}", err)))?;
    let mut accounts = decode_genesis_allocs(file)?;
    for account in accounts.iter_mut() {
        account.calculate_locked_balances(blocks_per_month);
    }
    Ok(accounts)
}

/// Parses the allocation JSON without deriving schedules.
pub fn decode_genesis_allocs<R: Read>(reader: R) -> Result<Vec<GenesisAccount>, AllocError> {
    let raw: Vec<RawGenesisAccount> =
        serde_json::from_reader(reader).map_err(|err| AllocError::InvalidGenesis(format!("failed to decode JSON: {}", err)))?;
    raw.into_iter()
        .map(|record| {
            if record.vest_schedule as usize >= VESTING_SCHEDULES.len() {
                return Err(AllocError::InvalidGenesis(format!("unknown vest schedule {}", record.vest_schedule)));
            }
            let address = record
                .address
                .parse()
                .map_err(|err| AllocError::InvalidGenesis(format!("bad address {}: {}", record.address, err)))?;
            Ok(GenesisAccount {
                vest_schedule: record.vest_schedule,
                address,
                total_balance: record.amount,
                balance_schedule: BTreeMap::new(),
            })
        })
        .collect()
}

impl GenesisAccount {
    /// Calculates the unlock heights according to the account's pre-defined
    /// vesting schedule. Deterministic: re-running yields an identical map.
    pub fn calculate_locked_balances(&mut self, blocks_per_month: u64) {
        let schedule = VESTING_SCHEDULES[self.vest_schedule as usize];
        let total = self.total_balance as u128;

        // One-time unlock at TGE.
        let tge_amount = total * schedule.tge_percentage as u128 / 100;
        self.balance_schedule = BTreeMap::new();
        self.balance_schedule.insert(0, tge_amount);

        // Monthly unlocks start after the one year cliff.
        let num_unlocks = schedule.vest_duration * 12;
        let per_unlock = (total - tge_amount) / num_unlocks as u128;
        for i in 0..=num_unlocks {
            // Off by 1 to make the unlock observable in the following block.
            self.balance_schedule.insert((12 + i) * blocks_per_month - 1, per_unlock);
        }

        // The final key absorbs the rounding residual.
        let accounted = tge_amount + per_unlock * num_unlocks as u128;
        let final_unlock_height = (12 + num_unlocks) * blocks_per_month - 1;
        self.balance_schedule.insert(final_unlock_height, per_unlock + (total - accounted));
    }

    /// The amount this account unlocks when `height` is produced: the
    /// schedule entry recorded at the immediately preceding block, if any.
    pub fn unlockable_at(&self, height: u64) -> u128 {
        match height {
            0 => 0,
            _ => self.balance_schedule.get(&(height - 1)).copied().unwrap_or(0),
        }
    }

    /// Whether the account address may be credited by a node at `location`.
    pub fn check_scope(&self, location: &Location) -> Result<(), AllocError> {
        if self.address.is_in_scope_of(location) {
            Ok(())
        } else {
            Err(AllocError::OutOfScopeAddress(self.address))
        }
    }
}
