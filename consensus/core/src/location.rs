use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Number of levels in the chain hierarchy.
pub const CONTEXT_DEPTH: usize = 3;

/// The level a chain (or a block's order) belongs to. Prime dominates
/// Regions, Regions dominate Zones; comparisons follow that order, so
/// `Context::Prime < Context::Zone`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[repr(u8)]
pub enum Context {
    Prime = 0,
    Region = 1,
    Zone = 2,
}

impl Context {
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Context> {
        match index {
            0 => Some(Context::Prime),
            1 => Some(Context::Region),
            2 => Some(Context::Zone),
            _ => None,
        }
    }

    /// The dominant level above this one, if any.
    pub fn dom(self) -> Option<Context> {
        match self {
            Context::Prime => None,
            Context::Region => Some(Context::Prime),
            Context::Zone => Some(Context::Region),
        }
    }

    /// The subordinate level below this one, if any.
    pub fn sub(self) -> Option<Context> {
        match self {
            Context::Prime => Some(Context::Region),
            Context::Region => Some(Context::Zone),
            Context::Zone => None,
        }
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Context::Prime => f.write_str("prime"),
            Context::Region => f.write_str("region"),
            Context::Zone => f.write_str("zone"),
        }
    }
}

/// Identifies one chain in the hierarchy. A Prime node carries neither
/// component, a Region node its region index only, a Zone node both.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug, Serialize, Deserialize)]
pub struct Location {
    pub region: Option<u8>,
    pub zone: Option<u8>,
}

impl Location {
    pub const fn prime() -> Self {
        Self { region: None, zone: None }
    }

    pub const fn region(region: u8) -> Self {
        Self { region: Some(region), zone: None }
    }

    pub const fn zone(region: u8, zone: u8) -> Self {
        Self { region: Some(region), zone: Some(zone) }
    }

    pub fn context(&self) -> Context {
        match (self.region, self.zone) {
            (None, _) => Context::Prime,
            (Some(_), None) => Context::Region,
            (Some(_), Some(_)) => Context::Zone,
        }
    }

    /// Index of the subordinate chain, seen from a node at `node_ctx`, that
    /// leads toward this location.
    pub fn sub_index(&self, node_ctx: Context) -> usize {
        match node_ctx {
            Context::Prime => self.region.unwrap_or(0) as usize,
            _ => self.zone.unwrap_or(0) as usize,
        }
    }

    /// The shallowest context whose subtree contains both locations.
    pub fn common_dom(&self, other: &Location) -> Context {
        match (self.region, other.region) {
            (Some(a), Some(b)) if a == b => match (self.zone, other.zone) {
                (Some(x), Some(y)) if x == y => Context::Zone,
                _ => Context::Region,
            },
            _ => Context::Prime,
        }
    }

    /// Whether both locations lie on the same slice, comparing only the
    /// components both carry.
    pub fn in_same_slice_as(&self, other: &Location) -> bool {
        if let (Some(a), Some(b)) = (self.region, other.region) {
            if a != b {
                return false;
            }
        }
        if let (Some(x), Some(y)) = (self.zone, other.zone) {
            if x != y {
                return false;
            }
        }
        true
    }

    /// Whether `other` lies within this location's subtree.
    pub fn contains(&self, other: &Location) -> bool {
        match self.region {
            None => true,
            Some(r) => other.region == Some(r) && match self.zone {
                None => true,
                Some(z) => other.zone == Some(z),
            },
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.region, self.zone) {
            (None, _) => f.write_str("prime"),
            (Some(r), None) => write!(f, "region-{}", r),
            (Some(r), Some(z)) => write!(f, "zone-{}-{}", r, z),
        }
    }
}

/// Which of the two account models an address belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Ledger {
    /// Balance/nonce account ledger.
    Account,
    /// Output-based ledger.
    Utxo,
}

pub const ADDRESS_SIZE: usize = 20;

pub type AddressBytes = [u8; ADDRESS_SIZE];

/// A 20-byte account address. Byte 0 encodes the owning zone as
/// `(region << 4) | zone`; bit 7 of byte 1 selects the ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(AddressBytes);

impl Address {
    pub const fn from_bytes(bytes: AddressBytes) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> AddressBytes {
        self.0
    }

    pub fn from_slice(slice: &[u8]) -> Self {
        Self(<AddressBytes>::try_from(slice).expect("slice must have the length of Address"))
    }

    /// Builds an address owned by `location` from raw key material, stamping
    /// the scope prefix and ledger bit.
    pub fn from_raw_in(bytes: AddressBytes, location: Location, ledger: Ledger) -> Self {
        let mut out = bytes;
        out[0] = (location.region.unwrap_or(0) << 4) | (location.zone.unwrap_or(0) & 0x0f);
        match ledger {
            Ledger::Account => out[1] &= 0x7f,
            Ledger::Utxo => out[1] |= 0x80,
        }
        Self(out)
    }

    /// The zone this address lives in, decoded from the scope prefix.
    pub fn location(&self) -> Location {
        Location::zone(self.0[0] >> 4, self.0[0] & 0x0f)
    }

    pub fn ledger(&self) -> Ledger {
        if self.0[1] & 0x80 == 0 {
            Ledger::Account
        } else {
            Ledger::Utxo
        }
    }

    pub fn is_in_account_ledger_scope(&self) -> bool {
        self.ledger() == Ledger::Account
    }

    pub fn is_in_utxo_ledger_scope(&self) -> bool {
        self.ledger() == Ledger::Utxo
    }

    /// Whether the address is inside the scope of the given node location.
    pub fn is_in_scope_of(&self, location: &Location) -> bool {
        location.contains(&self.location())
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; ADDRESS_SIZE];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_ordering_follows_dominance() {
        assert!(Context::Prime < Context::Region);
        assert!(Context::Region < Context::Zone);
        assert_eq!(Context::Zone.dom(), Some(Context::Region));
        assert_eq!(Context::Prime.sub(), Some(Context::Region));
        assert_eq!(Context::Prime.dom(), None);
    }

    #[test]
    fn common_dom_of_locations() {
        let a = Location::zone(0, 0);
        let b = Location::zone(0, 1);
        let c = Location::zone(1, 0);
        assert_eq!(a.common_dom(&a), Context::Zone);
        assert_eq!(a.common_dom(&b), Context::Region);
        assert_eq!(a.common_dom(&c), Context::Prime);
    }

    #[test]
    fn slice_membership() {
        let region = Location::region(1);
        let zone = Location::zone(1, 2);
        let foreign = Location::zone(0, 2);
        assert!(region.in_same_slice_as(&zone));
        assert!(!region.in_same_slice_as(&foreign));
        assert!(Location::prime().in_same_slice_as(&foreign));
        assert!(region.contains(&zone));
        assert!(!zone.contains(&region));
    }

    #[test]
    fn address_scope_round_trip() {
        let addr = Address::from_raw_in([0xffu8; 20], Location::zone(2, 3), Ledger::Utxo);
        assert_eq!(addr.location(), Location::zone(2, 3));
        assert_eq!(addr.ledger(), Ledger::Utxo);
        assert!(addr.is_in_scope_of(&Location::zone(2, 3)));
        assert!(addr.is_in_scope_of(&Location::region(2)));
        assert!(!addr.is_in_scope_of(&Location::zone(2, 4)));

        let account = Address::from_raw_in(addr.bytes(), Location::zone(2, 3), Ledger::Account);
        assert!(account.is_in_account_ledger_scope());
    }

    #[test]
    fn address_hex_round_trip() {
        let addr: Address = "0x0000000000000000000000000000000000000001".parse().unwrap();
        assert_eq!(addr.to_string(), "0x0000000000000000000000000000000000000001");
    }
}
