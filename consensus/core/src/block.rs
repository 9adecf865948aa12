use crate::hashing::HasherExtensions;
use crate::header::Header;
use crate::location::{Context, Location};
use crate::tx::Transaction;
use braid_hashes::{Hash, Hasher, ManifestHash};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The ordered list of sub-level block hashes a block commits to.
pub type BlockManifest = Vec<Hash>;

/// Commitment over an ordered list of hashes; used for manifests as well as
/// transaction, ETX and uncle body roots.
pub fn ordered_commitment(hashes: impl IntoIterator<Item = Hash>) -> Hash {
    let hashes: Vec<Hash> = hashes.into_iter().collect();
    let mut hasher = ManifestHash::new();
    hasher.write_var_array(&hashes);
    hasher.finalize()
}

/// Commitment over a manifest: length followed by each hash in order.
pub fn manifest_commitment(manifest: &[Hash]) -> Hash {
    ordered_commitment(manifest.iter().copied())
}

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct Body {
    pub transactions: Vec<Transaction>,
    pub ext_transactions: Vec<Transaction>,
    pub uncles: Vec<Header>,
    pub sub_manifest: BlockManifest,
}

impl Body {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.ext_transactions.is_empty() && self.uncles.is_empty() && self.sub_manifest.is_empty()
    }
}

/// A header paired with its body. Content-addressed by the header identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    header: Header,
    body: Body,
}

impl Block {
    pub fn new_with_header(header: Header) -> Self {
        Self { header, body: Body::default() }
    }

    pub fn with_body(self, body: Body) -> Self {
        Self { header: self.header, body }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn location(&self) -> Location {
        self.header.location
    }

    pub fn number(&self, ctx: Context) -> u64 {
        self.header.number(ctx)
    }

    pub fn parent_hash(&self, ctx: Context) -> Hash {
        self.header.parent_hash(ctx)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.body.transactions
    }

    pub fn ext_transactions(&self) -> &[Transaction] {
        &self.body.ext_transactions
    }

    pub fn uncles(&self) -> &[Header] {
        &self.body.uncles
    }

    pub fn sub_manifest(&self) -> &BlockManifest {
        &self.body.sub_manifest
    }

    pub fn manifest_hash(&self, ctx: Context) -> Hash {
        self.header.manifest_hash[ctx.index()]
    }

    pub fn into_arc(self) -> Arc<Block> {
        Arc::new(self)
    }
}
