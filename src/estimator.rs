//! Transaction size estimation for the combined setup + mint transaction
//!
//! Every optional sale feature adds accounts (and sometimes an instruction)
//! to the mint transaction. The byte costs below follow the program's
//! instruction encoding; when their sum exceeds the packet budget the mint
//! must be split into a setup transaction and a mint transaction.

/// Size of the bare setup + mint instruction set
pub const BASE_TX_SIZE: usize = 892;
/// set_collection_during_mint instruction and its accounts
pub const COLLECTION_AUTHORITY_SIZE: usize = 182;
/// Paying token account plus transfer authority
pub const TOKEN_MINT_SIZE: usize = 66;
pub const WHITELIST_SIZE: usize = 34;
/// Whitelist mint and burn authority
pub const WHITELIST_BURN_SIZE: usize = 34;
pub const GATEKEEPER_SIZE: usize = 33;
/// Gateway program and expire feature accounts
pub const GATEKEEPER_EXPIRE_SIZE: usize = 66;

/// Largest estimate that still fits in one transaction
pub const TX_SIZE_CEILING: usize = 1230;

/// Features of the sale that affect the mint transaction layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeInputs {
    pub collection_authority: bool,
    pub token_mint: bool,
    pub whitelist: bool,
    pub whitelist_burn: bool,
    pub gatekeeper: bool,
    pub gatekeeper_expire_on_use: bool,
}

pub struct TransactionSizeEstimator;

impl TransactionSizeEstimator {
    #[inline]
    pub fn estimate(inputs: &SizeInputs) -> usize {
        let feature = |enabled: bool, size: usize| if enabled { size } else { 0 };

        BASE_TX_SIZE
            + feature(inputs.collection_authority, COLLECTION_AUTHORITY_SIZE)
            + feature(inputs.token_mint, TOKEN_MINT_SIZE)
            + feature(inputs.whitelist, WHITELIST_SIZE)
            + feature(inputs.whitelist_burn, WHITELIST_BURN_SIZE)
            + feature(inputs.gatekeeper, GATEKEEPER_SIZE)
            + feature(inputs.gatekeeper_expire_on_use, GATEKEEPER_EXPIRE_SIZE)
    }

    #[inline(always)]
    pub fn exceeds_limit(estimate: usize) -> bool {
        estimate > TX_SIZE_CEILING
    }

    pub fn needs_split(inputs: &SizeInputs) -> bool {
        Self::exceeds_limit(Self::estimate(inputs))
    }
}
