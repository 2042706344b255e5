//! Program ids and derived addresses used by candy machine v2 mints

use solana_sdk::pubkey::Pubkey;

pub const CANDY_MACHINE_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("cndy3Z4yapfJBmL3ShUp5exZKqR3z33thTzeNMm2gRZ");

pub const TOKEN_METADATA_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

/// Identity gateway (bot protection) program
pub const GATEWAY_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("gatem74V238djXdzWnJf94Wo1DcnuGkfijbf3AuBhfs");

pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address(owner, mint)
}

pub fn metadata_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"metadata",
            TOKEN_METADATA_PROGRAM_ID.as_ref(),
            mint.as_ref(),
        ],
        &TOKEN_METADATA_PROGRAM_ID,
    )
    .0
}

pub fn master_edition_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"metadata",
            TOKEN_METADATA_PROGRAM_ID.as_ref(),
            mint.as_ref(),
            b"edition",
        ],
        &TOKEN_METADATA_PROGRAM_ID,
    )
    .0
}

/// PDA that signs as creator for the sale; the bump is an instruction argument
pub fn candy_machine_creator(candy_machine: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[b"candy_machine", candy_machine.as_ref()],
        &CANDY_MACHINE_PROGRAM_ID,
    )
}

pub fn collection_pda(candy_machine: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[b"collection", candy_machine.as_ref()],
        &CANDY_MACHINE_PROGRAM_ID,
    )
    .0
}

pub fn collection_authority_record(collection_mint: &Pubkey, authority: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"metadata",
            TOKEN_METADATA_PROGRAM_ID.as_ref(),
            collection_mint.as_ref(),
            b"collection_authority",
            authority.as_ref(),
        ],
        &TOKEN_METADATA_PROGRAM_ID,
    )
    .0
}

/// Feature account that makes a gateway token expire when used
pub fn network_expire_feature(gatekeeper_network: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[gatekeeper_network.as_ref(), b"expire"],
        &GATEWAY_PROGRAM_ID,
    )
    .0
}
