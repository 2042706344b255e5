//! Instruction planning for candy machine v2 mints
//!
//! Stateless functions; ordering within a transaction is:
//! 1. setup (create mint, init mint, create token account, mint one token)
//! 2. `mint_nft`
//! 3. `set_collection_during_mint` (when the sale retains collection authority)

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program, sysvar,
};
#[allow(deprecated)]
use solana_sdk::system_instruction;

use crate::chain::addresses::{
    associated_token_address, candy_machine_creator, collection_authority_record, collection_pda,
    master_edition_address, metadata_address, network_expire_feature, CANDY_MACHINE_PROGRAM_ID,
    GATEWAY_PROGRAM_ID, TOKEN_METADATA_PROGRAM_ID,
};
use crate::chain::layout::anchor_discriminator;
use crate::errors::{ChainError, ChainResult};
use crate::types::{PaymentKind, SaleConfig};

/// Size of an SPL token mint account
pub const MINT_ACCOUNT_LEN: u64 = 82;

/// Create and fund a one-token mint owned by `payer`
pub fn plan_setup_instructions(
    payer: &Pubkey,
    mint: &Pubkey,
    rent_lamports: u64,
) -> ChainResult<Vec<Instruction>> {
    let token_program = spl_token::id();
    let user_token_account = associated_token_address(payer, mint);

    let initialize = spl_token::instruction::initialize_mint(
        &token_program,
        mint,
        payer,
        Some(payer),
        0,
    )
    .map_err(|e| ChainError::Build(format!("initialize_mint: {e}")))?;

    let mint_to = spl_token::instruction::mint_to(
        &token_program,
        mint,
        &user_token_account,
        payer,
        &[],
        1,
    )
    .map_err(|e| ChainError::Build(format!("mint_to: {e}")))?;

    Ok(vec![
        system_instruction::create_account(
            payer,
            mint,
            rent_lamports,
            MINT_ACCOUNT_LEN,
            &token_program,
        ),
        initialize,
        spl_associated_token_account::instruction::create_associated_token_account(
            payer,
            payer,
            mint,
            &token_program,
        ),
        mint_to,
    ])
}

/// The program's `mint_nft` instruction with feature-dependent trailing accounts
pub fn plan_mint_instruction(
    sale: &SaleConfig,
    payer: &Pubkey,
    mint: &Pubkey,
    gateway_token: Option<&Pubkey>,
) -> ChainResult<Instruction> {
    let (creator, creator_bump) = candy_machine_creator(&sale.address);

    let mut accounts = vec![
        AccountMeta::new(sale.address, false),
        AccountMeta::new_readonly(creator, false),
        AccountMeta::new(*payer, true),
        AccountMeta::new(sale.treasury, false),
        AccountMeta::new(metadata_address(mint), false),
        AccountMeta::new(*mint, false),
        AccountMeta::new_readonly(*payer, true), // mint authority
        AccountMeta::new_readonly(*payer, true), // update authority
        AccountMeta::new(master_edition_address(mint), false),
        AccountMeta::new_readonly(TOKEN_METADATA_PROGRAM_ID, false),
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new_readonly(system_program::id(), false),
        AccountMeta::new_readonly(sysvar::rent::id(), false),
        AccountMeta::new_readonly(sysvar::clock::id(), false),
        AccountMeta::new_readonly(sysvar::slot_hashes::id(), false),
        AccountMeta::new_readonly(sysvar::instructions::id(), false),
    ];

    if let Some(gatekeeper) = &sale.gatekeeper {
        let token = gateway_token.ok_or_else(|| {
            ChainError::Build("gatekeeper configured but no gateway token supplied".into())
        })?;
        accounts.push(AccountMeta::new(*token, false));
        if gatekeeper.expire_on_use {
            accounts.push(AccountMeta::new_readonly(GATEWAY_PROGRAM_ID, false));
            accounts.push(AccountMeta::new_readonly(
                network_expire_feature(&gatekeeper.network),
                false,
            ));
        }
    }

    if let Some(whitelist) = &sale.whitelist {
        accounts.push(AccountMeta::new(
            associated_token_address(payer, &whitelist.mint),
            false,
        ));
        if whitelist.burns() {
            accounts.push(AccountMeta::new(whitelist.mint, false));
            accounts.push(AccountMeta::new_readonly(*payer, true));
        }
    }

    if let PaymentKind::Token { mint: token_mint, .. } = sale.payment {
        accounts.push(AccountMeta::new(
            associated_token_address(payer, &token_mint),
            false,
        ));
        accounts.push(AccountMeta::new_readonly(*payer, true));
    }

    let mut data = anchor_discriminator("global", "mint_nft").to_vec();
    data.push(creator_bump);

    Ok(Instruction::new_with_bytes(
        CANDY_MACHINE_PROGRAM_ID,
        &data,
        accounts,
    ))
}

/// Verifies the freshly minted NFT into the sale's collection
pub fn plan_set_collection_instruction(
    sale: &SaleConfig,
    payer: &Pubkey,
    mint: &Pubkey,
    collection_mint: &Pubkey,
) -> Instruction {
    let collection = collection_pda(&sale.address);

    let accounts = vec![
        AccountMeta::new_readonly(sale.address, false),
        AccountMeta::new_readonly(metadata_address(mint), false),
        AccountMeta::new_readonly(*payer, true),
        AccountMeta::new(collection, false),
        AccountMeta::new_readonly(TOKEN_METADATA_PROGRAM_ID, false),
        AccountMeta::new_readonly(sysvar::instructions::id(), false),
        AccountMeta::new_readonly(*collection_mint, false),
        AccountMeta::new_readonly(metadata_address(collection_mint), false),
        AccountMeta::new_readonly(master_edition_address(collection_mint), false),
        AccountMeta::new_readonly(sale.authority, false),
        AccountMeta::new_readonly(
            collection_authority_record(collection_mint, &collection),
            false,
        ),
    ];

    Instruction::new_with_bytes(
        CANDY_MACHINE_PROGRAM_ID,
        &anchor_discriminator("global", "set_collection_during_mint"),
        accounts,
    )
}
