//! Candy machine v2 account layout
//!
//! Anchor accounts: an 8-byte discriminator followed by borsh-encoded fields.
//! The wire structs mirror the on-chain layout; only the fields the mint
//! client needs are carried into [`CandyMachineAccount`].

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use solana_sdk::{clock::Clock, pubkey::Pubkey};
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::Mint;

use crate::errors::{ChainError, ChainResult};
use crate::types::{
    EndCondition, GatekeeperSettings, PaymentKind, SaleConfig, WhitelistMode, WhitelistSettings,
};

/// Decimals assumed for a payment token until its mint account is read
pub const DEFAULT_TOKEN_DECIMALS: u8 = 9;

const DISCRIMINATOR_LEN: usize = 8;

/// First 8 bytes of `sha256("<namespace>:<name>")`
pub fn anchor_discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("{namespace}:{name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

#[derive(Debug, BorshSerialize, BorshDeserialize)]
struct CandyMachineWire {
    authority: [u8; 32],
    wallet: [u8; 32],
    token_mint: Option<[u8; 32]>,
    items_redeemed: u64,
    data: CandyMachineData,
}

#[derive(Debug, BorshSerialize, BorshDeserialize)]
struct CandyMachineData {
    uuid: String,
    price: u64,
    symbol: String,
    seller_fee_basis_points: u16,
    max_supply: u64,
    is_mutable: bool,
    retain_authority: bool,
    go_live_date: Option<i64>,
    end_settings: Option<EndSettings>,
    creators: Vec<Creator>,
    hidden_settings: Option<HiddenSettings>,
    whitelist_mint_settings: Option<WhitelistMintSettings>,
    items_available: u64,
    gatekeeper: Option<GatekeeperConfig>,
}

#[derive(Debug, BorshSerialize, BorshDeserialize)]
enum EndSettingType {
    Date,
    Amount,
}

#[derive(Debug, BorshSerialize, BorshDeserialize)]
struct EndSettings {
    end_setting_type: EndSettingType,
    number: u64,
}

#[derive(Debug, BorshSerialize, BorshDeserialize)]
struct Creator {
    address: [u8; 32],
    verified: bool,
    share: u8,
}

#[derive(Debug, BorshSerialize, BorshDeserialize)]
struct HiddenSettings {
    name: String,
    uri: String,
    hash: [u8; 32],
}

#[derive(Debug, BorshSerialize, BorshDeserialize)]
enum WhitelistMintMode {
    BurnEveryTime,
    NeverBurn,
}

#[derive(Debug, BorshSerialize, BorshDeserialize)]
struct WhitelistMintSettings {
    mode: WhitelistMintMode,
    mint: [u8; 32],
    presale: bool,
    discount_price: Option<u64>,
}

#[derive(Debug, BorshSerialize, BorshDeserialize)]
struct GatekeeperConfig {
    gatekeeper_network: [u8; 32],
    expire_on_use: bool,
}

#[derive(Debug, BorshSerialize, BorshDeserialize)]
struct CollectionPdaWire {
    mint: [u8; 32],
    candy_machine: [u8; 32],
}

/// Strip the Anchor discriminator and borsh-decode the body.
/// Trailing bytes (config lines after the candy machine) are ignored.
fn decode_anchor<T: BorshDeserialize>(data: &[u8], name: &str) -> ChainResult<T> {
    if data.len() < DISCRIMINATOR_LEN {
        return Err(ChainError::Decode(format!(
            "{name}: account data shorter than discriminator ({} bytes)",
            data.len()
        )));
    }
    let (discriminator, mut body) = data.split_at(DISCRIMINATOR_LEN);
    if discriminator != anchor_discriminator("account", name) {
        return Err(ChainError::Decode(format!("{name}: discriminator mismatch")));
    }
    T::deserialize(&mut body).map_err(|e| ChainError::Decode(format!("{name}: {e}")))
}

/// Decoded sale account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandyMachineAccount {
    pub address: Pubkey,
    pub authority: Pubkey,
    /// Treasury receiving native payments
    pub wallet: Pubkey,
    pub token_mint: Option<Pubkey>,
    pub token_decimals: u8,
    pub items_redeemed: u64,
    pub items_available: u64,
    pub price: u64,
    pub symbol: String,
    pub retain_authority: bool,
    pub go_live_date: Option<i64>,
    pub end_condition: EndCondition,
    pub whitelist: Option<WhitelistSettings>,
    pub gatekeeper: Option<GatekeeperSettings>,
}

impl CandyMachineAccount {
    pub fn decode(address: Pubkey, data: &[u8]) -> ChainResult<Self> {
        let wire: CandyMachineWire = decode_anchor(data, "CandyMachine")
            .map_err(|e| ChainError::Decode(format!("{address}: {e}")))?;
        let d = wire.data;

        let end_condition = match d.end_settings {
            None => EndCondition::None,
            Some(EndSettings {
                end_setting_type: EndSettingType::Date,
                number,
            }) => EndCondition::ByDate(number as i64),
            Some(EndSettings {
                end_setting_type: EndSettingType::Amount,
                number,
            }) => EndCondition::ByAmount(number),
        };

        let whitelist = d.whitelist_mint_settings.map(|wl| WhitelistSettings {
            mode: match wl.mode {
                WhitelistMintMode::BurnEveryTime => WhitelistMode::BurnEveryTime,
                WhitelistMintMode::NeverBurn => WhitelistMode::NeverBurn,
            },
            mint: Pubkey::new_from_array(wl.mint),
            is_presale_only: wl.presale,
            discount_price: wl.discount_price,
        });

        let gatekeeper = d.gatekeeper.map(|gk| GatekeeperSettings {
            network: Pubkey::new_from_array(gk.gatekeeper_network),
            expire_on_use: gk.expire_on_use,
        });

        Ok(Self {
            address,
            authority: Pubkey::new_from_array(wire.authority),
            wallet: Pubkey::new_from_array(wire.wallet),
            token_mint: wire.token_mint.map(Pubkey::new_from_array),
            token_decimals: DEFAULT_TOKEN_DECIMALS,
            items_redeemed: wire.items_redeemed,
            items_available: d.items_available,
            price: d.price,
            symbol: d.symbol,
            retain_authority: d.retain_authority,
            go_live_date: d.go_live_date,
            end_condition,
            whitelist,
            gatekeeper,
        })
    }

    pub fn sale_config(&self, collection_mint: Option<Pubkey>) -> SaleConfig {
        SaleConfig {
            address: self.address,
            authority: self.authority,
            treasury: self.wallet,
            price: self.price,
            payment: match self.token_mint {
                Some(mint) => PaymentKind::Token {
                    mint,
                    decimals: self.token_decimals,
                },
                None => PaymentKind::Native,
            },
            whitelist: self.whitelist.clone(),
            end_condition: self.end_condition,
            gatekeeper: self.gatekeeper,
            go_live_date: self.go_live_date,
            retain_authority: self.retain_authority,
            collection_mint,
        }
    }
}

/// Collection mint stored in the sale's collection PDA
pub fn decode_collection_pda(data: &[u8]) -> ChainResult<Pubkey> {
    let wire: CollectionPdaWire = decode_anchor(data, "CollectionPDA")?;
    Ok(Pubkey::new_from_array(wire.mint))
}

/// Decimals of an SPL token mint account.
/// Token-2022 mints carry extensions after the base layout, so only the base is unpacked.
pub fn decode_mint_decimals(data: &[u8]) -> ChainResult<u8> {
    let base = data.get(..Mint::LEN).ok_or_else(|| {
        ChainError::Decode(format!("mint account too short: {} bytes", data.len()))
    })?;
    Mint::unpack(base)
        .map(|mint| mint.decimals)
        .map_err(|e| ChainError::Decode(format!("mint account: {e}")))
}

/// Cluster time from the clock sysvar
pub fn decode_clock_timestamp(data: &[u8]) -> ChainResult<i64> {
    bincode::deserialize::<Clock>(data)
        .map(|clock| clock.unix_timestamp)
        .map_err(|e| ChainError::Decode(format!("clock sysvar: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spl_token::solana_program::program_option::COption;

    fn discriminated<T: BorshSerialize>(name: &str, body: &T) -> Vec<u8> {
        let mut buf = anchor_discriminator("account", name).to_vec();
        buf.extend(borsh::to_vec(body).unwrap());
        buf
    }

    /// Candy machine with a burn-mode whitelist and an amount limit
    fn encoded_candy_machine(
        authority: &Pubkey,
        whitelist_mint: &Pubkey,
        gatekeeper_network: &Pubkey,
    ) -> Vec<u8> {
        let wire = CandyMachineWire {
            authority: authority.to_bytes(),
            wallet: Pubkey::new_unique().to_bytes(),
            token_mint: None,
            items_redeemed: 42,
            data: CandyMachineData {
                uuid: "abcdef".into(),
                price: 1_500_000_000,
                symbol: "IMM".into(),
                seller_fee_basis_points: 500,
                max_supply: 0,
                is_mutable: true,
                retain_authority: true,
                go_live_date: Some(1_650_000_000),
                end_settings: Some(EndSettings {
                    end_setting_type: EndSettingType::Amount,
                    number: 500,
                }),
                creators: vec![Creator {
                    address: authority.to_bytes(),
                    verified: true,
                    share: 100,
                }],
                hidden_settings: None,
                whitelist_mint_settings: Some(WhitelistMintSettings {
                    mode: WhitelistMintMode::BurnEveryTime,
                    mint: whitelist_mint.to_bytes(),
                    presale: true,
                    discount_price: Some(1_000_000_000),
                }),
                items_available: 1_000,
                gatekeeper: Some(GatekeeperConfig {
                    gatekeeper_network: gatekeeper_network.to_bytes(),
                    expire_on_use: false,
                }),
            },
        };
        discriminated("CandyMachine", &wire)
    }

    #[test]
    fn test_decode_candy_machine() {
        let authority = Pubkey::new_unique();
        let wl_mint = Pubkey::new_unique();
        let network = Pubkey::new_unique();
        let address = Pubkey::new_unique();

        let mut data = encoded_candy_machine(&authority, &wl_mint, &network);
        // config lines follow the struct on chain
        data.extend_from_slice(&[0u8; 64]);
        let account = CandyMachineAccount::decode(address, &data).unwrap();

        assert_eq!(account.address, address);
        assert_eq!(account.authority, authority);
        assert_eq!(account.token_mint, None);
        assert_eq!(account.items_redeemed, 42);
        assert_eq!(account.items_available, 1_000);
        assert_eq!(account.price, 1_500_000_000);
        assert_eq!(account.symbol, "IMM");
        assert!(account.retain_authority);
        assert_eq!(account.go_live_date, Some(1_650_000_000));
        assert_eq!(account.end_condition, EndCondition::ByAmount(500));

        let wl = account.whitelist.unwrap();
        assert_eq!(wl.mint, wl_mint);
        assert!(wl.burns());
        assert!(wl.is_presale_only);
        assert_eq!(wl.discount_price, Some(1_000_000_000));

        let gk = account.gatekeeper.unwrap();
        assert_eq!(gk.network, network);
        assert!(!gk.expire_on_use);
    }

    #[test]
    fn test_decode_rejects_foreign_account() {
        let mut data = encoded_candy_machine(
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
        );
        data[0] ^= 0xff;
        let err = CandyMachineAccount::decode(Pubkey::new_unique(), &data).unwrap_err();
        assert!(matches!(err, ChainError::Decode(_)));
    }

    #[test]
    fn test_decode_truncated() {
        let data = encoded_candy_machine(
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
        );
        let err = CandyMachineAccount::decode(Pubkey::new_unique(), &data[..120]).unwrap_err();
        assert!(matches!(err, ChainError::Decode(_)));

        let err = CandyMachineAccount::decode(Pubkey::new_unique(), &data[..4]).unwrap_err();
        assert!(matches!(err, ChainError::Decode(_)));
    }

    #[test]
    fn test_collection_pda() {
        let mint = Pubkey::new_unique();
        let data = discriminated(
            "CollectionPDA",
            &CollectionPdaWire {
                mint: mint.to_bytes(),
                candy_machine: Pubkey::new_unique().to_bytes(),
            },
        );
        assert_eq!(decode_collection_pda(&data), Ok(mint));
        assert!(decode_collection_pda(&data[..20]).is_err());
    }

    #[test]
    fn test_mint_decimals() {
        let mint = Mint {
            mint_authority: COption::None,
            supply: 1_000,
            decimals: 6,
            is_initialized: true,
            freeze_authority: COption::None,
        };
        let mut data = vec![0u8; Mint::LEN];
        Mint::pack(mint, &mut data).unwrap();

        assert_eq!(decode_mint_decimals(&data), Ok(6));
        assert!(decode_mint_decimals(&data[..10]).is_err());
        assert!(decode_mint_decimals(&[0u8; Mint::LEN]).is_err());
    }

    #[test]
    fn test_clock_timestamp() {
        let clock = Clock {
            slot: 7,
            unix_timestamp: 1_700_000_000,
            ..Clock::default()
        };
        let data = bincode::serialize(&clock).unwrap();
        assert_eq!(decode_clock_timestamp(&data), Ok(1_700_000_000));
        assert!(decode_clock_timestamp(&data[..8]).is_err());
    }
}
