use serde::Serialize;
use std::fmt;

/// Progress of the current mint attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MintState {
    #[default]
    Idle,
    SettingUp,
    AwaitingSetupConfirmation,
    ReadyToMint,
    Minting,
    AwaitingMintConfirmation,
    Succeeded,
    LikelyFailed,
    Failed,
}

impl MintState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MintState::Succeeded | MintState::LikelyFailed | MintState::Failed
        )
    }
}

impl fmt::Display for MintState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MintState::Idle => "idle",
            MintState::SettingUp => "setting_up",
            MintState::AwaitingSetupConfirmation => "awaiting_setup_confirmation",
            MintState::ReadyToMint => "ready_to_mint",
            MintState::Minting => "minting",
            MintState::AwaitingMintConfirmation => "awaiting_mint_confirmation",
            MintState::Succeeded => "succeeded",
            MintState::LikelyFailed => "likely_failed",
            MintState::Failed => "failed",
        };
        f.write_str(s)
    }
}
