use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use super::EngineContext;
use crate::errors::EarnError;
use crate::events::{ConfigUpdated, EarnEvent};
use crate::state::TokenConfig;
use crate::store;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTokenActiveArgs {
    pub token_mint: Pubkey,
    pub caller: Pubkey,
    pub active: bool,
}

/// Pause or resume fee collection for a token. Only the creator or the
/// protocol wallet may do this.
pub fn set_token_active(ctx: &EngineContext, args: &SetTokenActiveArgs) -> Result<TokenConfig> {
    let mut config = ctx.token_config(&args.token_mint)?;

    let authorized = args.caller == config.creator || Some(args.caller) == ctx.config.protocol_wallet;
    if !authorized {
        ctx.events.security_alert(
            "unauthorized_config_change",
            Some(args.token_mint),
            format!("{} tried to set is_active={}", args.caller, args.active),
            ctx.now,
        );
        return err!(EarnError::Unauthorized);
    }

    let old_value = config.is_active;
    config.is_active = args.active;
    ctx.store.put(
        &store::token_config_key(&args.token_mint),
        store::encode(&config)?,
    )?;

    ctx.events.emit(EarnEvent::ConfigUpdated(ConfigUpdated {
        token_mint: args.token_mint,
        updater: args.caller,
        field: "is_active".to_string(),
        old_value: old_value as u64,
        new_value: args.active as u64,
        timestamp: ctx.now,
    }));
    log::info!("Token {} is_active: {} -> {}", args.token_mint, old_value, args.active);

    Ok(config)
}
