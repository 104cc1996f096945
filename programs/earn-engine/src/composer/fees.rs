use anchor_lang::prelude::*;
use anchor_lang::solana_program::instruction::Instruction;
use anchor_spl::associated_token::get_associated_token_address;
use anchor_spl::token::spl_token;

use crate::errors::EarnError;
use crate::math::FeeDistribution;

/// `TokenInstruction::CloseAccount` tag
const CLOSE_ACCOUNT_TAG: u8 = 9;

pub(crate) fn is_close_account(ix: &Instruction) -> bool {
    (ix.program_id == spl_token::ID || ix.program_id == anchor_spl::token_2022::ID)
        && ix.data.first() == Some(&CLOSE_ACCOUNT_TAG)
}

/// Every bucket with a nonzero share must have an owner.
pub fn check_destinations(owners: &[Option<Pubkey>; 4], fee: &FeeDistribution) -> Result<()> {
    for (owner, share) in owners.iter().zip(fee.buckets()) {
        if share > 0 && owner.is_none() {
            return err!(EarnError::DestinationNotProvisioned);
        }
    }
    Ok(())
}

/// One SPL transfer per nonzero bucket, from the user's associated account
/// for `mint` to each owner's associated account. Bucket order is kept.
pub fn fee_transfer_instructions(
    user: &Pubkey,
    mint: &Pubkey,
    owners: &[Option<Pubkey>; 4],
    fee: &FeeDistribution,
) -> Result<Vec<Instruction>> {
    check_destinations(owners, fee)?;

    let source = get_associated_token_address(user, mint);
    let mut instructions = Vec::new();
    for (owner, share) in owners.iter().zip(fee.buckets()) {
        let Some(owner) = owner.filter(|_| share > 0) else {
            continue;
        };
        let destination = get_associated_token_address(&owner, mint);
        let ix = spl_token::instruction::transfer(&spl_token::ID, &source, &destination, user, &[], share)
            .map_err(|e| {
                log::error!("Failed to build fee transfer: {}", e);
                error!(EarnError::InternalInvariantViolation)
            })?;
        instructions.push(ix);
    }
    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owners() -> [Option<Pubkey>; 4] {
        [
            Some(Pubkey::new_unique()),
            Some(Pubkey::new_unique()),
            Some(Pubkey::new_unique()),
            Some(Pubkey::new_unique()),
        ]
    }

    #[test]
    fn zero_buckets_are_skipped() {
        let user = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let fee = FeeDistribution {
            total: 10,
            earn: 1,
            creator: 0,
            buyback: 4,
            staking: 5,
        };

        let ixs = fee_transfer_instructions(&user, &mint, &owners(), &fee).unwrap();
        assert_eq!(ixs.len(), 3);
        for ix in &ixs {
            assert_eq!(ix.program_id, spl_token::ID);
            assert_eq!(ix.accounts[0].pubkey, get_associated_token_address(&user, &mint));
            assert_eq!(ix.accounts[2].pubkey, user);
            assert!(ix.accounts[2].is_signer);
        }
        assert!(!ixs.iter().any(is_close_account));
    }

    #[test]
    fn missing_owner_for_nonzero_share_fails() {
        let mut owners = owners();
        owners[3] = None;
        let fee = FeeDistribution {
            total: 2,
            earn: 1,
            creator: 1,
            buyback: 0,
            staking: 0,
        };
        check_destinations(&owners, &fee).unwrap();

        let fee = FeeDistribution {
            staking: 1,
            total: 3,
            ..fee
        };
        assert_eq!(
            check_destinations(&owners, &fee).unwrap_err(),
            EarnError::DestinationNotProvisioned.into()
        );
    }

    #[test]
    fn detects_close_account() {
        let close = spl_token::instruction::close_account(
            &spl_token::ID,
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &[],
        )
        .unwrap();
        assert!(is_close_account(&close));
    }
}
