use anchor_lang::prelude::*;
use anchor_lang::solana_program::address_lookup_table::AddressLookupTableAccount;
use anchor_lang::solana_program::hash::Hash;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use anchor_lang::solana_program::message::{legacy, v0, VersionedMessage};
use serde::{Deserialize, Serialize};

use super::fees::is_close_account;
use crate::errors::EarnError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    Legacy,
    V0,
}

impl From<&VersionedMessage> for MessageFormat {
    fn from(message: &VersionedMessage) -> Self {
        match message {
            VersionedMessage::Legacy(_) => Self::Legacy,
            VersionedMessage::V0(_) => Self::V0,
        }
    }
}

/// Format-independent view of a transaction: ordered instructions, the fee
/// payer and any lookup tables the compiled form may reference.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionPlan {
    pub payer: Pubkey,
    pub instructions: Vec<Instruction>,
    pub lookup_tables: Vec<AddressLookupTableAccount>,
    pub format: MessageFormat,
}

impl TransactionPlan {
    pub fn v0(payer: Pubkey, instructions: Vec<Instruction>, lookup_tables: Vec<AddressLookupTableAccount>) -> Self {
        Self {
            payer,
            instructions,
            lookup_tables,
            format: MessageFormat::V0,
        }
    }

    /// Lookup table addresses a message needs resolved before it can be
    /// decompiled.
    pub fn required_tables(message: &VersionedMessage) -> Vec<Pubkey> {
        match message {
            VersionedMessage::Legacy(_) => Vec::new(),
            VersionedMessage::V0(m) => m.address_table_lookups.iter().map(|l| l.account_key).collect(),
        }
    }

    /// Expand a compiled message back into full instructions. Every table the
    /// message references must be present in `tables`.
    pub fn decompile(message: &VersionedMessage, tables: &[AddressLookupTableAccount]) -> Result<Self> {
        let header = message.header();
        let static_keys = message.static_account_keys();
        let payer = *static_keys
            .first()
            .ok_or(EarnError::MalformedUpstreamResponse)?;

        let mut loaded_writable = Vec::new();
        let mut loaded_readonly = Vec::new();
        let mut used_tables = Vec::new();
        if let VersionedMessage::V0(m) = message {
            for lookup in &m.address_table_lookups {
                let table = tables
                    .iter()
                    .find(|t| t.key == lookup.account_key)
                    .ok_or(EarnError::LookupTableUnavailable)?;
                let resolve = |index: &u8| {
                    table
                        .addresses
                        .get(*index as usize)
                        .copied()
                        .ok_or_else(|| error!(EarnError::MalformedUpstreamResponse))
                };
                for index in &lookup.writable_indexes {
                    loaded_writable.push(resolve(index)?);
                }
                for index in &lookup.readonly_indexes {
                    loaded_readonly.push(resolve(index)?);
                }
                used_tables.push(table.clone());
            }
        }

        let num_static = static_keys.len();
        let num_signed = header.num_required_signatures as usize;
        let num_writable_signed = num_signed.saturating_sub(header.num_readonly_signed_accounts as usize);
        let num_writable_unsigned = num_static.saturating_sub(header.num_readonly_unsigned_accounts as usize);
        require!(
            num_signed <= num_static && num_writable_unsigned >= num_signed,
            EarnError::MalformedUpstreamResponse
        );

        let keys: Vec<Pubkey> = static_keys
            .iter()
            .chain(&loaded_writable)
            .chain(&loaded_readonly)
            .copied()
            .collect();
        let is_writable = |i: usize| {
            if i < num_signed {
                i < num_writable_signed
            } else if i < num_static {
                i < num_writable_unsigned
            } else {
                i < num_static + loaded_writable.len()
            }
        };
        let key_at = |i: usize| {
            keys.get(i)
                .copied()
                .ok_or_else(|| error!(EarnError::MalformedUpstreamResponse))
        };

        let instructions = message
            .instructions()
            .iter()
            .map(|ix| {
                let accounts = ix
                    .accounts
                    .iter()
                    .map(|i| {
                        let i = *i as usize;
                        Ok(AccountMeta {
                            pubkey: key_at(i)?,
                            is_signer: i < num_signed,
                            is_writable: is_writable(i),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Instruction {
                    program_id: key_at(ix.program_id_index as usize)?,
                    accounts,
                    data: ix.data.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            payer,
            instructions,
            lookup_tables: used_tables,
            format: MessageFormat::from(message),
        })
    }

    /// Number of trailing token-account closes (wSOL unwrap and similar).
    pub fn trailing_cleanup_count(&self) -> usize {
        self.instructions
            .iter()
            .rev()
            .take_while(|ix| is_close_account(ix))
            .count()
    }

    /// Insert `extra` after the body and before the last `cleanup` instructions.
    pub fn insert_before_cleanup(&mut self, extra: Vec<Instruction>, cleanup: usize) {
        let at = self.instructions.len().saturating_sub(cleanup);
        self.instructions.splice(at..at, extra);
    }

    pub fn compile(&self, recent_blockhash: Hash) -> Result<VersionedMessage> {
        match self.format {
            MessageFormat::Legacy => Ok(VersionedMessage::Legacy(legacy::Message::new_with_blockhash(
                &self.instructions,
                Some(&self.payer),
                &recent_blockhash,
            ))),
            MessageFormat::V0 => {
                let message = v0::Message::try_compile(
                    &self.payer,
                    &self.instructions,
                    &self.lookup_tables,
                    recent_blockhash,
                )
                .map_err(|e| {
                    log::error!("Failed to compile v0 message: {}", e);
                    error!(EarnError::InternalInvariantViolation)
                })?;
                Ok(VersionedMessage::V0(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(payer: Pubkey, table_key: Pubkey, pooled: &[Pubkey]) -> Vec<Instruction> {
        let program = Pubkey::new_unique();
        vec![
            Instruction::new_with_bytes(
                program,
                &[1],
                vec![
                    AccountMeta::new(payer, true),
                    AccountMeta::new(pooled[0], false),
                    AccountMeta::new_readonly(pooled[1], false),
                ],
            ),
            Instruction::new_with_bytes(
                program,
                &[2, 2],
                vec![AccountMeta::new_readonly(table_key, false), AccountMeta::new(pooled[2], false)],
            ),
        ]
    }

    #[test]
    fn v0_decompile_restores_instructions() {
        let payer = Pubkey::new_unique();
        let pooled: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        let table = AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: pooled.clone(),
        };
        let instructions = sample(payer, Pubkey::new_unique(), &pooled);

        let plan = TransactionPlan::v0(payer, instructions.clone(), vec![table.clone()]);
        let message = plan.compile(Hash::new_unique()).unwrap();

        match &message {
            VersionedMessage::V0(m) => assert_eq!(m.address_table_lookups.len(), 1),
            _ => panic!("expected v0"),
        }
        assert_eq!(TransactionPlan::required_tables(&message), vec![table.key]);

        let decompiled = TransactionPlan::decompile(&message, &[table]).unwrap();
        assert_eq!(decompiled.payer, payer);
        assert_eq!(decompiled.instructions, instructions);
        assert_eq!(decompiled.format, MessageFormat::V0);
    }

    #[test]
    fn missing_table_is_reported() {
        let payer = Pubkey::new_unique();
        let pooled: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        let table = AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: pooled.clone(),
        };
        let message = TransactionPlan::v0(payer, sample(payer, Pubkey::new_unique(), &pooled), vec![table])
            .compile(Hash::new_unique())
            .unwrap();

        assert_eq!(
            TransactionPlan::decompile(&message, &[]).unwrap_err(),
            EarnError::LookupTableUnavailable.into()
        );
    }

    #[test]
    fn legacy_round_trip_keeps_format() {
        let payer = Pubkey::new_unique();
        let pooled: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        let instructions = sample(payer, Pubkey::new_unique(), &pooled);
        let message = VersionedMessage::Legacy(legacy::Message::new_with_blockhash(
            &instructions,
            Some(&payer),
            &Hash::new_unique(),
        ));

        let plan = TransactionPlan::decompile(&message, &[]).unwrap();
        assert_eq!(plan.format, MessageFormat::Legacy);
        assert_eq!(plan.instructions, instructions);
        assert!(plan.lookup_tables.is_empty());
    }

    #[test]
    fn inserts_ahead_of_cleanup() {
        let payer = Pubkey::new_unique();
        let marker = |tag: u8| Instruction::new_with_bytes(Pubkey::new_unique(), &[tag], vec![]);
        let mut plan = TransactionPlan::v0(payer, vec![marker(1), marker(2), marker(3)], vec![]);

        plan.insert_before_cleanup(vec![marker(8), marker(9)], 1);
        let tags: Vec<u8> = plan.instructions.iter().map(|ix| ix.data[0]).collect();
        assert_eq!(tags, vec![1, 2, 8, 9, 3]);
    }
}
