//! Transaction wire format.
//!
//!   [num_signatures (compact-u16)] [signature_slots (N×64)] [message]
//!
//! A versioned message starts with `0x80 | version`; a legacy message starts
//! with its header.

use anchor_lang::prelude::*;
use anchor_lang::solana_program::hash::Hash;
use anchor_lang::solana_program::instruction::CompiledInstruction;
use anchor_lang::solana_program::message::{legacy, v0, MessageHeader, VersionedMessage};

use crate::errors::EarnError;

const SIGNATURE_LEN: usize = 64;
const MESSAGE_VERSION_PREFIX: u8 = 0x80;

/// Decode Solana compact-u16 encoding, accepting only the minimal form
/// Returns (value, bytes_consumed)
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize)> {
    let mut value: u32 = 0;
    for (i, byte) in data.iter().take(3).enumerate() {
        let byte = *byte as u32;
        value |= (byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            // A zero final byte means a shorter encoding existed
            if i > 0 && byte == 0 {
                return err!(EarnError::MalformedUpstreamResponse);
            }
            return u16::try_from(value)
                .map(|v| (v, i + 1))
                .map_err(|_| error!(EarnError::MalformedUpstreamResponse));
        }
    }
    err!(EarnError::MalformedUpstreamResponse)
}

/// Encode a compact-u16 value (Solana serialization)
pub fn encode_compact_u16(val: u16) -> Vec<u8> {
    if val < 0x80 {
        vec![val as u8]
    } else if val < 0x4000 {
        vec![(val & 0x7F | 0x80) as u8, (val >> 7) as u8]
    } else {
        vec![(val & 0x7F | 0x80) as u8, ((val >> 7) & 0x7F | 0x80) as u8, (val >> 14) as u8]
    }
}

/// Byte cursor over an untrusted payload.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(EarnError::MalformedUpstreamResponse)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn peek(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| error!(EarnError::MalformedUpstreamResponse))
    }

    fn len(&mut self) -> Result<usize> {
        let (value, consumed) = decode_compact_u16(&self.data[self.pos.min(self.data.len())..])?;
        self.pos += consumed;
        Ok(value as usize)
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.len()?;
        Ok(self.take(len)?.to_vec())
    }

    fn pubkey(&mut self) -> Result<Pubkey> {
        let bytes: [u8; 32] = self
            .take(32)?
            .try_into()
            .map_err(|_| error!(EarnError::MalformedUpstreamResponse))?;
        Ok(Pubkey::new_from_array(bytes))
    }

    fn hash(&mut self) -> Result<Hash> {
        Ok(Hash::new_from_array(self.pubkey()?.to_bytes()))
    }

    fn pubkeys(&mut self) -> Result<Vec<Pubkey>> {
        let count = self.len()?;
        (0..count).map(|_| self.pubkey()).collect()
    }

    fn finish(&self) -> Result<()> {
        require!(self.pos == self.data.len(), EarnError::MalformedUpstreamResponse);
        Ok(())
    }
}

fn read_header(reader: &mut Reader) -> Result<MessageHeader> {
    Ok(MessageHeader {
        num_required_signatures: reader.u8()?,
        num_readonly_signed_accounts: reader.u8()?,
        num_readonly_unsigned_accounts: reader.u8()?,
    })
}

fn read_instructions(reader: &mut Reader) -> Result<Vec<CompiledInstruction>> {
    let count = reader.len()?;
    (0..count)
        .map(|_| {
            Ok(CompiledInstruction {
                program_id_index: reader.u8()?,
                accounts: reader.bytes()?,
                data: reader.bytes()?,
            })
        })
        .collect()
}

fn read_message(reader: &mut Reader) -> Result<VersionedMessage> {
    let first = reader.peek()?;
    if first & MESSAGE_VERSION_PREFIX == 0 {
        let header = read_header(reader)?;
        let account_keys = reader.pubkeys()?;
        let recent_blockhash = reader.hash()?;
        let instructions = read_instructions(reader)?;
        return Ok(VersionedMessage::Legacy(legacy::Message {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        }));
    }

    let version = reader.u8()? & !MESSAGE_VERSION_PREFIX;
    require!(version == 0, EarnError::MalformedUpstreamResponse);

    let header = read_header(reader)?;
    let account_keys = reader.pubkeys()?;
    let recent_blockhash = reader.hash()?;
    let instructions = read_instructions(reader)?;

    let lookup_count = reader.len()?;
    let address_table_lookups = (0..lookup_count)
        .map(|_| {
            Ok(v0::MessageAddressTableLookup {
                account_key: reader.pubkey()?,
                writable_indexes: reader.bytes()?,
                readonly_indexes: reader.bytes()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(VersionedMessage::V0(v0::Message {
        header,
        account_keys,
        recent_blockhash,
        instructions,
        address_table_lookups,
    }))
}

/// Parse a (possibly signed) transaction and return its message.
pub fn decode_transaction(bytes: &[u8]) -> Result<VersionedMessage> {
    let mut reader = Reader::new(bytes);
    let signatures = reader.len()?;
    reader.take(signatures * SIGNATURE_LEN)?;

    let message = read_message(&mut reader)?;
    reader.finish()?;

    require!(
        message.header().num_required_signatures as usize == signatures,
        EarnError::MalformedUpstreamResponse
    );
    Ok(message)
}

/// Serialize `message` with zeroed signature slots, ready for signing.
pub fn encode_unsigned(message: &VersionedMessage) -> Vec<u8> {
    let signers = message.header().num_required_signatures;
    let body = message.serialize();

    let mut tx = encode_compact_u16(signers as u16);
    tx.resize(tx.len() + signers as usize * SIGNATURE_LEN, 0);
    tx.extend_from_slice(&body);
    tx
}
