use once_cell::sync::Lazy;
use regex::Regex;
use sha3::{Digest, Keccak256};

use crate::blockchain::bridge::{BridgeFamily, NewTransfer, TransferDirection};
use crate::core::errors::{BridgeError, Result};

/// SS58 address format of the SORA network.
pub const SORA_SS58_PREFIX: u16 = 69;

/// Decimals accepted in a transfer amount (SORA assets use 18).
pub const MAX_AMOUNT_DECIMALS: usize = 18;

static EVM_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("Hardcoded regex should always compile"));
static ASSET_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("Hardcoded regex should always compile"));
static AMOUNT_18: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:0|[1-9]\d*)(?:\.(\d{1,18}))?$").expect("Hardcoded regex should always compile")
});
static NETWORK_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,50}$").expect("Hardcoded regex should always compile"));

fn invalid(msg: impl Into<String>) -> BridgeError {
    BridgeError::InvalidInput(msg.into())
}

/// Validates an EVM address. Mixed-case addresses must carry a valid EIP-55 checksum.
pub fn validate_evm_address(address: &str) -> Result<()> {
    if !EVM_ADDRESS.is_match(address) {
        return Err(invalid(format!("Invalid EVM address: {}", address)));
    }
    let body = &address[2..];
    let is_all_lower = body.chars().all(|c| !c.is_ascii_uppercase());
    let is_all_upper = body.chars().all(|c| !c.is_ascii_lowercase());
    if is_all_lower || is_all_upper || is_eip55_checksum_valid(body) {
        Ok(())
    } else {
        Err(invalid(format!("Invalid EIP-55 checksum for address: {}", address)))
    }
}

fn is_eip55_checksum_valid(body: &str) -> bool {
    let hash = Keccak256::digest(body.to_lowercase().as_bytes());
    body.chars().enumerate().all(|(i, ch)| {
        let nibble = (hash[i / 2] >> (4 * (1 - (i % 2)))) & 0x0f;
        match ch {
            'a'..='f' => nibble < 8,
            'A'..='F' => nibble >= 8,
            _ => true,
        }
    })
}

/// Decodes an SS58 address and returns its network prefix.
///
/// Only the layout is checked (prefix, 32-byte account id, 2-byte checksum);
/// the checksum itself is verified by the signer.
pub fn ss58_prefix(address: &str) -> Result<u16> {
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|_| invalid(format!("Invalid SS58 address encoding: {}", address)))?;
    let (prefix, prefix_len) = match decoded.first() {
        Some(&b0) if b0 < 64 => (b0 as u16, 1),
        Some(&b0) if b0 < 128 && decoded.len() > 1 => {
            let b1 = decoded[1];
            let lower = ((b0 & 0b0011_1111) << 2) | (b1 >> 6);
            let upper = b1 & 0b0011_1111;
            ((lower as u16) | ((upper as u16) << 8), 2)
        }
        _ => return Err(invalid(format!("Invalid SS58 address prefix: {}", address))),
    };
    if decoded.len() != prefix_len + 32 + 2 {
        return Err(invalid(format!("Invalid SS58 address length: {}", address)));
    }
    Ok(prefix)
}

pub fn validate_substrate_address(address: &str) -> Result<()> {
    ss58_prefix(address).map(|_| ())
}

pub fn validate_sora_address(address: &str) -> Result<()> {
    match ss58_prefix(address)? {
        SORA_SS58_PREFIX => Ok(()),
        other => Err(invalid(format!("Address {} has SS58 prefix {}, not SORA", address, other))),
    }
}

/// SORA asset ids are 32-byte hex strings.
pub fn validate_asset_address(address: &str) -> Result<()> {
    if ASSET_ID.is_match(address) {
        Ok(())
    } else {
        Err(invalid(format!("Invalid asset id: {}", address)))
    }
}

/// Strict decimal validator, no floats. Accepts `123`, `0.1`, `1.5` up to
/// `max_decimals` fraction digits; no sign, no exponent, no leading zeros.
pub fn validate_amount_strict(amount: &str, max_decimals: usize) -> Result<()> {
    if amount.is_empty() {
        return Err(invalid("Amount cannot be empty"));
    }
    let matched = if max_decimals == MAX_AMOUNT_DECIMALS {
        AMOUNT_18.is_match(amount)
    } else {
        Regex::new(&format!(r"^(?:0|[1-9]\d*)(?:\.(\d{{1,{}}}))?$", max_decimals))
            .map_err(|e| BridgeError::Internal(format!("amount pattern: {}", e)))?
            .is_match(amount)
    };
    if !matched {
        return Err(invalid(format!("Invalid decimal amount: {}", amount)));
    }
    if amount.trim_matches('0').trim_matches('.').is_empty() {
        return Err(invalid("Amount must be positive"));
    }
    Ok(())
}

pub fn validate_network_name(network: &str) -> Result<()> {
    if NETWORK_NAME.is_match(network) {
        Ok(())
    } else {
        Err(invalid(format!("Invalid network name: {}", network)))
    }
}

/// Validates a transfer request against the address formats of its family.
pub fn validate_transfer(request: &NewTransfer) -> Result<()> {
    validate_asset_address(&request.asset_address)?;
    validate_amount_strict(&request.amount, MAX_AMOUNT_DECIMALS)?;

    let (sora_side, external_side) = match request.kind.direction() {
        TransferDirection::Outgoing => (&request.from, &request.to),
        TransferDirection::Incoming => (&request.to, &request.from),
    };
    validate_sora_address(sora_side)?;

    match request.kind.family() {
        BridgeFamily::Hashi | BridgeFamily::Evm => validate_evm_address(external_side)?,
        BridgeFamily::Substrate => validate_substrate_address(external_side)?,
    }

    match (&request.network, request.kind.family()) {
        (Some(network), _) => validate_network_name(network)?,
        (None, BridgeFamily::Substrate) => {
            return Err(invalid("Parachain transfers need a destination network"))
        }
        (None, _) => {}
    }
    Ok(())
}
