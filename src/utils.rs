use hex::FromHexError;
use stellar_strkey::DecodeError;

use crate::xdr::{Hash, ScAddress};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("cannot parse contract ID {contract_id}: {error}")]
    CannotParseContractId {
        contract_id: String,
        error: DecodeError,
    },
    #[error("cannot parse contract ID {contract_id}: {error}")]
    CannotParseContractIdHex {
        contract_id: String,
        error: FromHexError,
    },
}

pub fn padded_hex_from_str(s: &str, n: usize) -> Result<Vec<u8>, FromHexError> {
    if s.len() > n * 2 {
        return Err(FromHexError::InvalidStringLength);
    }
    let mut decoded = vec![0u8; n];
    let padded = format!("{s:0>width$}", width = n * 2);
    hex::decode_to_slice(padded, &mut decoded)?;
    Ok(decoded)
}

/// Accepts a contract id either as a `C...` strkey or as 64 hex characters.
pub fn contract_id_from_str(contract_id: &str) -> Result<[u8; 32], Error> {
    if contract_id.starts_with('C') {
        return stellar_strkey::Contract::from_string(contract_id)
            .map(|c| c.0)
            .map_err(|error| Error::CannotParseContractId {
                contract_id: contract_id.to_string(),
                error,
            });
    }
    padded_hex_from_str(contract_id, 32)
        .and_then(|v| v.try_into().map_err(|_| FromHexError::InvalidStringLength))
        .map_err(|error| Error::CannotParseContractIdHex {
            contract_id: contract_id.to_string(),
            error,
        })
}

pub fn contract_strkey(contract_id: &[u8; 32]) -> String {
    stellar_strkey::Contract(*contract_id).to_string()
}

pub fn contract_address(contract_id: &[u8; 32]) -> ScAddress {
    ScAddress::Contract(Hash(*contract_id))
}
