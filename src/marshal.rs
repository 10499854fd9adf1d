use serde::{Deserialize, Serialize};

use crate::{
    abi::{self, MethodDescriptor},
    contractspec::TypeDef,
    rpc::Rpc,
    strval::{self, Encoder, NativeValue},
    xdr::ScVal,
};

/// Attempts made to fetch a contract's interface before giving up.
pub const SPEC_ATTEMPTS: usize = 7;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("method {0} not found in contract interface")]
    MethodNotFound(String),
    #[error("missing parameter {0}")]
    MissingParameter(String),
    #[error("parameter {name}: {value:?} is not a valid {type_}")]
    InvalidInteger {
        name: String,
        value: String,
        type_: &'static str,
    },
    #[error("parameter {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: strval::Error,
    },
    #[error("contract interface unavailable after {attempts} attempts: {last}")]
    SpecUnavailable { attempts: usize, last: abi::Error },
}

/// A caller-supplied parameter. Values stay strings until marshalled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationParam {
    pub name: String,
    pub value: String,
}

impl InvocationParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Only the 32-bit integer types are parsed here; everything else reaches
/// the encoder as the raw string.
pub fn to_native(name: &str, value: &str, type_: &TypeDef) -> Result<NativeValue, Error> {
    let invalid = || Error::InvalidInteger {
        name: name.to_string(),
        value: value.to_string(),
        type_: type_.tag(),
    };
    Ok(match type_ {
        TypeDef::U32 => NativeValue::U32(value.trim().parse().map_err(|_| invalid())?),
        TypeDef::I32 => NativeValue::I32(value.trim().parse().map_err(|_| invalid())?),
        _ => NativeValue::Str(value.to_string()),
    })
}

/// Arguments in the method's declared input order.
pub fn to_typed_args(
    method: &MethodDescriptor,
    params: &[InvocationParam],
    encoder: &dyn Encoder,
) -> Result<Vec<ScVal>, Error> {
    method
        .inputs
        .iter()
        .map(|input| {
            let param = params
                .iter()
                .find(|p| p.name == input.name)
                .ok_or_else(|| Error::MissingParameter(input.name.clone()))?;
            let native = to_native(&input.name, &param.value, &input.type_)?;
            encoder
                .encode(&native, &input.type_)
                .map_err(|source| Error::Encode {
                    name: input.name.clone(),
                    source,
                })
        })
        .collect()
}

/// Fetches the live interface, retrying transport and spec failures.
pub async fn resolve_interface(
    rpc: &dyn Rpc,
    contract_id: &[u8; 32],
) -> Result<Vec<MethodDescriptor>, Error> {
    let mut attempt = 1;
    loop {
        match abi::discover(rpc, contract_id).await {
            Ok((_, methods)) => return Ok(methods),
            Err(e) if attempt < SPEC_ATTEMPTS => {
                tracing::debug!(attempt, error = %e, "contract interface lookup failed, retrying");
                attempt += 1;
            }
            Err(last) => {
                return Err(Error::SpecUnavailable {
                    attempts: attempt,
                    last,
                })
            }
        }
    }
}

pub fn find_method(methods: Vec<MethodDescriptor>, name: &str) -> Result<MethodDescriptor, Error> {
    methods
        .into_iter()
        .find(|m| m.name == name)
        .ok_or_else(|| Error::MethodNotFound(name.to_string()))
}

/// Resolves `method_name` against the contract's interface and marshals the
/// parameters for it.
pub async fn generate_args(
    rpc: &dyn Rpc,
    contract_id: &[u8; 32],
    method_name: &str,
    params: &[InvocationParam],
    encoder: &dyn Encoder,
) -> Result<(MethodDescriptor, Vec<ScVal>), Error> {
    let methods = resolve_interface(rpc, contract_id).await?;
    let method = find_method(methods, method_name)?;
    let args = to_typed_args(&method, params, encoder)?;
    Ok((method, args))
}
