use std::str::FromStr;

use num_bigint::{BigInt, Sign};
use serde_json::Value;

use crate::{
    contractspec::TypeDef,
    xdr::{
        AccountId, Duration, Error as XdrError, Hash, Int128Parts, Int256Parts, PublicKey,
        ScAddress, ScBytes, ScMap, ScMapEntry, ScString, ScSymbol, ScVal, ScVec, TimePoint,
        UInt128Parts, UInt256Parts, Uint256,
    },
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("value {value:?} is not parseable to {type_}")]
    InvalidValue { value: String, type_: String },
    #[error("values of type {0} cannot be built from user input")]
    Unsupported(String),
    #[error("expected {expected} tuple elements, got {actual}")]
    TupleLength { expected: usize, actual: usize },
    #[error(transparent)]
    Xdr(#[from] XdrError),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

fn invalid(value: impl ToString, t: &TypeDef) -> Error {
    Error::InvalidValue {
        value: value.to_string(),
        type_: t.to_string(),
    }
}

/// A parameter value after integer coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeValue {
    U32(u32),
    I32(i32),
    Str(String),
}

/// Turns a native value into the network's typed argument for a declared type.
pub trait Encoder: Send + Sync {
    fn encode(&self, value: &NativeValue, type_: &TypeDef) -> Result<ScVal, Error>;
}

/// Type-directed conversion of native values into `ScVal`s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScValEncoder;

impl Encoder for ScValEncoder {
    fn encode(&self, value: &NativeValue, type_: &TypeDef) -> Result<ScVal, Error> {
        match (value, type_) {
            (NativeValue::U32(n), TypeDef::U32) => Ok(ScVal::U32(*n)),
            (NativeValue::I32(n), TypeDef::I32) => Ok(ScVal::I32(*n)),
            (NativeValue::U32(n), t) => Err(invalid(n, t)),
            (NativeValue::I32(n), t) => Err(invalid(n, t)),
            (NativeValue::Str(s), t) => from_string(s, t),
        }
    }
}

pub fn from_string(s: &str, t: &TypeDef) -> Result<ScVal, Error> {
    match t {
        TypeDef::Option(inner) => {
            if s.is_empty() || s == "null" {
                Ok(ScVal::Void)
            } else {
                from_string(s, inner)
            }
        }
        TypeDef::Vec(_) | TypeDef::Map { .. } | TypeDef::Tuple(_) => {
            let value: Value = serde_json::from_str(s).map_err(|_| invalid(s, t))?;
            from_json(&value, t)
        }
        _ => from_string_primitive(s, t),
    }
}

pub fn from_string_primitive(s: &str, t: &TypeDef) -> Result<ScVal, Error> {
    Ok(match t {
        TypeDef::Bool => ScVal::Bool(bool::from_str(s).map_err(|_| invalid(s, t))?),
        TypeDef::Void if s.is_empty() || s == "null" || s == "()" => ScVal::Void,
        TypeDef::U32 => ScVal::U32(s.parse().map_err(|_| invalid(s, t))?),
        TypeDef::I32 => ScVal::I32(s.parse().map_err(|_| invalid(s, t))?),
        TypeDef::U64 => ScVal::U64(s.parse().map_err(|_| invalid(s, t))?),
        TypeDef::I64 => ScVal::I64(s.parse().map_err(|_| invalid(s, t))?),
        TypeDef::Timepoint => ScVal::Timepoint(TimePoint(s.parse().map_err(|_| invalid(s, t))?)),
        TypeDef::Duration => ScVal::Duration(Duration(s.parse().map_err(|_| invalid(s, t))?)),
        TypeDef::U128 => {
            let v: u128 = s.parse().map_err(|_| invalid(s, t))?;
            ScVal::U128(UInt128Parts {
                hi: (v >> 64) as u64,
                lo: v as u64,
            })
        }
        TypeDef::I128 => {
            let v: i128 = s.parse().map_err(|_| invalid(s, t))?;
            ScVal::I128(Int128Parts {
                hi: (v >> 64) as i64,
                lo: v as u64,
            })
        }
        TypeDef::U256 => {
            let v = BigInt::from_str(s).map_err(|_| invalid(s, t))?;
            if v.sign() == Sign::Minus {
                return Err(invalid(s, t));
            }
            let [hi_hi, hi_lo, lo_hi, lo_lo] = to_words(&v).ok_or_else(|| invalid(s, t))?;
            ScVal::U256(UInt256Parts {
                hi_hi,
                hi_lo,
                lo_hi,
                lo_lo,
            })
        }
        TypeDef::I256 => {
            let v = BigInt::from_str(s).map_err(|_| invalid(s, t))?;
            let [hi_hi, hi_lo, lo_hi, lo_lo] = to_words(&v).ok_or_else(|| invalid(s, t))?;
            ScVal::I256(Int256Parts {
                hi_hi: hi_hi as i64,
                hi_lo,
                lo_hi,
                lo_lo,
            })
        }
        TypeDef::Bytes => ScVal::Bytes(ScBytes(
            hex::decode(s).map_err(|_| invalid(s, t))?.try_into()?,
        )),
        TypeDef::BytesN(n) => {
            let bytes = hex::decode(s).map_err(|_| invalid(s, t))?;
            if bytes.len() != *n as usize {
                return Err(invalid(s, t));
            }
            ScVal::Bytes(ScBytes(bytes.try_into()?))
        }
        TypeDef::String => ScVal::String(ScString(s.try_into()?)),
        TypeDef::Symbol => ScVal::Symbol(ScSymbol(s.try_into().map_err(|_| invalid(s, t))?)),
        TypeDef::Address => ScVal::Address(address_from_str(s).ok_or_else(|| invalid(s, t))?),
        TypeDef::Void => return Err(invalid(s, t)),
        TypeDef::Option(_) | TypeDef::Vec(_) | TypeDef::Map { .. } | TypeDef::Tuple(_) => {
            return from_string(s, t)
        }
        TypeDef::Val
        | TypeDef::Error
        | TypeDef::Result { .. }
        | TypeDef::Udt(_)
        | TypeDef::Unknown(_) => return Err(Error::Unsupported(t.to_string())),
    })
}

/// Splits a value into four big-endian two's complement words, or `None`
/// when it does not fit in 256 bits.
fn to_words(v: &BigInt) -> Option<[u64; 4]> {
    let bytes = v.to_signed_bytes_be();
    if bytes.len() > 32 {
        return None;
    }
    let fill = if v.sign() == Sign::Minus { 0xff } else { 0 };
    let mut buf = [fill; 32];
    buf[32 - bytes.len()..].copy_from_slice(&bytes);
    let mut words = [0u64; 4];
    for (word, chunk) in words.iter_mut().zip(buf.chunks_exact(8)) {
        let mut b = [0u8; 8];
        b.copy_from_slice(chunk);
        *word = u64::from_be_bytes(b);
    }
    Some(words)
}

fn from_words(words: [u64; 4]) -> BigInt {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    BigInt::from_signed_bytes_be(&bytes)
}

fn address_from_str(s: &str) -> Option<ScAddress> {
    if let Ok(key) = stellar_strkey::ed25519::PublicKey::from_string(s) {
        return Some(ScAddress::Account(AccountId(
            PublicKey::PublicKeyTypeEd25519(Uint256(key.0)),
        )));
    }
    stellar_strkey::Contract::from_string(s)
        .ok()
        .map(|c| ScAddress::Contract(Hash(c.0)))
}

pub fn from_json(v: &Value, t: &TypeDef) -> Result<ScVal, Error> {
    Ok(match (t, v) {
        (TypeDef::Option(_), Value::Null) => ScVal::Void,
        (TypeDef::Option(inner), v) => from_json(v, inner)?,
        (TypeDef::Vec(elem), Value::Array(raw)) => {
            let items = raw
                .iter()
                .map(|item| from_json(item, elem))
                .collect::<Result<Vec<_>, _>>()?;
            ScVal::Vec(Some(ScVec(items.try_into()?)))
        }
        (TypeDef::Map { key, value }, Value::Object(raw)) => {
            let mut entries = raw
                .iter()
                .map(|(k, v)| -> Result<ScMapEntry, Error> {
                    let key = match key.as_ref() {
                        TypeDef::Val => ScVal::Symbol(ScSymbol(k.as_str().try_into()?)),
                        key => from_string(k, key)?,
                    };
                    Ok(ScMapEntry {
                        key,
                        val: from_json(v, value)?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            entries.sort_by(|a, b| a.key.cmp(&b.key));
            ScVal::Map(Some(ScMap(entries.try_into()?)))
        }
        (TypeDef::Tuple(types), Value::Array(raw)) => {
            if !types.is_empty() && types.len() != raw.len() {
                return Err(Error::TupleLength {
                    expected: types.len(),
                    actual: raw.len(),
                });
            }
            let untyped = TypeDef::Val;
            let items = raw
                .iter()
                .enumerate()
                .map(|(i, item)| from_json(item, types.get(i).unwrap_or(&untyped)))
                .collect::<Result<Vec<_>, _>>()?;
            ScVal::Vec(Some(ScVec(items.try_into()?)))
        }
        (TypeDef::Val, v) => infer(v)?,
        (TypeDef::Bool, Value::Bool(b)) => ScVal::Bool(*b),
        (TypeDef::Void, Value::Null) => ScVal::Void,
        (_, Value::String(s)) => from_string_primitive(s, t)?,
        (
            TypeDef::U32
            | TypeDef::I32
            | TypeDef::U64
            | TypeDef::I64
            | TypeDef::Timepoint
            | TypeDef::Duration
            | TypeDef::U128
            | TypeDef::I128
            | TypeDef::U256
            | TypeDef::I256,
            Value::Number(n),
        ) => from_string_primitive(&n.to_string(), t)?,
        (t, v) => return Err(invalid(v, t)),
    })
}

/// Encodes JSON with no declared type, used for container elements whose
/// type is only known by its tag.
fn infer(v: &Value) -> Result<ScVal, Error> {
    Ok(match v {
        Value::Null => ScVal::Void,
        Value::Bool(b) => ScVal::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ScVal::I64(i)
            } else if let Some(u) = n.as_u64() {
                ScVal::U64(u)
            } else {
                return Err(invalid(n, &TypeDef::Val));
            }
        }
        Value::String(s) => match address_from_str(s) {
            Some(address) => ScVal::Address(address),
            None => ScVal::String(ScString(s.as_str().try_into()?)),
        },
        Value::Array(_) => from_json(v, &TypeDef::Vec(Box::new(TypeDef::Val)))?,
        Value::Object(_) => from_json(
            v,
            &TypeDef::Map {
                key: Box::new(TypeDef::Val),
                value: Box::new(TypeDef::Val),
            },
        )?,
    })
}

/// Renders a value as JSON without type information.
pub fn to_json(v: &ScVal) -> Value {
    match v {
        ScVal::Bool(b) => Value::Bool(*b),
        ScVal::Void => Value::Null,
        ScVal::U32(n) => (*n).into(),
        ScVal::I32(n) => (*n).into(),
        ScVal::U64(n) => (*n).into(),
        ScVal::I64(n) => (*n).into(),
        ScVal::Timepoint(TimePoint(n)) | ScVal::Duration(Duration(n)) => (*n).into(),
        ScVal::U128(UInt128Parts { hi, lo }) => {
            Value::String((u128::from(*hi) << 64 | u128::from(*lo)).to_string())
        }
        ScVal::I128(Int128Parts { hi, lo }) => {
            Value::String((i128::from(*hi) << 64 | i128::from(*lo)).to_string())
        }
        ScVal::U256(UInt256Parts {
            hi_hi,
            hi_lo,
            lo_hi,
            lo_lo,
        }) => {
            let mut bytes = vec![0u8];
            for w in [hi_hi, hi_lo, lo_hi, lo_lo] {
                bytes.extend_from_slice(&w.to_be_bytes());
            }
            Value::String(BigInt::from_signed_bytes_be(&bytes).to_string())
        }
        ScVal::I256(Int256Parts {
            hi_hi,
            hi_lo,
            lo_hi,
            lo_lo,
        }) => Value::String(from_words([*hi_hi as u64, *hi_lo, *lo_hi, *lo_lo]).to_string()),
        ScVal::Bytes(ScBytes(b)) => Value::String(hex::encode(b.as_slice())),
        ScVal::String(ScString(s)) => {
            Value::String(String::from_utf8_lossy(s.as_slice()).into_owned())
        }
        ScVal::Symbol(ScSymbol(s)) => {
            Value::String(String::from_utf8_lossy(s.as_slice()).into_owned())
        }
        ScVal::Address(address) => Value::String(address_to_string(address)),
        ScVal::Vec(None) | ScVal::Map(None) => Value::Null,
        ScVal::Vec(Some(ScVec(items))) => Value::Array(items.iter().map(to_json).collect()),
        ScVal::Map(Some(ScMap(entries))) => {
            let keyed = entries
                .iter()
                .map(|e| {
                    let key = match &e.key {
                        ScVal::Symbol(ScSymbol(s)) => s.as_slice(),
                        ScVal::String(ScString(s)) => s.as_slice(),
                        _ => return None,
                    };
                    let key = String::from_utf8_lossy(key).into_owned();
                    Some((key, to_json(&e.val)))
                })
                .collect::<Option<serde_json::Map<_, _>>>();
            match keyed {
                Some(map) => Value::Object(map),
                None => Value::Array(
                    entries
                        .iter()
                        .map(|e| Value::Array(vec![to_json(&e.key), to_json(&e.val)]))
                        .collect(),
                ),
            }
        }
        ScVal::Error(e) => Value::String(format!("{e:?}")),
        other => Value::String(other.name().to_string()),
    }
}

pub fn address_to_string(address: &ScAddress) -> String {
    match address {
        ScAddress::Account(AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(key)))) => {
            stellar_strkey::ed25519::PublicKey(*key).to_string()
        }
        ScAddress::Contract(Hash(h)) => stellar_strkey::Contract(*h).to_string(),
    }
}
