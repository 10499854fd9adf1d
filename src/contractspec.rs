use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::xdr::{self, Limited, Limits, ReadXdr, ScEnvMetaEntry, ScMetaEntry, ScMetaV0};

pub const SPEC_SECTION: &str = "contractspecv0";
pub const ENV_META_SECTION: &str = "contractenvmetav0";
pub const META_SECTION: &str = "contractmetav0";

const DOC_LIMIT: u32 = 1024;
const LIB_LIMIT: u32 = 80;
const UDT_NAME_LIMIT: u32 = 60;
const FIELD_NAME_LIMIT: u32 = 30;
const SYMBOL_LIMIT: u32 = 32;
const MAX_DEPTH: u32 = 32;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("cannot parse wasm: {0}")]
    Parser(#[from] wasmparser::BinaryReaderError),
    #[error("spec record at offset {offset}: {kind} (at byte {position})")]
    Decode {
        offset: usize,
        position: usize,
        kind: DecodeError,
    },
    #[error("xdr processing error: {0}")]
    Xdr(#[from] xdr::Error),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    Truncated,
    #[error("unknown spec entry kind {0}")]
    UnknownEntryKind(u32),
    #[error("unknown union case kind {0}")]
    UnknownCaseKind(u32),
    #[error("length {len} exceeds maximum {max}")]
    LengthExceeded { len: u32, max: u32 },
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("non-zero padding")]
    NonZeroPadding,
    #[error("type nesting too deep")]
    TooDeep,
}

/// Symbolic type of a function input, output or field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDef {
    Val,
    Bool,
    Void,
    Error,
    U32,
    I32,
    U64,
    I64,
    Timepoint,
    Duration,
    U128,
    I128,
    U256,
    I256,
    Bytes,
    String,
    Symbol,
    Address,
    Option(Box<TypeDef>),
    Result {
        ok: Box<TypeDef>,
        error: Box<TypeDef>,
    },
    Vec(Box<TypeDef>),
    Map {
        key: Box<TypeDef>,
        value: Box<TypeDef>,
    },
    Tuple(Vec<TypeDef>),
    BytesN(u32),
    Udt(String),
    Unknown(u32),
}

impl TypeDef {
    pub fn tag(&self) -> &'static str {
        match self {
            TypeDef::Val => "val",
            TypeDef::Bool => "bool",
            TypeDef::Void => "void",
            TypeDef::Error => "error",
            TypeDef::U32 => "u32",
            TypeDef::I32 => "i32",
            TypeDef::U64 => "u64",
            TypeDef::I64 => "i64",
            TypeDef::Timepoint => "timepoint",
            TypeDef::Duration => "duration",
            TypeDef::U128 => "u128",
            TypeDef::I128 => "i128",
            TypeDef::U256 => "u256",
            TypeDef::I256 => "i256",
            TypeDef::Bytes => "bytes",
            TypeDef::String => "string",
            TypeDef::Symbol => "symbol",
            TypeDef::Address => "address",
            TypeDef::Option(_) => "option",
            TypeDef::Result { .. } => "result",
            TypeDef::Vec(_) => "vec",
            TypeDef::Map { .. } => "map",
            TypeDef::Tuple(_) => "tuple",
            TypeDef::BytesN(_) => "bytesN",
            TypeDef::Udt(_) => "udt",
            TypeDef::Unknown(_) => "Unknown Type",
        }
    }

    fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => TypeDef::Val,
            1 => TypeDef::Bool,
            2 => TypeDef::Void,
            3 => TypeDef::Error,
            4 => TypeDef::U32,
            5 => TypeDef::I32,
            6 => TypeDef::U64,
            7 => TypeDef::I64,
            8 => TypeDef::Timepoint,
            9 => TypeDef::Duration,
            10 => TypeDef::U128,
            11 => TypeDef::I128,
            12 => TypeDef::U256,
            13 => TypeDef::I256,
            14 => TypeDef::Bytes,
            16 => TypeDef::String,
            17 => TypeDef::Symbol,
            19 => TypeDef::Address,
            _ => return None,
        })
    }
}

impl Display for TypeDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeDef::Option(t) => write!(f, "option<{t}>"),
            TypeDef::Result { ok, error } => write!(f, "result<{ok}, {error}>"),
            TypeDef::Vec(t) => write!(f, "vec<{t}>"),
            TypeDef::Map { key, value } => write!(f, "map<{key}, {value}>"),
            TypeDef::Tuple(types) => {
                let inner = types
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "tuple<{inner}>")
            }
            TypeDef::BytesN(n) => write!(f, "bytesN<{n}>"),
            TypeDef::Udt(name) => write!(f, "udt<{name}>"),
            TypeDef::Unknown(code) => write!(f, "Unknown Type ({code})"),
            simple => f.write_str(simple.tag()),
        }
    }
}

/// Parses the bare tag names produced by serialization. Container element
/// types are not part of a tag, so they come back as `val`; sizes and udt
/// names come back empty.
impl FromStr for TypeDef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = || Box::new(TypeDef::Val);
        Ok(match s {
            "val" => TypeDef::Val,
            "bool" => TypeDef::Bool,
            "void" => TypeDef::Void,
            "error" => TypeDef::Error,
            "u32" => TypeDef::U32,
            "i32" => TypeDef::I32,
            "u64" => TypeDef::U64,
            "i64" => TypeDef::I64,
            "timepoint" => TypeDef::Timepoint,
            "duration" => TypeDef::Duration,
            "u128" => TypeDef::U128,
            "i128" => TypeDef::I128,
            "u256" => TypeDef::U256,
            "i256" => TypeDef::I256,
            "bytes" => TypeDef::Bytes,
            "string" => TypeDef::String,
            "symbol" => TypeDef::Symbol,
            "address" => TypeDef::Address,
            "option" => TypeDef::Option(val()),
            "result" => TypeDef::Result {
                ok: val(),
                error: val(),
            },
            "vec" => TypeDef::Vec(val()),
            "map" => TypeDef::Map {
                key: val(),
                value: val(),
            },
            "tuple" => TypeDef::Tuple(vec![]),
            "bytesN" => TypeDef::BytesN(0),
            "udt" => TypeDef::Udt(String::new()),
            "Unknown Type" => TypeDef::Unknown(u32::MAX),
            _ => return Err(format!("unknown type tag {s:?}")),
        })
    }
}

impl Serialize for TypeDef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for TypeDef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionInput {
    pub doc: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: TypeDef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionSpec {
    pub doc: String,
    pub name: String,
    pub inputs: Vec<FunctionInput>,
    pub outputs: Vec<TypeDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructSpec {
    pub doc: String,
    pub lib: String,
    pub name: String,
    pub fields: Vec<FunctionInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnionCase {
    pub doc: String,
    pub name: String,
    /// Empty for void cases.
    pub types: Vec<TypeDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnionSpec {
    pub doc: String,
    pub lib: String,
    pub name: String,
    pub cases: Vec<UnionCase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumCase {
    pub doc: String,
    pub name: String,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumSpec {
    pub doc: String,
    pub lib: String,
    pub name: String,
    pub cases: Vec<EnumCase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventParam {
    pub doc: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: TypeDef,
    pub location: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSpec {
    pub doc: String,
    pub lib: String,
    pub name: String,
    pub prefix_topics: Vec<String>,
    pub params: Vec<EventParam>,
    pub data_format: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpecRecord {
    Function(FunctionSpec),
    Struct(StructSpec),
    Union(UnionSpec),
    Enum(EnumSpec),
    ErrorEnum(EnumSpec),
    Event(EventSpec),
}

impl SpecRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            SpecRecord::Function(_) => "function",
            SpecRecord::Struct(_) => "struct",
            SpecRecord::Union(_) => "union",
            SpecRecord::Enum(_) => "enum",
            SpecRecord::ErrorEnum(_) => "error_enum",
            SpecRecord::Event(_) => "event",
        }
    }
}

/// Returns the data of the named custom section. The last one wins if the
/// module repeats it.
pub fn custom_section<'a>(wasm: &'a [u8], name: &str) -> Result<Option<&'a [u8]>, Error> {
    let mut data = None;
    for payload in wasmparser::Parser::new(0).parse_all(wasm) {
        if let wasmparser::Payload::CustomSection(section) = payload? {
            if section.name() == name {
                data = Some(section.data());
            }
        }
    }
    Ok(data)
}

/// Returns the data of the `contractspecv0` custom section, if the module has one.
pub fn spec_section(wasm: &[u8]) -> Result<Option<&[u8]>, Error> {
    custom_section(wasm, SPEC_SECTION)
}

/// Decodes back-to-back spec entries. Any malformed record fails the whole
/// section.
pub fn decode(section: &[u8]) -> Result<Vec<SpecRecord>, Error> {
    let mut reader = Reader::new(section);
    let mut records = Vec::new();
    while !reader.is_empty() {
        let offset = reader.pos;
        let record = reader.record().map_err(|kind| Error::Decode {
            offset,
            position: reader.pos,
            kind,
        })?;
        tracing::trace!(offset, kind = record.kind(), "decoded spec record");
        records.push(record);
    }
    Ok(records)
}

pub struct ContractSpec {
    pub spec_base64: Option<String>,
    pub spec: Vec<SpecRecord>,
}

impl ContractSpec {
    pub fn new(wasm: &[u8]) -> Result<Self, Error> {
        let Some(section) = spec_section(wasm)? else {
            return Ok(ContractSpec {
                spec_base64: None,
                spec: vec![],
            });
        };
        Ok(ContractSpec {
            spec_base64: Some(base64::encode(section)),
            spec: decode(section)?,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionSpec> {
        self.spec.iter().filter_map(|r| match r {
            SpecRecord::Function(f) => Some(f),
            _ => None,
        })
    }
}

/// Environment and contract metadata carried next to the spec.
pub struct ContractMeta {
    pub env_meta_base64: Option<String>,
    pub env_meta: Vec<ScEnvMetaEntry>,
    pub meta_base64: Option<String>,
    pub meta: Vec<ScMetaEntry>,
}

impl ContractMeta {
    pub fn new(wasm: &[u8]) -> Result<Self, Error> {
        let (env_meta_base64, env_meta) = read_entries(custom_section(wasm, ENV_META_SECTION)?)?;
        let (meta_base64, meta) = read_entries(custom_section(wasm, META_SECTION)?)?;
        Ok(ContractMeta {
            env_meta_base64,
            env_meta,
            meta_base64,
            meta,
        })
    }
}

fn read_entries<T: ReadXdr>(section: Option<&[u8]>) -> Result<(Option<String>, Vec<T>), Error> {
    let Some(section) = section else {
        return Ok((None, vec![]));
    };
    let mut limited = Limited::new(std::io::Cursor::new(section), Limits::none());
    let entries = T::read_xdr_iter(&mut limited).collect::<Result<Vec<_>, xdr::Error>>()?;
    Ok((Some(base64::encode(section)), entries))
}

impl Display for ContractMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(env_meta) = &self.env_meta_base64 {
            writeln!(f, "Env Meta: {env_meta}")?;
            for entry in &self.env_meta {
                match entry {
                    ScEnvMetaEntry::ScEnvMetaKindInterfaceVersion(v) => {
                        writeln!(f, " • Interface Version: {v:?}")?;
                    }
                }
            }
            writeln!(f)?;
        } else {
            writeln!(f, "Env Meta: None\n")?;
        }

        if self.meta_base64.is_some() {
            writeln!(f, "Contract Meta:")?;
            for entry in &self.meta {
                match entry {
                    ScMetaEntry::ScMetaV0(ScMetaV0 { key, val }) => {
                        writeln!(f, " • {key}: {val}")?;
                    }
                }
            }
            writeln!(f)?;
        } else {
            writeln!(f, "Contract Meta: None\n")?;
        }
        Ok(())
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    depth: u32,
}

type Decoded<T> = Result<T, DecodeError>;

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader {
            data,
            pos: 0,
            depth: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize) -> Decoded<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Truncated)?;
        let bytes = self.data.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    fn u32(&mut self) -> Decoded<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn len(&mut self, max: u32) -> Decoded<u32> {
        let len = self.u32()?;
        if len > max {
            return Err(DecodeError::LengthExceeded { len, max });
        }
        Ok(len)
    }

    fn string(&mut self, max: u32) -> Decoded<String> {
        let len = self.len(max)? as usize;
        let bytes = self.take(len)?;
        let padding = (4 - len % 4) % 4;
        if self.take(padding)?.iter().any(|b| *b != 0) {
            return Err(DecodeError::NonZeroPadding);
        }
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| DecodeError::InvalidUtf8)
    }

    fn array<T>(
        &mut self,
        max: u32,
        mut item: impl FnMut(&mut Self) -> Decoded<T>,
    ) -> Decoded<Vec<T>> {
        let len = self.len(max)? as usize;
        // Every element is at least four bytes, so this never over-allocates
        // on a bogus count.
        let remaining = (self.data.len() - self.pos) / 4;
        let mut items = Vec::with_capacity(len.min(remaining));
        for _ in 0..len {
            items.push(item(self)?);
        }
        Ok(items)
    }

    fn type_def(&mut self) -> Decoded<TypeDef> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }
        let result = self.type_def_inner();
        self.depth -= 1;
        result
    }

    fn type_def_inner(&mut self) -> Decoded<TypeDef> {
        let code = self.u32()?;
        if let Some(simple) = TypeDef::from_code(code) {
            return Ok(simple);
        }
        Ok(match code {
            1000 => TypeDef::Option(Box::new(self.type_def()?)),
            1001 => TypeDef::Result {
                ok: Box::new(self.type_def()?),
                error: Box::new(self.type_def()?),
            },
            1002 => TypeDef::Vec(Box::new(self.type_def()?)),
            1004 => TypeDef::Map {
                key: Box::new(self.type_def()?),
                value: Box::new(self.type_def()?),
            },
            1005 => TypeDef::Tuple(self.array(12, Self::type_def)?),
            1006 => TypeDef::BytesN(self.u32()?),
            2000 => TypeDef::Udt(self.string(UDT_NAME_LIMIT)?),
            code => TypeDef::Unknown(code),
        })
    }

    fn input(&mut self) -> Decoded<FunctionInput> {
        Ok(FunctionInput {
            doc: self.string(DOC_LIMIT)?,
            name: self.string(FIELD_NAME_LIMIT)?,
            type_: self.type_def()?,
        })
    }

    fn enum_spec(&mut self) -> Decoded<EnumSpec> {
        Ok(EnumSpec {
            doc: self.string(DOC_LIMIT)?,
            lib: self.string(LIB_LIMIT)?,
            name: self.string(UDT_NAME_LIMIT)?,
            cases: self.array(50, |r| {
                Ok(EnumCase {
                    doc: r.string(DOC_LIMIT)?,
                    name: r.string(UDT_NAME_LIMIT)?,
                    value: r.u32()?,
                })
            })?,
        })
    }

    fn union_case(&mut self) -> Decoded<UnionCase> {
        let kind = self.u32()?;
        let doc = self.string(DOC_LIMIT)?;
        let name = self.string(UDT_NAME_LIMIT)?;
        let types = match kind {
            0 => vec![],
            1 => self.array(12, Self::type_def)?,
            other => return Err(DecodeError::UnknownCaseKind(other)),
        };
        Ok(UnionCase { doc, name, types })
    }

    fn record(&mut self) -> Decoded<SpecRecord> {
        Ok(match self.u32()? {
            0 => SpecRecord::Function(FunctionSpec {
                doc: self.string(DOC_LIMIT)?,
                name: self.string(SYMBOL_LIMIT)?,
                inputs: self.array(10, Self::input)?,
                outputs: self.array(1, Self::type_def)?,
            }),
            1 => SpecRecord::Struct(StructSpec {
                doc: self.string(DOC_LIMIT)?,
                lib: self.string(LIB_LIMIT)?,
                name: self.string(UDT_NAME_LIMIT)?,
                fields: self.array(40, Self::input)?,
            }),
            2 => SpecRecord::Union(UnionSpec {
                doc: self.string(DOC_LIMIT)?,
                lib: self.string(LIB_LIMIT)?,
                name: self.string(UDT_NAME_LIMIT)?,
                cases: self.array(50, Self::union_case)?,
            }),
            3 => SpecRecord::Enum(self.enum_spec()?),
            4 => SpecRecord::ErrorEnum(self.enum_spec()?),
            5 => SpecRecord::Event(EventSpec {
                doc: self.string(DOC_LIMIT)?,
                lib: self.string(LIB_LIMIT)?,
                name: self.string(SYMBOL_LIMIT)?,
                prefix_topics: self.array(2, |r| r.string(SYMBOL_LIMIT))?,
                params: self.array(50, |r| {
                    Ok(EventParam {
                        doc: r.string(DOC_LIMIT)?,
                        name: r.string(FIELD_NAME_LIMIT)?,
                        type_: r.type_def()?,
                        location: r.u32()?,
                    })
                })?,
                data_format: self.u32()?,
            }),
            other => return Err(DecodeError::UnknownEntryKind(other)),
        })
    }
}

impl Display for ContractSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.spec_base64.is_none() {
            return writeln!(f, "Contract Spec: None");
        }
        writeln!(f, "Contract Spec:")?;
        for record in &self.spec {
            match record {
                SpecRecord::Function(func) => write_func(f, func)?,
                SpecRecord::Struct(udt) => {
                    write_header(f, "Struct", &udt.lib, &udt.name, &udt.doc)?;
                    writeln!(f, "     Fields:")?;
                    for field in &udt.fields {
                        writeln!(f, "      • {}: {}", field.name, field.type_)?;
                    }
                }
                SpecRecord::Union(udt) => {
                    write_header(f, "Union", &udt.lib, &udt.name, &udt.doc)?;
                    writeln!(f, "     Cases:")?;
                    for case in &udt.cases {
                        if case.types.is_empty() {
                            writeln!(f, "      • {}", case.name)?;
                        } else {
                            let types = TypeDef::Tuple(case.types.clone());
                            writeln!(f, "      • {}{types}", case.name)?;
                        }
                    }
                }
                SpecRecord::Enum(udt) => write_enum(f, "Enum", udt)?,
                SpecRecord::ErrorEnum(udt) => write_enum(f, "Error", udt)?,
                SpecRecord::Event(event) => {
                    write_header(f, "Event", &event.lib, &event.name, &event.doc)?;
                    for param in &event.params {
                        writeln!(f, "      • {}: {}", param.name, param.type_)?;
                    }
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn write_func(f: &mut std::fmt::Formatter<'_>, func: &FunctionSpec) -> std::fmt::Result {
    writeln!(f, " • Function: {}", func.name)?;
    if !func.doc.is_empty() {
        writeln!(f, "     Docs: {}", indent(&func.doc, 11).trim())?;
    }
    writeln!(f, "     Inputs:")?;
    for input in &func.inputs {
        writeln!(f, "      • {}: {}", input.name, input.type_)?;
    }
    let outputs = func
        .outputs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(f, "     Output: {outputs}")
}

fn write_header(
    f: &mut std::fmt::Formatter<'_>,
    kind: &str,
    lib: &str,
    name: &str,
    doc: &str,
) -> std::fmt::Result {
    writeln!(f, " • {kind}: {}", format_name(lib, name))?;
    if !doc.is_empty() {
        writeln!(f, "     Docs: {}", indent(doc, 10).trim())?;
    }
    Ok(())
}

fn write_enum(f: &mut std::fmt::Formatter<'_>, kind: &str, udt: &EnumSpec) -> std::fmt::Result {
    write_header(f, kind, &udt.lib, &udt.name, &udt.doc)?;
    writeln!(f, "     Cases:")?;
    for case in &udt.cases {
        writeln!(f, "      • {} = {}", case.name, case.value)?;
    }
    Ok(())
}

fn indent(s: &str, n: usize) -> String {
    let pad = " ".repeat(n);
    s.lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_name(lib: &str, name: &str) -> String {
    if lib.is_empty() {
        name.to_string()
    } else {
        format!("{lib}::{name}")
    }
}
