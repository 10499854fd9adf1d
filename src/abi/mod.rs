use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    contractspec::{self, ContractSpec, FunctionSpec, TypeDef},
    rpc::{self, Rpc},
    utils,
    xdr::{ContractExecutable, ScContractInstance, ScVal},
};

pub mod asset;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Rpc(#[from] rpc::Error),
    #[error(transparent)]
    Spec(#[from] contractspec::Error),
    #[error("contract {0} not found")]
    ContractNotFound(String),
    #[error("ledger entry for contract {0} is not a contract instance")]
    NotAContractInstance(String),
}

/// What kind of code backs a contract instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractDescriptor {
    StellarAsset,
    WasmModule {
        #[serde(serialize_with = "serialize_hex")]
        code_hash: [u8; 32],
    },
}

fn serialize_hex<S: serde::Serializer>(hash: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(hash))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInput {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: TypeDef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub docs: Option<String>,
    pub inputs: Vec<MethodInput>,
    pub outputs: Vec<TypeDef>,
}

impl MethodDescriptor {
    pub fn input(&self, name: &str) -> Option<&MethodInput> {
        self.inputs.iter().find(|i| i.name == name)
    }
}

impl From<&FunctionSpec> for MethodDescriptor {
    fn from(f: &FunctionSpec) -> Self {
        MethodDescriptor {
            name: f.name.clone(),
            docs: (!f.doc.is_empty()).then(|| f.doc.clone()),
            inputs: f
                .inputs
                .iter()
                .map(|i| MethodInput {
                    name: i.name.clone(),
                    type_: i.type_.clone(),
                })
                .collect(),
            outputs: f.outputs.clone(),
        }
    }
}

/// Produces the callable methods of one kind of contract.
#[async_trait]
pub trait InterfaceSource: Send + Sync {
    async fn methods(&self, rpc: &dyn Rpc) -> Result<Vec<MethodDescriptor>, Error>;
}

pub struct StellarAssetInterface;

#[async_trait]
impl InterfaceSource for StellarAssetInterface {
    async fn methods(&self, _rpc: &dyn Rpc) -> Result<Vec<MethodDescriptor>, Error> {
        Ok(asset::methods())
    }
}

pub struct WasmInterface {
    pub code_hash: [u8; 32],
}

#[async_trait]
impl InterfaceSource for WasmInterface {
    async fn methods(&self, rpc: &dyn Rpc) -> Result<Vec<MethodDescriptor>, Error> {
        tracing::debug!(code_hash = %hex::encode(self.code_hash), "fetching contract code");
        let wasm = rpc.get_contract_code(&self.code_hash).await?;
        methods_from_wasm(&wasm)
    }
}

impl ContractDescriptor {
    pub fn interface(&self) -> Box<dyn InterfaceSource> {
        match *self {
            ContractDescriptor::StellarAsset => Box::new(StellarAssetInterface),
            ContractDescriptor::WasmModule { code_hash } => Box::new(WasmInterface { code_hash }),
        }
    }
}

/// Function records of the module's spec, in section order. Functions
/// without a name are skipped.
pub fn methods_from_wasm(wasm: &[u8]) -> Result<Vec<MethodDescriptor>, Error> {
    let spec = ContractSpec::new(wasm)?;
    Ok(spec
        .functions()
        .filter(|f| !f.name.is_empty())
        .map(MethodDescriptor::from)
        .collect())
}

pub async fn build_interface(
    rpc: &dyn Rpc,
    descriptor: &ContractDescriptor,
) -> Result<Vec<MethodDescriptor>, Error> {
    descriptor.interface().methods(rpc).await
}

pub async fn describe_contract(
    rpc: &dyn Rpc,
    contract_id: &[u8; 32],
) -> Result<ContractDescriptor, Error> {
    let strkey = || utils::contract_strkey(contract_id);
    let entry = rpc
        .get_contract_instance(contract_id)
        .await?
        .ok_or_else(|| Error::ContractNotFound(strkey()))?;
    match entry.val {
        ScVal::ContractInstance(ScContractInstance { executable, .. }) => Ok(match executable {
            ContractExecutable::StellarAsset => ContractDescriptor::StellarAsset,
            ContractExecutable::Wasm(hash) => ContractDescriptor::WasmModule { code_hash: hash.0 },
        }),
        _ => Err(Error::NotAContractInstance(strkey())),
    }
}

/// Looks the contract up and builds its interface in one go.
pub async fn discover(
    rpc: &dyn Rpc,
    contract_id: &[u8; 32],
) -> Result<(ContractDescriptor, Vec<MethodDescriptor>), Error> {
    let descriptor = describe_contract(rpc, contract_id).await?;
    let methods = build_interface(rpc, &descriptor).await?;
    Ok((descriptor, methods))
}
