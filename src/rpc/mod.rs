use std::str::FromStr;

use async_trait::async_trait;
use http::{uri::Authority, HeaderValue, Uri};
use itertools::Itertools;
use jsonrpsee_core::{client::ClientT, params::ObjectParams, rpc_params};
use jsonrpsee_http_client::{HeaderMap, HttpClient, HttpClientBuilder};
use serde_aux::prelude::{deserialize_default_from_null, deserialize_number_from_string};

use crate::xdr::{
    self, AccountEntry, AccountId, ContractDataEntry, Error as XdrError, Hash, LedgerEntryData,
    LedgerKey, LedgerKeyAccount, Limits, PublicKey, ReadXdr, TransactionEnvelope, Uint256, WriteXdr,
};

mod friendbot;
pub mod transaction;

const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] stellar_strkey::DecodeError),
    #[error("invalid response from server")]
    InvalidResponse,
    #[error("xdr processing error: {0}")]
    Xdr(#[from] XdrError),
    #[error("invalid rpc url: {0}")]
    InvalidRpcUrl(http::uri::InvalidUri),
    #[error("invalid rpc url: {0}")]
    InvalidRpcUrlFromUriParts(http::uri::InvalidUriParts),
    #[error("jsonrpc error: {0}")]
    JsonRpc(#[from] jsonrpsee_core::Error),
    #[error("json decoding error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0} not found: {1}")]
    NotFound(String, String),
    #[error("Missing result in successful response")]
    MissingResult,
    #[error("cursor is not valid")]
    InvalidCursor,
    #[error("unexpected ({length}) simulate transaction result length")]
    UnexpectedSimulateTransactionResultSize { length: usize },
    #[error("unexpected ({count}) number of operations")]
    UnexpectedOperationCount { count: usize },
    #[error("Transaction contains unsupported operation type")]
    UnsupportedOperationType,
    #[error("unexpected contract code data type: {0:?}")]
    UnexpectedContractCodeDataType(Box<LedgerEntryData>),
    #[error("Invalid URL {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Hyper(#[from] hyper::Error),
    #[error("failed to fund account: {0}")]
    FailedToFundAccount(String),
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default)]
pub struct SendTransactionResponse {
    pub hash: String,
    pub status: String,
    #[serde(
        rename = "errorResultXdr",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub error_result_xdr: Option<String>,
    #[serde(
        rename = "latestLedger",
        deserialize_with = "deserialize_number_from_string",
        default
    )]
    pub latest_ledger: u32,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default)]
pub struct GetTransactionResponse {
    pub status: String,
    #[serde(
        rename = "envelopeXdr",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub envelope_xdr: Option<String>,
    #[serde(rename = "resultXdr", skip_serializing_if = "Option::is_none", default)]
    pub result_xdr: Option<String>,
    #[serde(
        rename = "resultMetaXdr",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub result_meta_xdr: Option<String>,
    #[serde(rename = "ledger", skip_serializing_if = "Option::is_none", default)]
    pub ledger: Option<u32>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct LedgerEntryResult {
    pub key: String,
    pub xdr: String,
    #[serde(
        rename = "lastModifiedLedgerSeq",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub last_modified_ledger: u32,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default)]
pub struct GetLedgerEntriesResponse {
    #[serde(deserialize_with = "deserialize_default_from_null", default)]
    pub entries: Vec<LedgerEntryResult>,
    #[serde(
        rename = "latestLedger",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub latest_ledger: u32,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct GetLatestLedgerResponse {
    pub id: String,
    #[serde(
        rename = "protocolVersion",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub protocol_version: u32,
    pub sequence: u32,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default)]
pub struct SimulateHostFunctionResult {
    #[serde(deserialize_with = "deserialize_default_from_null", default)]
    pub auth: Vec<String>,
    pub xdr: String,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default)]
pub struct SimulateTransactionResponse {
    /// Set when the host failed while executing the simulated call.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(rename = "transactionData", default)]
    pub transaction_data: String,
    #[serde(deserialize_with = "deserialize_default_from_null", default)]
    pub events: Vec<String>,
    #[serde(
        rename = "minResourceFee",
        deserialize_with = "deserialize_number_from_string",
        default
    )]
    pub min_resource_fee: u32,
    #[serde(deserialize_with = "deserialize_default_from_null", default)]
    pub results: Vec<SimulateHostFunctionResult>,
    #[serde(
        rename = "latestLedger",
        deserialize_with = "deserialize_number_from_string",
        default
    )]
    pub latest_ledger: u32,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default)]
pub struct GetEventsResponse {
    #[serde(deserialize_with = "deserialize_default_from_null", default)]
    pub events: Vec<Event>,
    #[serde(
        rename = "latestLedger",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub latest_ledger: u32,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub ledger: u32,
    #[serde(rename = "ledgerClosedAt")]
    pub ledger_closed_at: String,
    pub id: String,
    #[serde(rename = "contractId")]
    pub contract_id: String,
    pub topic: Vec<String>,
    pub value: EventValue,
}

/// Older servers wrap the value as `{"xdr": ...}`, newer ones send the bare
/// base64 string.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum EventValue {
    Xdr(String),
    Wrapped { xdr: String },
}

impl EventValue {
    pub fn xdr(&self) -> &str {
        match self {
            EventValue::Xdr(x) | EventValue::Wrapped { xdr: x } => x,
        }
    }
}

impl Event {
    pub fn parse_cursor(&self) -> Result<(u64, i32), Error> {
        parse_cursor(&self.id)
    }
}

pub fn parse_cursor(c: &str) -> Result<(u64, i32), Error> {
    let (toid_part, event_index) = c.split('-').collect_tuple().ok_or(Error::InvalidCursor)?;
    let toid_part: u64 = toid_part.parse().map_err(|_| Error::InvalidCursor)?;
    let start_index: i32 = event_index.parse().map_err(|_| Error::InvalidCursor)?;
    Ok((toid_part, start_index))
}

pub fn account_key(address: &str) -> Result<LedgerKey, Error> {
    Ok(LedgerKey::Account(LedgerKeyAccount {
        account_id: AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(
            stellar_strkey::ed25519::PublicKey::from_string(address)?.0,
        ))),
    }))
}

pub fn contract_instance_key(contract_id: &[u8; 32]) -> LedgerKey {
    LedgerKey::ContractData(xdr::LedgerKeyContractData {
        contract: xdr::ScAddress::Contract(Hash(*contract_id)),
        key: xdr::ScVal::LedgerKeyContractInstance,
        durability: xdr::ContractDataDurability::Persistent,
    })
}

pub fn contract_code_key(hash: &[u8; 32]) -> LedgerKey {
    LedgerKey::ContractCode(xdr::LedgerKeyContractCode { hash: Hash(*hash) })
}

/// The subset of the Soroban RPC API the engine talks to. The provided
/// methods layer ledger-entry decoding on top of the raw calls.
#[async_trait]
pub trait Rpc: Send + Sync {
    async fn get_latest_ledger(&self) -> Result<GetLatestLedgerResponse, Error>;

    async fn get_ledger_entries(
        &self,
        keys: &[LedgerKey],
    ) -> Result<GetLedgerEntriesResponse, Error>;

    async fn simulate_transaction(
        &self,
        tx: &TransactionEnvelope,
    ) -> Result<SimulateTransactionResponse, Error>;

    async fn send_transaction(
        &self,
        tx: &TransactionEnvelope,
    ) -> Result<SendTransactionResponse, Error>;

    async fn get_transaction(&self, hash: &str) -> Result<GetTransactionResponse, Error>;

    async fn get_events(
        &self,
        start_ledger: u32,
        contract_ids: &[String],
        limit: Option<usize>,
    ) -> Result<GetEventsResponse, Error>;

    /// Ask a friendbot to create and fund `address`.
    async fn fund_account(&self, friendbot_url: &str, address: &str) -> Result<(), Error>;

    async fn get_account(&self, address: &str) -> Result<Option<AccountEntry>, Error> {
        tracing::trace!("Getting address {}", address);
        let response = self.get_ledger_entries(&[account_key(address)?]).await?;
        let Some(entry) = response.entries.first() else {
            return Ok(None);
        };
        match LedgerEntryData::from_xdr_base64(&entry.xdr, Limits::none())? {
            LedgerEntryData::Account(account) => {
                tracing::trace!(?account);
                Ok(Some(account))
            }
            _ => Err(Error::InvalidResponse),
        }
    }

    async fn get_contract_instance(
        &self,
        contract_id: &[u8; 32],
    ) -> Result<Option<ContractDataEntry>, Error> {
        let response = self
            .get_ledger_entries(&[contract_instance_key(contract_id)])
            .await?;
        let Some(entry) = response.entries.first() else {
            return Ok(None);
        };
        match LedgerEntryData::from_xdr_base64(&entry.xdr, Limits::none())? {
            LedgerEntryData::ContractData(data) => Ok(Some(data)),
            other => Err(Error::UnexpectedContractCodeDataType(Box::new(other))),
        }
    }

    async fn get_contract_code(&self, hash: &[u8; 32]) -> Result<Vec<u8>, Error> {
        let response = self.get_ledger_entries(&[contract_code_key(hash)]).await?;
        let Some(entry) = response.entries.first() else {
            return Err(Error::NotFound(
                "Contract Code".to_string(),
                hex::encode(hash),
            ));
        };
        match LedgerEntryData::from_xdr_base64(&entry.xdr, Limits::none())? {
            LedgerEntryData::ContractCode(code) => Ok(code.code.into()),
            other => Err(Error::UnexpectedContractCodeDataType(Box::new(other))),
        }
    }
}

pub struct Client {
    base_url: String,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self, Error> {
        // Add the port to the base URL if there is no port explicitly included
        // in the URL and the scheme allows us to infer a default port.
        // Jsonrpsee requires a port to always be present even if one can be
        // inferred. This may change: https://github.com/paritytech/jsonrpsee/issues/1048.
        let uri = base_url.parse::<Uri>().map_err(Error::InvalidRpcUrl)?;
        let mut parts = uri.into_parts();
        if let (Some(scheme), Some(authority)) = (&parts.scheme, &parts.authority) {
            if authority.port().is_none() {
                let port = match scheme.as_str() {
                    "http" => Some(80),
                    "https" => Some(443),
                    _ => None,
                };
                if let Some(port) = port {
                    let host = authority.host();
                    parts.authority = Some(
                        Authority::from_str(&format!("{host}:{port}"))
                            .map_err(Error::InvalidRpcUrl)?,
                    );
                }
            }
        }
        let uri = Uri::from_parts(parts).map_err(Error::InvalidRpcUrlFromUriParts)?;
        tracing::trace!(?uri);
        Ok(Self {
            base_url: uri.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn client(&self) -> Result<HttpClient, Error> {
        let url = self.base_url.clone();
        let mut headers = HeaderMap::new();
        headers.insert("X-Client-Name", HeaderValue::from_static("soroban-invoker"));
        let version = VERSION.unwrap_or("devel");
        headers.insert(
            "X-Client-Version",
            HeaderValue::from_str(version).unwrap_or(HeaderValue::from_static("devel")),
        );
        Ok(HttpClientBuilder::default()
            .set_headers(headers)
            .build(url)?)
    }
}

#[async_trait]
impl Rpc for Client {
    async fn get_latest_ledger(&self) -> Result<GetLatestLedgerResponse, Error> {
        tracing::trace!("Getting latest ledger");
        Ok(self
            .client()?
            .request("getLatestLedger", rpc_params![])
            .await?)
    }

    async fn get_ledger_entries(
        &self,
        keys: &[LedgerKey],
    ) -> Result<GetLedgerEntriesResponse, Error> {
        let base64_keys = keys
            .iter()
            .map(|k| k.to_xdr_base64(Limits::none()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut oparams = ObjectParams::new();
        oparams.insert("keys", base64_keys)?;
        Ok(self
            .client()?
            .request("getLedgerEntries", oparams)
            .await?)
    }

    async fn simulate_transaction(
        &self,
        tx: &TransactionEnvelope,
    ) -> Result<SimulateTransactionResponse, Error> {
        tracing::trace!(?tx);
        let mut oparams = ObjectParams::new();
        oparams.insert("transaction", tx.to_xdr_base64(Limits::none())?)?;
        let response: SimulateTransactionResponse =
            self.client()?.request("simulateTransaction", oparams).await?;
        tracing::trace!(?response);
        Ok(response)
    }

    async fn send_transaction(
        &self,
        tx: &TransactionEnvelope,
    ) -> Result<SendTransactionResponse, Error> {
        tracing::trace!(?tx);
        let mut oparams = ObjectParams::new();
        oparams.insert("transaction", tx.to_xdr_base64(Limits::none())?)?;
        let response: SendTransactionResponse =
            self.client()?.request("sendTransaction", oparams).await?;
        tracing::trace!(?response);
        Ok(response)
    }

    async fn get_transaction(&self, hash: &str) -> Result<GetTransactionResponse, Error> {
        let mut oparams = ObjectParams::new();
        oparams.insert("hash", hash)?;
        Ok(self.client()?.request("getTransaction", oparams).await?)
    }

    async fn get_events(
        &self,
        start_ledger: u32,
        contract_ids: &[String],
        limit: Option<usize>,
    ) -> Result<GetEventsResponse, Error> {
        let mut filters = serde_json::Map::new();
        filters.insert("type".to_string(), "contract".into());
        filters.insert("contractIds".to_string(), contract_ids.into());

        let mut pagination = serde_json::Map::new();
        if let Some(limit) = limit {
            pagination.insert("limit".to_string(), limit.into());
        }

        let mut oparams = ObjectParams::new();
        oparams.insert("startLedger", start_ledger)?;
        oparams.insert("filters", vec![filters])?;
        oparams.insert("pagination", pagination)?;

        Ok(self.client()?.request("getEvents", oparams).await?)
    }

    async fn fund_account(&self, friendbot_url: &str, address: &str) -> Result<(), Error> {
        friendbot::fund(friendbot_url, address).await
    }
}
