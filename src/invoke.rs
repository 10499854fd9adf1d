use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    network::Connection,
    rpc::{self, transaction::assemble, Event, GetTransactionResponse, Rpc},
    signer::{self, Signer},
    strval, utils,
    xdr::{
        self, AccountEntry, HostFunction, InvokeContractArgs, InvokeHostFunctionOp, Limits, Memo,
        MuxedAccount, Operation, OperationBody, OperationResult, OperationResultTr, Preconditions,
        ReadXdr, ScSymbol, ScVal, SequenceNumber, TimeBounds, TimePoint, Transaction,
        TransactionExt, TransactionMeta, TransactionMetaV3, TransactionResult,
        TransactionResultResult, Uint256, VecM,
    },
};

/// Ledgers searched backwards from the latest one for a call's events.
pub const EVENT_LOOKBACK: u32 = 10_000;
/// Seconds a built transaction stays valid.
pub const TX_TIMEOUT_SECS: u64 = 30;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Rpc(#[from] rpc::Error),
    #[error(transparent)]
    Signer(#[from] signer::Error),
    #[error("xdr processing error: {0}")]
    Xdr(#[from] xdr::Error),
    #[error("account {0} does not exist on mainnet; fund it before invoking")]
    AccountNotFoundOnMainnet(String),
    #[error("account {0} not found")]
    AccountNotFound(String),
    #[error("host invocation failed: {title}")]
    Host { title: String, response: String },
    #[error("unexpected transaction status: {0}")]
    UnexpectedTransactionStatus(String),
    #[error("transaction {hash} not final after {attempts} polls")]
    PollTimeout { hash: String, attempts: u32 },
    #[error("polling for transaction {hash} was cancelled")]
    Cancelled { hash: String },
    #[error("transaction meta carries no return value")]
    MissingReturnValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// `None` polls until the transaction is final or the token is cancelled.
    pub max_attempts: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: Some(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedEvent {
    pub id: String,
    pub ledger: u32,
    pub ledger_closed_at: String,
    pub contract_id: String,
    pub topics: Vec<Value>,
    pub value: Value,
}

impl TryFrom<&Event> for DecodedEvent {
    type Error = xdr::Error;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        let topics = event
            .topic
            .iter()
            .map(|t| ScVal::from_xdr_base64(t, Limits::none()).map(|v| strval::to_json(&v)))
            .collect::<Result<Vec<_>, _>>()?;
        let value = ScVal::from_xdr_base64(event.value.xdr(), Limits::none())?;
        Ok(DecodedEvent {
            id: event.id.clone(),
            ledger: event.ledger,
            ledger_closed_at: event.ledger_closed_at.clone(),
            contract_id: event.contract_id.clone(),
            topics,
            value: strval::to_json(&value),
        })
    }
}

/// How a submitted transaction ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Success {
        hash: String,
        return_value: ScVal,
        events: Vec<DecodedEvent>,
    },
    /// Rejected at submission or failed on-chain.
    Failed {
        hash: String,
        status: String,
        result: String,
    },
}

/// One invocation against one network. The connection is fixed for the
/// lifetime of the pipeline.
pub struct Pipeline {
    connection: Connection,
    signer: Arc<dyn Signer>,
    poll: PollConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(connection: Connection, signer: Arc<dyn Signer>) -> Self {
        Self {
            connection,
            signer,
            poll: PollConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn client(&self) -> &dyn Rpc {
        self.connection.client.as_ref()
    }

    pub async fn run(
        &self,
        contract_id: &[u8; 32],
        function: &str,
        args: Vec<ScVal>,
    ) -> Result<Completion, Error> {
        let network = self.connection.profile.id;
        tracing::debug!(%network, function, "building transaction");
        let account = self.source_account().await?;
        let tx = build_invoke_tx(&account, contract_id, function, args, now_secs())?;
        let tx = self.prepare(&tx).await?;

        let envelope = self
            .signer
            .sign_txn(&tx, &self.connection.profile.network_passphrase)?;
        tracing::debug!("transaction signed");

        let sent = self.client().send_transaction(&envelope).await?;
        tracing::debug!(hash = %sent.hash, status = %sent.status, "transaction submitted");
        tracing::info!("{}", self.connection.profile.tx_url(&sent.hash));
        if matches!(sent.status.as_str(), "ERROR" | "TRY_AGAIN_LATER") {
            let result = failure_reason(sent.error_result_xdr.as_deref(), &sent.status)?;
            tracing::error!(hash = %sent.hash, %result, "transaction submission failed");
            return Ok(Completion::Failed {
                hash: sent.hash,
                status: sent.status,
                result,
            });
        }

        let response = self.poll(&sent.hash).await?;
        if response.status == "FAILED" {
            let result = failure_reason(response.result_xdr.as_deref(), &response.status)?;
            tracing::error!(hash = %sent.hash, %result, "transaction failed");
            return Ok(Completion::Failed {
                hash: sent.hash,
                status: response.status,
                result,
            });
        }

        let meta = response
            .result_meta_xdr
            .as_deref()
            .ok_or(rpc::Error::MissingResult)?;
        let return_value = return_value(&TransactionMeta::from_xdr_base64(meta, Limits::none())?)?;
        let events = self.events(contract_id).await?;
        Ok(Completion::Success {
            hash: sent.hash,
            return_value,
            events,
        })
    }

    /// Fetches the signer's account, funding it first on networks with a
    /// friendbot.
    async fn source_account(&self) -> Result<AccountEntry, Error> {
        let address = self.signer.public_key().to_string();
        if let Some(account) = self.client().get_account(&address).await? {
            return Ok(account);
        }
        let profile = &self.connection.profile;
        let Some(friendbot) = &profile.friendbot_url else {
            return Err(Error::AccountNotFoundOnMainnet(address));
        };
        tracing::debug!(%address, %friendbot, "funding source account");
        self.client().fund_account(friendbot, &address).await?;
        self.client()
            .get_account(&address)
            .await?
            .ok_or(Error::AccountNotFound(address))
    }

    async fn prepare(&self, tx: &Transaction) -> Result<Transaction, Error> {
        let unsigned = xdr::TransactionEnvelope::Tx(xdr::TransactionV1Envelope {
            tx: tx.clone(),
            signatures: VecM::default(),
        });
        let simulation = self.client().simulate_transaction(&unsigned).await?;
        if let Some(error) = &simulation.error {
            tracing::debug!(%error, "simulation failed");
            return Err(host_error(error));
        }
        Ok(assemble(tx, &simulation)?)
    }

    async fn poll(&self, hash: &str) -> Result<GetTransactionResponse, Error> {
        let mut attempts = 0;
        loop {
            let response = self.client().get_transaction(hash).await?;
            attempts += 1;
            match response.status.as_str() {
                "SUCCESS" | "FAILED" => {
                    tracing::trace!(?response);
                    return Ok(response);
                }
                "NOT_FOUND" => (),
                _ => return Err(Error::UnexpectedTransactionStatus(response.status)),
            }
            if self.poll.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(Error::PollTimeout {
                    hash: hash.to_string(),
                    attempts,
                });
            }
            tracing::debug!(hash, attempts, "transaction not found yet");
            tokio::select! {
                () = self.cancel.cancelled() => {
                    return Err(Error::Cancelled { hash: hash.to_string() });
                }
                () = tokio::time::sleep(self.poll.interval) => {}
            }
        }
    }

    async fn events(&self, contract_id: &[u8; 32]) -> Result<Vec<DecodedEvent>, Error> {
        let latest = self.client().get_latest_ledger().await?.sequence;
        let start = latest.saturating_sub(EVENT_LOOKBACK).max(1);
        let contract = utils::contract_strkey(contract_id);
        let mut response = self.client().get_events(start, &[contract], None).await?;
        // Events whose id does not parse keep their relative place at the end.
        response
            .events
            .sort_by_key(|e| e.parse_cursor().unwrap_or((u64::MAX, i32::MAX)));
        Ok(response
            .events
            .iter()
            .map(DecodedEvent::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

pub fn build_invoke_tx(
    account: &AccountEntry,
    contract_id: &[u8; 32],
    function: &str,
    args: Vec<ScVal>,
    now: u64,
) -> Result<Transaction, Error> {
    let xdr::AccountId(xdr::PublicKey::PublicKeyTypeEd25519(Uint256(key))) = &account.account_id;
    let op = Operation {
        source_account: None,
        body: OperationBody::InvokeHostFunction(InvokeHostFunctionOp {
            host_function: HostFunction::InvokeContract(InvokeContractArgs {
                contract_address: utils::contract_address(contract_id),
                function_name: ScSymbol(function.try_into()?),
                args: args.try_into()?,
            }),
            auth: VecM::default(),
        }),
    };
    Ok(Transaction {
        source_account: MuxedAccount::Ed25519(Uint256(*key)),
        fee: rpc::transaction::BASE_FEE,
        seq_num: SequenceNumber(account.seq_num.0 + 1),
        cond: Preconditions::Time(TimeBounds {
            min_time: TimePoint(0),
            max_time: TimePoint(now + TX_TIMEOUT_SECS),
        }),
        memo: Memo::None,
        operations: vec![op].try_into()?,
        ext: TransactionExt::V0,
    })
}

/// The first line of the host diagnostic becomes the title.
pub fn host_error(response: &str) -> Error {
    let title = response
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("host invocation failed")
        .to_string();
    Error::Host {
        title,
        response: response.to_string(),
    }
}

pub fn return_value(meta: &TransactionMeta) -> Result<ScVal, Error> {
    match meta {
        TransactionMeta::V3(TransactionMetaV3 {
            soroban_meta: Some(soroban),
            ..
        }) => Ok(soroban.return_value.clone()),
        _ => Err(Error::MissingReturnValue),
    }
}

/// The decoded result code of a rejected transaction, or its status when the
/// node sent no result.
fn failure_reason(result_xdr: Option<&str>, status: &str) -> Result<String, Error> {
    Ok(match result_xdr {
        Some(x) => decode_result_code(&TransactionResult::from_xdr_base64(x, Limits::none())?),
        None => status.to_string(),
    })
}

/// Renders a transaction result as e.g. `TxFailed: InvokeHostFunction(Trapped)`.
pub fn decode_result_code(result: &TransactionResult) -> String {
    match &result.result {
        TransactionResultResult::TxFailed(ops) | TransactionResultResult::TxSuccess(ops) => {
            let ops = ops
                .iter()
                .map(operation_result_code)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}: {ops}", result.result.name())
        }
        other => other.name().to_string(),
    }
}

fn operation_result_code(result: &OperationResult) -> String {
    match result {
        OperationResult::OpInner(OperationResultTr::InvokeHostFunction(r)) => {
            format!("InvokeHostFunction({})", r.name())
        }
        OperationResult::OpInner(tr) => tr.name().to_string(),
        other => other.name().to_string(),
    }
}
