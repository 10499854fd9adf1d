use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use assert_cmd::Command;
use async_trait::async_trait;
use soroban_invoker::{
    network::{default_profiles, NetworkId, NetworkProfile, Registry},
    rpc::{
        self, account_key, contract_code_key, contract_instance_key, Event, EventValue,
        GetEventsResponse, GetLatestLedgerResponse, GetLedgerEntriesResponse,
        GetTransactionResponse, LedgerEntryResult, Rpc, SendTransactionResponse,
        SimulateHostFunctionResult, SimulateTransactionResponse,
    },
    signer::{LocalKey, Signer},
    xdr::{
        self, AccountEntry, AccountEntryExt, ContractCodeEntry, ContractCodeEntryExt,
        ContractDataDurability, ContractDataEntry, ContractExecutable, ExtensionPoint, Hash,
        LedgerEntryChanges, LedgerEntryData, LedgerFootprint, LedgerKey, Limits, ScAddress,
        ScContractInstance, ScVal, SequenceNumber, SorobanResources, SorobanTransactionData,
        SorobanTransactionMeta, SorobanTransactionMetaExt, String32, StringM, Thresholds,
        TransactionEnvelope, TransactionMeta, TransactionMetaV3, TransactionResult,
        TransactionResultExt, TransactionResultResult, Uint256, VecM, WriteXdr,
    },
};

pub const SECRET: &str = "SBFGFF27Y64ZUGFAIG5AMJGQODZZKV2YQKAVUUN4HNE24XZXD2OEUVUP";
pub const CONTRACT: [u8; 32] = [7; 32];
pub const CODE_HASH: [u8; 32] = [3; 32];

pub fn new_cmd() -> Command {
    let mut cmd = Command::cargo_bin("soroban-invoker").expect("failed to find local binary");
    cmd.env_remove("SOROBAN_NETWORK")
        .env_remove("SOROBAN_RPC_URL")
        .env_remove("SOROBAN_NETWORK_PASSPHRASE")
        .env_remove("SOROBAN_SECRET_KEY")
        .env_remove("SOROBAN_INVOKER_CONFIG")
        .env_remove("SOROBAN_CONTRACT_ID");
    cmd
}

/// Minimal XDR writer for building spec sections by hand.
#[derive(Default)]
pub struct SpecWriter(pub Vec<u8>);

impl SpecWriter {
    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.u32(s.len() as u32);
        self.0.extend_from_slice(s.as_bytes());
        self.0.resize(self.0.len() + (4 - s.len() % 4) % 4, 0);
        self
    }

    pub fn function(
        &mut self,
        name: &str,
        inputs: &[(&str, &[u32])],
        output: Option<&[u32]>,
    ) -> &mut Self {
        self.u32(0).string("").string(name).u32(inputs.len() as u32);
        for (input, ty) in inputs {
            self.string("").string(input);
            for code in *ty {
                self.u32(*code);
            }
        }
        self.u32(u32::from(output.is_some()));
        for code in output.unwrap_or_default() {
            self.u32(*code);
        }
        self
    }
}

pub fn wasm_with_custom_section(name: &str, data: &[u8]) -> Vec<u8> {
    let mut payload = leb128(name.len());
    payload.extend_from_slice(name.as_bytes());
    payload.extend_from_slice(data);

    let mut wasm = b"\0asm\x01\0\0\0".to_vec();
    wasm.push(0);
    wasm.extend(leb128(payload.len()));
    wasm.extend(payload);
    wasm
}

fn leb128(mut n: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// `hello(to: symbol) -> vec<symbol>` and `add(a: u32, b: i128) -> i128`.
pub fn hello_wasm() -> Vec<u8> {
    let mut w = SpecWriter::default();
    w.function("hello", &[("to", &[17])], Some(&[1002, 17]));
    w.function("add", &[("a", &[4]), ("b", &[11])], Some(&[11]));
    wasm_with_custom_section("contractspecv0", &w.0)
}

pub fn local_key() -> LocalKey {
    LocalKey::from_secret(SECRET).unwrap()
}

pub fn account(address: &str, seq: i64) -> AccountEntry {
    let key = stellar_strkey::ed25519::PublicKey::from_string(address).unwrap();
    AccountEntry {
        account_id: xdr::AccountId(xdr::PublicKey::PublicKeyTypeEd25519(Uint256(key.0))),
        balance: 10_000_000,
        seq_num: SequenceNumber(seq),
        num_sub_entries: 0,
        inflation_dest: None,
        flags: 0,
        home_domain: String32(StringM::default()),
        thresholds: Thresholds([1, 0, 0, 0]),
        signers: VecM::default(),
        ext: AccountEntryExt::V0,
    }
}

pub fn instance(contract_id: &[u8; 32], executable: ContractExecutable) -> LedgerEntryData {
    LedgerEntryData::ContractData(ContractDataEntry {
        ext: ExtensionPoint::V0,
        contract: ScAddress::Contract(Hash(*contract_id)),
        key: ScVal::LedgerKeyContractInstance,
        durability: ContractDataDurability::Persistent,
        val: ScVal::ContractInstance(ScContractInstance {
            executable,
            storage: None,
        }),
    })
}

pub fn code(hash: &[u8; 32], wasm: &[u8]) -> LedgerEntryData {
    LedgerEntryData::ContractCode(ContractCodeEntry {
        ext: ContractCodeEntryExt::V0,
        hash: Hash(*hash),
        code: wasm.to_vec().try_into().unwrap(),
    })
}

pub fn simulation_ok() -> SimulateTransactionResponse {
    let data = SorobanTransactionData {
        ext: ExtensionPoint::V0,
        resources: SorobanResources {
            footprint: LedgerFootprint {
                read_only: VecM::default(),
                read_write: VecM::default(),
            },
            instructions: 0,
            read_bytes: 0,
            write_bytes: 0,
        },
        resource_fee: 0,
    };
    SimulateTransactionResponse {
        transaction_data: data.to_xdr_base64(Limits::none()).unwrap(),
        min_resource_fee: 115,
        results: vec![SimulateHostFunctionResult {
            auth: vec![],
            xdr: ScVal::Void.to_xdr_base64(Limits::none()).unwrap(),
        }],
        latest_ledger: 100,
        ..Default::default()
    }
}

pub fn success(return_value: ScVal) -> GetTransactionResponse {
    let meta = TransactionMeta::V3(TransactionMetaV3 {
        ext: ExtensionPoint::V0,
        tx_changes_before: LedgerEntryChanges(VecM::default()),
        operations: VecM::default(),
        tx_changes_after: LedgerEntryChanges(VecM::default()),
        soroban_meta: Some(SorobanTransactionMeta {
            ext: SorobanTransactionMetaExt::V0,
            events: VecM::default(),
            return_value,
            diagnostic_events: VecM::default(),
        }),
    });
    GetTransactionResponse {
        status: "SUCCESS".to_string(),
        result_meta_xdr: Some(meta.to_xdr_base64(Limits::none()).unwrap()),
        ledger: Some(90),
        ..Default::default()
    }
}

pub fn not_found() -> GetTransactionResponse {
    GetTransactionResponse {
        status: "NOT_FOUND".to_string(),
        ..Default::default()
    }
}

pub fn result_xdr(result: TransactionResultResult) -> String {
    TransactionResult {
        fee_charged: 100,
        result,
        ext: TransactionResultExt::V0,
    }
    .to_xdr_base64(Limits::none())
    .unwrap()
}

pub fn event(id: &str, ledger: u32, topic: &str, value: ScVal) -> Event {
    Event {
        event_type: "contract".to_string(),
        ledger,
        ledger_closed_at: "2024-01-01T00:00:00Z".to_string(),
        id: id.to_string(),
        contract_id: soroban_invoker::utils::contract_strkey(&CONTRACT),
        topic: vec![ScVal::Symbol(xdr::ScSymbol(topic.try_into().unwrap()))
            .to_xdr_base64(Limits::none())
            .unwrap()],
        value: EventValue::Xdr(value.to_xdr_base64(Limits::none()).unwrap()),
    }
}

/// In-memory RPC server. Ledger entries are keyed by their XDR key; every
/// call is counted.
pub struct MockRpc {
    entries: Mutex<HashMap<String, LedgerEntryData>>,
    /// `get_ledger_entries` calls that fail before the store is consulted.
    pub failing_lookups: AtomicUsize,
    pub simulation: Mutex<SimulateTransactionResponse>,
    pub send: Mutex<SendTransactionResponse>,
    /// Responses handed out by `get_transaction`; the last one repeats.
    pub statuses: Mutex<VecDeque<GetTransactionResponse>>,
    pub events: Mutex<Vec<Event>>,
    pub latest_ledger: u32,
    pub funded: Mutex<Vec<String>>,
    pub simulated: Mutex<Vec<TransactionEnvelope>>,
    pub events_start: Mutex<Option<u32>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl Default for MockRpc {
    fn default() -> Self {
        Self {
            entries: Mutex::default(),
            failing_lookups: AtomicUsize::new(0),
            simulation: Mutex::new(simulation_ok()),
            send: Mutex::new(SendTransactionResponse {
                hash: "abcd".to_string(),
                status: "PENDING".to_string(),
                ..Default::default()
            }),
            statuses: Mutex::new(VecDeque::from([success(ScVal::Void)])),
            events: Mutex::default(),
            latest_ledger: 25_000,
            funded: Mutex::default(),
            simulated: Mutex::default(),
            events_start: Mutex::default(),
            calls: Mutex::default(),
        }
    }
}

impl MockRpc {
    pub fn insert(&self, key: &LedgerKey, data: LedgerEntryData) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_xdr_base64(Limits::none()).unwrap(), data);
    }

    /// A wasm contract at [`CONTRACT`] backed by [`hello_wasm`].
    pub fn with_hello_contract(self) -> Self {
        self.insert(
            &contract_instance_key(&CONTRACT),
            instance(&CONTRACT, ContractExecutable::Wasm(Hash(CODE_HASH))),
        );
        self.insert(&contract_code_key(&CODE_HASH), code(&CODE_HASH, &hello_wasm()));
        self
    }

    pub fn with_account(self, address: &str, seq: i64) -> Self {
        self.insert(
            &account_key(address).unwrap(),
            LedgerEntryData::Account(account(address, seq)),
        );
        self
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    fn record(&self, method: &'static str) {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
    }
}

#[async_trait]
impl Rpc for MockRpc {
    async fn get_latest_ledger(&self) -> Result<GetLatestLedgerResponse, rpc::Error> {
        self.record("getLatestLedger");
        Ok(GetLatestLedgerResponse {
            id: "ledger".to_string(),
            protocol_version: 22,
            sequence: self.latest_ledger,
        })
    }

    async fn get_ledger_entries(
        &self,
        keys: &[LedgerKey],
    ) -> Result<GetLedgerEntriesResponse, rpc::Error> {
        self.record("getLedgerEntries");
        let failing = self.failing_lookups.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_lookups.store(failing - 1, Ordering::SeqCst);
            return Err(rpc::Error::InvalidResponse);
        }
        let entries = self.entries.lock().unwrap();
        let mut found = Vec::new();
        for key in keys {
            let key = key.to_xdr_base64(Limits::none())?;
            if let Some(data) = entries.get(&key) {
                found.push(LedgerEntryResult {
                    key,
                    xdr: data.to_xdr_base64(Limits::none())?,
                    last_modified_ledger: 1,
                });
            }
        }
        Ok(GetLedgerEntriesResponse {
            entries: found,
            latest_ledger: self.latest_ledger,
        })
    }

    async fn simulate_transaction(
        &self,
        tx: &TransactionEnvelope,
    ) -> Result<SimulateTransactionResponse, rpc::Error> {
        self.record("simulateTransaction");
        self.simulated.lock().unwrap().push(tx.clone());
        Ok(self.simulation.lock().unwrap().clone())
    }

    async fn send_transaction(
        &self,
        _tx: &TransactionEnvelope,
    ) -> Result<SendTransactionResponse, rpc::Error> {
        self.record("sendTransaction");
        Ok(self.send.lock().unwrap().clone())
    }

    async fn get_transaction(&self, _hash: &str) -> Result<GetTransactionResponse, rpc::Error> {
        self.record("getTransaction");
        let mut statuses = self.statuses.lock().unwrap();
        let response = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(response.unwrap_or_else(not_found))
    }

    async fn get_events(
        &self,
        start_ledger: u32,
        _contract_ids: &[String],
        _limit: Option<usize>,
    ) -> Result<GetEventsResponse, rpc::Error> {
        self.record("getEvents");
        *self.events_start.lock().unwrap() = Some(start_ledger);
        Ok(GetEventsResponse {
            events: self.events.lock().unwrap().clone(),
            latest_ledger: self.latest_ledger,
        })
    }

    async fn fund_account(&self, _friendbot_url: &str, address: &str) -> Result<(), rpc::Error> {
        self.record("fundAccount");
        self.funded.lock().unwrap().push(address.to_string());
        self.insert(
            &account_key(address)?,
            LedgerEntryData::Account(account(address, 1)),
        );
        Ok(())
    }
}

pub fn profile(id: NetworkId) -> NetworkProfile {
    default_profiles()
        .iter()
        .find(|p| p.id == id)
        .cloned()
        .unwrap()
}

/// A registry over mocks; the first entry starts active.
pub fn registry(mocks: &[(NetworkId, Arc<MockRpc>)]) -> Registry {
    Registry::with_clients(mocks.iter().map(|(id, mock)| {
        let client: Arc<dyn Rpc> = mock.clone();
        (profile(*id), client)
    }))
    .unwrap()
}

pub fn source_address() -> String {
    local_key().public_key().to_string()
}
