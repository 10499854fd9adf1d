use std::{sync::Arc, time::Duration};

use soroban_invoker::{
    engine::{self, SelectedMethod},
    invoke::{self, PollConfig},
    marshal::{self, InvocationParam},
    network::NetworkId,
    outcome::Outcome,
    xdr::{
        InvokeHostFunctionResult, OperationResult, OperationResultTr, ScVal, SequenceNumber,
        TransactionEnvelope, TransactionResultResult,
    },
    Engine, NetworkChoice,
};
use tokio_util::sync::CancellationToken;

use crate::util::{
    event, local_key, not_found, registry, result_xdr, source_address, success, MockRpc, CONTRACT,
};

async fn select(
    engine: &Engine,
    network: NetworkId,
    name: &str,
    params: &[(&str, &str)],
) -> SelectedMethod {
    let discovery = engine
        .discover(&CONTRACT, NetworkChoice::Network(network))
        .await
        .unwrap();
    SelectedMethod {
        method: marshal::find_method(discovery.methods, name).unwrap(),
        params: params
            .iter()
            .map(|(n, v)| InvocationParam::new(*n, *v))
            .collect(),
    }
}

async fn run_hello(engine: &Engine, network: NetworkId) -> Result<Outcome, engine::Error> {
    run_hello_with(engine, network, CancellationToken::new()).await
}

async fn run_hello_with(
    engine: &Engine,
    network: NetworkId,
    cancel: CancellationToken,
) -> Result<Outcome, engine::Error> {
    let selected = select(engine, network, "hello", &[("to", "world")]).await;
    engine
        .run(
            &CONTRACT,
            NetworkChoice::Network(network),
            &selected,
            Arc::new(local_key()),
            cancel,
        )
        .await
}

fn testnet_with_account() -> Arc<MockRpc> {
    Arc::new(
        MockRpc::default()
            .with_hello_contract()
            .with_account(&source_address(), 10),
    )
}

#[tokio::test(start_paused = true)]
async fn success_returns_value_and_chronological_events() {
    let testnet = testnet_with_account();
    *testnet.statuses.lock().unwrap() = [success(ScVal::U32(7))].into();
    *testnet.events.lock().unwrap() = vec![
        event("0000000008589934592-0000000000", 2, "second", ScVal::U32(2)),
        event("0000000004294967296-0000000001", 1, "first_b", ScVal::U32(1)),
        event("0000000004294967296-0000000000", 1, "first_a", ScVal::U32(0)),
    ];
    let engine = Engine::new(registry(&[(NetworkId::Testnet, testnet.clone())]));

    let outcome = run_hello(&engine, NetworkId::Testnet).await.unwrap();
    let Outcome::Success {
        status,
        hash,
        return_value,
        method,
        events,
    } = outcome
    else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(status, "SUCCESS");
    assert_eq!(hash, "abcd");
    assert_eq!(method, "hello");
    assert_eq!(return_value, serde_json::json!(7));
    let topics: Vec<_> = events.iter().map(|e| e.topics[0].clone()).collect();
    assert_eq!(
        topics,
        vec![
            serde_json::json!("first_a"),
            serde_json::json!("first_b"),
            serde_json::json!("second"),
        ]
    );
    assert_eq!(*testnet.events_start.lock().unwrap(), Some(15_000));
    assert_eq!(testnet.calls("getTransaction"), 1);

    let simulated = testnet.simulated.lock().unwrap();
    let TransactionEnvelope::Tx(envelope) = &simulated[0] else {
        panic!("expected a v1 envelope");
    };
    assert_eq!(envelope.tx.seq_num, SequenceNumber(11));
    assert!(envelope.signatures.is_empty());
}

#[tokio::test(start_paused = true)]
async fn polls_once_more_after_not_found() {
    let testnet = testnet_with_account();
    *testnet.statuses.lock().unwrap() = [not_found(), success(ScVal::Void)].into();
    let engine = Engine::new(registry(&[(NetworkId::Testnet, testnet.clone())]));

    let selected = select(&engine, NetworkId::Testnet, "hello", &[("to", "world")]).await;
    let start = tokio::time::Instant::now();
    let outcome = engine
        .run(
            &CONTRACT,
            NetworkChoice::Network(NetworkId::Testnet),
            &selected,
            Arc::new(local_key()),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(start.elapsed(), Duration::from_secs(1));
    assert_eq!(testnet.calls("getTransaction"), 2);
}

#[tokio::test(start_paused = true)]
async fn rejected_submission_is_never_polled() {
    let testnet = testnet_with_account();
    {
        let mut send = testnet.send.lock().unwrap();
        send.status = "ERROR".to_string();
        send.error_result_xdr = Some(result_xdr(TransactionResultResult::TxBadSeq));
    }
    let engine = Engine::new(registry(&[(NetworkId::Testnet, testnet.clone())]));

    let outcome = run_hello(&engine, NetworkId::Testnet).await.unwrap();
    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        serde_json::json!({
            "status": "ERROR",
            "hash": "abcd",
            "result": "TxBadSeq",
            "method": "hello",
        })
    );
    assert_eq!(testnet.calls("getTransaction"), 0);
    assert_eq!(testnet.calls("getEvents"), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_transaction_reports_result_code() {
    let testnet = testnet_with_account();
    let failed = soroban_invoker::rpc::GetTransactionResponse {
        status: "FAILED".to_string(),
        result_xdr: Some(result_xdr(TransactionResultResult::TxFailed(
            vec![OperationResult::OpInner(
                OperationResultTr::InvokeHostFunction(InvokeHostFunctionResult::Trapped),
            )]
            .try_into()
            .unwrap(),
        ))),
        ..Default::default()
    };
    *testnet.statuses.lock().unwrap() = [failed].into();
    let engine = Engine::new(registry(&[(NetworkId::Testnet, testnet)]));

    let outcome = run_hello(&engine, NetworkId::Testnet).await.unwrap();
    assert!(matches!(
        outcome,
        Outcome::SubmissionError { ref status, ref result, .. }
            if status == "FAILED" && result == "TxFailed: InvokeHostFunction(Trapped)"
    ));
}

#[tokio::test(start_paused = true)]
async fn simulation_failure_is_a_host_error() {
    let testnet = testnet_with_account();
    let trap = "HostError: Error(WasmVm, InvalidAction)\n\nEvent log (newest first):\n   0: trap";
    testnet.simulation.lock().unwrap().error = Some(trap.to_string());
    let engine = Engine::new(registry(&[(NetworkId::Testnet, testnet.clone())]));

    let outcome = run_hello(&engine, NetworkId::Testnet).await.unwrap();
    let Outcome::HostError {
        status,
        title,
        response,
    } = outcome
    else {
        panic!("expected host error, got {outcome:?}");
    };
    assert_eq!(status, "ERROR");
    assert_eq!(title, "HostError: Error(WasmVm, InvalidAction)");
    assert!(response.contains("Event log"));
    assert_eq!(testnet.calls("sendTransaction"), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_account_on_mainnet_is_never_funded() {
    let mainnet = Arc::new(MockRpc::default().with_hello_contract());
    let engine = Engine::new(registry(&[(NetworkId::Mainnet, mainnet.clone())]));

    let err = run_hello(&engine, NetworkId::Mainnet).await.unwrap_err();
    assert!(matches!(
        err,
        engine::Error::Invoke(invoke::Error::AccountNotFoundOnMainnet(ref address))
            if *address == source_address()
    ));
    assert_eq!(mainnet.calls("fundAccount"), 0);
    assert_eq!(mainnet.calls("simulateTransaction"), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_account_on_testnet_is_funded_first() {
    let testnet = Arc::new(MockRpc::default().with_hello_contract());
    let engine = Engine::new(registry(&[(NetworkId::Testnet, testnet.clone())]));

    let outcome = run_hello(&engine, NetworkId::Testnet).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(*testnet.funded.lock().unwrap(), vec![source_address()]);
}

#[tokio::test(start_paused = true)]
async fn polling_is_bounded() {
    let testnet = testnet_with_account();
    *testnet.statuses.lock().unwrap() = [not_found()].into();
    let engine = Engine::new(registry(&[(NetworkId::Testnet, testnet.clone())])).with_poll(
        PollConfig {
            interval: Duration::from_secs(2),
            max_attempts: Some(3),
        },
    );

    let err = run_hello(&engine, NetworkId::Testnet).await.unwrap_err();
    assert!(matches!(
        err,
        engine::Error::Invoke(invoke::Error::PollTimeout { attempts: 3, .. })
    ));
    assert_eq!(testnet.calls("getTransaction"), 3);
}

#[tokio::test(start_paused = true)]
async fn polling_stops_when_cancelled() {
    let testnet = testnet_with_account();
    *testnet.statuses.lock().unwrap() = [not_found()].into();
    let engine = Engine::new(registry(&[(NetworkId::Testnet, testnet.clone())]));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = run_hello_with(&engine, NetworkId::Testnet, cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        engine::Error::Invoke(invoke::Error::Cancelled { ref hash }) if hash == "abcd"
    ));
    assert_eq!(testnet.calls("getTransaction"), 1);
}

#[tokio::test(start_paused = true)]
async fn invocation_stays_on_the_selected_network() {
    let futurenet = Arc::new(MockRpc::default());
    let testnet = testnet_with_account();
    let engine = Engine::new(registry(&[
        (NetworkId::Futurenet, futurenet.clone()),
        (NetworkId::Testnet, testnet.clone()),
    ]));
    assert_eq!(engine.registry().active(), NetworkId::Futurenet);

    let outcome = run_hello(&engine, NetworkId::Testnet).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(futurenet.calls("getLedgerEntries"), 0);
    assert_eq!(futurenet.calls("sendTransaction"), 0);
    assert_eq!(testnet.calls("sendTransaction"), 1);
}
