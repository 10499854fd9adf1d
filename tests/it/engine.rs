use std::sync::{atomic::Ordering, Arc};

use soroban_invoker::{
    abi::ContractDescriptor,
    engine, marshal,
    marshal::InvocationParam,
    network::{self, NetworkId},
    rpc::contract_instance_key,
    xdr::{ContractExecutable, Int128Parts, ScVal},
    Engine, NetworkChoice,
};

use crate::util::{instance, registry, MockRpc, CODE_HASH, CONTRACT};

#[tokio::test]
async fn discovers_wasm_methods_in_declaration_order() {
    let testnet = Arc::new(MockRpc::default().with_hello_contract());
    let engine = Engine::new(registry(&[(NetworkId::Testnet, testnet.clone())]));

    let discovery = engine
        .discover(&CONTRACT, NetworkChoice::Network(NetworkId::Testnet))
        .await
        .unwrap();
    assert_eq!(discovery.network, NetworkId::Testnet);
    assert_eq!(
        discovery.contract,
        ContractDescriptor::WasmModule {
            code_hash: CODE_HASH
        }
    );
    let names: Vec<_> = discovery.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["hello", "add"]);
    assert_eq!(testnet.calls("getLedgerEntries"), 2);
}

#[tokio::test]
async fn stellar_asset_interface_needs_no_code_fetch() {
    let testnet = Arc::new(MockRpc::default());
    testnet.insert(
        &contract_instance_key(&CONTRACT),
        instance(&CONTRACT, ContractExecutable::StellarAsset),
    );
    let engine = Engine::new(registry(&[(NetworkId::Testnet, testnet.clone())]));

    let discovery = engine
        .discover(&CONTRACT, NetworkChoice::Network(NetworkId::Testnet))
        .await
        .unwrap();
    assert_eq!(discovery.contract, ContractDescriptor::StellarAsset);
    assert_eq!(discovery.methods.len(), 16);
    assert_eq!(testnet.calls("getLedgerEntries"), 1);
}

#[tokio::test]
async fn auto_detect_settles_on_the_network_holding_the_contract() {
    let futurenet = Arc::new(MockRpc::default());
    let testnet = Arc::new(MockRpc::default().with_hello_contract());
    let mainnet = Arc::new(MockRpc::default());
    let engine = Engine::new(registry(&[
        (NetworkId::Futurenet, futurenet.clone()),
        (NetworkId::Testnet, testnet.clone()),
        (NetworkId::Mainnet, mainnet.clone()),
    ]));

    let discovery = engine.discover(&CONTRACT, NetworkChoice::Auto).await.unwrap();
    assert_eq!(discovery.network, NetworkId::Testnet);
    assert_eq!(engine.registry().active(), NetworkId::Testnet);
    assert_eq!(futurenet.calls("getLedgerEntries"), 1);
    assert_eq!(mainnet.calls("getLedgerEntries"), 0);
}

#[tokio::test]
async fn auto_detect_reports_a_contract_found_nowhere() {
    let mocks: Vec<_> = [NetworkId::Futurenet, NetworkId::Testnet, NetworkId::Mainnet]
        .into_iter()
        .map(|id| (id, Arc::new(MockRpc::default())))
        .collect();
    let engine = Engine::new(registry(&mocks));

    let err = engine
        .discover(&CONTRACT, NetworkChoice::Auto)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        engine::Error::Network(network::Error::ContractNotFoundOnAnyNetwork(_))
    ));
    assert_eq!(engine.registry().active(), NetworkId::Mainnet);
    for (_, mock) in &mocks {
        assert_eq!(mock.calls("getLedgerEntries"), 1);
    }
}

#[tokio::test]
async fn unknown_network_is_rejected() {
    let engine = Engine::new(registry(&[(NetworkId::Testnet, Arc::new(MockRpc::default()))]));
    let err = engine
        .discover(&CONTRACT, NetworkChoice::Network(NetworkId::Local))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        engine::Error::Network(network::Error::UnsupportedNetwork(_))
    ));
}

#[tokio::test]
async fn interface_lookup_gives_up_after_seven_attempts() {
    let testnet = Arc::new(MockRpc::default().with_hello_contract());
    testnet.failing_lookups.store(100, Ordering::SeqCst);
    let engine = Engine::new(registry(&[(NetworkId::Testnet, testnet.clone())]));

    let err = engine
        .generate_args(
            &CONTRACT,
            NetworkChoice::Network(NetworkId::Testnet),
            "hello",
            &[InvocationParam::new("to", "world")],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        engine::Error::Marshal(marshal::Error::SpecUnavailable { attempts: 7, .. })
    ));
    assert_eq!(testnet.calls("getLedgerEntries"), 7);
}

#[tokio::test]
async fn interface_lookup_recovers_from_transient_failures() {
    let testnet = Arc::new(MockRpc::default().with_hello_contract());
    testnet.failing_lookups.store(3, Ordering::SeqCst);
    let engine = Engine::new(registry(&[(NetworkId::Testnet, testnet.clone())]));

    let generated = engine
        .generate_args(
            &CONTRACT,
            NetworkChoice::Network(NetworkId::Testnet),
            "add",
            &[InvocationParam::new("b", "42"), InvocationParam::new("a", "5")],
        )
        .await
        .unwrap();
    assert_eq!(testnet.calls("getLedgerEntries"), 5);
    assert_eq!(
        generated.args,
        vec![
            ScVal::U32(5),
            ScVal::I128(Int128Parts { hi: 0, lo: 42 }),
        ]
    );
}

#[tokio::test]
async fn unknown_method_is_reported() {
    let testnet = Arc::new(MockRpc::default().with_hello_contract());
    let engine = Engine::new(registry(&[(NetworkId::Testnet, testnet)]));
    let err = engine
        .generate_args(
            &CONTRACT,
            NetworkChoice::Network(NetworkId::Testnet),
            "goodbye",
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        engine::Error::Marshal(marshal::Error::MethodNotFound(name)) if name == "goodbye"
    ));
}

#[tokio::test]
async fn missing_parameter_fails_without_retrying_the_lookup() {
    let testnet = Arc::new(MockRpc::default().with_hello_contract());
    let engine = Engine::new(registry(&[(NetworkId::Testnet, testnet.clone())]));
    let err = engine
        .generate_args(
            &CONTRACT,
            NetworkChoice::Network(NetworkId::Testnet),
            "add",
            &[InvocationParam::new("a", "5")],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        engine::Error::Marshal(marshal::Error::MissingParameter(name)) if name == "b"
    ));
    assert_eq!(testnet.calls("getLedgerEntries"), 2);
}
