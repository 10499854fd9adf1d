use std::{fmt::Display, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    abi::{self, ContractDescriptor, MethodDescriptor},
    invoke::{self, Pipeline, PollConfig},
    marshal::{self, InvocationParam},
    network::{self, Connection, NetworkId, Registry},
    outcome::{self, Outcome},
    signer::Signer,
    strval::{Encoder, ScValEncoder},
    xdr::ScVal,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Network(#[from] network::Error),
    #[error(transparent)]
    Abi(#[from] abi::Error),
    #[error(transparent)]
    Marshal(#[from] marshal::Error),
    #[error(transparent)]
    Invoke(#[from] invoke::Error),
}

/// Which network a call goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkChoice {
    /// Probe futurenet, testnet and mainnet for the contract.
    #[default]
    Auto,
    Network(NetworkId),
}

impl FromStr for NetworkChoice {
    type Err = network::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(NetworkChoice::Auto)
        } else {
            s.parse().map(NetworkChoice::Network)
        }
    }
}

impl Display for NetworkChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkChoice::Auto => f.write_str("auto"),
            NetworkChoice::Network(id) => write!(f, "{id}"),
        }
    }
}

/// The method a caller picked together with the values they supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedMethod {
    pub method: MethodDescriptor,
    pub params: Vec<InvocationParam>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Discovery {
    pub network: NetworkId,
    pub contract: ContractDescriptor,
    pub methods: Vec<MethodDescriptor>,
}

#[derive(Debug, Clone)]
pub struct GeneratedArgs {
    pub network: NetworkId,
    pub method: MethodDescriptor,
    pub args: Vec<ScVal>,
}

/// Method discovery, argument generation and invocation over a registry of
/// networks.
pub struct Engine {
    registry: Registry,
    encoder: Arc<dyn Encoder>,
    poll: PollConfig,
}

impl Engine {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            encoder: Arc::new(ScValEncoder),
            poll: PollConfig::default(),
        }
    }

    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Picks the network and pins its connection for the rest of the call.
    pub async fn connect(
        &self,
        contract_id: &[u8; 32],
        choice: NetworkChoice,
    ) -> Result<Connection, Error> {
        let id = match choice {
            NetworkChoice::Auto => self.registry.auto_detect(contract_id).await?,
            NetworkChoice::Network(id) => {
                self.registry.activate(id)?;
                id
            }
        };
        Ok(self.registry.resolve(id)?)
    }

    pub async fn discover(
        &self,
        contract_id: &[u8; 32],
        choice: NetworkChoice,
    ) -> Result<Discovery, Error> {
        let connection = self.connect(contract_id, choice).await?;
        tracing::info!("{}", connection.profile.contract_url(contract_id));
        let (contract, methods) = abi::discover(connection.client.as_ref(), contract_id).await?;
        Ok(Discovery {
            network: connection.profile.id,
            contract,
            methods,
        })
    }

    pub async fn generate_args(
        &self,
        contract_id: &[u8; 32],
        choice: NetworkChoice,
        method_name: &str,
        params: &[InvocationParam],
    ) -> Result<GeneratedArgs, Error> {
        let connection = self.connect(contract_id, choice).await?;
        self.generate_args_on(&connection, contract_id, method_name, params)
            .await
    }

    async fn generate_args_on(
        &self,
        connection: &Connection,
        contract_id: &[u8; 32],
        method_name: &str,
        params: &[InvocationParam],
    ) -> Result<GeneratedArgs, Error> {
        let (method, args) = marshal::generate_args(
            connection.client.as_ref(),
            contract_id,
            method_name,
            params,
            self.encoder.as_ref(),
        )
        .await?;
        Ok(GeneratedArgs {
            network: connection.profile.id,
            method,
            args,
        })
    }

    /// Runs the selected method. Submission failures and host errors come
    /// back as an [`Outcome`]; everything else is an error.
    pub async fn run(
        &self,
        contract_id: &[u8; 32],
        choice: NetworkChoice,
        selected: &SelectedMethod,
        signer: Arc<dyn Signer>,
        cancel: CancellationToken,
    ) -> Result<Outcome, Error> {
        let connection = self.connect(contract_id, choice).await?;
        let GeneratedArgs { method, args, .. } = self
            .generate_args_on(
                &connection,
                contract_id,
                &selected.method.name,
                &selected.params,
            )
            .await?;
        let pipeline = Pipeline::new(connection, signer)
            .with_poll(self.poll)
            .with_cancellation(cancel);
        let result = pipeline.run(contract_id, &method.name, args).await;
        Ok(outcome::classify(&method.name, result)?)
    }
}
