use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use super::{parse_param, print_json, ContractArgs};
use crate::{
    config::{self, PollArgs, SignerArgs},
    engine::{self, NetworkChoice, SelectedMethod},
    marshal::{self, InvocationParam},
    signer::Signer,
    utils,
};

#[derive(Parser, Debug, Clone)]
#[group(skip)]
pub struct Cmd {
    #[command(flatten)]
    pub contract: ContractArgs,

    /// Method to call
    #[arg(long = "fn")]
    pub function: String,

    /// Parameter as name=value; repeat for each input
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<InvocationParam>,

    #[command(flatten)]
    pub signer: SignerArgs,

    #[command(flatten)]
    pub poll: PollArgs,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error(transparent)]
    ContractId(#[from] utils::Error),
    #[error(transparent)]
    Engine(#[from] engine::Error),
    #[error(transparent)]
    Marshal(#[from] marshal::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("invocation of {method} finished with status {status}")]
    Unsuccessful { method: String, status: String },
}

impl Cmd {
    pub async fn run(&self) -> Result<(), Error> {
        let contract_id = self.contract.contract_id()?;
        let key = self.signer.key()?;
        tracing::debug!(source = %key.public_key(), "signing as");
        let engine = self.contract.engine()?.with_poll((&self.poll).into());

        let discovery = engine
            .discover(&contract_id, self.contract.choice()?)
            .await?;
        let selected = SelectedMethod {
            method: marshal::find_method(discovery.methods, &self.function)?,
            params: self.params.clone(),
        };

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        let outcome = engine
            .run(
                &contract_id,
                NetworkChoice::Network(discovery.network),
                &selected,
                Arc::new(key),
                cancel,
            )
            .await?;
        print_json(&outcome)?;
        if outcome.is_success() {
            Ok(())
        } else {
            Err(Error::Unsuccessful {
                method: self.function.clone(),
                status: outcome.status().to_string(),
            })
        }
    }
}
