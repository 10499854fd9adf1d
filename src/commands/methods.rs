use clap::Parser;

use super::{print_json, ContractArgs};
use crate::{config, engine, utils};

#[derive(Parser, Debug, Clone)]
#[group(skip)]
pub struct Cmd {
    #[command(flatten)]
    pub contract: ContractArgs,
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
    Serde(#[from] serde_json::Error),
}

impl Cmd {
    pub async fn run(&self) -> Result<(), Error> {
        let contract_id = self.contract.contract_id()?;
        let engine = self.contract.engine()?;
        let discovery = engine
            .discover(&contract_id, self.contract.choice()?)
            .await?;
        tracing::debug!(
            network = %discovery.network,
            methods = discovery.methods.len(),
            "discovered contract interface"
        );
        print_json(&discovery)?;
        Ok(())
    }
}
