use clap::Parser;
use serde::Serialize;
use serde_json::Value;

use super::{parse_param, print_json, ContractArgs};
use crate::{
    abi::MethodDescriptor,
    config, engine,
    marshal::InvocationParam,
    network::NetworkId,
    strval, utils,
    xdr::{self, Limits, WriteXdr},
};

#[derive(Parser, Debug, Clone)]
#[group(skip)]
pub struct Cmd {
    #[command(flatten)]
    pub contract: ContractArgs,

    /// Method to marshal arguments for
    #[arg(long = "fn")]
    pub function: String,

    /// Parameter as name=value; repeat for each input
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<InvocationParam>,
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
    Xdr(#[from] xdr::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct Output {
    network: NetworkId,
    method: MethodDescriptor,
    args: Vec<Arg>,
}

#[derive(Serialize)]
struct Arg {
    name: String,
    value: Value,
    xdr: String,
}

impl Cmd {
    pub async fn run(&self) -> Result<(), Error> {
        let contract_id = self.contract.contract_id()?;
        let engine = self.contract.engine()?;
        let generated = engine
            .generate_args(
                &contract_id,
                self.contract.choice()?,
                &self.function,
                &self.params,
            )
            .await?;
        let args = generated
            .method
            .inputs
            .iter()
            .zip(&generated.args)
            .map(|(input, arg)| {
                Ok(Arg {
                    name: input.name.clone(),
                    value: strval::to_json(arg),
                    xdr: arg.to_xdr_base64(Limits::none())?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        print_json(&Output {
            network: generated.network,
            method: generated.method,
            args,
        })?;
        Ok(())
    }
}
