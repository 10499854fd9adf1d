use std::str::FromStr;

use clap::{CommandFactory, FromArgMatches, Parser};

use crate::{
    config,
    engine::{Engine, NetworkChoice},
    utils,
};

pub mod args;
pub mod inspect;
pub mod invoke;
pub mod methods;
pub mod networks;
pub mod version;

pub const HEADING_GLOBAL: &str = "Options (Global)";

#[derive(Parser, Debug)]
#[command(
    name = "soroban-invoker",
    version = Box::leak(Box::new(version::short())).as_str(),
    long_version = Box::leak(Box::new(version::long())).as_str(),
    about = "Discover, marshal and invoke Soroban contract functions",
    disable_help_subcommand = true,
)]
pub struct Root {
    #[command(flatten)]
    pub global_args: Global,

    #[command(subcommand)]
    pub cmd: Cmd,
}

impl Root {
    pub fn new() -> Result<Self, clap::Error> {
        let mut matches = Self::command().get_matches();
        Self::from_arg_matches_mut(&mut matches)
    }

    pub fn from_arg_matches<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::from_arg_matches_mut(&mut Self::command().try_get_matches_from(itr)?)
    }

    pub async fn run(&self) -> Result<(), Error> {
        match &self.cmd {
            Cmd::Methods(cmd) => cmd.run().await?,
            Cmd::Args(cmd) => cmd.run().await?,
            Cmd::Invoke(cmd) => cmd.run().await?,
            Cmd::Inspect(cmd) => cmd.run()?,
            Cmd::Networks(cmd) => cmd.run()?,
            Cmd::Version(cmd) => cmd.run(),
        };
        Ok(())
    }
}

impl FromStr for Root {
    type Err = clap::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_arg_matches(std::iter::once("soroban-invoker").chain(s.split_whitespace()))
    }
}

#[derive(Debug, clap::Args, Clone, Default)]
#[group(skip)]
pub struct Global {
    /// Filter logs output, e.g. `soroban_invoker::invoke=trace`. Can also use env var `RUST_LOG`.
    #[arg(long, short = 'f', global = true, help_heading = HEADING_GLOBAL)]
    pub filter_logs: Vec<String>,

    /// Do not write logs to stderr
    #[arg(long, short = 'q', global = true, help_heading = HEADING_GLOBAL)]
    pub quiet: bool,

    /// Log DEBUG events
    #[arg(long, short = 'v', global = true, help_heading = HEADING_GLOBAL)]
    pub verbose: bool,

    /// Log DEBUG and TRACE events
    #[arg(long, visible_alias = "vv", global = true, help_heading = HEADING_GLOBAL)]
    pub very_verbose: bool,
}

impl Global {
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.quiet {
            None
        } else if self.very_verbose {
            Some(tracing::Level::TRACE)
        } else if self.verbose {
            Some(tracing::Level::DEBUG)
        } else {
            Some(tracing::Level::INFO)
        }
    }
}

#[derive(Parser, Debug)]
pub enum Cmd {
    /// List the callable methods of a deployed contract
    Methods(methods::Cmd),
    /// Marshal parameters into the XDR arguments of a method
    Args(args::Cmd),
    /// Sign, submit and wait for a contract call
    Invoke(invoke::Cmd),
    /// Decode the contract spec of a local WASM file
    Inspect(inspect::Cmd),
    /// Print the configured network profiles
    Networks(networks::Cmd),
    /// Print version information
    Version(version::Cmd),
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Methods(#[from] methods::Error),
    #[error(transparent)]
    Args(#[from] args::Error),
    #[error(transparent)]
    Invoke(#[from] invoke::Error),
    #[error(transparent)]
    Inspect(#[from] inspect::Error),
    #[error(transparent)]
    Networks(#[from] networks::Error),
}

/// Contract and network selection shared by the commands that talk to RPC.
#[derive(Debug, clap::Args, Clone)]
#[group(skip)]
pub struct ContractArgs {
    /// Contract ID, as a C... strkey or hex
    #[arg(long = "id", env = "SOROBAN_CONTRACT_ID")]
    pub contract_id: String,

    #[command(flatten)]
    pub network: config::Args,
}

impl ContractArgs {
    pub fn contract_id(&self) -> Result<[u8; 32], utils::Error> {
        utils::contract_id_from_str(&self.contract_id)
    }

    pub fn choice(&self) -> Result<NetworkChoice, config::Error> {
        self.network.choice()
    }

    pub fn engine(&self) -> Result<Engine, config::Error> {
        Ok(Engine::new(self.network.registry()?))
    }
}

/// Parses `name=value`, splitting at the first `=`.
pub fn parse_param(s: &str) -> Result<crate::marshal::InvocationParam, String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {s:?}"))?;
    if name.is_empty() {
        return Err(format!("missing parameter name in {s:?}"));
    }
    Ok(crate::marshal::InvocationParam::new(name, value))
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
