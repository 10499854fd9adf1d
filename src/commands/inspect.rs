use std::{fmt::Debug, path::PathBuf};

use clap::{Parser, ValueEnum};

use super::print_json;
use crate::contractspec::{self, ContractMeta, ContractSpec};

#[derive(Parser, Debug, Clone)]
#[group(skip)]
pub struct Cmd {
    /// Path to wasm binary
    #[arg(long)]
    pub wasm: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = SpecOutput::Docs)]
    pub output: SpecOutput,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SpecOutput {
    /// Readable listing of the metadata and spec entries
    #[default]
    Docs,
    /// Decoded spec entries as JSON
    Json,
    /// Raw spec section in base64
    XdrBase64,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("reading file {filepath}: {error}")]
    CannotReadContractFile {
        filepath: PathBuf,
        error: std::io::Error,
    },
    #[error("cannot parse wasm file {file}: {error}")]
    CannotParseWasm {
        file: PathBuf,
        error: contractspec::Error,
    },
    #[error("missing spec for {0:?}")]
    MissingSpec(PathBuf),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl Cmd {
    pub fn run(&self) -> Result<(), Error> {
        tracing::debug!("File: {}", self.wasm.to_string_lossy());
        let contents = std::fs::read(&self.wasm).map_err(|e| Error::CannotReadContractFile {
            filepath: self.wasm.clone(),
            error: e,
        })?;
        let spec = ContractSpec::new(&contents).map_err(|e| self.invalid(e))?;
        match self.output {
            SpecOutput::Docs => {
                let meta = ContractMeta::new(&contents).map_err(|e| self.invalid(e))?;
                println!("{meta}{spec}");
            }
            SpecOutput::Json => print_json(&spec.spec)?,
            SpecOutput::XdrBase64 => match spec.spec_base64 {
                Some(base64) => println!("{base64}"),
                None => return Err(Error::MissingSpec(self.wasm.clone())),
            },
        }
        Ok(())
    }

    fn invalid(&self, error: contractspec::Error) -> Error {
        Error::CannotParseWasm {
            file: self.wasm.clone(),
            error,
        }
    }
}
