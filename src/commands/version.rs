use clap::Parser;
use std::fmt::Debug;

const GIT_REVISION: &str = env!("GIT_REVISION");

#[derive(Parser, Debug, Clone)]
#[group(skip)]
pub struct Cmd;

impl Cmd {
    #[allow(clippy::unused_self)]
    pub fn run(&self) {
        println!("soroban-invoker {}", long());
    }
}

pub fn short() -> String {
    format!("{} ({GIT_REVISION})", env!("CARGO_PKG_VERSION"))
}

pub fn long() -> String {
    let xdr = stellar_xdr::VERSION;
    [
        short(),
        format!("stellar-xdr {} ({})", xdr.pkg, xdr.rev),
        format!("xdr curr ({})", xdr.xdr_curr),
    ]
    .join("\n")
}
