pub use stellar_xdr::curr as xdr;

pub mod abi;
pub mod commands;
pub mod config;
pub mod contractspec;
pub mod engine;
pub mod invoke;
pub mod marshal;
pub mod network;
pub mod outcome;
pub mod rpc;
pub mod signer;
pub mod strval;
pub mod utils;

pub use engine::{Engine, NetworkChoice};
