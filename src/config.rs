use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{
    engine::NetworkChoice,
    invoke::PollConfig,
    network::{self, default_profiles, NetworkId, NetworkProfile, Registry},
    signer::{self, LocalKey},
};

pub const HEADING_RPC: &str = "Options (RPC)";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Network(#[from] network::Error),
    #[error("cannot read config file {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("cannot parse config file {path}: {error}")]
    Toml {
        path: PathBuf,
        error: toml::de::Error,
    },
    #[error("--rpc-url and --network-passphrase need an explicit --network")]
    OverrideNeedsNetwork,
    #[error("please provide a secret key; use --secret-key or set SOROBAN_SECRET_KEY")]
    MissingSecretKey,
    #[error(transparent)]
    Signer(#[from] signer::Error),
}

/// Per-network overrides read from a TOML file:
///
/// ```toml
/// [networks.testnet]
/// rpc_url = "http://localhost:8000/soroban/rpc"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub networks: HashMap<String, ProfileOverride>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProfileOverride {
    pub rpc_url: Option<String>,
    pub network_passphrase: Option<String>,
    pub explorer_url: Option<String>,
    pub friendbot_url: Option<String>,
}

impl ProfileOverride {
    fn apply(&self, profile: &mut NetworkProfile) {
        if let Some(url) = &self.rpc_url {
            profile.rpc_url = url.clone();
        }
        if let Some(passphrase) = &self.network_passphrase {
            profile.network_passphrase = passphrase.clone();
        }
        if let Some(url) = &self.explorer_url {
            profile.explorer_url = url.clone();
        }
        if let Some(url) = &self.friendbot_url {
            profile.friendbot_url = Some(url.clone());
        }
    }
}

impl ConfigFile {
    pub fn read(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path).map_err(|error| Error::Io {
            path: path.to_path_buf(),
            error,
        })?;
        toml::from_str(&contents).map_err(|error| Error::Toml {
            path: path.to_path_buf(),
            error,
        })
    }
}

#[derive(Debug, clap::Args, Clone, Default)]
#[group(skip)]
pub struct Args {
    /// Network to use: auto, futurenet, testnet, mainnet or local
    #[arg(long, default_value = "auto", env = "SOROBAN_NETWORK", help_heading = HEADING_RPC)]
    pub network: String,

    /// RPC server endpoint for the selected network
    #[arg(long = "rpc-url", env = "SOROBAN_RPC_URL", help_heading = HEADING_RPC)]
    pub rpc_url: Option<String>,

    /// Network passphrase for the selected network
    #[arg(
        long = "network-passphrase",
        env = "SOROBAN_NETWORK_PASSPHRASE",
        help_heading = HEADING_RPC
    )]
    pub network_passphrase: Option<String>,

    /// TOML file with per-network overrides
    #[arg(long, env = "SOROBAN_INVOKER_CONFIG", help_heading = HEADING_RPC)]
    pub config: Option<PathBuf>,
}

impl Args {
    pub fn choice(&self) -> Result<NetworkChoice, Error> {
        Ok(self.network.parse()?)
    }

    /// Built-in profiles with the config file and then the flags applied.
    pub fn profiles(&self) -> Result<Vec<NetworkProfile>, Error> {
        let mut profiles = default_profiles().to_vec();

        if let Some(path) = &self.config {
            let file = ConfigFile::read(path)?;
            for (name, o) in &file.networks {
                let id: NetworkId = name.parse()?;
                if let Some(profile) = profiles.iter_mut().find(|p| p.id == id) {
                    o.apply(profile);
                }
            }
        }

        if self.rpc_url.is_some() || self.network_passphrase.is_some() {
            let NetworkChoice::Network(id) = self.choice()? else {
                return Err(Error::OverrideNeedsNetwork);
            };
            let o = ProfileOverride {
                rpc_url: self.rpc_url.clone(),
                network_passphrase: self.network_passphrase.clone(),
                ..Default::default()
            };
            if let Some(profile) = profiles.iter_mut().find(|p| p.id == id) {
                o.apply(profile);
            }
        }

        Ok(profiles)
    }

    pub fn registry(&self) -> Result<Registry, Error> {
        Ok(Registry::connect(&self.profiles()?)?)
    }
}

#[derive(Debug, clap::Args, Clone, Default)]
#[group(skip)]
pub struct SignerArgs {
    /// Secret key (S...) of the account that signs and pays for the call
    #[arg(
        long = "secret-key",
        env = "SOROBAN_SECRET_KEY",
        hide_env_values = true
    )]
    pub secret_key: Option<String>,
}

impl SignerArgs {
    pub fn key(&self) -> Result<LocalKey, Error> {
        let secret = self.secret_key.as_deref().ok_or(Error::MissingSecretKey)?;
        Ok(LocalKey::from_secret(secret)?)
    }
}

#[derive(Debug, clap::Args, Clone)]
#[group(skip)]
pub struct PollArgs {
    /// Seconds between transaction status checks
    #[arg(long = "poll-interval", default_value = "1")]
    pub poll_interval: u64,

    /// Status checks before giving up; 0 waits forever
    #[arg(long = "max-polls", default_value = "60")]
    pub max_polls: u32,
}

impl From<&PollArgs> for PollConfig {
    fn from(args: &PollArgs) -> Self {
        PollConfig {
            interval: Duration::from_secs(args.poll_interval),
            max_attempts: (args.max_polls > 0).then_some(args.max_polls),
        }
    }
}
