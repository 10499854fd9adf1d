use std::{
    collections::HashMap,
    fmt::Display,
    str::FromStr,
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::{
    rpc::{self, Client, Rpc},
    utils,
};

pub mod passphrase {
    pub const FUTURENET: &str = "Test SDF Future Network ; October 2022";
    pub const TESTNET: &str = "Test SDF Network ; September 2015";
    pub const MAINNET: &str = "Public Global Stellar Network ; September 2015";
    pub const LOCAL: &str = "Standalone Network ; February 2017";
}

/// Networks probed by [`Registry::auto_detect`], in order.
pub const AUTO_DETECT_CANDIDATES: [NetworkId; 3] =
    [NetworkId::Futurenet, NetworkId::Testnet, NetworkId::Mainnet];

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),
    #[error("contract {0} was not found on futurenet, testnet or mainnet")]
    ContractNotFoundOnAnyNetwork(String),
    #[error("no networks configured")]
    NoNetworks,
    #[error(transparent)]
    Rpc(#[from] rpc::Error),
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Futurenet,
    Testnet,
    Mainnet,
    Local,
}

impl NetworkId {
    pub const ALL: [NetworkId; 4] = [
        NetworkId::Futurenet,
        NetworkId::Testnet,
        NetworkId::Mainnet,
        NetworkId::Local,
    ];

    pub fn name(self) -> &'static str {
        match self {
            NetworkId::Futurenet => "futurenet",
            NetworkId::Testnet => "testnet",
            NetworkId::Mainnet => "mainnet",
            NetworkId::Local => "local",
        }
    }
}

impl Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NetworkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "futurenet" => Ok(NetworkId::Futurenet),
            "testnet" => Ok(NetworkId::Testnet),
            "mainnet" | "public" | "pubnet" => Ok(NetworkId::Mainnet),
            "local" | "standalone" | "ephemeral" => Ok(NetworkId::Local),
            _ => Err(Error::UnsupportedNetwork(s.to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    pub id: NetworkId,
    /// RPC server endpoint
    pub rpc_url: String,
    /// Network passphrase used to sign transactions sent to the rpc server
    pub network_passphrase: String,
    pub explorer_url: String,
    /// Faucet endpoint; absent on networks where accounts must be funded by hand
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub friendbot_url: Option<String>,
}

impl NetworkProfile {
    pub fn contract_url(&self, contract_id: &[u8; 32]) -> String {
        format!(
            "{}/contract/{}",
            self.explorer_url.trim_end_matches('/'),
            utils::contract_strkey(contract_id)
        )
    }

    pub fn tx_url(&self, hash: &str) -> String {
        format!("{}/tx/{hash}", self.explorer_url.trim_end_matches('/'))
    }
}

pub fn default_profiles() -> &'static [NetworkProfile] {
    static PROFILES: OnceLock<Vec<NetworkProfile>> = OnceLock::new();

    PROFILES.get_or_init(|| {
        vec![
            NetworkProfile {
                id: NetworkId::Futurenet,
                rpc_url: "https://rpc-futurenet.stellar.org:443".to_string(),
                network_passphrase: passphrase::FUTURENET.to_string(),
                explorer_url: "https://stellar.expert/explorer/futurenet".to_string(),
                friendbot_url: Some("https://friendbot-futurenet.stellar.org".to_string()),
            },
            NetworkProfile {
                id: NetworkId::Testnet,
                rpc_url: "https://soroban-testnet.stellar.org".to_string(),
                network_passphrase: passphrase::TESTNET.to_string(),
                explorer_url: "https://stellar.expert/explorer/testnet".to_string(),
                friendbot_url: Some("https://friendbot.stellar.org".to_string()),
            },
            NetworkProfile {
                id: NetworkId::Mainnet,
                rpc_url: "https://soroban-rpc.mainnet.stellar.gateway.fm".to_string(),
                network_passphrase: passphrase::MAINNET.to_string(),
                explorer_url: "https://stellar.expert/explorer/public".to_string(),
                friendbot_url: None,
            },
            NetworkProfile {
                id: NetworkId::Local,
                rpc_url: "http://localhost:8000/soroban/rpc".to_string(),
                network_passphrase: passphrase::LOCAL.to_string(),
                explorer_url: "http://localhost:8000".to_string(),
                friendbot_url: Some("http://localhost:8000/friendbot".to_string()),
            },
        ]
    })
}

/// A profile together with the client that talks to it. Pipelines hold one of
/// these for their whole lifetime, so re-activating the registry never
/// changes the network of a call already in flight.
#[derive(Clone)]
pub struct Connection {
    pub profile: NetworkProfile,
    pub client: Arc<dyn Rpc>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

pub struct Registry {
    networks: HashMap<NetworkId, Connection>,
    active: RwLock<NetworkId>,
}

impl Registry {
    /// Builds one jsonrpsee client per profile.
    pub fn connect(profiles: &[NetworkProfile]) -> Result<Self, Error> {
        let clients = profiles
            .iter()
            .map(|p| {
                let client: Arc<dyn Rpc> = Arc::new(Client::new(&p.rpc_url)?);
                Ok((p.clone(), client))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Self::with_clients(clients)
    }

    /// The first profile given becomes the active one.
    pub fn with_clients(
        clients: impl IntoIterator<Item = (NetworkProfile, Arc<dyn Rpc>)>,
    ) -> Result<Self, Error> {
        let mut networks = HashMap::new();
        let mut first = None;
        for (profile, client) in clients {
            first.get_or_insert(profile.id);
            networks.insert(profile.id, Connection { profile, client });
        }
        let first = first.ok_or(Error::NoNetworks)?;
        Ok(Self {
            networks,
            active: RwLock::new(first),
        })
    }

    pub fn active(&self) -> NetworkId {
        *self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn activate(&self, id: NetworkId) -> Result<(), Error> {
        if !self.networks.contains_key(&id) {
            return Err(Error::UnsupportedNetwork(id.to_string()));
        }
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = id;
        tracing::debug!(network = %id, "activated network");
        Ok(())
    }

    pub fn resolve(&self, id: NetworkId) -> Result<Connection, Error> {
        self.networks
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::UnsupportedNetwork(id.to_string()))
    }

    /// Whether the contract's instance entry exists on the given network.
    pub async fn probe(&self, contract_id: &[u8; 32], id: NetworkId) -> Result<bool, Error> {
        let connection = self.resolve(id)?;
        let found = connection
            .client
            .get_contract_instance(contract_id)
            .await?
            .is_some();
        tracing::debug!(network = %id, found, "probed network for contract");
        Ok(found)
    }

    /// Activates and probes each candidate in turn. On failure the registry
    /// is left on the last network probed.
    pub async fn auto_detect(&self, contract_id: &[u8; 32]) -> Result<NetworkId, Error> {
        for id in AUTO_DETECT_CANDIDATES {
            if !self.networks.contains_key(&id) {
                continue;
            }
            self.activate(id)?;
            if self.probe(contract_id, id).await? {
                return Ok(id);
            }
        }
        Err(Error::ContractNotFoundOnAnyNetwork(
            utils::contract_strkey(contract_id),
        ))
    }
}
