use ed25519_dalek::Signer as _;
use sha2::{Digest, Sha256};

use crate::xdr::{
    self, DecoratedSignature, Limits, Signature, SignatureHint, Transaction, TransactionEnvelope,
    TransactionSignaturePayload, TransactionSignaturePayloadTaggedTransaction,
    TransactionV1Envelope, WriteXdr,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(#[from] stellar_strkey::DecodeError),
    #[error(transparent)]
    Xdr(#[from] xdr::Error),
}

/// Calculate the hash of a Transaction
pub fn transaction_hash(txn: &Transaction, network_passphrase: &str) -> Result<[u8; 32], Error> {
    let signature_payload = TransactionSignaturePayload {
        network_id: network_hash(network_passphrase),
        tagged_transaction: TransactionSignaturePayloadTaggedTransaction::Tx(txn.clone()),
    };
    Ok(Sha256::digest(signature_payload.to_xdr(Limits::none())?).into())
}

pub(crate) fn network_hash(network_passphrase: &str) -> xdr::Hash {
    xdr::Hash(Sha256::digest(network_passphrase.as_bytes()).into())
}

/// Signs transactions on behalf of one ed25519 account. Signing is local and
/// never touches the network.
pub trait Signer: Send + Sync {
    fn public_key(&self) -> stellar_strkey::ed25519::PublicKey;

    /// Sign an arbitrary byte array
    fn sign_blob(&self, blob: &[u8]) -> Vec<u8>;

    fn sign_txn_hash(&self, hash: [u8; 32]) -> Result<DecoratedSignature, Error> {
        let public_key = self.public_key();
        tracing::debug!("{} signing hash {}", public_key, hex::encode(hash));
        let mut hint = [0u8; 4];
        hint.copy_from_slice(&public_key.0[28..]);
        Ok(DecoratedSignature {
            hint: SignatureHint(hint),
            signature: Signature(self.sign_blob(&hash).try_into()?),
        })
    }

    /// Wraps the transaction in a V1 envelope carrying this signer's signature.
    fn sign_txn(
        &self,
        txn: &Transaction,
        network_passphrase: &str,
    ) -> Result<TransactionEnvelope, Error> {
        let hash = transaction_hash(txn, network_passphrase)?;
        let signature = self.sign_txn_hash(hash)?;
        Ok(TransactionEnvelope::Tx(TransactionV1Envelope {
            tx: txn.clone(),
            signatures: vec![signature].try_into()?,
        }))
    }
}

pub struct LocalKey {
    key: ed25519_dalek::SigningKey,
}

impl LocalKey {
    pub fn new(key: ed25519_dalek::SigningKey) -> Self {
        Self { key }
    }

    /// Parses an `S...` secret seed.
    pub fn from_secret(secret: &str) -> Result<Self, Error> {
        let seed = stellar_strkey::ed25519::PrivateKey::from_string(secret)?;
        Ok(Self::new(ed25519_dalek::SigningKey::from_bytes(&seed.0)))
    }
}

impl std::fmt::Debug for LocalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKey")
            .field("public_key", &self.public_key().to_string())
            .finish_non_exhaustive()
    }
}

impl Signer for LocalKey {
    fn public_key(&self) -> stellar_strkey::ed25519::PublicKey {
        stellar_strkey::ed25519::PublicKey(self.key.verifying_key().to_bytes())
    }

    fn sign_blob(&self, blob: &[u8]) -> Vec<u8> {
        self.key.sign(blob).to_bytes().to_vec()
    }
}
