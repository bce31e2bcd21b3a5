//! vcissuer root library
//!
//! Wires the subsystems into one `IssuerService`:
//!
//! - credential storage: blind index + AES-GCM envelope + vault gateway,
//!   with duplicate reconciliation on read
//! - status lists: shard slots claimed by compare-and-swap, safe across
//!   processes sharing one store
//! - issuance: profiles, option decoding, status attachment and signing
//!
//! Every collaborator shares one record store. Deployment key material sits
//! in a second store so that whoever holds the vault documents cannot
//! recompute blind indexes or open envelopes. `IssuerService::open` uses two
//! SQLite files under the configured data directory; `with_stores` accepts
//! any pair.

pub mod config;
pub mod error;

pub use config::{IndexConfig, RootConfig, SigningConfig, StatusConfig};
pub use error::{ErrorKind, RootError, RootResult};

use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use vcissuer_core::{KeyHandle, LogicalId, RecordStore, VaultId};
use vcissuer_issue::{
    ComposeCredentialRequest, Credential, Ed25519CredentialSigner, IssuanceOrchestrator,
    IssueCredentialOptions, IssueError, Profile, ProfileRequest, ProfileStore, RecordProfileStore,
};
use vcissuer_status::{SlotRef, StatusListAllocator, StatusListShard, StatusSlot};
use vcissuer_vault::envelope::AesGcmEnvelopeCipher;
use vcissuer_vault::gateway::LocalVaultGateway;
use vcissuer_vault::key_hierarchy::DeploymentKeys;
use vcissuer_vault::mac::HmacMacService;
use vcissuer_vault::storage::SqliteStore;
use vcissuer_vault::{BlindIndexer, CredentialVault, VaultError};

const BLIND_INDEX_KEY: &str = "blind-index";

pub struct IssuerService {
    config: RootConfig,
    vault: CredentialVault,
    allocator: Arc<StatusListAllocator>,
    profiles: Arc<dyn ProfileStore>,
    signer: Arc<Ed25519CredentialSigner>,
    orchestrator: IssuanceOrchestrator,
}

fn path_str(path: &std::path::Path) -> RootResult<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| RootError::Internal(format!("data path not valid UTF-8: {}", path.display())))
}

impl IssuerService {
    /// Open the service over the SQLite databases in `config.data_dir`.
    pub fn open(config: RootConfig) -> RootResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            RootError::Internal(format!(
                "failed to create data directory {}: {}",
                config.data_dir.display(),
                e
            ))
        })?;
        let records = Arc::new(SqliteStore::open(&path_str(&config.database_path())?)?);

        let keystore_path = config.keystore_path();
        let keys = SqliteStore::open(&path_str(&keystore_path)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&keystore_path, perms);
        }

        Self::with_stores(config, records, &keys)
    }

    /// Build the service over arbitrary stores: `store` for documents,
    /// shards and profiles, `keys` for the deployment root key only.
    pub fn with_stores(
        config: RootConfig,
        store: Arc<dyn RecordStore>,
        keys: &dyn RecordStore,
    ) -> RootResult<Self> {
        config.validate()?;

        let keys = DeploymentKeys::load_or_create(keys)?;

        let index_key = KeyHandle::new(BLIND_INDEX_KEY);
        let mac = Arc::new(HmacMacService::with_key(
            index_key.clone(),
            keys.blind_index_key()?,
        ));
        let indexer = Arc::new(BlindIndexer::new(mac, index_key, &config.index.family)?);
        let cipher = Arc::new(AesGcmEnvelopeCipher::new(keys.envelope_key()?));
        let gateway = Arc::new(LocalVaultGateway::new(store.clone(), config.host_url.clone()));
        let vault = CredentialVault::new(gateway, cipher, indexer);

        let allocator = Arc::new(StatusListAllocator::open(
            store.clone(),
            config.status_base_url(),
            config.status.capacity,
        )?);
        let signer = Arc::new(Ed25519CredentialSigner::from_seed(
            keys.issuer_signing_seed()?,
        ));
        let profiles: Arc<dyn ProfileStore> = Arc::new(RecordProfileStore::new(store));
        let orchestrator = IssuanceOrchestrator::new(allocator.clone(), signer.clone())
            .with_status_context(config.status.context.clone())
            .with_default_representation(config.signing.default_representation.clone());

        info!(
            host_url = %config.host_url,
            issuer = %signer.did(),
            capacity = config.status.capacity,
            "issuer service ready"
        );

        Ok(Self {
            config,
            vault,
            allocator,
            profiles,
            signer,
            orchestrator,
        })
    }

    pub fn config(&self) -> &RootConfig {
        &self.config
    }

    /// The deployment's own `did:key`, used for profiles that name no DID.
    pub fn issuer_did(&self) -> String {
        self.signer.did()
    }

    pub fn signer(&self) -> &Ed25519CredentialSigner {
        &self.signer
    }

    // -----------------------------------------------------------------------
    // Status lists
    // -----------------------------------------------------------------------

    pub fn allocate_status_slot(&self) -> RootResult<StatusSlot> {
        Ok(self.allocator.allocate()?)
    }

    pub fn get_status_shard(&self, shard_id: &str) -> RootResult<StatusListShard> {
        Ok(self.allocator.get(shard_id)?)
    }

    pub fn update_status_slot(&self, slot: &SlotRef, status: &str, reason: &str) -> RootResult<()> {
        Ok(self.allocator.update(slot, status, reason)?)
    }

    // -----------------------------------------------------------------------
    // Credential storage
    // -----------------------------------------------------------------------

    /// Store `content` under `logical_id` in the vault of profile `vault`.
    /// Returns the document location.
    pub fn store_credential(
        &self,
        content: &str,
        logical_id: &str,
        vault: &str,
    ) -> RootResult<String> {
        Ok(self
            .vault
            .store_credential(content, &LogicalId::new(logical_id), &VaultId::new(vault))?)
    }

    pub fn retrieve_credential(&self, logical_id: &str, vault: &str) -> RootResult<Vec<u8>> {
        Ok(self
            .vault
            .retrieve_credential(&LogicalId::new(logical_id), &VaultId::new(vault))?)
    }

    /// Store a credential under its own `id`.
    pub fn store_verifiable_credential(&self, vault: &str, credential: &str) -> RootResult<String> {
        let value: Value = serde_json::from_str(credential).map_err(|e| {
            VaultError::InvalidInput(format!("failed to parse credential: {}", e))
        })?;
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| VaultError::InvalidInput("missing verifiable credential ID".into()))?;
        self.store_credential(credential, id, vault)
    }

    // -----------------------------------------------------------------------
    // Profiles
    // -----------------------------------------------------------------------

    pub fn create_profile(&self, request: ProfileRequest) -> RootResult<Profile> {
        let profile = Profile::from_request(request, &self.signer.did(), &self.signer.key_id())?;
        self.profiles.create_profile(&profile)?;
        Ok(profile)
    }

    pub fn get_profile(&self, name: &str) -> RootResult<Profile> {
        Ok(self.profiles.get_profile(name)?)
    }

    // -----------------------------------------------------------------------
    // Issuance
    // -----------------------------------------------------------------------

    pub fn issue(
        &self,
        profile: &str,
        credential: &[u8],
        options: Option<&IssueCredentialOptions>,
    ) -> RootResult<Credential> {
        let profile = self.profiles.get_profile(profile)?;
        let credential = Credential::parse(credential)?;
        Ok(self.orchestrator.issue(&profile, credential, options)?)
    }

    pub fn compose_and_issue(
        &self,
        profile: &str,
        request: &ComposeCredentialRequest,
    ) -> RootResult<Credential> {
        let profile = self.profiles.get_profile(profile)?;
        Ok(self.orchestrator.compose_and_issue(&profile, request)?)
    }

    /// Set the status of the slot a previously issued credential refers to.
    pub fn update_credential_status(
        &self,
        profile: &str,
        credential: &[u8],
        status: &str,
        reason: &str,
    ) -> RootResult<()> {
        let profile = self.profiles.get_profile(profile)?;
        let credential: Credential = serde_json::from_slice(credential).map_err(|e| {
            IssueError::InvalidInput(format!("failed to parse credential: {}", e))
        })?;
        Ok(self
            .orchestrator
            .update_credential_status(&profile, &credential, status, reason)?)
    }
}
