//! Store-backed tenant registry.
//!
//! Tenant records live as JSON under `tenant:{id}`. A second entry,
//! `api_key:{sha256(key)}`, maps each API key's digest to its tenant id so
//! lookups never put the raw key into a store key.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::Utc;
use rand_core::{OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use tollgate_core::{
    TenantId, TenantProfile, TierCatalog, TierName, ValidationError, validate_custom_burst,
    validate_custom_rpm,
};
use tollgate_state::{KeyKind, StateKey, StateStore};

use crate::error::LimiterError;
use crate::resolver::TenantDirectory;

/// Prefix of every generated API key.
pub const API_KEY_PREFIX: &str = "sk_live_";

/// Random bytes behind each API key (hex-encoded after the prefix).
const API_KEY_RANDOM_BYTES: usize = 24;

/// Attempts at generating a key that no other tenant holds.
const MAX_KEY_ATTEMPTS: u32 = 5;

const MIN_NAME_CHARS: usize = 3;

/// Tier given to tenants created without one.
pub const DEFAULT_TIER: &str = "free";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^[^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*@([a-z0-9-]+\.)+[a-z]{2,}$"#,
    )
    .expect("email regex is valid")
});

/// Input for [`StoreTenantDirectory::create`].
#[derive(Debug, Clone, Default)]
pub struct NewTenant {
    pub name: String,
    pub email: Option<String>,
    /// Defaults to [`DEFAULT_TIER`].
    pub tier: Option<TierName>,
}

/// Partial update for [`StoreTenantDirectory::update`].
///
/// A `custom_rpm` or `custom_burst` of 0 clears that override.
#[derive(Debug, Clone, Default)]
pub struct TenantUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub tier: Option<TierName>,
    pub custom_rpm: Option<u32>,
    pub custom_burst: Option<u32>,
    pub is_active: Option<bool>,
}

impl TenantUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.tier.is_none()
            && self.custom_rpm.is_none()
            && self.custom_burst.is_none()
            && self.is_active.is_none()
    }
}

/// Criteria for [`StoreTenantDirectory::list`].
#[derive(Debug, Clone, Default)]
pub struct TenantFilter {
    pub tier: Option<TierName>,
    pub active: Option<bool>,
}

impl TenantFilter {
    fn matches(&self, tenant: &TenantProfile) -> bool {
        self.tier.as_ref().is_none_or(|tier| *tier == tenant.tier)
            && self.active.is_none_or(|active| active == tenant.is_active)
    }
}

/// Hash a raw API key to its index form (lowercase hex SHA-256).
pub fn hash_api_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a fresh `sk_live_` key from OS randomness.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_RANDOM_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{API_KEY_PREFIX}{}", hex::encode(bytes))
}

/// Hide all but the last four characters of an API key for display.
pub fn mask_api_key(api_key: &str) -> String {
    if api_key.len() < 12 || !api_key.is_char_boundary(api_key.len() - 4) {
        return "****".to_owned();
    }
    let prefix = api_key.get(..7).unwrap_or_default();
    let last4 = &api_key[api_key.len() - 4..];
    format!("{prefix}_****...{last4}")
}

fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidField {
            field: "name",
            reason: "name is required".to_owned(),
        });
    }
    if trimmed.chars().count() < MIN_NAME_CHARS {
        return Err(ValidationError::InvalidField {
            field: "name",
            reason: format!("name must be at least {MIN_NAME_CHARS} characters"),
        });
    }
    Ok(trimmed.to_owned())
}

fn validate_email(email: &str) -> Result<String, ValidationError> {
    let normalized = email.trim().to_lowercase();
    if EMAIL_RE.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(ValidationError::InvalidField {
            field: "email",
            reason: "invalid email format".to_owned(),
        })
    }
}

/// Tenant registry persisted in a [`StateStore`].
pub struct StoreTenantDirectory {
    store: Arc<dyn StateStore>,
    catalog: Arc<TierCatalog>,
}

impl StoreTenantDirectory {
    pub fn new(store: Arc<dyn StateStore>, catalog: Arc<TierCatalog>) -> Self {
        Self { store, catalog }
    }

    fn record_key(id: &TenantId) -> StateKey {
        StateKey::new(KeyKind::Tenant, id.as_str())
    }

    fn index_key(api_key: &str) -> StateKey {
        StateKey::new(KeyKind::ApiKey, hash_api_key(api_key))
    }

    async fn read(&self, id: &TenantId) -> Result<Option<TenantProfile>, LimiterError> {
        let key = Self::record_key(id);
        let Some(raw) = self
            .store
            .get(&key)
            .await
            .map_err(|e| LimiterError::store("read_tenant", e))?
        else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| LimiterError::Corrupt {
                key: key.canonical(),
                reason: e.to_string(),
            })
    }

    async fn write(&self, tenant: &TenantProfile) -> Result<(), LimiterError> {
        let key = Self::record_key(&tenant.id);
        let raw = serde_json::to_string(tenant).map_err(|e| LimiterError::Corrupt {
            key: key.canonical(),
            reason: e.to_string(),
        })?;
        self.store
            .set(&key, &raw, None)
            .await
            .map_err(|e| LimiterError::store("write_tenant", e))
    }

    /// Reserve a fresh API key for `id` in the key index.
    async fn reserve_api_key(&self, id: &TenantId) -> Result<String, LimiterError> {
        for _ in 0..MAX_KEY_ATTEMPTS {
            let api_key = generate_api_key();
            let reserved = self
                .store
                .check_and_set(&Self::index_key(&api_key), id.as_str(), None)
                .await
                .map_err(|e| LimiterError::store("reserve_api_key", e))?;
            if reserved {
                return Ok(api_key);
            }
            warn!(tenant_id = %id, "generated API key collided, retrying");
        }
        Err(LimiterError::ApiKeyCollision(MAX_KEY_ATTEMPTS))
    }

    /// Register a new tenant and issue its API key.
    #[instrument(name = "directory.create", skip_all)]
    pub async fn create(&self, new: NewTenant) -> Result<TenantProfile, LimiterError> {
        let name = validate_name(&new.name)?;
        let email = new
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .map(validate_email)
            .transpose()?;
        let tier = new.tier.unwrap_or_else(|| TierName::from(DEFAULT_TIER));
        self.catalog.require(&tier)?;

        let id = TenantId::from(format!("tenant_{}", uuid::Uuid::now_v7().simple()));
        let api_key = self.reserve_api_key(&id).await?;

        let now = Utc::now();
        let tenant = TenantProfile {
            id,
            api_key,
            name,
            email,
            tier,
            custom_rpm: None,
            custom_burst: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.write(&tenant).await {
            // Drop the reserved index entry so it does not dangle.
            if let Err(rollback) = self.store.delete(&Self::index_key(&tenant.api_key)).await {
                warn!(
                    tenant_id = %tenant.id,
                    error = %rollback,
                    "failed to remove API key index entry after a failed create; entry is dangling"
                );
            }
            return Err(e);
        }

        info!(tenant_id = %tenant.id, tier = %tenant.tier, "tenant created");
        Ok(tenant)
    }

    /// Fetch a tenant by id.
    pub async fn get(&self, id: &TenantId) -> Result<TenantProfile, LimiterError> {
        self.read(id)
            .await?
            .ok_or_else(|| LimiterError::TenantNotFound(id.clone()))
    }

    /// Apply a partial update. Tier and override changes take effect on the
    /// tenant's next request, which re-provisions its bucket.
    #[instrument(name = "directory.update", skip_all, fields(tenant_id = %id))]
    pub async fn update(
        &self,
        id: &TenantId,
        update: TenantUpdate,
    ) -> Result<TenantProfile, LimiterError> {
        if update.is_empty() {
            return Err(ValidationError::InvalidField {
                field: "update",
                reason: "at least one field to update must be provided".to_owned(),
            }
            .into());
        }

        let mut tenant = self.get(id).await?;

        if let Some(name) = update.name {
            tenant.name = validate_name(&name)?;
        }
        if let Some(email) = update.email {
            tenant.email = if email.trim().is_empty() {
                None
            } else {
                Some(validate_email(&email)?)
            };
        }
        if let Some(tier) = update.tier {
            self.catalog.require(&tier)?;
            tenant.tier = tier;
        }
        if let Some(rpm) = update.custom_rpm {
            validate_custom_rpm(rpm)?;
            tenant.custom_rpm = (rpm > 0).then_some(rpm);
        }
        if let Some(burst) = update.custom_burst {
            validate_custom_burst(burst)?;
            tenant.custom_burst = (burst > 0).then_some(burst);
        }
        if let Some(active) = update.is_active {
            tenant.is_active = active;
        }
        tenant.updated_at = Utc::now();

        self.write(&tenant).await?;
        info!(tier = %tenant.tier, active = tenant.is_active, "tenant updated");
        Ok(tenant)
    }

    /// Remove a tenant and its API key.
    #[instrument(name = "directory.delete", skip_all, fields(tenant_id = %id))]
    pub async fn delete(&self, id: &TenantId) -> Result<(), LimiterError> {
        let tenant = self.get(id).await?;
        self.store
            .delete(&Self::index_key(&tenant.api_key))
            .await
            .map_err(|e| LimiterError::store("delete_tenant", e))?;
        self.store
            .delete(&Self::record_key(id))
            .await
            .map_err(|e| LimiterError::store("delete_tenant", e))?;
        info!("tenant deleted");
        Ok(())
    }

    /// All tenants matching `filter`, oldest first.
    ///
    /// Records that fail to decode are logged and skipped.
    pub async fn list(&self, filter: &TenantFilter) -> Result<Vec<TenantProfile>, LimiterError> {
        let ids = self
            .store
            .scan_keys(KeyKind::Tenant, None)
            .await
            .map_err(|e| LimiterError::store("list_tenants", e))?;

        let mut tenants = Vec::with_capacity(ids.len());
        for id in ids {
            match self.read(&TenantId::from(id)).await {
                Ok(Some(tenant)) if filter.matches(&tenant) => tenants.push(tenant),
                Ok(_) => {}
                Err(e @ LimiterError::Corrupt { .. }) => warn!(error = %e, "skipping tenant record"),
                Err(e) => return Err(e),
            }
        }
        tenants.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tenants)
    }
}

#[async_trait]
impl TenantDirectory for StoreTenantDirectory {
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<TenantProfile>, LimiterError> {
        let Some(id) = self
            .store
            .get(&Self::index_key(api_key))
            .await
            .map_err(|e| LimiterError::store("find_by_api_key", e))?
        else {
            return Ok(None);
        };

        let tenant = self.read(&TenantId::from(id)).await?;
        Ok(tenant.filter(|t| {
            let owned = t.api_key == api_key;
            if !owned {
                warn!(tenant_id = %t.id, "API key index points at a tenant with a different key");
            }
            owned
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_expected_shape() {
        let key = generate_api_key();
        assert!(key.starts_with(API_KEY_PREFIX));
        assert_eq!(key.len(), API_KEY_PREFIX.len() + API_KEY_RANDOM_BYTES * 2);
        assert!(key[API_KEY_PREFIX.len()..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, generate_api_key());
    }

    #[test]
    fn hash_is_stable_hex_sha256() {
        let hash = hash_api_key("sk_live_abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_api_key("sk_live_abc"));
        assert_ne!(hash, hash_api_key("sk_live_abd"));
    }

    #[test]
    fn mask_keeps_prefix_and_last_four() {
        assert_eq!(mask_api_key("sk_live_0123456789abcdef"), "sk_live_****...cdef");
        assert_eq!(mask_api_key("short"), "****");
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("").is_err());
        assert!(validate_name("ab").is_err());
        assert_eq!(validate_name("  Acme  ").unwrap(), "Acme");
    }

    #[test]
    fn email_validation() {
        assert_eq!(validate_email("Ops@Example.COM").unwrap(), "ops@example.com");
        assert!(validate_email("first.last@sub.example.io").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a b@example.com").is_err());
    }

    #[test]
    fn filter_matches_tier_and_activity() {
        let now = Utc::now();
        let tenant = TenantProfile {
            id: TenantId::from("tenant_1"),
            api_key: "k".into(),
            name: "Acme".into(),
            email: None,
            tier: TierName::from("premium"),
            custom_rpm: None,
            custom_burst: None,
            is_active: false,
            created_at: now,
            updated_at: now,
        };
        assert!(TenantFilter::default().matches(&tenant));
        assert!(
            TenantFilter {
                tier: Some(TierName::from("premium")),
                active: Some(false),
            }
            .matches(&tenant)
        );
        assert!(
            !TenantFilter {
                tier: Some(TierName::from("free")),
                active: None,
            }
            .matches(&tenant)
        );
    }
}
