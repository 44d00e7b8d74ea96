//! Device and guest-user provisioning.
//!
//! Both strategies first make sure the installation has a persisted
//! `DeviceId`; they differ in whether the backend is consulted before a
//! cached `UserId` is trusted.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use rand::Rng;

use psy_core::model::{DeviceId, UserId};
use storage::repository::{KeyValueStore, keys};

use crate::Clock;
use crate::api::{NewGuestUser, PsychologyApi};
use crate::config::IdentityPolicy;
use crate::error::IdentityError;

/// Resolves the backend user the current device acts as.
#[async_trait]
pub trait IdentityProvisioner: Send + Sync {
    /// Return the device's user id, creating device and backend state as needed.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Creation` when a guest user has to be created and
    /// the backend refuses, or `IdentityError::Storage` for local storage failures.
    async fn resolve_user_id(&self) -> Result<UserId, IdentityError>;

    fn policy(&self) -> IdentityPolicy;
}

/// Build the provisioner selected by `policy`.
#[must_use]
pub fn provisioner_for(
    policy: IdentityPolicy,
    registry: DeviceRegistry,
) -> Arc<dyn IdentityProvisioner> {
    match policy {
        IdentityPolicy::ServerReconciling => Arc::new(ServerReconcilingProvisioner::new(registry)),
        IdentityPolicy::LocalCacheFirst => Arc::new(LocalCacheFirstProvisioner::new(registry)),
    }
}

/// Local identity state plus guest registration, shared by both strategies.
#[derive(Clone)]
pub struct DeviceRegistry {
    clock: Clock,
    store: Arc<dyn KeyValueStore>,
    api: Arc<dyn PsychologyApi>,
    platform_device_id: Option<String>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new(clock: Clock, store: Arc<dyn KeyValueStore>, api: Arc<dyn PsychologyApi>) -> Self {
        Self {
            clock,
            store,
            api,
            platform_device_id: None,
        }
    }

    /// Prefer a platform-provided installation id over a generated token.
    #[must_use]
    pub fn with_platform_device_id(mut self, id: Option<String>) -> Self {
        self.platform_device_id = id;
        self
    }

    /// Read the persisted device id, generating and persisting one if absent.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Storage` if the store cannot be read or written.
    pub async fn ensure_device_id(&self) -> Result<DeviceId, IdentityError> {
        if let Some(raw) = self.store.get(keys::DEVICE_ID).await? {
            match DeviceId::new(raw) {
                Ok(id) => return Ok(id),
                Err(err) => warn!("ignoring stored device id: {err}"),
            }
        }

        let id = self
            .platform_device_id
            .as_deref()
            .and_then(|raw| DeviceId::new(raw).ok())
            .unwrap_or_else(|| DeviceId::from_timestamp(self.clock.now()));
        self.store.set(keys::DEVICE_ID, id.as_str()).await?;
        info!("registered device id {id}");
        Ok(id)
    }

    /// Cached user id, if one is stored and parses.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Storage` if the store cannot be read.
    pub async fn cached_user_id(&self) -> Result<Option<UserId>, IdentityError> {
        let Some(raw) = self.store.get(keys::USER_ID).await? else {
            return Ok(None);
        };
        match raw.parse::<UserId>() {
            Ok(id) if id.value() >= 1 => Ok(Some(id)),
            _ => {
                warn!("ignoring unusable cached user id {raw:?}");
                Ok(None)
            }
        }
    }

    async fn remember_user(&self, user_id: UserId) -> Result<(), IdentityError> {
        self.store.set(keys::USER_ID, &user_id.to_string()).await?;
        Ok(())
    }

    /// Create a guest user bound to `device_id` and cache its id.
    async fn register_guest(&self, device_id: DeviceId) -> Result<UserId, IdentityError> {
        let nonce = rand::rng().random_range(0..1_000_000);
        let guest = NewGuestUser::for_device(device_id, nonce);
        let user_id = self
            .api
            .create_user(&guest)
            .await
            .map_err(IdentityError::Creation)?;
        if user_id.value() == 0 {
            return Err(IdentityError::InvalidUserId(user_id.value()));
        }
        self.remember_user(user_id).await?;
        info!("created guest user {user_id} for device {}", guest.device_id);
        Ok(user_id)
    }
}

/// Variant that asks the backend for the device's users on every call.
///
/// A failed lookup counts as "no user" and falls through to creation, which
/// can create a duplicate guest when the backend was merely unreachable.
pub struct ServerReconcilingProvisioner {
    registry: DeviceRegistry,
}

impl ServerReconcilingProvisioner {
    #[must_use]
    pub fn new(registry: DeviceRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl IdentityProvisioner for ServerReconcilingProvisioner {
    async fn resolve_user_id(&self) -> Result<UserId, IdentityError> {
        let device_id = self.registry.ensure_device_id().await?;

        match self.registry.api.find_users_by_device(&device_id).await {
            Ok(users) => {
                if let Some(first) = users.iter().copied().find(|id| id.value() >= 1) {
                    debug!("device {device_id} already bound to user {first}");
                    self.registry.remember_user(first).await?;
                    return Ok(first);
                }
                if !users.is_empty() {
                    warn!("ignoring unusable user ids {users:?} for device {device_id}");
                }
            }
            Err(err) => warn!("user lookup for device {device_id} failed, creating guest: {err}"),
        }

        self.registry.register_guest(device_id).await
    }

    fn policy(&self) -> IdentityPolicy {
        IdentityPolicy::ServerReconciling
    }
}

/// Variant that trusts a cached user id and never re-validates it remotely.
pub struct LocalCacheFirstProvisioner {
    registry: DeviceRegistry,
}

impl LocalCacheFirstProvisioner {
    #[must_use]
    pub fn new(registry: DeviceRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl IdentityProvisioner for LocalCacheFirstProvisioner {
    async fn resolve_user_id(&self) -> Result<UserId, IdentityError> {
        let device_id = self.registry.ensure_device_id().await?;
        if let Some(cached) = self.registry.cached_user_id().await? {
            return Ok(cached);
        }
        self.registry.register_guest(device_id).await
    }

    fn policy(&self) -> IdentityPolicy {
        IdentityPolicy::LocalCacheFirst
    }
}
