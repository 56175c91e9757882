use crate::{
    model::{
        AttachmentRef, GroupId, Instance, InstanceId, Obligation, ObligationId, UserId, WalletId,
    },
    money::Money,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("obligation {0} not found")]
    ObligationNotFound(ObligationId),
    #[error("instance {0} not found")]
    InstanceNotFound(InstanceId),
    #[error("attachment {0} not found")]
    AttachmentNotFound(AttachmentRef),
    #[error("the store rejected the request: {0}")]
    Rejected(String),
    #[error("the store is unavailable: {0}")]
    Unavailable(String),
}

/// Restricts which obligations a listing returns
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Scope {
    pub wallet_id: Option<WalletId>,
    pub user_id: Option<UserId>,
    pub group_id: Option<GroupId>,
}

/// What an uploaded attachment belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentTarget {
    Instance(InstanceId),
    Obligation(ObligationId),
}

#[async_trait]
pub trait ObligationStore: Send + Sync {
    async fn list(&self, scope: &Scope) -> Result<Vec<Obligation>, StoreError>;
    async fn get(&self, id: ObligationId) -> Result<Obligation, StoreError>;
    /// Store a new obligation, returning it with its assigned id
    async fn create(&self, obligation: Obligation) -> Result<Obligation, StoreError>;
    async fn update(&self, obligation: Obligation) -> Result<Obligation, StoreError>;
    /// Delete an obligation together with all of its instances
    async fn delete(&self, id: ObligationId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn list_by_obligation(&self, id: ObligationId) -> Result<Vec<Instance>, StoreError>;
    async fn get_by_id(&self, id: InstanceId) -> Result<Instance, StoreError>;
    /// Add `amount` to the settled amount, linking `attachment` in the same write
    async fn apply_settlement(
        &self,
        id: InstanceId,
        amount: Money,
        at: DateTime<Utc>,
        attachment: Option<AttachmentRef>,
    ) -> Result<Instance, StoreError>;
    async fn set_attachment(
        &self,
        id: InstanceId,
        attachment: Option<AttachmentRef>,
    ) -> Result<Instance, StoreError>;
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn upload(
        &self,
        target: AttachmentTarget,
        blob: Vec<u8>,
    ) -> Result<AttachmentRef, StoreError>;
    /// Delete an attachment. Removing an unknown reference is an error.
    async fn remove(&self, attachment: &AttachmentRef) -> Result<(), StoreError>;
}

/// An in-memory store implementing every store trait.
///
/// Instances are seeded with `insert_instance`, as creating them from a schedule happens
/// outside this crate.
#[derive(Default)]
pub struct MemoryStore {
    obligations: RwLock<BTreeMap<ObligationId, Obligation>>,
    instances: RwLock<BTreeMap<InstanceId, Instance>>,
    attachments: Mutex<HashMap<AttachmentRef, (AttachmentTarget, Vec<u8>)>>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Make every call fail with `StoreError::Unavailable` until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }

        Ok(())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn insert_instance(&self, mut instance: Instance) -> Result<Instance, StoreError> {
        self.check_available()?;
        // Held until the insert is done so a concurrent delete can't orphan the instance
        let obligations = self.obligations.read().await;
        if !obligations.contains_key(&instance.obligation_id) {
            return Err(StoreError::ObligationNotFound(instance.obligation_id));
        }

        if instance.id == 0 {
            instance.id = self.next_id();
        }
        instance.received_hint = None;
        self.instances
            .write()
            .await
            .insert(instance.id, instance.clone());
        drop(obligations);

        Ok(instance)
    }

    pub async fn attachment(&self, attachment: &AttachmentRef) -> Option<Vec<u8>> {
        self.attachments
            .lock()
            .await
            .get(attachment)
            .map(|(_, blob)| blob.clone())
    }
}

fn in_scope(obligation: &Obligation, scope: &Scope) -> bool {
    scope
        .wallet_id
        .as_ref()
        .map_or(true, |w| &obligation.wallet_id == w)
        && scope
            .user_id
            .as_ref()
            .map_or(true, |u| &obligation.owner_id == u)
        && scope
            .group_id
            .as_ref()
            .map_or(true, |g| obligation.group_id.as_ref() == Some(g))
}

#[async_trait]
impl ObligationStore for MemoryStore {
    async fn list(&self, scope: &Scope) -> Result<Vec<Obligation>, StoreError> {
        self.check_available()?;
        Ok(self
            .obligations
            .read()
            .await
            .values()
            .filter(|o| in_scope(o, scope))
            .cloned()
            .collect())
    }

    async fn get(&self, id: ObligationId) -> Result<Obligation, StoreError> {
        self.check_available()?;
        self.obligations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::ObligationNotFound(id))
    }

    async fn create(&self, mut obligation: Obligation) -> Result<Obligation, StoreError> {
        self.check_available()?;
        obligation.id = self.next_id();
        obligation
            .validate()
            .map_err(|e| StoreError::Rejected(e.to_string()))?;

        debug!("creating obligation {} '{}'", obligation.id, obligation.title);
        self.obligations
            .write()
            .await
            .insert(obligation.id, obligation.clone());

        Ok(obligation)
    }

    async fn update(&self, obligation: Obligation) -> Result<Obligation, StoreError> {
        self.check_available()?;
        obligation
            .validate()
            .map_err(|e| StoreError::Rejected(e.to_string()))?;

        let mut obligations = self.obligations.write().await;
        match obligations.get_mut(&obligation.id) {
            Some(existing) => {
                *existing = obligation.clone();
                Ok(obligation)
            }
            None => Err(StoreError::ObligationNotFound(obligation.id)),
        }
    }

    async fn delete(&self, id: ObligationId) -> Result<(), StoreError> {
        self.check_available()?;
        // Lock order: obligations, instances, attachments
        let mut obligations = self.obligations.write().await;
        if obligations.remove(&id).is_none() {
            return Err(StoreError::ObligationNotFound(id));
        }

        let mut instances = self.instances.write().await;
        let removed: Vec<InstanceId> = instances
            .values()
            .filter(|i| i.obligation_id == id)
            .map(|i| i.id)
            .collect();
        for instance_id in removed.iter() {
            instances.remove(instance_id);
        }

        let mut attachments = self.attachments.lock().await;
        let before = attachments.len();
        attachments.retain(|_, (target, _)| match *target {
            AttachmentTarget::Obligation(o) => o != id,
            AttachmentTarget::Instance(i) => !removed.contains(&i),
        });

        debug!(
            "deleted obligation {} with {} instances and {} attachments",
            id,
            removed.len(),
            before - attachments.len()
        );

        Ok(())
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn list_by_obligation(&self, id: ObligationId) -> Result<Vec<Instance>, StoreError> {
        self.check_available()?;
        Ok(self
            .instances
            .read()
            .await
            .values()
            .filter(|i| i.obligation_id == id)
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: InstanceId) -> Result<Instance, StoreError> {
        self.check_available()?;
        self.instances
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::InstanceNotFound(id))
    }

    async fn apply_settlement(
        &self,
        id: InstanceId,
        amount: Money,
        at: DateTime<Utc>,
        attachment: Option<AttachmentRef>,
    ) -> Result<Instance, StoreError> {
        self.check_available()?;
        let mut instances = self.instances.write().await;
        let instance = instances
            .get_mut(&id)
            .ok_or(StoreError::InstanceNotFound(id))?;

        // The store keeps its own bound so a caller skipping validation can't overpay
        if instance.settled_amount + amount > instance.expected_amount {
            warn!("store refused overpayment of instance {}", id);
            return Err(StoreError::Rejected(format!(
                "settlement of {} exceeds the remaining {}",
                amount,
                instance.outstanding()
            )));
        }

        instance.settled_amount += amount;
        instance.settled_at = Some(at);
        if attachment.is_some() {
            instance.attachment_ref = attachment;
        }

        Ok(instance.clone())
    }

    async fn set_attachment(
        &self,
        id: InstanceId,
        attachment: Option<AttachmentRef>,
    ) -> Result<Instance, StoreError> {
        self.check_available()?;
        let mut instances = self.instances.write().await;
        let instance = instances
            .get_mut(&id)
            .ok_or(StoreError::InstanceNotFound(id))?;
        instance.attachment_ref = attachment;

        Ok(instance.clone())
    }
}

#[async_trait]
impl AttachmentStore for MemoryStore {
    async fn upload(
        &self,
        target: AttachmentTarget,
        blob: Vec<u8>,
    ) -> Result<AttachmentRef, StoreError> {
        self.check_available()?;
        if blob.is_empty() {
            return Err(StoreError::Rejected("attachment is empty".into()));
        }

        let reference = match target {
            AttachmentTarget::Instance(id) => format!("instance-{}-{}", id, self.next_id()),
            AttachmentTarget::Obligation(id) => format!("obligation-{}-{}", id, self.next_id()),
        };
        self.attachments
            .lock()
            .await
            .insert(reference.clone(), (target, blob));

        Ok(reference)
    }

    async fn remove(&self, attachment: &AttachmentRef) -> Result<(), StoreError> {
        self.check_available()?;
        match self.attachments.lock().await.remove(attachment) {
            Some(_) => Ok(()),
            None => Err(StoreError::AttachmentNotFound(attachment.clone())),
        }
    }
}
