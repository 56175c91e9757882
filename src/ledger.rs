use crate::{
    config::Config,
    error::{Error, ValidationError},
    model::{Instance, InstanceId, ObligationId},
    money::Money,
    reconcile::{self, EarningPolicy},
    store::{AttachmentStore, AttachmentTarget, InstanceStore, ObligationStore, StoreError},
};
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, RwLock};

/// A locally cached instance. Provisional entries come from our own writes and are
/// replaced by the next authoritative refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedInstance {
    pub instance: Instance,
    pub provisional: bool,
}

/// A ticket for one refresh of an obligation's instances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    obligation_id: ObligationId,
    generation: u64,
}

/// Records settlements through the stores and keeps a client-side cache of instances.
///
/// Writes update the cache optimistically. Refreshes overwrite it with store data, and
/// each refresh or write bumps a per-obligation generation so that an older refresh
/// finishing late can never overwrite newer state.
pub struct Ledger<S> {
    store: Arc<S>,
    policy: EarningPolicy,
    cache: RwLock<HashMap<InstanceId, CachedInstance>>,
    generations: Mutex<HashMap<ObligationId, u64>>,
}

impl<S> Ledger<S>
where
    S: ObligationStore + InstanceStore + AttachmentStore,
{
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        Ledger {
            store,
            policy: config.earning_policy,
            cache: RwLock::new(HashMap::new()),
            generations: Mutex::new(HashMap::new()),
        }
    }

    async fn bump(&self, obligation_id: ObligationId) -> u64 {
        let mut generations = self.generations.lock().await;
        let generation = generations.entry(obligation_id).or_insert(0);
        *generation += 1;
        *generation
    }

    /// Settle `amount` against an instance, optionally with a receipt.
    ///
    /// The settlement is validated before anything is written, including the receipt
    /// upload. A partial amount on a binary earning is returned as a hint and not written.
    pub async fn settle(
        &self,
        instance_id: InstanceId,
        amount: Money,
        at: DateTime<Utc>,
        receipt: Option<Vec<u8>>,
    ) -> Result<Instance, Error> {
        let current = self.store.get_by_id(instance_id).await?;
        let obligation = self.store.get(current.obligation_id).await?;

        let preview =
            reconcile::record_settlement(&obligation, &current, amount, at, None, self.policy)?;

        if preview.received_hint.is_some() {
            debug!(
                "instance {} keeps {} as a hint - nothing to write",
                instance_id, amount
            );
            if receipt.is_some() {
                warn!("receipt for instance {} dropped with the hint", instance_id);
            }
            self.remember(preview.clone()).await;
            return Ok(preview);
        }

        let attachment = match receipt {
            Some(blob) => Some(
                self.store
                    .upload(AttachmentTarget::Instance(instance_id), blob)
                    .await?,
            ),
            None => None,
        };

        let written = match self
            .store
            .apply_settlement(instance_id, amount, at, attachment.clone())
            .await
        {
            Ok(instance) => instance,
            Err(e) => {
                error!("settlement of instance {} failed: {}", instance_id, e);
                // Don't leave an orphaned receipt behind
                if let Some(ref r) = attachment {
                    if let Err(remove_err) = self.store.remove(r).await {
                        warn!("could not remove orphaned receipt {}: {}", r, remove_err);
                    }
                }
                return Err(e.into());
            }
        };

        // A new receipt replaces the old one
        if let (Some(new), Some(old)) = (attachment.as_ref(), current.attachment_ref.as_ref()) {
            if new != old {
                debug!("receipt {} replaced by {}", old, new);
                if let Err(e) = self.store.remove(old).await {
                    warn!("could not remove replaced receipt {}: {}", old, e);
                }
            }
        }

        self.remember(written.clone()).await;

        Ok(written)
    }

    /// Delete the receipt attached to an instance
    pub async fn remove_attachment(&self, instance_id: InstanceId) -> Result<Instance, Error> {
        let current = self.store.get_by_id(instance_id).await?;
        let attachment = match current.attachment_ref {
            Some(ref r) => r.clone(),
            None => {
                return Err(
                    ValidationError::Rejected(format!("instance {} has no attachment", instance_id))
                        .into(),
                )
            }
        };

        // Unlink first so the instance never points at a deleted receipt
        let updated = self.store.set_attachment(instance_id, None).await?;
        match self.store.remove(&attachment).await {
            Ok(()) => {}
            Err(StoreError::AttachmentNotFound(_)) => {
                warn!("receipt {} was already gone", attachment);
            }
            Err(e) => {
                error!("could not remove receipt {}: {}", attachment, e);
                if let Err(relink) = self
                    .store
                    .set_attachment(instance_id, Some(attachment.clone()))
                    .await
                {
                    warn!("could not relink receipt {}: {}", attachment, relink);
                }
                return Err(e.into());
            }
        }
        self.remember(updated.clone()).await;

        Ok(updated)
    }

    // Cache our own write as provisional and invalidate refreshes already in flight
    async fn remember(&self, instance: Instance) {
        self.bump(instance.obligation_id).await;
        self.cache.write().await.insert(
            instance.id,
            CachedInstance {
                instance,
                provisional: true,
            },
        );
    }

    /// Start a refresh of an obligation's instances
    pub async fn begin_refresh(&self, obligation_id: ObligationId) -> RefreshTicket {
        RefreshTicket {
            obligation_id,
            generation: self.bump(obligation_id).await,
        }
    }

    /// Apply authoritative instances fetched for `ticket`.
    ///
    /// Returns false, leaving the cache untouched, when a newer refresh or write for the
    /// same obligation has happened since the ticket was issued.
    pub async fn apply_refresh(&self, ticket: RefreshTicket, instances: Vec<Instance>) -> bool {
        let generations = self.generations.lock().await;
        if generations.get(&ticket.obligation_id) != Some(&ticket.generation) {
            debug!(
                "discarding stale refresh {} of obligation {}",
                ticket.generation, ticket.obligation_id
            );
            return false;
        }

        let mut cache = self.cache.write().await;
        cache.retain(|_, c| c.instance.obligation_id != ticket.obligation_id);
        for instance in instances
            .into_iter()
            .filter(|i| i.obligation_id == ticket.obligation_id)
        {
            cache.insert(
                instance.id,
                CachedInstance {
                    instance,
                    provisional: false,
                },
            );
        }

        true
    }

    /// Fetch and apply the authoritative instances of an obligation
    pub async fn refresh(&self, obligation_id: ObligationId) -> Result<bool, Error> {
        let ticket = self.begin_refresh(obligation_id).await;
        let instances = self.store.list_by_obligation(obligation_id).await?;

        Ok(self.apply_refresh(ticket, instances).await)
    }

    pub async fn cached(&self, instance_id: InstanceId) -> Option<CachedInstance> {
        self.cache.read().await.get(&instance_id).cloned()
    }
}
