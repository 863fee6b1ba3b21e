//! Federation partner registry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use super::IdentityProvider;
use crate::entity_id::EntityId;
use crate::error::{SamlError, SamlResult};
use crate::metadata::{MetadataTrust, parse_metadata};

/// An immutable view of the registry.
pub type PartnerSnapshot = Arc<HashMap<EntityId, Arc<IdentityProvider>>>;

/// Identity providers keyed by entity id.
///
/// Readers take a snapshot; writers build a new map and swap it in, so a
/// reader never sees a partially applied update.
#[derive(Debug, Default)]
pub struct PartnerRegistry {
    partners: RwLock<PartnerSnapshot>,
    default_idp: RwLock<Option<EntityId>>,
}

impl PartnerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `partners`.
    #[must_use]
    pub fn with_partners(partners: impl IntoIterator<Item = IdentityProvider>) -> Self {
        let registry = Self::new();
        registry.replace(partners);
        registry
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> PartnerSnapshot {
        Arc::clone(&self.partners.read())
    }

    /// Looks up a partner by exact entity id.
    #[must_use]
    pub fn get(&self, entity_id: &str) -> Option<Arc<IdentityProvider>> {
        self.partners.read().get(entity_id).cloned()
    }

    /// Number of partners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.partners.read().len()
    }

    /// Returns true if there are no partners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partners.read().is_empty()
    }

    /// Replaces all partners at once.
    pub fn replace(&self, partners: impl IntoIterator<Item = IdentityProvider>) {
        let map: HashMap<_, _> = partners
            .into_iter()
            .map(|idp| (idp.entity_id.clone(), Arc::new(idp)))
            .collect();
        *self.partners.write() = Arc::new(map);
    }

    /// Inserts or replaces one partner.
    pub fn upsert(&self, partner: IdentityProvider) {
        self.upsert_all(std::iter::once(partner));
    }

    /// Inserts or replaces several partners in one swap.
    pub fn upsert_all(&self, partners: impl IntoIterator<Item = IdentityProvider>) {
        let mut guard = self.partners.write();
        let mut map = HashMap::clone(&guard);
        for partner in partners {
            map.insert(partner.entity_id.clone(), Arc::new(partner));
        }
        *guard = Arc::new(map);
    }

    /// Removes a partner.
    pub fn remove(&self, entity_id: &str) -> Option<Arc<IdentityProvider>> {
        let mut guard = self.partners.write();
        if !guard.contains_key(entity_id) {
            return None;
        }
        let mut map = HashMap::clone(&guard);
        let removed = map.remove(entity_id);
        *guard = Arc::new(map);
        removed
    }

    /// Sets the partner used when sign-in names none.
    pub fn set_default_idp(&self, entity_id: Option<EntityId>) {
        *self.default_idp.write() = entity_id;
    }

    /// The partner used when sign-in names none: the configured default,
    /// else the only partner.
    #[must_use]
    pub fn default_idp(&self) -> Option<Arc<IdentityProvider>> {
        if let Some(id) = self.default_idp.read().as_ref() {
            return self.get(id.as_str());
        }
        let snapshot = self.snapshot();
        if snapshot.len() == 1 {
            snapshot.values().next().cloned()
        } else {
            None
        }
    }

    /// Parses IdP metadata and upserts every identity provider it
    /// describes. Nothing is applied unless the whole document is accepted.
    ///
    /// Partners that already exist keep their per-partner SP options.
    ///
    /// # Errors
    ///
    /// Returns a metadata error if the document is rejected or describes no
    /// identity provider.
    pub fn load_metadata(&self, xml: &str, trust: &MetadataTrust) -> SamlResult<Vec<EntityId>> {
        let entities = parse_metadata(xml, trust, Utc::now())?;
        let mut partners = Vec::new();
        for entity in &entities {
            if entity.idp.is_some() {
                let mut idp = entity.to_identity_provider()?;
                if let Some(existing) = self.get(idp.entity_id.as_str()) {
                    idp.sp_options.clone_from(&existing.sp_options);
                    idp.allow_unsolicited_authn_response = existing.allow_unsolicited_authn_response;
                }
                partners.push(idp);
            }
        }
        if partners.is_empty() {
            return Err(SamlError::metadata("document describes no identity provider"));
        }

        let ids: Vec<EntityId> = partners.iter().map(|p| p.entity_id.clone()).collect();
        self.upsert_all(partners);
        tracing::info!(partners = ids.len(), "Loaded identity provider metadata");
        Ok(ids)
    }
}
