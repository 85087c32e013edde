//! Child registration service.
//!
//! [`ChildRegistry`] owns no state besides the store handle it is given. Its
//! only correctness guarantee lives in [`ChildRegistry::create_child_unique`]:
//! the derived key is claimed inside one store transaction, so at most one
//! child exists per (parent, normalized name, date of birth).

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::actor::Actor;
use crate::child::{ChildBody, ChildRecord, ChildUpdate, NewChild};
use crate::config::RegistrationConfig;
use crate::error::{Error, Result};
use crate::identity::{derive_child_key, normalize_name};
use crate::store::{Collection, DocumentStore, TxAction, TxOutcome};

/// Use-case service for child profiles.
#[derive(Debug)]
pub struct ChildRegistry<S: DocumentStore> {
    store: S,
    rules: RegistrationConfig,
}

impl<S: DocumentStore> ChildRegistry<S> {
    /// Create a registry over `store` with default registration rules.
    pub fn new(store: S) -> Self {
        Self::with_rules(store, RegistrationConfig::default())
    }

    /// Create a registry with explicit registration rules.
    pub fn with_rules(store: S, rules: RegistrationConfig) -> Self {
        Self { store, rules }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a child unless one with the same derived key exists.
    ///
    /// Inputs are not validated here; see [`ChildRegistry::register`].
    /// Returns the new record's id (its derived key).
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyExists`] if the key is taken, including when a
    ///   concurrent call claimed it first.
    /// - [`Error::StorageUnavailable`] for any store failure.
    pub fn create_child_unique(
        &self,
        parent_id: &str,
        name: &str,
        date_of_birth: &str,
        allergies: &[String],
    ) -> Result<String> {
        self.create_record(parent_id, name, date_of_birth, allergies)
            .map(|record| record.id)
    }

    /// Validate registration input, then create the child.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for bad input, otherwise as
    /// [`ChildRegistry::create_child_unique`].
    pub fn register(&self, child: &NewChild) -> Result<ChildRecord> {
        self.register_on(child, Utc::now().date_naive())
    }

    /// [`ChildRegistry::register`] with an explicit "today" for birth-date checks.
    ///
    /// # Errors
    ///
    /// As [`ChildRegistry::register`].
    pub fn register_on(&self, child: &NewChild, today: NaiveDate) -> Result<ChildRecord> {
        let clean = child.validate(&self.rules, today)?;
        self.create_record(
            &clean.parent_id,
            &clean.name,
            &clean.date_of_birth,
            &clean.allergies,
        )
    }

    /// Advisory check for an existing child.
    ///
    /// This is a plain read, not a reservation: another registration can
    /// commit between this returning `false` and a later create. Store
    /// failures are logged and reported as `false`.
    pub fn exists_child(&self, parent_id: &str, name: &str, date_of_birth: &str) -> bool {
        let key = derive_child_key(parent_id, name, date_of_birth);
        match self.store.get(Collection::Children, &key) {
            Ok(doc) => doc.is_some(),
            Err(e) => {
                warn!("Existence check for {} failed, assuming absent: {}", key, e);
                false
            }
        }
    }

    /// Get a child by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the read fails.
    pub fn get_child(&self, id: &str) -> Result<Option<ChildRecord>> {
        let doc = self.store.get(Collection::Children, id)?;
        Ok(doc.as_ref().map(ChildRecord::from_document).transpose()?)
    }

    /// All children registered by `parent_id`, ordered by name then id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the query fails.
    pub fn children_for_parent(&self, parent_id: &str) -> Result<Vec<ChildRecord>> {
        let docs = self
            .store
            .find_by_field(Collection::Children, "parentId", parent_id)?;
        let mut children = docs
            .iter()
            .map(ChildRecord::from_document)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        children.sort_by_cached_key(|c| (normalize_name(&c.name), c.id.clone()));
        Ok(children)
    }

    /// Edit a child's name or allergies.
    ///
    /// The id never changes, so a new name must normalize to the same slug
    /// as the old one ("Jean Luc" to "Jean-Luc" is fine, "Bea" to "Ana" is not).
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the update is empty, invalid or renames the
    ///   child to a name with a different slug.
    /// - [`Error::NotFound`] if the child does not exist.
    /// - [`Error::PermissionDenied`] unless `actor` owns the child or is an admin.
    /// - [`Error::StorageUnavailable`] for store failures.
    pub fn update_child(&self, actor: &Actor, id: &str, update: &ChildUpdate) -> Result<ChildRecord> {
        if update.is_empty() {
            return Err(Error::validation("update", "no fields to change"));
        }
        let patch = update.to_patch(&self.rules)?;

        // parentId is immutable, so checking ownership outside the transaction is safe.
        let current = self
            .get_child(id)?
            .ok_or_else(|| Error::not_found("child", id))?;
        if !actor.can_edit_child(&current.parent_id) {
            return Err(Error::permission_denied(format!(
                "{} {} may not edit child {}",
                actor.role, actor.user_id, id
            )));
        }

        // A new name must derive the record's own key; anything else would
        // let two records share one identity.
        let new_name = update.name.as_deref();
        let mut rename_rejected = false;
        let outcome = self
            .store
            .transact(Collection::Children, id, &mut |existing| {
                let Some(doc) = existing else {
                    return TxAction::Abort;
                };
                if let Some(name) = new_name {
                    let rekeyed = derive_child_key(
                        doc.field_str("parentId").unwrap_or_default(),
                        name,
                        doc.field_str("dateOfBirth").unwrap_or_default(),
                    );
                    if rekeyed != doc.key {
                        rename_rejected = true;
                        return TxAction::Abort;
                    }
                }
                TxAction::Merge(patch.clone())
            })?;

        match outcome {
            TxOutcome::Committed(doc) => {
                info!("Updated child {}", id);
                Ok(ChildRecord::from_document(&doc)?)
            }
            TxOutcome::Aborted(_) if rename_rejected => Err(Error::validation(
                "name",
                format!(
                    "`{}` does not match child {}; only spelling, case or accents may change",
                    new_name.unwrap_or_default().trim(),
                    id
                ),
            )),
            TxOutcome::Aborted(_) => Err(Error::not_found("child", id)),
        }
    }

    fn create_record(
        &self,
        parent_id: &str,
        name: &str,
        date_of_birth: &str,
        allergies: &[String],
    ) -> Result<ChildRecord> {
        let key = derive_child_key(parent_id, name, date_of_birth);
        let body = ChildBody {
            parent_id: parent_id.to_string(),
            name: name.to_string(),
            date_of_birth: date_of_birth.to_string(),
            allergies: allergies.to_vec(),
        }
        .to_value()?;

        debug!("Claiming child key {}", key);
        let outcome = self
            .store
            .transact(Collection::Children, &key, &mut |existing| {
                if existing.is_some() {
                    TxAction::Abort
                } else {
                    TxAction::Write(body.clone())
                }
            })?;

        match outcome {
            TxOutcome::Committed(doc) => {
                info!("Registered child {}", key);
                Ok(ChildRecord::from_document(&doc)?)
            }
            TxOutcome::Aborted(_) => {
                info!("Rejected duplicate registration for {}", key);
                Err(Error::AlreadyExists {
                    key,
                    parent_id: parent_id.to_string(),
                    name: name.to_string(),
                    date_of_birth: date_of_birth.to_string(),
                })
            }
        }
    }
}
