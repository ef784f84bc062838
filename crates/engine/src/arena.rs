//! Namespace arena
//!
//! Namespaces live in an arena keyed by [`NamespaceId`]. Each entry is a slot
//! holding the namespace's open [`DocumentTable`], or nothing once the
//! namespace has been torn down:
//!
//! - document operations hold the slot's read lock for their duration
//! - create/destroy hold the slot's write lock, excluding document
//!   operations on that namespace only
//! - slots are inserted only by load/create/destroy and never removed, so
//!   every caller of a namespace locks the same slot
//!
//! A namespace is fully provisioned on disk and its table loaded before the
//! slot is filled; teardown empties the slot and marks the table destroyed,
//! so a handle held across a teardown fails instead of writing to a
//! deleted namespace.

use dashmap::DashMap;
use doccache_core::{AccountId, NamespaceId, Result, SchemaError};
use doccache_storage::{DocumentTable, SchemaManager};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
struct NamespaceSlot {
    table: RwLock<Option<Arc<DocumentTable>>>,
}

/// Arena of namespace handles.
#[derive(Debug)]
pub(crate) struct NamespaceArena {
    schema: SchemaManager,
    slots: DashMap<NamespaceId, Arc<NamespaceSlot>>,
    compaction_ratio: f64,
}

impl NamespaceArena {
    /// Load the default namespace and every provisioned account namespace.
    pub(crate) fn load(schema: SchemaManager, compaction_ratio: f64) -> Result<Self> {
        let arena = Self {
            schema,
            slots: DashMap::new(),
            compaction_ratio,
        };
        let mut namespaces = vec![NamespaceId::Default];
        namespaces.extend(
            arena
                .schema
                .list_account_namespaces()?
                .into_iter()
                .map(NamespaceId::Account),
        );
        for namespace in namespaces {
            let table = arena.schema.open_table(&namespace, compaction_ratio)?;
            arena.slot(&namespace).table.write().replace(Arc::new(table));
        }
        Ok(arena)
    }

    /// Slot for `namespace`, inserted if missing. Only provisioning paths
    /// insert, so lookups of unknown accounts leave the arena unchanged.
    fn slot(&self, namespace: &NamespaceId) -> Arc<NamespaceSlot> {
        if let Some(slot) = self.slots.get(namespace) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.slots.entry(namespace.clone()).or_default().value())
    }

    fn existing_slot(&self, namespace: &NamespaceId) -> Option<Arc<NamespaceSlot>> {
        self.slots.get(namespace).map(|slot| Arc::clone(slot.value()))
    }

    /// Run `f` against the namespace's table under the slot read lock.
    ///
    /// `f` receives `None` when the namespace does not exist.
    pub(crate) fn with_table<T, F>(&self, namespace: &NamespaceId, f: F) -> Result<T>
    where
        F: FnOnce(Option<&DocumentTable>) -> Result<T>,
    {
        let Some(slot) = self.existing_slot(namespace) else {
            return f(None);
        };
        let guard = slot.table.read();
        f(guard.as_deref())
    }

    /// Like [`with_table`](Self::with_table), failing when the namespace does not exist.
    pub(crate) fn with_existing<T, F>(&self, namespace: &NamespaceId, f: F) -> Result<T>
    where
        F: FnOnce(&DocumentTable) -> Result<T>,
    {
        self.with_table(namespace, |table| match table {
            Some(table) => f(table),
            None => Err(SchemaError::NamespaceNotReady {
                namespace: namespace.to_string(),
            }
            .into()),
        })
    }

    /// Whether the namespace is provisioned and loaded
    pub(crate) fn is_ready(&self, namespace: &NamespaceId) -> bool {
        self.existing_slot(namespace)
            .map_or(false, |slot| slot.table.read().is_some())
    }

    /// Provision and load an account namespace; `false` if it already existed.
    pub(crate) fn create(&self, account: &AccountId) -> Result<bool> {
        let namespace = NamespaceId::Account(account.clone());
        let slot = self.slot(&namespace);
        let mut guard = slot.table.write();
        if guard.is_some() {
            return Ok(false);
        }
        let created = self.schema.create_namespace(account)?;
        let table = self.schema.open_table(&namespace, self.compaction_ratio)?;
        *guard = Some(Arc::new(table));
        Ok(created)
    }

    /// Tear down an account namespace; `false` if it did not exist.
    pub(crate) fn destroy(&self, account: &AccountId) -> Result<bool> {
        let namespace = NamespaceId::Account(account.clone());
        let slot = self.slot(&namespace);
        let mut guard = slot.table.write();

        let removed = self.schema.destroy_namespace(account)?;
        if let Some(table) = guard.take() {
            table.mark_destroyed();
        }
        if removed {
            info!(target: "doccache::lifecycle", account = %account, "Account namespace torn down");
        }
        Ok(removed)
    }

    /// Every loaded table, default namespace first.
    ///
    /// Handles are snapshots: a namespace destroyed afterwards rejects
    /// writes through them.
    pub(crate) fn tables(&self) -> Vec<Arc<DocumentTable>> {
        let mut entries: Vec<(NamespaceId, Arc<DocumentTable>)> = self
            .slots
            .iter()
            .filter_map(|entry| {
                let table = entry.value().table.read().clone()?;
                Some((entry.key().clone(), table))
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, table)| table).collect()
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Loaded account namespaces, sorted
    pub(crate) fn accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<AccountId> = self
            .slots
            .iter()
            .filter(|entry| entry.value().table.read().is_some())
            .filter_map(|entry| entry.key().account_id().cloned())
            .collect();
        accounts.sort();
        accounts
    }
}
