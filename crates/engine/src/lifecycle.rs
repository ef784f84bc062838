//! Account namespace lifecycle
//!
//! Engine-level operations that provision and tear down account namespaces
//! and follow account switches reported by the identity layer.
//!
//! ## Operations
//!
//! - `create_account_namespace`: idempotent provisioning
//! - `delete_account_namespace`: idempotent teardown, cascades to every record
//! - `on_account_changed`: provisions the new account, keeps the old one
//! - `account_namespaces` / `stale_account_namespaces`: inventory for eviction decisions
//!
//! Nothing here destroys a namespace on its own: teardown is always an
//! explicit call, so pending changes of a signed-out account can still be
//! drained by the sync client.

use crate::store::DocumentStore;
use doccache_core::{AccountId, NamespaceId, Result};
use tracing::info;

impl DocumentStore {
    /// Provision the namespace of `account`.
    ///
    /// Succeeds without effect if it already exists. Once this returns, the
    /// namespace is fully created and upserts targeting it are accepted.
    pub fn create_account_namespace(&self, account: &AccountId) -> Result<()> {
        self.ensure_open()?;
        if self.inner.arena.create(account)? {
            info!(target: "doccache::lifecycle", account = %account, "Provisioned account namespace");
        }
        Ok(())
    }

    /// Remove the namespace of `account` and every record in it.
    ///
    /// Succeeds without effect if it does not exist. A crash during teardown
    /// leaves the namespace either fully present or fully absent.
    pub fn delete_account_namespace(&self, account: &AccountId) -> Result<()> {
        self.ensure_open()?;
        self.inner.arena.destroy(account)?;
        Ok(())
    }

    /// React to a sign-in change reported by the identity layer.
    ///
    /// Provisions the new account's namespace. The previous account's
    /// namespace is kept for a later sign-in and for draining its pending
    /// changes.
    pub fn on_account_changed(
        &self,
        previous: Option<&AccountId>,
        current: Option<&AccountId>,
    ) -> Result<()> {
        self.ensure_open()?;
        info!(
            target: "doccache::lifecycle",
            previous = previous.map(|a| a.as_str()),
            current = current.map(|a| a.as_str()),
            "Account changed"
        );
        if let Some(account) = current {
            self.create_account_namespace(account)?;
        }
        Ok(())
    }

    /// Accounts with a provisioned namespace, sorted.
    pub fn account_namespaces(&self) -> Vec<AccountId> {
        self.inner.arena.accounts()
    }

    /// Account namespaces that could be evicted.
    ///
    /// An account qualifies when it is not the signed-in account and has no
    /// pending operations left. Without an identity provider no account is
    /// considered signed in.
    pub fn stale_account_namespaces(&self) -> Result<Vec<AccountId>> {
        self.ensure_open()?;
        let current = self
            .inner
            .identity
            .as_ref()
            .and_then(|identity| identity.current_account_id());

        let mut stale = Vec::new();
        for account in self.inner.arena.accounts() {
            if current.as_ref() == Some(&account) {
                continue;
            }
            let namespace = NamespaceId::Account(account.clone());
            let has_pending = self.inner.arena.with_table(&namespace, |table| {
                Ok(table.map_or(false, |t| !t.pending().is_empty()))
            })?;
            if !has_pending {
                stale.push(account);
            }
        }
        Ok(stale)
    }
}
