//! `Account` CRUD and the single-primary-per-plugin invariant (spec.md §3,
//! §4.3). Grounded on `blob_store`'s atomic temp-write+rename discipline,
//! generalized here to `gateway-store::put_many`'s single-batch commit for
//! the "clear every sibling's primary flag, then set the target" sequence
//! spec.md calls "a single atomic write set".

use gateway_core::{ids, GatewayError};
use gateway_store::{trees, Store};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A provider account (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique id.
    pub id: String,
    /// Backend/provider this account belongs to, e.g. `"gmail"`.
    pub plugin_id: String,
    /// Human-facing email address; opaque to the core.
    pub email: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// At most one account per `plugin_id` has this set.
    pub is_primary: bool,
    /// Arbitrary caller metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
    /// ISO-8601 last-update timestamp.
    pub updated_at: String,
}

/// List every account, optionally scoped to `plugin_id`. No secondary
/// index is maintained — this scans the `accounts` tree and filters, which
/// is acceptable at the expected account-table size (tens, not millions).
pub fn list_accounts(store: &Store, plugin_id: Option<&str>) -> Result<Vec<Account>, GatewayError> {
    let rows: Vec<(String, Account)> = store.iter_all(trees::ACCOUNTS)?;
    Ok(rows
        .into_iter()
        .map(|(_, a)| a)
        .filter(|a| plugin_id.is_none() || Some(a.plugin_id.as_str()) == plugin_id)
        .collect())
}

/// Fetch a single account by id.
pub fn get_account(store: &Store, id: &str) -> Result<Option<Account>, GatewayError> {
    store.get(trees::ACCOUNTS, id)
}

/// The current primary account for `plugin_id`, if any.
pub fn get_primary(store: &Store, plugin_id: &str) -> Result<Option<Account>, GatewayError> {
    Ok(list_accounts(store, Some(plugin_id))?.into_iter().find(|a| a.is_primary))
}

/// Create a new account. The first account created for a given
/// `plugin_id` is automatically marked primary.
pub fn create_account(
    store: &Store,
    plugin_id: String,
    email: String,
    display_name: Option<String>,
    metadata: Option<Value>,
) -> Result<Account, GatewayError> {
    let is_primary = get_primary(store, &plugin_id)?.is_none();
    let now = ids::now_iso8601();
    let account = Account {
        id: ids::new_account_id(),
        plugin_id,
        email,
        display_name,
        is_primary,
        metadata,
        created_at: now.clone(),
        updated_at: now,
    };
    store.put(trees::ACCOUNTS, &account.id, &account)?;
    Ok(account)
}

/// Overwrite an account's caller-editable fields (`email`, `display_name`,
/// `metadata`). `plugin_id` and the primary flag are untouched: changing
/// plugin affiliation or primacy goes through [`delete_account`]/
/// [`set_primary`], not a plain update.
pub fn update_account(
    store: &Store,
    id: &str,
    email: String,
    display_name: Option<String>,
    metadata: Option<Value>,
) -> Result<Account, GatewayError> {
    let mut account =
        get_account(store, id)?.ok_or_else(|| GatewayError::Store(format!("account {id} not found")))?;
    account.email = email;
    account.display_name = display_name;
    account.metadata = metadata;
    account.updated_at = ids::now_iso8601();
    store.put(trees::ACCOUNTS, id, &account)?;
    Ok(account)
}

/// Clear `isPrimary` on every sibling account of `id`'s plugin, then set it
/// on `id`, as one atomic batch write.
pub fn set_primary(store: &Store, id: &str) -> Result<Account, GatewayError> {
    let target = get_account(store, id)?
        .ok_or_else(|| GatewayError::Store(format!("account {id} not found")))?;

    let siblings = list_accounts(store, Some(&target.plugin_id))?;
    let now = ids::now_iso8601();
    let mut batch: Vec<(String, Account)> = Vec::with_capacity(siblings.len());
    let mut updated_target = None;

    for mut acc in siblings {
        let should_be_primary = acc.id == id;
        if acc.is_primary != should_be_primary {
            acc.is_primary = should_be_primary;
            acc.updated_at = now.clone();
        }
        if acc.id == id {
            updated_target = Some(acc.clone());
        }
        batch.push((acc.id.clone(), acc));
    }

    store.put_many(trees::ACCOUNTS, &batch)?;
    updated_target.ok_or_else(|| GatewayError::Store(format!("account {id} not found")))
}

/// Delete `id`'s dependent credentials, then the account itself. If the
/// deleted account was primary and siblings remain, promote the
/// deterministically-first surviving account (by id) to primary.
pub fn delete_account(store: &Store, id: &str) -> Result<(), GatewayError> {
    let account = get_account(store, id)?
        .ok_or_else(|| GatewayError::Store(format!("account {id} not found")))?;

    crate::credential::delete_credentials_for_account(store, id)?;
    store.delete(trees::ACCOUNTS, id)?;

    if account.is_primary {
        let mut remaining = list_accounts(store, Some(&account.plugin_id))?;
        remaining.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(promoted) = remaining.first() {
            let mut promoted = promoted.clone();
            promoted.is_primary = true;
            promoted.updated_at = ids::now_iso8601();
            store.put(trees::ACCOUNTS, &promoted.id, &promoted)?;
        }
    }
    Ok(())
}
