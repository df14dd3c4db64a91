//! Account and credential CRUD with the single-primary-per-plugin
//! invariant (spec.md §4.3). Grounded on `blob_store`'s atomic-write
//! discipline, generalized to `gateway-store`'s batch-write primitive.

#![deny(unsafe_code)]

pub mod account;
pub mod credential;

pub use account::{
    create_account, delete_account, get_account, get_primary, list_accounts, set_primary, update_account, Account,
};
pub use credential::{
    delete_credentials, get_credentials, get_credentials_legacy, store_credentials, update_credentials,
    Credential, CredentialType,
};
