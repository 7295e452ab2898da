//! Publishing accounts known to the host: the list/add/remove RPC triple.

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("account `{0}` already exists")]
    Duplicate(String),
    #[error("account `{0}` not found")]
    NotFound(String),
    #[error("account name must not be empty")]
    EmptyName,
}

#[async_trait]
pub trait AccountsRepo: Send + Sync {
    async fn list(&self) -> Vec<String>;
    /// Returns `false` when the name is already present.
    async fn insert(&self, name: &str) -> bool;
    /// Returns `false` when the name was not present.
    async fn remove(&self, name: &str) -> bool;
}

#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    names: RwLock<BTreeSet<String>>,
}

#[async_trait]
impl AccountsRepo for InMemoryAccounts {
    async fn list(&self) -> Vec<String> {
        self.names.read().await.iter().cloned().collect()
    }

    async fn insert(&self, name: &str) -> bool {
        self.names.write().await.insert(name.to_string())
    }

    async fn remove(&self, name: &str) -> bool {
        self.names.write().await.remove(name)
    }
}

#[derive(Clone)]
pub struct AccountService {
    repo: Arc<dyn AccountsRepo>,
}

impl AccountService {
    pub fn new(repo: Arc<dyn AccountsRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> Vec<String> {
        let mut names = self.repo.list().await;
        names.sort();
        names
    }

    pub async fn add(&self, name: &str) -> Result<(), AccountError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AccountError::EmptyName);
        }
        if !self.repo.insert(name).await {
            return Err(AccountError::Duplicate(name.to_string()));
        }
        info!(
            target = "application::accounts",
            op = "accounts::add",
            account = name,
            "Account added"
        );
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Result<(), AccountError> {
        let name = name.trim();
        if !self.repo.remove(name).await {
            return Err(AccountError::NotFound(name.to_string()));
        }
        info!(
            target = "application::accounts",
            op = "accounts::remove",
            account = name,
            "Account removed"
        );
        Ok(())
    }
}
