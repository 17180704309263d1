//! Account resolution and secret checks.
//!
//! Every device request carries a claimed secret and, in multi-account
//! deployments, an account segment in the URL path. Resolution
//! authenticates the request and yields the immutable [`AccountContext`]
//! used for number normalization and routing-context stamping.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{AccountConfig, AccountEntry, Config};

/// Immutable routing identity of one gateway account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountContext {
    /// Account identifier (queues are keyed by this)
    pub account_id: String,
    /// Shared secret the device presents, echoed back on poll
    pub secret: String,
    /// Dialing code used to canonicalize this account's numbers
    pub dialing_code: String,
}

impl AccountContext {
    /// Create a new account context.
    pub fn new(
        account_id: impl Into<String>,
        secret: impl Into<String>,
        dialing_code: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            secret: secret.into(),
            dialing_code: dialing_code.into(),
        }
    }
}

/// Resolution failure.
///
/// Both variants collapse to the same generic failure response at the
/// HTTP boundary so account names cannot be enumerated.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// Claimed secret does not match the account's configured secret.
    #[error("authentication failed")]
    AuthenticationFailed,
    /// No account matches the request's path segment (or its absence).
    #[error("unknown account")]
    AccountNotFound,
}

/// Maps a request to an account and checks its secret in one step.
pub trait AccountResolver: Send + Sync {
    /// Resolve by optional URL path segment and claimed secret.
    fn resolve(
        &self,
        segment: Option<&str>,
        claimed_secret: &str,
    ) -> Result<AccountContext, ResolveError>;
}

/// Shared trait object, picked by account mode at startup.
pub type SharedResolver = Arc<dyn AccountResolver>;

fn secret_matches(configured: &str, accept_any: bool, claimed: &str) -> bool {
    accept_any || configured == claimed
}

/// Single-tenant resolver: one implicit account, no path segment.
pub struct FixedAccount {
    context: AccountContext,
    accept_any_secret: bool,
}

impl FixedAccount {
    /// Create a resolver with an exact-match secret.
    pub fn new(context: AccountContext) -> Self {
        Self {
            context,
            accept_any_secret: false,
        }
    }

    /// Skip the secret check entirely.
    ///
    /// This is the no-auth mode for single-tenant deployments; it must be
    /// requested explicitly, never inferred from an empty secret.
    pub fn accept_any_secret(mut self) -> Self {
        self.accept_any_secret = true;
        self
    }

    /// Build from the single-account config section.
    pub fn from_config(cfg: &AccountConfig) -> Self {
        Self {
            context: AccountContext::new(&cfg.id, &cfg.secret, &cfg.dialing_code),
            accept_any_secret: cfg.accept_any_secret,
        }
    }
}

impl AccountResolver for FixedAccount {
    fn resolve(
        &self,
        segment: Option<&str>,
        claimed_secret: &str,
    ) -> Result<AccountContext, ResolveError> {
        if segment.is_some() {
            return Err(ResolveError::AccountNotFound);
        }
        if !secret_matches(&self.context.secret, self.accept_any_secret, claimed_secret) {
            return Err(ResolveError::AuthenticationFailed);
        }
        Ok(self.context.clone())
    }
}

/// Multi-tenant resolver: accounts keyed by the URL path segment.
#[derive(Default)]
pub struct AccountTable {
    accounts: HashMap<String, TableEntry>,
}

struct TableEntry {
    context: AccountContext,
    accept_any_secret: bool,
}

impl AccountTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account with an exact-match secret.
    pub fn add(&mut self, context: AccountContext) {
        self.insert(context, false);
    }

    /// Add an account that accepts any claimed secret.
    pub fn add_accept_any(&mut self, context: AccountContext) {
        self.insert(context, true);
    }

    fn insert(&mut self, context: AccountContext, accept_any_secret: bool) {
        self.accounts.insert(
            context.account_id.clone(),
            TableEntry {
                context,
                accept_any_secret,
            },
        );
    }

    /// Build from the multi-account config section.
    pub fn from_config(accounts: &HashMap<String, AccountEntry>) -> Self {
        let mut table = Self::new();
        for (id, entry) in accounts {
            let context = AccountContext::new(id, &entry.secret, &entry.dialing_code);
            table.insert(context, entry.accept_any_secret);
        }
        table
    }

    /// Number of configured accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// True if no accounts are configured.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl AccountResolver for AccountTable {
    fn resolve(
        &self,
        segment: Option<&str>,
        claimed_secret: &str,
    ) -> Result<AccountContext, ResolveError> {
        let Some(segment) = segment else {
            return Err(ResolveError::AccountNotFound);
        };
        let entry = self
            .accounts
            .get(segment)
            .ok_or(ResolveError::AccountNotFound)?;
        if !secret_matches(&entry.context.secret, entry.accept_any_secret, claimed_secret) {
            return Err(ResolveError::AuthenticationFailed);
        }
        Ok(entry.context.clone())
    }
}

/// Create the resolver selected by the configuration's account mode.
pub fn create_resolver(config: &Config) -> anyhow::Result<SharedResolver> {
    match (&config.account, &config.accounts) {
        (Some(single), None) => {
            tracing::info!(account = %single.id, "single-account mode");
            Ok(Arc::new(FixedAccount::from_config(single)))
        }
        (None, Some(accounts)) => {
            tracing::info!(accounts = accounts.len(), "multi-account mode");
            Ok(Arc::new(AccountTable::from_config(accounts)))
        }
        _ => anyhow::bail!("configuration must define exactly one of account / accounts"),
    }
}
