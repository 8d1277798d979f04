//! Local account and usage-quota store.
//!
//! Accounts are keyed by a single canonical identity (the trimmed, lower-cased
//! email) whatever provider signed them in. The whole store lives in one JSON
//! file that is rewritten atomically on every change, under a lock shared by
//! every process using the same file.

use crate::error::AccountError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Business,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Free, Plan::Pro, Plan::Business];

    /// Validation runs granted when the plan is selected
    pub fn uses(self) -> u32 {
        match self {
            Plan::Free => 5,
            Plan::Pro => 500,
            Plan::Business => 5000,
        }
    }

    pub fn price(self) -> &'static str {
        match self {
            Plan::Free => "$0",
            Plan::Pro => "$40/year",
            Plan::Business => "$100/year",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Plan::Free => "Perfect for trying out the validator and occasional use.",
            Plan::Pro => "Ideal for developers and content creators with regular validation needs.",
            Plan::Business => {
                "For teams and businesses that rely on frequent and high-volume AI response validation."
            }
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Plan::Free => "Free",
            Plan::Pro => "Pro",
            Plan::Business => "Business",
        })
    }
}

/// How an account signs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Password,
    Google,
    Github,
}

impl Provider {
    /// Identity used for a simulated social login
    fn social_email(self) -> Option<String> {
        match self {
            Provider::Password => None,
            Provider::Google => Some("user@google.com".to_string()),
            Provider::Github => Some("user@github.com".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub provider: Provider,
    pub plan: Plan,
    pub uses_remaining: u32,
}

/// Account and quota collaborator used by the session
pub trait AccountStore: Send + Sync {
    fn current_user(&self) -> Result<Option<User>, AccountError>;
    fn signup(&self, email: &str, password: &str) -> Result<User, AccountError>;
    fn login(&self, email: &str, password: &str) -> Result<User, AccountError>;
    fn login_with_provider(&self, provider: Provider) -> Result<User, AccountError>;
    fn logout(&self) -> Result<(), AccountError>;
    fn select_plan(&self, plan: Plan) -> Result<User, AccountError>;
    /// Spend one validation run from the account `email`, saturating at zero.
    ///
    /// The account is named explicitly so a run is charged to whoever passed
    /// the quota check, even if the signed-in user changed while it ran.
    fn decrement_usage(&self, email: &str) -> Result<User, AccountError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountRecord {
    #[serde(flatten)]
    user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password_sha256: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    current: Option<String>,
    #[serde(default)]
    accounts: BTreeMap<String, AccountRecord>,
}

impl StoreFile {
    fn current_record_mut(&mut self) -> Result<&mut AccountRecord, AccountError> {
        let key = self.current.as_ref().ok_or(AccountError::NotSignedIn)?;
        self.accounts.get_mut(key).ok_or(AccountError::NotSignedIn)
    }
}

fn identity_key(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

fn new_user(email: String, provider: Provider) -> User {
    User {
        email,
        provider,
        plan: Plan::Free,
        uses_remaining: Plan::Free.uses(),
    }
}

/// [`AccountStore`] persisted as a JSON file.
///
/// Writers take an exclusive lock on a sibling `.lock` file for the whole
/// load-modify-save, so separate processes sharing one store never lose an
/// update. Saves go through a uniquely named temp file renamed over the store,
/// so readers only ever see a complete file.
pub struct FileAccountStore {
    path: PathBuf,
}

impl FileAccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> AccountError {
        AccountError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Directory holding the store, lock and temp files
    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("accounts"));
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Block until this process holds the store's exclusive lock.
    ///
    /// The lock is released when the returned file is dropped.
    fn lock_exclusive(&self) -> Result<File, AccountError> {
        std::fs::create_dir_all(self.directory()).map_err(|e| self.io_error(e))?;
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .map_err(|e| self.io_error(e))?;
        lock_file.lock().map_err(|e| self.io_error(e))?;
        Ok(lock_file)
    }

    fn load(&self) -> Result<StoreFile, AccountError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreFile::default()),
            Err(e) => return Err(self.io_error(e)),
        };
        serde_json::from_str(&content).map_err(|source| AccountError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Write the store to a fresh temp file beside it, then rename it into place
    fn save(&self, store: &StoreFile) -> Result<(), AccountError> {
        let json = serde_json::to_string_pretty(store)
            .map_err(|source| AccountError::Serialize { source })?;
        let mut tmp = NamedTempFile::new_in(self.directory()).map_err(|e| self.io_error(e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;
        Ok(())
    }

    /// Run a read-modify-write transaction against the store.
    ///
    /// Nothing is written when `f` fails.
    fn update<T>(
        &self,
        f: impl FnOnce(&mut StoreFile) -> Result<T, AccountError>,
    ) -> Result<T, AccountError> {
        let _lock = self.lock_exclusive()?;
        let mut store = self.load()?;
        let value = f(&mut store)?;
        self.save(&store)?;
        Ok(value)
    }
}

impl AccountStore for FileAccountStore {
    fn current_user(&self) -> Result<Option<User>, AccountError> {
        let store = self.load()?;
        Ok(store
            .current
            .as_ref()
            .and_then(|key| store.accounts.get(key))
            .map(|record| record.user.clone()))
    }

    fn signup(&self, email: &str, password: &str) -> Result<User, AccountError> {
        let key = identity_key(email);
        if key.is_empty() {
            return Err(AccountError::MissingField("an email"));
        }
        if password.is_empty() {
            return Err(AccountError::MissingField("a password"));
        }

        self.update(|store| {
            if store.accounts.contains_key(&key) {
                return Err(AccountError::UserExists);
            }
            let user = new_user(key.clone(), Provider::Password);
            store.accounts.insert(
                key.clone(),
                AccountRecord {
                    user: user.clone(),
                    password_sha256: Some(hash_password(password)),
                },
            );
            store.current = Some(key.clone());
            tracing::info!(email = %key, "account created");
            Ok(user)
        })
    }

    fn login(&self, email: &str, password: &str) -> Result<User, AccountError> {
        let key = identity_key(email);
        let digest = hash_password(password);

        self.update(|store| {
            let record = store
                .accounts
                .get(&key)
                .filter(|record| record.password_sha256.as_deref() == Some(digest.as_str()))
                .ok_or(AccountError::InvalidCredentials)?;
            let user = record.user.clone();
            store.current = Some(key.clone());
            Ok(user)
        })
    }

    fn login_with_provider(&self, provider: Provider) -> Result<User, AccountError> {
        let Some(email) = provider.social_email() else {
            return Err(AccountError::MissingField("a social login provider"));
        };
        let key = identity_key(&email);

        self.update(|store| {
            let record = store.accounts.entry(key.clone()).or_insert_with(|| {
                tracing::info!(email = %key, ?provider, "social account created");
                AccountRecord {
                    user: new_user(key.clone(), provider),
                    password_sha256: None,
                }
            });
            let user = record.user.clone();
            store.current = Some(key.clone());
            Ok(user)
        })
    }

    fn logout(&self) -> Result<(), AccountError> {
        self.update(|store| {
            store.current = None;
            Ok(())
        })
    }

    fn select_plan(&self, plan: Plan) -> Result<User, AccountError> {
        self.update(|store| {
            let record = store.current_record_mut()?;
            record.user.plan = plan;
            record.user.uses_remaining = plan.uses();
            tracing::info!(email = %record.user.email, %plan, "plan selected");
            Ok(record.user.clone())
        })
    }

    fn decrement_usage(&self, email: &str) -> Result<User, AccountError> {
        let key = identity_key(email);
        self.update(|store| {
            let record = store
                .accounts
                .get_mut(&key)
                .ok_or_else(|| AccountError::UnknownAccount(key.clone()))?;
            record.user.uses_remaining = record.user.uses_remaining.saturating_sub(1);
            Ok(record.user.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> FileAccountStore {
        FileAccountStore::new(dir.path().join("nested").join("accounts.json"))
    }

    #[test]
    fn test_empty_store_has_no_user() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.current_user().unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_signup_creates_free_user() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let user = store.signup("  Alice@Example.com ", "secret").unwrap();

        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.plan, Plan::Free);
        assert_eq!(user.uses_remaining, 5);
        assert_eq!(store.current_user().unwrap(), Some(user));
    }

    #[test]
    fn test_signup_rejects_duplicate_identity() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.signup("alice@example.com", "secret").unwrap();

        let err = store.signup("ALICE@example.com", "other").unwrap_err();
        assert_eq!(err.to_string(), "User with this email already exists.");
    }

    #[test]
    fn test_signup_requires_fields() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        assert!(matches!(
            store.signup("   ", "secret"),
            Err(AccountError::MissingField(_))
        ));
        assert!(matches!(
            store.signup("alice@example.com", ""),
            Err(AccountError::MissingField(_))
        ));
    }

    #[test]
    fn test_password_is_not_stored_in_clear() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.signup("alice@example.com", "hunter2").unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert!(!content.contains("hunter2"));
        assert!(content.contains(&hash_password("hunter2")));
    }

    #[test]
    fn test_login_restores_state() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.signup("alice@example.com", "secret").unwrap();
        store.select_plan(Plan::Pro).unwrap();
        store.decrement_usage("alice@example.com").unwrap();
        store.logout().unwrap();
        assert_eq!(store.current_user().unwrap(), None);

        let user = store.login("alice@example.com", "secret").unwrap();
        assert_eq!(user.plan, Plan::Pro);
        assert_eq!(user.uses_remaining, 499);
    }

    #[test]
    fn test_login_rejects_bad_credentials() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.signup("alice@example.com", "secret").unwrap();
        store.logout().unwrap();

        let err = store.login("alice@example.com", "wrong").unwrap_err();
        assert_eq!(err.to_string(), "Invalid email or password.");
        assert!(matches!(
            store.login("nobody@example.com", "secret"),
            Err(AccountError::InvalidCredentials)
        ));
        assert_eq!(store.current_user().unwrap(), None);
    }

    #[test]
    fn test_provider_login_reuses_single_record() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let user = store.login_with_provider(Provider::Github).unwrap();
        assert_eq!(user.email, "user@github.com");
        store.decrement_usage("user@github.com").unwrap();
        store.logout().unwrap();

        let user = store.login_with_provider(Provider::Github).unwrap();
        assert_eq!(user.uses_remaining, 4);
        assert_eq!(user.provider, Provider::Github);
    }

    #[test]
    fn test_provider_account_cannot_use_password_login() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.login_with_provider(Provider::Google).unwrap();
        store.logout().unwrap();

        assert!(matches!(
            store.login("user@google.com", ""),
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_select_plan_resets_uses() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.signup("alice@example.com", "secret").unwrap();
        store.decrement_usage("alice@example.com").unwrap();

        let user = store.select_plan(Plan::Business).unwrap();
        assert_eq!(user.uses_remaining, 5000);
        let user = store.select_plan(Plan::Free).unwrap();
        assert_eq!(user.uses_remaining, 5);
    }

    #[test]
    fn test_select_plan_requires_sign_in() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        assert!(matches!(
            store.select_plan(Plan::Pro),
            Err(AccountError::NotSignedIn)
        ));
    }

    #[test]
    fn test_decrement_unknown_account_fails() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.signup("alice@example.com", "secret").unwrap();

        let err = store.decrement_usage("bob@example.com").unwrap_err();
        assert!(matches!(err, AccountError::UnknownAccount(_)));
        assert_eq!(store.current_user().unwrap().unwrap().uses_remaining, 5);
    }

    #[test]
    fn test_decrement_charges_named_account_not_current_user() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.signup("alice@example.com", "secret").unwrap();
        store.signup("bob@example.com", "secret").unwrap();

        let alice = store.decrement_usage("Alice@Example.com").unwrap();
        assert_eq!(alice.uses_remaining, 4);

        let bob = store.current_user().unwrap().unwrap();
        assert_eq!(bob.email, "bob@example.com");
        assert_eq!(bob.uses_remaining, 5);
    }

    #[test]
    fn test_decrement_saturates_at_zero() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.signup("alice@example.com", "secret").unwrap();

        for _ in 0..7 {
            store.decrement_usage("alice@example.com").unwrap();
        }
        assert_eq!(store.current_user().unwrap().unwrap().uses_remaining, 0);
    }

    #[test]
    fn test_concurrent_decrements_are_serialized() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(store_in(&dir));
        store.signup("alice@example.com", "secret").unwrap();
        store.select_plan(Plan::Pro).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.decrement_usage("alice@example.com").unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.current_user().unwrap().unwrap().uses_remaining, 492);
    }

    #[test]
    fn test_separate_store_handles_do_not_lose_decrements() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let setup = FileAccountStore::new(&path);
        setup.signup("alice@example.com", "secret").unwrap();
        setup.select_plan(Plan::Pro).unwrap();

        // Each handle stands in for a separate CLI process on the same file
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = FileAccountStore::new(&path);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.decrement_usage("alice@example.com").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let user = FileAccountStore::new(&path).current_user().unwrap().unwrap();
        assert_eq!(user.uses_remaining, 400);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name != "accounts.json" && name != "accounts.json.lock")
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
    }

    #[test]
    fn test_corrupt_store_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = FileAccountStore::new(&path);

        assert!(matches!(
            store.current_user(),
            Err(AccountError::Corrupt { .. })
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn test_plan_quotas() {
        assert_eq!(Plan::Free.uses(), 5);
        assert_eq!(Plan::Pro.uses(), 500);
        assert_eq!(Plan::Business.uses(), 5000);
        assert_eq!(Plan::Pro.to_string(), "Pro");
    }
}
