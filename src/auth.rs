//! Token-gated access control
//!
//! When enabled, a user must redeem one of the configured tokens once. Approved
//! user ids are kept in memory and appended to an allow-list file so approvals
//! survive restarts.

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::types::UserId;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Authorization gate shared by all update handlers
#[derive(Debug)]
pub struct AuthGate {
    enabled: bool,
    valid_tokens: HashSet<String>,
    approved: RwLock<HashSet<UserId>>,
    allowed_users_file: Option<PathBuf>,
}

impl AuthGate {
    /// Build the gate, restoring previously approved users from the allow-list file
    ///
    /// A missing file is not an error. Lines that are blank, start with `#` or do
    /// not parse as a user id are skipped.
    pub fn new(config: &AuthConfig) -> Self {
        let valid_tokens = config
            .tokens
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();

        let approved = match (&config.allowed_users_file, config.enabled) {
            (Some(path), true) => load_allowed_users(path),
            _ => HashSet::new(),
        };

        if config.enabled {
            tracing::info!(
                approved_users = approved.len(),
                "Authorization enabled"
            );
        }

        Self {
            enabled: config.enabled,
            valid_tokens,
            approved: RwLock::new(approved),
            allowed_users_file: config.allowed_users_file.clone(),
        }
    }

    /// A gate that lets everyone through
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            valid_tokens: HashSet::new(),
            approved: RwLock::new(HashSet::new()),
            allowed_users_file: None,
        }
    }

    /// Whether token authorization is required
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the user may use the bot
    pub async fn is_authorized(&self, user: UserId) -> bool {
        if !self.enabled {
            return true;
        }
        self.approved.read().await.contains(&user)
    }

    /// Number of approved users
    pub async fn approved_count(&self) -> usize {
        self.approved.read().await.len()
    }

    /// Redeem a token for the user
    ///
    /// Returns true when the token is valid (including when the user was already
    /// approved). A newly approved user is appended to the allow-list file before
    /// this returns; a failed append is logged and the approval stands.
    pub async fn try_authorize(&self, user: UserId, token: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let mut approved = self.approved.write().await;

        if !self.token_is_valid(token.trim()) {
            tracing::warn!(user_id = user.0, "Authorization attempt with invalid token");
            return false;
        }

        if !approved.insert(user) {
            return true;
        }

        if let Some(path) = &self.allowed_users_file
            && let Err(e) = append_allowed_user(path, user).await
        {
            tracing::warn!(
                user_id = user.0,
                path = %path.display(),
                error = %e,
                "Failed to persist approved user"
            );
        }

        tracing::info!(user_id = user.0, "User authorized");
        true
    }

    /// Like [`AuthGate::try_authorize`], but a rejected token is an
    /// [`Error::Unauthorized`]
    pub async fn authorize(&self, user: UserId, token: &str) -> Result<()> {
        if self.try_authorize(user, token).await {
            Ok(())
        } else {
            Err(Error::Unauthorized(user.0))
        }
    }

    fn token_is_valid(&self, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }
        // Every configured token is compared so timing does not reveal which one matched
        self.valid_tokens
            .iter()
            .fold(false, |found, token| {
                constant_time_eq(candidate.as_bytes(), token.as_bytes()) | found
            })
    }
}

/// Byte comparison whose running time does not depend on where the first mismatch is
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn load_allowed_users(path: &Path) -> HashSet<UserId> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashSet::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read allowed users file");
            return HashSet::new();
        }
    };

    let mut users = HashSet::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.parse::<UserId>() {
            Ok(user) => {
                users.insert(user);
            }
            Err(_) => {
                tracing::warn!(
                    path = %path.display(),
                    line = index + 1,
                    "Skipping malformed line in allowed users file"
                );
            }
        }
    }
    users
}

async fn append_allowed_user(path: &Path, user: UserId) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(format!("{}\n", user.0).as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
