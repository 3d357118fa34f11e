use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::error::{ResourceError, StoreError, ValidationError};
use crate::policy::{can_manage_users, Actor};
use crate::store::{ResourceStore, USERS_KEY};
use crate::types::{CreateUserRequest, Role, UpdateUserRequest, User};

type HmacSha256 = Hmac<Sha256>;

const HASH_SCHEME: &str = "sha256";

fn mac_for(salt: &str, password: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(password.as_bytes());
    mac
}

/// Hash a password as `sha256$<salt>$<base64 mac>` with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    let digest = mac_for(&salt, password).finalize().into_bytes();
    format!(
        "{}${}${}",
        HASH_SCHEME,
        salt,
        general_purpose::STANDARD.encode(digest)
    )
}

/// Check a password against a stored value. Values without the hash scheme
/// prefix are plaintext from older clients.
pub fn verify_password(stored: &str, password: &str) -> bool {
    let Some(rest) = stored.strip_prefix(HASH_SCHEME).and_then(|r| r.strip_prefix('$')) else {
        return stored == password;
    };
    let Some((salt, encoded)) = rest.split_once('$') else {
        return false;
    };
    match general_purpose::STANDARD.decode(encoded) {
        Ok(expected) => mac_for(salt, password).verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

/// All user accounts, persisted as one collection like points and areas.
/// Usernames cannot be changed, so name-keyed assignments stay valid.
pub struct UserDirectory<S> {
    store: Arc<S>,
    users: Vec<User>,
}

impl<S: ResourceStore> UserDirectory<S> {
    pub async fn load(store: Arc<S>) -> Result<Self, StoreError> {
        let users = match store.get_string(USERS_KEY).await? {
            Some(raw) => decode_users(&raw),
            None => Vec::new(),
        };
        Ok(Self { store, users })
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn get(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn actor(&self, username: &str) -> Option<Actor> {
        self.get(username).map(|u| Actor::new(u.username.clone(), u.role))
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Option<Actor> {
        let user = self.get(username.trim())?;
        if verify_password(&user.password, password) {
            Some(Actor::new(user.username.clone(), user.role))
        } else {
            tracing::warn!("Failed login for {}", user.username);
            None
        }
    }

    fn is_last_admin(&self, user: &User) -> bool {
        user.role == Role::Admin
            && self.users.iter().filter(|u| u.role == Role::Admin).count() == 1
    }

    async fn commit(&mut self, users: Vec<User>) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&users)?;
        self.store.set_string(USERS_KEY, &raw).await?;
        self.users = users;
        Ok(())
    }

    /// Create the first admin when no account exists yet. Returns whether an
    /// account was created.
    pub async fn ensure_admin(&mut self, username: &str, password: &str) -> Result<bool, StoreError> {
        if !self.users.is_empty() {
            return Ok(false);
        }
        let admin = User {
            username: username.to_string(),
            password: hash_password(password),
            role: Role::Admin,
        };
        self.commit(vec![admin]).await?;
        tracing::info!("Created initial admin account {}", username);
        Ok(true)
    }

    pub async fn create_user(
        &mut self,
        actor: &Actor,
        req: CreateUserRequest,
    ) -> Result<User, ResourceError> {
        if !can_manage_users(actor.role) {
            return Err(ResourceError::Unauthorized {
                action: "create users",
            });
        }
        let username = req.username.trim();
        if username.is_empty() {
            return Err(ValidationError::EmptyUsername.into());
        }
        if self.get(username).is_some() {
            return Err(ValidationError::DuplicateUsername(username.to_string()).into());
        }
        if req.password.is_empty() {
            return Err(ValidationError::EmptyPassword.into());
        }

        let user = User {
            username: username.to_string(),
            password: hash_password(&req.password),
            role: req.role,
        };
        let mut users = self.users.clone();
        users.push(user.clone());
        self.commit(users).await?;

        tracing::info!("{} created user {} ({:?})", actor.username, user.username, user.role);
        Ok(user)
    }

    pub async fn delete_user(&mut self, actor: &Actor, username: &str) -> Result<User, ResourceError> {
        if !can_manage_users(actor.role) {
            return Err(ResourceError::Unauthorized {
                action: "delete users",
            });
        }
        let removed = self
            .get(username)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(format!("user {}", username)))?;
        if self.is_last_admin(&removed) {
            return Err(ValidationError::LastAdmin(removed.username).into());
        }

        let users = self
            .users
            .iter()
            .filter(|u| u.username != username)
            .cloned()
            .collect();
        self.commit(users).await?;

        tracing::info!("{} deleted user {}", actor.username, username);
        Ok(removed)
    }

    /// Change role and/or password. Users may change their own password;
    /// everything else needs an admin.
    pub async fn update_user(
        &mut self,
        actor: &Actor,
        username: &str,
        req: UpdateUserRequest,
    ) -> Result<User, ResourceError> {
        let is_admin = can_manage_users(actor.role);
        if req.role.is_some() && !is_admin {
            return Err(ResourceError::Unauthorized {
                action: "change roles",
            });
        }
        if req.password.is_some() && !is_admin && actor.username != username {
            return Err(ResourceError::Unauthorized {
                action: "change other users' passwords",
            });
        }
        if req.password.as_deref() == Some("") {
            return Err(ValidationError::EmptyPassword.into());
        }

        let mut updated = self
            .get(username)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(format!("user {}", username)))?;
        if req.role.is_some_and(|role| role != Role::Admin) && self.is_last_admin(&updated) {
            return Err(ValidationError::LastAdmin(updated.username).into());
        }
        if let Some(role) = req.role {
            updated.role = role;
        }
        if let Some(password) = &req.password {
            updated.password = hash_password(password);
        }

        let users = self
            .users
            .iter()
            .map(|u| if u.username == username { updated.clone() } else { u.clone() })
            .collect();
        self.commit(users).await?;

        tracing::info!("{} updated user {}", actor.username, username);
        Ok(updated)
    }
}

fn decode_users(raw: &str) -> Vec<User> {
    let entries: Vec<Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Stored {} collection is not a JSON array, ignoring it: {}", USERS_KEY, e);
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<User>(entry) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!("Skipping malformed user at {}[{}]: {}", USERS_KEY, index, e);
                None
            }
        })
        .collect()
}
