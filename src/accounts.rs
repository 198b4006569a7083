//! Account lifecycle: self-registration, login, staff provisioning, deletion
//! and admin XP adjustment.
//!
//! Secrets are stored and compared verbatim.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::domain::{Role, User};
use crate::engine::unlock::initial_unlocks;
use crate::error::{ServiceError, ValidationError};
use crate::ledger::Ledger;
use crate::store::{guarded, Store};
use crate::util::{new_id, normalize_credential};

/// Input for creating an account.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub display_name: String,
    pub credential: String,
    pub secret: String,
    pub role: Role,
}

fn require_field(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::InvalidField { field, reason: "must not be empty".into() });
    }
    Ok(())
}

async fn maintenance_on<S: Store>(store: &S, timeout: Duration) -> Result<bool, ServiceError> {
    Ok(guarded(timeout, store.get_config()).await?.is_some_and(|c| c.maintenance_mode))
}

/// Load the acting user and check their role.
pub async fn require_actor<S: Store>(
    store: &S,
    timeout: Duration,
    actor_id: &str,
    allowed: impl Fn(Role) -> bool,
) -> Result<User, ServiceError> {
    let actor = guarded(timeout, store.get_user(actor_id))
        .await?
        .ok_or_else(|| ServiceError::not_found("user", actor_id))?;
    if !allowed(actor.role) {
        warn!(target: "accounts", %actor_id, role = ?actor.role, "Action not permitted for role");
        return Err(ServiceError::Forbidden(format!("role {:?} may not perform this action", actor.role)));
    }
    Ok(actor)
}

async fn create<S: Store>(store: &S, timeout: Duration, new: NewAccount) -> Result<User, ServiceError> {
    require_field("displayName", &new.display_name)?;
    require_field("credential", &new.credential)?;
    require_field("secret", &new.secret)?;

    let credential = normalize_credential(&new.credential);
    if guarded(timeout, store.find_user_by_credential(&credential)).await?.is_some() {
        return Err(ServiceError::Conflict(format!("credential '{}' is already registered", credential)));
    }

    let chapters = guarded(timeout, store.get_chapters()).await?;
    let user = User {
        id: new_id("u"),
        display_name: new.display_name.trim().to_string(),
        credential_id: credential,
        secret: new.secret,
        role: new.role,
        xp: 0,
        streak: 0,
        last_completion_date: None,
        unlocked_chapters: initial_unlocks(&chapters),
    };
    guarded(timeout, store.save_user(&user)).await?;
    info!(target: "accounts", user_id = %user.id, role = ?user.role, "Account created");
    Ok(user)
}

/// Self-service registration. Always creates a student.
#[instrument(level = "info", skip(store, secret, display_name))]
pub async fn register<S: Store>(
    store: &S,
    timeout: Duration,
    display_name: String,
    credential: String,
    secret: String,
) -> Result<User, ServiceError> {
    if maintenance_on(store, timeout).await? {
        return Err(ServiceError::Maintenance);
    }
    create(store, timeout, NewAccount { display_name, credential, secret, role: Role::Student }).await
}

/// Verbatim credential check. Only admins may log in during maintenance.
#[instrument(level = "info", skip(store, secret))]
pub async fn login<S: Store>(store: &S, timeout: Duration, credential: &str, secret: &str) -> Result<User, ServiceError> {
    let credential = normalize_credential(credential);
    let user = match guarded(timeout, store.find_user_by_credential(&credential)).await? {
        Some(u) if u.secret == secret => u,
        _ => {
            warn!(target: "accounts", %credential, "Login rejected");
            return Err(ServiceError::InvalidCredentials);
        }
    };
    if user.role != Role::Admin && maintenance_on(store, timeout).await? {
        return Err(ServiceError::Maintenance);
    }
    info!(target: "accounts", user_id = %user.id, "Login successful");
    Ok(user)
}

/// Staff-created account of any role.
#[instrument(level = "info", skip(store, new), fields(role = ?new.role))]
pub async fn provision<S: Store>(store: &S, timeout: Duration, actor_id: &str, new: NewAccount) -> Result<User, ServiceError> {
    require_actor(store, timeout, actor_id, Role::is_staff).await?;
    create(store, timeout, new).await
}

/// Admin-only hard delete. Admins cannot delete themselves. Runs under the
/// target's ledger lock so an in-flight attempt cannot write the user back.
#[instrument(level = "info", skip(ledger))]
pub async fn delete_user<S: Store>(ledger: &Ledger<S>, actor_id: &str, target_id: &str) -> Result<(), ServiceError> {
    let (store, timeout) = (ledger.store(), ledger.timeout());
    require_actor(store, timeout, actor_id, |r| r == Role::Admin).await?;
    if actor_id == target_id {
        return Err(ServiceError::Forbidden("you cannot delete your own account".into()));
    }
    let _serial = ledger.lock_user(target_id).await;
    if guarded(timeout, store.get_user(target_id)).await?.is_none() {
        return Err(ServiceError::not_found("user", target_id));
    }
    guarded(timeout, store.delete_user(target_id)).await?;
    info!(target: "accounts", %target_id, "Account deleted");
    Ok(())
}

/// Admin XP correction. Negative deltas saturate at zero.
#[instrument(level = "info", skip(ledger))]
pub async fn adjust_xp<S: Store>(
    ledger: &Ledger<S>,
    actor_id: &str,
    target_id: &str,
    delta: i64,
) -> Result<User, ServiceError> {
    let (store, timeout) = (ledger.store(), ledger.timeout());
    require_actor(store, timeout, actor_id, |r| r == Role::Admin).await?;
    let _serial = ledger.lock_user(target_id).await;
    let mut user = guarded(timeout, store.get_user(target_id))
        .await?
        .ok_or_else(|| ServiceError::not_found("user", target_id))?;
    let next = (i64::from(user.xp) + delta).clamp(0, i64::from(u32::MAX));
    user.xp = next as u32;
    guarded(timeout, store.save_user(&user)).await?;
    info!(target: "accounts", %target_id, delta, xp = user.xp, "XP adjusted");
    Ok(user)
}

/// Students ordered by XP (desc), then display name.
pub async fn leaderboard<S: Store>(store: &S, timeout: Duration) -> Result<Vec<User>, ServiceError> {
    let mut students: Vec<User> = guarded(timeout, store.list_users())
        .await?
        .into_iter()
        .filter(|u| u.role == Role::Student)
        .collect();
    students.sort_by(|a, b| b.xp.cmp(&a.xp).then_with(|| a.display_name.cmp(&b.display_name)));
    Ok(students)
}

/// Every account, staff first, then by display name.
#[instrument(level = "info", skip(store))]
pub async fn list_users<S: Store>(store: &S, timeout: Duration, actor_id: &str) -> Result<Vec<User>, ServiceError> {
    require_actor(store, timeout, actor_id, Role::is_staff).await?;
    let mut users = guarded(timeout, store.list_users()).await?;
    users.sort_by(|a, b| {
        b.role
            .is_staff()
            .cmp(&a.role.is_staff())
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
    Ok(users)
}
