use tracing::{error, info, warn};

use super::claims::{Claims, Role};
use super::dto::PublicUser;
use super::jwt::JwtKeys;
use super::password::verify_password;
use super::throttle::AttemptLimiter;
use crate::config::AdminConfig;
use crate::error::{AppError, AppResult};

/// Credential check, token issuance and failed-login throttling for the
/// single configured admin account.
pub struct AuthGate {
    keys: JwtKeys,
    admin: AdminConfig,
    throttle: AttemptLimiter,
}

impl AuthGate {
    pub fn new(keys: JwtKeys, admin: AdminConfig, throttle: AttemptLimiter) -> Self {
        Self {
            keys,
            admin,
            throttle,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub fn throttle(&self) -> &AttemptLimiter {
        &self.throttle
    }

    /// Exchange credentials for a token. The attempt is reserved against the
    /// caller's budget before credentials are looked at, so a throttled
    /// identity never reaches the password check.
    pub async fn login(
        &self,
        identity: &str,
        username: &str,
        password: &str,
    ) -> AppResult<(String, PublicUser)> {
        let attempt = self.throttle.try_acquire(identity).map_err(|used| {
            warn!(client = %identity, attempts = used, "login rejected, too many failed attempts");
            AppError::TooManyAttempts
        })?;

        // Verify the password even for an unknown username so both failures cost the same.
        let hash = self.admin.password_hash.clone();
        let plain = password.to_string();
        let password_ok = tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("password check task failed: {e}")))?
            .map_err(|e| {
                error!(error = %e, "configured admin password hash is unusable");
                AppError::Internal("admin password hash is malformed".into())
            })?;
        let username_ok = username == self.admin.username;

        if !(username_ok && password_ok) {
            warn!(client = %identity, attempts = attempt, "login failed");
            return Err(AppError::Unauthorized);
        }

        self.throttle.reset(identity);
        let user = PublicUser {
            id: self.admin.username.clone(),
            username: self.admin.username.clone(),
            role: Role::Admin,
        };
        let token = self
            .keys
            .sign(&user.id, &user.username, user.role)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        info!(username = %user.username, "login succeeded");
        Ok((token, user))
    }

    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        self.keys.verify(token).map_err(|e| {
            warn!(error = %e, "token rejected");
            AppError::Unauthorized
        })
    }
}

/// Admin satisfies every role requirement.
pub fn require_role(claims: &Claims, role: Role) -> AppResult<()> {
    if claims.role == role || claims.role == Role::Admin {
        Ok(())
    } else {
        warn!(user = %claims.username, required = role.as_str(), "role check failed");
        Err(AppError::Forbidden)
    }
}
