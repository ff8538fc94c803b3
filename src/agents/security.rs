//! Caller checks run before an agent does any work.

use crate::services::AuthService;
use crate::types::{AppError, AuthUser, Result};
use crate::utils::toml_config::AgentConfig;

/// Enforce the agent's security policy for `user`.
///
/// Agents without a policy accept every caller. With a policy, a missing
/// user fails when authentication is required; a supplied user must be the
/// authenticated principal, hold an allowed role, and the agent's own domain
/// must be allowed.
pub async fn authorize(
    config: &AgentConfig,
    user: Option<&AuthUser>,
    auth: &dyn AuthService,
) -> Result<()> {
    let policy = match &config.security {
        Some(policy) => policy,
        None => return Ok(()),
    };

    let user = match user {
        Some(user) => user,
        None if policy.require_auth => {
            return Err(AppError::Security(format!(
                "agent '{}' requires an authenticated user",
                config.id
            )))
        }
        None => return Ok(()),
    };

    let verified = auth.verify(&user.id).await.map_err(|e| {
        AppError::Security(format!("authentication check failed for '{}': {}", user.id, e.message()))
    })?;
    if !verified {
        return Err(AppError::Security(format!(
            "user '{}' is not the authenticated principal",
            user.id
        )));
    }

    if let Some(roles) = &policy.allowed_roles {
        if !roles.contains(&user.role) {
            return Err(AppError::Security(format!(
                "role '{}' is not allowed to use agent '{}'",
                user.role, config.id
            )));
        }
    }

    if let Some(domains) = &policy.allowed_domains {
        if !domains.contains(&config.domain_code) {
            return Err(AppError::Security(format!(
                "domain '{}' is not allowed for agent '{}'",
                config.domain_code, config.id
            )));
        }
    }

    Ok(())
}
