//! Login against the vendor account endpoint.

use crate::api::client::ApiClient;
use crate::config::AccountConfig;
use crate::error::{AuraError, Result};
use crate::models::User;
use std::sync::Arc;
use tracing::info;

const MIN_PASSWORD_LENGTH: usize = 6;

pub struct AccountApi {
    client: Arc<ApiClient>,
}

impl AccountApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// Authenticate and install the session's auth headers on the shared
    /// transport. Fails fast; login is never retried.
    pub async fn login(&self, account: &AccountConfig) -> Result<User> {
        validate_email(&account.email)?;
        validate_password(&account.password)?;

        let payload = serde_json::json!({
            "user": {
                "email": account.email,
                "password": account.password,
            },
            "locale": account.locale,
            "app_identifier": account.app_identifier,
            "identifier_for_vendor": account.device_identifier,
            "client_device_id": account.device_identifier,
        });

        let response = self.client.post("/login.json", payload).await?;

        if response.get("error").is_some() || response.get("result").is_none() {
            let message = response
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("login rejected");
            return Err(AuraError::Authentication(message.to_string()));
        }

        let user: User = serde_json::from_value(
            response["result"]["current_user"].clone(),
        )
        .map_err(|e| AuraError::Authentication(format!("malformed login response: {e}")))?;

        let token = user.auth_token.clone().ok_or_else(|| {
            AuraError::Authentication("login response carried no auth token".to_string())
        })?;
        self.client.set_auth(token, user.id.clone());

        info!(user_id = %user.id, "logged in");
        Ok(user)
    }
}

fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AuraError::Validation("invalid email format".to_string()))
    }
}

fn validate_password(password: &str) -> Result<()> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuraError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}
