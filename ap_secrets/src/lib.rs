use aws_sdk_secretsmanager::client::Client as SecretsManagerClient;
use redact::Secret;
use serde::{Deserialize, Serialize};
use types::{Platform, PlatformTokens};

/// Trait for token secrets
/// Trait for managing platform token secrets, providing methods to set and clear tokens.
///
/// # Usage
/// Implement this trait for any type that needs to hold OAuth tokens.
/// The type must be serializable and deserializable using serde.
///
/// # Methods
/// - `set_tokens`: Sets the access token, refresh token, and validity for the secret.
/// - `clear_tokens`: Clears the access token, refresh token, and validity for the secret.
/// - `is_expired`: Whether the access token is missing or past its validity.
pub trait TokenSecret: Serialize + for<'de> Deserialize<'de> + Default {
    fn set_tokens(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        valid_until: Option<f64>,
    );
    fn clear_tokens(&mut self);
    fn is_expired(&self, now_secs: f64) -> bool;
}

impl TokenSecret for PlatformTokens {
    fn set_tokens(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        valid_until: Option<f64>,
    ) {
        self.access_token = Some(access_token);
        self.refresh_token = refresh_token;
        self.valid_until = valid_until;
    }

    fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.valid_until = None;
    }

    fn is_expired(&self, now_secs: f64) -> bool {
        if self.access_token.is_none() {
            return true;
        }

        self.valid_until
            .is_some_and(|valid_until| valid_until <= now_secs)
    }
}

/// Name of the secret holding the tokens of one tenant's platform account.
#[must_use]
pub fn connection_secret_id(
    prefix: &str,
    tenant_id: &str,
    platform: Platform,
) -> String {
    format!("{}/{tenant_id}/{platform}", prefix.trim_end_matches('/'))
}

#[derive(Deserialize)]
struct ApiKeySecret {
    #[serde(alias = "key", alias = "apiKey")]
    api_key: String,
}

/// Parse an API key secret: either the bare key, or a JSON object with an
/// `api_key` field. Blank values are treated as absent.
fn parse_api_key(secret_string: &str) -> Option<Secret<String>> {
    let trimmed = secret_string.trim();

    let key = if trimmed.starts_with('{') {
        serde_json::from_str::<ApiKeySecret>(trimmed)
            .ok()
            .map(|secret| secret.api_key)?
    } else {
        trimmed.to_string()
    };

    if key.trim().is_empty() {
        None
    } else {
        Some(Secret::new(key))
    }
}

/// Get an upstream API key from the secrets manager.
///
/// # Arguments
///
/// * `secrets_manager` - The secrets manager client
/// * `secret_id` - The secret id or ARN
///
/// # Returns
///
/// * `Result<Secret<String>, String>` - The API key
///
/// # Errors
///
/// * `String` - The error message if the secret cannot be read or holds no key.
///
pub async fn get_api_key(
    secrets_manager: &SecretsManagerClient,
    secret_id: &str,
) -> Result<Secret<String>, String> {
    let secret = secrets_manager
        .get_secret_value()
        .secret_id(secret_id)
        .send()
        .await
        .map_err(|e| {
            tracing::error!("failed to get secret: {:?}", e);
            e.to_string()
        })?;

    let secret_string = secret
        .secret_string
        .ok_or_else(|| "secret string not found".to_string())?;

    parse_api_key(&secret_string)
        .ok_or_else(|| format!("secret {secret_id} does not hold an api key"))
}

/// Create or replace a secret in the secrets manager.
///
/// A new value is put on the existing secret; when the secret does not exist
/// yet it is created.
///
/// # Errors
///
/// * `String` - The error message if the operation fails.
///
pub async fn create_or_replace<T: TokenSecret + Send + Sync>(
    secrets_manager: &SecretsManagerClient,
    secret_id: &str,
    secret: &T,
) -> Result<(), String> {
    let secret_string = serde_json::to_string(secret).map_err(|e| e.to_string())?;

    let result = secrets_manager
        .put_secret_value()
        .secret_id(secret_id)
        .secret_string(&secret_string)
        .send()
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(e)
            if e.as_service_error()
                .is_some_and(|e| e.is_resource_not_found_exception()) =>
        {
            tracing::info!("secret {secret_id} not found, creating it");
            secrets_manager
                .create_secret()
                .name(secret_id)
                .secret_string(secret_string)
                .send()
                .await
                .map_err(|e| {
                    tracing::error!("failed to create secret: {:?}", e);
                    e.to_string()
                })?;
            Ok(())
        }
        Err(e) => {
            tracing::error!("failed to create or replace secret: {:?}", e);
            Err(e.to_string())
        }
    }
}

/// Get a secret from the secrets manager.
///
/// A missing secret yields `Ok(None)`.
///
/// # Errors
///
/// * `String` - The error message if the operation fails.
///
pub async fn get<T: TokenSecret>(
    secrets_manager: &SecretsManagerClient,
    secret_id: &str,
) -> Result<Option<T>, String> {
    let secret = match secrets_manager
        .get_secret_value()
        .secret_id(secret_id)
        .send()
        .await
    {
        Ok(secret) => secret,
        Err(e)
            if e.as_service_error()
                .is_some_and(|e| e.is_resource_not_found_exception()) =>
        {
            return Ok(None);
        }
        Err(e) => {
            tracing::error!("failed to get secret: {:?}", e);
            return Err(e.to_string());
        }
    };

    let secret_string = secret
        .secret_string
        .ok_or_else(|| "secret string not found".to_string())?;

    serde_json::from_str(&secret_string)
        .map(Some)
        .map_err(|e| e.to_string())
}

/// Set tokens in a secret, creating it when needed.
///
/// # Errors
///
/// * `String` - The error message if the operation fails.
///
pub async fn set_tokens<T: TokenSecret + Send + Sync>(
    secrets_manager: &SecretsManagerClient,
    secret_id: &str,
    access_token: &str,
    refresh_token: Option<&str>,
    valid_for_duration: Option<std::time::Duration>,
) -> Result<(), String> {
    let mut secret = get::<T>(secrets_manager, secret_id)
        .await?
        .unwrap_or_default();

    let valid_until = calculate_valid_until(valid_for_duration);

    secret.set_tokens(
        access_token.to_string(),
        refresh_token.map(str::to_string),
        valid_until,
    );

    create_or_replace(secrets_manager, secret_id, &secret).await
}

/// Clear tokens in a secret. A missing secret has nothing to clear.
///
/// # Errors
///
/// * `String` - The error message if the operation fails.
///
pub async fn clear_tokens<T: TokenSecret + Send + Sync>(
    secrets_manager: &SecretsManagerClient,
    secret_id: &str,
) -> Result<(), String> {
    let Some(mut secret) = get::<T>(secrets_manager, secret_id).await? else {
        return Ok(());
    };

    secret.clear_tokens();

    create_or_replace(secrets_manager, secret_id, &secret).await
}

/// Calculate the valid until timestamp.
///
/// # Returns
///
/// * `Option<f64>` - Seconds since the unix epoch at which the tokens expire,
///   or `None` when there is no duration or it overflows the clock.
#[must_use]
pub fn calculate_valid_until(
    valid_for_duration: Option<std::time::Duration>,
) -> Option<f64> {
    valid_for_duration.and_then(|d| {
        std::time::SystemTime::now()
            .checked_add(d)
            .map(|valid_until| {
                valid_until
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_else(|_| std::time::Duration::from_secs(0))
                    .as_secs_f64()
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_key_accepts_raw_and_json() {
        let raw = parse_api_key("  pplx-123\n").unwrap();
        assert_eq!(raw.expose_secret(), "pplx-123");

        let json = parse_api_key(r#"{"api_key": "fc-456"}"#).unwrap();
        assert_eq!(json.expose_secret(), "fc-456");

        assert!(parse_api_key("   ").is_none());
        assert!(parse_api_key(r#"{"other": "x"}"#).is_none());
    }

    #[test]
    fn test_connection_secret_id() {
        assert_eq!(
            connection_secret_id("autopilot/connections/", "acme", Platform::Linkedin),
            "autopilot/connections/acme/linkedin"
        );
    }

    #[test]
    fn test_tokens_lifecycle() {
        let mut tokens = PlatformTokens::default();
        assert!(tokens.is_expired(0.0));

        tokens.set_tokens("access".to_string(), None, Some(100.0));
        assert!(!tokens.is_expired(50.0));
        assert!(tokens.is_expired(100.0));

        tokens.set_tokens("access".to_string(), Some("refresh".to_string()), None);
        assert!(!tokens.is_expired(f64::MAX));

        tokens.clear_tokens();
        assert!(tokens.access_token.is_none());
        assert!(tokens.refresh_token.is_none());
        assert!(tokens.is_expired(0.0));
    }

    #[test]
    fn test_calculate_valid_until() {
        assert!(calculate_valid_until(None).is_none());

        let valid_until =
            calculate_valid_until(Some(std::time::Duration::from_secs(3600)))
                .unwrap();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        assert!(valid_until > now + 3500.0);

        assert!(calculate_valid_until(Some(std::time::Duration::MAX)).is_none());
    }
}
