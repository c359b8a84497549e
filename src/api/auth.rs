//! Login, logout, and the token-exchange payloads.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::client::{ApiClient, AuthState, HttpMethod, RequestSpec};
use crate::errors::ApiError;
use crate::models::User;
use crate::storage::{StoredIdentity, TokenPair};

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: Option<User>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
}

impl ApiClient {
    /// Exchange credentials for a token pair and persist it into the
    /// scope selected by the remember flag (the other scope is cleared).
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<LoginResponse, ApiError> {
        let body = self
            .execute(RequestSpec {
                method: HttpMethod::Post,
                path: "token/".to_string(),
                query: None,
                body: Some(serde_json::json!(LoginRequest {
                    email: email.to_string(),
                    password: password.to_string(),
                })),
            })
            .await?;
        let response: LoginResponse = serde_json::from_value(body).map_err(ApiError::Decode)?;

        let store = self.credential_store();
        store.set_remember_me(remember).map_err(storage_rejection)?;
        let identity = StoredIdentity {
            id: response.user.as_ref().map(|u| u.id).unwrap_or_default(),
        };
        store
            .store_pair(
                TokenPair {
                    access: response.access.clone(),
                    refresh: response.refresh.clone(),
                },
                identity,
                store.login_scope(),
            )
            .map_err(storage_rejection)?;
        self.set_auth_state(AuthState::Authenticated);
        info!(user = ?response.user.as_ref().map(|u| u.id), "logged in");
        Ok(response)
    }

    /// Clear both storage scopes and signal logged out.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.credential_store()
            .clear_all()
            .map_err(storage_rejection)?;
        self.set_auth_state(AuthState::Anonymous);
        info!("logged out");
        Ok(())
    }
}

fn storage_rejection(err: crate::errors::StorageError) -> ApiError {
    ApiError::Rejected {
        status: 0,
        message: format!("credential storage failed: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_serializes_expected_shape() {
        let body = serde_json::json!(LoginRequest {
            email: "ops@example.com".into(),
            password: "hunter2".into(),
        });
        assert_eq!(body["email"], "ops@example.com");
        assert_eq!(body["password"], "hunter2");
    }

    #[test]
    fn login_response_tolerates_missing_user() {
        let response: LoginResponse =
            serde_json::from_str(r#"{"access": "a", "refresh": "r", "user": null}"#).unwrap();
        assert!(response.user.is_none());
        assert_eq!(response.access, "a");
    }
}
