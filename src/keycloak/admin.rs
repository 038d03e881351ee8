//! Administrative pass-through to the Keycloak realm: user and role CRUD
//! plus realm-level role assignment.
//!
//! No business logic lives here beyond request shaping and error
//! translation; the provider remains the system of record for users and
//! roles. Calls authenticate with a client-credentials grant for the
//! configured confidential client.

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, warn};
use utoipa::ToSchema;

use super::KeycloakClient;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0} already exists")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("keycloak admin API unavailable: {0}")]
    Unavailable(String),

    #[error("keycloak admin API returned an unexpected response: {0}")]
    Unexpected(String),
}

impl AdminError {
    fn transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Unavailable("request timed out".to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

/// User record exposed by the gateway API.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserAccount {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub enabled: bool,
    /// Effective realm-level role names.
    pub roles: Vec<String>,
}

/// Request payload for user creation.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Initial password, set non-temporary when present.
    pub password: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

/// Request payload for user updates. `roles` replaces the realm-level
/// assignment when present.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub enabled: bool,
    pub roles: Option<Vec<String>>,
}

/// Realm role as exposed by the gateway API.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RealmRole {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub composite: bool,
}

/// Keycloak's wire shape for a user.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct UserRepresentation {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<String>,
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_verified: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct RoleRepresentation {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    composite: bool,
}

impl From<RoleRepresentation> for RealmRole {
    fn from(role: RoleRepresentation) -> Self {
        Self {
            id: role.id,
            name: role.name,
            description: role.description,
            composite: role.composite,
        }
    }
}

#[derive(Deserialize)]
struct AdminTokenResponse {
    access_token: String,
}

impl KeycloakClient {
    /// Service-account token for the admin REST API.
    async fn admin_token(&self) -> Result<String, AdminError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id()),
            ("client_secret", self.config.client_secret().expose_secret()),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdminError::Unexpected(format!(
                "service account grant returned {status}"
            )));
        }
        let token: AdminTokenResponse = response
            .json()
            .await
            .map_err(|err| AdminError::Unexpected(err.to_string()))?;
        Ok(token.access_token)
    }

    fn admin_url(&self, path: &str) -> String {
        format!("{}/{path}", self.admin_base)
    }

    /// Create a user, assign its realm roles, and set the initial password.
    /// # Errors
    /// `Conflict` when the username or email already exists.
    #[instrument(skip(self, user))]
    pub async fn create_user(&self, user: &NewUser) -> Result<UserAccount, AdminError> {
        let token = self.admin_token().await?;
        let representation = UserRepresentation {
            id: None,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            enabled: user.enabled,
            email_verified: Some(true),
        };

        let response = self
            .http
            .post(self.admin_url("users"))
            .bearer_auth(&token)
            .json(&representation)
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            return Err(AdminError::Conflict(format!("user {}", user.username)));
        }
        if status != reqwest::StatusCode::CREATED {
            return Err(AdminError::Unexpected(format!(
                "user creation returned {status}"
            )));
        }

        let user_id = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|location| location.rsplit('/').next())
            .map(str::to_string)
            .ok_or_else(|| {
                AdminError::Unexpected("user creation response lacks a Location header".to_string())
            })?;

        if !user.roles.is_empty() {
            self.assign_realm_roles(&user_id, &user.roles).await?;
        }
        if let Some(password) = &user.password {
            self.reset_password(&user_id, password, false).await?;
        }

        self.get_user(&user_id).await
    }

    /// # Errors
    /// `NotFound` when the user id is unknown to the realm.
    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: &str) -> Result<UserAccount, AdminError> {
        let token = self.admin_token().await?;
        let representation = self.fetch_user(&token, user_id).await?;
        let roles = self.effective_realm_roles(&token, user_id).await;
        Ok(account_of(representation, roles))
    }

    /// Page through realm users.
    #[instrument(skip(self))]
    pub async fn list_users(&self, first: u32, max: u32) -> Result<Vec<UserAccount>, AdminError> {
        let token = self.admin_token().await?;
        let response = self
            .http
            .get(self.admin_url("users"))
            .bearer_auth(&token)
            .query(&[("first", first), ("max", max)])
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;
        let users: Vec<UserRepresentation> = parse_ok(response, "user listing").await?;

        let mut accounts = Vec::with_capacity(users.len());
        for user in users {
            let roles = match &user.id {
                Some(id) => self.effective_realm_roles(&token, id).await,
                None => Vec::new(),
            };
            accounts.push(account_of(user, roles));
        }
        Ok(accounts)
    }

    /// Update profile fields and, when requested, replace realm roles.
    #[instrument(skip(self, update))]
    pub async fn update_user(
        &self,
        user_id: &str,
        update: &UserUpdate,
    ) -> Result<UserAccount, AdminError> {
        let token = self.admin_token().await?;
        let mut representation = self.fetch_user(&token, user_id).await?;
        representation.email = update.email.clone();
        representation.first_name = update.first_name.clone();
        representation.last_name = update.last_name.clone();
        representation.enabled = update.enabled;

        let response = self
            .http
            .put(self.admin_url(&format!("users/{user_id}")))
            .bearer_auth(&token)
            .json(&representation)
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;
        expect_no_content(response, &format!("user {user_id}")).await?;

        if let Some(roles) = &update.roles {
            self.replace_realm_roles(&token, user_id, roles).await?;
        }

        self.get_user(user_id).await
    }

    /// # Errors
    /// `NotFound` when the user id is unknown to the realm.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: &str) -> Result<(), AdminError> {
        let token = self.admin_token().await?;
        let response = self
            .http
            .delete(self.admin_url(&format!("users/{user_id}")))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;
        expect_no_content(response, &format!("user {user_id}")).await
    }

    /// Enable or disable the account.
    #[instrument(skip(self))]
    pub async fn set_user_enabled(&self, user_id: &str, enabled: bool) -> Result<(), AdminError> {
        let token = self.admin_token().await?;
        let mut representation = self.fetch_user(&token, user_id).await?;
        representation.enabled = enabled;

        let response = self
            .http
            .put(self.admin_url(&format!("users/{user_id}")))
            .bearer_auth(&token)
            .json(&representation)
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;
        expect_no_content(response, &format!("user {user_id}")).await
    }

    /// Set a new password; `temporary` forces a change at next login.
    #[instrument(skip(self, password))]
    pub async fn reset_password(
        &self,
        user_id: &str,
        password: &str,
        temporary: bool,
    ) -> Result<(), AdminError> {
        let token = self.admin_token().await?;
        let credential = serde_json::json!({
            "type": "password",
            "value": password,
            "temporary": temporary,
        });
        let response = self
            .http
            .put(self.admin_url(&format!("users/{user_id}/reset-password")))
            .bearer_auth(&token)
            .json(&credential)
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;
        expect_no_content(response, &format!("user {user_id}")).await
    }

    /// Free-text user search, delegated to the provider.
    #[instrument(skip(self))]
    pub async fn search_users(&self, query: &str) -> Result<Vec<UserAccount>, AdminError> {
        let token = self.admin_token().await?;
        let response = self
            .http
            .get(self.admin_url("users"))
            .bearer_auth(&token)
            .query(&[("search", query)])
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;
        let users: Vec<UserRepresentation> = parse_ok(response, "user search").await?;
        Ok(users
            .into_iter()
            .map(|user| account_of(user, Vec::new()))
            .collect())
    }

    /// # Errors
    /// `Conflict` when a role with that name already exists.
    #[instrument(skip(self))]
    pub async fn create_role(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<RealmRole, AdminError> {
        let token = self.admin_token().await?;
        let role = RoleRepresentation {
            id: None,
            name: name.to_string(),
            description: description.map(str::to_string),
            composite: false,
        };
        let response = self
            .http
            .post(self.admin_url("roles"))
            .bearer_auth(&token)
            .json(&role)
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            return Err(AdminError::Conflict(format!("role {name}")));
        }
        if !status.is_success() {
            return Err(AdminError::Unexpected(format!(
                "role creation returned {status}"
            )));
        }
        self.get_role(name).await
    }

    #[instrument(skip(self))]
    pub async fn list_roles(&self) -> Result<Vec<RealmRole>, AdminError> {
        let token = self.admin_token().await?;
        let response = self
            .http
            .get(self.admin_url("roles"))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;
        let roles: Vec<RoleRepresentation> = parse_ok(response, "role listing").await?;
        Ok(roles.into_iter().map(RealmRole::from).collect())
    }

    /// # Errors
    /// `NotFound` when the role name is unknown to the realm.
    #[instrument(skip(self))]
    pub async fn get_role(&self, name: &str) -> Result<RealmRole, AdminError> {
        let token = self.admin_token().await?;
        self.fetch_role(&token, name).await.map(RealmRole::from)
    }

    #[instrument(skip(self))]
    pub async fn delete_role(&self, name: &str) -> Result<(), AdminError> {
        let token = self.admin_token().await?;
        let response = self
            .http
            .delete(self.admin_url(&format!("roles/{name}")))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;
        expect_no_content(response, &format!("role {name}")).await
    }

    /// Assign realm roles by name. Unknown or unreadable roles are skipped
    /// with a warning and the remaining subset is assigned.
    #[instrument(skip(self, role_names))]
    pub async fn assign_realm_roles(
        &self,
        user_id: &str,
        role_names: &[String],
    ) -> Result<(), AdminError> {
        let token = self.admin_token().await?;
        self.assign_roles_with_token(&token, user_id, role_names)
            .await
    }

    async fn assign_roles_with_token(
        &self,
        token: &str,
        user_id: &str,
        role_names: &[String],
    ) -> Result<(), AdminError> {
        let mut roles = Vec::new();
        for name in role_names {
            match self.fetch_role(token, name).await {
                Ok(role) => roles.push(role),
                Err(err) => warn!("skipping role {name}: {err}"),
            }
        }
        if roles.is_empty() {
            return Ok(());
        }

        let response = self
            .http
            .post(self.admin_url(&format!("users/{user_id}/role-mappings/realm")))
            .bearer_auth(token)
            .json(&roles)
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;
        expect_no_content(response, &format!("user {user_id}")).await
    }

    /// Drop all current realm-level roles, then assign the new set.
    async fn replace_realm_roles(
        &self,
        token: &str,
        user_id: &str,
        role_names: &[String],
    ) -> Result<(), AdminError> {
        let current = self.realm_role_mappings(token, user_id).await?;
        if !current.is_empty() {
            let response = self
                .http
                .delete(self.admin_url(&format!("users/{user_id}/role-mappings/realm")))
                .bearer_auth(token)
                .json(&current)
                .send()
                .await
                .map_err(|err| AdminError::transport(&err))?;
            expect_no_content(response, &format!("user {user_id}")).await?;
        }
        self.assign_roles_with_token(token, user_id, role_names)
            .await
    }

    async fn fetch_user(
        &self,
        token: &str,
        user_id: &str,
    ) -> Result<UserRepresentation, AdminError> {
        let response = self
            .http
            .get(self.admin_url(&format!("users/{user_id}")))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AdminError::NotFound(format!("user {user_id}")));
        }
        parse_ok(response, "user lookup").await
    }

    async fn fetch_role(&self, token: &str, name: &str) -> Result<RoleRepresentation, AdminError> {
        let response = self
            .http
            .get(self.admin_url(&format!("roles/{name}")))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AdminError::NotFound(format!("role {name}")));
        }
        parse_ok(response, "role lookup").await
    }

    async fn realm_role_mappings(
        &self,
        token: &str,
        user_id: &str,
    ) -> Result<Vec<RoleRepresentation>, AdminError> {
        let response = self
            .http
            .get(self.admin_url(&format!("users/{user_id}/role-mappings/realm")))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| AdminError::transport(&err))?;
        parse_ok(response, "role mappings").await
    }

    /// Effective realm roles; failures degrade to an empty list with a
    /// warning, so a role-mapping hiccup never hides the user itself.
    async fn effective_realm_roles(&self, token: &str, user_id: &str) -> Vec<String> {
        match self.realm_role_mappings(token, user_id).await {
            Ok(roles) => roles.into_iter().map(|role| role.name).collect(),
            Err(err) => {
                warn!("could not fetch roles for user {user_id}: {err}");
                Vec::new()
            }
        }
    }
}

fn account_of(user: UserRepresentation, roles: Vec<String>) -> UserAccount {
    UserAccount {
        id: user.id.unwrap_or_default(),
        username: user.username,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        enabled: user.enabled,
        roles,
    }
}

async fn parse_ok<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T, AdminError> {
    let status = response.status();
    if !status.is_success() {
        return Err(AdminError::Unexpected(format!("{what} returned {status}")));
    }
    response
        .json()
        .await
        .map_err(|err| AdminError::Unexpected(err.to_string()))
}

async fn expect_no_content(response: reqwest::Response, what: &str) -> Result<(), AdminError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(AdminError::NotFound(what.to_string()));
    }
    if status.is_success() {
        Ok(())
    } else {
        Err(AdminError::Unexpected(format!("{what}: {status}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_defaults_to_enabled() {
        let user: NewUser = serde_json::from_value(serde_json::json!({
            "username": "alice"
        }))
        .unwrap();
        assert!(user.enabled);
        assert!(user.roles.is_empty());
        assert!(user.password.is_none());
    }

    #[test]
    fn user_representation_uses_keycloak_field_names() {
        let representation = UserRepresentation {
            id: None,
            username: "alice".to_string(),
            email: None,
            first_name: Some("Alice".to_string()),
            last_name: None,
            enabled: true,
            email_verified: Some(true),
        };
        let json = serde_json::to_value(&representation).unwrap();
        assert_eq!(json["firstName"], "Alice");
        assert_eq!(json["emailVerified"], true);
        assert!(json.get("lastName").is_none());
    }

    #[test]
    fn role_wire_shape_round_trips() {
        let role: RoleRepresentation = serde_json::from_value(serde_json::json!({
            "id": "r1",
            "name": "auditor"
        }))
        .unwrap();
        assert!(!role.composite);
        let realm_role = RealmRole::from(role);
        assert_eq!(realm_role.name, "auditor");
    }
}
