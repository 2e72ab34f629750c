use serde::Deserialize;

use crate::db::models::NewUserProfile;
use crate::error::{AppError, AppResult};
use crate::media::UploadedFile;

/// Client for the external identity provider. All authentication lives
/// upstream; this side only forwards credentials and cookies and
/// translates failures.
#[derive(Clone)]
pub struct IdentityProvider {
    base_url: String,
    http: reqwest::Client,
}

/// The provider's account payload returned by registration.
#[derive(Debug, Deserialize)]
pub struct ProviderAccount {
    pub username: String,
    pub profile: ProviderProfile,
}

#[derive(Debug, Deserialize)]
pub struct ProviderProfile {
    pub display_name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
}

impl From<ProviderAccount> for NewUserProfile {
    fn from(account: ProviderAccount) -> Self {
        NewUserProfile {
            username: account.username,
            display_name: account.profile.display_name,
            avatar: account.profile.avatar,
            bio: account.profile.bio,
            location: account.profile.location,
        }
    }
}

/// Successful login: the provider's response body plus the session
/// token it set.
pub struct LoginOutcome {
    pub payload: serde_json::Value,
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct RegistrationFields {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub location: Option<String>,
}

impl IdentityProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Map a non-2xx upstream response to a local error, carrying the
    /// upstream status and its `detail` field when one is present.
    async fn translate_failure(response: reqwest::Response, fallback: &str) -> AppError {
        let status = response.status().as_u16();
        let detail = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| {
                body.get("detail")
                    .and_then(|d| d.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| fallback.to_string());
        AppError::Upstream {
            status: Some(status),
            detail,
        }
    }

    /// POST credentials upstream; returns the provider payload and the
    /// `access_token` it set in its response cookies.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<LoginOutcome> {
        let response = self
            .http
            .post(format!("{}/login/", self.base_url))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::translate_failure(response, "Login failed upstream.").await);
        }

        let access_token = response
            .cookies()
            .find(|c| c.name() == "access_token")
            .map(|c| c.value().to_string())
            .ok_or_else(|| {
                AppError::UpstreamContract(
                    "login response did not set an access_token cookie".into(),
                )
            })?;

        let payload = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamContract(e.to_string()))?;

        Ok(LoginOutcome {
            payload,
            access_token,
        })
    }

    pub async fn logout(&self) -> AppResult<()> {
        let response = self
            .http
            .post(format!("{}/logout/", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::translate_failure(response, "Logout failed upstream.").await);
        }
        Ok(())
    }

    /// Forward a registration to the provider as a multipart form,
    /// including the avatar bytes when present.
    pub async fn register(
        &self,
        fields: &RegistrationFields,
        avatar: Option<&UploadedFile>,
    ) -> AppResult<ProviderAccount> {
        let mut form = reqwest::multipart::Form::new()
            .text("username", fields.username.clone())
            .text("email", fields.email.clone())
            .text("password", fields.password.clone())
            .text("display_name", fields.display_name.clone());
        if let Some(ref bio) = fields.bio {
            form = form.text("bio", bio.clone());
        }
        if let Some(ref location) = fields.location {
            form = form.text("location", location.clone());
        }
        if let Some(avatar) = avatar {
            let mime = mime_guess::from_path(&avatar.filename).first_or_octet_stream();
            let part = reqwest::multipart::Part::bytes(avatar.data.to_vec())
                .file_name(avatar.filename.clone())
                .mime_str(mime.as_ref())
                .map_err(|e| AppError::Internal(e.to_string()))?;
            form = form.part("avatar", part);
        }

        let response = self
            .http
            .post(format!("{}/users/", self.base_url))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::translate_failure(response, "Registration failed upstream.").await);
        }

        response
            .json::<ProviderAccount>()
            .await
            .map_err(|e| AppError::UpstreamContract(e.to_string()))
    }

    /// Ask the provider who the token belongs to. Returns the username
    /// for the local profile lookup.
    pub async fn whoami(&self, access_token: &str) -> AppResult<String> {
        let response = self
            .http
            .get(format!("{}/users/me/", self.base_url))
            .header(
                reqwest::header::COOKIE,
                format!("access_token={}", access_token),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::translate_failure(
                response,
                "Invalid credentials. Please login again.",
            )
            .await);
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamContract(e.to_string()))?;
        payload
            .get("username")
            .and_then(|u| u.as_str())
            .map(str::to_string)
            .ok_or_else(|| AppError::UpstreamContract("identity response missing username".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_account_parses_full_payload() {
        let account: ProviderAccount = serde_json::from_value(serde_json::json!({
            "username": "johndoe",
            "profile": {
                "display_name": "John Doe",
                "avatar": null,
                "bio": "hello",
                "location": "Boston, MA"
            }
        }))
        .unwrap();
        assert_eq!(account.username, "johndoe");
        assert_eq!(account.profile.display_name, "John Doe");

        let profile: NewUserProfile = account.into();
        assert_eq!(profile.username, "johndoe");
        assert_eq!(profile.bio.as_deref(), Some("hello"));
    }

    #[test]
    fn provider_account_missing_profile_fails() {
        let result: Result<ProviderAccount, _> =
            serde_json::from_value(serde_json::json!({ "username": "johndoe" }));
        assert!(result.is_err());
    }

    #[test]
    fn provider_account_missing_display_name_fails() {
        let result: Result<ProviderAccount, _> = serde_json::from_value(serde_json::json!({
            "username": "johndoe",
            "profile": { "bio": "hello" }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let provider = IdentityProvider::new("http://auth.example.com/");
        assert_eq!(provider.base_url, "http://auth.example.com");
    }
}
