use serde::Deserialize;
use uuid::Uuid;

use coop_types::UserProfile;

/// Turns an opaque identity token into a profile. Who issued the token and
/// how it was established is out of scope; two wire forms are accepted:
/// a JSON object `{"user_id", "name", "avatar"?}` or the compact
/// `"<uuid>:<display name>"`.
pub struct IdentityService;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid identity token")]
    InvalidToken,
}

impl IdentityService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_token(&self, token: &str) -> Result<UserProfile, IdentityError> {
        let token = token.trim();

        if token.starts_with('{') {
            #[derive(Deserialize)]
            struct Claims {
                user_id: String,
                name: String,
                avatar: Option<serde_json::Value>,
            }

            let claims: Claims =
                serde_json::from_str(token).map_err(|_| IdentityError::InvalidToken)?;
            let id = Uuid::parse_str(&claims.user_id).map_err(|_| IdentityError::InvalidToken)?;
            if claims.name.trim().is_empty() {
                return Err(IdentityError::InvalidToken);
            }

            return Ok(UserProfile {
                id,
                display_name: claims.name,
                avatar: claims.avatar,
            });
        }

        // Compact form: "<uuid>:<display name>"
        let (id_part, name) = token.split_once(':').ok_or(IdentityError::InvalidToken)?;
        let id = Uuid::parse_str(id_part).map_err(|_| IdentityError::InvalidToken)?;
        if name.trim().is_empty() {
            return Err(IdentityError::InvalidToken);
        }

        Ok(UserProfile {
            id,
            display_name: name.to_string(),
            avatar: None,
        })
    }
}

impl Default for IdentityService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_token() {
        let identity = IdentityService::new();
        let id = Uuid::new_v4();

        let user = identity.validate_token(&format!("{}:Alice", id)).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.display_name, "Alice");
        assert!(user.avatar.is_none());
    }

    #[test]
    fn test_json_token_with_avatar() {
        let identity = IdentityService::new();
        let id = Uuid::new_v4();
        let token = format!(
            r#"{{"user_id":"{}","name":"Bob","avatar":{{"hat":"crown"}}}}"#,
            id
        );

        let user = identity.validate_token(&token).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.display_name, "Bob");
        assert_eq!(user.avatar.unwrap()["hat"], "crown");
    }

    #[test]
    fn test_malformed_tokens_are_rejected() {
        let identity = IdentityService::new();

        assert!(identity.validate_token("").is_err());
        assert!(identity.validate_token("not-a-uuid:Alice").is_err());
        assert!(identity.validate_token(&format!("{}:", Uuid::new_v4())).is_err());
        assert!(identity.validate_token(r#"{"name":"NoId"}"#).is_err());
    }
}
