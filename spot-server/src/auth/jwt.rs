//! JWT token service
//!
//! Bearer tokens are minted by the external login flow (or
//! [`JwtService::generate_token`]) and validated here. The claims carry the
//! role and, for authorities, the zone they are responsible for.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use shared::models::Role;
use thiserror::Error;

use crate::lifecycle::Actor;

/// JWT settings
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC secret (at least 32 bytes outside development)
    pub secret: String,
    /// Token lifetime in minutes
    pub expiration_minutes: i64,
    pub issuer: String,
    pub audience: String,
}

/// Claims stored in the token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Identity id
    pub sub: String,
    pub email: String,
    pub role: String,
    /// Authority zone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub aud: String,
}

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    ExpiredToken,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Token generation failed: {0}")]
    GenerationFailed(String),
}

#[derive(Clone)]
pub struct JwtService {
    pub config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    pub fn with_config(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Mint a token for an identity
    pub fn generate_token(
        &self,
        user_id: &str,
        email: &str,
        role: Role,
        zone: Option<&str>,
    ) -> Result<String, JwtError> {
        let now = Utc::now();
        let expiration = now + Duration::minutes(self.config.expiration_minutes);

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.as_str().to_string(),
            zone: zone.map(str::to_string),
            exp: expiration.timestamp(),
            iat: now.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::GenerationFailed(e.to_string()))
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.config.audience]);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss", "aud"]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
                ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                _ => JwtError::InvalidToken(e.to_string()),
            }
        })?;

        Ok(token_data.claims)
    }

    /// Extract the token from an `Authorization` header
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header.strip_prefix("Bearer ")
    }
}

/// Authenticated caller (parsed from JWT claims)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub zone: Option<String>,
}

impl TryFrom<Claims> for CurrentUser {
    type Error = String;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let role: Role = claims.role.parse()?;
        let zone = claims.zone.filter(|z| !z.trim().is_empty());
        if role == Role::Authority && zone.is_none() {
            return Err("authority token without zone".to_string());
        }
        Ok(Self {
            id: claims.sub,
            email: claims.email,
            role,
            zone,
        })
    }
}

impl CurrentUser {
    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    /// Lifecycle actor for this caller
    pub fn actor(&self) -> Actor {
        match self.role {
            Role::Citizen => Actor::Citizen {
                identity_id: self.id.clone(),
            },
            Role::Authority => Actor::Authority {
                id: self.id.clone(),
                zone: self.zone.clone().unwrap_or_default(),
            },
            Role::Admin => Actor::Admin {
                id: self.id.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::with_config(JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hs256".into(),
            expiration_minutes: 60,
            issuer: "spot-server".into(),
            audience: "spot-clients".into(),
        })
    }

    #[test]
    fn test_generate_and_validate() {
        let service = service();
        let token = service
            .generate_token("a-1", "officer@city.gov", Role::Authority, Some("North"))
            .unwrap();
        let claims = service.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "a-1");
        assert_eq!(claims.zone.as_deref(), Some("North"));

        let user = CurrentUser::try_from(claims).unwrap();
        assert_eq!(user.role, Role::Authority);
        assert_eq!(
            user.actor(),
            Actor::Authority {
                id: "a-1".into(),
                zone: "North".into()
            }
        );
    }

    #[test]
    fn test_foreign_secret_is_rejected() {
        let token = service()
            .generate_token("u1", "a@x.com", Role::Citizen, None)
            .unwrap();
        let other = JwtService::with_config(JwtConfig {
            secret: "a-completely-different-secret-value!!".into(),
            ..service().config
        });
        assert!(matches!(
            other.validate_token(&token),
            Err(JwtError::InvalidSignature)
        ));
    }

    #[test]
    fn test_expired_token() {
        let service = JwtService::with_config(JwtConfig {
            expiration_minutes: -10,
            ..service().config
        });
        let token = service
            .generate_token("u1", "a@x.com", Role::Citizen, None)
            .unwrap();
        assert!(matches!(
            service.validate_token(&token),
            Err(JwtError::ExpiredToken)
        ));
    }

    #[test]
    fn test_authority_without_zone_is_malformed() {
        let service = service();
        let token = service
            .generate_token("a-1", "officer@city.gov", Role::Authority, None)
            .unwrap();
        let claims = service.validate_token(&token).unwrap();
        assert!(CurrentUser::try_from(claims).is_err());
    }

    #[test]
    fn test_extract_from_header() {
        assert_eq!(JwtService::extract_from_header("Bearer abc"), Some("abc"));
        assert_eq!(JwtService::extract_from_header("Basic abc"), None);
    }
}
