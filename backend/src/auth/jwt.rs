use super::models::{Claims, Identity};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT encoding error: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
    #[error("JWT decoding error: {0}")]
    Decoding(String),
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Invalid subject in token: {0}")]
    InvalidSubject(String),
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
        }
    }

    /// Tokens are normally minted by the hosted auth provider; this is for
    /// tooling and tests sharing the same secret.
    pub fn generate_token(&self, identity: &Identity) -> Result<String, JwtError> {
        let now = Utc::now();
        let expiration = now + Duration::hours(24);

        let claims = Claims {
            sub: identity.user_id.to_string(),
            email: identity.email.clone(),
            exp: expiration.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let header = Header::new(Algorithm::HS256);
        encode(&header, &claims, &self.encoding_key).map_err(JwtError::Encoding)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, JwtError> {
        if token.is_empty() || token.split('.').count() != 3 {
            return Err(JwtError::InvalidToken);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Provider tokens carry a client-specific audience.
        validation.validate_aud = false;

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(token_data) => {
                log::debug!(
                    "JWT token decoded. User: {}, Exp: {}",
                    token_data.claims.sub,
                    token_data.claims.exp
                );
                Ok(token_data.claims)
            }
            Err(err) => {
                log::debug!("JWT token decode error: {:?}", err);
                match err.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        Err(JwtError::TokenExpired)
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidToken
                    | jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        Err(JwtError::InvalidToken)
                    }
                    _ => Err(JwtError::Decoding(err.to_string())),
                }
            }
        }
    }

    /// Verifies the token and turns its claims into an [`Identity`].
    pub fn identify(&self, token: &str) -> Result<Identity, JwtError> {
        let claims = self.verify_token(token)?;
        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| JwtError::InvalidSubject(claims.sub))?;
        Ok(Identity {
            user_id,
            email: claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_identifies_user() {
        let service = JwtService::new("test-secret");
        let identity = Identity {
            user_id: Uuid::new_v4(),
            email: Some("vet@example.com".into()),
        };
        let token = service.generate_token(&identity).unwrap();

        assert_eq!(service.identify(&token).unwrap(), identity);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = JwtService::new("one")
            .generate_token(&Identity::new(Uuid::new_v4()))
            .unwrap();
        assert!(matches!(
            JwtService::new("two").verify_token(&token),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let service = JwtService::new("secret");
        assert!(matches!(service.verify_token(""), Err(JwtError::InvalidToken)));
        assert!(matches!(service.verify_token("abc.def"), Err(JwtError::InvalidToken)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let service = JwtService::new("secret");
        let past = (Utc::now() - Duration::hours(2)).timestamp() as usize;
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            email: None,
            exp: past,
            iat: past - 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(matches!(service.verify_token(&token), Err(JwtError::TokenExpired)));
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let service = JwtService::new("secret");
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: "not-a-uuid".into(),
            email: None,
            exp: now + 3600,
            iat: now,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(matches!(
            service.identify(&token),
            Err(JwtError::InvalidSubject(sub)) if sub == "not-a-uuid"
        ));
    }
}
