//! JWT session handling.
//!
//! The external identity service signs short-lived *login tokens* with the
//! shared secret. `/auth` validates one and exchanges it for an access token
//! carrying the user's roles; every mutation then authenticates via the
//! [`JwtClaims`] extractor. The server never stores credentials itself.

use std::future::{ready, Ready};

use actix_web::{http::header, web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use market_payment_engine::{
    db_types::{Role, WalletAddress},
    Actor,
};
use mpg_common::Secret;
use serde::{Deserialize, Serialize};

use crate::errors::{AuthError, ServerError};

/// Header carrying the login token on `/auth` requests.
pub const LOGIN_TOKEN_HEADER: &str = "mpg_auth_token";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// The user id from the identity service.
    pub sub: String,
    /// The user's linked wallet address, when one has been established.
    pub address: Option<WalletAddress>,
    pub roles: Vec<Role>,
    pub exp: i64,
}

impl JwtClaims {
    pub fn actor(&self) -> Actor {
        Actor::new(self.sub.clone(), self.roles.clone())
    }

    pub fn require_role(&self, role: Role) -> Result<(), ServerError> {
        if self.roles.contains(&role) {
            Ok(())
        } else {
            Err(ServerError::InsufficientPermissions(format!("This action requires the {role} role")))
        }
    }
}

/// The token minted by the identity service. `desired_roles` lets a client
/// ask for elevated roles; whether they stick is decided here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginToken {
    pub sub: String,
    pub address: Option<WalletAddress>,
    #[serde(default)]
    pub desired_roles: Vec<Role>,
    pub exp: i64,
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &Secret<String>, ttl: Duration) -> Self {
        let bytes = secret.reveal().as_bytes();
        Self { encoding: EncodingKey::from_secret(bytes), decoding: DecodingKey::from_secret(bytes), ttl }
    }

    /// Validates a login token's signature and expiry.
    pub fn check_login_token(&self, token: &str) -> Result<LoginToken, AuthError> {
        let data = decode::<LoginToken>(token, &self.decoding, &Validation::default())
            .map_err(|e| AuthError::ValidationError(e.to_string()))?;
        Ok(data.claims)
    }

    /// Issues a short-lived access token. The login token must have been
    /// validated before calling this.
    pub fn issue_token(&self, login_token: LoginToken) -> Result<String, AuthError> {
        let claims = JwtClaims {
            sub: login_token.sub,
            address: login_token.address,
            roles: login_token.desired_roles,
            exp: (Utc::now() + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| AuthError::ValidationError(e.to_string()))
    }

    pub fn decode_claims(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let data = decode::<JwtClaims>(token, &self.decoding, &Validation::default())
            .map_err(|e| AuthError::ValidationError(e.to_string()))?;
        Ok(data.claims)
    }
}

impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let result = (|| {
            let issuer = req
                .app_data::<web::Data<TokenIssuer>>()
                .ok_or_else(|| ServerError::InitializeError("TokenIssuer is not configured".to_string()))?;
            let header = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .ok_or(ServerError::CouldNotDeserializeAuthToken)?;
            let token = header.strip_prefix("Bearer ").ok_or(ServerError::CouldNotDeserializeAuthToken)?;
            issuer.decode_claims(token).map_err(ServerError::from)
        })();
        ready(result)
    }
}
