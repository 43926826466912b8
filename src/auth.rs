use actix_web::{dev::Payload, http::header, FromRequest, HttpRequest, HttpResponse};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::{ready, Ready};

use crate::error::ApiError;
use crate::models::Id;

const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username.
    pub sub: String,
    pub uid: Id,
    pub exp: usize,
    pub roles: Vec<Role>,
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("JWT_SECRET not set")]
    MissingSecret,
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

fn secret() -> Result<String, AuthError> {
    env::var("JWT_SECRET").map_err(|_| AuthError::MissingSecret)
}

/// Validate a JWT and return its claims.
pub fn decode_jwt(token: &str) -> Result<Claims, AuthError> {
    let secret = secret()?;
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    Ok(data.claims)
}

/// Create a JWT for a stored identity.
pub fn create_jwt(user_id: Id, username: &str, roles: Vec<Role>) -> Result<String, AuthError> {
    let secret = secret()?;
    let exp = (chrono::Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize;
    let claims = Claims { sub: username.to_string(), uid: user_id, exp, roles };
    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?)
}

/// Extractor yielding validated `Claims`. Take `Option<Auth>` where
/// anonymous viewers are allowed.
pub struct Auth(pub Claims);

impl Auth {
    pub fn user_id(&self) -> Id {
        self.0.uid
    }

    pub fn username(&self) -> &str {
        &self.0.sub
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.0.roles.contains(role)
    }
}

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let claims = BearerAuth::from_request(req, pl)
            .into_inner()
            .map_err(|_| ApiError::Unauthorized)
            .and_then(|bearer| decode_jwt(bearer.token()).map_err(|_| ApiError::Unauthorized));
        ready(claims.map(Auth))
    }
}

/// Helper macro for role-guarding handlers that return `Result<_, ApiError>`.
#[macro_export]
macro_rules! require_role {
    ($auth:expr, $role:pat) => {
        if !$auth.0.roles.iter().any(|r| matches!(r, $role)) {
            return Err(::core::convert::Into::into($crate::error::ApiError::Forbidden));
        }
    };
}

/// Send an anonymous visitor to the login flow, remembering where they were.
pub fn login_redirect(req: &HttpRequest) -> HttpResponse {
    let next = urlencoding::encode(req.path());
    HttpResponse::Found()
        .insert_header((header::LOCATION, format!("/auth/login/?next={next}")))
        .finish()
}

/// Roles granted at login. Usernames listed as bootstrap admins also get
/// `Admin`.
pub fn roles_for(username: &str, bootstrap_admins: &[String]) -> Vec<Role> {
    if bootstrap_admins.iter().any(|a| a == username) {
        vec![Role::User, Role::Admin]
    } else {
        vec![Role::User]
    }
}
