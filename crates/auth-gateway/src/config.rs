//! Gateway configuration.
//!
//! Configuration is loaded from environment variables. The client secret and
//! the Redis URL are redacted in Debug output.

use common::secret::{SecretString, REDACTED};
use jsonwebtoken::Algorithm;
use reqwest::Url;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default OAuth scope requested at login.
pub const DEFAULT_SCOPE: &str = "openid";

/// Default JWKS cache TTL in seconds (5 minutes).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 300;

/// Default timeout for IdP calls (token endpoint and JWKS) in seconds.
pub const DEFAULT_IDP_TIMEOUT_SECONDS: u64 = 10;

/// Default authority required on "needs authorization" paths.
pub const DEFAULT_REQUIRED_AUTHORITY: &str = "user";

/// Default session cookie name.
pub const DEFAULT_SESSION_COOKIE_NAME: &str = "gateway_session";

/// Default idle session lifetime in seconds (30 minutes).
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 1800;

/// Source of a candidate identity for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverKind {
    /// Identity stored in the server-side session.
    Session,
    /// `Authorization: Bearer` header.
    Header,
}

impl FromStr for ResolverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "session" => Ok(ResolverKind::Session),
            "header" => Ok(ResolverKind::Header),
            other => Err(ConfigError::InvalidResolverOrder(format!(
                "unknown resolver '{other}', expected 'session' or 'header'"
            ))),
        }
    }
}

/// Gateway configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// OAuth client identifier registered at the IdP.
    pub client_id: String,

    /// OAuth client secret used for HTTP Basic client authentication.
    pub client_secret: SecretString,

    /// IdP authorization endpoint.
    pub auth_url: Url,

    /// IdP token endpoint.
    pub token_url: Url,

    /// IdP JWKS endpoint.
    pub jwks_url: Url,

    /// IdP end-session endpoint.
    pub logout_url: Url,

    /// Where the IdP sends the browser after logout. When unset, the
    /// request origin root is used.
    pub post_logout_redirect_url: Option<String>,

    /// Space-separated scopes requested at login.
    pub scope: String,

    /// Expected JWS algorithm of access tokens.
    pub access_token_algorithm: Algorithm,

    /// Expected JWS algorithm of refresh tokens.
    pub refresh_token_algorithm: Algorithm,

    /// How long fetched signing keys are cached.
    pub jwks_cache_ttl_seconds: u64,

    /// Timeout for every IdP call.
    pub idp_timeout_seconds: u64,

    /// Authority required on "needs authorization" paths.
    pub required_authority: String,

    /// Paths that are always allowed.
    pub permit_all_patterns: Vec<String>,

    /// Paths that require an authenticated caller.
    pub needs_authentication_patterns: Vec<String>,

    /// Paths that require the `required_authority`.
    pub needs_authorization_patterns: Vec<String>,

    /// Order in which identity resolvers run.
    pub resolver_order: Vec<ResolverKind>,

    /// Scheme assumed when `X-Forwarded-Proto` is absent.
    pub default_scheme: String,

    /// Session cookie name.
    pub session_cookie_name: String,

    /// Whether the session cookie carries the `Secure` attribute.
    pub session_cookie_secure: bool,

    /// Idle session lifetime in seconds.
    pub session_ttl_seconds: u64,

    /// Redis URL for session storage. In-memory storage is used when unset.
    pub redis_url: Option<String>,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("client_id", &self.client_id)
            .field("client_secret", &REDACTED)
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("jwks_url", &self.jwks_url.as_str())
            .field("logout_url", &self.logout_url.as_str())
            .field("post_logout_redirect_url", &self.post_logout_redirect_url)
            .field("scope", &self.scope)
            .field("access_token_algorithm", &self.access_token_algorithm)
            .field("refresh_token_algorithm", &self.refresh_token_algorithm)
            .field("jwks_cache_ttl_seconds", &self.jwks_cache_ttl_seconds)
            .field("idp_timeout_seconds", &self.idp_timeout_seconds)
            .field("required_authority", &self.required_authority)
            .field("permit_all_patterns", &self.permit_all_patterns)
            .field(
                "needs_authentication_patterns",
                &self.needs_authentication_patterns,
            )
            .field(
                "needs_authorization_patterns",
                &self.needs_authorization_patterns,
            )
            .field("resolver_order", &self.resolver_order)
            .field("default_scheme", &self.default_scheme)
            .field("session_cookie_name", &self.session_cookie_name)
            .field("session_cookie_secure", &self.session_cookie_secure)
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("redis_url", &self.redis_url.as_ref().map(|_| REDACTED))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid URL configuration: {0}")]
    InvalidUrl(String),

    #[error("Invalid token algorithm configuration: {0}")]
    InvalidAlgorithm(String),

    #[error("Invalid numeric configuration: {0}")]
    InvalidNumber(String),

    #[error("Invalid boolean configuration: {0}")]
    InvalidBool(String),

    #[error("Invalid resolver order configuration: {0}")]
    InvalidResolverOrder(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let client_id = required(vars, "OIDC_CLIENT_ID")?;
        let client_secret = SecretString::from(required(vars, "OIDC_CLIENT_SECRET")?);

        let auth_url = required_url(vars, "OIDC_AUTH_URL")?;
        let token_url = required_url(vars, "OIDC_TOKEN_URL")?;
        let jwks_url = required_url(vars, "OIDC_JWKS_URL")?;
        let logout_url = required_url(vars, "OIDC_LOGOUT_URL")?;

        let post_logout_redirect_url = vars
            .get("POST_LOGOUT_REDIRECT_URL")
            .filter(|v| !v.is_empty())
            .cloned();

        let scope = vars
            .get("OIDC_SCOPE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SCOPE.to_string());

        let access_token_algorithm = algorithm(vars, "ACCESS_TOKEN_ALGORITHM")?;
        let refresh_token_algorithm = algorithm(vars, "REFRESH_TOKEN_ALGORITHM")?;

        let jwks_cache_ttl_seconds = positive_u64(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_JWKS_CACHE_TTL_SECONDS,
        )?;
        let idp_timeout_seconds =
            positive_u64(vars, "IDP_TIMEOUT_SECONDS", DEFAULT_IDP_TIMEOUT_SECONDS)?;
        let session_ttl_seconds =
            positive_u64(vars, "SESSION_TTL_SECONDS", DEFAULT_SESSION_TTL_SECONDS)?;

        let required_authority = vars
            .get("REQUIRED_AUTHORITY")
            .cloned()
            .unwrap_or_else(|| DEFAULT_REQUIRED_AUTHORITY.to_string());

        let permit_all_patterns = pattern_list(vars, "PERMIT_ALL_PATTERNS", &[]);
        let needs_authentication_patterns =
            pattern_list(vars, "NEEDS_AUTHENTICATION_PATTERNS", &[]);
        let needs_authorization_patterns =
            pattern_list(vars, "NEEDS_AUTHORIZATION_PATTERNS", &["/api/**"]);

        let resolver_order = match vars.get("RESOLVER_ORDER") {
            Some(value) => parse_resolver_order(value)?,
            None => vec![ResolverKind::Session, ResolverKind::Header],
        };

        let default_scheme = match vars.get("DEFAULT_SCHEME").map(String::as_str) {
            None => "http".to_string(),
            Some(scheme @ ("http" | "https")) => scheme.to_string(),
            Some(other) => {
                return Err(ConfigError::InvalidUrl(format!(
                    "DEFAULT_SCHEME must be 'http' or 'https', got '{other}'"
                )))
            }
        };

        let session_cookie_name = vars
            .get("SESSION_COOKIE_NAME")
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_SESSION_COOKIE_NAME.to_string());

        let session_cookie_secure = match vars.get("SESSION_COOKIE_SECURE") {
            Some(value) => value.parse::<bool>().map_err(|e| {
                ConfigError::InvalidBool(format!(
                    "SESSION_COOKIE_SECURE must be 'true' or 'false', got '{value}': {e}"
                ))
            })?,
            None => true,
        };

        let redis_url = vars.get("REDIS_URL").filter(|v| !v.is_empty()).cloned();

        Ok(Config {
            bind_address,
            client_id,
            client_secret,
            auth_url,
            token_url,
            jwks_url,
            logout_url,
            post_logout_redirect_url,
            scope,
            access_token_algorithm,
            refresh_token_algorithm,
            jwks_cache_ttl_seconds,
            idp_timeout_seconds,
            required_authority,
            permit_all_patterns,
            needs_authentication_patterns,
            needs_authorization_patterns,
            resolver_order,
            default_scheme,
            session_cookie_name,
            session_cookie_secure,
            session_ttl_seconds,
            redis_url,
        })
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn required_url(vars: &HashMap<String, String>, name: &str) -> Result<Url, ConfigError> {
    let value = required(vars, name)?;
    let url = Url::parse(&value)
        .map_err(|e| ConfigError::InvalidUrl(format!("{name} is not a valid URL: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "{name} must use http or https, got '{}'",
            url.scheme()
        )));
    }

    Ok(url)
}

fn algorithm(vars: &HashMap<String, String>, name: &str) -> Result<Algorithm, ConfigError> {
    let Some(value) = vars.get(name) else {
        return Ok(Algorithm::RS256);
    };

    let alg = Algorithm::from_str(value).map_err(|e| {
        ConfigError::InvalidAlgorithm(format!("{name} is not a JWS algorithm, got '{value}': {e}"))
    })?;

    // Symmetric algorithms cannot be verified against a published key set
    if matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
        return Err(ConfigError::InvalidAlgorithm(format!(
            "{name} must be an asymmetric algorithm, got '{value}'"
        )));
    }

    Ok(alg)
}

fn positive_u64(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidNumber(format!(
            "{name} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidNumber(format!(
            "{name} must be greater than 0"
        )));
    }

    Ok(value)
}

fn pattern_list(vars: &HashMap<String, String>, name: &str, default: &[&str]) -> Vec<String> {
    match vars.get(name) {
        Some(value) => value
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ToString::to_string)
            .collect(),
        None => default.iter().map(ToString::to_string).collect(),
    }
}

fn parse_resolver_order(value: &str) -> Result<Vec<ResolverKind>, ConfigError> {
    let order = value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(ResolverKind::from_str)
        .collect::<Result<Vec<_>, _>>()?;

    if order.is_empty() {
        return Err(ConfigError::InvalidResolverOrder(
            "RESOLVER_ORDER must name at least one resolver".to_string(),
        ));
    }

    let mut seen = Vec::with_capacity(order.len());
    for kind in &order {
        if seen.contains(kind) {
            return Err(ConfigError::InvalidResolverOrder(format!(
                "resolver {kind:?} listed more than once"
            )));
        }
        seen.push(*kind);
    }

    Ok(order)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            ("OIDC_CLIENT_ID".to_string(), "gateway".to_string()),
            ("OIDC_CLIENT_SECRET".to_string(), "s3cr3t".to_string()),
            (
                "OIDC_AUTH_URL".to_string(),
                "https://idp.example.com/auth".to_string(),
            ),
            (
                "OIDC_TOKEN_URL".to_string(),
                "https://idp.example.com/token".to_string(),
            ),
            (
                "OIDC_JWKS_URL".to_string(),
                "https://idp.example.com/certs".to_string(),
            ),
            (
                "OIDC_LOGOUT_URL".to_string(),
                "https://idp.example.com/logout".to_string(),
            ),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).unwrap();

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.client_id, "gateway");
        assert_eq!(config.client_secret.expose_secret(), "s3cr3t");
        assert_eq!(config.scope, "openid");
        assert_eq!(config.access_token_algorithm, Algorithm::RS256);
        assert_eq!(config.refresh_token_algorithm, Algorithm::RS256);
        assert_eq!(config.jwks_cache_ttl_seconds, 300);
        assert_eq!(config.idp_timeout_seconds, 10);
        assert_eq!(config.required_authority, "user");
        assert!(config.permit_all_patterns.is_empty());
        assert_eq!(config.needs_authorization_patterns, vec!["/api/**"]);
        assert_eq!(
            config.resolver_order,
            vec![ResolverKind::Session, ResolverKind::Header]
        );
        assert_eq!(config.default_scheme, "http");
        assert_eq!(config.session_cookie_name, "gateway_session");
        assert!(config.session_cookie_secure);
        assert!(config.redis_url.is_none());
        assert!(config.post_logout_redirect_url.is_none());
    }

    #[test]
    fn test_from_vars_custom_values() {
        let mut vars = base_vars();
        vars.insert("ACCESS_TOKEN_ALGORITHM".to_string(), "EdDSA".to_string());
        vars.insert("REFRESH_TOKEN_ALGORITHM".to_string(), "ES256".to_string());
        vars.insert(
            "NEEDS_AUTHENTICATION_PATTERNS".to_string(),
            "/api/v1/account, /files/**".to_string(),
        );
        vars.insert("RESOLVER_ORDER".to_string(), "header,session".to_string());
        vars.insert("SESSION_COOKIE_SECURE".to_string(), "false".to_string());
        vars.insert("DEFAULT_SCHEME".to_string(), "https".to_string());

        let config = Config::from_vars(&vars).unwrap();

        assert_eq!(config.access_token_algorithm, Algorithm::EdDSA);
        assert_eq!(config.refresh_token_algorithm, Algorithm::ES256);
        assert_eq!(
            config.needs_authentication_patterns,
            vec!["/api/v1/account", "/files/**"]
        );
        assert_eq!(
            config.resolver_order,
            vec![ResolverKind::Header, ResolverKind::Session]
        );
        assert!(!config.session_cookie_secure);
        assert_eq!(config.default_scheme, "https");
    }

    #[test]
    fn test_from_vars_missing_client_secret() {
        let mut vars = base_vars();
        vars.remove("OIDC_CLIENT_SECRET");

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(ref name)) if name == "OIDC_CLIENT_SECRET")
        );
    }

    #[test]
    fn test_from_vars_empty_jwks_url_is_missing() {
        let mut vars = base_vars();
        vars.insert("OIDC_JWKS_URL".to_string(), String::new());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_from_vars_invalid_jwks_url() {
        let mut vars = base_vars();
        vars.insert("OIDC_JWKS_URL".to_string(), "not a url".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_from_vars_rejects_non_http_url() {
        let mut vars = base_vars();
        vars.insert(
            "OIDC_TOKEN_URL".to_string(),
            "ftp://idp.example.com/token".to_string(),
        );

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_from_vars_rejects_symmetric_algorithm() {
        let mut vars = base_vars();
        vars.insert("ACCESS_TOKEN_ALGORITHM".to_string(), "HS256".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidAlgorithm(_))
        ));
    }

    #[test]
    fn test_from_vars_rejects_unknown_algorithm() {
        let mut vars = base_vars();
        vars.insert("ACCESS_TOKEN_ALGORITHM".to_string(), "none".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidAlgorithm(_))
        ));
    }

    #[test]
    fn test_from_vars_rejects_zero_ttl() {
        let mut vars = base_vars();
        vars.insert("JWKS_CACHE_TTL_SECONDS".to_string(), "0".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_from_vars_rejects_non_numeric_timeout() {
        let mut vars = base_vars();
        vars.insert("IDP_TIMEOUT_SECONDS".to_string(), "soon".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_from_vars_rejects_bad_resolver_order() {
        for value in ["cookie", "", "session,session"] {
            let mut vars = base_vars();
            vars.insert("RESOLVER_ORDER".to_string(), value.to_string());

            assert!(
                matches!(
                    Config::from_vars(&vars),
                    Err(ConfigError::InvalidResolverOrder(_))
                ),
                "RESOLVER_ORDER={value:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_vars_single_resolver() {
        let mut vars = base_vars();
        vars.insert("RESOLVER_ORDER".to_string(), "header".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.resolver_order, vec![ResolverKind::Header]);
    }

    #[test]
    fn test_from_vars_rejects_bad_cookie_secure_flag() {
        let mut vars = base_vars();
        vars.insert("SESSION_COOKIE_SECURE".to_string(), "yes".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidBool(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut vars = base_vars();
        vars.insert(
            "REDIS_URL".to_string(),
            "redis://:hunter2@cache:6379".to_string(),
        );

        let config = Config::from_vars(&vars).unwrap();
        let debug = format!("{config:?}");

        assert!(!debug.contains("s3cr3t"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("gateway"));
    }
}
