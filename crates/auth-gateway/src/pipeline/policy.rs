//! Path-scoped authorization policies.
//!
//! A [`PolicyChain`] is an ordered list of stages. The first stage whose
//! matcher fits the request decides; a request no stage matches is denied.

use super::AuthContext;
use crate::config::Config;
use axum::http::Method;
use std::fmt;
use std::sync::Arc;

/// Gateway paths that never require authentication.
pub const PUBLIC_PATHS: &[&str] = &[
    "/login",
    "/authorize",
    "/login/callback",
    "/logout",
    "/api/v1/account/tokens",
    "/health",
    "/ready",
    "/metrics",
];

/// Ant-style path pattern.
///
/// - `**` matches zero or more path segments
/// - `*` matches zero or more characters within a segment
/// - `?` matches exactly one character
///
/// Empty segments are ignored, so `/api/` and `/api` are the same path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<String>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            raw: pattern.to_string(),
            segments: split_path(pattern).map(str::to_string).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        let pattern: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        let path: Vec<&str> = split_path(path).collect();
        match_segments(&pattern, &path)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => {
            (0..=path.len()).any(|skip| path.get(skip..).is_some_and(|tail| match_segments(rest, tail)))
        }
        Some((segment, rest)) => path.split_first().is_some_and(|(first, tail)| {
            let pattern_chars: Vec<char> = segment.chars().collect();
            let path_chars: Vec<char> = first.chars().collect();
            match_segment(&pattern_chars, &path_chars) && match_segments(rest, tail)
        }),
    }
}

fn match_segment(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => {
            (0..=text.len()).any(|skip| text.get(skip..).is_some_and(|tail| match_segment(rest, tail)))
        }
        Some(('?', rest)) => text
            .split_first()
            .is_some_and(|(_, tail)| match_segment(rest, tail)),
        Some((expected, rest)) => text
            .split_first()
            .is_some_and(|(actual, tail)| actual == expected && match_segment(rest, tail)),
    }
}

/// Predicate for [`Policy::Custom`].
pub type PolicyPredicate = Arc<dyn Fn(&AuthContext) -> bool + Send + Sync>;

/// What a stage requires of the caller.
#[derive(Clone)]
pub enum Policy {
    /// Always allowed.
    Anonymous,
    /// An identity was resolved.
    Authenticated,
    /// An identity was resolved and carries this authority.
    Authorized(String),
    /// Programmatic check.
    Custom(PolicyPredicate),
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Anonymous => f.write_str("Anonymous"),
            Policy::Authenticated => f.write_str("Authenticated"),
            Policy::Authorized(authority) => f.debug_tuple("Authorized").field(authority).finish(),
            Policy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Policy {
    pub fn evaluate(&self, ctx: &AuthContext) -> Decision {
        let allowed = match self {
            Policy::Anonymous => true,
            Policy::Authenticated => ctx.is_authenticated(),
            Policy::Authorized(authority) => ctx.has_authority(authority),
            Policy::Custom(predicate) => predicate(ctx),
        };

        if allowed {
            Decision::Allow
        } else if ctx.is_authenticated() {
            Decision::Deny(DenyReason::Forbidden)
        } else {
            Decision::Deny(DenyReason::Unauthenticated)
        }
    }
}

/// Outcome of the policy chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No identity was resolved.
    Unauthenticated,
    /// An identity was resolved but does not satisfy the policy.
    Forbidden,
}

/// Which requests a stage applies to.
#[derive(Debug, Clone)]
pub enum StageMatcher {
    Method(Method),
    Paths(Vec<PathPattern>),
}

impl StageMatcher {
    fn matches(&self, method: &Method, path: &str) -> bool {
        match self {
            StageMatcher::Method(expected) => method == expected,
            StageMatcher::Paths(patterns) => patterns.iter().any(|pattern| pattern.matches(path)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyStage {
    pub matcher: StageMatcher,
    pub policy: Policy,
}

impl PolicyStage {
    pub fn paths<I, P>(patterns: I, policy: Policy) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        Self {
            matcher: StageMatcher::Paths(
                patterns
                    .into_iter()
                    .map(|p| PathPattern::new(p.as_ref()))
                    .collect(),
            ),
            policy,
        }
    }

    pub fn method(method: Method, policy: Policy) -> Self {
        Self {
            matcher: StageMatcher::Method(method),
            policy,
        }
    }
}

/// Ordered policy stages; the first match decides.
#[derive(Debug, Clone, Default)]
pub struct PolicyChain {
    stages: Vec<PolicyStage>,
}

impl PolicyChain {
    pub fn new(stages: Vec<PolicyStage>) -> Self {
        Self { stages }
    }

    /// Standard chain:
    ///
    /// 1. `OPTIONS` (CORS preflight): Anonymous
    /// 2. [`PUBLIC_PATHS`] plus `PERMIT_ALL_PATTERNS`: Anonymous
    /// 3. `NEEDS_AUTHENTICATION_PATTERNS`: Authenticated
    /// 4. `NEEDS_AUTHORIZATION_PATTERNS`: Authorized(`REQUIRED_AUTHORITY`)
    /// 5. `/**`: Authenticated
    pub fn from_config(config: &Config) -> Self {
        let permit_all = PUBLIC_PATHS
            .iter()
            .map(|p| (*p).to_string())
            .chain(config.permit_all_patterns.iter().cloned());

        let mut stages = vec![
            PolicyStage::method(Method::OPTIONS, Policy::Anonymous),
            PolicyStage::paths(permit_all, Policy::Anonymous),
        ];
        if !config.needs_authentication_patterns.is_empty() {
            stages.push(PolicyStage::paths(
                &config.needs_authentication_patterns,
                Policy::Authenticated,
            ));
        }
        if !config.needs_authorization_patterns.is_empty() {
            stages.push(PolicyStage::paths(
                &config.needs_authorization_patterns,
                Policy::Authorized(config.required_authority.clone()),
            ));
        }
        stages.push(PolicyStage::paths(["/**"], Policy::Authenticated));

        Self { stages }
    }

    /// Decide whether the request may proceed.
    ///
    /// Once a stage has allowed the request, later calls with the same
    /// context allow without evaluating any policy.
    pub fn authorize(&self, ctx: &mut AuthContext, method: &Method, path: &str) -> Decision {
        if ctx.authorization_checked() {
            return Decision::Allow;
        }

        let Some(stage) = self.stages.iter().find(|stage| stage.matcher.matches(method, path)) else {
            tracing::debug!(target: "gw.pipeline", path = %path, "No policy stage matches");
            return if ctx.is_authenticated() {
                Decision::Deny(DenyReason::Forbidden)
            } else {
                Decision::Deny(DenyReason::Unauthenticated)
            };
        };

        let decision = stage.policy.evaluate(ctx);
        if decision == Decision::Allow {
            ctx.mark_authorized();
        }
        decision
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::{Claims, Identity};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx_with(authorities: Option<&[&str]>) -> AuthContext {
        let mut ctx = AuthContext::default();
        if let Some(authorities) = authorities {
            let claims: Claims =
                serde_json::from_value(json!({"sub": "u", "authorities": authorities})).unwrap();
            ctx.resolve(Identity::bearer("t".to_string(), claims));
        }
        ctx
    }

    fn config(extra: &[(&str, &str)]) -> Config {
        let mut vars: HashMap<String, String> = [
            ("OIDC_CLIENT_ID", "gateway"),
            ("OIDC_CLIENT_SECRET", "secret"),
            ("OIDC_AUTH_URL", "https://idp.example.com/auth"),
            ("OIDC_TOKEN_URL", "https://idp.example.com/token"),
            ("OIDC_JWKS_URL", "https://idp.example.com/certs"),
            ("OIDC_LOGOUT_URL", "https://idp.example.com/logout"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            vars.insert((*k).to_string(), (*v).to_string());
        }
        Config::from_vars(&vars).unwrap()
    }

    #[test]
    fn test_double_star_matches_any_depth() {
        let pattern = PathPattern::new("/api/**");

        assert!(pattern.matches("/api"));
        assert!(pattern.matches("/api/"));
        assert!(pattern.matches("/api/v1/account"));
        assert!(!pattern.matches("/apix"));
        assert!(!pattern.matches("/static/api"));
    }

    #[test]
    fn test_double_star_in_the_middle() {
        let pattern = PathPattern::new("/a/**/z");

        assert!(pattern.matches("/a/z"));
        assert!(pattern.matches("/a/b/c/z"));
        assert!(!pattern.matches("/a/b/c"));
    }

    #[test]
    fn test_single_star_stays_within_segment() {
        let pattern = PathPattern::new("/static/*.css");

        assert!(pattern.matches("/static/site.css"));
        assert!(pattern.matches("/static/.css"));
        assert!(!pattern.matches("/static/css/site.css"));
        assert!(!pattern.matches("/static/site.js"));
    }

    #[test]
    fn test_question_mark_matches_one_char() {
        let pattern = PathPattern::new("/v?/items");

        assert!(pattern.matches("/v1/items"));
        assert!(!pattern.matches("/v10/items"));
        assert!(!pattern.matches("/v/items"));
    }

    #[test]
    fn test_root_pattern() {
        assert!(PathPattern::new("/").matches("/"));
        assert!(!PathPattern::new("/").matches("/a"));
        assert!(PathPattern::new("/**").matches("/"));
    }

    #[test]
    fn test_policy_evaluation() {
        let anonymous = ctx_with(None);
        let user = ctx_with(Some(&["user"]));

        assert_eq!(Policy::Anonymous.evaluate(&anonymous), Decision::Allow);
        assert_eq!(
            Policy::Authenticated.evaluate(&anonymous),
            Decision::Deny(DenyReason::Unauthenticated)
        );
        assert_eq!(Policy::Authenticated.evaluate(&user), Decision::Allow);
        assert_eq!(
            Policy::Authorized("admin".to_string()).evaluate(&user),
            Decision::Deny(DenyReason::Forbidden)
        );
        assert_eq!(
            Policy::Authorized("user".to_string()).evaluate(&user),
            Decision::Allow
        );
    }

    #[test]
    fn test_first_matching_stage_decides() {
        let chain = PolicyChain::new(vec![
            PolicyStage::paths(["/api/public/**"], Policy::Anonymous),
            PolicyStage::paths(["/api/**"], Policy::Authorized("admin".to_string())),
        ]);

        let mut ctx = ctx_with(None);
        assert_eq!(
            chain.authorize(&mut ctx, &Method::GET, "/api/public/info"),
            Decision::Allow
        );

        let mut ctx = ctx_with(Some(&["user"]));
        assert_eq!(
            chain.authorize(&mut ctx, &Method::GET, "/api/private"),
            Decision::Deny(DenyReason::Forbidden)
        );
        assert!(!ctx.authorization_checked());
    }

    #[test]
    fn test_unmatched_request_is_denied() {
        let chain = PolicyChain::new(vec![PolicyStage::paths(["/api/**"], Policy::Anonymous)]);
        let mut ctx = ctx_with(None);

        assert_eq!(
            chain.authorize(&mut ctx, &Method::GET, "/other"),
            Decision::Deny(DenyReason::Unauthenticated)
        );
    }

    #[test]
    fn test_checked_context_skips_every_policy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let chain = PolicyChain::new(vec![PolicyStage::paths(
            ["/**"],
            Policy::Custom(Arc::new(move |_ctx: &AuthContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })),
        )]);
        let mut ctx = ctx_with(None);

        assert_eq!(chain.authorize(&mut ctx, &Method::GET, "/a"), Decision::Allow);
        assert_eq!(chain.authorize(&mut ctx, &Method::GET, "/a"), Decision::Allow);
        assert_eq!(chain.authorize(&mut ctx, &Method::POST, "/b"), Decision::Allow);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_standard_chain_defaults() {
        let chain = PolicyChain::from_config(&config(&[]));
        let anonymous = || ctx_with(None);

        for path in PUBLIC_PATHS {
            assert_eq!(
                chain.authorize(&mut anonymous(), &Method::GET, path),
                Decision::Allow,
                "{path} should be public"
            );
        }
        assert_eq!(
            chain.authorize(&mut anonymous(), &Method::OPTIONS, "/api/v1/account"),
            Decision::Allow
        );
        assert_eq!(
            chain.authorize(&mut anonymous(), &Method::GET, "/api/v1/account"),
            Decision::Deny(DenyReason::Unauthenticated)
        );
        assert_eq!(
            chain.authorize(&mut ctx_with(Some(&[])), &Method::GET, "/api/v1/account"),
            Decision::Deny(DenyReason::Forbidden)
        );
        assert_eq!(
            chain.authorize(&mut ctx_with(Some(&["user"])), &Method::GET, "/api/v1/account"),
            Decision::Allow
        );
        // Fallback requires authentication only
        assert_eq!(
            chain.authorize(&mut ctx_with(Some(&[])), &Method::GET, "/dashboard"),
            Decision::Allow
        );
        assert_eq!(
            chain.authorize(&mut anonymous(), &Method::GET, "/dashboard"),
            Decision::Deny(DenyReason::Unauthenticated)
        );
    }

    #[test]
    fn test_configured_patterns() {
        let chain = PolicyChain::from_config(&config(&[
            ("PERMIT_ALL_PATTERNS", "/static/**,/favicon.ico"),
            ("NEEDS_AUTHENTICATION_PATTERNS", "/api/v1/account/**"),
            ("NEEDS_AUTHORIZATION_PATTERNS", "/admin/**"),
            ("REQUIRED_AUTHORITY", "admin"),
        ]));

        assert_eq!(
            chain.authorize(&mut ctx_with(None), &Method::GET, "/static/app.js"),
            Decision::Allow
        );
        // Authentication stage precedes authorization stage
        assert_eq!(
            chain.authorize(&mut ctx_with(Some(&[])), &Method::GET, "/api/v1/account"),
            Decision::Allow
        );
        assert_eq!(
            chain.authorize(&mut ctx_with(Some(&["user"])), &Method::GET, "/admin/users"),
            Decision::Deny(DenyReason::Forbidden)
        );
        assert_eq!(
            chain.authorize(&mut ctx_with(Some(&["admin"])), &Method::GET, "/admin/users"),
            Decision::Allow
        );
    }
}
