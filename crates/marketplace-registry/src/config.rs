//! Registry configuration.
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `MARKETPLACE_DATABASE_PATH` | SQLite database file (default: `marketplace.db`) |
//! | `OIDC_ISSUER` | Trusted token issuer (default: `https://token.actions.githubusercontent.com`) |
//! | `OIDC_AUDIENCE` | Expected token audience (default: `homenavi-marketplace`) |
//! | `OIDC_JWKS_URL` | Key set endpoint (default: `<issuer>/.well-known/jwks`) |
//! | `OIDC_VERIFY_WORKFLOW` | Workflow file that must have passed (default: `verify.yml`) |
//! | `OIDC_TAG_PREFIX` | Required tag prefix (default: `v`) |
//! | `OIDC_HTTP_TIMEOUT_SECS` | Timeout for key set and run-history calls (default: 10) |
//! | `GITHUB_API_URL` | CI run-history API base (default: `https://api.github.com`) |
//! | `GITHUB_API_TOKEN` | Optional bearer credential for the run-history API |

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ISSUER: &str = "https://token.actions.githubusercontent.com";
pub const DEFAULT_AUDIENCE: &str = "homenavi-marketplace";
pub const DEFAULT_VERIFY_WORKFLOW: &str = "verify.yml";
pub const DEFAULT_TAG_PREFIX: &str = "v";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_WEB_URL: &str = "https://github.com";
pub const DEFAULT_RAW_CONTENT_URL: &str = "https://raw.githubusercontent.com";
pub const DEFAULT_DATABASE_PATH: &str = "marketplace.db";

/// Identity-token trust settings.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Trusted issuer (`iss`).
    pub issuer: String,

    /// Expected audience (`aud`).
    pub audience: String,

    /// Published key set endpoint.
    pub jwks_url: String,

    /// Workflow file that must have a successful run for the commit.
    /// `None` makes attestation fail closed.
    pub verify_workflow: Option<String>,

    /// Required tag prefix; empty disables the check.
    pub tag_prefix: String,

    /// Allowed clock skew for `exp` / `nbf`.
    pub clock_skew_leeway: Duration,

    /// Lifetime of a fetched key set.
    pub key_set_ttl: Duration,

    /// Minimum spacing between refreshes triggered by unknown key ids.
    pub refresh_cooldown: Duration,

    /// Timeout for key set and run-history requests.
    pub http_timeout: Duration,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            jwks_url: jwks_url_for(DEFAULT_ISSUER),
            verify_workflow: Some(DEFAULT_VERIFY_WORKFLOW.to_string()),
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
            clock_skew_leeway: Duration::from_secs(30),
            key_set_ttl: Duration::from_secs(30 * 60),
            refresh_cooldown: Duration::from_secs(30),
            http_timeout: Duration::from_secs(10),
        }
    }
}

/// Source-control host settings.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// REST API base for run history.
    pub api_url: String,

    /// Optional API credential.
    pub api_token: Option<String>,

    /// Web base used to derive canonical repository URLs.
    pub web_url: String,

    /// Raw-content base used to derive manifest URL prefixes.
    pub raw_content_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GITHUB_API_URL.to_string(),
            api_token: None,
            web_url: DEFAULT_GITHUB_WEB_URL.to_string(),
            raw_content_url: DEFAULT_RAW_CONTENT_URL.to_string(),
        }
    }
}

/// Rules for the integration compose file.
#[derive(Debug, Clone)]
pub struct ComposePolicy {
    /// Required last path segment of the compose URL.
    pub file_name: String,

    /// Placeholder the compose file must reference.
    pub required_placeholder: String,

    /// Placeholder the compose file must not reference.
    pub forbidden_placeholder: String,

    /// Maximum bytes read from the compose URL.
    pub max_bytes: usize,

    pub fetch_timeout: Duration,

    /// Permit loopback, link-local and private-range IP hosts.
    pub allow_private_hosts: bool,
}

impl Default for ComposePolicy {
    fn default() -> Self {
        Self {
            file_name: "docker-compose.integration.yml".to_string(),
            required_placeholder: "INTEGRATIONS_ROOT".to_string(),
            forbidden_placeholder: "HOMENAVI_ROOT".to_string(),
            max_bytes: 512 * 1024,
            fetch_timeout: Duration::from_secs(6),
            allow_private_hosts: false,
        }
    }
}

/// Complete registry configuration.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    pub database_path: PathBuf,
    pub oidc: OidcConfig,
    pub github: GitHubConfig,
    pub compose: ComposePolicy,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            oidc: OidcConfig::default(),
            github: GitHubConfig::default(),
            compose: ComposePolicy::default(),
        }
    }
}

impl MarketplaceConfig {
    /// Load configuration from the environment.
    ///
    /// Blank values are treated as unset.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_value("MARKETPLACE_DATABASE_PATH") {
            cfg.database_path = PathBuf::from(v);
        }

        if let Some(v) = env_value("OIDC_ISSUER") {
            cfg.oidc.jwks_url = jwks_url_for(&v);
            cfg.oidc.issuer = v;
        }
        if let Some(v) = env_value("OIDC_JWKS_URL") {
            cfg.oidc.jwks_url = v;
        }
        if let Some(v) = env_value("OIDC_AUDIENCE") {
            cfg.oidc.audience = v;
        }
        // An explicitly empty value disables the workflow, which then fails closed.
        match std::env::var("OIDC_VERIFY_WORKFLOW") {
            Ok(v) if v.trim().is_empty() => cfg.oidc.verify_workflow = None,
            Ok(v) => cfg.oidc.verify_workflow = Some(v.trim().to_string()),
            Err(_) => {}
        }
        if let Some(v) = env_value("OIDC_TAG_PREFIX") {
            cfg.oidc.tag_prefix = v;
        }
        if let Some(secs) = env_value("OIDC_HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            cfg.oidc.http_timeout = Duration::from_secs(secs);
        }

        if let Some(v) = env_value("GITHUB_API_URL") {
            cfg.github.api_url = v;
        }
        cfg.github.api_token = env_value("GITHUB_API_TOKEN");

        cfg
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.oidc.issuer = issuer.into();
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.oidc.audience = audience.into();
        self
    }

    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.oidc.jwks_url = url.into();
        self
    }

    pub fn with_verify_workflow(mut self, workflow: Option<String>) -> Self {
        self.oidc.verify_workflow = workflow;
        self
    }

    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.oidc.tag_prefix = prefix.into();
        self
    }

    pub fn with_github_api_url(mut self, url: impl Into<String>) -> Self {
        self.github.api_url = url.into();
        self
    }

    pub fn with_github_token(mut self, token: impl Into<String>) -> Self {
        self.github.api_token = Some(token.into());
        self
    }

    pub fn with_compose_policy(mut self, policy: ComposePolicy) -> Self {
        self.compose = policy;
        self
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn jwks_url_for(issuer: &str) -> String {
    format!("{}/.well-known/jwks", issuer.trim_end_matches('/'))
}
