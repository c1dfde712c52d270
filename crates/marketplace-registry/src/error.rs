//! Error types for the integration registry.

use std::fmt;

/// Request field that disagrees with the verified identity token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimField {
    /// `ref_type` claim is not a tag.
    RefType,
    /// `ref` claim is not under `refs/tags/`.
    Ref,
    /// Tag does not carry the configured prefix.
    TagPrefix,
    /// `version` differs from the tag.
    Version,
    /// `release_tag` differs from the tag.
    ReleaseTag,
    /// `repo_url` does not point at the token's repository.
    RepoUrl,
    /// `manifest_url` is not served from the tag being published.
    ManifestUrl,
}

impl ClaimField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefType => "ref_type",
            Self::Ref => "ref",
            Self::TagPrefix => "tag_prefix",
            Self::Version => "version",
            Self::ReleaseTag => "release_tag",
            Self::RepoUrl => "repo_url",
            Self::ManifestUrl => "manifest_url",
        }
    }
}

impl fmt::Display for ClaimField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Authorization header missing or malformed.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Identity token failed signature, claim or shape checks.
    #[error("invalid oidc token: {reason}")]
    InvalidToken { reason: String },

    /// The identity provider's key set could not be fetched.
    #[error("key set unavailable: {message}")]
    KeySetUnavailable { message: String },

    /// The CI provider could not answer the run-history query.
    #[error("attestation unavailable: {message}")]
    AttestationUnavailable { message: String },

    /// A required trust setting is missing.
    #[error("not configured: {message}")]
    NotConfigured { message: String },

    /// No successful run of the required workflow exists for the commit.
    #[error("workflow {workflow} has no successful run for {repository}@{commit_sha}")]
    WorkflowNotVerified {
        repository: String,
        commit_sha: String,
        workflow: String,
    },

    /// A provenance field in the request disagrees with the token.
    #[error("{message}")]
    ClaimMismatch { field: ClaimField, message: String },

    /// Malformed or incomplete publish request.
    #[error("{message}")]
    Validation { message: String },

    /// Routing path is held by another package's latest version.
    #[error("listen_path already used: {routing_path}")]
    RoutingPathInUse { routing_path: String },

    /// Display name is held by another package's latest version.
    #[error("name already used: {name}")]
    NameInUse { name: String },

    /// Integration not found.
    #[error("integration not found: {package_id}{}", version_suffix(.version))]
    NotFound {
        package_id: String,
        version: Option<String>,
    },

    /// Transaction or connectivity failure in the store.
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RegistryError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken {
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(field: ClaimField, message: impl Into<String>) -> Self {
        Self::ClaimMismatch {
            field,
            message: message.into(),
        }
    }

    /// HTTP status class for whatever transport embeds the registry.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized { .. } | Self::InvalidToken { .. } => 401,
            Self::WorkflowNotVerified { .. } => 403,
            Self::ClaimMismatch { .. } | Self::Validation { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::RoutingPathInUse { .. } | Self::NameInUse { .. } => 409,
            Self::KeySetUnavailable { .. }
            | Self::AttestationUnavailable { .. }
            | Self::NotConfigured { .. } => 503,
            Self::Storage { .. } => 500,
        }
    }

    /// Message safe to return to the caller.
    ///
    /// Token rejections never explain themselves beyond "invalid", and
    /// server-side failures are not attributed to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidToken { .. } => "invalid oidc token".to_string(),
            Self::KeySetUnavailable { .. } => "identity key set unavailable".to_string(),
            Self::AttestationUnavailable { .. } => "workflow verification unavailable".to_string(),
            Self::NotConfigured { .. } => "workflow verification not configured".to_string(),
            Self::WorkflowNotVerified { .. } => "verify workflow did not pass".to_string(),
            Self::Storage { .. } => "internal storage error".to_string(),
            Self::Unauthorized { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the caller is responsible for the failure.
    pub fn is_caller_error(&self) -> bool {
        !matches!(
            self,
            Self::KeySetUnavailable { .. }
                | Self::AttestationUnavailable { .. }
                | Self::NotConfigured { .. }
                | Self::Storage { .. }
        )
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Not found / request issues
            Self::NotFound { .. } => 1,
            Self::Validation { .. } => 1,

            // Auth issues
            Self::Unauthorized { .. } => 2,
            Self::InvalidToken { .. } => 2,

            // Provenance issues
            Self::WorkflowNotVerified { .. } => 3,
            Self::ClaimMismatch { .. } => 3,

            // Conflicts
            Self::RoutingPathInUse { .. } => 4,
            Self::NameInUse { .. } => 4,

            // Trust anchors down / misconfigured
            Self::KeySetUnavailable { .. } => 5,
            Self::AttestationUnavailable { .. } => 5,
            Self::NotConfigured { .. } => 5,

            Self::Storage { .. } => 6,
        }
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage {
            message: format!("json column: {err}"),
        }
    }
}

fn version_suffix(version: &Option<String>) -> String {
    version.as_deref().map(|v| format!("@{v}")).unwrap_or_default()
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
