//! Binding of verified identity claims to a publish request.
//!
//! A verified token only proves who is asking. The binder proves that the
//! version, release tag, repository and manifest location in the request
//! all describe the tag that CI run actually built.

use tracing::warn;
use url::Url;

use crate::config::{GitHubConfig, OidcConfig};
use crate::error::{ClaimField, RegistryError, RegistryResult};
use crate::oidc::IdentityClaims;
use crate::types::PublishRequest;

const TAG_REF_PREFIX: &str = "refs/tags/";

/// Cross-checks caller-supplied provenance against verified claims.
#[derive(Debug, Clone)]
pub struct ClaimBinder {
    tag_prefix: String,
    web_url: String,
    raw_content_url: String,
}

impl ClaimBinder {
    pub fn new(
        tag_prefix: impl Into<String>,
        web_url: impl Into<String>,
        raw_content_url: impl Into<String>,
    ) -> Self {
        Self {
            tag_prefix: tag_prefix.into().trim().to_string(),
            web_url: web_url.into().trim_end_matches('/').to_string(),
            raw_content_url: raw_content_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(oidc: &OidcConfig, github: &GitHubConfig) -> Self {
        Self::new(&oidc.tag_prefix, &github.web_url, &github.raw_content_url)
    }

    /// Extract the authoritative tag from the claims.
    pub fn tag_from_claims(&self, claims: &IdentityClaims) -> RegistryResult<String> {
        if !claims.ref_kind.eq_ignore_ascii_case("tag") {
            return Err(RegistryError::mismatch(
                ClaimField::RefType,
                "oidc ref_type must be tag",
            ));
        }

        let Some(tag) = claims.git_ref.strip_prefix(TAG_REF_PREFIX) else {
            return Err(RegistryError::mismatch(
                ClaimField::Ref,
                "oidc ref must be a tag",
            ));
        };
        if tag.trim().is_empty() {
            return Err(RegistryError::mismatch(ClaimField::Ref, "oidc tag missing"));
        }

        if !self.tag_prefix.is_empty() && !tag.starts_with(&self.tag_prefix) {
            return Err(RegistryError::mismatch(
                ClaimField::TagPrefix,
                format!("tag must start with {:?}", self.tag_prefix),
            ));
        }

        Ok(tag.to_string())
    }

    /// Bind a (trimmed) request to the claims, returning the tag.
    pub fn bind(&self, request: &PublishRequest, claims: &IdentityClaims) -> RegistryResult<String> {
        let tag = self.tag_from_claims(claims)?;
        let repo = claims.repository.trim();

        if request.version != tag {
            warn!(event = "claim_mismatch", field = "version", version = %request.version, tag = %tag);
            return Err(RegistryError::mismatch(
                ClaimField::Version,
                "version must match the tag",
            ));
        }

        if request.release_tag != tag {
            warn!(event = "claim_mismatch", field = "release_tag", release_tag = %request.release_tag, tag = %tag);
            return Err(RegistryError::mismatch(
                ClaimField::ReleaseTag,
                "release_tag must match the tag",
            ));
        }

        let repo_url = normalize_repo_url(&request.repo_url);
        let expected_repo_url = normalize_repo_url(&format!("{}/{}", self.web_url, repo));
        if repo_url.is_empty() || repo_url != expected_repo_url {
            warn!(event = "claim_mismatch", field = "repo_url", repo_url = %repo_url, expected = %expected_repo_url);
            return Err(RegistryError::mismatch(
                ClaimField::RepoUrl,
                "repo_url must match the GitHub repository",
            ));
        }

        let raw_base = self.raw_base(repo, &tag);
        if !manifest_under(&request.manifest_url, &raw_base) {
            warn!(event = "claim_mismatch", field = "manifest_url", manifest_url = %request.manifest_url, expected_prefix = %raw_base);
            return Err(RegistryError::mismatch(
                ClaimField::ManifestUrl,
                "manifest_url must point to the tag in the GitHub repo",
            ));
        }

        Ok(tag)
    }

    /// Raw-content prefix for files of `repo` at `tag`.
    pub fn raw_base(&self, repo: &str, tag: &str) -> String {
        format!("{}/{}/{}/", self.raw_content_url, repo, tag)
    }
}

/// Whether `manifest_url`, with dot segments resolved, stays below `raw_base`.
///
/// Percent-encoded dots are refused outright so an encoded `..` cannot be
/// resolved by whoever fetches the URL later.
fn manifest_under(manifest_url: &str, raw_base: &str) -> bool {
    if manifest_url.to_ascii_lowercase().contains("%2e") {
        return false;
    }
    let Ok(url) = Url::parse(manifest_url) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let Ok(base) = Url::parse(raw_base) else {
        return false;
    };
    url.as_str().starts_with(base.as_str())
}

/// Lower-case, without trailing `/` or `.git`.
pub fn normalize_repo_url(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    let mut url = lowered.as_str();
    loop {
        let stripped = url.trim_end_matches('/');
        let stripped = stripped.strip_suffix(".git").unwrap_or(stripped);
        if stripped == url {
            break;
        }
        url = stripped;
    }
    url.to_string()
}
