//! Publish request shape checks, independent of any identity.

pub mod compose;

pub use compose::{check_compose_content, ComposeChecker};

use url::Url;

use crate::config::ComposePolicy;
use crate::error::{RegistryError, RegistryResult};
use crate::types::{PublishRequest, MAX_IMAGES};

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> RegistryResult<&str> {
    let value = header.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(unauthorized("missing authorization header"));
    }

    let scheme_len = "bearer ".len();
    let has_scheme = value
        .get(..scheme_len)
        .is_some_and(|s| s.eq_ignore_ascii_case("bearer "));
    if !has_scheme {
        return Err(unauthorized("authorization must be a bearer token"));
    }

    let token = value[scheme_len..].trim();
    if token.is_empty() {
        return Err(unauthorized("empty bearer token"));
    }
    Ok(token)
}

/// Validate a publish request and return its trimmed form.
pub fn validate_publish_request(
    request: &PublishRequest,
    policy: &ComposePolicy,
) -> RegistryResult<PublishRequest> {
    let req = request.trimmed();

    let required = [
        ("id", &req.id),
        ("name", &req.name),
        ("version", &req.version),
        ("listen_path", &req.routing_path),
        ("manifest_url", &req.manifest_url),
        ("image", &req.image),
        ("compose_file", &req.compose_file),
    ];
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(RegistryError::validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    if req.images.len() > MAX_IMAGES {
        return Err(RegistryError::validation(format!(
            "images supports up to {MAX_IMAGES} entries"
        )));
    }

    check_compose_url(&req.compose_file, policy)?;

    Ok(req)
}

fn check_compose_url(raw: &str, policy: &ComposePolicy) -> RegistryResult<()> {
    let url = Url::parse(raw)
        .map_err(|_| RegistryError::validation("compose_file must be a valid URL"))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(RegistryError::validation(
            "compose_file must be an http(s) URL",
        ));
    }

    let file_name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    if file_name != policy.file_name {
        return Err(RegistryError::validation(format!(
            "compose_file must reference {}",
            policy.file_name
        )));
    }
    Ok(())
}

fn unauthorized(message: &str) -> RegistryError {
    RegistryError::Unauthorized {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_request() -> PublishRequest {
        PublishRequest {
            id: "spotify".into(),
            name: "Spotify".into(),
            version: "v0.1.0".into(),
            routing_path: "/integrations/spotify".into(),
            manifest_url: "https://raw.githubusercontent.com/o/r/v0.1.0/m.json".into(),
            image: "ghcr.io/o/r:v0.1.0".into(),
            compose_file:
                "https://raw.githubusercontent.com/o/r/v0.1.0/compose/docker-compose.integration.yml"
                    .into(),
            ..Default::default()
        }
    }

    fn message(err: RegistryError) -> String {
        match err {
            RegistryError::Validation { message } => message,
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(bearer_token(Some("  bEaReR   tok ")).unwrap(), "tok");

        for header in [None, Some(""), Some("   "), Some("Bearer "), Some("Basic dXNlcg=="), Some("Bearertok")] {
            let err = bearer_token(header).unwrap_err();
            assert!(
                matches!(err, RegistryError::Unauthorized { .. }),
                "{header:?} should be unauthorized"
            );
        }
    }

    #[test]
    fn test_valid_request_is_trimmed() {
        let mut req = complete_request();
        req.id = "  spotify  ".into();
        let out = validate_publish_request(&req, &ComposePolicy::default()).unwrap();
        assert_eq!(out.id, "spotify");
    }

    #[test]
    fn test_missing_fields_are_enumerated() {
        let err =
            validate_publish_request(&PublishRequest::default(), &ComposePolicy::default())
                .unwrap_err();
        assert_eq!(
            message(err),
            "missing required fields: id, name, version, listen_path, manifest_url, image, compose_file"
        );

        let mut req = complete_request();
        req.name = "   ".into();
        req.image = String::new();
        let err = validate_publish_request(&req, &ComposePolicy::default()).unwrap_err();
        assert_eq!(message(err), "missing required fields: name, image");
    }

    #[test]
    fn test_too_many_images() {
        let mut req = complete_request();
        req.images = (0..6).map(|i| format!("https://example.com/{i}.png")).collect();
        let err = validate_publish_request(&req, &ComposePolicy::default()).unwrap_err();
        assert!(message(err).contains("up to 5"));

        req.images.truncate(5);
        assert!(validate_publish_request(&req, &ComposePolicy::default()).is_ok());
    }

    #[test]
    fn test_compose_url_rules() {
        let policy = ComposePolicy::default();
        for bad in [
            "not a url",
            "ftp://example.com/docker-compose.integration.yml",
            "https://example.com/docker-compose.yml",
            "https://example.com/docker-compose.integration.yml/",
        ] {
            let mut req = complete_request();
            req.compose_file = bad.into();
            assert!(
                validate_publish_request(&req, &policy).is_err(),
                "{bad} should be rejected"
            );
        }
    }
}
