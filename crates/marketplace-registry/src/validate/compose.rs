//! Compose file fetch and content rules.

use std::collections::BTreeMap;
use std::net::IpAddr;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::{Host, Url};

use crate::config::ComposePolicy;
use crate::error::{RegistryError, RegistryResult};

#[derive(Debug, Deserialize)]
struct ComposeDocument {
    #[serde(default)]
    services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ComposeService {
    image: Option<String>,
}

/// Loopback, link-local, multicast, unspecified and private ranges.
fn is_unsafe_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            let octets = addr.octets();
            addr.is_loopback()
                || addr.is_link_local()
                || addr.is_multicast()
                || addr.is_unspecified()
                || addr.is_broadcast()
                || octets[0] == 10
                || (octets[0] == 192 && octets[1] == 168)
                || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        }
        IpAddr::V6(addr) => {
            addr.is_loopback()
                || addr.is_multicast()
                || addr.is_unspecified()
                || (addr.segments()[0] & 0xfe00) == 0xfc00
                || (addr.segments()[0] & 0xffc0) == 0xfe80
                || addr.to_ipv4_mapped().is_some_and(|v4| is_unsafe_ip(&IpAddr::V4(v4)))
        }
    }
}

/// Fetches a compose file and checks it against a [`ComposePolicy`].
#[derive(Debug, Clone)]
pub struct ComposeChecker {
    client: Client,
    policy: ComposePolicy,
}

impl ComposeChecker {
    pub fn new(policy: ComposePolicy) -> RegistryResult<Self> {
        let client = Client::builder()
            .timeout(policy.fetch_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("marketplace-registry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::validation(format!("compose client: {e}")))?;
        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &ComposePolicy {
        &self.policy
    }

    fn check_host(&self, url: &str) -> RegistryResult<()> {
        let parsed = Url::parse(url)
            .map_err(|e| RegistryError::validation(format!("invalid compose_file url: {e}")))?;
        if self.policy.allow_private_hosts {
            return Ok(());
        }
        let blocked = match parsed.host() {
            Some(Host::Ipv4(addr)) => is_unsafe_ip(&IpAddr::V4(addr)),
            Some(Host::Ipv6(addr)) => is_unsafe_ip(&IpAddr::V6(addr)),
            Some(Host::Domain(domain)) => {
                let domain = domain.trim_end_matches('.').to_ascii_lowercase();
                domain == "localhost" || domain.ends_with(".localhost")
            }
            None => true,
        };
        if blocked {
            warn!(event = "compose_host_rejected", url = %url);
            return Err(RegistryError::validation("compose_file host not allowed"));
        }
        Ok(())
    }

    /// Fetch `url` and validate the content.
    pub async fn check(&self, url: &str) -> RegistryResult<()> {
        let content = self.fetch(url).await?;
        check_compose_content(&content, &self.policy)?;
        debug!(event = "compose_validated", url = %url, bytes = content.len());
        Ok(())
    }

    async fn fetch(&self, url: &str) -> RegistryResult<String> {
        self.check_host(url)?;

        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryError::validation(format!("compose fetch failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(RegistryError::validation(format!(
                "compose fetch failed: HTTP {}",
                resp.status().as_u16()
            )));
        }

        let max = self.policy.max_bytes;
        if resp.content_length().is_some_and(|len| len > max as u64) {
            return Err(RegistryError::validation("compose file too large"));
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| RegistryError::validation(format!("compose read failed: {e}")))?
        {
            if body.len() + chunk.len() > max {
                return Err(RegistryError::validation("compose file too large"));
            }
            body.extend_from_slice(&chunk);
        }

        let content = String::from_utf8(body)
            .map_err(|_| RegistryError::validation("compose file is not valid UTF-8"))?;
        if content.trim().is_empty() {
            return Err(RegistryError::validation("compose file is empty"));
        }
        Ok(content)
    }
}

/// Check compose content without fetching it.
pub fn check_compose_content(content: &str, policy: &ComposePolicy) -> RegistryResult<()> {
    if content.trim().is_empty() {
        return Err(RegistryError::validation("compose file is empty"));
    }
    if !content.contains(&policy.required_placeholder) {
        return Err(RegistryError::validation(format!(
            "compose file must use {}",
            policy.required_placeholder
        )));
    }
    if content.contains(&policy.forbidden_placeholder) {
        return Err(RegistryError::validation(format!(
            "compose file must not reference {}",
            policy.forbidden_placeholder
        )));
    }

    let doc: ComposeDocument = serde_yaml::from_str(content)
        .map_err(|e| RegistryError::validation(format!("compose file is not valid YAML: {e}")))?;
    if doc.services.is_empty() {
        return Err(RegistryError::validation("compose file has no services"));
    }
    for (name, service) in &doc.services {
        let has_image = service
            .image
            .as_deref()
            .is_some_and(|image| !image.trim().is_empty());
        if !has_image {
            return Err(RegistryError::validation(format!(
                "compose service {name} missing image"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GOOD: &str = r#"
services:
  spotify:
    image: ghcr.io/petoadam/homenavi-spotify:v0.1.0
    volumes:
      - ${INTEGRATIONS_ROOT}/spotify:/data
"#;

    // wiremock listens on loopback.
    fn local_policy() -> ComposePolicy {
        ComposePolicy {
            allow_private_hosts: true,
            ..ComposePolicy::default()
        }
    }

    fn message(err: RegistryError) -> String {
        match err {
            RegistryError::Validation { message } => message,
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_content() {
        check_compose_content(GOOD, &ComposePolicy::default()).unwrap();
    }

    #[test]
    fn test_placeholder_rules() {
        let policy = ComposePolicy::default();
        let err = check_compose_content("services:\n  a:\n    image: x\n", &policy).unwrap_err();
        assert!(message(err).contains("INTEGRATIONS_ROOT"));

        let content = format!("{GOOD}\n# ${{HOMENAVI_ROOT}}\n");
        let err = check_compose_content(&content, &policy).unwrap_err();
        assert!(message(err).contains("must not reference HOMENAVI_ROOT"));
    }

    #[test]
    fn test_services_need_images() {
        let policy = ComposePolicy::default();
        let content = "# INTEGRATIONS_ROOT\nservices:\n  a:\n    image: \"  \"\n";
        let err = check_compose_content(content, &policy).unwrap_err();
        assert_eq!(message(err), "compose service a missing image");

        let content = "# INTEGRATIONS_ROOT\nservices: {}\n";
        let err = check_compose_content(content, &policy).unwrap_err();
        assert_eq!(message(err), "compose file has no services");

        let content = "# INTEGRATIONS_ROOT\nservices: [oops\n";
        let err = check_compose_content(content, &policy).unwrap_err();
        assert!(message(err).contains("not valid YAML"));
    }

    #[tokio::test]
    async fn test_fetch_and_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docker-compose.integration.yml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(GOOD))
            .mount(&server)
            .await;

        let checker = ComposeChecker::new(local_policy()).unwrap();
        checker
            .check(&format!("{}/docker-compose.integration.yml", server.uri()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fetch_rejects_error_status_and_oversize() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing/docker-compose.integration.yml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/big/docker-compose.integration.yml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(GOOD.repeat(64)))
            .mount(&server)
            .await;

        let policy = ComposePolicy {
            max_bytes: 1024,
            ..local_policy()
        };
        let checker = ComposeChecker::new(policy).unwrap();

        let err = checker
            .check(&format!("{}/missing/docker-compose.integration.yml", server.uri()))
            .await
            .unwrap_err();
        assert!(message(err).contains("HTTP 404"));

        let err = checker
            .check(&format!("{}/big/docker-compose.integration.yml", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(message(err), "compose file too large");
    }

    #[tokio::test]
    async fn test_private_and_loopback_hosts_rejected() {
        let checker = ComposeChecker::new(ComposePolicy::default()).unwrap();
        for url in [
            "http://127.0.0.1:8080/docker-compose.integration.yml",
            "http://localhost/docker-compose.integration.yml",
            "http://10.1.2.3/docker-compose.integration.yml",
            "http://192.168.0.10/docker-compose.integration.yml",
            "http://172.20.0.1/docker-compose.integration.yml",
            "http://169.254.169.254/docker-compose.integration.yml",
            "http://[::1]/docker-compose.integration.yml",
            "http://[fd00::1]/docker-compose.integration.yml",
            "http://[::ffff:127.0.0.1]/docker-compose.integration.yml",
        ] {
            let err = checker.check(url).await.unwrap_err();
            assert_eq!(message(err), "compose_file host not allowed", "{url}");
        }
    }

    #[tokio::test]
    async fn test_redirects_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/moved/docker-compose.integration.yml"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "/docker-compose.integration.yml"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/docker-compose.integration.yml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(GOOD))
            .expect(0)
            .mount(&server)
            .await;

        let checker = ComposeChecker::new(local_policy()).unwrap();
        let err = checker
            .check(&format!("{}/moved/docker-compose.integration.yml", server.uri()))
            .await
            .unwrap_err();
        assert!(message(err).contains("HTTP 302"));
    }
}
