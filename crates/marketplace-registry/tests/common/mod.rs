//! Shared fixtures: a transient RSA issuer and wiremock endpoints.

#![allow(dead_code)]

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ISSUER: &str = "https://token.actions.githubusercontent.com";
pub const AUDIENCE: &str = "homenavi-marketplace";
pub const KID: &str = "test-key-1";
pub const WORKFLOW: &str = "verify.yml";

pub struct TestIssuer {
    encoding_key: EncodingKey,
    jwks: Value,
}

/// One 2048-bit key per test binary; generation is slow in debug builds.
pub fn issuer() -> &'static TestIssuer {
    static ISSUER_KEY: OnceLock<TestIssuer> = OnceLock::new();
    ISSUER_KEY.get_or_init(|| {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 2048).expect("generate rsa key");
        let der = private.to_pkcs1_der().expect("encode rsa key");
        let public = private.to_public_key();

        TestIssuer {
            encoding_key: EncodingKey::from_rsa_der(der.as_bytes()),
            jwks: json!({
                "keys": [{
                    "kty": "RSA",
                    "alg": "RS256",
                    "use": "sig",
                    "kid": KID,
                    "n": URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
                    "e": URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
                }]
            }),
        }
    })
}

impl TestIssuer {
    pub fn jwks(&self) -> &Value {
        &self.jwks
    }

    /// Sign `claims` with the test key under `kid`.
    pub fn sign(&self, kid: &str, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, claims, &self.encoding_key).expect("sign token")
    }

    pub fn token(&self, claims: &Value) -> String {
        self.sign(KID, claims)
    }
}

pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Claims of a tag build of `org/app` at commit `abc`.
pub fn tag_claims(tag: &str) -> Value {
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "exp": now() + 300,
        "nbf": now() - 5,
        "iat": now() - 5,
        "repository": "org/app",
        "repository_owner": "org",
        "ref": format!("refs/tags/{tag}"),
        "ref_type": "tag",
        "sha": "abc",
        "workflow": "release",
        "job_workflow_ref": format!("org/app/.github/workflows/release.yml@refs/tags/{tag}"),
        "actor": "octocat",
        "run_id": "4242",
        "run_attempt": "1"
    })
}

pub fn with(mut claims: Value, key: &str, value: Value) -> Value {
    claims[key] = value;
    claims
}

pub fn without(mut claims: Value, key: &str) -> Value {
    if let Some(obj) = claims.as_object_mut() {
        obj.remove(key);
    }
    claims
}

pub async fn mount_jwks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issuer().jwks().clone()))
        .mount(server)
        .await;
}

/// Run history for `repo` at `sha` reporting `total_count` successful runs.
pub async fn mount_runs(server: &MockServer, repo: &str, sha: &str, total_count: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/{repo}/actions/workflows/{WORKFLOW}/runs")))
        .and(query_param("status", "success"))
        .and(query_param("per_page", "1"))
        .and(query_param("head_sha", sha))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": total_count,
            "workflow_runs": []
        })))
        .mount(server)
        .await;
}

pub const COMPOSE: &str = r#"services:
  app:
    image: ghcr.io/org/app:v1.0.0
    volumes:
      - ${INTEGRATIONS_ROOT}/app:/data
"#;

pub async fn mount_compose(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/org/app/docker-compose.integration.yml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(COMPOSE))
        .mount(server)
        .await;
}

pub fn compose_url(server: &MockServer) -> String {
    format!("{}/org/app/docker-compose.integration.yml", server.uri())
}
