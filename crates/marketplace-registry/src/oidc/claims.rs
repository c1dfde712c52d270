//! Claims carried by a CI identity token.

use serde::{Deserialize, Deserializer, Serialize};

/// Verified CI provenance claims, scoped to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// `owner/name` of the repository that ran the workflow.
    #[serde(default)]
    pub repository: String,

    /// Git ref that triggered the run (e.g. `refs/tags/v1.0.0`).
    #[serde(default, rename = "ref")]
    pub git_ref: String,

    /// Kind of ref: `tag`, `branch`, ...
    #[serde(default, rename = "ref_type")]
    pub ref_kind: String,

    #[serde(default, rename = "sha")]
    pub commit_sha: String,

    #[serde(default, rename = "workflow")]
    pub workflow_name: String,

    #[serde(default, rename = "job_workflow_ref")]
    pub workflow_ref: String,

    #[serde(default)]
    pub actor: String,

    #[serde(default, deserialize_with = "string_or_number")]
    pub run_id: String,

    #[serde(default, deserialize_with = "string_or_number")]
    pub run_attempt: String,

    #[serde(default, rename = "iss")]
    pub issuer: String,

    #[serde(default, rename = "aud", deserialize_with = "one_or_many")]
    pub audience: Vec<String>,

    /// Expiry, seconds since the epoch.
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl IdentityClaims {
    /// Names of load-bearing claims that are absent or blank.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.repository.trim().is_empty() {
            missing.push("repository");
        }
        if self.git_ref.trim().is_empty() {
            missing.push("ref");
        }
        if self.commit_sha.trim().is_empty() {
            missing.push("sha");
        }
        missing
    }
}

// Providers disagree on whether run ids are strings or integers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
        None => Vec::new(),
    })
}
