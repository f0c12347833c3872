//! Webhook relay parsing: turn a hosted-repository push notification into
//! the same [`SyncRequest`] shape a direct invocation uses.
//!
//! Only the payload-to-request mapping lives here; receiving the HTTP
//! request is the web server's problem (`pet hook` reads the body from
//! stdin, CGI style).

use pet_core::types::{BackendFilter, EnvName, RefFilter, RefName, SyncRequest};
use serde::Deserialize;

use crate::error::DispatchError;

/// Payload dialects pet understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFormat {
    GitHub,
    Bitbucket,
}

impl HookFormat {
    /// Identify the sender from its user-agent header value.
    pub fn detect(user_agent: &str) -> Result<Self, DispatchError> {
        let lower = user_agent.to_ascii_lowercase();
        if lower.contains("github") {
            Ok(HookFormat::GitHub)
        } else if lower.contains("bitbucket") {
            Ok(HookFormat::Bitbucket)
        } else {
            Err(DispatchError::UnknownUserAgent {
                user_agent: user_agent.to_owned(),
            })
        }
    }

    /// Parse a push payload into a sync request restricted to the pushed
    /// branches. Branches that cannot be environments are dropped here;
    /// the synchronizer re-checks anyway.
    pub fn parse(&self, payload: &str) -> Result<SyncRequest, DispatchError> {
        let branches = match self {
            HookFormat::GitHub => parse_github(payload)?,
            HookFormat::Bitbucket => parse_bitbucket(payload)?,
        };
        let refs: Vec<RefName> = branches
            .into_iter()
            .filter(|b| EnvName::is_valid(b))
            .map(RefName)
            .collect();
        Ok(SyncRequest {
            refs: RefFilter::Only(refs),
            backends: BackendFilter::All,
            refresh_cache: true,
        })
    }
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GitHubPush {
    #[serde(rename = "ref")]
    git_ref: String,
}

const BRANCH_REF_PREFIX: &str = "refs/heads/";

fn parse_github(payload: &str) -> Result<Vec<String>, DispatchError> {
    let push: GitHubPush =
        serde_json::from_str(payload).map_err(|e| DispatchError::Payload {
            format: "github",
            source: e,
        })?;
    // Tag and note pushes are not branch updates; nothing to sync.
    Ok(push
        .git_ref
        .strip_prefix(BRANCH_REF_PREFIX)
        .map(str::to_owned)
        .into_iter()
        .collect())
}

// ---------------------------------------------------------------------------
// Bitbucket
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BitbucketPush {
    push: BitbucketChanges,
}

#[derive(Debug, Deserialize)]
struct BitbucketChanges {
    changes: Vec<BitbucketChange>,
}

#[derive(Debug, Deserialize)]
struct BitbucketChange {
    new: Option<BitbucketTarget>,
}

#[derive(Debug, Deserialize)]
struct BitbucketTarget {
    #[serde(rename = "type")]
    kind: String,
    name: String,
}

fn parse_bitbucket(payload: &str) -> Result<Vec<String>, DispatchError> {
    let push: BitbucketPush =
        serde_json::from_str(payload).map_err(|e| DispatchError::Payload {
            format: "bitbucket",
            source: e,
        })?;
    Ok(push
        .push
        .changes
        .into_iter()
        // A change without `new` is a branch deletion; prune is explicit.
        .filter_map(|c| c.new)
        .filter(|t| t.kind == "branch")
        .map(|t| t.name)
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn only_refs(request: &SyncRequest) -> Vec<String> {
        match &request.refs {
            RefFilter::Only(refs) => refs.iter().map(|r| r.0.clone()).collect(),
            RefFilter::All => panic!("hook requests are always restricted"),
        }
    }

    #[test]
    fn detect_is_case_insensitive_substring_match() {
        assert_eq!(
            HookFormat::detect("GitHub-Hookshot/f05835d").unwrap(),
            HookFormat::GitHub
        );
        assert_eq!(
            HookFormat::detect("Bitbucket-Webhooks/2.0").unwrap(),
            HookFormat::Bitbucket
        );
        assert!(matches!(
            HookFormat::detect("curl/8.0"),
            Err(DispatchError::UnknownUserAgent { .. })
        ));
    }

    #[test]
    fn github_branch_push_yields_single_ref() {
        let payload = r#"{"ref": "refs/heads/production", "commits": []}"#;
        let request = HookFormat::GitHub.parse(payload).expect("parse");
        assert_eq!(only_refs(&request), vec!["production"]);
        assert_eq!(request.backends, BackendFilter::All);
    }

    #[test]
    fn github_tag_push_yields_empty_request() {
        let payload = r#"{"ref": "refs/tags/v1.0"}"#;
        let request = HookFormat::GitHub.parse(payload).expect("parse");
        assert!(only_refs(&request).is_empty());
    }

    #[test]
    fn github_invalid_branch_name_is_dropped() {
        let payload = r#"{"ref": "refs/heads/master"}"#;
        let request = HookFormat::GitHub.parse(payload).expect("parse");
        assert!(only_refs(&request).is_empty());
    }

    #[test]
    fn bitbucket_push_collects_branch_changes() {
        let payload = r#"{
            "push": {
                "changes": [
                    {"new": {"type": "branch", "name": "staging"}},
                    {"new": {"type": "tag", "name": "v2"}},
                    {"new": null},
                    {"new": {"type": "branch", "name": "production"}}
                ]
            }
        }"#;
        let request = HookFormat::Bitbucket.parse(payload).expect("parse");
        assert_eq!(only_refs(&request), vec!["staging", "production"]);
    }

    #[test]
    fn malformed_payload_is_payload_error() {
        let err = HookFormat::GitHub.parse("not json").expect_err("parse error");
        assert!(matches!(err, DispatchError::Payload { format: "github", .. }));
    }
}
