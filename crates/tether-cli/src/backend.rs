//! HTTP persistence for single record fields.
//!
//! One commit is one `PATCH {base}/{collection}/{id}/` carrying a
//! form-encoded `field=value` body. The reply's copy of the field is the
//! server's value; a reply without it confirms the sent value.

use async_trait::async_trait;
use serde_json::Value;
use tether_core::{AbortSignal, CommitBackend, CommitError, SyncKey};
use tracing::debug;

/// Longest server error body kept in a rejection message.
const DETAIL_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct HttpFieldBackend {
    base: String,
    collection: String,
    default_field: String,
    agent: ureq::Agent,
}

impl HttpFieldBackend {
    pub fn new(
        base: impl Into<String>,
        collection: impl Into<String>,
        default_field: impl Into<String>,
    ) -> Self {
        Self {
            base: base.into(),
            collection: collection.into(),
            default_field: default_field.into(),
            agent: ureq::agent(),
        }
    }

    /// `{base}/{collection}/{id}/`, tolerating stray slashes on either part.
    pub fn record_url(&self, id: &str) -> String {
        format!(
            "{}/{}/{}/",
            self.base.trim_end_matches('/'),
            self.collection.trim_matches('/'),
            id
        )
    }

    /// Field written for `key`: the key's own field, else the default.
    pub fn field_for<'a>(&'a self, key: &'a SyncKey) -> &'a str {
        key.field().unwrap_or(&self.default_field)
    }

    fn patch(agent: &ureq::Agent, url: &str, field: &str, value: &str) -> Result<String, CommitError> {
        let response = agent
            .request("PATCH", url)
            .set("Accept", "application/json")
            .send_form(&[(field, value)]);

        match response {
            Ok(response) => {
                let body = response.into_json::<Value>().ok();
                Ok(read_back(body.as_ref(), field).unwrap_or_else(|| value.to_string()))
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(CommitError::Rejected {
                    status,
                    detail: summarize(&body),
                })
            }
            Err(other) => Err(CommitError::Transport(other.to_string())),
        }
    }
}

/// The field's string value in a JSON reply, if present.
fn read_back(body: Option<&Value>, field: &str) -> Option<String> {
    match body?.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn summarize(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "request rejected".to_string();
    }
    match trimmed.char_indices().nth(DETAIL_LIMIT) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[async_trait]
impl CommitBackend<String> for HttpFieldBackend {
    async fn commit(
        &self,
        key: &SyncKey,
        value: String,
        mut abort: AbortSignal,
    ) -> Result<String, CommitError> {
        let url = self.record_url(key.id());
        let field = self.field_for(key).to_string();
        let agent = self.agent.clone();
        debug!(%url, %field, %value, "patching field");

        let request = tokio::task::spawn_blocking(move || Self::patch(&agent, &url, &field, &value));
        match abort.until_aborted(request).await {
            None => Err(CommitError::Aborted),
            Some(Ok(result)) => result,
            Some(Err(err)) => Err(CommitError::Transport(format!("request task failed: {err}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_url_joins_cleanly() {
        let backend = HttpFieldBackend::new("http://localhost:8000/api/", "/crimes/", "status");
        assert_eq!(backend.record_url("42"), "http://localhost:8000/api/crimes/42/");
    }

    #[test]
    fn key_field_overrides_default() {
        let backend = HttpFieldBackend::new("http://x", "crimes", "status");
        let plain = SyncKey::new("victim", 1);
        let narrowed = SyncKey::new("victim", 1).with_field("notes");
        assert_eq!(backend.field_for(&plain), "status");
        assert_eq!(backend.field_for(&narrowed), "notes");
    }

    #[test]
    fn read_back_prefers_reply_value() {
        let body = serde_json::json!({ "id": 42, "status": "Solved", "count": 3 });
        assert_eq!(read_back(Some(&body), "status").as_deref(), Some("Solved"));
        assert_eq!(read_back(Some(&body), "count").as_deref(), Some("3"));
        assert_eq!(read_back(Some(&body), "missing"), None);
        assert_eq!(read_back(None, "status"), None);
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let long = "x".repeat(500);
        let detail = summarize(&long);
        assert_eq!(detail.chars().count(), DETAIL_LIMIT + 1);
        assert_eq!(summarize("  "), "request rejected");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_failure() {
        let backend = HttpFieldBackend::new("http://127.0.0.1:9", "crimes", "status");
        let err = backend
            .commit(&SyncKey::new("victim", 42), "Solved".into(), AbortSignal::never())
            .await
            .expect_err("nothing listens on the discard port");
        assert!(matches!(err, CommitError::Transport(_)), "{err:?}");
    }
}
