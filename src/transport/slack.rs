/// Slack Web API transport.
///
/// Talks to `auth.test`, `conversations.list`, `users.list`,
/// `chat.postMessage` and the external file upload methods with a bearer token.
use super::{read_upload, FileUpload, Identity, Namespace, Transport, TransportError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://slack.com/api";

/// Page size for list endpoints.
const PAGE_LIMIT: u32 = 200;

pub struct SlackTransport {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct AuthTest {
    team: String,
    user: String,
}

#[derive(Debug, Deserialize)]
struct Conversation {
    id: String,
    #[serde(default)]
    name: Option<String>,
    /// Set on im conversations: the other party's user id.
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Member {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct UploadTarget {
    upload_url: String,
    file_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct ConversationsPage {
    #[serde(default)]
    channels: Vec<Conversation>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Debug, Deserialize)]
struct MembersPage {
    #[serde(default)]
    members: Vec<Member>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

impl SlackTransport {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http {
                method: "client".to_string(),
                source: e,
            })?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_url, method)
    }

    /// Send a request and unwrap Slack's `{"ok": ..., "error": ...}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        let http_err = |e| TransportError::Http {
            method: method.to_string(),
            source: e,
        };
        let resp = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?;
        let body: Value = resp.json().await.map_err(http_err)?;

        if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            return Err(TransportError::Api {
                method: method.to_string(),
                error,
            });
        }

        serde_json::from_value(body).map_err(|e| TransportError::Api {
            method: method.to_string(),
            error: format!("malformed response: {e}"),
        })
    }

    /// Fetch every conversation of one type, following cursors.
    async fn conversations(&self, types: &str) -> Result<Vec<Conversation>, TransportError> {
        let mut all = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut query = vec![
                ("types", types.to_string()),
                ("exclude_archived", "true".to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.clone()));
            }
            let request = self.client.get(self.url("conversations.list")).query(&query);
            let page: ConversationsPage = self.call("conversations.list", request).await?;
            all.extend(page.channels);

            cursor = page.response_metadata.next_cursor;
            if cursor.is_empty() {
                return Ok(all);
            }
        }
    }

    async fn user_id(&self, name: &str) -> Result<Option<String>, TransportError> {
        let mut cursor = String::new();
        loop {
            let mut query = vec![("limit", PAGE_LIMIT.to_string())];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.clone()));
            }
            let request = self.client.get(self.url("users.list")).query(&query);
            let page: MembersPage = self.call("users.list", request).await?;
            if let Some(member) = page.members.into_iter().find(|m| m.name == name) {
                return Ok(Some(member.id));
            }

            cursor = page.response_metadata.next_cursor;
            if cursor.is_empty() {
                return Ok(None);
            }
        }
    }
}

#[async_trait]
impl Transport for SlackTransport {
    async fn authenticate(&self) -> Result<Identity, TransportError> {
        let request = self.client.post(self.url("auth.test"));
        let auth: AuthTest = self.call("auth.test", request).await?;
        Ok(Identity {
            team: auth.team,
            user: auth.user,
        })
    }

    async fn lookup(
        &self,
        namespace: Namespace,
        name: &str,
    ) -> Result<Option<String>, TransportError> {
        let by_name = |convs: Vec<Conversation>| {
            convs
                .into_iter()
                .find(|c| c.name.as_deref() == Some(name))
                .map(|c| c.id)
        };
        match namespace {
            Namespace::Channel => Ok(by_name(self.conversations("public_channel").await?)),
            Namespace::Group => Ok(by_name(self.conversations("private_channel").await?)),
            Namespace::Im => {
                let Some(user_id) = self.user_id(name).await? else {
                    return Ok(None);
                };
                Ok(self
                    .conversations("im")
                    .await?
                    .into_iter()
                    .find(|c| c.user.as_deref() == Some(user_id.as_str()))
                    .map(|c| c.id))
            }
        }
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), TransportError> {
        let request = self
            .client
            .post(self.url("chat.postMessage"))
            .json(&serde_json::json!({
                "channel": channel_id,
                "text": text,
                "as_user": true,
            }));
        let _: Value = self.call("chat.postMessage", request).await?;
        Ok(())
    }

    /// Reserve an upload URL, send the bytes there, then share the file.
    ///
    /// Slack has no file type parameter for this flow; it infers the type
    /// from the file name and contents, so `upload.file_type` is only logged.
    async fn upload_file(
        &self,
        channel_id: &str,
        upload: &FileUpload,
    ) -> Result<(), TransportError> {
        let contents = read_upload(&upload.path).await?;
        if let Some(file_type) = &upload.file_type {
            tracing::debug!(file_type = %file_type, "file type is inferred by Slack, not sent");
        }

        let request = self
            .client
            .post(self.url("files.getUploadURLExternal"))
            .form(&[
                ("filename", upload.name.clone()),
                ("length", contents.len().to_string()),
            ]);
        let target: UploadTarget = self.call("files.getUploadURLExternal", request).await?;
        tracing::debug!(file_id = %target.file_id, "reserved upload url");

        let http_err = |e| TransportError::Http {
            method: "file upload".to_string(),
            source: e,
        };
        let part = reqwest::multipart::Part::bytes(contents).file_name(upload.name.clone());
        self.client
            .post(&target.upload_url)
            .multipart(reqwest::multipart::Form::new().part("file", part))
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?;

        let mut body = serde_json::json!({
            "files": [{"id": target.file_id, "title": upload.name}],
            "channel_id": channel_id,
        });
        if let Some(comment) = &upload.comment {
            body["initial_comment"] = Value::String(comment.clone());
        }
        let request = self
            .client
            .post(self.url("files.completeUploadExternal"))
            .json(&body);
        let _: Value = self.call("files.completeUploadExternal", request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> SlackTransport {
        SlackTransport::new(&server.uri(), "xoxb-test", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_authenticate_reports_team_and_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .and(header("authorization", "Bearer xoxb-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true, "team": "acme", "user": "slackcat"
            })))
            .mount(&server)
            .await;

        let identity = transport(&server).authenticate().await.unwrap();
        assert_eq!(identity.team, "acme");
        assert_eq!(identity.user, "slackcat");
    }

    #[tokio::test]
    async fn test_authenticate_invalid_token_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": false, "error": "invalid_auth"})),
            )
            .mount(&server)
            .await;

        let err = transport(&server).authenticate().await.unwrap_err();
        match err {
            TransportError::Api { method, error } => {
                assert_eq!(method, "auth.test");
                assert_eq!(error, "invalid_auth");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_failure_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = transport(&server)
            .post_message("C1", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Http { .. }));
    }

    #[tokio::test]
    async fn test_post_message_sends_channel_and_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(body_string_contains(r#""channel":"C123""#))
            .and(body_string_contains(r#""text":"line one\nline two""#))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        transport(&server)
            .post_message("C123", "line one\nline two")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lookup_channel_follows_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .and(query_param("types", "public_channel"))
            .and(query_param("cursor", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "channels": [{"id": "C2", "name": "deploys"}],
                "response_metadata": {"next_cursor": ""}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .and(query_param("types", "public_channel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "channels": [{"id": "C1", "name": "general"}],
                "response_metadata": {"next_cursor": "page2"}
            })))
            .mount(&server)
            .await;

        let t = transport(&server);
        assert_eq!(
            t.lookup(Namespace::Channel, "deploys").await.unwrap(),
            Some("C2".to_string())
        );
        assert_eq!(t.lookup(Namespace::Channel, "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookup_im_matches_user_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "members": [{"id": "U1", "name": "bob"}, {"id": "U2", "name": "alice"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .and(query_param("types", "im"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "channels": [{"id": "D1", "user": "U1"}, {"id": "D2", "user": "U2"}]
            })))
            .mount(&server)
            .await;

        let t = transport(&server);
        assert_eq!(
            t.lookup(Namespace::Im, "alice").await.unwrap(),
            Some("D2".to_string())
        );
        assert_eq!(t.lookup(Namespace::Im, "carol").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upload_file_reserves_sends_and_completes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files.getUploadURLExternal"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_string_contains("filename=report.txt"))
            .and(body_string_contains("length=9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "upload_url": format!("{}/upload/F1", server.uri()),
                "file_id": "F1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/F1"))
            .and(body_string_contains("file body"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK - 9"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/files.completeUploadExternal"))
            .and(body_string_contains(r#""id":"F1""#))
            .and(body_string_contains(r#""title":"report.txt""#))
            .and(body_string_contains(r#""channel_id":"C1""#))
            .and(body_string_contains(r#""initial_comment":"nightly results""#))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.txt");
        std::fs::write(&file, "file body").unwrap();

        let upload = FileUpload {
            path: file,
            name: "report.txt".to_string(),
            file_type: Some("text".to_string()),
            comment: Some("nightly results".to_string()),
        };
        transport(&server).upload_file("C1", &upload).await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_file_rejected_reservation_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files.getUploadURLExternal"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": false, "error": "not_in_channel"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/files.completeUploadExternal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out.log");
        std::fs::write(&file, "x").unwrap();
        let upload = FileUpload {
            path: file,
            name: "out.log".to_string(),
            file_type: None,
            comment: None,
        };
        let err = transport(&server)
            .upload_file("C1", &upload)
            .await
            .unwrap_err();
        match err {
            TransportError::Api { method, error } => {
                assert_eq!(method, "files.getUploadURLExternal");
                assert_eq!(error, "not_in_channel");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_io_error() {
        let server = MockServer::start().await;
        let upload = FileUpload {
            path: "/nonexistent-dir/nothing.txt".into(),
            name: "nothing.txt".to_string(),
            file_type: None,
            comment: None,
        };
        let err = transport(&server)
            .upload_file("C1", &upload)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Io { .. }));
    }
}
