use crate::config::AppConfig;
use crate::domain::{CommandRequest, CommandResult, DeviceUser, Record, Resource};
use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, Url};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const TOKEN_ENV: &str = "NCLOCK_TOKEN";

/// Credentials for the backend. Passed explicitly to the client so nothing
/// reads the token from ambient state.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Session {
    pub fn new(token: Option<String>) -> Self {
        let token = token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        Self { token }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::resolve(std::env::var(TOKEN_ENV).ok(), config.auth_token.as_deref())
    }

    fn resolve(env_token: Option<String>, configured: Option<&str>) -> Self {
        let env = Self::new(env_token);
        if env.token.is_some() {
            return env;
        }
        Self::new(configured.map(str::to_string))
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn authorization(&self) -> Option<String> {
        self.token.as_ref().map(|token| format!("Bearer {token}"))
    }
}

#[async_trait]
pub trait ConsoleApi: Send + Sync {
    async fn list(&self, resource: Resource) -> Result<Vec<Record>, ApiError>;
    async fn create(
        &self,
        resource: Resource,
        entity: &Record,
    ) -> Result<Option<Record>, ApiError>;
    async fn update(
        &self,
        resource: Resource,
        id: &str,
        entity: &Record,
    ) -> Result<Option<Record>, ApiError>;
    async fn delete(&self, resource: Resource, id: &str) -> Result<(), ApiError>;
    async fn device_users(&self, terminal_id: &str) -> Result<Vec<DeviceUser>, ApiError>;
    async fn run_command(&self, request: &CommandRequest) -> Result<CommandResult, ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpConsoleClient {
    client: Client,
    base_url: Url,
    session: Session,
}

impl HttpConsoleClient {
    pub fn new(base_url: &str, session: Session, client: Client) -> Result<Self, ApiError> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = Url::parse(&normalized).map_err(|err| ApiError::InvalidUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl {
                url: base_url.to_string(),
                reason: "not a base url".to_string(),
            });
        }
        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    pub fn from_config(config: &AppConfig, session: Session) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Self::new(&config.api_base_url, session, client)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| ApiError::InvalidUrl {
                url: format!("{}{path}", self.base_url),
                reason: err.to_string(),
            })
    }

    /// Sends one request and returns the raw body of a 2xx response.
    async fn send(
        &self,
        method: Method,
        mut url: Url,
        body: Option<&Record>,
    ) -> Result<String, ApiError> {
        debug!(%method, %url, "sending request");
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(auth) = self.session.authorization() {
            request = request.header(AUTHORIZATION, auth);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            url.set_query(None);
            warn!(%method, %url, status = status.as_u16(), "backend rejected request");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    async fn get_array(&self, path: &str) -> Result<Vec<Value>, ApiError> {
        let text = self.send(Method::GET, self.url(path)?, None).await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

/// Parses an optional JSON object from a response body. Empty and non-JSON
/// bodies yield `None`.
fn optional_record(text: &str) -> Option<Record> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(record)) => Some(record),
        _ => None,
    }
}

fn command_message(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(message)) => Some(message),
        Ok(Value::Object(record)) => ["value", "message"]
            .iter()
            .find_map(|key| record.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        Ok(_) => None,
        Err(_) => Some(trimmed.to_string()),
    }
}

#[async_trait]
impl ConsoleApi for HttpConsoleClient {
    async fn list(&self, resource: Resource) -> Result<Vec<Record>, ApiError> {
        let path = resource.list_path();
        let values = self.get_array(&path).await?;
        let total = values.len();
        let records: Vec<Record> = values
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(record) => Some(record),
                _ => None,
            })
            .collect();
        if records.len() != total {
            warn!(
                resource = %resource,
                skipped = total - records.len(),
                "skipped non-object entries in list response"
            );
        }
        Ok(records)
    }

    async fn create(
        &self,
        resource: Resource,
        entity: &Record,
    ) -> Result<Option<Record>, ApiError> {
        let url = self.url(&resource.create_path())?;
        let text = self.send(Method::POST, url, Some(entity)).await?;
        Ok(optional_record(&text))
    }

    async fn update(
        &self,
        resource: Resource,
        id: &str,
        entity: &Record,
    ) -> Result<Option<Record>, ApiError> {
        let url = self.url(&resource.update_path(id))?;
        let text = self.send(Method::PUT, url, Some(entity)).await?;
        Ok(optional_record(&text))
    }

    async fn delete(&self, resource: Resource, id: &str) -> Result<(), ApiError> {
        let url = self.url(&resource.delete_path(id))?;
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn device_users(&self, terminal_id: &str) -> Result<Vec<DeviceUser>, ApiError> {
        let path = format!("Zkteco/GetAllEmployeesOnDevice/{terminal_id}");
        let values = self.get_array(&path).await?;
        let users = values
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<DeviceUser>(value) {
                Ok(user) => Some(user),
                Err(err) => {
                    warn!(terminal = terminal_id, error = %err, "skipped malformed device user");
                    None
                }
            })
            .collect();
        Ok(users)
    }

    async fn run_command(&self, request: &CommandRequest) -> Result<CommandResult, ApiError> {
        let mut url = self.url(&request.command.path(&request.terminal_id))?;
        if let Some(employee) = &request.employee_id {
            url.query_pairs_mut().append_pair("employeeId", employee);
        }

        let started = Instant::now();
        let text = self.send(Method::POST, url, None).await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        Ok(CommandResult {
            message: command_message(&text),
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeviceCommand;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, token: Option<&str>) -> HttpConsoleClient {
        HttpConsoleClient::new(
            &format!("{}/api", server.uri()),
            Session::new(token.map(str::to_string)),
            Client::new(),
        )
        .expect("client")
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(record) => record,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn env_token_overrides_configured_token() {
        let session = Session::resolve(Some("from-env".to_string()), Some("from-file"));
        assert_eq!(session.token(), Some("from-env"));

        let session = Session::resolve(Some("  ".to_string()), Some("from-file"));
        assert_eq!(session.token(), Some("from-file"));

        let session = Session::resolve(None, None);
        assert!(!session.is_authenticated());
    }

    #[test]
    fn session_debug_redacts_token() {
        let session = Session::new(Some("secret".to_string()));
        assert!(!format!("{session:?}").contains("secret"));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = HttpConsoleClient::new("not a url", Session::default(), Client::new())
            .expect_err("invalid url");
        assert!(matches!(err, ApiError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn list_sends_bearer_token_and_skips_non_objects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Employees/GetAllEmployees"))
            .and(header("Authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "employeeID": "E1", "name": "Alice" },
                42,
                { "employeeID": "E2", "name": "Bob" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let records = client_for(&server, Some("abc"))
            .list(Resource::Employees)
            .await
            .expect("list");
        let ids: Vec<String> = records
            .iter()
            .filter_map(|r| Resource::Employees.record_id(r))
            .collect();
        assert_eq!(ids, vec!["E1", "E2"]);
    }

    #[tokio::test]
    async fn empty_list_body_is_an_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Departaments"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let records = client_for(&server, None)
            .list(Resource::Departments)
            .await
            .expect("list");
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn non_json_list_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Groups"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .list(Resource::Groups)
            .await
            .expect_err("decode error");
        assert!(matches!(err, ApiError::Decode { ref path, .. } if path == "Groups"));
    }

    #[tokio::test]
    async fn unauthorized_status_maps_to_redirect_notice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Zones"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("stale"))
            .list(Resource::Zones)
            .await
            .expect_err("401");
        assert!(matches!(err, ApiError::Status { status: 401, .. }));
        assert_eq!(
            err.notice().route(),
            Some(crate::error::Route::Unauthorized)
        );
    }

    #[tokio::test]
    async fn create_posts_json_and_tolerates_empty_reply() {
        let server = MockServer::start().await;
        let payload = record(json!({ "name": "Night shift", "description": null }));
        Mock::given(method("POST"))
            .and(path("/api/Groups"))
            .and(body_json(json!({ "name": "Night shift", "description": null })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let created = client_for(&server, None)
            .create(Resource::Groups, &payload)
            .await
            .expect("create");
        assert_eq!(created, None);
    }

    #[tokio::test]
    async fn update_returns_the_saved_entity() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/Employees/UpdateEmployee/E1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "employeeID": "E1", "name": "Alice B." })),
            )
            .mount(&server)
            .await;

        let payload = record(json!({ "employeeID": "E1", "name": "Alice B." }));
        let updated = client_for(&server, None)
            .update(Resource::Employees, "E1", &payload)
            .await
            .expect("update")
            .expect("record");
        assert_eq!(updated.get("name"), Some(&json!("Alice B.")));
    }

    #[tokio::test]
    async fn delete_uses_resource_route() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/Zkteco/DeleteDevice/T1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server, None)
            .delete(Resource::Terminals, "T1")
            .await
            .expect("delete");
    }

    #[tokio::test]
    async fn device_users_skip_malformed_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Zkteco/GetAllEmployeesOnDevice/T1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "employeeID": "E1", "enrollNumber": 7, "statusFprint": true },
                "garbage"
            ])))
            .mount(&server)
            .await;

        let users = client_for(&server, None)
            .device_users("T1")
            .await
            .expect("device users");
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].enroll_number.as_deref(), Some("7"));
        assert!(users[0].fingerprint);
    }

    #[tokio::test]
    async fn send_selected_command_carries_employee_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Zkteco/SendEmployeesToDevice/T1"))
            .and(query_param("employeeId", "E1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "value": "1 user sent" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = CommandRequest {
            command: DeviceCommand::SendSelectedUsers,
            terminal_id: "T1".to_string(),
            terminal_name: "Entrance".to_string(),
            employee_id: Some("E1".to_string()),
        };
        let result = client_for(&server, None)
            .run_command(&request)
            .await
            .expect("command");
        assert_eq!(result.message.as_deref(), Some("1 user sent"));
    }

    #[test]
    fn command_message_accepts_text_and_json() {
        assert_eq!(command_message(""), None);
        assert_eq!(command_message("\"done\""), Some("done".to_string()));
        assert_eq!(
            command_message(r#"{"message":"door open"}"#),
            Some("door open".to_string())
        );
        assert_eq!(command_message("plain ok"), Some("plain ok".to_string()));
        assert_eq!(command_message("true"), None);
    }

    #[tokio::test]
    async fn refused_connection_is_a_network_error() {
        let client = HttpConsoleClient::new(
            "http://127.0.0.1:1/api/",
            Session::default(),
            Client::new(),
        )
        .expect("client");
        let err = client.list(Resource::Zones).await.expect_err("network");
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(
            err.notice(),
            crate::error::Notice::Toast(crate::error::NETWORK_ERROR_MESSAGE.to_string())
        );
    }
}
