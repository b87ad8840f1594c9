//! Zendesk ticketing connector.
//!
//! Covers the surface the ingestion pipeline needs: cursored ticket search,
//! per-ticket comment threads, the custom-field schema, and the
//! custom-object store used for run audit records.

use crate::http::{HttpClient, RateLimitConfig};
use crate::secure_string::SecureString;
use crate::traits::{
    AuthConfig, ClientConfig, Comment, Connector, ConnectorError, ConnectorResult,
    CustomObjectStore, FieldDescriptor, ObjectFieldSpec, ObjectSchema, Ticket, TicketSource,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Polite pause between cursor pages.
const PAGE_DELAY: Duration = Duration::from_secs(1);

/// Zendesk-specific configuration.
#[derive(Debug, Clone)]
pub struct ZendeskConfig {
    /// Account subdomain ({subdomain}.zendesk.com).
    pub subdomain: String,
    /// Agent email the API token belongs to.
    pub email: String,
    /// API token (zeroized on drop).
    pub api_token: SecureString,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum retries after the first attempt.
    pub max_retries: u32,
    /// Base URL override, used by tests; derived from the subdomain
    /// otherwise.
    pub base_url: Option<String>,
}

impl ZendeskConfig {
    pub fn new(
        subdomain: impl Into<String>,
        email: impl Into<String>,
        api_token: impl Into<SecureString>,
    ) -> Self {
        Self {
            subdomain: subdomain.into(),
            email: email.into(),
            api_token: api_token.into(),
            timeout_secs: 30,
            max_retries: 4,
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn resolve_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.zendesk.com/api/v2", self.subdomain))
    }

    fn client_config(&self) -> ClientConfig {
        // Token auth: Basic base64("{email}/token:{token}")
        ClientConfig::new(
            "zendesk",
            self.resolve_base_url(),
            AuthConfig::Basic {
                username: format!("{}/token", self.email),
                password: self.api_token.clone(),
            },
        )
        .with_timeout_secs(self.timeout_secs)
        .with_max_retries(self.max_retries)
    }
}

/// Zendesk connector for ticket ingestion.
pub struct ZendeskConnector {
    config: ZendeskConfig,
    client: HttpClient,
}

impl ZendeskConnector {
    /// Creates a new Zendesk connector.
    pub fn new(config: ZendeskConfig) -> ConnectorResult<Self> {
        let rate_limit = RateLimitConfig {
            max_requests: 100,
            period: Duration::from_secs(60),
            burst_size: 20,
        };

        let client = HttpClient::with_rate_limit(config.client_config(), Some(rate_limit))?;

        info!(subdomain = %config.subdomain, "Zendesk connector initialized");

        Ok(Self { config, client })
    }

    /// Account subdomain this connector talks to.
    pub fn subdomain(&self) -> &str {
        &self.config.subdomain
    }
}

#[async_trait]
impl Connector for ZendeskConnector {
    fn name(&self) -> &str {
        "zendesk"
    }

    fn connector_type(&self) -> &str {
        "ticketing"
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        let response = self.client.get("/users/me.json").await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl TicketSource for ZendeskConnector {
    /// Walks the search cursor for tickets created in the inclusive range,
    /// newest first.
    ///
    /// The first page must succeed (a credential or query problem should not
    /// masquerade as an empty range); a later page failure truncates the
    /// stream with the pages already fetched.
    #[instrument(skip(self))]
    async fn search_created_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ConnectorResult<Vec<Ticket>> {
        let query = format!("type:ticket created>={} created<={}", start, end);

        let response = self
            .client
            .get_query(
                "/search.json",
                &[
                    ("query", query.as_str()),
                    ("sort_by", "created_at"),
                    ("sort_order", "desc"),
                ],
            )
            .await?;
        let mut page: SearchResponse = self.client.parse_json_response(response).await?;

        let mut tickets = page.results;

        while let Some(next_url) = page.next_page.take() {
            sleep(PAGE_DELAY).await;

            let next = match self.client.get_absolute(&next_url).await {
                Ok(response) => self.client.parse_json_response::<SearchResponse>(response).await,
                Err(e) => Err(e),
            };

            match next {
                Ok(p) => {
                    tickets.extend(p.results);
                    page.next_page = p.next_page;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        fetched = tickets.len(),
                        "Search page failed, truncating result stream"
                    );
                    break;
                }
            }
        }

        info!(
            start = %start,
            end = %end,
            count = tickets.len(),
            "Ticket search complete (both range bounds treated as inclusive)"
        );

        Ok(tickets)
    }

    #[instrument(skip(self), fields(ticket_id = ticket_id))]
    async fn list_comments(&self, ticket_id: u64) -> ConnectorResult<Vec<Comment>> {
        let path = format!("/tickets/{}/comments.json", ticket_id);
        let body: CommentsResponse = self.client.get_json(&path).await?;

        debug!(ticket_id, count = body.comments.len(), "Fetched comment thread");

        Ok(body.comments.into_iter().map(Comment::from).collect())
    }

    #[instrument(skip(self))]
    async fn list_ticket_fields(&self) -> ConnectorResult<Vec<FieldDescriptor>> {
        let mut page: TicketFieldsResponse = self.client.get_json("/ticket_fields.json").await?;
        let mut fields = page.ticket_fields;

        while let Some(next_url) = page.next_page.take() {
            sleep(PAGE_DELAY).await;
            let response = self.client.get_absolute(&next_url).await?;
            let p: TicketFieldsResponse = self.client.parse_json_response(response).await?;
            fields.extend(p.ticket_fields);
            page.next_page = p.next_page;
        }

        debug!(count = fields.len(), "Loaded ticket field schema");

        Ok(fields)
    }
}

#[async_trait]
impl CustomObjectStore for ZendeskConnector {
    async fn object_schema_exists(&self, key: &str) -> ConnectorResult<bool> {
        let path = format!("/custom_objects/{}", key);
        match self.client.get(&path).await {
            Ok(_) => Ok(true),
            Err(ConnectorError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_object_schema(&self, schema: &ObjectSchema) -> ConnectorResult<()> {
        let body = serde_json::json!({
            "custom_object": {
                "key": schema.key,
                "title": schema.title,
                "title_pluralized": schema.title_pluralized,
            }
        });

        self.client.post("/custom_objects", &body).await?;
        info!(key = %schema.key, "Created custom object schema");
        Ok(())
    }

    async fn create_object_field(
        &self,
        object_key: &str,
        field: &ObjectFieldSpec,
    ) -> ConnectorResult<()> {
        let path = format!("/custom_objects/{}/fields", object_key);
        let body = serde_json::json!({
            "custom_object_field": {
                "key": field.key,
                "type": field.field_type,
                "title": field.title,
            }
        });

        self.client.post(&path, &body).await?;
        Ok(())
    }

    async fn create_record(&self, object_key: &str, name: &str) -> ConnectorResult<String> {
        let path = format!("/custom_objects/{}/records", object_key);
        let body = serde_json::json!({
            "custom_object_record": { "name": name }
        });

        let created: CreateRecordResponse = self.client.post_json(&path, &body).await?;
        Ok(created.custom_object_record.id)
    }

    async fn update_record(
        &self,
        object_key: &str,
        record_id: &str,
        fields: &HashMap<String, Value>,
    ) -> ConnectorResult<()> {
        let path = format!("/custom_objects/{}/records/{}", object_key, record_id);
        let body = serde_json::json!({
            "custom_object_record": { "custom_object_fields": fields }
        });

        self.client.patch(&path, &body).await?;
        Ok(())
    }
}

// Zendesk API types

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<Ticket>,
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentsResponse {
    comments: Vec<ZendeskComment>,
}

#[derive(Debug, Deserialize)]
struct ZendeskComment {
    id: u64,
    author_id: u64,
    body: String,
    /// Markdown-stripped body, preferred when present.
    plain_body: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default = "default_public")]
    public: bool,
}

fn default_public() -> bool {
    true
}

impl From<ZendeskComment> for Comment {
    fn from(c: ZendeskComment) -> Self {
        Comment {
            id: c.id,
            author_id: c.author_id,
            body: c.plain_body.unwrap_or(c.body),
            created_at: c.created_at,
            public: c.public,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TicketFieldsResponse {
    ticket_fields: Vec<FieldDescriptor>,
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    custom_object_record: RecordBody,
}

#[derive(Debug, Deserialize)]
struct RecordBody {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_connector(server: &MockServer) -> ZendeskConnector {
        let config = ZendeskConfig::new("acme", "agent@acme.test", "token")
            .with_base_url(server.uri());
        ZendeskConnector::new(config).unwrap()
    }

    fn ticket_json(id: u64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "subject": format!("Ticket {}", id),
            "description": "Something broke",
            "status": "solved",
            "priority": "normal",
            "tags": ["billing"],
            "created_at": "2024-06-01T12:00:00Z",
            "updated_at": "2024-06-02T12:00:00Z",
            "requester_id": 9001,
            "assignee_id": 42,
            "custom_fields": [{"id": 7, "value": "refund"}]
        })
    }

    #[test]
    fn test_base_url_derived_from_subdomain() {
        let config = ZendeskConfig::new("acme", "agent@acme.test", "token");
        assert_eq!(
            config.resolve_base_url(),
            "https://acme.zendesk.com/api/v2"
        );
    }

    #[tokio::test]
    async fn test_search_builds_date_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param(
                "query",
                "type:ticket created>=2024-06-01 created<=2024-06-30",
            ))
            .and(query_param("sort_by", "created_at"))
            .and(query_param("sort_order", "desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [ticket_json(1)],
                "next_page": null
            })))
            .mount(&server)
            .await;

        let connector = test_connector(&server);
        let tickets = connector
            .search_created_between(
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].id, 1);
    }

    #[tokio::test]
    async fn test_search_walks_cursor_pages() {
        let server = MockServer::start().await;
        let next = format!("{}/search.json?page=2", server.uri());

        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param("sort_by", "created_at"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [ticket_json(2)],
                "next_page": next
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [ticket_json(1)],
                "next_page": null
            })))
            .mount(&server)
            .await;

        let connector = test_connector(&server);
        let tickets = connector
            .search_created_between(
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(tickets.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_search_page_failure_truncates() {
        let server = MockServer::start().await;
        let next = format!("{}/search.json?page=2", server.uri());

        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param("sort_by", "created_at"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [ticket_json(3), ticket_json(2)],
                "next_page": next
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let connector = test_connector(&server);
        let tickets = connector
            .search_created_between(
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            )
            .await
            .unwrap();

        // Partial progress retained, the bad page dropped
        assert_eq!(tickets.len(), 2);
    }

    #[tokio::test]
    async fn test_list_comments_prefers_plain_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tickets/77/comments.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "comments": [
                    {
                        "id": 1,
                        "author_id": 9001,
                        "body": "**bold** question",
                        "plain_body": "bold question",
                        "created_at": "2024-06-01T12:00:00Z",
                        "public": true
                    },
                    {
                        "id": 2,
                        "author_id": 42,
                        "body": "answer",
                        "created_at": "2024-06-01T13:00:00Z"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let connector = test_connector(&server);
        let comments = connector.list_comments(77).await.unwrap();

        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].body, "bold question");
        assert_eq!(comments[1].body, "answer");
        // public defaults to true when the platform omits it
        assert!(comments[1].public);
    }

    #[tokio::test]
    async fn test_object_schema_exists_maps_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/custom_objects/ticket_import_success"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let connector = test_connector(&server);
        let exists = connector
            .object_schema_exists("ticket_import_success")
            .await
            .unwrap();
        assert!(!exists);
    }

    #[tokio::test]
    async fn test_create_record_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/custom_objects/ticket_import_success/records"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "custom_object_record": {"id": "01J0ABCDE", "name": "Import 2024-06-30"}
            })))
            .mount(&server)
            .await;

        let connector = test_connector(&server);
        let id = connector
            .create_record("ticket_import_success", "Import 2024-06-30")
            .await
            .unwrap();
        assert_eq!(id, "01J0ABCDE");
    }
}
