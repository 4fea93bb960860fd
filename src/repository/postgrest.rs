//! PostgREST repository for supermarket lookup and price inserts.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{InsertResponse, PriceStore, Result, StoreError, PRICES_TABLE, SUPERMARKETS_TABLE};
use crate::config::StoreCredentials;
use crate::models::{PriceRecord, SupermarketId};

/// Request timeout for store calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP-backed repository for a Supabase/PostgREST project.
#[derive(Clone)]
pub struct PostgrestRepository {
    client: reqwest::Client,
    base_url: Url,
}

impl PostgrestRepository {
    /// Create a repository for the project at `credentials.url`.
    pub fn new(credentials: &StoreCredentials) -> Result<Self> {
        let base_url = Url::parse(&credentials.url)?;

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&credentials.service_key)
            .map_err(|_| StoreError::InvalidKey)?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", credentials.service_key))
            .map_err(|_| StoreError::InvalidKey)?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// REST endpoint for `table`.
    fn table_url(&self, table: &str) -> Url {
        let mut url = self.base_url.clone();
        let path = format!("{}/rest/v1/{}", url.path().trim_end_matches('/'), table);
        url.set_path(&path);
        url
    }

    /// `SELECT columns FROM table WHERE field = value`.
    pub async fn select_eq(
        &self,
        table: &str,
        columns: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>> {
        let mut url = self.table_url(table);
        url.query_pairs_mut()
            .append_pair("select", columns)
            .append_pair(field, &format!("eq.{}", value));

        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Bulk insert `rows` into `table`, asking for the written rows back.
    pub async fn insert<T: Serialize + Sync>(
        &self,
        table: &str,
        rows: &[T],
    ) -> Result<InsertResponse> {
        let url = self.table_url(table);

        debug!("POST {} ({} rows)", url, rows.len());
        let response = self
            .client
            .post(url)
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Ok(InsertResponse::Rejected(error_message(&body)));
        }

        let written: Vec<Value> = serde_json::from_str(&body)?;
        if written.is_empty() {
            return Ok(InsertResponse::Rejected(
                "store returned no inserted rows".to_string(),
            ));
        }

        Ok(InsertResponse::Inserted(written.len()))
    }
}

/// Pull the human-readable message out of a PostgREST error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "unknown error".to_string()
            } else {
                body.trim().to_string()
            }
        })
}

#[async_trait]
impl PriceStore for PostgrestRepository {
    async fn resolve_supermarket_id(&self, slug: &str) -> Result<SupermarketId> {
        let rows = self
            .select_eq(SUPERMARKETS_TABLE, "id", "slug", slug)
            .await?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::UnknownSlug(slug.to_string()))?;

        row.get("id")
            .filter(|id| !id.is_null())
            .cloned()
            .map(SupermarketId::new)
            .ok_or(StoreError::MissingColumn("id"))
    }

    async fn insert_prices(&self, records: &[PriceRecord]) -> Result<InsertResponse> {
        self.insert(PRICES_TABLE, records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScrapedProduct;
    use axum::extract::Query;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    const KEY: &str = "service-role-key";

    fn authorized(headers: &AxumHeaders) -> bool {
        headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(KEY)
            && headers.get("authorization").and_then(|v| v.to_str().ok())
                == Some("Bearer service-role-key")
    }

    async fn lookup(
        headers: AxumHeaders,
        Query(params): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        if !authorized(&headers) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Invalid API key" })),
            );
        }
        assert_eq!(params.get("select").map(String::as_str), Some("id"));
        match params.get("slug").map(String::as_str) {
            Some("eq.santa-isabel") => (StatusCode::OK, Json(json!([{ "id": 3 }]))),
            _ => (StatusCode::OK, Json(json!([]))),
        }
    }

    async fn insert_prices(headers: AxumHeaders, Json(rows): Json<Value>) -> (StatusCode, Json<Value>) {
        assert_eq!(
            headers.get("prefer").and_then(|v| v.to_str().ok()),
            Some("return=representation")
        );
        let rows = rows.as_array().cloned().unwrap_or_default();
        if rows.iter().any(|r| r["price"].as_u64() == Some(13)) {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "code": "23514",
                    "message": "new row violates check constraint \"prices_price_check\""
                })),
            );
        }
        (StatusCode::CREATED, Json(Value::Array(rows)))
    }

    async fn serve() -> String {
        let app = Router::new()
            .route("/rest/v1/supermarkets", get(lookup))
            .route("/rest/v1/prices", post(insert_prices));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn repo(url: String, key: &str) -> PostgrestRepository {
        PostgrestRepository::new(&StoreCredentials {
            url,
            service_key: key.to_string(),
        })
        .unwrap()
    }

    fn record(price: u64) -> PriceRecord {
        PriceRecord::from_scraped(
            &SupermarketId::new(3),
            &ScrapedProduct {
                name: "Dobladita".to_string(),
                price,
            },
        )
    }

    #[test]
    fn test_table_url_keeps_base_path() {
        let repo = repo("https://abc.supabase.co/".to_string(), KEY);
        assert_eq!(
            repo.table_url("prices").as_str(),
            "https://abc.supabase.co/rest/v1/prices"
        );
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message":"permission denied"}"#), "permission denied");
        assert_eq!(error_message("upstream timeout"), "upstream timeout");
        assert_eq!(error_message(""), "unknown error");
    }

    #[tokio::test]
    async fn test_resolve_supermarket_id() {
        let repo = repo(serve().await, KEY);
        let id = repo.resolve_supermarket_id("santa-isabel").await.unwrap();
        assert_eq!(id, SupermarketId::new(3));
    }

    #[tokio::test]
    async fn test_resolve_unknown_slug() {
        let repo = repo(serve().await, KEY);
        assert!(matches!(
            repo.resolve_supermarket_id("lider").await,
            Err(StoreError::UnknownSlug(slug)) if slug == "lider"
        ));
    }

    #[tokio::test]
    async fn test_resolve_with_bad_key_is_status_error() {
        let repo = repo(serve().await, "wrong-key");
        match repo.resolve_supermarket_id("santa-isabel").await {
            Err(StoreError::Status { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_insert_prices_counts_rows() {
        let repo = repo(serve().await, KEY);
        let response = repo
            .insert_prices(&[record(1990), record(2490)])
            .await
            .unwrap();
        assert_eq!(response, InsertResponse::Inserted(2));
    }

    #[tokio::test]
    async fn test_insert_rejection_carries_message() {
        let repo = repo(serve().await, KEY);
        let response = repo.insert_prices(&[record(13)]).await.unwrap();
        assert_eq!(
            response,
            InsertResponse::Rejected(
                "new row violates check constraint \"prices_price_check\"".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_unreachable_store_is_http_error() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let repo = repo(format!("http://{}", addr), KEY);
        assert!(matches!(
            repo.insert_prices(&[record(1990)]).await,
            Err(StoreError::Http(_))
        ));
    }
}
