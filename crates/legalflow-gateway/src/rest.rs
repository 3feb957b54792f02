//! Row API client
//!
//! Speaks the PostgREST dialect exposed by the hosted platform:
//! - `GET/POST/PATCH/DELETE {base}/rest/v1/{table}` for rows
//! - `POST {base}/rest/v1/rpc/{function}` for remote procedures
//!
//! The schema is selected per request with `Accept-Profile` (reads) and
//! `Content-Profile` (writes and RPC).

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::gateway_traits::{
    DataGateway, Filter, GatewayResult, Order, Row, RpcRef, SelectQuery, TableRef,
};

/// Error body returned by the row API
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

/// HTTP-backed [`DataGateway`]
pub struct RestGateway {
    config: GatewayConfig,
    http_client: reqwest::Client,
}

impl RestGateway {
    /// Create a new client
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("legalflow-gateway/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(RestGateway {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> GatewayResult<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn auth_headers(&self) -> GatewayResult<HeaderMap> {
        let key = self.config.key();
        let mut headers = HeaderMap::new();
        let apikey = HeaderValue::from_str(key)
            .map_err(|_| GatewayError::Config("API key is not a valid header value".to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|_| GatewayError::Config("API key is not a valid header value".to_string()))?;
        headers.insert("apikey", apikey);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn request(&self, method: Method, url: String, schema: &str) -> GatewayResult<RequestBuilder> {
        let profile_header = if method == Method::GET {
            "Accept-Profile"
        } else {
            "Content-Profile"
        };
        Ok(self
            .http_client
            .request(method, url)
            .headers(self.auth_headers()?)
            .header(profile_header, schema))
    }

    fn table_url(&self, table: &TableRef) -> String {
        format!("{}/{}", self.config.rest_url(), table.name)
    }

    async fn send(&self, builder: RequestBuilder) -> GatewayResult<Value> {
        let response = builder.send().await?;
        decode_response(response).await
    }

    async fn send_rows(&self, builder: RequestBuilder) -> GatewayResult<Vec<Row>> {
        rows_from_value(self.send(builder).await?)
    }
}

/// Render a filter as a query-string pair.
pub(crate) fn filter_param(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq { column, value } => (column.clone(), format!("eq.{}", literal(value))),
        Filter::IsNull { column } => (column.clone(), "is.null".to_string()),
        Filter::NotNull { column } => (column.clone(), "not.is.null".to_string()),
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn order_param(order: &Order) -> String {
    let direction = if order.descending { "desc" } else { "asc" };
    format!("{}.{}", order.column, direction)
}

/// Query-string pairs for a select.
pub(crate) fn select_params(query: &SelectQuery) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), query.select_clause())];
    params.extend(query.filters.iter().map(filter_param));
    if let Some(order) = &query.order {
        params.push(("order".to_string(), order_param(order)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(offset) = query.offset {
        params.push(("offset".to_string(), offset.to_string()));
    }
    params
}

/// Turn an HTTP response into JSON or a classified gateway error.
async fn decode_response(response: Response) -> GatewayResult<Value> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(error_from_body(status.as_u16(), &text));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

pub(crate) fn error_from_body(status: u16, text: &str) -> GatewayError {
    let body: ErrorBody = serde_json::from_str(text).unwrap_or_default();
    let message = body.message.unwrap_or_else(|| {
        if text.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            text.trim().to_string()
        }
    });
    GatewayError::Remote {
        status,
        code: body.code,
        message,
        details: body.details,
        hint: body.hint,
    }
}

pub(crate) fn rows_from_value(value: Value) -> GatewayResult<Vec<Row>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(GatewayError::Decode(format!("expected row object, got {other}"))),
            })
            .collect(),
        Value::Object(row) => Ok(vec![row]),
        other => Err(GatewayError::Decode(format!("expected row array, got {other}"))),
    }
}

#[async_trait]
impl DataGateway for RestGateway {
    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn select(&self, query: &SelectQuery) -> GatewayResult<Vec<Row>> {
        debug!(filters = query.filters.len(), "select");
        let builder = self
            .request(Method::GET, self.table_url(&query.table), &query.table.schema)?
            .query(&select_params(query));
        self.send_rows(builder).await
    }

    #[instrument(skip(self, rows), fields(table = %table, rows = rows.len()))]
    async fn insert(&self, table: &TableRef, rows: Vec<Row>) -> GatewayResult<Vec<Row>> {
        let builder = self
            .request(Method::POST, self.table_url(table), &table.schema)?
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=representation")
            .json(&rows);
        self.send_rows(builder).await
    }

    #[instrument(skip(self, patch, filters), fields(table = %table))]
    async fn update(
        &self,
        table: &TableRef,
        patch: Row,
        filters: &[Filter],
    ) -> GatewayResult<Vec<Row>> {
        let params: Vec<(String, String)> = filters.iter().map(filter_param).collect();
        let builder = self
            .request(Method::PATCH, self.table_url(table), &table.schema)?
            .query(&params)
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=representation")
            .json(&patch);
        self.send_rows(builder).await
    }

    #[instrument(skip(self, filters), fields(table = %table))]
    async fn delete(&self, table: &TableRef, filters: &[Filter]) -> GatewayResult<Vec<Row>> {
        let params: Vec<(String, String)> = filters.iter().map(filter_param).collect();
        let builder = self
            .request(Method::DELETE, self.table_url(table), &table.schema)?
            .query(&params)
            .header("Prefer", "return=representation");
        self.send_rows(builder).await
    }

    #[instrument(skip(self, params), fields(function = %function))]
    async fn rpc(&self, function: &RpcRef, params: Value) -> GatewayResult<Value> {
        let url = format!("{}/rpc/{}", self.config.rest_url(), function.function);
        let body = if params.is_null() {
            Value::Object(Default::default())
        } else {
            params
        };
        let builder = self
            .request(Method::POST, url, &function.schema)?
            .header(CONTENT_TYPE, "application/json")
            .json(&body);
        match self.send(builder).await {
            Err(GatewayError::Remote { code, message, .. })
                if code.as_deref() == Some("PGRST202") =>
            {
                debug!(%message, "rpc not exposed");
                Err(GatewayError::UnknownRpc(function.qualified()))
            }
            other => other,
        }
    }
}
