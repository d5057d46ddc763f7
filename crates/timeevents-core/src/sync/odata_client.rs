//! OData client for the remote time-event feed.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use crate::storage::Config;
use crate::sync::types::{RemoteTimeEvent, SyncError};

/// Environment variable holding the OData basic-auth password.
pub const PASSWORD_ENV: &str = "TIMEEVENTS_ODATA_PASSWORD";

/// Source of remote time events.
#[async_trait]
pub trait RemoteFeed: Send + Sync {
    /// Time events of `employee_id` dated within `from..=to`.
    async fn fetch_time_events(
        &self,
        employee_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RemoteTimeEvent>, SyncError>;
}

/// Feed for engines that only touch the local cache. Every fetch fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFeed;

#[async_trait]
impl RemoteFeed for OfflineFeed {
    async fn fetch_time_events(
        &self,
        _employee_id: &str,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Vec<RemoteTimeEvent>, SyncError> {
        Err(SyncError::Config("no OData service configured".into()))
    }
}

/// Connection settings for [`ODataClient`].
#[derive(Debug, Clone)]
pub struct ODataConfig {
    pub service_url: url::Url,
    pub entity_set: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl ODataConfig {
    /// Build from the application config, reading the password from the environment.
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        if config.odata.service_url.is_empty() {
            return Err(SyncError::Config("odata.service_url is not set".into()));
        }
        let service_url = url::Url::parse(&config.odata.service_url)
            .map_err(|e| SyncError::Config(format!("odata.service_url: {e}")))?;
        Ok(Self {
            service_url,
            entity_set: config.odata.entity_set.clone(),
            user: config.odata.user.clone().filter(|u| !u.is_empty()),
            password: std::env::var(PASSWORD_ENV).ok(),
            timeout: Duration::from_secs(config.odata.timeout_secs),
        })
    }
}

/// OData v2 client for the time-event entity set.
pub struct ODataClient {
    config: ODataConfig,
    http: reqwest::Client,
}

impl ODataClient {
    pub fn new(config: ODataConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    /// Full request URL for one employee and date window.
    pub fn time_events_url(&self, employee_id: &str, from: NaiveDate, to: NaiveDate) -> String {
        let base = self.config.service_url.as_str().trim_end_matches('/');
        let filter = build_filter(employee_id, from, to);
        format!(
            "{}/{}?$filter={}&$format=json",
            base,
            self.config.entity_set,
            urlencoding::encode(&filter)
        )
    }
}

#[async_trait]
impl RemoteFeed for ODataClient {
    async fn fetch_time_events(
        &self,
        employee_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RemoteTimeEvent>, SyncError> {
        let url = self.time_events_url(employee_id, from, to);
        tracing::debug!(%url, "fetching time events");

        let mut request = self.http.get(&url).header("Accept", "application/json");
        if let Some(user) = &self.config.user {
            request = request.basic_auth(user, self.config.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SyncError::AuthenticationRequired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::ODataApi(format!(
                "{} {}",
                status,
                odata_error_message(&body).unwrap_or(body)
            )));
        }

        let body: Value = response.json().await?;
        parse_feed(&body)
    }
}

/// `$filter` expression for one employee and date window.
pub fn build_filter(employee_id: &str, from: NaiveDate, to: NaiveDate) -> String {
    format!(
        "EmployeeID eq '{}' and EventDate ge datetime'{}T00:00:00' and EventDate le datetime'{}T00:00:00'",
        employee_id.replace('\'', "''"),
        from.format("%Y-%m-%d"),
        to.format("%Y-%m-%d"),
    )
}

/// Extract time events from an OData v2 (`d.results`) or v4 (`value`) envelope.
pub fn parse_feed(body: &Value) -> Result<Vec<RemoteTimeEvent>, SyncError> {
    let items = body["d"]["results"]
        .as_array()
        .or_else(|| body["value"].as_array())
        .ok_or_else(|| SyncError::ODataApi("response has no result collection".into()))?;

    items
        .iter()
        .map(|item| {
            let mut item = item.clone();
            if let Some(obj) = item.as_object_mut() {
                obj.remove("__metadata");
            }
            serde_json::from_value(item).map_err(SyncError::from)
        })
        .collect()
}

/// Message of an OData error payload, if the body is one.
fn odata_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = &value["error"]["message"];
    message["value"]
        .as_str()
        .or_else(|| message.as_str())
        .map(str::to_string)
}
