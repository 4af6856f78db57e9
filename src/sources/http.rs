//! HTTP adapters for the authoritative source and the fast-cache tier.
//!
//! Thin JSON clients. No retry loop here: the engine never retries
//! automatically, that policy belongs to the calling layer.

use super::{FastCache, RemoteDay, RemoteMonthly, RemoteSource};
use crate::models::{ActorKind, CacheMark, DayStatus, Direction, MonthRef, RoleClass};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ApiDay {
    day: u32,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    offset_seconds: i32,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ApiMonthly {
    #[serde(default)]
    entry_record_id: Option<String>,
    #[serde(default)]
    exit_record_id: Option<String>,
    #[serde(default)]
    entry_registrations: Vec<ApiDay>,
    #[serde(default)]
    exit_registrations: Vec<ApiDay>,
}

#[derive(Debug, Deserialize)]
struct ApiFastMark {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    offset_seconds: Option<i32>,
    #[serde(default)]
    status: Option<String>,
}

fn parse_status(s: &str) -> DayStatus {
    DayStatus::from_str(s).unwrap_or(DayStatus::NoRegistration)
}

impl ApiDay {
    fn into_remote(self) -> RemoteDay {
        RemoteDay {
            day: self.day,
            timestamp: self.timestamp,
            offset_seconds: self.offset_seconds,
            status: parse_status(&self.status),
        }
    }
}

/// JSON client for the authoritative attendance API.
#[derive(Clone)]
pub struct HttpRemoteSource {
    client: Client,
    base_url: String,
}

impl HttpRemoteSource {
    pub fn new(base_url: impl Into<String>, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    format!("Bearer {}", api_key)
                        .parse()
                        .context("Invalid attendance API key")?,
                );
                headers
            })
            .build()
            .context("Failed to build HttpRemoteSource")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
    async fn fetch_monthly(
        &self,
        role: RoleClass,
        user_id: &str,
        month: MonthRef,
    ) -> Result<Option<RemoteMonthly>> {
        let url = self.url(&format!(
            "/attendance/{}/{}/{}",
            role.as_str(),
            user_id,
            month
        ));

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!(user_id, %month, "no authoritative data for month");
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("GET {} {}: {}", url, status, text));
        }

        let api: ApiMonthly = resp
            .json()
            .await
            .context("Failed to parse monthly attendance response")?;

        Ok(Some(RemoteMonthly {
            entry_record_id: api.entry_record_id,
            exit_record_id: api.exit_record_id,
            entry_days: api
                .entry_registrations
                .into_iter()
                .map(ApiDay::into_remote)
                .collect(),
            exit_days: api
                .exit_registrations
                .into_iter()
                .map(ApiDay::into_remote)
                .collect(),
        }))
    }
}

/// JSON client for the same-day fast-cache tier.
#[derive(Clone)]
pub struct HttpFastCache {
    client: Client,
    base_url: String,
}

impl HttpFastCache {
    pub fn new(base_url: impl Into<String>, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    format!("Bearer {}", api_key)
                        .parse()
                        .context("Invalid fast-cache API key")?,
                );
                headers
            })
            .build()
            .context("Failed to build HttpFastCache")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl FastCache for HttpFastCache {
    async fn fetch(
        &self,
        actor: ActorKind,
        direction: Direction,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<CacheMark>> {
        let url = self.url(&format!(
            "/marks/{}/{}/{}/{}",
            date,
            actor.as_str(),
            direction.as_str(),
            user_id
        ));

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("GET {} {}: {}", url, status, text));
        }

        let api: ApiFastMark = resp
            .json()
            .await
            .context("Failed to parse fast-cache mark")?;

        // Staff marks carry a punch timestamp; student-style marks only a
        // status. An empty body means the tier knows nothing yet.
        let mark = match (api.timestamp, api.status) {
            (Some(timestamp), _) => Some(CacheMark::Stamped {
                timestamp,
                offset_seconds: api.offset_seconds.unwrap_or(0),
            }),
            (None, Some(status)) => Some(CacheMark::Status {
                status: parse_status(&status),
            }),
            (None, None) => None,
        };
        Ok(mark)
    }
}
