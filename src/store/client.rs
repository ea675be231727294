//! Typed CRUD client for the external record store.
//!
//! The Store exposes a PocketBase-style REST surface:
//! `/api/collections/<collection>/records[?page=..&perPage=..&filter=..&sort=..]`.
//! No authentication headers are required. Every call is bounded by the
//! shared client's 10 second timeout; failures surface as errors and the
//! calling loop decides how to continue.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use super::records::{
    AlertConfig, Certificate, Host, HostMetric, Paged, ResultRecord, ServerTemplate, Service,
    ServiceTemplate, SslTemplate, ThresholdTemplate,
};
use super::time::format_store;

const SERVICE_PAGE_SIZE: u32 = 30;
const HOST_PAGE_SIZE: u32 = 500;

#[derive(Clone)]
pub struct StoreClient {
    base_url: String,
    http: Client,
}

impl StoreClient {
    pub fn new(base_url: &str) -> Result<Self> {
        if base_url.trim().is_empty() {
            bail!("store base URL is empty");
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build store HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Liveness probe against the Store, used once at startup.
    pub async fn test_connection(&self) -> Result<()> {
        let url = format!("{}/api/health", self.base_url);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            bail!("store health endpoint returned {}", resp.status());
        }
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("GET {url} returned {status}");
        }
        resp.json::<T>().await.with_context(|| format!("decoding {url}"))
    }

    async fn patch_json(&self, url: &str, body: &serde_json::Value) -> Result<()> {
        let resp = self
            .http
            .patch(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("PATCH {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("PATCH {url} returned {status}");
        }
        Ok(())
    }

    fn record_url(&self, collection: &str, id: &str) -> String {
        format!("{}/api/collections/{collection}/records/{id}", self.base_url)
    }

    fn list_url(&self, collection: &str) -> String {
        format!("{}/api/collections/{collection}/records", self.base_url)
    }

    // === services ===

    /// All services that are not paused, walking every page.
    pub async fn list_active_services(&self) -> Result<Vec<Service>> {
        let filter = urlencoding::encode("(status!='paused')").into_owned();
        let mut services = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}?page={page}&perPage={SERVICE_PAGE_SIZE}&filter={filter}",
                self.list_url("services")
            );
            let batch: Paged<Service> = self.get_json(&url).await?;
            let fetched = batch.items.len();
            services.extend(batch.items);
            if page >= batch.total_pages || fetched == 0 {
                break;
            }
            page += 1;
        }
        debug!(count = services.len(), "fetched active services");
        Ok(services)
    }

    pub async fn get_service(&self, id: &str) -> Result<Service> {
        self.get_json(&self.record_url("services", id)).await
    }

    /// Patch a service's observed status. The record is re-read first so a
    /// service paused mid-tick is never clobbered.
    pub async fn update_service_status(
        &self,
        id: &str,
        status: &str,
        response_time: i64,
        error_message: &str,
    ) -> Result<()> {
        let current = self
            .get_service(id)
            .await
            .context("re-reading service before status update")?;
        if current.status == "paused" {
            bail!("service {id} is paused, skipping status update");
        }

        let mut body = json!({
            "status": status,
            "response_time": response_time,
            "last_checked": Utc::now().to_rfc3339(),
        });
        if !error_message.is_empty() {
            body["error_message"] = json!(error_message);
        }
        self.patch_json(&self.record_url("services", id), &body).await
    }

    /// Latest probe result for a service from the protocol-specific
    /// collection (`ping_data`, `dns_data`, `tcp_data`, `uptime_data`).
    pub async fn latest_service_record(
        &self,
        service_id: &str,
        collection: &str,
    ) -> Result<Option<ResultRecord>> {
        let filter = urlencoding::encode(&format!("service_id='{service_id}'")).into_owned();
        let url = format!(
            "{}?filter={filter}&sort=-timestamp&perPage=1",
            self.list_url(collection)
        );
        let batch: Paged<ResultRecord> = self.get_json(&url).await?;
        Ok(batch.items.into_iter().next())
    }

    // === certificates ===

    pub async fn list_certificates(&self) -> Result<Vec<Certificate>> {
        let batch: Paged<Certificate> = self.get_json(&self.list_url("ssl_certificates")).await?;
        Ok(batch.items)
    }

    pub async fn get_certificate(&self, id: &str) -> Result<Certificate> {
        self.get_json(&self.record_url("ssl_certificates", id)).await
    }

    pub async fn update_certificate(&self, id: &str, body: &serde_json::Value) -> Result<()> {
        self.patch_json(&self.record_url("ssl_certificates", id), body)
            .await
    }

    // === hosts ===

    /// Every monitored host. Fleet sizes are moderate, so a single large
    /// page is enough.
    pub async fn list_hosts(&self) -> Result<Vec<Host>> {
        let url = format!("{}?perPage={HOST_PAGE_SIZE}", self.list_url("servers"));
        let batch: Paged<Host> = self.get_json(&url).await?;
        Ok(batch.items)
    }

    pub async fn update_host_status(&self, id: &str, status: &str) -> Result<()> {
        let body = json!({
            "status": status,
            "last_checked": format_store(Utc::now()),
        });
        self.patch_json(&self.record_url("servers", id), &body).await
    }

    /// Latest telemetry sample for a host, restricted to samples newer than
    /// `window` ago. Returns `None` when the agent has gone quiet.
    pub async fn latest_host_metric(
        &self,
        server_id: &str,
        window: Duration,
    ) -> Result<Option<HostMetric>> {
        let cutoff = format_store(Utc::now() - chrono::Duration::from_std(window)?);
        let filter =
            urlencoding::encode(&format!("server_id='{server_id}'&&created>'{cutoff}'"))
                .into_owned();
        let url = format!(
            "{}?filter={filter}&sort=-created&perPage=1",
            self.list_url("server_metrics")
        );
        let batch: Paged<HostMetric> = self.get_json(&url).await?;
        Ok(batch.items.into_iter().next())
    }

    pub async fn get_threshold_template(&self, id: &str) -> Result<ThresholdTemplate> {
        self.get_json(&self.record_url("server_threshold_templates", id))
            .await
    }

    // === notification bindings and templates ===

    pub async fn get_alert_config(&self, id: &str) -> Result<AlertConfig> {
        self.get_json(&self.record_url("alert_configurations", id))
            .await
    }

    pub async fn get_service_template(&self, id: &str) -> Option<ServiceTemplate> {
        match self
            .get_json(&self.record_url("service_notification_templates", id))
            .await
        {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(template = id, error = %e, "service template unavailable, using defaults");
                None
            }
        }
    }

    pub async fn get_server_template(&self, id: &str) -> Option<ServerTemplate> {
        match self
            .get_json(&self.record_url("server_notification_templates", id))
            .await
        {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(template = id, error = %e, "server template unavailable, using defaults");
                None
            }
        }
    }

    pub async fn get_ssl_template(&self, id: &str) -> Option<SslTemplate> {
        match self
            .get_json(&self.record_url("ssl_notification_templates", id))
            .await
        {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(template = id, error = %e, "ssl template unavailable, using defaults");
                None
            }
        }
    }
}
