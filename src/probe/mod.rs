//! Probe orchestration: distributed latency measurement.
//!
//! One run lists candidate measurement locations from the network-testing
//! API, partitions them into coarse geographic buckets, selects a bounded
//! balanced random sample, issues one independent timed request per selected
//! location, and aggregates the results into a single JSON report.

mod buckets;
mod stats;

pub use buckets::{Bucket, select_balanced};
pub use stats::{LatencyDistribution, LatencySummary, summarize};

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ProbeConfig;
use crate::error::RelayError;

/// One candidate measurement location advertised by the network-testing API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeLocation {
    pub id: String,
    /// Free-text location description, e.g. `"Frankfurt, Germany (AS3320)"`.
    pub location: String,
}

impl ProbeLocation {
    pub fn bucket(&self) -> Bucket {
        Bucket::classify(&self.location)
    }
}

/// Target of one probe run.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeTarget {
    pub host: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Optional per-run cap; never exceeds the configured maximum.
    #[serde(default)]
    pub limit: Option<usize>,
}

fn default_path() -> String {
    "/".to_string()
}

/// Outcome of one timed request from one location.
#[derive(Debug, Clone, Serialize)]
pub struct LocationMeasurement {
    pub location_id: String,
    pub location: String,
    pub bucket: Bucket,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Rendered result of one probe run.
#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub target: String,
    /// Locations the API advertised.
    pub candidates: usize,
    /// Locations actually measured.
    pub measured: usize,
    pub overall: LatencySummary,
    pub buckets: BTreeMap<String, LatencySummary>,
    pub measurements: Vec<LocationMeasurement>,
}

pub struct ProbeClient {
    http: reqwest::Client,
    config: ProbeConfig,
}

#[derive(Debug, Serialize)]
struct MeasurementRequest<'a> {
    location: &'a str,
    host: &'a str,
    path: &'a str,
}

impl ProbeClient {
    pub fn new(config: ProbeConfig) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RelayError::InternalError(format!("building HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    fn authorize(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_token {
            Some(token) => rb.bearer_auth(token.expose_secret()),
            None => rb,
        }
    }

    /// List the candidate measurement locations.
    pub async fn list_locations(&self) -> Result<Vec<ProbeLocation>, RelayError> {
        let url = format!("{}/locations", self.config.base_url);
        let response = self.authorize(self.http.get(&url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::UpstreamStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    /// One independent timed request through one location. Never fails the
    /// run: errors become failed measurements.
    async fn measure(&self, location: &ProbeLocation, target: &ProbeTarget) -> LocationMeasurement {
        let url = format!("{}/measurements", self.config.base_url);
        let request = MeasurementRequest {
            location: &location.id,
            host: &target.host,
            path: &target.path,
        };

        let started = Instant::now();
        let outcome = async {
            let response = self
                .authorize(self.http.post(&url))
                .json(&request)
                .send()
                .await?;
            let response = response.error_for_status()?;
            // Drain the body so the timing covers the full response.
            let _ = response.bytes().await?;
            Ok::<_, reqwest::Error>(())
        }
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => LocationMeasurement {
                location_id: location.id.clone(),
                location: location.location.clone(),
                bucket: location.bucket(),
                success: true,
                latency_ms: Some(elapsed_ms),
                error: None,
            },
            Err(e) => {
                tracing::debug!(location = %location.id, error = %e, "measurement failed");
                LocationMeasurement {
                    location_id: location.id.clone(),
                    location: location.location.clone(),
                    bucket: location.bucket(),
                    success: false,
                    latency_ms: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Run the full probe: list, bucket, sample, fan out, aggregate, render.
    pub async fn run(&self, target: &ProbeTarget) -> Result<ProbeReport, RelayError> {
        let candidates = self.list_locations().await?;
        let candidate_count = candidates.len();

        let limit = target
            .limit
            .unwrap_or(self.config.max_locations)
            .min(self.config.max_locations);
        let sample = {
            let mut rng = rand::thread_rng();
            select_balanced(candidates, limit, ProbeLocation::bucket, &mut rng)
        };
        tracing::info!(
            candidates = candidate_count,
            sampled = sample.len(),
            host = %target.host,
            "starting probe fan-out"
        );

        let measurements =
            futures::future::join_all(sample.iter().map(|loc| self.measure(loc, target))).await;

        let (overall, buckets) = aggregate(&measurements);
        Ok(ProbeReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            target: format!("{}{}", target.host, target.path),
            candidates: candidate_count,
            measured: measurements.len(),
            overall,
            buckets,
            measurements,
        })
    }
}

/// Aggregate measurements overall and per bucket.
pub fn aggregate(
    measurements: &[LocationMeasurement],
) -> (LatencySummary, BTreeMap<String, LatencySummary>) {
    let overall = summarize(
        measurements.iter().filter_map(|m| m.latency_ms).collect(),
        measurements.iter().filter(|m| !m.success).count(),
    );

    let mut buckets = BTreeMap::new();
    for bucket in Bucket::ALL {
        let in_bucket: Vec<&LocationMeasurement> = measurements
            .iter()
            .filter(|m| m.bucket == bucket)
            .collect();
        if in_bucket.is_empty() {
            continue;
        }
        buckets.insert(
            bucket.name().to_string(),
            summarize(
                in_bucket.iter().filter_map(|m| m.latency_ms).collect(),
                in_bucket.iter().filter(|m| !m.success).count(),
            ),
        );
    }
    (overall, buckets)
}
