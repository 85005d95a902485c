use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDateTime, Utc};
use parkcore::prelude::{FetchError, Frame, FrameSource};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::Duration;

/// JSON shape served by the camera host's `/latest_frame` route.
#[derive(Debug, Deserialize)]
struct LatestFramePayload {
    #[serde(default)]
    success: bool,
    image_data: Option<String>,
    timestamp: Option<String>,
    error: Option<String>,
}

/// Pulls the newest frame from a camera host over HTTP.
///
/// Uses the blocking client; the pipeline calls it from the blocking pool.
pub struct HttpFrameSource {
    client: Client,
    endpoint: String,
}

impl HttpFrameSource {
    /// Must be built outside an async context; the blocking client owns its own runtime.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client for frame source")?;
        Ok(Self {
            client,
            endpoint: format!("{}/latest_frame", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl FrameSource for HttpFrameSource {
    fn fetch_latest_frame(&self) -> Result<Frame, FetchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .map_err(|err| FetchError::Unreachable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadResponse(format!("status {}", status)));
        }

        let is_image = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map_or(false, |value| value.starts_with("image/"));
        let body = response
            .bytes()
            .map_err(|err| FetchError::Unreachable(err.to_string()))?;

        if is_image {
            Ok(Frame::new(body.to_vec(), Utc::now()))
        } else {
            decode_json_frame(&body)
        }
    }
}

pub(crate) fn decode_json_frame(body: &[u8]) -> Result<Frame, FetchError> {
    let payload: LatestFramePayload =
        serde_json::from_slice(body).map_err(|err| FetchError::Decode(err.to_string()))?;
    if !payload.success {
        return Err(FetchError::BadResponse(
            payload.error.unwrap_or_else(|| "camera host reported failure".into()),
        ));
    }
    let encoded = payload
        .image_data
        .ok_or_else(|| FetchError::Decode("response carries no image_data".into()))?;
    let image = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|err| FetchError::Decode(err.to_string()))?;
    if image.is_empty() {
        return Err(FetchError::Decode("image_data is empty".into()));
    }

    let captured_at = payload
        .timestamp
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);
    Ok(Frame::new(image, captured_at))
}

/// Accepts RFC 3339 and naive ISO-8601 (assumed UTC) timestamps.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
