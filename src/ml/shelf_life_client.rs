use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{PredictorError, ShelfLifePredictor, ShelfLifeRequest};

const FEATURE_COLUMNS: [&str; 3] = [
    "kuantitas_masuk",
    "suhu_penyimpanan_celsius_simulasi",
    "kategori_bahan",
];

/// Scoring payload in the `input_data { columns, index, data }` layout.
#[derive(Debug, Serialize)]
struct ScoringPayload<'a> {
    input_data: InputData<'a>,
}

#[derive(Debug, Serialize)]
struct InputData<'a> {
    columns: [&'a str; 3],
    index: [u32; 1],
    data: [[Value; 3]; 1],
}

/// The service answers with either a bare array or an object wrapping one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoringResponse {
    Bare(Vec<f64>),
    Result { result: Vec<f64> },
    Predictions { predictions: Vec<f64> },
}

impl ScoringResponse {
    fn into_days(self) -> Vec<f64> {
        match self {
            ScoringResponse::Bare(days)
            | ScoringResponse::Result { result: days }
            | ScoringResponse::Predictions { predictions: days } => days,
        }
    }
}

/// Talks to the shelf-life model over HTTP.
#[derive(Debug, Clone)]
pub struct HttpShelfLifePredictor {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpShelfLifePredictor {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PredictorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(endpoint, api_key, client))
    }

    /// Build a predictor from an existing client (useful for testing).
    pub fn with_client(endpoint: &str, api_key: Option<String>, client: Client) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        }
    }

    fn payload(request: &ShelfLifeRequest) -> ScoringPayload<'static> {
        ScoringPayload {
            input_data: InputData {
                columns: FEATURE_COLUMNS,
                index: [0],
                data: [[
                    json!(request.quantity),
                    json!(request.storage_temperature),
                    json!(request.category.label()),
                ]],
            },
        }
    }
}

#[async_trait]
impl ShelfLifePredictor for HttpShelfLifePredictor {
    async fn predict(&self, request: &ShelfLifeRequest) -> Result<Vec<f64>, PredictorError> {
        let mut builder = self.client.post(&self.endpoint).json(&Self::payload(request));
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PredictorError::Unauthorized);
        }
        if !status.is_success() {
            return Err(PredictorError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        debug!(endpoint = %self.endpoint, body_len = body.len(), "prediction response received");
        let parsed: ScoringResponse = serde_json::from_str(&body)
            .map_err(|e| PredictorError::MalformedResponse(e.to_string()))?;
        Ok(parsed.into_days())
    }

    fn endpoint(&self) -> Option<String> {
        Some(self.endpoint.clone())
    }
}
