use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::engine::{ModelRegistry, PredictionEngine};
use super::types::{PredictionRequest, SingleModelPrediction};

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployedModel {
    model_id: String,
}

/// Model-serving HTTP backend acting as both prediction engine and registry.
pub struct HttpModelService {
    client: Client,
    base_url: String,
}

impl HttpModelService {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Join `segments` onto the base URL, percent-encoding each one.
    fn endpoint_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid model service URL {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Model service URL {} cannot take a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn build_request(
        &self,
        method: &str,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Request> {
        let url = self.endpoint_url(segments)?;

        let mut request = match method {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            _ => return Err(anyhow::anyhow!("Unsupported HTTP method {}", method)),
        };

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        request.build().context("Failed to build model service request")
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let request = self.build_request(method, segments, query, body)?;
        let response = self.client.execute(request).await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::debug!("Model service error: {} - {}", status, error_text);
            return Err(anyhow::anyhow!(
                "Model service request failed: {} - {}",
                status,
                error_text
            ));
        }

        let envelope: ServiceResponse<T> = response
            .json()
            .await
            .context("Failed to parse model service response")?;

        if !envelope.success {
            return Err(anyhow::anyhow!(
                "Model service error: {}",
                envelope.error.unwrap_or_else(|| "unknown".to_string())
            ));
        }

        envelope
            .data
            .ok_or_else(|| anyhow::anyhow!("Model service returned no data"))
    }

    pub async fn ping(&self) -> Result<bool> {
        let url = self.endpoint_url(&["health"])?;
        let response = self.client.get(url).send().await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl PredictionEngine for HttpModelService {
    async fn predict(&self, request: &PredictionRequest) -> Result<SingleModelPrediction> {
        let body = serde_json::json!({
            "symbol": request.symbol,
            "horizon": request.horizon,
        });
        self.request("POST", &["v1", "models", request.model_id.as_str(), "predict"], &[], Some(body))
            .await
    }
}

#[async_trait]
impl ModelRegistry for HttpModelService {
    async fn get_deployed_models(&self, horizon: &str) -> Result<Vec<String>> {
        let models: Vec<DeployedModel> = self
            .request("GET", &["v1", "models"], &[("horizon", horizon)], None)
            .await?;
        Ok(models.into_iter().map(|m| m.model_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let service = HttpModelService::new("http://models:8500/", Duration::from_secs(1)).unwrap();
        assert_eq!(service.base_url, "http://models:8500");
    }

    #[test]
    fn test_model_id_is_encoded_as_one_segment() {
        let service = HttpModelService::new("http://models:8500/serving/", Duration::from_secs(1)).unwrap();
        let request = service
            .build_request("POST", &["v1", "models", "lstm/v2 beta", "predict"], &[], None)
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "http://models:8500/serving/v1/models/lstm%2Fv2%20beta/predict"
        );
    }

    #[test]
    fn test_horizon_is_query_encoded() {
        let service = HttpModelService::new("http://models:8500", Duration::from_secs(1)).unwrap();
        let request = service
            .build_request("GET", &["v1", "models"], &[("horizon", "1w&admin=1")], None)
            .unwrap();
        assert_eq!(request.url().path(), "/v1/models");
        let pairs: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs, vec![("horizon".to_string(), "1w&admin=1".to_string())]);
    }

    #[test]
    fn test_envelope_parsing() {
        let raw = r#"{"success":true,"data":[{"modelId":"lstm"},{"modelId":"xgb"}],"error":null}"#;
        let envelope: ServiceResponse<Vec<DeployedModel>> = serde_json::from_str(raw).unwrap();
        let ids: Vec<String> = envelope.data.unwrap().into_iter().map(|m| m.model_id).collect();
        assert_eq!(ids, vec!["lstm", "xgb"]);
    }
}
