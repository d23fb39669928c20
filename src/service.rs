use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::constants::USER_AGENT;
use crate::error::{ClientError, ClientResult};
use crate::models::{AdviceRequest, AdviceResponse, Coordinates, TtsRequest};

/// The advisory backend's three endpoints.
#[async_trait]
pub trait AdvisoryBackend: Send + Sync {
    /// `GET /weather`; any JSON body is returned, error payloads included.
    async fn weather(&self, coords: Coordinates, lang: &str) -> ClientResult<Value>;

    /// `POST /ask`; the body is decoded whatever the HTTP status.
    async fn ask(&self, request: &AdviceRequest) -> ClientResult<AdviceResponse>;

    /// `POST /tts`; returns the audio bytes, non-2xx is an error.
    async fn tts(&self, text: &str, lang: &str) -> ClientResult<Vec<u8>>;
}

/// Builds the shared HTTP client.
pub fn http_client() -> ClientResult<Client> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// Makes an HTTP GET request and deserializes the JSON response
pub async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> ClientResult<T> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(ClientError::Status(response.status().as_u16()));
    }

    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// HTTP implementation of [`AdvisoryBackend`]
#[derive(Clone)]
pub struct HttpBackend {
    client: Arc<Client>,
    base_url: String,
}

impl HttpBackend {
    pub fn new(client: Arc<Client>, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode_any_status<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();
        if !status.is_success() {
            tracing::debug!("Backend answered {}, decoding body anyway", status);
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl AdvisoryBackend for HttpBackend {
    async fn weather(&self, coords: Coordinates, lang: &str) -> ClientResult<Value> {
        tracing::info!("Fetching weather for {}, {} ({})", coords.lat, coords.lon, lang);

        let lat = coords.lat.to_string();
        let lon = coords.lon.to_string();
        let response = self
            .client
            .get(self.endpoint("/weather"))
            .query(&[("lat", lat.as_str()), ("lon", lon.as_str()), ("lang", lang)])
            .send()
            .await?;

        Self::decode_any_status(response).await
    }

    async fn ask(&self, request: &AdviceRequest) -> ClientResult<AdviceResponse> {
        tracing::info!("Asking advisory backend about {}", request.crop);

        let response = self
            .client
            .post(self.endpoint("/ask"))
            .json(request)
            .send()
            .await?;

        Self::decode_any_status(response).await
    }

    async fn tts(&self, text: &str, lang: &str) -> ClientResult<Vec<u8>> {
        tracing::info!("Requesting server speech for {} chars ({})", text.chars().count(), lang);

        let response = self
            .client
            .post(self.endpoint("/tts"))
            .json(&TtsRequest { text, lang })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Status(response.status().as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
