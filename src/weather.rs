//! Current-weather lookups with a session cache keyed by rounded coordinates
//! and language.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::cancel::CancelToken;
use crate::error::{ClientError, ClientResult};
use crate::formatters::{format_weather, WeatherDisplay, WEATHER_FAILED};
use crate::models::Coordinates;
use crate::service::AdvisoryBackend;

#[derive(Clone)]
pub struct WeatherFetcher {
    backend: Arc<dyn AdvisoryBackend>,
    cache: Arc<Mutex<HashMap<String, Value>>>,
}

impl WeatherFetcher {
    pub fn new(backend: Arc<dyn AdvisoryBackend>) -> Self {
        Self {
            backend,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cached(&self, coords: Coordinates, lang: &str) -> Option<Value> {
        let cache = self.cache.lock().ok()?;
        cache.get(&coords.cache_key(lang)).cloned()
    }

    /// Payload for `coords`/`lang`, from cache or from the backend. Any
    /// decoded payload is cached, error payloads included.
    pub async fn payload(&self, coords: Coordinates, lang: &str, signal: &CancelToken) -> ClientResult<Value> {
        let key = coords.cache_key(lang);
        if let Some(hit) = self.cached(coords, lang) {
            tracing::debug!("Weather cache hit for {}", key);
            return Ok(hit);
        }

        let payload = signal.run(self.backend.weather(coords, lang)).await??;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, payload.clone());
        }
        Ok(payload)
    }

    /// Same as [`payload`](Self::payload) but formatted for display. `None`
    /// when the fetch was cancelled because a newer one replaced it.
    pub async fn fetch(&self, coords: Coordinates, lang: &str, signal: &CancelToken) -> Option<WeatherDisplay> {
        match self.payload(coords, lang, signal).await {
            Ok(payload) => Some(format_weather(&payload)),
            Err(ClientError::Cancelled) => None,
            Err(e) => {
                tracing::warn!("Weather fetch failed: {}", e);
                Some(WeatherDisplay::message(WEATHER_FAILED))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdviceRequest, AdviceResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AdvisoryBackend for CountingBackend {
        async fn weather(&self, _coords: Coordinates, lang: &str) -> ClientResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if lang == "xx" {
                return Ok(json!({"error": "unsupported language"}));
            }
            Ok(json!({"current": {"temp": 21, "humidity": 60, "weather": [{"description": "clear"}]}}))
        }

        async fn ask(&self, _request: &AdviceRequest) -> ClientResult<AdviceResponse> {
            Err(ClientError::Unavailable("ask".into()))
        }

        async fn tts(&self, _text: &str, _lang: &str) -> ClientResult<Vec<u8>> {
            Err(ClientError::Unavailable("tts".into()))
        }
    }

    #[tokio::test]
    async fn same_rounded_key_hits_network_once() {
        let backend = Arc::new(CountingBackend::default());
        let fetcher = WeatherFetcher::new(backend.clone());
        let signal = CancelToken::never();

        let first = fetcher.fetch(Coordinates::new(18.78801, 98.98512), "en", &signal).await;
        let second = fetcher.fetch(Coordinates::new(18.78799, 98.98498), "en", &signal).await;
        assert_eq!(first, second);
        assert_eq!(first.unwrap().text, "Temp: 21 °C | Humidity: 60% | Conditions: clear");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        fetcher.fetch(Coordinates::new(18.788, 98.985), "hi", &signal).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn error_payloads_are_cached_too() {
        let backend = Arc::new(CountingBackend::default());
        let fetcher = WeatherFetcher::new(backend.clone());
        let signal = CancelToken::never();
        let coords = Coordinates::new(1.0, 2.0);

        let shown = fetcher.fetch(coords, "xx", &signal).await.unwrap();
        assert_eq!(shown.text, "unsupported language");
        fetcher.fetch(coords, "xx", &signal).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(fetcher.cached(coords, "xx").is_some());
    }

    #[tokio::test]
    async fn replaced_fetch_shows_nothing_and_caches_nothing() {
        let backend = Arc::new(CountingBackend::default());
        let fetcher = WeatherFetcher::new(backend);
        let (handle, signal) = crate::cancel::pair();
        handle.cancel();

        let coords = Coordinates::new(5.0, 6.0);
        assert_eq!(fetcher.fetch(coords, "en", &signal).await, None);
        assert!(fetcher.cached(coords, "en").is_none());
    }

    struct SlowBackend;

    #[async_trait]
    impl AdvisoryBackend for SlowBackend {
        async fn weather(&self, _coords: Coordinates, _lang: &str) -> ClientResult<Value> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(json!({}))
        }

        async fn ask(&self, _request: &AdviceRequest) -> ClientResult<AdviceResponse> {
            Err(ClientError::Unavailable("ask".into()))
        }

        async fn tts(&self, _text: &str, _lang: &str) -> ClientResult<Vec<u8>> {
            Err(ClientError::Unavailable("tts".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_fetch_shows_failure() {
        let fetcher = WeatherFetcher::new(Arc::new(SlowBackend));
        let signal = CancelToken::never().with_timeout(crate::constants::WEATHER_TIMEOUT);

        let shown = fetcher.fetch(Coordinates::new(5.0, 6.0), "en", &signal).await;
        assert_eq!(shown, Some(WeatherDisplay::message(WEATHER_FAILED)));
    }
}
