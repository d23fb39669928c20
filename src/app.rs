//! The controller: one task owns [`AppState`] and applies [`AppEvent`]s in
//! arrival order. Slow work (location, weather, advice, audio, dictation,
//! debounce timers) runs in spawned tasks that send their outcome back as
//! another event.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cancel::{self, CancelHandle};
use crate::clipboard::Clipboard;
use crate::constants::{FORM_KEY, LAST_RESULT_KEY, MANUAL_DEBOUNCE, VALIDATION_MESSAGE, WEATHER_TIMEOUT};
use crate::error::{ClientError, ClientResult};
use crate::formatters::{format_speed, format_weather, WeatherDisplay};
use crate::i18n::Catalog;
use crate::location::{parse_manual, Debouncer, LocationResolver, LocationResult, DETECTING};
use crate::models::{AdviceResponse, Coordinates, FormState};
use crate::orchestrator::{dispatch, FormOrchestrator, SubmitRejection};
use crate::render::{Region, Regions, Renderer};
use crate::service::AdvisoryBackend;
use crate::speech::{
    play_fallback, transcript, AudioSink, ReadOutcome, Speech, SpeechEngine, SpeechRecognizer, ToggleStep,
    TranscriptResult,
};
use crate::storage::{load_json, save_json, KeyValueStore};
use crate::weather::WeatherFetcher;

pub const BUSY_NOTICE: &str = "Please wait…";
pub const AUDIO_FAILED: &str = "Audio playback failed";
pub const MIC_UNAVAILABLE: &str = "Speech input is not available on this device.";
pub const COPIED: &str = "Copied";
pub const COPY_FAILED: &str = "Copy failed";
pub const SAMPLE_CROP: &str = "wheat";
pub const SAMPLE_QUESTION: &str = "Fertilizer recommendation for current week";

#[derive(Debug)]
pub enum AppEvent {
    SetCrop(String),
    SetQuestion(String),
    SetLocation(String),
    SetLanguage(String),
    DetectLocation,
    Submit,
    ReadAloud,
    ToggleVolume,
    CycleSpeed,
    Listen,
    Chip(String),
    Copy(Region),
    Clear,
    Sample,
    Help,
    Quit,

    LocationResolved(LocationResult),
    ManualSettled(u64),
    WeatherReady(WeatherDisplay),
    AdviceFinished { id: u64, outcome: ClientResult<AdviceResponse> },
    FallbackFinished(ClientResult<()>),
    TranscriptReady(ClientResult<TranscriptResult>),
    CopyFinished(ClientResult<()>),
}

/// Everything the user sees changes through this trait.
pub trait View: Send {
    fn form(&mut self, form: &FormState);
    fn geo_status(&mut self, text: &str);
    fn weather(&mut self, weather: &WeatherDisplay);
    /// `None` clears the inline validation message.
    fn validation(&mut self, message: Option<&str>);
    fn loading(&mut self, on: bool);
    fn regions(&mut self, regions: &Regions);
    fn toast(&mut self, message: &str);
    fn speed(&mut self, label: &str);
    /// Re-renders translated labels, placeholders and chip prompts.
    fn translate(&mut self, catalog: &Catalog, lang: &str);
    /// Lists the commands under their current labels.
    fn help(&mut self);
}

/// External collaborators handed to the controller.
pub struct Services {
    pub backend: Arc<dyn AdvisoryBackend>,
    pub resolver: Arc<LocationResolver>,
    pub store: Arc<dyn KeyValueStore>,
    pub engine: Arc<dyn SpeechEngine>,
    pub sink: Arc<dyn AudioSink>,
    pub recognizer: Option<Arc<dyn SpeechRecognizer>>,
    pub clipboard: Arc<dyn Clipboard>,
    pub catalog: Arc<Catalog>,
}

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Forget the saved form and last result before starting.
    pub fresh: bool,
    /// Language when nothing was restored.
    pub default_language: String,
    /// Language that wins over a restored one.
    pub language_override: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub form: FormState,
    /// Last coordinates from the resolver or a settled manual entry.
    pub coords: Option<Coordinates>,
    pub regions: Regions,
}

pub struct Controller<V: View> {
    state: AppState,
    view: V,
    tx: mpsc::UnboundedSender<AppEvent>,
    backend: Arc<dyn AdvisoryBackend>,
    resolver: Arc<LocationResolver>,
    store: Arc<dyn KeyValueStore>,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    clipboard: Arc<dyn Clipboard>,
    catalog: Arc<Catalog>,
    weather: WeatherFetcher,
    weather_signal: Option<CancelHandle>,
    orchestrator: FormOrchestrator,
    renderer: Renderer,
    speech: Speech,
    debouncer: Debouncer,
}

impl<V: View> Controller<V> {
    /// Builds a controller whose spawned work reports back through `tx`.
    pub fn new(services: Services, view: V, tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        let Services {
            backend,
            resolver,
            store,
            engine,
            sink,
            recognizer,
            clipboard,
            catalog,
        } = services;

        Self {
            state: AppState::default(),
            view,
            tx,
            weather: WeatherFetcher::new(Arc::clone(&backend)),
            renderer: Renderer::new(Arc::clone(&store)),
            speech: Speech::new(engine, sink, Arc::clone(&store)),
            backend,
            resolver,
            store,
            recognizer,
            clipboard,
            catalog,
            weather_signal: None,
            orchestrator: FormOrchestrator::default(),
            debouncer: Debouncer::default(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn is_busy(&self) -> bool {
        self.orchestrator.is_busy()
    }

    /// Restores (or forgets) the saved form, renders it, and starts detecting
    /// the location.
    pub fn start(&mut self, options: StartOptions) {
        let restored = if options.fresh {
            self.store.remove(FORM_KEY);
            self.store.remove(LAST_RESULT_KEY);
            None
        } else {
            load_json::<FormState>(self.store.as_ref(), FORM_KEY)
        };

        self.state.form = restored.unwrap_or_else(|| FormState {
            language: options.default_language.clone(),
            ..FormState::default()
        });
        if let Some(lang) = options.language_override {
            self.state.form.language = lang;
        }
        if self.state.form.language.is_empty() {
            self.state.form.language = options.default_language;
        }

        self.view.form(&self.state.form);
        self.view.translate(&self.catalog, &self.state.form.language);
        self.view.speed(&format_speed(self.speech.rate().value()));

        if let Some(coords) = parse_manual(&self.state.form.location) {
            self.state.coords = Some(coords);
            self.refresh_weather(coords);
        }
        self.detect_location();
    }

    /// Handles events until `Quit` or until every sender is gone, then stops
    /// all speech output.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<AppEvent>) -> V {
        while let Some(event) = rx.recv().await {
            if !self.handle(event) {
                break;
            }
        }
        self.speech.teardown();
        tracing::info!("Controller stopped");
        self.view
    }

    /// Applies one event. Returns `false` once the app should stop.
    pub fn handle(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::SetCrop(crop) => {
                self.state.form.crop = crop;
                self.save_form();
            }
            AppEvent::SetQuestion(question) => {
                self.state.form.question = question;
                self.save_form();
            }
            AppEvent::SetLocation(text) => self.set_location(text),
            AppEvent::SetLanguage(lang) => self.set_language(lang),
            AppEvent::DetectLocation => self.detect_location(),
            AppEvent::Submit => self.submit(),
            AppEvent::ReadAloud => self.read_aloud(),
            AppEvent::ToggleVolume => self.toggle_volume(),
            AppEvent::CycleSpeed => {
                let rate = self.speech.cycle_rate();
                self.view.speed(&format_speed(rate.value()));
            }
            AppEvent::Listen => self.listen(),
            AppEvent::Chip(name) => self.apply_chip(&name),
            AppEvent::Copy(region) => self.copy(region),
            AppEvent::Clear => {
                self.state.form.crop.clear();
                self.state.form.question.clear();
                self.state.regions.clear();
                self.save_form();
                self.view.form(&self.state.form);
                self.view.regions(&self.state.regions);
            }
            AppEvent::Sample => {
                self.state.form.crop = SAMPLE_CROP.to_string();
                self.state.form.question = SAMPLE_QUESTION.to_string();
                self.save_form();
                self.view.form(&self.state.form);
            }
            AppEvent::Help => self.view.help(),
            AppEvent::Quit => return false,

            AppEvent::LocationResolved(result) => self.on_location(result),
            AppEvent::ManualSettled(ticket) => self.on_manual_settled(ticket),
            AppEvent::WeatherReady(display) => self.view.weather(&display),
            AppEvent::AdviceFinished { id, outcome } => self.on_advice(id, outcome),
            AppEvent::FallbackFinished(result) => {
                if let Err(e) = result {
                    tracing::warn!("Fallback audio failed: {}", e);
                    self.view.toast(AUDIO_FAILED);
                }
            }
            AppEvent::TranscriptReady(result) => self.on_transcript(result),
            AppEvent::CopyFinished(Ok(())) => self.view.toast(COPIED),
            AppEvent::CopyFinished(Err(e)) => {
                tracing::warn!("Copy failed: {}", e);
                self.view.toast(COPY_FAILED);
            }
        }
        true
    }

    fn save_form(&self) {
        save_json(self.store.as_ref(), FORM_KEY, &self.state.form);
    }

    fn detect_location(&mut self) {
        self.view.geo_status(DETECTING);
        let resolver = Arc::clone(&self.resolver);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = resolver.resolve().await;
            let _ = tx.send(AppEvent::LocationResolved(result));
        });
    }

    fn on_location(&mut self, result: LocationResult) {
        self.view.geo_status(result.status.message());
        if let Some(coords) = result.coords {
            self.state.coords = Some(coords);
            self.state.form.location = coords.display();
            self.view.form(&self.state.form);
            self.refresh_weather(coords);
        }
    }

    fn set_location(&mut self, text: String) {
        self.state.form.location = text;
        self.save_form();

        let ticket = self.debouncer.schedule();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(MANUAL_DEBOUNCE).await;
            let _ = tx.send(AppEvent::ManualSettled(ticket));
        });
    }

    fn on_manual_settled(&mut self, ticket: u64) {
        if !self.debouncer.is_latest(ticket) {
            return;
        }
        if let Some(coords) = parse_manual(&self.state.form.location) {
            self.state.coords = Some(coords);
            self.refresh_weather(coords);
        }
    }

    fn set_language(&mut self, lang: String) {
        self.state.form.language = lang;
        self.save_form();
        if let Some(coords) = self.state.coords {
            self.refresh_weather(coords);
        }
        self.view.translate(&self.catalog, &self.state.form.language);
    }

    /// Cancels the previous weather fetch and starts a new one. Cache hits
    /// render immediately.
    fn refresh_weather(&mut self, coords: Coordinates) {
        if let Some(previous) = self.weather_signal.take() {
            previous.cancel();
        }

        let lang = self.state.form.language.clone();
        if let Some(payload) = self.weather.cached(coords, &lang) {
            self.view.weather(&format_weather(&payload));
            return;
        }

        let (handle, signal) = cancel::pair();
        self.weather_signal = Some(handle);
        let signal = signal.with_timeout(WEATHER_TIMEOUT);
        let fetcher = self.weather.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if let Some(display) = fetcher.fetch(coords, &lang, &signal).await {
                let _ = tx.send(AppEvent::WeatherReady(display));
            }
        });
    }

    fn submit(&mut self) {
        let submission = match self.orchestrator.begin(&self.state.form, self.state.coords) {
            Ok(submission) => submission,
            Err(SubmitRejection::Busy) => {
                self.view.toast(BUSY_NOTICE);
                return;
            }
            Err(SubmitRejection::Invalid) => {
                self.view.validation(Some(VALIDATION_MESSAGE));
                return;
            }
        };

        self.view.validation(None);
        self.view.loading(true);
        self.state.regions.clear();
        self.view.regions(&self.state.regions);
        self.save_form();

        tracing::info!(
            "Submitting question {} for {} at {:.4},{:.4}",
            submission.id,
            submission.request.crop,
            submission.request.latitude,
            submission.request.longitude
        );

        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let id = submission.id;
        tokio::spawn(async move {
            // The inner task isolates a panic so busy is always released.
            let outcome = match tokio::spawn(async move { dispatch(backend, &submission).await }).await {
                Ok(outcome) => outcome,
                Err(e) => Err(ClientError::from(e)),
            };
            let _ = tx.send(AppEvent::AdviceFinished { id, outcome });
        });
    }

    fn on_advice(&mut self, id: u64, outcome: ClientResult<AdviceResponse>) {
        if !self.orchestrator.finish(id) {
            tracing::debug!("Discarding stale result {}", id);
            return;
        }
        if let Err(e) = &outcome {
            tracing::warn!("Submission {} failed: {}", id, e);
        }

        let rendered = self.renderer.render(&outcome);
        self.view.loading(false);
        self.state.regions = rendered.regions;
        self.view.regions(&self.state.regions);
        self.view.toast(&rendered.toast);
    }

    fn nothing_to_read(&mut self) {
        let text = self
            .catalog
            .t(&self.state.form.language, "nothing_to_read", Some("Nothing to read"));
        self.view.toast(&text);
    }

    fn read_aloud(&mut self) {
        match self.speech.read_aloud(&self.state.regions, &self.state.form.language) {
            ReadOutcome::NothingToRead => self.nothing_to_read(),
            ReadOutcome::Speaking { notice: Some(notice) } => self.view.toast(notice),
            ReadOutcome::Speaking { notice: None } => {}
            ReadOutcome::Failed { notice, .. } => {
                if let Some(notice) = notice {
                    self.view.toast(notice);
                }
                self.view.toast(AUDIO_FAILED);
            }
        }
    }

    fn toggle_volume(&mut self) {
        match self.speech.toggle(&self.state.regions, &self.state.form.language) {
            ToggleStep::StoppedNative | ToggleStep::StoppedAudio | ToggleStep::SpeakingNative => {}
            ToggleStep::NothingToRead => self.nothing_to_read(),
            ToggleStep::NeedsFallback { text, lang, rate } => {
                let backend = Arc::clone(&self.backend);
                let sink = self.speech.sink();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = play_fallback(backend, sink, &text, &lang, rate).await;
                    let _ = tx.send(AppEvent::FallbackFinished(result));
                });
            }
            ToggleStep::Failed(e) => {
                tracing::warn!("Native speech failed: {}", e);
                self.view.toast(AUDIO_FAILED);
            }
        }
    }

    fn listen(&mut self) {
        let Some(recognizer) = self.recognizer.clone() else {
            self.view.toast(MIC_UNAVAILABLE);
            return;
        };
        let lang = self.state.form.language.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = recognizer.recognize(&lang).await.map(|results| transcript(&results));
            let _ = tx.send(AppEvent::TranscriptReady(result));
        });
    }

    fn on_transcript(&mut self, result: ClientResult<TranscriptResult>) {
        match result {
            Ok(TranscriptResult { transcript }) if !transcript.is_empty() => {
                self.state.form.question = transcript;
                self.save_form();
                self.view.form(&self.state.form);
            }
            Ok(_) => tracing::debug!("Empty transcript"),
            Err(e) => tracing::warn!("Speech recognition failed: {}", e),
        }
    }

    fn apply_chip(&mut self, name: &str) {
        let key = format!("q_{}", name);
        let prompt = self
            .catalog
            .dictionary(&self.state.form.language)
            .get(&key)
            .filter(|p| !p.is_empty())
            .cloned();
        match prompt {
            Some(prompt) => {
                self.state.form.question = prompt;
                self.save_form();
                self.view.form(&self.state.form);
            }
            None => self.view.toast(&format!("Unknown suggestion: {}", name)),
        }
    }

    fn copy(&mut self, region: Region) {
        let text = self.state.regions.text(region);
        let clipboard = Arc::clone(&self.clipboard);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = clipboard.set_text(text).await;
            let _ = tx.send(AppEvent::CopyFinished(result));
        });
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.tx.clone()
    }
}
