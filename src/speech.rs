//! Speech output and input.
//!
//! Native speech goes through a [`SpeechEngine`]; when no voice matches the
//! language the volume toggle asks the backend for audio and hands the bytes
//! to an [`AudioSink`]. Dictation comes from an optional [`SpeechRecognizer`].

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::{DEFAULT_VOICE_LOCALE, RATE_KEY, SPEECH_RATES};
use crate::error::ClientResult;
use crate::formatters::PlanView;
use crate::render::Regions;
use crate::service::AdvisoryBackend;
use crate::storage::KeyValueStore;

static NUMBERED_STEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+[).\-:\s]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    pub lang: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub voice: Option<Voice>,
    pub rate: f32,
}

pub trait SpeechEngine: Send + Sync {
    fn voices(&self) -> Vec<Voice>;
    fn is_speaking(&self) -> bool;
    fn speak(&self, utterance: Utterance) -> ClientResult<()>;
    fn cancel(&self);
}

pub trait AudioSink: Send + Sync {
    /// Starts playing `audio`; the sink releases it when playback ends.
    fn play(&self, audio: Vec<u8>, rate: f32) -> ClientResult<()>;
    fn is_playing(&self) -> bool;
    /// Applies `rate` to whatever is playing now.
    fn set_rate(&self, rate: f32);
    fn stop(&self);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognitionResult {
    pub alternatives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptResult {
    pub transcript: String,
}

/// Single-shot, final-results-only dictation.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(&self, lang: &str) -> ClientResult<Vec<RecognitionResult>>;
}

/// Top alternative of every result, space-joined and trimmed.
pub fn transcript(results: &[RecognitionResult]) -> TranscriptResult {
    let joined = results
        .iter()
        .filter_map(|r| r.alternatives.first())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    TranscriptResult {
        transcript: joined.trim().to_string(),
    }
}

/// Regional tag for a 2-letter code, e.g. `hi` becomes `hi-IN`.
pub fn normalize_lang(lang: &str) -> String {
    match lang {
        "" => DEFAULT_VOICE_LOCALE.to_string(),
        "en" | "hi" | "te" | "ta" | "bn" | "mr" | "gu" | "pa" | "kn" => format!("{}-IN", lang),
        other => other.to_string(),
    }
}

/// Exact locale, then prefix, then substring match.
pub fn pick_voice(voices: &[Voice], lang: &str) -> Option<Voice> {
    let wanted = normalize_lang(lang).to_lowercase();
    let code = if lang.is_empty() { "en" } else { lang }.to_lowercase();
    let voice_lang = |v: &Voice| v.lang.to_lowercase();

    voices
        .iter()
        .find(|v| voice_lang(*v) == wanted)
        .or_else(|| voices.iter().find(|v| voice_lang(*v).starts_with(code.as_str())))
        .or_else(|| voices.iter().find(|v| voice_lang(*v).contains(code.as_str())))
        .cloned()
}

pub fn missing_voice_notice(lang: &str) -> Option<&'static str> {
    match lang {
        "te" => Some("Telugu voice not found on this device. Install a Telugu TTS voice in your OS for better results."),
        "ta" => Some("Tamil voice not found on this device."),
        "bn" => Some("Bengali voice not found on this device."),
        "mr" => Some("Marathi voice not found on this device."),
        "gu" => Some("Gujarati voice not found on this device."),
        "pa" => Some("Punjabi voice not found on this device."),
        "kn" => Some("Kannada voice not found on this device."),
        "hi" => Some("Hindi voice not found on this device."),
        _ => None,
    }
}

/// One string to read out: numbered plan steps, fertilizer, then answer.
pub fn readable_text(regions: &Regions) -> String {
    let plan = match &regions.plan {
        PlanView::Steps(steps) => steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let raw = step.trim();
                if NUMBERED_STEP.is_match(raw) {
                    raw.to_string()
                } else {
                    format!("{}. {}", i + 1, raw)
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
        PlanView::Text(text) => text.clone(),
    };

    [plan, regions.fertilizer.clone(), regions.answer.clone()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(". ")
}

/// Persisted playback rate shared by native speech and fallback audio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechRate(f32);

impl Default for SpeechRate {
    fn default() -> Self {
        SpeechRate(1.0)
    }
}

impl SpeechRate {
    /// Stored rate if it parses and lies in (0.4, 2.1), else 1.0.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        store
            .get(RATE_KEY)
            .and_then(|raw| raw.trim().parse::<f32>().ok())
            .filter(|r| *r > 0.4 && *r < 2.1)
            .map(SpeechRate)
            .unwrap_or_default()
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    /// Next rate in the cycle; a rate outside the cycle restarts it.
    pub fn next(&self) -> Self {
        let idx = SPEECH_RATES.iter().position(|r| (r - self.0).abs() < 0.01);
        let next = match idx {
            Some(i) => SPEECH_RATES[(i + 1) % SPEECH_RATES.len()],
            None => SPEECH_RATES[0],
        };
        SpeechRate(next)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    NothingToRead,
    Speaking { notice: Option<&'static str> },
    /// `notice` is still set when the language had no voice.
    Failed { error: String, notice: Option<&'static str> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToggleStep {
    StoppedNative,
    StoppedAudio,
    NothingToRead,
    SpeakingNative,
    /// No native voice: fetch server audio for this text.
    NeedsFallback { text: String, lang: String, rate: f32 },
    Failed(String),
}

pub struct Speech {
    engine: Arc<dyn SpeechEngine>,
    sink: Arc<dyn AudioSink>,
    store: Arc<dyn KeyValueStore>,
    rate: SpeechRate,
}

impl Speech {
    pub fn new(engine: Arc<dyn SpeechEngine>, sink: Arc<dyn AudioSink>, store: Arc<dyn KeyValueStore>) -> Self {
        let rate = SpeechRate::load(store.as_ref());
        Self {
            engine,
            sink,
            store,
            rate,
        }
    }

    pub fn rate(&self) -> SpeechRate {
        self.rate
    }

    pub fn sink(&self) -> Arc<dyn AudioSink> {
        Arc::clone(&self.sink)
    }

    fn utterance(&self, text: String, lang: &str, voice: Option<Voice>) -> Utterance {
        Utterance {
            text,
            lang: normalize_lang(lang),
            voice,
            rate: self.rate.value(),
        }
    }

    /// Reads the regions with native speech, replacing anything being spoken.
    pub fn read_aloud(&self, regions: &Regions, lang: &str) -> ReadOutcome {
        let text = readable_text(regions);
        if text.is_empty() {
            return ReadOutcome::NothingToRead;
        }

        let voice = pick_voice(&self.engine.voices(), lang);
        let notice = if voice.is_none() {
            missing_voice_notice(lang)
        } else {
            None
        };

        self.engine.cancel();
        match self.engine.speak(self.utterance(text, lang, voice)) {
            Ok(()) => ReadOutcome::Speaking { notice },
            Err(e) => {
                tracing::warn!("Native speech failed: {}", e);
                ReadOutcome::Failed {
                    error: e.to_string(),
                    notice,
                }
            }
        }
    }

    /// Volume control: stop whatever plays, otherwise start native speech or
    /// ask for the server fallback.
    pub fn toggle(&self, regions: &Regions, lang: &str) -> ToggleStep {
        if self.engine.is_speaking() {
            self.engine.cancel();
            return ToggleStep::StoppedNative;
        }
        if self.sink.is_playing() {
            self.sink.stop();
            return ToggleStep::StoppedAudio;
        }

        let text = readable_text(regions);
        if text.is_empty() {
            return ToggleStep::NothingToRead;
        }

        match pick_voice(&self.engine.voices(), lang) {
            Some(voice) => {
                self.engine.cancel();
                match self.engine.speak(self.utterance(text, lang, Some(voice))) {
                    Ok(()) => ToggleStep::SpeakingNative,
                    Err(e) => ToggleStep::Failed(e.to_string()),
                }
            }
            None => ToggleStep::NeedsFallback {
                text,
                lang: lang.to_string(),
                rate: self.rate.value(),
            },
        }
    }

    /// Advances the rate, persists it and applies it to fallback audio that
    /// is playing. Native speech picks it up on the next utterance.
    pub fn cycle_rate(&mut self) -> SpeechRate {
        self.rate = self.rate.next();
        self.store.set(RATE_KEY, &self.rate.value().to_string());
        if self.sink.is_playing() {
            self.sink.set_rate(self.rate.value());
        }
        self.rate
    }

    /// Stops all output, used on shutdown.
    pub fn teardown(&self) {
        if self.engine.is_speaking() {
            self.engine.cancel();
        }
        if self.sink.is_playing() {
            self.sink.stop();
        }
    }
}

/// Fetches server audio for `text` and starts playing it.
pub async fn play_fallback(
    backend: Arc<dyn AdvisoryBackend>,
    sink: Arc<dyn AudioSink>,
    text: &str,
    lang: &str,
    rate: f32,
) -> ClientResult<()> {
    let audio = backend.tts(text, lang).await?;
    sink.play(audio, rate)
}
