use std::time::Duration;

/// User agent string for HTTP requests
pub const USER_AGENT: &str = "krishi-advisor/0.1.0";

/// Advisory backend base URL used when nothing is configured
pub const DEFAULT_BACKEND_BASE: &str = "http://127.0.0.1:8000";

/// IP geolocation service tried first
pub const IPAPI_URL: &str = "https://ipapi.co/json/";

/// IP geolocation service tried when the first one fails
pub const IPWHO_URL: &str = "https://ipwho.is/";

/// Farmer id sent with every advisory request
pub const FARMER_ID: &str = "web_user";

pub const DEFAULT_LANG: &str = "en";
pub const DEFAULT_VOICE_LOCALE: &str = "en-IN";

/// Hard abort for every weather fetch
pub const WEATHER_TIMEOUT: Duration = Duration::from_secs(8);

/// Hard abort for an advisory submission
pub const ASK_TIMEOUT: Duration = Duration::from_secs(25);

/// Device geolocation timeout
pub const GEO_TIMEOUT: Duration = Duration::from_secs(8);

/// A device fix younger than this is reused
pub const GEO_MAX_AGE: Duration = Duration::from_secs(60);

/// Quiet period before manual "lat,lon" input is parsed
pub const MANUAL_DEBOUNCE: Duration = Duration::from_millis(400);

// Durable storage keys
pub const FORM_KEY: &str = "krishigpt.form";
pub const LAST_RESULT_KEY: &str = "krishigpt.last";
pub const RATE_KEY: &str = "krishigpt.rate";

/// Playback rates cycled by the speed control
pub const SPEECH_RATES: [f32; 4] = [0.75, 1.0, 1.25, 1.5];

pub const VALIDATION_MESSAGE: &str =
    "Please provide crop, question, and a location (auto or manual).";
