pub mod app;
pub mod cancel;
pub mod clipboard;
pub mod config;
pub mod constants;
pub mod error;
pub mod formatters;
pub mod i18n;
pub mod location;
pub mod models;
pub mod orchestrator;
pub mod playback;
pub mod render;
pub mod service;
pub mod speech;
pub mod storage;
pub mod terminal;
pub mod weather;
