//! Line commands in, plain text out.

use std::io::Write;

use crate::app::{AppEvent, View};
use crate::formatters::{PlanView, WeatherDisplay};
use crate::i18n::{Catalog, UiElement};
use crate::models::FormState;
use crate::render::{Region, Regions};

/// Usage, the element whose label the command mirrors, and a description.
const COMMANDS: &[(&str, Option<&str>, &str)] = &[
    ("crop <name>", Some("crop"), "set the crop"),
    ("q <text>", Some("question"), "set the question"),
    ("loc <lat,lon>", Some("location"), "enter a location by hand"),
    ("lang <code>", Some("language"), "switch language (en hi mr bn ta te kn gu pa ur)"),
    ("locate", Some("locate"), "detect the location again"),
    ("ask", Some("ask"), "send the question"),
    ("read", Some("read"), "read the analysis aloud"),
    ("volume", None, "start or stop audio"),
    ("speed", None, "change the speech speed"),
    ("mic", Some("mic"), "dictate the question"),
    ("chip <name>", None, "use a suggestion (fertilizer irrigation pests sowing)"),
    ("copy <region>", None, "copy plan, fert or answer to the clipboard"),
    ("clear", Some("clear"), "clear crop, question and results"),
    ("sample", Some("sample"), "fill in a sample question"),
    ("help", None, "show this text"),
    ("quit", None, "exit"),
];

#[derive(Debug)]
pub enum Command {
    Event(AppEvent),
    Unknown(String),
}

fn region(name: &str) -> Option<Region> {
    match name.to_lowercase().as_str() {
        "plan" => Some(Region::Plan),
        "fert" | "fertilizer" => Some(Region::Fertilizer),
        "answer" | "analysis" => Some(Region::Answer),
        _ => None,
    }
}

/// Parses one input line. Blank lines give `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let event = match word.to_lowercase().as_str() {
        "crop" => AppEvent::SetCrop(rest.to_string()),
        "q" | "question" => AppEvent::SetQuestion(rest.to_string()),
        "loc" | "location" => AppEvent::SetLocation(rest.to_string()),
        "lang" | "language" if !rest.is_empty() => AppEvent::SetLanguage(rest.to_lowercase()),
        "locate" => AppEvent::DetectLocation,
        "ask" => AppEvent::Submit,
        "read" => AppEvent::ReadAloud,
        "volume" => AppEvent::ToggleVolume,
        "speed" => AppEvent::CycleSpeed,
        "mic" => AppEvent::Listen,
        "chip" if !rest.is_empty() => AppEvent::Chip(rest.to_lowercase()),
        "copy" => match region(rest) {
            Some(region) => AppEvent::Copy(region),
            None => return Some(Command::Unknown(line.to_string())),
        },
        "clear" => AppEvent::Clear,
        "sample" => AppEvent::Sample,
        "help" | "?" => AppEvent::Help,
        "quit" | "exit" => AppEvent::Quit,
        _ => return Some(Command::Unknown(line.to_string())),
    };
    Some(Command::Event(event))
}

fn ui_elements() -> Vec<UiElement> {
    vec![
        UiElement::label("plan", "label_plan"),
        UiElement::label("fertilizer", "label_fertilizer"),
        UiElement::label("analysis", "label_analysis"),
        UiElement::label("crop", "label_crop"),
        UiElement::label("location", "label_location"),
        UiElement::label("language", "label_language"),
        UiElement::label("question", "label_question").with_placeholder("ph_question"),
        UiElement::label("read", "btn_read"),
        UiElement::label("locate", "btn_use_location"),
        UiElement::label("mic", "btn_speak"),
        UiElement::label("ask", "btn_ask"),
        UiElement::label("clear", "btn_clear"),
        UiElement::label("sample", "btn_sample"),
        UiElement::label("hint", "hint_language_input"),
        UiElement::chip("fertilizer", "chip_fertilizer", "q_fertilizer"),
        UiElement::chip("irrigation", "chip_irrigation", "q_irrigation"),
        UiElement::chip("pests", "chip_pests", "q_pests"),
        UiElement::chip("sowing", "chip_sowing", "q_sowing"),
    ]
}

pub struct TerminalView<W: Write + Send> {
    out: W,
    elements: Vec<UiElement>,
}

impl<W: Write + Send> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            elements: ui_elements(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn label(&self, id: &str) -> String {
        self.bound_label(id).unwrap_or_else(|| id.to_string())
    }

    /// Translated text of a label element, if the catalog gave it one.
    fn bound_label(&self, id: &str) -> Option<String> {
        self.elements
            .iter()
            .find(|el| el.id == id && el.prompt_key.is_none())
            .map(|el| el.text.clone())
            .filter(|text| !text.is_empty())
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text).and_then(|_| self.out.flush()) {
            tracing::debug!("Could not write to terminal: {}", e);
        }
    }
}

impl<W: Write + Send> View for TerminalView<W> {
    fn form(&mut self, form: &FormState) {
        let question = if form.question.is_empty() {
            self.elements
                .iter()
                .find(|el| el.id == "question")
                .map(|el| format!("({})", el.placeholder))
                .unwrap_or_default()
        } else {
            form.question.clone()
        };
        let text = format!(
            "{}: {}\n{}: {}\n{}: {}\n{}: {}",
            self.label("crop"),
            form.crop,
            self.label("question"),
            question,
            self.label("location"),
            form.location,
            self.label("language"),
            form.language
        );
        self.line(&text);
    }

    fn geo_status(&mut self, text: &str) {
        self.line(text);
    }

    fn weather(&mut self, weather: &WeatherDisplay) {
        self.line(&weather.text);
        if let Some(updated) = &weather.updated {
            self.line(updated);
        }
    }

    fn validation(&mut self, message: Option<&str>) {
        if let Some(message) = message {
            self.line(&format!("! {}", message));
        }
    }

    fn loading(&mut self, on: bool) {
        if on {
            self.line("…");
        }
    }

    fn regions(&mut self, regions: &Regions) {
        if regions.is_empty() {
            return;
        }
        let plan = match &regions.plan {
            PlanView::Steps(steps) => steps
                .iter()
                .enumerate()
                .map(|(i, step)| format!("{}. {}", i + 1, step))
                .collect::<Vec<_>>()
                .join("\n"),
            PlanView::Text(text) => text.clone(),
        };
        let text = format!(
            "== {} ==\n{}\n== {} ==\n{}\n== {} ==\n{}",
            self.label("plan"),
            plan,
            self.label("fertilizer"),
            regions.fertilizer,
            self.label("analysis"),
            regions.answer.trim()
        );
        self.line(&text);
    }

    fn toast(&mut self, message: &str) {
        self.line(&format!("» {}", message));
    }

    fn speed(&mut self, label: &str) {
        self.line(&format!("Speed: {}", label));
    }

    fn translate(&mut self, catalog: &Catalog, lang: &str) {
        catalog.apply(lang, &mut self.elements);
        let chips = self
            .elements
            .iter()
            .filter(|el| el.prompt_key.is_some())
            .map(|el| format!("{} [chip {}]", el.text, el.id))
            .collect::<Vec<_>>()
            .join("  ");
        let hint = self.label("hint");
        self.line(&chips);
        self.line(&hint);
    }

    fn help(&mut self) {
        let mut text = String::from("Commands:");
        for (usage, element, description) in COMMANDS {
            text.push_str(&format!("\n  {:<20} {}", usage, description));
            if let Some(label) = element.and_then(|id| self.bound_label(id)) {
                text.push_str(&format!(" [{}]", label));
            }
        }
        self.line(&text);
    }
}
