//! Translation tables and their application to tagged UI elements.
//!
//! Tables are flat `key = "text"` TOML files embedded at build time and parsed
//! once into an immutable [`Catalog`].

use std::collections::HashMap;

use crate::constants::DEFAULT_LANG;

pub type Dictionary = HashMap<String, String>;

const EMBEDDED: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en.toml")),
    ("hi", include_str!("../locales/hi.toml")),
    ("mr", include_str!("../locales/mr.toml")),
    ("bn", include_str!("../locales/bn.toml")),
    ("ta", include_str!("../locales/ta.toml")),
    ("te", include_str!("../locales/te.toml")),
    ("kn", include_str!("../locales/kn.toml")),
    ("gu", include_str!("../locales/gu.toml")),
    ("pa", include_str!("../locales/pa.toml")),
    ("ur", include_str!("../locales/ur.toml")),
];

#[derive(Debug, Clone)]
pub struct Catalog {
    tables: HashMap<String, Dictionary>,
    fallback: Dictionary,
}

impl Catalog {
    /// Parses the tables compiled into the binary.
    pub fn embedded() -> Self {
        Self::from_sources(EMBEDDED.iter().copied())
    }

    pub fn from_sources<'a>(sources: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut tables = HashMap::new();
        for (lang, raw) in sources {
            match toml::from_str::<Dictionary>(raw) {
                Ok(dict) => {
                    tables.insert(lang.to_string(), dict);
                }
                Err(e) => tracing::warn!("Skipping locale {}: {}", lang, e),
            }
        }
        let fallback = tables.get(DEFAULT_LANG).cloned().unwrap_or_default();
        Self { tables, fallback }
    }

    /// Dictionary for `lang`, or the default dictionary for unknown codes.
    pub fn dictionary(&self, lang: &str) -> &Dictionary {
        self.tables.get(lang).unwrap_or(&self.fallback)
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        langs.sort_unstable();
        langs
    }

    /// Entry for `key`, else `fallback`, else the key itself.
    pub fn t(&self, lang: &str, key: &str, fallback: Option<&str>) -> String {
        match self.dictionary(lang).get(key) {
            Some(text) if !text.is_empty() => text.clone(),
            _ => fallback.unwrap_or(key).to_string(),
        }
    }

    /// Rewrites every bound attribute that has an entry; others stay as they are.
    pub fn apply(&self, lang: &str, elements: &mut [UiElement]) {
        let dict = self.dictionary(lang);
        for el in elements.iter_mut() {
            if let Some(text) = el.text_key.and_then(|k| dict.get(k)) {
                el.text = text.clone();
            }
            if let Some(text) = el.placeholder_key.and_then(|k| dict.get(k)) {
                el.placeholder = text.clone();
            }
            if let Some(text) = el.prompt_key.and_then(|k| dict.get(k)) {
                if !text.is_empty() {
                    el.prompt = text.clone();
                }
            }
        }
    }
}

/// A piece of UI whose text, placeholder and suggestion prompt may be
/// translated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiElement {
    pub id: &'static str,
    pub text_key: Option<&'static str>,
    pub placeholder_key: Option<&'static str>,
    pub prompt_key: Option<&'static str>,
    pub text: String,
    pub placeholder: String,
    pub prompt: String,
}

impl UiElement {
    pub fn label(id: &'static str, key: &'static str) -> Self {
        Self {
            id,
            text_key: Some(key),
            ..Self::default()
        }
    }

    pub fn with_placeholder(mut self, key: &'static str) -> Self {
        self.placeholder_key = Some(key);
        self
    }

    /// Quick-suggestion chip: a label plus the question it fills in.
    pub fn chip(id: &'static str, label_key: &'static str, prompt_key: &'static str) -> Self {
        Self {
            id,
            text_key: Some(label_key),
            prompt_key: Some(prompt_key),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_tables_all_parse() {
        let catalog = Catalog::embedded();
        assert_eq!(
            catalog.languages(),
            vec!["bn", "en", "gu", "hi", "kn", "mr", "pa", "ta", "te", "ur"]
        );
        assert_eq!(catalog.dictionary("hi")["label_crop"], "फसल");
    }

    #[test]
    fn unknown_language_uses_default_table() {
        let catalog = Catalog::embedded();
        assert_eq!(catalog.dictionary("fr")["label_plan"], "Plan");
    }

    #[test]
    fn t_falls_back_to_argument_then_key() {
        let catalog = Catalog::embedded();
        assert_eq!(catalog.t("hi", "nothing_to_read", None), "पढ़ने के लिए कुछ नहीं है");
        assert_eq!(catalog.t("hi", "btn_volume", Some("Volume")), "Volume");
        assert_eq!(catalog.t("ur", "btn_volume", None), "btn_volume");
    }

    #[test]
    fn apply_leaves_missing_keys_untouched() {
        let catalog = Catalog::embedded();
        let mut elements = vec![
            UiElement::label("question", "label_question").with_placeholder("ph_question"),
            UiElement::chip("chip-fert", "chip_fertilizer", "q_fertilizer"),
            UiElement {
                text: "Volume".into(),
                ..UiElement::label("volume", "btn_volume")
            },
        ];

        catalog.apply("ur", &mut elements);

        assert_eq!(elements[0].text, "آپ کا سوال");
        assert_eq!(elements[0].placeholder, "مثلاً، فصل کے لیے کھاد کی مقدار");
        assert_eq!(elements[1].prompt, "میری فصل کے لیے کھاد کی سفارش");
        // ur has no btn_volume entry
        assert_eq!(elements[2].text, "Volume");
    }

    #[test]
    fn broken_source_is_skipped() {
        let catalog = Catalog::from_sources([("en", "a = \"b\""), ("xx", "not = = toml")]);
        assert_eq!(catalog.languages(), vec!["en"]);
        assert_eq!(catalog.t("xx", "a", None), "b");
    }
}
