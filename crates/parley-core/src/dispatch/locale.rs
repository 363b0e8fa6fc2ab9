//! Localized fallback texts

use std::collections::HashMap;

const BUILTIN: &[(&str, &str)] = &[
    ("en", "Something went wrong. Please try again."),
    ("de", "Etwas ist schiefgelaufen. Bitte versuche es erneut."),
    ("es", "Algo salió mal. Inténtalo de nuevo."),
    ("fr", "Une erreur s'est produite. Veuillez réessayer."),
    ("ru", "Что-то пошло не так. Попробуйте ещё раз."),
];

/// General error texts keyed by primary language subtag
#[derive(Debug, Clone)]
pub struct Locale {
    default_language: String,
    general_error: HashMap<String, String>,
}

impl Default for Locale {
    fn default() -> Self {
        Self::new("en")
    }
}

impl Locale {
    /// Built-in texts with the given fallback language
    pub fn new(default_language: impl AsRef<str>) -> Self {
        Self {
            default_language: normalize(default_language.as_ref()),
            general_error: BUILTIN
                .iter()
                .map(|(lang, text)| ((*lang).to_string(), (*text).to_string()))
                .collect(),
        }
    }

    /// Override or add the general error text for a language
    #[must_use]
    pub fn with_general_error(mut self, language: &str, text: impl Into<String>) -> Self {
        self.general_error.insert(normalize(language), text.into());
        self
    }

    /// Fallback language
    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// General error text for a client language tag such as `en-US`
    pub fn general_error(&self, language: Option<&str>) -> &str {
        language
            .map(normalize)
            .and_then(|lang| self.general_error.get(&lang))
            .or_else(|| self.general_error.get(&self.default_language))
            .or_else(|| self.general_error.get("en"))
            .map(String::as_str)
            .unwrap_or(BUILTIN[0].1)
    }
}

fn normalize(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or(tag)
        .trim()
        .to_ascii_lowercase()
}
