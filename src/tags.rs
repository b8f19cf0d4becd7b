//! Keyword cleanup applied once when a catalog record is created.

use std::collections::HashSet;

use regex::Regex;

use crate::config::TagConfig;
use crate::error::ConfigError;

const TAG_SEPARATOR: &str = "; ";

/// Name of the built-in Spanish stopword list.
pub const PERSONAL_SPANISH_PRESET: &str = "es-personal";

const PERSONAL_SPANISH_STOPWORDS: &[&str] = &[
    "35_a", "ar-", "i", "ii", "a", "el", "de", "en", "la", "hacia", "hay", "que", "por", "para",
    "se", "un", "una", "unos", "unas", "y", "o", "u", "v", "al", "del", "los", "las", "con",
    "sin", "sobre", "bajo", "cabe", "entre", "durante", "mediante", "tras", "hasta", "desde",
    "contra", "según", "aunque", "ya", "si", "no", "ni", "pero", "pues", "porque", "porqué",
    "por qué", "como", "cuando", "donde", "cuanto", "cuanta", "cuantos", "cuantas", "quien",
    "quienes", "cual", "cuales", "lo", "le", "les", "me", "te", "nos", "os", "mí", "ti", "mío",
    "tuyo", "suyo", "nuestro", "vuestro", "mía", "tuya", "suya", "nuestra", "vuestra", "míos",
    "tuyos", "suyos", "nuestros", "vuestros", "mías", "tuyas", "suyas", "nuestras", "vuestras",
    "ser", "estar", "haber", "hacer", "poder", "querer", "deber", "decir", "saber", "tener", "ir",
    "dar", "salir", "ver", "conocer", "pensar",
];

fn preset_stopwords(name: &str) -> Option<&'static [&'static str]> {
    match name.trim() {
        PERSONAL_SPANISH_PRESET => Some(PERSONAL_SPANISH_STOPWORDS),
        _ => None,
    }
}

/// Compiled scrub patterns and stopwords for one run.
#[derive(Debug, Clone)]
pub struct TagPolicy {
    scrub_patterns: Vec<Regex>,
    stopwords: HashSet<String>,
    lowercase: bool,
}

impl TagPolicy {
    pub fn new(scrub_patterns: Vec<Regex>, stopwords: HashSet<String>) -> Self {
        Self {
            scrub_patterns,
            stopwords,
            lowercase: false,
        }
    }

    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    /// Compiles the `[tags]` section. Bad patterns are a startup error.
    pub fn from_config(config: &TagConfig) -> Result<Self, ConfigError> {
        let scrub_patterns = config
            .scrub_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut stopwords: HashSet<String> = config
            .stopwords
            .iter()
            .map(|word| word.trim().to_lowercase())
            .filter(|word| !word.is_empty())
            .collect();
        for name in &config.stopword_presets {
            let preset = preset_stopwords(name)
                .ok_or_else(|| ConfigError::UnknownStopwordPreset(name.clone()))?;
            stopwords.extend(preset.iter().map(|word| word.to_string()));
        }
        Ok(Self::new(scrub_patterns, stopwords).with_lowercase(config.lowercase))
    }

    fn matches_identifier(&self, keyword: &str) -> bool {
        self.scrub_patterns
            .iter()
            .any(|pattern| pattern.is_match(keyword))
    }

    fn scrub(&self, keyword: &str) -> String {
        let mut cleaned = keyword.to_string();
        for pattern in &self.scrub_patterns {
            cleaned = pattern.replace_all(&cleaned, "").into_owned();
        }
        cleaned.trim().to_string()
    }

    fn is_stopword(&self, keyword: &str) -> bool {
        self.stopwords.contains(&keyword.to_lowercase())
    }

    fn emit(&self, keyword: &str) -> String {
        if self.lowercase {
            keyword.to_lowercase()
        } else {
            keyword.to_string()
        }
    }

    /// Turns a raw keyword list into the catalog's `subject` column.
    ///
    /// With several keywords, identifier-like substrings are stripped in place
    /// and entries left empty are dropped. Duplicates are compared ignoring
    /// case and the first spelling wins. A lone keyword is kept whole or
    /// discarded whole.
    pub fn sanitize(&self, keywords: &[String]) -> String {
        match keywords {
            [] => String::new(),
            [single] => {
                let trimmed = single.trim();
                if self.matches_identifier(trimmed) || self.is_stopword(trimmed) {
                    String::new()
                } else {
                    self.emit(trimmed)
                }
            }
            many => {
                let mut seen = HashSet::new();
                many.iter()
                    .map(|keyword| self.scrub(keyword))
                    .filter(|keyword| !keyword.is_empty() && !self.is_stopword(keyword))
                    .filter(|keyword| seen.insert(keyword.to_lowercase()))
                    .map(|keyword| self.emit(&keyword))
                    .collect::<Vec<_>>()
                    .join(TAG_SEPARATOR)
            }
        }
    }
}
