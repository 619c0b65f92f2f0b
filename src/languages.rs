//! Supported OCR languages.
//!
//! The catalog is the only language configuration surface we expose. Engine
//! codes are passed straight through to the recognition engine, so anything a
//! user types that isn't in the catalog is still forwarded and left for the
//! engine to accept or reject.

use std::fmt;

use schemars::JsonSchema;

use crate::prelude::*;

/// A language we know how to ask the recognition engine for.
#[derive(Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Language {
    /// Human-readable name.
    pub name: &'static str,

    /// Short ISO 639-1 code, as shown to users.
    pub code: &'static str,

    /// The identifier the recognition engine expects.
    pub engine_code: &'static str,
}

impl Language {
    const fn new(name: &'static str, code: &'static str, engine_code: &'static str) -> Self {
        Self {
            name,
            code,
            engine_code,
        }
    }
}

/// Every language we offer. The first entry is the default.
pub const SUPPORTED_LANGUAGES: &[Language] = &[
    Language::new("English", "en", "eng"),
    Language::new("Malayalam", "ml", "mal"),
    Language::new("Hindi", "hi", "hin"),
    Language::new("Tamil", "ta", "tam"),
    Language::new("Telugu", "te", "tel"),
    Language::new("Kannada", "kn", "kan"),
    Language::new("Gujarati", "gu", "guj"),
    Language::new("Bengali", "bn", "ben"),
    Language::new("Punjabi", "pa", "pan"),
    Language::new("French", "fr", "fra"),
    Language::new("Spanish", "es", "spa"),
    Language::new("German", "de", "deu"),
];

/// The language used when nothing was selected.
pub fn default_language() -> &'static Language {
    &SUPPORTED_LANGUAGES[0]
}

/// Look up a catalog entry by short code or engine code.
pub fn find_language(code: &str) -> Option<&'static Language> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|lang| lang.code == code || lang.engine_code == code)
}

/// An ordered, non-empty selection of engine codes.
///
/// Order is preserved and duplicates are kept, because the engine treats the
/// first language as primary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LanguageSet {
    codes: Vec<String>,
}

impl LanguageSet {
    /// Build a set from engine codes. An empty selection falls back to
    /// [`default_language`].
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut codes = codes
            .into_iter()
            .map(Into::into)
            .filter(|code: &String| !code.is_empty())
            .collect::<Vec<_>>();
        if codes.is_empty() {
            codes.push(default_language().engine_code.to_owned());
        }
        Self { codes }
    }

    /// Build a set from user input, mapping catalog short codes (`ml`) to
    /// engine codes (`mal`). Unknown codes pass through untouched.
    pub fn from_user_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(codes.into_iter().map(|code| {
            let code = code.as_ref().trim();
            match find_language(code) {
                Some(lang) => lang.engine_code.to_owned(),
                None => code.to_owned(),
            }
        }))
    }

    /// The composite specifier handed to the engine, e.g. `eng+mal`.
    pub fn specifier(&self) -> String {
        self.codes.join("+")
    }
}

impl Default for LanguageSet {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl fmt::Display for LanguageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.specifier())
    }
}
