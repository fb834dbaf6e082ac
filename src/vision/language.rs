//! Language code handling
//!
//! Each recognition model covers one script. Requested language codes are
//! resolved to that script before any model is loaded.

use thiserror::Error;

/// Recognition model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    /// English letters, digits and punctuation
    English,
    /// Latin alphabet with accented letters (French, German, Spanish, ...)
    Latin,
    /// Simplified Chinese (also reads English)
    Chinese,
    /// Korean Hangul
    Korean,
    /// Cyrillic alphabets
    Cyrillic,
}

impl Script {
    /// Directory name of this script in the model repository
    pub fn dir_name(&self) -> &'static str {
        match self {
            Script::English => "english",
            Script::Latin => "latin",
            Script::Chinese => "chinese",
            Script::Korean => "korean",
            Script::Cyrillic => "cyrillic",
        }
    }
}

/// Language configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LanguageError {
    #[error("no recognition language configured")]
    Empty,
    #[error("unsupported language code '{0}'")]
    Unsupported(String),
    #[error("languages {0:?} need different recognition models; pick codes sharing one script")]
    MixedScripts(Vec<String>),
}

/// Map a single language code to its script
pub fn script_for(code: &str) -> Option<Script> {
    let script = match code.trim().to_ascii_lowercase().as_str() {
        "en" => Script::English,
        "fr" | "de" | "es" | "it" | "pt" | "nl" | "pl" | "cs" | "sv" | "da" | "no" | "fi"
        | "ro" | "hu" | "tr" | "id" | "ms" | "vi" | "la" => Script::Latin,
        "ch_sim" | "zh" => Script::Chinese,
        "ko" => Script::Korean,
        "ru" | "uk" | "be" | "bg" | "sr" | "mn" => Script::Cyrillic,
        _ => return None,
    };
    Some(script)
}

/// Resolve a set of language codes to the one script that covers all of them.
///
/// English is readable by every model, so `en` combines with any other script.
pub fn resolve_script(languages: &[String]) -> Result<Script, LanguageError> {
    if languages.is_empty() {
        return Err(LanguageError::Empty);
    }

    let mut resolved = Script::English;
    for code in languages {
        let script = script_for(code).ok_or_else(|| LanguageError::Unsupported(code.clone()))?;
        if script == Script::English || script == resolved {
            continue;
        }
        if resolved != Script::English {
            return Err(LanguageError::MixedScripts(languages.to_vec()));
        }
        resolved = script;
    }

    Ok(resolved)
}
