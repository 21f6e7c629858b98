use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// UI language selected by a driver. French is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Fr,
    En,
    Es,
    De,
    It,
}

impl Language {
    pub const ALL: [Language; 5] = [Language::Fr, Language::En, Language::Es, Language::De, Language::It];

    pub fn code(self) -> &'static str {
        match self {
            Language::Fr => "fr",
            Language::En => "en",
            Language::Es => "es",
            Language::De => "de",
            Language::It => "it",
        }
    }

    /// Default push title for a newly dispatched ride.
    pub fn new_ride_title(self) -> &'static str {
        match self {
            Language::Fr => "🚗 Nouvelle course disponible",
            Language::En => "🚗 New ride available",
            Language::Es => "🚗 Nuevo viaje disponible",
            Language::De => "🚗 Neue Fahrt verfügbar",
            Language::It => "🚗 Nuova corsa disponibile",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl AsRef<str> for Language {
    fn as_ref(&self) -> &str {
        self.code()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|lang| lang.code() == code)
            .ok_or_else(|| UnsupportedLanguage(s.to_string()))
    }
}
