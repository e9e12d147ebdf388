// Crisis keyword detector

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrisisSeverity {
    None,
    Low,
    Medium,
    High,
}

impl CrisisSeverity {
    pub fn is_crisis(self) -> bool {
        self != Self::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Phrase lists per severity tier, as loaded from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisKeywords {
    pub high: Vec<String>,
    pub medium: Vec<String>,
    pub low: Vec<String>,
}

impl Default for CrisisKeywords {
    fn default() -> Self {
        fn owned(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }

        Self {
            high: owned(&[
                "suicid",
                "quitarme la vida",
                "quiero morir",
                "no quiero vivir",
                "matarme",
                "acabar con mi vida",
                "terminar con mi vida",
                "kill myself",
                "end my life",
                "want to die",
                "better off dead",
            ]),
            medium: owned(&[
                "hacerme daño",
                "lastimarme",
                "cortarme",
                "autolesi",
                "self harm",
                "self-harm",
                "hurt myself",
                "cut myself",
            ]),
            low: owned(&[
                "sin esperanza",
                "no le veo sentido a la vida",
                "nadie me extrañaría",
                "hopeless",
                "no reason to live",
                "nobody would miss me",
            ]),
        }
    }
}

/// Case-insensitive substring matcher over the tiered phrase lists.
///
/// Matching is plain containment, so a phrase embedded in a longer word
/// still matches.
#[derive(Debug, Clone)]
pub struct CrisisDetector {
    keywords: CrisisKeywords,
}

impl Default for CrisisDetector {
    fn default() -> Self {
        Self::new(CrisisKeywords::default())
    }
}

impl CrisisDetector {
    pub fn new(keywords: CrisisKeywords) -> Self {
        fn normalize(list: Vec<String>) -> Vec<String> {
            list.into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        }

        Self {
            keywords: CrisisKeywords {
                high: normalize(keywords.high),
                medium: normalize(keywords.medium),
                low: normalize(keywords.low),
            },
        }
    }

    /// Load tiered crisis phrases from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read crisis keywords file: {}", path.display()))?;

        let keywords: CrisisKeywords =
            serde_json::from_str(&contents).context("Failed to parse crisis keywords file")?;

        Ok(Self::new(keywords))
    }

    /// Highest tier with at least one phrase contained in `text`.
    pub fn detect(&self, text: &str) -> CrisisSeverity {
        if text.is_empty() {
            return CrisisSeverity::None;
        }
        let lower = text.to_lowercase();

        let tiers = [
            (CrisisSeverity::High, &self.keywords.high),
            (CrisisSeverity::Medium, &self.keywords.medium),
            (CrisisSeverity::Low, &self.keywords.low),
        ];
        for (severity, phrases) in tiers {
            if let Some(phrase) = phrases.iter().find(|p| lower.contains(p.as_str())) {
                tracing::debug!(severity = severity.as_str(), phrase = %phrase, "Crisis phrase matched");
                return severity;
            }
        }

        CrisisSeverity::None
    }
}
