//! Difficulty levels and languages for generated scenarios.
//!
//! Difficulty is table-driven: each level fixes how many bugs are injected
//! and how many commands the agent may spend fixing them.

use serde::{Deserialize, Serialize};

/// Commands an agent is expected to need per injected bug (inspect, edit, check).
pub const COMMANDS_PER_BUG: u32 = 3;

/// The difficulty level of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    #[default]
    Easy,
    Medium,
    Hard,
    VeryHard,
}

impl DifficultyLevel {
    /// All levels, easiest first.
    pub const ALL: [DifficultyLevel; 4] = [
        DifficultyLevel::Easy,
        DifficultyLevel::Medium,
        DifficultyLevel::Hard,
        DifficultyLevel::VeryHard,
    ];

    /// Number of bugs injected into the project.
    pub fn bug_count(&self) -> usize {
        match self {
            DifficultyLevel::Easy => 1,
            DifficultyLevel::Medium => 2,
            DifficultyLevel::Hard => 3,
            DifficultyLevel::VeryHard => 4,
        }
    }

    /// Maximum number of commands accepted across the episode.
    pub fn command_budget(&self) -> u32 {
        match self {
            DifficultyLevel::Easy => 5,
            DifficultyLevel::Medium => 10,
            DifficultyLevel::Hard => 20,
            DifficultyLevel::VeryHard => 30,
        }
    }

    /// Number of commands a competent agent is expected to use.
    pub fn expected_commands(&self) -> u32 {
        self.bug_count() as u32 * COMMANDS_PER_BUG
    }

    /// Returns the canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLevel::Easy => "easy",
            DifficultyLevel::Medium => "medium",
            DifficultyLevel::Hard => "hard",
            DifficultyLevel::VeryHard => "very_hard",
        }
    }
}

impl std::fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DifficultyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "easy" => Ok(DifficultyLevel::Easy),
            "medium" => Ok(DifficultyLevel::Medium),
            "hard" => Ok(DifficultyLevel::Hard),
            "very_hard" | "veryhard" => Ok(DifficultyLevel::VeryHard),
            other => Err(format!("Unknown difficulty: {}", other)),
        }
    }
}

/// Concrete language of a generated project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
        }
    }

    /// Source file extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::JavaScript => "js",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Language requested at reset time; `Random` is resolved by the seeded RNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LanguageChoice {
    #[default]
    Python,
    JavaScript,
    Random,
}

impl LanguageChoice {
    /// Returns the fixed language, or `None` for `Random`.
    pub fn fixed(&self) -> Option<Language> {
        match self {
            LanguageChoice::Python => Some(Language::Python),
            LanguageChoice::JavaScript => Some(Language::JavaScript),
            LanguageChoice::Random => None,
        }
    }
}

impl From<Language> for LanguageChoice {
    fn from(language: Language) -> Self {
        match language {
            Language::Python => LanguageChoice::Python,
            Language::JavaScript => LanguageChoice::JavaScript,
        }
    }
}

impl std::fmt::Display for LanguageChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LanguageChoice::Random => write!(f, "random"),
            other => match other.fixed() {
                Some(lang) => write!(f, "{}", lang),
                None => Ok(()),
            },
        }
    }
}

impl std::str::FromStr for LanguageChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" | "py" => Ok(LanguageChoice::Python),
            "javascript" | "js" | "node" => Ok(LanguageChoice::JavaScript),
            "random" => Ok(LanguageChoice::Random),
            other => Err(format!("Unknown language: {}", other)),
        }
    }
}
