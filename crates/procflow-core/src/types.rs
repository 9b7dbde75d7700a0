use crate::error::ProcflowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// SourceType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Url,
    File,
    Image,
    Transcript,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Url => "url",
            SourceType::File => "file",
            SourceType::Image => "image",
            SourceType::Transcript => "transcript",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AutomationPotential
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationPotential {
    High,
    #[default]
    Medium,
    Low,
    None,
}

impl AutomationPotential {
    pub fn as_str(self) -> &'static str {
        match self {
            AutomationPotential::High => "high",
            AutomationPotential::Medium => "medium",
            AutomationPotential::Low => "low",
            AutomationPotential::None => "none",
        }
    }
}

impl fmt::Display for AutomationPotential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutomationPotential {
    type Err = ProcflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(AutomationPotential::High),
            "medium" | "med" => Ok(AutomationPotential::Medium),
            "low" => Ok(AutomationPotential::Low),
            "none" | "no" => Ok(AutomationPotential::None),
            _ => Err(ProcflowError::InvalidArgument(format!(
                "unknown automation potential '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// GapType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GapType {
    #[serde(rename = "missingInfo")]
    MissingInfo,
    #[serde(rename = "undefinedRole")]
    UndefinedRole,
    #[serde(rename = "missingDecision")]
    MissingDecision,
    #[serde(rename = "unclearHandoff")]
    UnclearHandoff,
    #[serde(rename = "incompleteStep")]
    IncompleteStep,
    #[serde(rename = "contradiction")]
    Contradiction,
    #[serde(rename = "missingSLA")]
    MissingSla,
}

impl GapType {
    pub fn all() -> &'static [GapType] {
        &[
            GapType::MissingInfo,
            GapType::UndefinedRole,
            GapType::MissingDecision,
            GapType::UnclearHandoff,
            GapType::IncompleteStep,
            GapType::Contradiction,
            GapType::MissingSla,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GapType::MissingInfo => "missingInfo",
            GapType::UndefinedRole => "undefinedRole",
            GapType::MissingDecision => "missingDecision",
            GapType::UnclearHandoff => "unclearHandoff",
            GapType::IncompleteStep => "incompleteStep",
            GapType::Contradiction => "contradiction",
            GapType::MissingSla => "missingSLA",
        }
    }
}

impl fmt::Display for GapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Gap severity. Declaration order gives `Low < Medium < High < Critical`,
/// so `>=` is a threshold filter and sorting descending puts critical first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn all() -> &'static [Severity] {
        &[
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ProcflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(ProcflowError::InvalidArgument(format!(
                "unknown severity '{s}' (expected critical, high, medium or low)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ImpactLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Massive,
    High,
    Medium,
    Low,
    Minimal,
}

impl ImpactLevel {
    pub fn multiplier(self) -> f64 {
        match self {
            ImpactLevel::Massive => 3.0,
            ImpactLevel::High => 2.0,
            ImpactLevel::Medium => 1.0,
            ImpactLevel::Low => 0.5,
            ImpactLevel::Minimal => 0.25,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImpactLevel::Massive => "massive",
            ImpactLevel::High => "high",
            ImpactLevel::Medium => "medium",
            ImpactLevel::Low => "low",
            ImpactLevel::Minimal => "minimal",
        }
    }
}

impl fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    QuickWin,
    BigBet,
    FillIn,
    MoneyPit,
}

impl Category {
    /// Roadmap bucket order.
    pub fn all() -> &'static [Category] {
        &[
            Category::QuickWin,
            Category::BigBet,
            Category::FillIn,
            Category::MoneyPit,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::QuickWin => "quickWin",
            Category::BigBet => "bigBet",
            Category::FillIn => "fillIn",
            Category::MoneyPit => "moneyPit",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::QuickWin => "Quick wins",
            Category::BigBet => "Big bets",
            Category::FillIn => "Fill-ins",
            Category::MoneyPit => "Money pits",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
