//! Campaign health taxonomy.
//!
//! The four categories are fixed; only their presentation (display name, icon,
//! description) can be configured. The [`CategoryCatalog`] is built once from
//! configuration at startup and handed to every component that renders or
//! validates categories.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::CategoryOverride;

/// Health category assigned to a campaign.
///
/// Declaration order is the tie-break priority used when free text carries
/// cues for more than one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCategory {
    Healthy,
    MightNeedAttention,
    NeedAttentionPositive,
    NeedAttentionNegative,
}

impl HealthCategory {
    /// All categories in priority order.
    pub const ALL: [HealthCategory; 4] = [
        HealthCategory::Healthy,
        HealthCategory::MightNeedAttention,
        HealthCategory::NeedAttentionPositive,
        HealthCategory::NeedAttentionNegative,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HealthCategory::Healthy => "healthy",
            HealthCategory::MightNeedAttention => "might_need_attention",
            HealthCategory::NeedAttentionPositive => "need_attention_positive",
            HealthCategory::NeedAttentionNegative => "need_attention_negative",
        }
    }

    fn default_info(self) -> CategoryInfo {
        let (name, icon, description) = match self {
            HealthCategory::Healthy => (
                "Campaign Healthy",
                "🟢",
                "Campaign is performing well, budget on track, client satisfied",
            ),
            HealthCategory::MightNeedAttention => (
                "Monitoring Needed",
                "🟡",
                "Campaign shows some indicators that warrant closer monitoring or optimization",
            ),
            HealthCategory::NeedAttentionPositive => (
                "Action Needed - Growth Opportunity",
                "🟠",
                "Campaign needs attention but shows positive indicators for scaling or expansion",
            ),
            HealthCategory::NeedAttentionNegative => (
                "Action Needed - Risk Management",
                "🔴",
                "Campaign requires immediate attention due to budget, performance, or client satisfaction concerns",
            ),
        };
        CategoryInfo {
            key: self,
            name: name.to_string(),
            icon: icon.to_string(),
            description: description.to_string(),
        }
    }
}

impl fmt::Display for HealthCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown health category: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for HealthCategory {
    type Err = UnknownCategory;

    /// Accepts the canonical key with any case and with spaces or hyphens in
    /// place of underscores (`"Might need attention"`, `"need-attention-negative"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .to_lowercase()
            .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_");

        HealthCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Presentation metadata for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub key: HealthCategory,
    pub name: String,
    pub icon: String,
    pub description: String,
}

/// Immutable table of category metadata, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCatalog {
    entries: Vec<CategoryInfo>,
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        Self {
            entries: HealthCategory::ALL
                .iter()
                .map(|c| c.default_info())
                .collect(),
        }
    }
}

impl CategoryCatalog {
    /// Apply configured presentation overrides on top of the defaults.
    pub fn from_overrides(overrides: &[CategoryOverride]) -> Self {
        let mut catalog = Self::default();
        for o in overrides {
            if let Some(entry) = catalog.entries.iter_mut().find(|e| e.key == o.key) {
                if let Some(name) = &o.name {
                    entry.name = name.clone();
                }
                if let Some(icon) = &o.icon {
                    entry.icon = icon.clone();
                }
                if let Some(description) = &o.description {
                    entry.description = description.clone();
                }
            }
        }
        catalog
    }

    pub fn get(&self, category: HealthCategory) -> &CategoryInfo {
        // entries always holds every variant in ALL order
        &self.entries[category as usize]
    }

    pub fn entries(&self) -> &[CategoryInfo] {
        &self.entries
    }
}
