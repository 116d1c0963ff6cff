//! Model alias resolution.
//!
//! Agents accept both concrete model ids (`claude-sonnet-4-5-20250929`) and
//! tier names (`sonnet`). A [`ModelRegistry`] enriches a flat id list with tier,
//! version and alias information and maps tier names to the newest model.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;

use crate::ModelInfo;

/// Tier keywords recognised in model ids
pub const TIER_KEYWORDS: &[&str] = &["opus", "sonnet", "haiku"];

/// Claude models known at build time, used when the config lists none
pub const CLAUDE_MODELS: &[&str] = &[
    "claude-opus-4-1-20250805",
    "claude-opus-4-20250514",
    "claude-sonnet-4-5-20250929",
    "claude-sonnet-4-20250514",
    "claude-3-7-sonnet-20250219",
    "claude-haiku-4-5-20251001",
    "claude-3-5-haiku-20241022",
];

pub const CLAUDE_DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

pub const CODEX_MODELS: &[&str] = &["gpt-5-codex", "gpt-5", "o3", "o4-mini"];

pub const CODEX_DEFAULT_MODEL: &str = "gpt-5-codex";

// The minor part is one or two digits so that date suffixes
// ("opus-4-20250514") are not read as a minor version.
static MAJOR_MINOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)[-.](\d{1,2})(?:\D|$)").expect("version regex is valid"));

static MAJOR_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("number regex is valid"));

/// First tier keyword contained in `id`
pub fn derive_tier(id: &str) -> Option<String> {
    let lower = id.to_lowercase();
    TIER_KEYWORDS
        .iter()
        .find(|tier| lower.contains(*tier))
        .map(|tier| tier.to_string())
}

/// "major.minor" from an `N-M`/`N.M` pair, else the first bare integer, else "0"
pub fn derive_version(id: &str) -> String {
    if let Some(caps) = MAJOR_MINOR.captures(id) {
        return format!("{}.{}", &caps[1], &caps[2]);
    }
    MAJOR_ONLY
        .find(id)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "0".to_string())
}

fn parse_version(version: &str) -> Version {
    let mut parts = version.split('.');
    let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Version::new(major, minor, 0)
}

/// Total order on derived versions: major, then minor (missing minor is 0)
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    parse_version(a).cmp(&parse_version(b))
}

/// Derive tier/version, sort newest first and assign one alias per tier.
///
/// Running this on its own output yields the same assignment.
pub fn enrich_models(models: Vec<ModelInfo>) -> Vec<ModelInfo> {
    let mut models: Vec<ModelInfo> = models
        .into_iter()
        .map(|m| ModelInfo {
            tier: derive_tier(&m.id),
            version: derive_version(&m.id),
            alias: None,
            is_legacy: false,
            id: m.id,
        })
        .collect();

    // Stable: equal versions keep their input order.
    models.sort_by(|a, b| compare_versions(&b.version, &a.version));

    let mut seen_tiers: Vec<String> = Vec::new();
    for model in &mut models {
        let Some(tier) = model.tier.clone() else {
            continue;
        };
        if seen_tiers.contains(&tier) {
            model.is_legacy = true;
        } else {
            model.alias = Some(tier.clone());
            seen_tiers.push(tier);
        }
    }
    models
}

/// Enriched model list plus the agent's default model
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelInfo>,
    default_model: Option<String>,
}

impl ModelRegistry {
    pub fn new<I, S>(ids: I, default_model: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let models = ids.into_iter().map(|id| ModelInfo::new(id)).collect();
        Self {
            models: enrich_models(models),
            default_model,
        }
    }

    pub fn models(&self) -> &[ModelInfo] {
        &self.models
    }

    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    /// Map user input to a concrete model id.
    ///
    /// Input containing a path or version separator is a literal id and passes
    /// through. Otherwise the newest model whose alias, tier or id matches wins,
    /// then the default model, then the input itself.
    pub fn resolve(&self, input: &str) -> String {
        let input = input.trim();
        if input.contains(['/', '-', '.', ':']) {
            return input.to_string();
        }

        let wanted = input.to_lowercase();
        if !wanted.is_empty() {
            let hit = self.models.iter().find(|m| {
                m.alias.as_deref() == Some(wanted.as_str())
                    || m.tier.as_deref() == Some(wanted.as_str())
                    || m.id.to_lowercase().contains(&wanted)
            });
            if let Some(model) = hit {
                return model.id.clone();
            }
        }

        self.default_model
            .clone()
            .unwrap_or_else(|| input.to_string())
    }
}
