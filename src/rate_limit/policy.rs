use super::types::{EndpointCategory, PolicyEntry, Tier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-category limits for a single tier
pub type TierPolicies = HashMap<EndpointCategory, PolicyEntry>;

/// Last-resort entry when the table has neither the tier nor anonymous/default
const FALLBACK_ENTRY: PolicyEntry = PolicyEntry::new(30, 60);

/// Immutable mapping from (tier, endpoint category) to a limit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct PolicyTable {
    tiers: HashMap<Tier, TierPolicies>,
}

impl PolicyTable {
    pub fn new(tiers: HashMap<Tier, TierPolicies>) -> Self {
        Self { tiers }
    }

    /// Resolve the policy for a tier and request path.
    ///
    /// A missing tier falls back to the anonymous table. A missing category
    /// falls back to the tier's `default` entry, then to anonymous.
    pub fn lookup(&self, tier: Tier, path: &str) -> PolicyEntry {
        self.entry(tier, EndpointCategory::from_path(path))
    }

    /// Resolve the policy for an already classified category
    pub fn entry(&self, tier: Tier, category: EndpointCategory) -> PolicyEntry {
        self.find(tier, category)
            .or_else(|| self.find(Tier::Anonymous, category))
            .unwrap_or(FALLBACK_ENTRY)
    }

    fn find(&self, tier: Tier, category: EndpointCategory) -> Option<PolicyEntry> {
        let policies = self.tiers.get(&tier)?;
        policies
            .get(&category)
            .or_else(|| policies.get(&EndpointCategory::Default))
            .copied()
    }

    /// Iterate over every configured entry
    pub fn entries(&self) -> impl Iterator<Item = (Tier, EndpointCategory, PolicyEntry)> + '_ {
        self.tiers.iter().flat_map(|(tier, policies)| {
            policies
                .iter()
                .map(move |(category, entry)| (*tier, *category, *entry))
        })
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        let table: [(Tier, [(u32, u64); 4]); 4] = [
            (Tier::Anonymous, [(5, 3600), (0, 3600), (60, 60), (30, 60)]),
            (Tier::Free, [(20, 3600), (10, 3600), (120, 60), (60, 60)]),
            (Tier::Pro, [(100, 3600), (50, 3600), (300, 60), (200, 60)]),
            (
                Tier::Enterprise,
                [(1000, 3600), (500, 3600), (1000, 60), (1000, 60)],
            ),
        ];

        let categories = [
            EndpointCategory::Generate,
            EndpointCategory::Export,
            EndpointCategory::Status,
            EndpointCategory::Default,
        ];

        let tiers = table
            .into_iter()
            .map(|(tier, limits)| {
                let policies = categories
                    .into_iter()
                    .zip(limits)
                    .map(|(category, (limit, window_secs))| {
                        (category, PolicyEntry::new(limit, window_secs))
                    })
                    .collect();
                (tier, policies)
            })
            .collect();

        Self { tiers }
    }
}

/// Stricter fixed policy for sensitive administrative paths
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminPolicy {
    /// Requests allowed per window
    #[serde(default = "default_admin_limit")]
    pub limit: u32,
    /// Window length in seconds
    #[serde(default = "default_admin_window")]
    pub window_secs: u64,
    /// Path prefixes the strict policy applies to
    #[serde(default = "default_admin_paths")]
    pub paths: Vec<String>,
}

fn default_admin_limit() -> u32 {
    10
}

fn default_admin_window() -> u64 {
    60
}

fn default_admin_paths() -> Vec<String> {
    vec!["/admin".to_string()]
}

impl Default for AdminPolicy {
    fn default() -> Self {
        Self {
            limit: default_admin_limit(),
            window_secs: default_admin_window(),
            paths: default_admin_paths(),
        }
    }
}

impl AdminPolicy {
    /// Whether a path falls under the strict policy
    pub fn applies_to(&self, path: &str) -> bool {
        self.paths.iter().any(|prefix| {
            path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn entry(&self) -> PolicyEntry {
        PolicyEntry::new(self.limit, self.window_secs)
    }
}
