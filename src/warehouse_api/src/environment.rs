//! Deployment environment detection.
//!
//! The environment decides which connection target the live repositories use,
//! so it is resolved exactly once by the composition root and then passed
//! around by value. Requests never re-derive it.
//!
//! Precedence (first match wins):
//! 1. the `ENVIRONMENT` variable, mapped through a synonym table
//!    (`dev`/`local`, `stage`/`test`, `prod`/`live`, plus the full names);
//! 2. hostname fragments ([`HostRules`]), staging before production;
//! 3. [`EnvironmentTag::Development`].
//!
//! Unknown contexts land on development on purpose: development has no
//! production connection target, so the resolver can never silently point a
//! misconfigured host at production data.

use std::fmt;

use serde::{Deserialize, Serialize};
use shared_utils::env::get_env_var_opt;
use tracing::{info, warn};

/// Name of the variable holding an explicit environment.
pub const ENVIRONMENT_VAR: &str = "ENVIRONMENT";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentTag {
    /// Developer machines and anything unrecognised.
    Development,
    /// Pre-production servers.
    Staging,
    /// Production servers.
    Production,
}

impl EnvironmentTag {
    /// Canonical lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Maps an explicit value through the synonym table (case-insensitive).
    pub fn from_synonym(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Some(Self::Development),
            "staging" | "stage" | "test" => Some(Self::Staging),
            "production" | "prod" | "live" => Some(Self::Production),
            _ => None,
        }
    }
}

impl fmt::Display for EnvironmentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule produced the resolved environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentSource {
    /// The explicit variable matched a synonym.
    Explicit(String),
    /// A hostname fragment matched.
    Hostname {
        /// Lowercased hostname that was inspected.
        host: String,
        /// Fragment that matched.
        fragment: String,
    },
    /// Nothing matched.
    Default,
}

/// Result of environment resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnvironment {
    /// The resolved tag.
    pub tag: EnvironmentTag,
    /// The rule that produced it.
    pub source: EnvironmentSource,
}

/// Hostname fragments used by the heuristic step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostRules {
    /// Fragments identifying staging hosts.
    pub staging: Vec<String>,
    /// Fragments identifying production hosts.
    pub production: Vec<String>,
}

impl Default for HostRules {
    fn default() -> Self {
        Self {
            staging: vec!["vs81t".into(), "staging".into(), "stage".into()],
            production: vec!["vs84".into(), "prod".into()],
        }
    }
}

impl HostRules {
    fn matching(&self, host: &str) -> Option<(EnvironmentTag, String)> {
        let find = |fragments: &[String]| {
            fragments
                .iter()
                .map(|f| f.trim().to_ascii_lowercase())
                .find(|f| !f.is_empty() && host.contains(f.as_str()))
        };
        if let Some(f) = find(&self.staging) {
            return Some((EnvironmentTag::Staging, f));
        }
        find(&self.production).map(|f| (EnvironmentTag::Production, f))
    }
}

/// Pure resolution over already-gathered inputs.
///
/// `explicit` is the raw `ENVIRONMENT` value (if any), `hostname` the machine
/// name (if it could be read).
pub fn resolve_from(
    explicit: Option<&str>,
    hostname: Option<&str>,
    rules: &HostRules,
) -> ResolvedEnvironment {
    if let Some(raw) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        if let Some(tag) = EnvironmentTag::from_synonym(raw) {
            return ResolvedEnvironment {
                tag,
                source: EnvironmentSource::Explicit(raw.to_string()),
            };
        }
        warn!(value = raw, "unrecognised {ENVIRONMENT_VAR} value, ignoring it");
    }

    if let Some(host) = hostname.map(|h| h.trim().to_ascii_lowercase()) {
        if let Some((tag, fragment)) = rules.matching(&host) {
            return ResolvedEnvironment {
                tag,
                source: EnvironmentSource::Hostname { host, fragment },
            };
        }
    }

    ResolvedEnvironment {
        tag: EnvironmentTag::Development,
        source: EnvironmentSource::Default,
    }
}

/// Resolves the environment from the process environment and the host name.
///
/// Call once at startup and pass the result down.
pub fn resolve(rules: &HostRules) -> ResolvedEnvironment {
    let explicit = get_env_var_opt(ENVIRONMENT_VAR);
    let host = hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned());

    let resolved = resolve_from(explicit.as_deref(), host.as_deref(), rules);
    info!(environment = %resolved.tag, source = ?resolved.source, "resolved deployment environment");
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn explicit_synonyms_win() {
        let rules = HostRules::default();
        for (raw, want) in [
            ("dev", EnvironmentTag::Development),
            ("LOCAL", EnvironmentTag::Development),
            (" Stage ", EnvironmentTag::Staging),
            ("test", EnvironmentTag::Staging),
            ("prod", EnvironmentTag::Production),
            ("Live", EnvironmentTag::Production),
            ("production", EnvironmentTag::Production),
        ] {
            // hostname points elsewhere; explicit value must still win
            let got = resolve_from(Some(raw), Some("server-vs81t.intranet.local"), &rules);
            assert_eq!(got.tag, want, "value {raw:?}");
            assert!(matches!(got.source, EnvironmentSource::Explicit(_)));
        }
    }

    #[test]
    fn unknown_explicit_value_falls_through_to_hostname() {
        let got = resolve_from(
            Some("qa-cluster"),
            Some("SERVER-VS84.intranet.local"),
            &HostRules::default(),
        );
        assert_eq!(got.tag, EnvironmentTag::Production);
        assert_eq!(
            got.source,
            EnvironmentSource::Hostname {
                host: "server-vs84.intranet.local".into(),
                fragment: "vs84".into(),
            }
        );
    }

    #[test]
    fn staging_fragment_beats_production_fragment() {
        // "prod-staging-01" contains both "prod" and "staging"
        let got = resolve_from(None, Some("prod-staging-01"), &HostRules::default());
        assert_eq!(got.tag, EnvironmentTag::Staging);
    }

    #[test]
    fn defaults_to_development() {
        let got = resolve_from(None, Some("laptop-42"), &HostRules::default());
        assert_eq!(got.tag, EnvironmentTag::Development);
        assert_eq!(got.source, EnvironmentSource::Default);

        let got = resolve_from(Some("   "), None, &HostRules::default());
        assert_eq!(got.tag, EnvironmentTag::Development);
    }

    #[test]
    fn empty_fragments_never_match() {
        let rules = HostRules {
            staging: vec![String::new()],
            production: vec!["  ".into()],
        };
        let got = resolve_from(None, Some("anything"), &rules);
        assert_eq!(got.source, EnvironmentSource::Default);
    }

    proptest! {
        #[test]
        fn resolution_is_deterministic(
            explicit in proptest::option::of("[a-zA-Z ]{0,12}"),
            host in proptest::option::of("[a-z0-9.-]{0,24}"),
        ) {
            let rules = HostRules::default();
            let a = resolve_from(explicit.as_deref(), host.as_deref(), &rules);
            let b = resolve_from(explicit.as_deref(), host.as_deref(), &rules);
            prop_assert_eq!(a, b);
        }
    }
}
