//! Category routing
//!
//! Maps each classification category to the external endpoint that answers
//! sub-queries of that category. A [`RouteTable`] is built once at startup and
//! shared read-only (behind an `Arc`) by every pipeline run.

use crate::config::{ConfigError, RoutesConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// Classification label that decides where a sub-query is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Ontological functional dependency: entities, attributes, dependencies
    #[serde(rename = "OFD")]
    Ofd,
    /// Temporal knowledge graph: time-based reasoning and event progression
    #[serde(rename = "TKG")]
    Tkg,
    /// Cause-and-effect, counterfactual and intervention questions
    #[serde(rename = "CAUSAL")]
    Causal,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Ofd, Category::Tkg, Category::Causal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ofd => "OFD",
            Category::Tkg => "TKG",
            Category::Causal => "CAUSAL",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = strip_quotes(s).trim_matches(|c: char| c == '*' || c == '`');
        match label.to_ascii_uppercase().as_str() {
            "OFD" => Ok(Category::Ofd),
            "TKG" => Ok(Category::Tkg),
            "CAUSAL" => Ok(Category::Causal),
            _ => Err(UnknownCategory(s.trim().to_string())),
        }
    }
}

/// Trim whitespace and stray quote characters left over from free-text formatting
pub fn strip_quotes(s: &str) -> &str {
    s.trim().trim_matches(|c: char| c == '\'' || c == '"').trim()
}

/// Normalize a configured or classifier-supplied endpoint string
pub fn normalize_endpoint(raw: &str) -> String {
    strip_quotes(raw).to_string()
}

/// Endpoint bound to a category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub category: Category,
    pub endpoint: Url,
}

/// Immutable category → route mapping
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: BTreeMap<Category, Route>,
}

impl RouteTable {
    /// Build the table from configuration, requiring a route for every category
    pub fn from_config(config: &RoutesConfig) -> Result<Self, ConfigError> {
        let mut routes = BTreeMap::new();
        for category in Category::ALL {
            let raw = config
                .get(category)
                .ok_or(ConfigError::MissingRoute(category))?;
            let endpoint = parse_endpoint(category, raw)?;
            routes.insert(category, Route { category, endpoint });
        }
        Ok(Self { routes })
    }

    /// Build a possibly partial table; categories without a route fail to resolve
    pub fn from_routes<I, S>(routes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (Category, S)>,
        S: AsRef<str>,
    {
        let mut table = BTreeMap::new();
        for (category, raw) in routes {
            let endpoint = parse_endpoint(category, raw.as_ref())?;
            table.insert(category, Route { category, endpoint });
        }
        Ok(Self { routes: table })
    }

    pub fn resolve(&self, category: Category) -> Result<&Route, UnknownCategory> {
        self.routes
            .get(&category)
            .ok_or_else(|| UnknownCategory(category.to_string()))
    }

    /// Resolve a classifier label such as `"TKG"` or `"'causal'"`
    pub fn resolve_label(&self, label: &str) -> Result<&Route, UnknownCategory> {
        let category = label.parse::<Category>()?;
        self.resolve(category)
            .map_err(|_| UnknownCategory(label.trim().to_string()))
    }

    pub fn is_complete(&self) -> bool {
        Category::ALL.iter().all(|c| self.routes.contains_key(c))
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn parse_endpoint(category: Category, raw: &str) -> Result<Url, ConfigError> {
    let normalized = normalize_endpoint(raw);
    let invalid = |reason: String| ConfigError::InvalidEndpoint {
        category,
        endpoint: raw.to_string(),
        reason,
    };

    let url = Url::parse(&normalized).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}
