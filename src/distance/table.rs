use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::DistanceRouteConfig;

use super::DistanceProvider;

/// A fixed table of place-to-place distances.
///
/// Store labels such as "B&Q New York" are resolved to a known place by their
/// trailing words, so any store in a known town shares that town's distances.
pub struct StaticDistanceTable {
    routes: HashMap<(String, String), f64>,
    /// Known place names, longest first so "new york" wins over "york".
    places: Vec<String>,
}

impl StaticDistanceTable {
    pub fn from_routes(routes: &[DistanceRouteConfig]) -> Self {
        let mut table = HashMap::new();
        let mut places: Vec<String> = Vec::new();

        for route in routes {
            let from = normalize(&route.from);
            let to = normalize(&route.to);
            if from.is_empty() || to.is_empty() {
                continue;
            }
            for place in [&from, &to] {
                if !places.contains(place) {
                    places.push(place.clone());
                }
            }
            table.insert((from, to), route.km);
        }

        places.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        tracing::info!(
            routes = table.len(),
            places = places.len(),
            "Loaded static distance table"
        );
        Self {
            routes: table,
            places,
        }
    }

    /// Resolve a store label to the longest known place it ends with.
    fn resolve(&self, label: &str) -> Option<&str> {
        let label = normalize(label);
        self.places
            .iter()
            .find(|place| {
                label == **place
                    || label
                        .strip_suffix(place.as_str())
                        .is_some_and(|head| head.ends_with(' '))
            })
            .map(|p| p.as_str())
    }

    pub fn lookup(&self, from: &str, to: &str) -> Option<f64> {
        if normalize(from) == normalize(to) {
            return Some(0.0);
        }

        let a = self.resolve(from)?;
        let b = self.resolve(to)?;
        if a == b {
            return Some(0.0);
        }

        self.routes
            .get(&(a.to_string(), b.to_string()))
            .or_else(|| self.routes.get(&(b.to_string(), a.to_string())))
            .copied()
    }
}

#[async_trait]
impl DistanceProvider for StaticDistanceTable {
    async fn distance_km(&self, from: &str, to: &str) -> eyre::Result<Option<f64>> {
        Ok(self.lookup(from, to))
    }
}

/// Lowercase and collapse runs of whitespace.
fn normalize(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
