//! Passthrough route table.
//!
//! An included route (`/api/Concept/operation`) calls the concept operation
//! directly. Everything else becomes a `Requesting.request` and is answered
//! by rules. Each inclusion carries the reason it is safe to expose.

use std::collections::{BTreeMap, BTreeSet};

use waypoint_engine::Registry;

#[derive(Debug, Clone, Default)]
pub struct PassthroughRoutes {
    inclusions: BTreeMap<String, String>,
    exclusions: BTreeSet<String>,
}

impl PassthroughRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, route: impl Into<String>, justification: impl Into<String>) -> Self {
        self.inclusions.insert(route.into(), justification.into());
        self
    }

    pub fn exclude(mut self, route: impl Into<String>) -> Self {
        self.exclusions.insert(route.into());
        self
    }

    /// Excluded routes may be listed with or without the base prefix.
    pub fn is_excluded(&self, base_url: &str, path: &str) -> bool {
        self.exclusions.contains(path) || self.exclusions.contains(&format!("{base_url}{path}"))
    }

    /// Why an included route is exposed; `None` unless it is included.
    pub fn justification(&self, full_path: &str) -> Option<&str> {
        if self.exclusions.contains(full_path) {
            return None;
        }
        self.inclusions.get(full_path).map(String::as_str)
    }

    pub fn inclusions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inclusions.iter().map(|(r, j)| (r.as_str(), j.as_str()))
    }

    pub fn exclusions(&self) -> impl Iterator<Item = &str> {
        self.exclusions.iter().map(String::as_str)
    }

    /// Registered operations that are neither included nor excluded. These
    /// fall back to `Requesting.request`, which is safe but usually means
    /// the table is out of date.
    pub fn unverified(&self, base_url: &str, registry: &Registry) -> Vec<String> {
        registry
            .operations()
            .map(|(_, qualified, _)| route_for(base_url, qualified))
            .filter(|route| !self.inclusions.contains_key(route) && !self.exclusions.contains(route))
            .collect()
    }
}

/// `Concept.operation` → `{base}/Concept/operation`.
pub fn route_for(base_url: &str, qualified: &str) -> String {
    format!("{base_url}/{}", qualified.replacen('.', "/", 1))
}

/// `/Concept/operation` → `Concept.operation`.
pub fn operation_for(path: &str) -> Option<String> {
    let (concept, operation) = path.strip_prefix('/')?.split_once('/')?;
    if concept.is_empty() || operation.is_empty() || operation.contains('/') {
        return None;
    }
    Some(format!("{concept}.{operation}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_map_to_operations() {
        assert_eq!(operation_for("/TripPlanning/create").as_deref(), Some("TripPlanning.create"));
        assert_eq!(operation_for("/TripPlanning"), None);
        assert_eq!(operation_for("/a/b/c"), None);
        assert_eq!(route_for("/api", "Polling._getPoll"), "/api/Polling/_getPoll");
    }

    #[test]
    fn exclusion_overrides_inclusion() {
        let routes = PassthroughRoutes::new()
            .include("/api/Session/create", "sessions for auth")
            .include("/api/TripPlanning/delete", "oops")
            .exclude("/api/TripPlanning/delete");

        assert!(routes.is_excluded("/api", "/TripPlanning/delete"));
        assert_eq!(routes.justification("/api/Session/create"), Some("sessions for auth"));
        assert_eq!(routes.justification("/api/TripPlanning/delete"), None);
    }
}
