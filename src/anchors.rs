use nalgebra::Point2;

use crate::error::{LocatorError, Result};
use crate::types::AnchorId;

/// Fixed mapping from anchor identifier to its surveyed 2-D position.
///
/// Built once at startup and never mutated afterwards. Insertion order is
/// significant: it defines the reading order inside an aggregated
/// observation. The set is small (a handful of anchors), so lookups are a
/// linear scan.
#[derive(Clone, Debug)]
pub struct AnchorRegistry {
    anchors: Vec<(AnchorId, Point2<f64>)>,
}

impl AnchorRegistry {
    /// Build a registry from `(id, position)` pairs. Ids must be distinct.
    pub fn new<I, S>(anchors: I) -> Self
    where
        I: IntoIterator<Item = (S, (f64, f64))>,
        S: Into<AnchorId>,
    {
        AnchorRegistry {
            anchors: anchors
                .into_iter()
                .map(|(id, (x, y))| (id.into(), Point2::new(x, y)))
                .collect(),
        }
    }

    /// The two-anchor deployment the locator was originally surveyed for.
    pub fn reference_pair() -> Self {
        Self::new([("A9CF", (0.0, 3.04)), ("F95B", (0.0, 0.0))])
    }

    /// Position of the given anchor, or `UnknownAnchor` if it is not tracked.
    pub fn lookup(&self, anchor: &str) -> Result<Point2<f64>> {
        self.anchors
            .iter()
            .find(|(id, _)| id == anchor)
            .map(|(_, position)| *position)
            .ok_or_else(|| LocatorError::UnknownAnchor(anchor.to_string()))
    }

    pub fn contains(&self, anchor: &str) -> bool {
        self.anchors.iter().any(|(id, _)| id == anchor)
    }

    /// Tracked anchor ids in registry order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.anchors.iter().map(|(id, _)| id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Point2<f64>)> {
        self.anchors.iter().map(|(id, position)| (id.as_str(), position))
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_anchor() {
        let registry = AnchorRegistry::reference_pair();
        let position = registry.lookup("A9CF").unwrap();
        assert_eq!(position, Point2::new(0.0, 3.04));
    }

    #[test]
    fn test_lookup_unknown_anchor() {
        let registry = AnchorRegistry::reference_pair();
        match registry.lookup("BEEF") {
            Err(LocatorError::UnknownAnchor(id)) => assert_eq!(id, "BEEF"),
            other => panic!("expected UnknownAnchor, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_order_is_insertion_order() {
        let registry = AnchorRegistry::new([("B", (1.0, 0.0)), ("A", (0.0, 1.0))]);
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(ids, vec!["B", "A"]);
    }
}
