//! Transitive type-hierarchy index.
//!
//! Built once from the declared conformance edges when a store opens, by
//! iterative fixed-point merge: each type's set absorbs the sets of the
//! types it conforms to until no set grows.

use std::collections::{BTreeSet, HashMap};
use tessera_types::EntityType;

/// `EntityType → set<EntityType>` transitive closure.
#[derive(Debug, Clone, Default)]
pub struct ConformanceMap {
    map: HashMap<EntityType, BTreeSet<EntityType>>,
}

impl ConformanceMap {
    /// Builds the closure from direct conformance edges.
    #[must_use]
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (EntityType, Vec<EntityType>)>,
    {
        let mut map: HashMap<EntityType, BTreeSet<EntityType>> = HashMap::new();
        for (entity_type, parents) in edges {
            map.entry(entity_type).or_default().extend(parents);
        }

        // Fixed point: merge each type's parents' sets until nothing grows.
        loop {
            let mut grew = false;
            let types: Vec<EntityType> = map.keys().cloned().collect();
            for t in &types {
                let parents: Vec<EntityType> = map[t].iter().cloned().collect();
                for parent in parents {
                    let inherited: Vec<EntityType> = match map.get(&parent) {
                        Some(set) => set.iter().cloned().collect(),
                        None => continue,
                    };
                    let set = map.get_mut(t).expect("type present");
                    for conformed in inherited {
                        grew |= set.insert(conformed);
                    }
                }
            }
            if !grew {
                break;
            }
        }

        Self { map }
    }

    /// True if `entity_type` conforms to `target` (every type conforms to
    /// itself).
    #[must_use]
    pub fn conforms_to(&self, entity_type: &EntityType, target: &EntityType) -> bool {
        entity_type == target
            || self
                .map
                .get(entity_type)
                .is_some_and(|set| set.contains(target))
    }

    /// The full set of types `entity_type` conforms to, excluding itself.
    /// Empty for types with no declared conformances.
    #[must_use]
    pub fn conformances(&self, entity_type: &EntityType) -> BTreeSet<EntityType> {
        self.map.get(entity_type).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> EntityType {
        EntityType::from(s)
    }

    fn sample() -> ConformanceMap {
        ConformanceMap::from_edges([
            (t("employee"), vec![t("person")]),
            (t("manager"), vec![t("employee")]),
            (t("person"), vec![t("record")]),
        ])
    }

    #[test]
    fn direct_conformance() {
        let map = sample();
        assert!(map.conforms_to(&t("employee"), &t("person")));
    }

    #[test]
    fn transitive_conformance() {
        let map = sample();
        assert!(map.conforms_to(&t("manager"), &t("person")));
        assert!(map.conforms_to(&t("manager"), &t("record")));
    }

    #[test]
    fn conformance_is_directional() {
        let map = sample();
        assert!(!map.conforms_to(&t("person"), &t("manager")));
    }

    #[test]
    fn every_type_conforms_to_itself() {
        let map = sample();
        assert!(map.conforms_to(&t("manager"), &t("manager")));
        assert!(map.conforms_to(&t("undeclared"), &t("undeclared")));
    }

    #[test]
    fn conformances_excludes_unrelated() {
        let map = sample();
        let set = map.conformances(&t("manager"));
        assert_eq!(set.len(), 3);
        assert!(set.contains(&t("employee")));
        assert!(set.contains(&t("person")));
        assert!(set.contains(&t("record")));
    }

    #[test]
    fn cycles_terminate() {
        let map = ConformanceMap::from_edges([
            (t("a"), vec![t("b")]),
            (t("b"), vec![t("a")]),
        ]);
        assert!(map.conforms_to(&t("a"), &t("b")));
        assert!(map.conforms_to(&t("b"), &t("a")));
    }

    #[test]
    fn empty_map_only_self_conforms() {
        let map = ConformanceMap::from_edges([]);
        assert!(map.conforms_to(&t("x"), &t("x")));
        assert!(!map.conforms_to(&t("x"), &t("y")));
    }
}
