// ⚖️ Reconciliation Engine - resolve candidates against the fleet registry
// Nunca falla: lo que no resuelve sale como sugerencias para el operador.

use serde::{Deserialize, Serialize};

use crate::normalize::{compact_plate, normalize_plate, normalize_token};
use crate::patterns::TransferCandidate;
use crate::registry::{CanonicalDriver, CanonicalVehicle, RegistrySnapshot};

// ============================================================================
// RESULTS
// ============================================================================

/// Which slot of a reconciled transfer a manual override targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideRole {
    Vehicle,
    FromDriver,
    ToDriver,
}

/// Ranked alternatives for the roles that did not resolve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchSuggestions {
    pub vehicle: Vec<CanonicalVehicle>,
    pub from_driver: Vec<CanonicalDriver>,
    pub to_driver: Vec<CanonicalDriver>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciledTransfer {
    pub candidate: TransferCandidate,
    pub vehicle_match: Option<CanonicalVehicle>,
    pub from_driver_match: Option<CanonicalDriver>,
    pub to_driver_match: Option<CanonicalDriver>,
    /// Holds iff vehicle and receiving driver are both resolved.
    /// The giving driver is informative and never blocks validity.
    pub is_valid: bool,
    pub suggestions: MatchSuggestions,
}

impl ReconciledTransfer {
    /// Pin a role to a registry entity chosen by the operator.
    /// The only mutation a reconciled transfer admits.
    pub fn apply_override(
        &mut self,
        role: OverrideRole,
        id: &str,
        registry: &RegistrySnapshot,
    ) -> anyhow::Result<()> {
        match role {
            OverrideRole::Vehicle => {
                let vehicle = registry
                    .vehicle_by_id(id)
                    .ok_or_else(|| anyhow::anyhow!("Unknown vehicle id: {}", id))?;
                self.vehicle_match = Some(vehicle.clone());
                self.suggestions.vehicle.clear();
            }
            OverrideRole::FromDriver => {
                let driver = registry
                    .driver_by_id(id)
                    .ok_or_else(|| anyhow::anyhow!("Unknown driver id: {}", id))?;
                self.from_driver_match = Some(driver.clone());
                self.suggestions.from_driver.clear();
            }
            OverrideRole::ToDriver => {
                let driver = registry
                    .driver_by_id(id)
                    .ok_or_else(|| anyhow::anyhow!("Unknown driver id: {}", id))?;
                self.to_driver_match = Some(driver.clone());
                self.suggestions.to_driver.clear();
            }
        }

        self.is_valid = self.vehicle_match.is_some() && self.to_driver_match.is_some();
        Ok(())
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Minimum shared prefix for a plate suggestion (default: 3).
    pub min_prefix_overlap: usize,
    /// Suggestions kept per role (default: 3).
    pub max_suggestions: usize,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            min_prefix_overlap: 3,
            max_suggestions: 3,
        }
    }

    /// Resolve one candidate. Unmatched roles come back with ranked
    /// suggestions instead of an error.
    pub fn reconcile(
        &self,
        candidate: TransferCandidate,
        registry: &RegistrySnapshot,
    ) -> ReconciledTransfer {
        let vehicle_match = match_vehicle(&candidate.vehicle_token, registry);
        let to_driver_match = match_driver(&candidate.to_driver_token, registry);
        let from_driver_match = candidate
            .from_driver_token
            .as_deref()
            .and_then(|token| match_driver(token, registry));

        let mut suggestions = MatchSuggestions::default();
        if vehicle_match.is_none() {
            suggestions.vehicle = self.suggest_vehicles(&candidate.vehicle_token, registry);
        }
        if to_driver_match.is_none() {
            suggestions.to_driver = self.suggest_drivers(&candidate.to_driver_token, registry);
        }
        if from_driver_match.is_none() {
            if let Some(token) = candidate.from_driver_token.as_deref() {
                suggestions.from_driver = self.suggest_drivers(token, registry);
            }
        }

        let is_valid = vehicle_match.is_some() && to_driver_match.is_some();

        ReconciledTransfer {
            candidate,
            vehicle_match,
            from_driver_match,
            to_driver_match,
            is_valid,
            suggestions,
        }
    }

    pub fn reconcile_all(
        &self,
        candidates: Vec<TransferCandidate>,
        registry: &RegistrySnapshot,
    ) -> Vec<ReconciledTransfer> {
        candidates
            .into_iter()
            .map(|candidate| self.reconcile(candidate, registry))
            .collect()
    }

    /// Plates sharing a prefix with the wanted token, best overlap first.
    /// Ties keep registry order; at most max_suggestions survive.
    fn suggest_vehicles(
        &self,
        wanted: &str,
        registry: &RegistrySnapshot,
    ) -> Vec<CanonicalVehicle> {
        let wanted = compact_plate(wanted);
        if wanted.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, &CanonicalVehicle)> = registry
            .vehicles
            .iter()
            .filter_map(|vehicle| {
                let overlap = shared_prefix_len(&compact_plate(&vehicle.plate), &wanted);
                if overlap >= self.min_prefix_overlap {
                    Some((overlap, vehicle))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(self.max_suggestions)
            .map(|(_, vehicle)| vehicle.clone())
            .collect()
    }

    /// Drivers whose first name resembles the wanted token's first word.
    fn suggest_drivers(&self, wanted: &str, registry: &RegistrySnapshot) -> Vec<CanonicalDriver> {
        let wanted = normalize_token(wanted);
        let wanted_first = match wanted.split_whitespace().next() {
            Some(word) => word,
            None => return Vec::new(),
        };

        let mut scored: Vec<(usize, &CanonicalDriver)> = registry
            .drivers
            .iter()
            .filter_map(|driver| {
                let name = normalize_token(&driver.name);
                let first = name.split_whitespace().next().unwrap_or("");
                let overlap = shared_prefix_len(first, wanted_first);
                let exact_first = overlap > 0
                    && overlap == wanted_first.chars().count()
                    && overlap == first.chars().count();
                if overlap >= self.min_prefix_overlap || exact_first {
                    Some((overlap, driver))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(self.max_suggestions)
            .map(|(_, driver)| driver.clone())
            .collect()
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MATCHING
// ============================================================================

fn match_vehicle(wanted: &str, registry: &RegistrySnapshot) -> Option<CanonicalVehicle> {
    let plate = normalize_plate(wanted);
    if plate.is_empty() {
        return None;
    }
    let compact = compact_plate(wanted);

    registry
        .vehicles
        .iter()
        .find(|vehicle| {
            normalize_plate(&vehicle.plate) == plate || compact_plate(&vehicle.plate) == compact
        })
        .cloned()
}

fn match_driver(wanted: &str, registry: &RegistrySnapshot) -> Option<CanonicalDriver> {
    let wanted = normalize_token(wanted);
    if wanted.is_empty() {
        return None;
    }

    // Prefer exact over containment matches.
    let exact = registry
        .drivers
        .iter()
        .find(|driver| normalize_token(&driver.name) == wanted);
    if exact.is_some() {
        return exact.cloned();
    }

    registry
        .drivers
        .iter()
        .find(|driver| {
            let name = normalize_token(&driver.name);
            name.contains(&wanted) || wanted.contains(&name)
        })
        .cloned()
}

fn shared_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(vehicle: &str, from: Option<&str>, to: &str) -> TransferCandidate {
        TransferCandidate {
            vehicle_token: vehicle.to_string(),
            from_driver_token: from.map(|s| s.to_string()),
            to_driver_token: to.to_string(),
            timestamp: None,
            confidence: 0.9,
            pattern_id: "paso_a".to_string(),
            original_text: "test".to_string(),
            line_number: 1,
        }
    }

    fn test_registry() -> RegistrySnapshot {
        RegistrySnapshot::new(
            vec![
                CanonicalVehicle {
                    id: "v1".to_string(),
                    plate: "ABC-123".to_string(),
                },
                CanonicalVehicle {
                    id: "v2".to_string(),
                    plate: "DEF-789".to_string(),
                },
            ],
            vec![
                CanonicalDriver {
                    id: "d1".to_string(),
                    name: "Juan Perez".to_string(),
                },
                CanonicalDriver {
                    id: "d2".to_string(),
                    name: "Pedro Ramirez".to_string(),
                },
            ],
        )
    }

    #[test]
    fn test_plate_match_ignores_separators() {
        let engine = ReconciliationEngine::new();
        let result = engine.reconcile(candidate("abc123", None, "Juan Perez"), &test_registry());

        assert_eq!(result.vehicle_match.as_ref().unwrap().id, "v1");
        assert!(result.is_valid);
    }

    #[test]
    fn test_driver_match_by_containment() {
        let engine = ReconciliationEngine::new();
        let result = engine.reconcile(candidate("ABC-123", None, "Juan"), &test_registry());

        assert_eq!(result.to_driver_match.as_ref().unwrap().id, "d1");
        assert!(result.is_valid);
    }

    #[test]
    fn test_empty_registry_yields_invalid_with_suggestions_empty() {
        let engine = ReconciliationEngine::new();
        let registry = RegistrySnapshot::default();
        let result = engine.reconcile(candidate("ABC-123", None, "Juan Perez"), &registry);

        assert!(result.vehicle_match.is_none());
        assert!(result.to_driver_match.is_none());
        assert!(!result.is_valid);
        assert!(result.suggestions.vehicle.is_empty());
        assert!(result.suggestions.to_driver.is_empty());
        assert!(result.suggestions.vehicle.len() <= 3);
    }

    #[test]
    fn test_vehicle_suggestions_capped_and_ranked() {
        let vehicles = ["ABC-111", "ABC-222", "ABC-333", "ABC-444"]
            .iter()
            .enumerate()
            .map(|(idx, plate)| CanonicalVehicle {
                id: format!("v{}", idx),
                plate: plate.to_string(),
            })
            .collect();
        let registry = RegistrySnapshot::new(vehicles, vec![]);

        let engine = ReconciliationEngine::new();
        let result = engine.reconcile(candidate("ABC-999", None, "Juan"), &registry);

        assert!(result.vehicle_match.is_none());
        assert_eq!(result.suggestions.vehicle.len(), 3);
        // Equal overlap keeps registry order.
        assert_eq!(result.suggestions.vehicle[0].plate, "ABC-111");
    }

    #[test]
    fn test_driver_suggestions_by_first_name() {
        let engine = ReconciliationEngine::new();
        let result = engine.reconcile(candidate("ABC-123", None, "Pedr Gomez"), &test_registry());

        assert!(result.to_driver_match.is_none());
        assert!(!result.is_valid);
        assert_eq!(result.suggestions.to_driver.len(), 1);
        assert_eq!(result.suggestions.to_driver[0].name, "Pedro Ramirez");
    }

    #[test]
    fn test_unmatched_from_driver_never_blocks_validity() {
        let engine = ReconciliationEngine::new();
        let result = engine.reconcile(
            candidate("ABC-123", Some("Desconocido"), "Juan Perez"),
            &test_registry(),
        );

        assert!(result.from_driver_match.is_none());
        assert!(result.is_valid);
    }

    #[test]
    fn test_apply_override_unknown_id_errors() {
        let engine = ReconciliationEngine::new();
        let registry = test_registry();
        let mut result = engine.reconcile(candidate("ZZZ-000", None, "Juan Perez"), &registry);

        assert!(result
            .apply_override(OverrideRole::Vehicle, "no-such-id", &registry)
            .is_err());
        assert!(!result.is_valid);
    }

    #[test]
    fn test_apply_override_resolves_and_revalidates() {
        let engine = ReconciliationEngine::new();
        let registry = test_registry();
        let mut result = engine.reconcile(candidate("ZZZ-000", None, "Juan Perez"), &registry);
        assert!(!result.is_valid);

        result
            .apply_override(OverrideRole::Vehicle, "v2", &registry)
            .unwrap();

        assert_eq!(result.vehicle_match.as_ref().unwrap().plate, "DEF-789");
        assert!(result.suggestions.vehicle.is_empty());
        assert!(result.is_valid);
    }

    #[test]
    fn test_apply_override_pins_receiving_driver() {
        let engine = ReconciliationEngine::new();
        let registry = test_registry();
        let mut result = engine.reconcile(candidate("ABC-123", None, "Desconocido"), &registry);
        assert!(!result.is_valid);

        result
            .apply_override(OverrideRole::ToDriver, "d2", &registry)
            .unwrap();

        assert_eq!(result.to_driver_match.as_ref().unwrap().name, "Pedro Ramirez");
        assert!(result.suggestions.to_driver.is_empty());
        assert!(result.is_valid);
    }
}
