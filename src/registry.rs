// 🚗 Fleet Registry - canonical vehicles and drivers
// El pipeline lee snapshots; nunca crea ni modifica entidades. Altas y
// bajas de flota viven fuera, en el archivo JSON que administra operaciones.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// ENTITIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalVehicle {
    pub id: String,
    pub plate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDriver {
    pub id: String,
    pub name: String,
}

/// Point-in-time view of the fleet. Cheap to clone, safe to hold across
/// a whole batch so every candidate reconciles against the same fleet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub vehicles: Vec<CanonicalVehicle>,
    pub drivers: Vec<CanonicalDriver>,
}

impl RegistrySnapshot {
    pub fn new(vehicles: Vec<CanonicalVehicle>, drivers: Vec<CanonicalDriver>) -> Self {
        RegistrySnapshot { vehicles, drivers }
    }

    pub fn vehicle_by_id(&self, id: &str) -> Option<&CanonicalVehicle> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    pub fn driver_by_id(&self, id: &str) -> Option<&CanonicalDriver> {
        self.drivers.iter().find(|d| d.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty() && self.drivers.is_empty()
    }
}

// ============================================================================
// PROVIDERS
// ============================================================================

/// Source of registry snapshots.
pub trait RegistryProvider: Send + Sync {
    fn snapshot(&self) -> Result<RegistrySnapshot>;
}

/// Registry backed by a JSON file on disk.
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileRegistry {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RegistryProvider for FileRegistry {
    fn snapshot(&self) -> Result<RegistrySnapshot> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read registry: {}", self.path.display()))?;
        let snapshot: RegistrySnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Malformed registry: {}", self.path.display()))?;
        Ok(snapshot)
    }
}

/// In-memory provider for tests and manual batches.
pub struct StaticRegistry {
    snapshot: RegistrySnapshot,
}

impl StaticRegistry {
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        StaticRegistry { snapshot }
    }
}

impl RegistryProvider for StaticRegistry {
    fn snapshot(&self) -> Result<RegistrySnapshot> {
        Ok(self.snapshot.clone())
    }
}

// ============================================================================
// STARTER REGISTRY
// ============================================================================

/// Write a starter fleet so a new installation has something to edit.
pub fn write_starter_registry<P: AsRef<Path>>(path: P) -> Result<RegistrySnapshot> {
    let path = path.as_ref();
    let snapshot = starter_snapshot();

    let content = serde_json::to_string_pretty(&snapshot)
        .context("Failed to serialize starter registry")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write registry: {}", path.display()))?;

    Ok(snapshot)
}

fn starter_snapshot() -> RegistrySnapshot {
    let vehicles = ["ABC-123", "DEF-789", "XYZ-987", "JKL-321"]
        .iter()
        .map(|plate| CanonicalVehicle {
            id: uuid::Uuid::new_v4().to_string(),
            plate: plate.to_string(),
        })
        .collect();

    let drivers = [
        "Juan Perez",
        "Pedro Ramirez",
        "Maria Lopez",
        "Luis Hernandez",
        "Ana Torres",
    ]
    .iter()
    .map(|name| CanonicalDriver {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
    })
    .collect();

    RegistrySnapshot::new(vehicles, drivers)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starter_registry_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "custodia_registry_{}.json",
            uuid::Uuid::new_v4()
        ));

        let written = write_starter_registry(&path).unwrap();
        let loaded = FileRegistry::new(&path).snapshot().unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(written, loaded);
        assert_eq!(loaded.vehicles.len(), 4);
        assert_eq!(loaded.drivers.len(), 5);
    }

    #[test]
    fn test_static_registry_returns_snapshot() {
        let snapshot = RegistrySnapshot::new(
            vec![CanonicalVehicle {
                id: "v1".to_string(),
                plate: "ABC-123".to_string(),
            }],
            vec![],
        );

        let provider = StaticRegistry::new(snapshot.clone());
        assert_eq!(provider.snapshot().unwrap(), snapshot);
    }

    #[test]
    fn test_lookups_by_id() {
        let snapshot = RegistrySnapshot::new(
            vec![CanonicalVehicle {
                id: "v1".to_string(),
                plate: "ABC-123".to_string(),
            }],
            vec![CanonicalDriver {
                id: "d1".to_string(),
                name: "Juan Perez".to_string(),
            }],
        );

        assert_eq!(snapshot.vehicle_by_id("v1").unwrap().plate, "ABC-123");
        assert_eq!(snapshot.driver_by_id("d1").unwrap().name, "Juan Perez");
        assert!(snapshot.vehicle_by_id("v2").is_none());
        assert!(!snapshot.is_empty());
        assert!(RegistrySnapshot::default().is_empty());
    }

    #[test]
    fn test_file_registry_missing_file_errors() {
        let provider = FileRegistry::new("/no/existe/fleet.json");
        assert!(provider.snapshot().is_err());
    }
}
