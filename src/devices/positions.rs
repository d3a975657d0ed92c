use crate::core_modules::region::PositionLabel;
use crate::error::StoreError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Binds one fixture to a screen placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureAssignment {
    #[serde(rename = "name")]
    pub fixture_name: String,
    pub position: PositionLabel,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl FixtureAssignment {
    pub fn new(fixture_name: impl Into<String>, position: PositionLabel, enabled: bool) -> Self {
        Self {
            fixture_name: fixture_name.into(),
            position,
            enabled,
        }
    }

    /// True when the fixture should receive mirrored colors.
    pub fn is_mirrored(&self) -> bool {
        self.enabled && self.position.is_mirrored()
    }
}

/// Source of the current fixture placements. Read once per cycle, never cached.
pub trait PositionStore: Send + Sync {
    fn current_assignments(&self) -> Result<Vec<FixtureAssignment>, StoreError>;
}

/// Placements held in memory and replaceable at runtime.
#[derive(Debug, Default)]
pub struct MemoryPositionStore {
    assignments: RwLock<Vec<FixtureAssignment>>,
}

impl MemoryPositionStore {
    pub fn new(assignments: Vec<FixtureAssignment>) -> Self {
        Self {
            assignments: RwLock::new(assignments),
        }
    }

    pub fn replace(&self, assignments: Vec<FixtureAssignment>) {
        *self.assignments.write() = assignments;
    }

    pub fn set_enabled(&self, fixture: &str, enabled: bool) {
        for assignment in self.assignments.write().iter_mut() {
            if assignment.fixture_name == fixture {
                assignment.enabled = enabled;
            }
        }
    }
}

impl PositionStore for MemoryPositionStore {
    fn current_assignments(&self) -> Result<Vec<FixtureAssignment>, StoreError> {
        Ok(self.assignments.read().clone())
    }
}

#[derive(Debug, Deserialize)]
struct PositionsFile {
    #[serde(default)]
    lights: Vec<FixtureAssignment>,
}

/// Placements persisted as `{"lights": [{"name", "position", "enabled"}, ...]}`.
///
/// Any other top-level keys are ignored. A missing or malformed file reads as "no
/// fixtures" so a half-written file never stops the mirroring loop.
#[derive(Debug, Clone)]
pub struct JsonPositionStore {
    path: PathBuf,
}

impl JsonPositionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file, reporting I/O and parse errors.
    pub fn load(&self) -> Result<Vec<FixtureAssignment>, StoreError> {
        let contents = std::fs::read_to_string(&self.path)?;
        let file: PositionsFile = serde_json::from_str(&contents)?;
        Ok(file.lights)
    }
}

impl PositionStore for JsonPositionStore {
    fn current_assignments(&self) -> Result<Vec<FixtureAssignment>, StoreError> {
        match self.load() {
            Ok(assignments) => Ok(assignments),
            Err(StoreError::Io(error)) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "position file missing");
                Ok(Vec::new())
            }
            Err(StoreError::Parse(error)) => {
                warn!(path = %self.path.display(), %error, "position file malformed");
                Ok(Vec::new())
            }
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hue_mirror_{}_{}.json", std::process::id(), name))
    }

    #[test]
    fn parses_persisted_layout() {
        let path = temp_path("layout");
        std::fs::write(
            &path,
            r#"{
                "lights": [
                    {"name": "Hue Play 1", "position": "left", "enabled": true},
                    {"name": "Hue Play 2", "position": "right", "enabled": true},
                    {"name": "Lamp 1", "position": "none", "enabled": true},
                    {"name": "Strip", "position": "top", "enabled": false},
                    {"name": "Iris", "position": "behind-the-couch"}
                ],
                "positions": [{"id": "left", "name": "Left"}]
            }"#,
        )
        .unwrap();

        let store = JsonPositionStore::new(&path);
        let assignments = store.current_assignments().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(assignments.len(), 5);
        assert_eq!(assignments[0], FixtureAssignment::new("Hue Play 1", PositionLabel::Left, true));
        assert_eq!(assignments[2].position, PositionLabel::Excluded);
        assert!(!assignments[2].is_mirrored());
        assert!(!assignments[3].is_mirrored());
        assert_eq!(assignments[4].position, PositionLabel::Ambient);
        assert!(assignments[4].enabled);

        let mirrored: Vec<_> = assignments.iter().filter(|a| a.is_mirrored()).map(|a| a.fixture_name.as_str()).collect();
        assert_eq!(mirrored, ["Hue Play 1", "Hue Play 2", "Iris"]);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let store = JsonPositionStore::new(temp_path("does_not_exist"));
        assert!(store.current_assignments().unwrap().is_empty());
        assert!(matches!(store.load(), Err(StoreError::Io(_))));
    }

    #[test]
    fn malformed_file_reads_as_empty() {
        let path = temp_path("malformed");
        std::fs::write(&path, "{ \"lights\": [ {\"name\": ").unwrap();
        let store = JsonPositionStore::new(&path);
        let result = store.current_assignments();
        let strict = store.load();
        std::fs::remove_file(&path).ok();

        assert!(result.unwrap().is_empty());
        assert!(matches!(strict, Err(StoreError::Parse(_))));
    }

    #[test]
    fn memory_store_reflects_live_edits() {
        let store = MemoryPositionStore::new(vec![
            FixtureAssignment::new("a", PositionLabel::Left, true),
            FixtureAssignment::new("b", PositionLabel::Right, true),
        ]);
        store.set_enabled("b", false);
        let assignments = store.current_assignments().unwrap();
        assert!(assignments[0].enabled);
        assert!(!assignments[1].enabled);

        store.replace(Vec::new());
        assert!(store.current_assignments().unwrap().is_empty());
    }
}
