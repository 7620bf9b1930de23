//! Personality templates and the registry the orchestrator chooses from.
//!
//! Templates are JSON files in a directory; each file's stem is the template
//! name used by `personality_type` in the agent config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use civitas_types::Personality;
use rand::Rng;
use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Errors from loading personality templates.
#[derive(Debug, thiserror::Error)]
pub enum PersonalityError {
    /// The directory or a file in it could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A template file is not valid JSON.
    #[error("invalid personality template {}: {source}", path.display())]
    Json {
        /// The offending file.
        path: PathBuf,
        /// The underlying parse error.
        source: serde_json::Error,
    },
}

/// A named personality template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityTemplate {
    /// Template name; the file stem when loaded from disk.
    #[serde(default)]
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Trait values, clamped into `[0, 1]` on load.
    #[serde(default)]
    pub traits: Personality,
}

impl PersonalityTemplate {
    /// A template with the given traits and no description.
    pub fn new(name: impl Into<String>, traits: Personality) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            traits: traits.clamped(),
        }
    }
}

/// Loaded templates keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PersonalityRegistry {
    templates: BTreeMap<String, PersonalityTemplate>,
}

impl PersonalityRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` file in `dir`.
    ///
    /// Non-JSON files are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PersonalityError::Io`] if the directory or a file cannot be
    /// read and [`PersonalityError::Json`] if a template does not parse.
    pub fn load_dir(dir: &Path) -> Result<Self, PersonalityError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| PersonalityError::Io { path, source }
        };

        let mut registry = Self::new();
        let entries = std::fs::read_dir(dir).map_err(io_err(dir))?;
        for entry in entries {
            let path = entry.map_err(io_err(dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!(path = %path.display(), "Skipping personality file with a non-UTF-8 name");
                continue;
            };
            let stem = stem.to_owned();

            let contents = std::fs::read_to_string(&path).map_err(io_err(&path))?;
            let mut template: PersonalityTemplate =
                serde_json::from_str(&contents).map_err(|source| PersonalityError::Json {
                    path: path.clone(),
                    source,
                })?;
            template.name = stem;
            debug!(name = %template.name, "Loaded personality template");
            registry.insert(template);
        }

        info!(count = registry.len(), dir = %dir.display(), "Loaded personality templates");
        Ok(registry)
    }

    /// Add or replace a template. Its traits are clamped.
    pub fn insert(&mut self, mut template: PersonalityTemplate) {
        template.traits = template.traits.clamped();
        self.templates.insert(template.name.clone(), template);
    }

    /// Look up a template by name.
    pub fn get(&self, name: &str) -> Option<&PersonalityTemplate> {
        self.templates.get(name)
    }

    /// Template names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Number of loaded templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no templates are loaded.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// The requested template if it is loaded, otherwise one chosen
    /// uniformly at random. `None` only when the registry is empty.
    pub fn choose<R: Rng + ?Sized>(
        &self,
        requested: Option<&str>,
        rng: &mut R,
    ) -> Option<&PersonalityTemplate> {
        if let Some(name) = requested {
            if let Some(template) = self.templates.get(name) {
                return Some(template);
            }
            warn!(requested = name, "Unknown personality type, choosing at random");
        }
        self.templates.values().choose(rng)
    }
}

impl FromIterator<PersonalityTemplate> for PersonalityRegistry {
    fn from_iter<I: IntoIterator<Item = PersonalityTemplate>>(iter: I) -> Self {
        let mut registry = Self::new();
        for template in iter {
            registry.insert(template);
        }
        registry
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::arithmetic_side_effects)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn registry(names: &[&str]) -> PersonalityRegistry {
        names
            .iter()
            .map(|n| PersonalityTemplate::new(*n, Personality::default()))
            .collect()
    }

    #[test]
    fn explicit_type_wins_when_loaded() {
        let reg = registry(&["builder", "explorer"]);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let chosen = reg.choose(Some("explorer"), &mut rng).unwrap();
            assert_eq!(chosen.name, "explorer");
        }
    }

    #[test]
    fn unknown_type_falls_back_to_random() {
        let reg = registry(&["builder"]);
        let mut rng = StdRng::seed_from_u64(2);
        assert_eq!(reg.choose(Some("wizard"), &mut rng).unwrap().name, "builder");
    }

    #[test]
    fn empty_registry_chooses_nothing() {
        let reg = PersonalityRegistry::new();
        assert!(reg.choose(None, &mut StdRng::seed_from_u64(3)).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn random_choice_covers_every_template() {
        let reg = registry(&["a", "b", "c", "d"]);
        let mut rng = StdRng::seed_from_u64(4);
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for _ in 0..4000 {
            let name = reg.choose(None, &mut rng).unwrap().name.clone();
            *counts.entry(name).or_default() += 1;
        }
        assert_eq!(counts.len(), 4);
        // Expected 1000 each; a fair draw stays well inside this band.
        for count in counts.values() {
            assert!((850..=1150).contains(count), "skewed draw: {counts:?}");
        }
    }

    #[test]
    fn load_dir_names_templates_by_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("builder.json"),
            r#"{"name": "ignored", "description": "Builds", "traits": {"ambition": 0.9, "work_ethic": 1.7}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("loner.json"), r#"{"traits": {"sociability": 0.1}}"#)
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a template").unwrap();

        let reg = PersonalityRegistry::load_dir(dir.path()).unwrap();
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["builder", "loner"]);

        let builder = reg.get("builder").unwrap();
        assert_eq!(builder.description, "Builds");
        assert_eq!(builder.traits.ambition, 0.9);
        assert_eq!(builder.traits.work_ethic, 1.0);
        assert_eq!(builder.traits.aggression, 0.3);
    }

    #[test]
    fn shipped_templates_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../personalities");
        let reg = PersonalityRegistry::load_dir(&dir).unwrap();
        for name in ["builder", "explorer", "merchant", "socialite", "warrior"] {
            assert!(reg.get(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn load_dir_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        assert!(matches!(
            PersonalityRegistry::load_dir(dir.path()),
            Err(PersonalityError::Json { .. })
        ));
    }

    #[test]
    fn load_dir_reports_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PersonalityRegistry::load_dir(&dir.path().join("absent")),
            Err(PersonalityError::Io { .. })
        ));
    }
}
