//! Execution unit registry
//!
//! Maps logical model names ("segment", "inpaint", ...) to the persistent
//! unit that serves them and the image it is created from. The registry
//! also owns one async mutex per unit name so stages never interleave
//! inside the same container, even when several models share it.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Logical model names used by the pipelines
pub mod models {
    pub const SEGMENT: &str = "segment";
    pub const POINT_SEGMENT: &str = "point-segment";
    pub const INPAINT: &str = "inpaint";
    pub const IMAGE_TOOLS: &str = "image-tools";
    pub const HARMONIZE: &str = "harmonize";
    pub const RELIGHT: &str = "relight";
    pub const RESTORE: &str = "restore";
    pub const FACE_RESTORE: &str = "face-restore";
    pub const STYLE: &str = "style";
}

/// A named execution unit and its backing image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSpec {
    pub model: String,
    pub name: String,
    pub image: String,
}

/// Registry of execution units keyed by logical model name
#[derive(Debug, Default)]
pub struct UnitRegistry {
    units: HashMap<String, UnitSpec>,
    /// One lock per unit name
    locks: HashMap<String, Arc<Mutex<()>>>,
}

/// Override entry read from the units file
#[derive(Debug, Deserialize)]
struct UnitOverride {
    name: Option<String>,
    image: Option<String>,
}

impl UnitRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the stock unit for every model
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (model, name, image) in [
            (models::SEGMENT, "darkroom-rembg", "docker.io/darkroom/rembg:latest"),
            (models::POINT_SEGMENT, "darkroom-sam", "docker.io/darkroom/sam:latest"),
            (models::INPAINT, "darkroom-lama", "docker.io/darkroom/lama:latest"),
            (models::IMAGE_TOOLS, "darkroom-magick", "docker.io/dpokidov/imagemagick:latest"),
            (models::HARMONIZE, "darkroom-harmonizer", "docker.io/darkroom/harmonizer:latest"),
            (models::RELIGHT, "darkroom-relight", "docker.io/darkroom/relight:latest"),
            (models::RESTORE, "darkroom-nafnet", "docker.io/darkroom/nafnet:latest"),
            (models::FACE_RESTORE, "darkroom-codeformer", "docker.io/darkroom/codeformer:latest"),
            (models::STYLE, "darkroom-style", "docker.io/darkroom/style-transfer:latest"),
        ] {
            registry.register(model, name, image);
        }
        registry
    }

    /// Registers (or replaces) the unit serving `model`
    pub fn register(
        &mut self,
        model: impl Into<String>,
        name: impl Into<String>,
        image: impl Into<String>,
    ) -> &mut Self {
        let model = model.into();
        let spec = UnitSpec {
            model: model.clone(),
            name: name.into(),
            image: image.into(),
        };
        self.units.insert(model, spec);
        self.sync_locks();
        self
    }

    /// Gives every unit name a lock and drops locks no model uses anymore
    fn sync_locks(&mut self) {
        let names: std::collections::HashSet<&str> =
            self.units.values().map(|spec| spec.name.as_str()).collect();
        self.locks.retain(|name, _| names.contains(name.as_str()));
        for name in names {
            if !self.locks.contains_key(name) {
                self.locks
                    .insert(name.to_string(), Arc::new(Mutex::new(())));
            }
        }
    }

    /// Applies name/image overrides from a JSON file
    ///
    /// The file maps model names to `{ "name": ..., "image": ... }`; either
    /// field may be omitted. Unknown models are registered when both are given.
    pub fn apply_overrides_file(&mut self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read units file {}", path.display()))?;
        let overrides: HashMap<String, UnitOverride> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse units file {}", path.display()))?;

        self.apply_overrides(overrides)
    }

    fn apply_overrides(&mut self, overrides: HashMap<String, UnitOverride>) -> anyhow::Result<()> {
        if let Some(model) = overrides.iter().find_map(|(model, entry)| {
            let incomplete = entry.name.is_none() || entry.image.is_none();
            (incomplete && !self.units.contains_key(model)).then_some(model)
        }) {
            anyhow::bail!(
                "Unit override for unknown model '{}' needs both name and image",
                model
            );
        }

        for (model, entry) in overrides {
            match self.units.get_mut(&model) {
                Some(spec) => {
                    if let Some(name) = entry.name {
                        spec.name = name;
                    }
                    if let Some(image) = entry.image {
                        spec.image = image;
                    }
                }
                None => {
                    if let (Some(name), Some(image)) = (entry.name, entry.image) {
                        self.units.insert(
                            model.clone(),
                            UnitSpec {
                                model,
                                name,
                                image,
                            },
                        );
                    }
                }
            }
        }
        self.sync_locks();
        Ok(())
    }

    /// Looks up the unit serving `model`
    pub fn get(&self, model: &str) -> Option<&UnitSpec> {
        self.units.get(model)
    }

    /// Looks up the unit serving `model` together with its lock
    pub fn resolve(&self, model: &str) -> Option<(&UnitSpec, Arc<Mutex<()>>)> {
        let spec = self.units.get(model)?;
        let lock = self.locks.get(&spec.name)?;
        Some((spec, Arc::clone(lock)))
    }

    /// All registered units, sorted by model name
    pub fn specs(&self) -> Vec<&UnitSpec> {
        let mut specs: Vec<_> = self.units.values().collect();
        specs.sort_by(|a, b| a.model.cmp(&b.model));
        specs
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
