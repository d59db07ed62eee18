//! Materials as seen by the display list and the render queue
//!
//! The rendering core never looks inside a material's shading setup; it only
//! needs an identity to emit into streams and the ordering keys the render
//! queue sorts by. Everything else belongs to the renderer.

use std::collections::HashMap;

use super::{RenderError, RenderResult};

/// Identifier a display list carries for a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

impl MaterialId {
    /// The built-in default material
    pub const DEFAULT: Self = Self(0);
}

/// Material reference passed around by value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Material {
    id: MaterialId,
    layer: i32,
    stage: usize,
}

impl Material {
    /// The built-in default material: layer 0, stage 0
    pub const DEFAULT: Self = Self {
        id: MaterialId::DEFAULT,
        layer: 0,
        stage: 0,
    };

    /// Identifier emitted into display lists
    pub fn id(&self) -> MaterialId {
        self.id
    }

    /// Sort key within a render queue stage; lower draws first
    pub fn layer(&self) -> i32 {
        self.layer
    }

    /// Render queue stage this material is drawn in
    pub fn stage(&self) -> usize {
        self.stage
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Name → material registry
///
/// Importers resolve material names through the library; a name that was
/// never registered is an error, not a silent fallback.
#[derive(Debug)]
pub struct MaterialLibrary {
    materials: Vec<(String, Material)>,
    by_name: HashMap<String, usize>,
}

impl MaterialLibrary {
    /// Name the default material is registered under
    pub const DEFAULT_NAME: &'static str = "Default";

    /// Create a library holding only the default material
    pub fn new() -> Self {
        let mut by_name = HashMap::new();
        by_name.insert(Self::DEFAULT_NAME.to_string(), 0);
        Self {
            materials: vec![(Self::DEFAULT_NAME.to_string(), Material::DEFAULT)],
            by_name,
        }
    }

    /// Register a material, or update the ordering keys of an existing one
    ///
    /// Re-registering a name keeps its id so lists already written with it
    /// stay valid.
    pub fn register(&mut self, name: &str, layer: i32, stage: usize) -> Material {
        if let Some(&index) = self.by_name.get(name) {
            let entry = &mut self.materials[index].1;
            if entry.layer != layer || entry.stage != stage {
                log::debug!("Material '{}' re-registered: layer {} -> {}, stage {} -> {}",
                    name, entry.layer, layer, entry.stage, stage);
            }
            entry.layer = layer;
            entry.stage = stage;
            return *entry;
        }

        let id = MaterialId(self.materials.len() as u32);
        let material = Material { id, layer, stage };
        self.by_name.insert(name.to_string(), self.materials.len());
        self.materials.push((name.to_string(), material));
        log::trace!("Registered material '{}' as {:?}", name, id);
        material
    }

    /// Look a material up by name
    pub fn get(&self, name: &str) -> RenderResult<Material> {
        self.by_name
            .get(name)
            .map(|&index| self.materials[index].1)
            .ok_or_else(|| RenderError::UnknownMaterial(name.to_string()))
    }

    /// Look a material up by id
    pub fn by_id(&self, id: MaterialId) -> Option<Material> {
        self.materials.get(id.0 as usize).map(|(_, material)| *material)
    }

    /// Name a material was registered under
    pub fn name_of(&self, id: MaterialId) -> Option<&str> {
        self.materials.get(id.0 as usize).map(|(name, _)| name.as_str())
    }

    /// Number of registered materials, including the default
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Always false; the default material is always present
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

impl Default for MaterialLibrary {
    fn default() -> Self {
        Self::new()
    }
}
