use crate::fixed::Ticks;
use crate::id::{CategoryId, MaterialId};
use std::collections::HashMap;

/// A wet material's cure path: what it becomes and how long that takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CureRule {
    pub cured: MaterialId,
    pub duration: Ticks,
}

/// A produced material's setting path: the byproduct it degrades into when
/// left out of production storage for the full duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingRule {
    pub byproduct: MaterialId,
    pub duration: Ticks,
}

/// A material definition.
///
/// `cure` and `setting` targets are *not* validated at build time: content
/// packs may reference materials another pack provides, so targets resolve
/// lazily at use and a dangling reference degrades to a logged no-op there.
#[derive(Debug, Clone)]
pub struct MaterialDef {
    pub name: String,
    pub category: Option<CategoryId>,
    pub stack_limit: u32,
    pub cure: Option<CureRule>,
    pub setting: Option<SettingRule>,
}

/// A category definition (used for ingredient matching by kind).
#[derive(Debug, Clone)]
pub struct CategoryDef {
    pub name: String,
}

/// Builder for constructing an immutable MaterialRegistry.
/// Three-phase lifecycle: registration -> mutation -> finalization.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    materials: Vec<MaterialDef>,
    material_name_to_id: HashMap<String, MaterialId>,
    categories: Vec<CategoryDef>,
    category_name_to_id: HashMap<String, CategoryId>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase 1: Register a category. Returns its ID.
    pub fn register_category(&mut self, name: &str) -> CategoryId {
        let id = CategoryId(self.categories.len() as u16);
        self.categories.push(CategoryDef {
            name: name.to_string(),
        });
        self.category_name_to_id.insert(name.to_string(), id);
        id
    }

    /// Phase 1: Register a material. Returns its ID.
    pub fn register_material(&mut self, name: &str, stack_limit: u32) -> MaterialId {
        let id = MaterialId(self.materials.len() as u32);
        self.materials.push(MaterialDef {
            name: name.to_string(),
            category: None,
            stack_limit: stack_limit.max(1),
            cure: None,
            setting: None,
        });
        self.material_name_to_id.insert(name.to_string(), id);
        id
    }

    /// Phase 2: Mutate an existing material by name.
    pub fn mutate_material<F>(&mut self, name: &str, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut MaterialDef),
    {
        let id = self
            .material_name_to_id
            .get(name)
            .ok_or(RegistryError::NotFound(name.to_string()))?;
        f(&mut self.materials[id.0 as usize]);
        Ok(())
    }

    /// Lookup material ID by name.
    pub fn material_id(&self, name: &str) -> Option<MaterialId> {
        self.material_name_to_id.get(name).copied()
    }

    /// Lookup category ID by name.
    pub fn category_id(&self, name: &str) -> Option<CategoryId> {
        self.category_name_to_id.get(name).copied()
    }

    /// Phase 3: Finalize and build the immutable registry.
    ///
    /// Category references must exist; cure/setting durations are clamped
    /// to at least one tick.
    pub fn build(mut self) -> Result<MaterialRegistry, RegistryError> {
        for def in &mut self.materials {
            if let Some(cat) = def.category {
                if cat.0 as usize >= self.categories.len() {
                    return Err(RegistryError::InvalidCategoryRef(cat));
                }
            }
            if let Some(cure) = &mut def.cure {
                cure.duration = cure.duration.max(1);
            }
            if let Some(setting) = &mut def.setting {
                setting.duration = setting.duration.max(1);
            }
        }

        Ok(MaterialRegistry {
            materials: self.materials,
            material_name_to_id: self.material_name_to_id,
            categories: self.categories,
            category_name_to_id: self.category_name_to_id,
        })
    }
}

/// Immutable material registry. Frozen after build().
///
/// Built once at startup and passed by reference to every component that
/// needs it -- there is no global definition cache.
#[derive(Debug)]
pub struct MaterialRegistry {
    materials: Vec<MaterialDef>,
    material_name_to_id: HashMap<String, MaterialId>,
    categories: Vec<CategoryDef>,
    category_name_to_id: HashMap<String, CategoryId>,
}

impl MaterialRegistry {
    pub fn get(&self, id: MaterialId) -> Option<&MaterialDef> {
        self.materials.get(id.0 as usize)
    }

    pub fn get_category(&self, id: CategoryId) -> Option<&CategoryDef> {
        self.categories.get(id.0 as usize)
    }

    pub fn material_id(&self, name: &str) -> Option<MaterialId> {
        self.material_name_to_id.get(name).copied()
    }

    pub fn category_id(&self, name: &str) -> Option<CategoryId> {
        self.category_name_to_id.get(name).copied()
    }

    /// Cure rule for a material, if it registered one.
    pub fn cure_rule(&self, id: MaterialId) -> Option<&CureRule> {
        self.get(id).and_then(|def| def.cure.as_ref())
    }

    /// Setting rule for a material, if it registered one.
    pub fn setting_rule(&self, id: MaterialId) -> Option<&SettingRule> {
        self.get(id).and_then(|def| def.setting.as_ref())
    }

    /// Per-unit stack limit. Unknown materials stack one-high.
    pub fn stack_limit(&self, id: MaterialId) -> u32 {
        self.get(id).map(|def| def.stack_limit.max(1)).unwrap_or(1)
    }

    /// Whether a material belongs to a category.
    pub fn is_in_category(&self, id: MaterialId, category: CategoryId) -> bool {
        self.get(id)
            .map(|def| def.category == Some(category))
            .unwrap_or(false)
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid category reference: {0:?}")]
    InvalidCategoryRef(CategoryId),
}
