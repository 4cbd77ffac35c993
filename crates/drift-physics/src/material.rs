use std::collections::HashMap;

use tracing::{debug, warn};

use crate::backend::{CombineMode, MaterialDesc, PhysicsBackend};
use crate::{PhysicsError, PhysicsResult};

/// Native engines cap the number of live materials, so identical values share one.
pub const MAX_MATERIALS: usize = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MaterialKey {
    static_friction: u32,
    dynamic_friction: u32,
    restitution: u32,
    combine: CombineMode,
}

impl From<&MaterialDesc> for MaterialKey {
    fn from(desc: &MaterialDesc) -> Self {
        Self {
            static_friction: desc.static_friction.to_bits(),
            dynamic_friction: desc.dynamic_friction.to_bits(),
            restitution: desc.restitution.to_bits(),
            combine: desc.combine,
        }
    }
}

/// Bounded material cache keyed by material values
#[derive(Debug)]
pub struct MaterialCache<M> {
    materials: HashMap<MaterialKey, M>,
    limit: usize,
}

impl<M: Copy> MaterialCache<M> {
    pub fn new() -> Self {
        Self::with_limit(MAX_MATERIALS)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            materials: HashMap::new(),
            limit,
        }
    }

    /// Return the cached material for `desc`, creating it on first use
    pub fn get_or_create<B>(&mut self, backend: &mut B, desc: &MaterialDesc) -> PhysicsResult<M>
    where
        B: PhysicsBackend<Material = M>,
    {
        let key = MaterialKey::from(desc);
        if let Some(material) = self.materials.get(&key) {
            return Ok(*material);
        }
        if self.materials.len() >= self.limit {
            warn!(limit = self.limit, "material cache is full");
            return Err(PhysicsError::MaterialLimit(self.limit));
        }
        let material = backend.create_material(desc);
        self.materials.insert(key, material);
        debug!(count = self.materials.len(), ?desc, "created material");
        Ok(material)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

impl<M: Copy> Default for MaterialCache<M> {
    fn default() -> Self {
        Self::new()
    }
}
