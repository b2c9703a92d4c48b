use crate::dofmap::{DofLayout, DofMap};
use crate::error::{AssemblyError, ConfigurationError};
use crate::form::Form;
use crate::mesh::{Mesh, MeshId};
use log::debug;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, Scalar};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Shares dof maps between forms defined on equivalent spaces.
///
/// Dof maps are keyed by the mesh they number and their [`DofLayout`]. All forms assembled
/// through the same cache receive the identical [`DofMap`] instance for equal layouts, so that
/// dof indices obtained from one form are valid for the others.
///
/// Entries are keyed by [`MeshId`] and are not tied to the lifetime of the mesh: dof maps of a
/// mesh that was dropped, refined or reordered stay in the cache until they are removed with
/// [`evict`](Self::evict) or [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct DofMapCache {
    dof_maps: Mutex<FxHashMap<(MeshId, DofLayout), Arc<DofMap>>>,
}

impl DofMapCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached dof map for `layout` on `mesh`, building it if necessary.
    pub fn get_or_create<T, D>(&self, layout: &DofLayout, mesh: &Mesh<T, D>) -> Result<Arc<DofMap>, AssemblyError>
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let mut dof_maps = self.dof_maps.lock();
        let key = (mesh.id(), *layout);
        if let Some(dof_map) = dof_maps.get(&key) {
            debug!("Reusing dof map (already in cache)");
            return Ok(Arc::clone(dof_map));
        }

        debug!("Creating dof map (not in cache)");
        let dof_map = Arc::new(DofMap::new(*layout, mesh)?);
        dof_maps.insert(key, Arc::clone(&dof_map));
        Ok(dof_map)
    }

    /// Insert an externally built dof map.
    ///
    /// If a dof map with the same signature is already cached, the cached instance is returned
    /// provided it numbers the dofs identically, and an error is returned otherwise. Views onto
    /// components of a parent space cannot be cached.
    pub fn insert(&self, dof_map: Arc<DofMap>) -> Result<Arc<DofMap>, AssemblyError> {
        let key = (dof_map.mesh_id(), *dof_map.signature()?);
        let mut dof_maps = self.dof_maps.lock();
        match dof_maps.get(&key) {
            Some(existing) if existing.same_numbering(&dof_map) => Ok(Arc::clone(existing)),
            Some(_) => Err(ConfigurationError::SignatureCollision.into()),
            None => {
                dof_maps.insert(key, Arc::clone(&dof_map));
                Ok(dof_map)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.dof_maps.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the cached dof maps of one mesh and return how many were removed.
    pub fn evict(&self, mesh: MeshId) -> usize {
        let mut dof_maps = self.dof_maps.lock();
        let before = dof_maps.len();
        dof_maps.retain(|(id, _), _| *id != mesh);
        let removed = before - dof_maps.len();
        debug!("Evicted {} dof maps from cache", removed);
        removed
    }

    /// Drop all cached dof maps. Dof maps still referenced elsewhere stay alive.
    pub fn clear(&self) {
        self.dof_maps.lock().clear();
    }
}

/// The dof maps of all arguments of a form: first the `rank` arguments of the global tensor,
/// then one per coefficient.
#[derive(Debug, Clone)]
pub struct DofMapSet {
    rank: usize,
    dof_maps: Vec<Arc<DofMap>>,
}

impl DofMapSet {
    pub fn new(rank: usize, dof_maps: Vec<Arc<DofMap>>) -> Result<Self, AssemblyError> {
        if dof_maps.len() < rank {
            return Err(ConfigurationError::ArgumentCountMismatch {
                expected: rank,
                actual: dof_maps.len(),
            }
            .into());
        }
        Ok(Self { rank, dof_maps })
    }

    /// Resolve the dof maps of every argument of `form` through `cache`.
    pub fn from_form<T, D, F>(form: &F, mesh: &Mesh<T, D>, cache: &DofMapCache) -> Result<Self, AssemblyError>
    where
        T: Scalar,
        D: DimName,
        F: ?Sized + Form<T, D>,
        DefaultAllocator: Allocator<T, D>,
    {
        let num_arguments = form.rank() + form.num_coefficients();
        let dof_maps = (0..num_arguments)
            .map(|i| {
                let layout = form
                    .argument_layout(i)
                    .ok_or(ConfigurationError::ArgumentCountMismatch {
                        expected: num_arguments,
                        actual: i,
                    })?;
                if layout.cell_type() != mesh.cell_type() {
                    return Err(ConfigurationError::CellTypeMismatch {
                        expected: mesh.cell_type(),
                        actual: layout.cell_type(),
                    }
                    .into());
                }
                cache.get_or_create(&layout, mesh)
            })
            .collect::<Result<Vec<_>, AssemblyError>>()?;
        Self::new(form.rank(), dof_maps)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_coefficients(&self) -> usize {
        self.dof_maps.len() - self.rank
    }

    /// The total number of dof maps.
    pub fn len(&self) -> usize {
        self.dof_maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dof_maps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<DofMap>> {
        self.dof_maps.get(index)
    }

    /// Dof maps of the tensor arguments.
    pub fn arguments(&self) -> &[Arc<DofMap>] {
        &self.dof_maps[..self.rank]
    }

    /// Dof maps of the coefficients.
    pub fn coefficients(&self) -> &[Arc<DofMap>] {
        &self.dof_maps[self.rank..]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DofMap>> {
        self.dof_maps.iter()
    }

    /// Global dimensions of the tensor arguments.
    pub fn global_dimensions(&self) -> Vec<usize> {
        self.arguments().iter().map(|m| m.global_dimension()).collect()
    }

    /// Local dimensions of the tensor arguments.
    pub fn local_dimensions(&self) -> Vec<usize> {
        self.arguments().iter().map(|m| m.local_dimension()).collect()
    }
}
