use crate::error::AssemblyError;
use crate::mesh::Mesh;
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint};
use serde::{Deserialize, Serialize};

/// Integer subdomain markers, one per mesh entity of a fixed dimension.
///
/// During assembly, the marker of a cell or facet selects which of the form's integrals is
/// evaluated on it. Entities whose marker is not the index of an integral are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshMarkers {
    dim: usize,
    values: Vec<usize>,
}

impl MeshMarkers {
    pub fn new(dim: usize, values: Vec<usize>) -> Self {
        Self { dim, values }
    }

    /// Markers for all entities of dimension `dim`, initialized to `value`.
    pub fn constant<T, D>(mesh: &Mesh<T, D>, dim: usize, value: usize) -> Result<Self, AssemblyError>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        Ok(Self::new(dim, vec![value; mesh.num_entities(dim)?]))
    }

    /// Markers obtained by evaluating `marker` at the midpoint of every entity of dimension `dim`.
    pub fn from_fn<T, D>(
        mesh: &Mesh<T, D>,
        dim: usize,
        mut marker: impl FnMut(&OPoint<T, D>) -> usize,
    ) -> Result<Self, AssemblyError>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let values = (0..mesh.num_entities(dim)?)
            .map(|entity| Ok(marker(&mesh.entity_midpoint(dim, entity)?)))
            .collect::<Result<_, AssemblyError>>()?;
        Ok(Self::new(dim, values))
    }

    /// Set the marker of every entity whose midpoint satisfies `predicate` to `value`.
    pub fn mark<T, D>(
        &mut self,
        mesh: &Mesh<T, D>,
        value: usize,
        mut predicate: impl FnMut(&OPoint<T, D>) -> bool,
    ) -> Result<(), AssemblyError>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        for (entity, marker) in self.values.iter_mut().enumerate() {
            if predicate(&mesh.entity_midpoint(self.dim, entity)?) {
                *marker = value;
            }
        }
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, entity: usize) -> Option<usize> {
        self.values.get(entity).copied()
    }

    pub fn values(&self) -> &[usize] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [usize] {
        &mut self.values
    }
}
