//! Degree-of-freedom maps.
//!
//! A [`DofLayout`] describes how many degrees of freedom (dofs) a finite element attaches to
//! each vertex, edge, face and cell interior of a reference cell. A [`DofMap`] applies a layout
//! to a concrete mesh and numbers all dofs globally.
//!
//! # Numbering
//!
//! Local dofs of a cell are ordered component by component, then by entity dimension, then by
//! local entity index in the reference order of the cell type (see
//! [`CellType::entity_vertices`]), and finally by the index of the dof within its entity.
//! Global dofs are numbered the same way, with one contiguous block per component and, within
//! each component, one contiguous block per entity dimension:
//!
//! ```text
//! global = component * scalar_dimension + offset[dim] + entity_dofs[dim] * entity + j
//! ```
//!
//! The numbering depends only on the mesh topology and the layout, so that rebuilding a dof
//! map for the same mesh and layout always reproduces the same numbering.
use crate::error::{AssemblyError, ConfigurationError, TopologyError};
use crate::mesh::{CellType, Mesh, MeshId};
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, Scalar};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

mod cache;

pub use cache::{DofMapCache, DofMapSet};

/// Local dof layout of a finite element space.
///
/// The layout is the signature of a space for the purpose of sharing dof maps: two spaces with
/// equal layouts on the same mesh have identical global numberings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DofLayout {
    cell_type: CellType,
    entity_dofs: [usize; 4],
    block_size: usize,
}

impl DofLayout {
    /// A scalar layout with `entity_dofs[d]` dofs attached to every entity of dimension `d`.
    ///
    /// # Panics
    ///
    /// Panics if dofs are attached to dimensions exceeding the dimension of the cell type.
    pub fn new(cell_type: CellType, entity_dofs: [usize; 4]) -> Self {
        let layout = Self {
            cell_type,
            entity_dofs,
            block_size: 1,
        };
        assert!(layout.is_valid(), "dofs attached to entities that do not exist in a {cell_type}");
        layout
    }

    /// The same layout repeated for each of `block_size` components (a vector-valued space).
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    pub fn with_block_size(self, block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be positive");
        Self { block_size, ..self }
    }

    fn is_valid(&self) -> bool {
        self.block_size > 0 && self.entity_dofs[self.cell_type.dim() + 1..].iter().all(|&k| k == 0)
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    /// The number of dofs per entity, indexed by entity dimension.
    pub fn entity_dofs(&self) -> [usize; 4] {
        self.entity_dofs
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Offsets of the first local dof of each entity dimension within one component.
    fn local_offsets(&self) -> [usize; 4] {
        let mut offsets = [0; 4];
        let mut offset = 0;
        for dim in 0..=self.cell_type.dim() {
            offsets[dim] = offset;
            offset += self.cell_type.num_entities(dim) * self.entity_dofs[dim];
        }
        offsets
    }

    /// The number of local dofs of a single component.
    pub fn scalar_local_dimension(&self) -> usize {
        (0..=self.cell_type.dim())
            .map(|dim| self.cell_type.num_entities(dim) * self.entity_dofs[dim])
            .sum()
    }

    /// The number of local dofs on a cell.
    pub fn local_dimension(&self) -> usize {
        self.block_size * self.scalar_local_dimension()
    }

    /// Local indices of the dofs of the given components that lie on a facet (including its
    /// vertices and edges), in ascending order.
    fn facet_dofs(&self, local_facet: usize, components: Range<usize>) -> Vec<usize> {
        let tdim = self.cell_type.dim();
        let facet_vertices = self.cell_type.entity_vertices(tdim - 1)[local_facet];
        let scalar_dim = self.scalar_local_dimension();
        let offsets = self.local_offsets();

        let mut dofs = Vec::new();
        for component in components {
            for dim in 0..tdim {
                let k = self.entity_dofs[dim];
                for (entity, vertices) in self.cell_type.entity_vertices(dim).iter().enumerate() {
                    if vertices.iter().all(|v| facet_vertices.contains(v)) {
                        let first = component * scalar_dim + offsets[dim] + k * entity;
                        dofs.extend(first..first + k);
                    }
                }
            }
        }
        dofs
    }
}

/// Global numbering of the dofs of a [`DofLayout`] on a mesh.
///
/// A dof map is either built from a layout with [`DofMap::new`], or is a view onto a single
/// component of such a map, obtained with [`DofMap::extract_sub_dofmap`]. Views share the
/// numbering of their parent: their dofs are indices into the parent's global space.
#[derive(Debug, Clone)]
pub struct DofMap {
    layout: DofLayout,
    mesh_id: MeshId,
    num_entities: [usize; 4],
    global_offsets: [usize; 4],
    scalar_dimension: usize,
    num_cells: usize,
    /// Global dofs of every cell, `layout.local_dimension()` per cell.
    cell_dofs: Arc<Vec<usize>>,
    component: Option<usize>,
}

impl DofMap {
    /// Number the dofs of `layout` on `mesh`.
    pub fn new<T, D>(layout: DofLayout, mesh: &Mesh<T, D>) -> Result<Self, AssemblyError>
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        if layout.cell_type != mesh.cell_type() {
            return Err(ConfigurationError::CellTypeMismatch {
                expected: mesh.cell_type(),
                actual: layout.cell_type,
            }
            .into());
        }
        if !layout.is_valid() {
            return Err(ConfigurationError::InvalidLayout(format!("{layout:?}")).into());
        }

        let cell_type = layout.cell_type;
        let tdim = cell_type.dim();
        let mut num_entities = [0; 4];
        let mut global_offsets = [0; 4];
        let mut scalar_dimension = 0;
        for dim in 0..=tdim {
            // Entities are only computed for dimensions that carry dofs
            if layout.entity_dofs[dim] > 0 {
                num_entities[dim] = mesh.num_entities(dim)?;
            }
            global_offsets[dim] = scalar_dimension;
            scalar_dimension += num_entities[dim] * layout.entity_dofs[dim];
        }

        let num_cells = mesh.num_cells();
        let local_dimension = layout.local_dimension();
        let mut cell_dofs = Vec::with_capacity(num_cells * local_dimension);
        let mut cell_entities = Vec::with_capacity(tdim + 1);
        for dim in 0..=tdim {
            if layout.entity_dofs[dim] > 0 {
                cell_entities.push(Some(mesh.connectivity(tdim, dim)?));
            } else {
                cell_entities.push(None);
            }
        }

        for cell in 0..num_cells {
            for component in 0..layout.block_size {
                let component_offset = component * scalar_dimension;
                for dim in 0..=tdim {
                    let k = layout.entity_dofs[dim];
                    if let Some(connectivity) = cell_entities[dim] {
                        let entities = connectivity.get(cell).unwrap_or_default();
                        for &entity in entities {
                            let first = component_offset + global_offsets[dim] + k * entity;
                            cell_dofs.extend(first..first + k);
                        }
                    }
                }
            }
        }
        debug_assert_eq!(cell_dofs.len(), num_cells * local_dimension);

        Ok(Self {
            layout,
            mesh_id: mesh.id(),
            num_entities,
            global_offsets,
            scalar_dimension,
            num_cells,
            cell_dofs: Arc::new(cell_dofs),
            component: None,
        })
    }

    /// The layout of the space, which identifies it in a [`DofMapCache`].
    ///
    /// Views onto a component of a parent space have no signature of their own.
    pub fn signature(&self) -> Result<&DofLayout, AssemblyError> {
        match self.component {
            None => Ok(&self.layout),
            Some(_) => Err(ConfigurationError::DofMapView {
                operation: "query the signature",
            }
            .into()),
        }
    }

    pub fn is_view(&self) -> bool {
        self.component.is_some()
    }

    /// The id of the mesh the dof map was built for.
    pub fn mesh_id(&self) -> MeshId {
        self.mesh_id
    }

    pub fn cell_type(&self) -> CellType {
        self.layout.cell_type
    }

    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// The size of the global space the dofs index into.
    ///
    /// For a view, this is the dimension of the parent space.
    pub fn global_dimension(&self) -> usize {
        self.layout.block_size * self.scalar_dimension
    }

    /// The number of dofs on a single cell.
    pub fn local_dimension(&self) -> usize {
        match self.component {
            None => self.layout.local_dimension(),
            Some(_) => self.layout.scalar_local_dimension(),
        }
    }

    /// The number of components, one for views.
    pub fn block_size(&self) -> usize {
        match self.component {
            None => self.layout.block_size,
            Some(_) => 1,
        }
    }

    fn components(&self) -> Range<usize> {
        match self.component {
            None => 0..self.layout.block_size,
            Some(component) => component..component + 1,
        }
    }

    /// Global indices of the dofs of a cell, in local dof order.
    pub fn tabulate_dofs(&self, cell: usize) -> Result<&[usize], AssemblyError> {
        let local_dimension = self.layout.local_dimension();
        let num_cells = self.num_cells();
        if cell >= num_cells {
            return Err(TopologyError::EntityOutOfBounds {
                dim: self.layout.cell_type.dim(),
                index: cell,
                count: num_cells,
            }
            .into());
        }
        let dofs = &self.cell_dofs[cell * local_dimension..(cell + 1) * local_dimension];
        match self.component {
            None => Ok(dofs),
            Some(component) => {
                let scalar = self.layout.scalar_local_dimension();
                Ok(&dofs[component * scalar..(component + 1) * scalar])
            }
        }
    }

    /// Local indices (positions in [`tabulate_dofs`](Self::tabulate_dofs)) of the dofs that lie
    /// on the closure of a local facet.
    ///
    /// # Panics
    ///
    /// Panics if `local_facet` is not a valid local facet index of the cell type.
    pub fn tabulate_facet_dofs(&self, local_facet: usize) -> Vec<usize> {
        self.layout.facet_dofs(local_facet, 0..self.block_size())
    }

    /// The number of dofs on the closure of a single facet.
    pub fn num_facet_dofs(&self) -> usize {
        self.tabulate_facet_dofs(0).len()
    }

    /// Global indices of the dofs attached to an entity, for every component.
    pub fn entity_dofs(&self, dim: usize, entity: usize) -> Result<Vec<usize>, AssemblyError> {
        let tdim = self.layout.cell_type.dim();
        if dim > tdim {
            return Err(TopologyError::InvalidDimension {
                dim,
                topological_dim: tdim,
            }
            .into());
        }
        let k = self.layout.entity_dofs[dim];
        if k == 0 {
            return Ok(Vec::new());
        }
        if entity >= self.num_entities[dim] {
            return Err(TopologyError::EntityOutOfBounds {
                dim,
                index: entity,
                count: self.num_entities[dim],
            }
            .into());
        }
        Ok(self
            .components()
            .flat_map(|component| {
                let first = component * self.scalar_dimension + self.global_offsets[dim] + k * entity;
                first..first + k
            })
            .collect())
    }

    /// The entity `(dim, index)` a global dof is attached to.
    ///
    /// Returns `None` if the dof does not belong to this dof map.
    pub fn dof_entity(&self, dof: usize) -> Option<(usize, usize)> {
        if self.scalar_dimension == 0 {
            return None;
        }
        let component = dof / self.scalar_dimension;
        if !self.components().contains(&component) {
            return None;
        }
        let scalar_dof = dof % self.scalar_dimension;
        (0..=self.layout.cell_type.dim()).find_map(|dim| {
            let k = self.layout.entity_dofs[dim];
            let begin = self.global_offsets[dim];
            let end = begin + k * self.num_entities[dim];
            (k > 0 && scalar_dof >= begin && scalar_dof < end).then(|| (dim, (scalar_dof - begin) / k))
        })
    }

    /// A view onto one component of a vector-valued space.
    pub fn extract_sub_dofmap(&self, component: usize) -> Result<DofMap, AssemblyError> {
        if self.is_view() {
            return Err(ConfigurationError::DofMapView {
                operation: "extract a sub dof map",
            }
            .into());
        }
        if component >= self.layout.block_size {
            return Err(ConfigurationError::InvalidComponent {
                component,
                block_size: self.layout.block_size,
            }
            .into());
        }
        Ok(Self {
            component: Some(component),
            ..self.clone()
        })
    }

    /// Whether two dof maps number their dofs identically.
    pub(crate) fn same_numbering(&self, other: &DofMap) -> bool {
        self.layout == other.layout
            && self.component == other.component
            && self.scalar_dimension == other.scalar_dimension
            && self.cell_dofs == other.cell_dofs
    }
}
