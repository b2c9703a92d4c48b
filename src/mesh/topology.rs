use crate::error::{AssemblyError, TopologyError};
use crate::mesh::CellType;
use itertools::iproduct;
use log::debug;
use once_cell::sync::OnceCell;
use rayon::slice::ParallelSliceMut;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Compressed incidence relation between entities of two topological dimensions.
///
/// Entity `i` of the source dimension is connected to the entities
/// `indices[offsets[i] .. offsets[i + 1]]` of the target dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshConnectivity {
    offsets: Vec<usize>,
    indices: Vec<usize>,
}

impl Default for MeshConnectivity {
    fn default() -> Self {
        Self {
            offsets: vec![0],
            indices: Vec::new(),
        }
    }
}

impl MeshConnectivity {
    /// Construct connectivity from offsets and a flat index array.
    ///
    /// # Panics
    ///
    /// Panics if the offsets are empty, not monotonically increasing, or do not end at
    /// `indices.len()`.
    pub fn from_offsets_and_indices(offsets: Vec<usize>, indices: Vec<usize>) -> Self {
        assert!(!offsets.is_empty(), "offsets must contain at least one entry");
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]), "offsets must be monotonic");
        assert_eq!(offsets.last().copied(), Some(indices.len()));
        Self { offsets, indices }
    }

    /// Construct connectivity in which every entity has exactly `stride` connections.
    pub fn from_uniform(stride: usize, indices: Vec<usize>) -> Self {
        assert!(stride > 0, "stride must be positive");
        assert_eq!(indices.len() % stride, 0);
        let num_entities = indices.len() / stride;
        let offsets = (0..=num_entities).map(|i| i * stride).collect();
        Self { offsets, indices }
    }

    /// Connectivity in which entity `i` is connected only to entity `i`.
    pub fn identity(num_entities: usize) -> Self {
        Self::from_uniform(1, (0..num_entities).collect())
    }

    /// The number of source entities.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of connections.
    pub fn num_connections(&self) -> usize {
        self.indices.len()
    }

    pub fn get(&self, entity: usize) -> Option<&[usize]> {
        let begin = *self.offsets.get(entity)?;
        let end = *self.offsets.get(entity + 1)?;
        Some(&self.indices[begin..end])
    }

    pub fn iter(&self) -> impl '_ + ExactSizeIterator<Item = &[usize]> {
        self.offsets
            .windows(2)
            .map(move |w| &self.indices[w[0]..w[1]])
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// The transposed relation, mapping each of the `num_targets` target entities to the
    /// (ascending) source entities connected to it.
    pub fn transpose(&self, num_targets: usize) -> Self {
        let mut counts = vec![0; num_targets];
        for &target in &self.indices {
            counts[target] += 1;
        }

        let mut offsets = Vec::with_capacity(num_targets + 1);
        offsets.push(0);
        for count in &counts {
            offsets.push(offsets.last().copied().unwrap_or(0) + count);
        }

        // Reuse the counts as insertion positions
        counts.copy_from_slice(&offsets[..num_targets]);
        let mut indices = vec![0; self.indices.len()];
        for (source, targets) in self.iter().enumerate() {
            for &target in targets {
                indices[counts[target]] = source;
                counts[target] += 1;
            }
        }

        Self { offsets, indices }
    }
}

/// Entities of an intermediate dimension `0 < d < tdim`.
#[derive(Debug, Clone)]
struct EntitySet {
    /// Connectivity `(d, 0)`, each entity with its vertices in ascending order.
    vertices: MeshConnectivity,
    /// Connectivity `(tdim, d)` in local entity order of the cell type.
    cell_entities: MeshConnectivity,
}

#[derive(Debug, Clone, Default)]
struct TopologyCache {
    entities: [OnceCell<EntitySet>; 4],
    connectivity: [[OnceCell<MeshConnectivity>; 4]; 4],
}

/// Topology of a simplex mesh.
///
/// The cell-vertex incidence given at construction is the only stored relation. Entities of
/// intermediate dimensions and the connectivity between any pair of dimensions are computed on
/// first request and kept for the lifetime of the topology, so repeated queries are cheap.
/// The computation is deterministic: entities are numbered in the lexicographic order of their
/// sorted vertex tuples, independently of the order in which cells are visited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshTopology {
    cell_type: CellType,
    num_vertices: usize,
    cells: MeshConnectivity,
    #[serde(skip)]
    cache: TopologyCache,
}

impl PartialEq for MeshTopology {
    fn eq(&self, other: &Self) -> bool {
        self.cell_type == other.cell_type && self.num_vertices == other.num_vertices && self.cells == other.cells
    }
}

impl MeshTopology {
    /// Construct a topology from the vertex indices of each cell.
    ///
    /// Every cell must have exactly the number of vertices of `cell_type`, all distinct and
    /// smaller than `num_vertices`.
    pub fn new(cell_type: CellType, num_vertices: usize, cells: MeshConnectivity) -> Result<Self, AssemblyError> {
        let cell_size = cell_type.num_vertices(cell_type.dim());
        for (cell_index, cell) in cells.iter().enumerate() {
            if cell.len() != cell_size {
                return Err(TopologyError::InvalidMesh(format!(
                    "cell {cell_index} has {} vertices, but a {cell_type} has {cell_size}",
                    cell.len()
                ))
                .into());
            }
            if let Some(&v) = cell.iter().find(|&&v| v >= num_vertices) {
                return Err(TopologyError::InvalidMesh(format!(
                    "cell {cell_index} references vertex {v}, but the mesh has {num_vertices} vertices"
                ))
                .into());
            }
            for (i, v) in cell.iter().enumerate() {
                if cell[i + 1..].contains(v) {
                    return Err(TopologyError::InvalidMesh(format!(
                        "cell {cell_index} references vertex {v} more than once"
                    ))
                    .into());
                }
            }
        }

        Ok(Self {
            cell_type,
            num_vertices,
            cells,
            cache: TopologyCache::default(),
        })
    }

    pub(crate) fn from_valid_cells(cell_type: CellType, num_vertices: usize, cells: MeshConnectivity) -> Self {
        debug_assert!(cells.indices().iter().all(|&v| v < num_vertices));
        Self {
            cell_type,
            num_vertices,
            cells,
            cache: TopologyCache::default(),
        }
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    /// The topological dimension.
    pub fn dim(&self) -> usize {
        self.cell_type.dim()
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Vertex indices of all cells, i.e. connectivity `(tdim, 0)`.
    pub fn cells(&self) -> &MeshConnectivity {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut MeshConnectivity {
        self.cache = TopologyCache::default();
        &mut self.cells
    }

    fn check_dim(&self, dim: usize) -> Result<(), TopologyError> {
        if dim > self.dim() {
            Err(TopologyError::InvalidDimension {
                dim,
                topological_dim: self.dim(),
            })
        } else {
            Ok(())
        }
    }

    /// Number of entities of the given dimension, computing them if necessary.
    pub fn num_entities(&self, dim: usize) -> Result<usize, AssemblyError> {
        self.check_dim(dim)?;
        if dim == 0 {
            Ok(self.num_vertices)
        } else if dim == self.dim() {
            Ok(self.num_cells())
        } else {
            Ok(self.entities(dim).vertices.len())
        }
    }

    /// Connectivity `(d0, d1)`, computing it (and whatever it depends on) if necessary.
    pub fn connectivity(&self, d0: usize, d1: usize) -> Result<&MeshConnectivity, AssemblyError> {
        self.check_dim(d0)?;
        self.check_dim(d1)?;
        let tdim = self.dim();

        if d0 == tdim && d1 == 0 {
            Ok(&self.cells)
        } else if d0 == tdim && d1 != tdim {
            Ok(&self.entities(d1).cell_entities)
        } else if d1 == 0 && d0 != 0 {
            Ok(&self.entities(d0).vertices)
        } else {
            self.cache.connectivity[d0][d1].get_or_try_init(|| self.compute_connectivity(d0, d1))
        }
    }

    /// Whether connectivity `(d0, d1)` is available without further computation.
    pub fn is_computed(&self, d0: usize, d1: usize) -> bool {
        let tdim = self.dim();
        if d0 > tdim || d1 > tdim {
            false
        } else if d0 == tdim && d1 == 0 {
            true
        } else if d0 == tdim && d1 != tdim {
            self.cache.entities[d1].get().is_some()
        } else if d1 == 0 && d0 != 0 {
            self.cache.entities[d0].get().is_some()
        } else {
            self.cache.connectivity[d0][d1].get().is_some()
        }
    }

    /// Compute all entities and the connectivity between all pairs of dimensions.
    pub fn init(&self) -> Result<(), AssemblyError> {
        for (d0, d1) in iproduct!(0..=self.dim(), 0..=self.dim()) {
            self.connectivity(d0, d1)?;
        }
        Ok(())
    }

    /// Entities of dimension `0 < dim < tdim`.
    fn entities(&self, dim: usize) -> &EntitySet {
        debug_assert!(dim > 0 && dim < self.dim());
        self.cache.entities[dim].get_or_init(|| self.compute_entities(dim))
    }

    /// Derive the entities of dimension `dim` from the cell-vertex incidence.
    ///
    /// Each local sub-entity of each cell is identified by its sorted vertex tuple. Sorting all
    /// tuples groups identical sub-entities of neighboring cells, and consecutive distinct
    /// tuples receive consecutive entity indices.
    fn compute_entities(&self, dim: usize) -> EntitySet {
        let local_entities = self.cell_type.entity_vertices(dim);
        let entities_per_cell = local_entities.len();
        let num_cells = self.num_cells();

        let mut keys = Vec::with_capacity(num_cells * entities_per_cell);
        for (cell_index, cell) in self.cells.iter().enumerate() {
            for (local_index, local) in local_entities.iter().enumerate() {
                let mut key = [usize::MAX; 4];
                for (k, &v) in local.iter().enumerate() {
                    key[k] = cell[v];
                }
                key[..local.len()].sort_unstable();
                keys.push((key, entities_per_cell * cell_index + local_index));
            }
        }
        keys.par_sort_unstable();

        let num_entity_vertices = dim + 1;
        let mut cell_entities = vec![0; num_cells * entities_per_cell];
        let mut entity_vertices = Vec::new();
        let mut previous_key = None;
        let mut num_entities = 0;
        for (key, position) in keys {
            if previous_key != Some(key) {
                entity_vertices.extend_from_slice(&key[..num_entity_vertices]);
                previous_key = Some(key);
                num_entities += 1;
            }
            cell_entities[position] = num_entities - 1;
        }

        debug!("Computed {num_entities} mesh entities of dimension {dim}");
        EntitySet {
            vertices: MeshConnectivity::from_uniform(num_entity_vertices, entity_vertices),
            cell_entities: MeshConnectivity::from_uniform(entities_per_cell, cell_entities),
        }
    }

    fn compute_connectivity(&self, d0: usize, d1: usize) -> Result<MeshConnectivity, AssemblyError> {
        debug!("Computing mesh connectivity {d0} - {d1}");
        if d0 == d1 {
            Ok(MeshConnectivity::identity(self.num_entities(d0)?))
        } else if d0 < d1 {
            let num_targets = self.num_entities(d0)?;
            Ok(self.connectivity(d1, d0)?.transpose(num_targets))
        } else {
            self.compute_from_map(d0, d1)
        }
    }

    /// Connectivity `(d0, d1)` for `tdim > d0 > d1 > 0`, found by looking up the sorted vertex
    /// tuples of the sub-entities of each `d0` entity among the `d1` entities.
    fn compute_from_map(&self, d0: usize, d1: usize) -> Result<MeshConnectivity, AssemblyError> {
        let entity_type = self
            .cell_type
            .entity_type(d0)
            .ok_or(TopologyError::InvalidDimension {
                dim: d0,
                topological_dim: self.dim(),
            })?;

        let d1_vertices = self.connectivity(d1, 0)?;
        let index_of: FxHashMap<&[usize], usize> = d1_vertices
            .iter()
            .enumerate()
            .map(|(index, vertices)| (vertices, index))
            .collect();

        let d0_vertices = self.connectivity(d0, 0)?;
        let mut indices = Vec::with_capacity(d0_vertices.len() * entity_type.num_entities(d1));
        for vertices in d0_vertices.iter() {
            for key in entity_type.create_entities(d1, vertices) {
                let index = index_of.get(key.as_slice()).copied().ok_or_else(|| {
                    TopologyError::InvalidMesh(format!("entity {key:?} of dimension {d1} not found"))
                })?;
                indices.push(index);
            }
        }

        Ok(MeshConnectivity::from_uniform(entity_type.num_entities(d1), indices))
    }
}
