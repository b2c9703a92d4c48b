//! Dof layouts of common Lagrange spaces on simplices.
use fem_assembly::dofmap::DofLayout;
use fem_assembly::mesh::CellType;

/// Continuous piecewise linear elements: one dof per vertex.
pub fn p1(cell_type: CellType) -> DofLayout {
    DofLayout::new(cell_type, [1, 0, 0, 0])
}

/// Continuous piecewise quadratic elements: one dof per vertex and one per edge.
pub fn p2(cell_type: CellType) -> DofLayout {
    DofLayout::new(cell_type, [1, 1, 0, 0])
}

/// Piecewise constant elements: one dof per cell.
pub fn dg0(cell_type: CellType) -> DofLayout {
    let mut entity_dofs = [0; 4];
    entity_dofs[cell_type.dim()] = 1;
    DofLayout::new(cell_type, entity_dofs)
}

/// Discontinuous piecewise linear elements.
///
/// All dofs belong to the cell interior. Local dof `i` is the nodal value at local vertex `i`.
pub fn dg1(cell_type: CellType) -> DofLayout {
    let tdim = cell_type.dim();
    let mut entity_dofs = [0; 4];
    entity_dofs[tdim] = tdim + 1;
    DofLayout::new(cell_type, entity_dofs)
}

/// Vector-valued continuous piecewise linear elements with `components` components.
pub fn vector_p1(cell_type: CellType, components: usize) -> DofLayout {
    p1(cell_type).with_block_size(components)
}
