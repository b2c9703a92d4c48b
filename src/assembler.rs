//! The assembly loops over cells and facets.
//!
//! An [`Assembler`] resolves the dof maps of a form through a [`DofMapCache`], prepares the
//! global tensor and then visits, in ascending index order,
//!
//! 1. every cell, if the form has cell integrals,
//! 2. every exterior facet, if the form has exterior facet integrals,
//! 3. every interior facet, if the form has interior facet integrals,
//!
//! calling the local kernel and adding the local tensor into the global tensor. Finally the
//! global tensor is finalized with [`apply`](GlobalTensor::apply).
use crate::context::LocalAssemblyContext;
use crate::dofmap::{DofMapCache, DofMapSet};
use crate::error::{AssemblyError, ConfigurationError, StateError};
use crate::form::{Form, IntegralKind};
use crate::mesh::{Mesh, MeshMarkers};
use crate::sparsity;
use crate::tensor::{GlobalTensor, TensorState};
use crate::Real;
use log::{debug, warn};
use nalgebra::allocator::Allocator;
use nalgebra::{DVector, DefaultAllocator, DimName};

/// Subdomain markers restricting the entities visited by an assembly.
///
/// The marker value of an entity is the index of the integral evaluated on it; entities whose
/// marker exceeds the number of integrals of that kind are skipped. Without markers, integral 0
/// is evaluated on every entity.
#[derive(Debug, Copy, Clone, Default)]
pub struct AssemblyDomains<'a> {
    pub cells: Option<&'a MeshMarkers>,
    pub exterior_facets: Option<&'a MeshMarkers>,
    pub interior_facets: Option<&'a MeshMarkers>,
}

impl<'a> AssemblyDomains<'a> {
    /// No restriction.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cells(mut self, markers: &'a MeshMarkers) -> Self {
        self.cells = Some(markers);
        self
    }

    pub fn with_exterior_facets(mut self, markers: &'a MeshMarkers) -> Self {
        self.exterior_facets = Some(markers);
        self
    }

    pub fn with_interior_facets(mut self, markers: &'a MeshMarkers) -> Self {
        self.interior_facets = Some(markers);
        self
    }

    fn markers(&self, kind: IntegralKind) -> Option<&'a MeshMarkers> {
        match kind {
            IntegralKind::Cell => self.cells,
            IntegralKind::ExteriorFacet => self.exterior_facets,
            IntegralKind::InteriorFacet => self.interior_facets,
        }
    }
}

fn select_subdomain(markers: Option<&MeshMarkers>, entity: usize) -> usize {
    markers.and_then(|m| m.value(entity)).unwrap_or(0)
}

/// Assembles forms into global tensors.
///
/// How the global tensor is prepared before the loops is controlled by two flags:
///
/// | `reset_tensor` | `add_values` | preparation |
/// |---|---|---|
/// | `true` (default) | `false` (default) | build the layout and [`init`](GlobalTensor::init) |
/// | `false` | `false` | keep the structure, [`zero`](GlobalTensor::zero) the values |
/// | any | `true` | keep structure and values, [`resume`](GlobalTensor::resume) |
///
/// Except for initialization, the tensor must already be initialized with the dimensions of
/// the form's arguments. With `add_values` and `reset_tensor`, a tensor that was never
/// initialized is initialized first.
#[derive(Debug, Copy, Clone)]
pub struct Assembler<'a> {
    cache: &'a DofMapCache,
    reset_tensor: bool,
    add_values: bool,
}

impl<'a> Assembler<'a> {
    pub fn new(cache: &'a DofMapCache) -> Self {
        Self {
            cache,
            reset_tensor: true,
            add_values: false,
        }
    }

    /// Whether to rebuild the structure of the global tensor before assembly (the default).
    ///
    /// Without reset, the tensor keeps its structure and its values are set to zero.
    pub fn with_reset_tensor(self, reset_tensor: bool) -> Self {
        Self { reset_tensor, ..self }
    }

    /// Whether to add the contributions of the form to the current values of the tensor.
    pub fn with_add_values(self, add_values: bool) -> Self {
        Self { add_values, ..self }
    }

    pub fn reset_tensor(&self) -> bool {
        self.reset_tensor
    }

    pub fn add_values(&self) -> bool {
        self.add_values
    }

    pub fn cache(&self) -> &'a DofMapCache {
        self.cache
    }

    /// Assemble `form` on `mesh` into `tensor`.
    ///
    /// `coefficients` holds one global vector per coefficient of the form, indexed by the
    /// global dofs of the coefficient's dof map.
    pub fn assemble<T, D, F, G>(
        &self,
        tensor: &mut G,
        form: &F,
        mesh: &Mesh<T, D>,
        coefficients: &[&DVector<T>],
        domains: AssemblyDomains,
    ) -> Result<(), AssemblyError>
    where
        T: Real,
        D: DimName,
        F: ?Sized + Form<T, D>,
        G: ?Sized + GlobalTensor<T>,
        DefaultAllocator: Allocator<T, D>,
    {
        check_form_rank(form.rank())?;
        check_mesh_ordered(mesh)?;
        let dof_maps = DofMapSet::from_form(form, mesh, self.cache)?;
        self.assemble_with_dof_maps(tensor, form, mesh, &dof_maps, coefficients, domains)
    }

    /// Assemble `form` into `tensor` using the given dof maps instead of those of the cache.
    pub fn assemble_with_dof_maps<T, D, F, G>(
        &self,
        tensor: &mut G,
        form: &F,
        mesh: &Mesh<T, D>,
        dof_maps: &DofMapSet,
        coefficients: &[&DVector<T>],
        domains: AssemblyDomains,
    ) -> Result<(), AssemblyError>
    where
        T: Real,
        D: DimName,
        F: ?Sized + Form<T, D>,
        G: ?Sized + GlobalTensor<T>,
        DefaultAllocator: Allocator<T, D>,
    {
        let rank = form.rank();
        if tensor.rank() != rank {
            return Err(ConfigurationError::TensorRankMismatch {
                form_rank: rank,
                tensor_rank: tensor.rank(),
            }
            .into());
        }
        check_inputs(form, mesh, dof_maps, coefficients, &domains)?;

        let kinds = [IntegralKind::Cell, IntegralKind::ExteriorFacet, IntegralKind::InteriorFacet];
        if kinds.iter().all(|&kind| form.num_integrals(kind) == 0) {
            warn!("Assembling rank-{} form without integrals, the result is zero", rank);
        }

        self.prepare_tensor(&mut *tensor, mesh, dof_maps, form.num_interior_facet_integrals() > 0)?;

        let mut context = LocalAssemblyContext::new(mesh, dof_maps);
        for kind in kinds {
            if form.num_integrals(kind) == 0 {
                continue;
            }
            debug!("Assembling rank-{} tensor over {}", rank, kind.description());
            let markers = domains.markers(kind);
            let visited = match kind {
                IntegralKind::Cell => assemble_cells(&mut *tensor, form, mesh, dof_maps, coefficients, markers, &mut context)?,
                IntegralKind::ExteriorFacet => {
                    assemble_exterior_facets(&mut *tensor, form, mesh, dof_maps, coefficients, markers, &mut context)?
                }
                IntegralKind::InteriorFacet => {
                    assemble_interior_facets(&mut *tensor, form, mesh, dof_maps, coefficients, markers, &mut context)?
                }
            };
            debug!("Visited {} {}", visited, kind.description());
        }

        tensor.apply()
    }

    fn prepare_tensor<T, D, G>(
        &self,
        tensor: &mut G,
        mesh: &Mesh<T, D>,
        dof_maps: &DofMapSet,
        interior_facets: bool,
    ) -> Result<(), AssemblyError>
    where
        T: Real,
        D: DimName,
        G: ?Sized + GlobalTensor<T>,
        DefaultAllocator: Allocator<T, D>,
    {
        let initialized = tensor.state() != TensorState::Uninitialized;
        if self.reset_tensor && !(self.add_values && initialized) {
            return tensor.init(sparsity::build(mesh, dof_maps, true, interior_facets)?);
        }

        if !initialized {
            return Err(StateError::Uninitialized.into());
        }
        let expected = dof_maps.global_dimensions();
        let dims = tensor.dims();
        if dims != expected {
            return Err(StateError::IncompatibleLayout(format!(
                "tensor has dimensions {dims:?}, form arguments have dimensions {expected:?}"
            ))
            .into());
        }
        if self.add_values {
            tensor.resume()
        } else {
            tensor.zero()
        }
    }

    /// Evaluate the cell integral of a functional on every cell separately.
    ///
    /// Returns one value per cell. Cells are not restricted by markers and integral 0 is used
    /// on every cell.
    pub fn assemble_cell_values<T, D, F>(
        &self,
        form: &F,
        mesh: &Mesh<T, D>,
        coefficients: &[&DVector<T>],
    ) -> Result<DVector<T>, AssemblyError>
    where
        T: Real,
        D: DimName,
        F: ?Sized + Form<T, D>,
        DefaultAllocator: Allocator<T, D>,
    {
        if form.rank() != 0 {
            return Err(ConfigurationError::TensorRankMismatch {
                form_rank: form.rank(),
                tensor_rank: 0,
            }
            .into());
        }
        check_mesh_ordered(mesh)?;
        let dof_maps = DofMapSet::from_form(form, mesh, self.cache)?;
        check_inputs(form, mesh, &dof_maps, coefficients, &AssemblyDomains::default())?;

        let mut values = DVector::zeros(mesh.num_cells());
        let integral = match form.num_cell_integrals() {
            0 => None,
            _ => form.cell_integral(0),
        };
        if let Some(integral) = integral {
            let mut context = LocalAssemblyContext::new(mesh, &dof_maps);
            for cell in 0..mesh.num_cells() {
                context.update_cell(mesh, cell, &dof_maps, coefficients)?;
                context.tabulate_cell(integral)?;
                values[cell] = context.tensor()[0];
            }
        }
        Ok(values)
    }
}

fn check_form_rank(rank: usize) -> Result<(), ConfigurationError> {
    if rank > 2 {
        Err(ConfigurationError::UnsupportedRank(rank))
    } else {
        Ok(())
    }
}

fn check_mesh_ordered<T, D>(mesh: &Mesh<T, D>) -> Result<(), ConfigurationError>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    if mesh.is_ordered() {
        Ok(())
    } else {
        Err(ConfigurationError::UnorderedMesh)
    }
}

/// Validate everything that can be validated before touching the tensor.
fn check_inputs<T, D, F>(
    form: &F,
    mesh: &Mesh<T, D>,
    dof_maps: &DofMapSet,
    coefficients: &[&DVector<T>],
    domains: &AssemblyDomains,
) -> Result<(), AssemblyError>
where
    T: Real,
    D: DimName,
    F: ?Sized + Form<T, D>,
    DefaultAllocator: Allocator<T, D>,
{
    check_form_rank(form.rank())?;
    let num_arguments = form.rank() + form.num_coefficients();
    if dof_maps.rank() != form.rank() || dof_maps.len() != num_arguments {
        return Err(ConfigurationError::ArgumentCountMismatch {
            expected: num_arguments,
            actual: dof_maps.len(),
        }
        .into());
    }
    if coefficients.len() != form.num_coefficients() {
        return Err(ConfigurationError::CoefficientCountMismatch {
            expected: form.num_coefficients(),
            actual: coefficients.len(),
        }
        .into());
    }
    for (i, (coefficient, dof_map)) in coefficients.iter().zip(dof_maps.coefficients()).enumerate() {
        if coefficient.len() != dof_map.global_dimension() {
            return Err(ConfigurationError::CoefficientSizeMismatch {
                coefficient: i,
                expected: dof_map.global_dimension(),
                actual: coefficient.len(),
            }
            .into());
        }
    }
    for dof_map in dof_maps.iter() {
        if dof_map.cell_type() != mesh.cell_type() {
            return Err(ConfigurationError::CellTypeMismatch {
                expected: mesh.cell_type(),
                actual: dof_map.cell_type(),
            }
            .into());
        }
        if dof_map.mesh_id() != mesh.id() {
            return Err(ConfigurationError::ForeignDofMap.into());
        }
    }
    check_mesh_ordered(mesh)?;

    let tdim = mesh.topological_dim();
    for kind in [IntegralKind::Cell, IntegralKind::ExteriorFacet, IntegralKind::InteriorFacet] {
        if let Some(markers) = domains.markers(kind) {
            let expected_dim = match kind {
                IntegralKind::Cell => tdim,
                _ => tdim - 1,
            };
            let expected_len = mesh.num_entities(expected_dim)?;
            if markers.dim() != expected_dim || markers.len() != expected_len {
                return Err(ConfigurationError::MarkerMismatch {
                    expected_dim,
                    expected_len,
                    dim: markers.dim(),
                    len: markers.len(),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn assemble_cells<T, D, F, G>(
    tensor: &mut G,
    form: &F,
    mesh: &Mesh<T, D>,
    dof_maps: &DofMapSet,
    coefficients: &[&DVector<T>],
    markers: Option<&MeshMarkers>,
    context: &mut LocalAssemblyContext<T, D>,
) -> Result<usize, AssemblyError>
where
    T: Real,
    D: DimName,
    F: ?Sized + Form<T, D>,
    G: ?Sized + GlobalTensor<T>,
    DefaultAllocator: Allocator<T, D>,
{
    let num_integrals = form.num_cell_integrals();
    let mut visited = 0;
    for cell in 0..mesh.num_cells() {
        let subdomain = select_subdomain(markers, cell);
        if subdomain >= num_integrals {
            continue;
        }
        let Some(integral) = form.cell_integral(subdomain) else {
            continue;
        };
        context.update_cell(mesh, cell, dof_maps, coefficients)?;
        context.tabulate_cell(integral)?;
        context.add_to(tensor)?;
        visited += 1;
    }
    Ok(visited)
}

fn assemble_exterior_facets<T, D, F, G>(
    tensor: &mut G,
    form: &F,
    mesh: &Mesh<T, D>,
    dof_maps: &DofMapSet,
    coefficients: &[&DVector<T>],
    markers: Option<&MeshMarkers>,
    context: &mut LocalAssemblyContext<T, D>,
) -> Result<usize, AssemblyError>
where
    T: Real,
    D: DimName,
    F: ?Sized + Form<T, D>,
    G: ?Sized + GlobalTensor<T>,
    DefaultAllocator: Allocator<T, D>,
{
    let num_integrals = form.num_exterior_facet_integrals();
    let mut visited = 0;
    for (facet, cell) in mesh.exterior_facets()? {
        let subdomain = select_subdomain(markers, facet);
        if subdomain >= num_integrals {
            continue;
        }
        let Some(integral) = form.exterior_facet_integral(subdomain) else {
            continue;
        };
        context.update_cell(mesh, cell.cell, dof_maps, coefficients)?;
        context.tabulate_exterior_facet(integral, cell.local_facet)?;
        context.add_to(tensor)?;
        visited += 1;
    }
    Ok(visited)
}

fn assemble_interior_facets<T, D, F, G>(
    tensor: &mut G,
    form: &F,
    mesh: &Mesh<T, D>,
    dof_maps: &DofMapSet,
    coefficients: &[&DVector<T>],
    markers: Option<&MeshMarkers>,
    context: &mut LocalAssemblyContext<T, D>,
) -> Result<usize, AssemblyError>
where
    T: Real,
    D: DimName,
    F: ?Sized + Form<T, D>,
    G: ?Sized + GlobalTensor<T>,
    DefaultAllocator: Allocator<T, D>,
{
    let num_integrals = form.num_interior_facet_integrals();
    let mut visited = 0;
    for (facet, cell0, cell1) in mesh.interior_facets()? {
        let subdomain = select_subdomain(markers, facet);
        if subdomain >= num_integrals {
            continue;
        }
        let Some(integral) = form.interior_facet_integral(subdomain) else {
            continue;
        };
        context.update_cell_pair(mesh, [cell0.cell, cell1.cell], dof_maps, coefficients)?;
        context.tabulate_interior_facet(integral, [cell0.local_facet, cell1.local_facet])?;
        context.add_macro_to(tensor)?;
        visited += 1;
    }
    Ok(visited)
}
