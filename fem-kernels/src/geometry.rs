use fem_assembly::nalgebra::allocator::Allocator;
use fem_assembly::nalgebra::{DMatrix, DefaultAllocator, DimName, OPoint};
use fem_assembly::Real;
use numeric_literals::replace_float_literals;

/// Gradients of the barycentric coordinates of a simplex.
///
/// Column `i` of the returned `gdim x (tdim + 1)` matrix is the gradient of the barycentric
/// coordinate of vertex `i`, which is also the gradient of the P1 basis function of that vertex.
/// For cells embedded in a higher-dimensional space the gradients are tangential to the cell.
pub fn barycentric_gradients<T, D>(vertices: &[OPoint<T, D>]) -> eyre::Result<DMatrix<T>>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let Some((x0, rest)) = vertices.split_first() else {
        eyre::bail!("cannot compute gradients of a cell without vertices")
    };
    let tdim = rest.len();
    let gdim = D::dim();
    if tdim > gdim {
        eyre::bail!("cell with {} vertices cannot be embedded in {} dimensions", vertices.len(), gdim);
    }

    let jacobian = DMatrix::from_fn(gdim, tdim, |r, c| rest[c][r] - x0[r]);
    let metric = jacobian.transpose() * &jacobian;
    let metric_inv = metric
        .try_inverse()
        .ok_or_else(|| eyre::eyre!("degenerate cell"))?;
    // Columns are the gradients of the barycentric coordinates of vertices 1..=tdim
    let gradients = jacobian * metric_inv;

    let mut result = DMatrix::zeros(gdim, tdim + 1);
    for i in 0..tdim {
        let g = gradients.column(i);
        result.column_mut(i + 1).copy_from(&g);
        result.column_mut(0).axpy(-T::one(), &g, T::one());
    }
    Ok(result)
}

/// The integral of the product of the P1 basis functions of local vertices `i` and `j` over a
/// simplex of dimension `dim` and measure `measure`.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub(crate) fn p1_mass_entry<T: Real>(measure: T, dim: usize, i: usize, j: usize) -> T {
    let denominator = T::from_usize((dim + 1) * (dim + 2)).expect("dimension must fit in T");
    let factor = if i == j { 2.0 } else { 1.0 };
    measure * factor / denominator
}
