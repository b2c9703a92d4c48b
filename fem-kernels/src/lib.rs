//! Hand-written local kernels for `fem-assembly`.
//!
//! The forms in this crate use affine simplex elements, for which all integrals can be
//! evaluated in closed form, so no quadrature is involved. They serve as reference
//! implementations of the [`Form`](fem_assembly::form::Form) interface for testing and
//! benchmarking assembly.
pub mod layouts;

mod bilinear;
mod functionals;
mod geometry;
mod linear;

pub use bilinear::{InteriorPenaltyForm, MassForm, StiffnessForm};
pub use functionals::{BoundaryMeasure, SubdomainIndicator, VolumeFunctional};
pub use geometry::barycentric_gradients;
pub use linear::LoadForm;
