//! Finite element assembly.
//!
//! The crate turns a simplex mesh and a variational form, given as a set of local element
//! kernels, into a global tensor (scalar, vector or sparse matrix). The pipeline is
//!
//! 1. [`mesh`]: vertex coordinates and cell-vertex incidence, with lazily computed entities and
//!    connectivity between any two topological dimensions,
//! 2. [`dofmap`]: global numbering of degrees of freedom, shared between forms through a
//!    [`DofMapCache`](dofmap::DofMapCache),
//! 3. [`sparsity`]: the nonzero pattern of rank-2 tensors,
//! 4. [`assembler`]: the cell/facet loops that call the local kernels of a [`Form`](form::Form)
//!    and scatter the local tensors into a [`GlobalTensor`](tensor::GlobalTensor).
use nalgebra::RealField;

pub mod assembler;
pub mod context;
pub mod dofmap;
pub mod error;
pub mod form;
pub mod mesh;
pub mod sparsity;
pub mod tensor;

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use error::AssemblyError;

/// Scalar type used for coordinates and tensor values.
///
/// Trait alias for `RealField + Copy`.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
