//! # Moment Invariants Library
//!
//! The `momentinvariants` library computes geometric moments of scalar,
//! vector and matrix fields sampled on uniform grids, and normalizes them with
//! respect to translation, scale, rotation and reflection, so that a pattern
//! can be found in a field regardless of its position, size and orientation.
//!
//! ## Overview of Modules
//!
//! - **`tensor`**: `MomentTensor`, a dense tensor of dimension 2 or 3 and arbitrary
//!   rank, with contraction, outer product, eigenvectors, rotation and a
//!   `ContractionRecipe` recording how it was derived.
//!
//! - **`moment_set`**: The moments at one point and radius, one tensor per order.
//!
//! - **`basis_indexing`**: The enumeration of basis functions, mapping a flat basis
//!   index to the moment and field indices of a tensor component and back.
//!
//! - **`uniform_grid`**: Uniform grids with named point arrays, the input field.
//!
//! - **`point_locator`** and **`stencil`**: Sample neighbourhoods for integration,
//!   either the grid's own points inside a ball or a resampled lattice.
//!
//! - **`moment_integrator`**: Integrates a field against the monomial basis and
//!   stores the result as a `MomentField` of named scalar arrays.
//!
//! - **`translation_factor`**: Integrals of monomials over a ball, removed during
//!   translation normalization.
//!
//! - **`moment_array_name`**: The `radius<R>index<digits>` array naming shared with
//!   other components.
//!
//! - **`rotation`**, **`dominant_contraction`** and **`moment_normalizer`**: The
//!   invariant pipeline. Dominant directions are searched among contractions of
//!   the moments; when none exists every orientation is sampled.
//!
//! - **`pattern_detector`**: Similarity of a pattern to every point of a field.
//!
//! - **`similarity_balls`**: Local maxima of similarity fields.
//!
//! - **`transport`** and **`distributed_moments`**: Moments of a field split into
//!   pieces, exchanging partial sums across piece boundaries.
//!
//! - **`config`** and **`error`**: Options and errors shared by all of the above.

pub mod basis_indexing;
pub mod config;
pub mod distributed_moments;
pub mod dominant_contraction;
pub mod error;
pub mod moment_array_name;
pub mod moment_integrator;
pub mod moment_normalizer;
pub mod moment_set;
pub mod pattern_detector;
pub mod point_locator;
pub mod rotation;
pub mod similarity_balls;
pub mod stencil;
pub mod tensor;
pub mod translation_factor;
pub mod transport;
pub mod uniform_grid;

pub use error::{MomentsError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
