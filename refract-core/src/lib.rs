pub mod algorithm;
pub mod complex;
pub mod double_double;
pub mod error;
pub mod kernel;
pub mod limb;
pub mod navigation;
pub mod precision;
pub mod viewport;

// Re-export primary types for convenience.
pub use algorithm::Algorithm;
pub use complex::Complex;
pub use double_double::DoubleDouble;
pub use error::CoreError;
pub use kernel::{compute_band, iterate_point, Band, KernelParams};
pub use limb::{Limb, LimbProfile};
pub use navigation::Navigation;
pub use precision::{Precision, PrecisionMode, Real};
pub use viewport::ViewportBounds;

/// Convenience result type for the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
