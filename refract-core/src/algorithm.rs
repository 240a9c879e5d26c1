use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The escape-time formulas the kernel knows how to iterate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    #[default]
    Mandelbrot,
    Julia,
    BurningShip,
    Tricorn,
    #[serde(rename = "multibrot-3")]
    Multibrot3,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Self::Mandelbrot,
        Self::Julia,
        Self::BurningShip,
        Self::Tricorn,
        Self::Multibrot3,
    ];

    /// Stable numeric id, used as the kernel table row and shader uniform.
    #[inline]
    pub fn id(self) -> u32 {
        match self {
            Self::Mandelbrot => 0,
            Self::Julia => 1,
            Self::BurningShip => 2,
            Self::Tricorn => 3,
            Self::Multibrot3 => 4,
        }
    }

    /// Kebab-case name, as used in settings files.
    pub fn name(self) -> &'static str {
        match self {
            Self::Mandelbrot => "mandelbrot",
            Self::Julia => "julia",
            Self::BurningShip => "burning-ship",
            Self::Tricorn => "tricorn",
            Self::Multibrot3 => "multibrot-3",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Mandelbrot => "Mandelbrot",
            Self::Julia => "Julia",
            Self::BurningShip => "Burning Ship",
            Self::Tricorn => "Tricorn",
            Self::Multibrot3 => "Multibrot (d=3)",
        }
    }

    /// Julia seeds `z` with the pixel; everything else seeds `c`.
    #[inline]
    pub fn seeds_z(self) -> bool {
        self == Self::Julia
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::UnknownAlgorithm(s.to_string()))
    }
}
