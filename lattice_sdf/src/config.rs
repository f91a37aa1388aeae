/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares configuration types for constraint weights, gradient kernels, and solver options.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Declares configuration types for constraint weights, gradient kernels, and solver options.
use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fmt,
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

/// Finite difference formulation used to turn a point normal into gradient equations.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum GradientKernel {
    /// Two-term forward difference from the base corner of the containing cell.
    NearestNeighbor,

    /// Average of the forward differences along every cell edge parallel to each axis.
    /// All `2^N` corners of the containing cell participate in every equation.
    #[default]
    CellEdges,

    /// Forward differences interpolated multilinearly at the point, using the cell
    /// shifted by half a node so the differences are centred on the sample.
    LinearInterpolation,
}

/// Trust weights of the data and smoothness terms of the least-squares problem.
///
/// A weight of exactly zero removes the corresponding equations from the system
/// entirely. The `model_*` weights are the orders of the finite difference
/// regulariser: `model_0` damps the field magnitude, `model_1` its slope, and so on up to
/// the fourth derivative.
///
/// ### Default Values
/// - `data_pos`: `1.0`
/// - `data_gradient`: `1.0`
/// - `model_0`, `model_1`, `model_3`, `model_4`: `0.0`
/// - `model_2`: `1.0`
/// - `gradient_smoothness`: `0.0`
/// - `gradient_kernel`: [`GradientKernel::CellEdges`]
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct Weights {
    /// Trust in the sampled positions lying on the zero level.
    pub data_pos: f64,

    /// Trust in the sampled normals as field gradients.
    pub data_gradient: f64,

    /// Penalty on the field value itself.
    pub model_0: f64,

    /// Penalty on first differences.
    pub model_1: f64,

    /// Penalty on second differences.
    pub model_2: f64,

    /// Penalty on third differences.
    pub model_3: f64,

    /// Penalty on fourth differences.
    pub model_4: f64,

    /// Penalty on mixed second differences between pairs of axes.
    pub gradient_smoothness: f64,

    /// Formulation of the gradient constraints.
    pub gradient_kernel: GradientKernel,
}

impl Default for Weights {
    fn default() -> Self {
        Weights {
            data_pos: 1.0,
            data_gradient: 1.0,
            model_0: 0.0,
            model_1: 0.0,
            model_2: 1.0,
            model_3: 0.0,
            model_4: 0.0,
            gradient_smoothness: 0.0,
            gradient_kernel: GradientKernel::CellEdges,
        }
    }
}

impl Weights {
    /// Weights of the `model_0..=model_4` regularisers, indexed by derivative order.
    pub fn model_orders(&self) -> [f64; 5] {
        [
            self.model_0,
            self.model_1,
            self.model_2,
            self.model_3,
            self.model_4,
        ]
    }
}

#[doc = include_str!("../docs/solve_options.md")]
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct SolveOptions {
    /// Integer factor between successive lattice levels. `1` disables downscaling.
    pub downscale_factor: usize,

    /// Whether to solve the lattice in overlapping tiles.
    pub tile: bool,

    /// Number of lattice nodes per tile along each axis, excluding overlap.
    pub tile_size: usize,

    /// Use conjugate gradients rather than a direct factorisation.
    pub cg: bool,

    /// Tolerance on the estimated solution error of a conjugate gradient level solve, and
    /// on the max norm of the normal equation residual `Aᵀ(b - Ax)` between tile sweeps.
    pub error_tolerance: f64,

    /// Iteration cap of the conjugate gradient solver. Also bounds the number of tile sweeps.
    pub max_iterations: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            downscale_factor: 2,
            tile: true,
            tile_size: 16,
            cg: true,
            error_tolerance: 1e-3,
            max_iterations: 2000,
        }
    }
}

impl SolveOptions {
    /// Returns a new [`SolveOptionsBuilder`] seeded with the default options.
    pub fn builder() -> SolveOptionsBuilder {
        SolveOptionsBuilder::new()
    }

    /// Number of Schwarz sweeps allowed on one lattice level.
    pub(crate) fn max_sweeps(&self) -> usize {
        (self.max_iterations / 50).max(8)
    }
}

/// A convenience builder for constructing a [`SolveOptions`] instance.
///
/// The builder should be called via the [`SolveOptions::builder`] method.
///
/// See [`SolveOptions`] for details on each field.
#[derive(Debug, Clone)]
pub struct SolveOptionsBuilder {
    options: SolveOptions,
}

impl SolveOptionsBuilder {
    fn new() -> Self {
        Self {
            options: SolveOptions::default(),
        }
    }

    /// Sets the factor between lattice levels.
    pub fn downscale_factor(mut self, downscale_factor: usize) -> Self {
        self.options.downscale_factor = downscale_factor;
        self
    }

    /// Enables or disables tiling.
    pub fn tile(mut self, tile: bool) -> Self {
        self.options.tile = tile;
        self
    }

    /// Sets the tile size.
    pub fn tile_size(mut self, tile_size: usize) -> Self {
        self.options.tile_size = tile_size;
        self
    }

    /// Selects conjugate gradients (`true`) or direct factorisation (`false`).
    pub fn cg(mut self, cg: bool) -> Self {
        self.options.cg = cg;
        self
    }

    /// Sets the convergence tolerance.
    pub fn error_tolerance(mut self, error_tolerance: f64) -> Self {
        self.options.error_tolerance = error_tolerance;
        self
    }

    /// Sets the iteration cap.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.options.max_iterations = max_iterations;
        self
    }

    /// Builds and returns a [`SolveOptions`] instance.
    ///
    /// # Panics
    /// If the downscale factor or tile size is zero.
    pub fn build(self) -> SolveOptions {
        assert!(self.options.downscale_factor >= 1, "downscale_factor must be at least 1");
        assert!(self.options.tile_size >= 1, "tile_size must be at least 1");
        self.options
    }
}

/// All settings needed to reproduce a field reconstruction.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct FieldSettings {
    pub weights: Weights,
    pub solve_options: SolveOptions,
}

const JSON_FORMAT_NAME: &str = "lattice_sdf.settings";
const JSON_VERSION: u32 = 1;

#[derive(Serialize)]
struct JsonEnvelopeRef<'a, T: ?Sized> {
    format: &'static str,
    version: u32,
    #[serde(flatten)]
    settings: &'a T,
}

#[derive(Serialize, Deserialize)]
struct JsonEnvelopeOwned<T> {
    format: String,
    version: u32,
    #[serde(flatten)]
    settings: T,
}

type ConfigIOResult<T> = std::result::Result<T, ConfigIOError>;

impl FieldSettings {
    /// Save these settings to a **JSON envelope** `{ format, version, weights, solve_options }`.
    ///
    /// ### Errors
    /// - Returns `ConfigIOError::{Create, Serialize, Flush}` on I/O or serialization
    ///   failures.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ConfigIOResult<()> {
        let path_ref = path.as_ref();
        let file = File::create(path_ref).map_err(|e| ConfigIOError::Create {
            path: path_ref.to_path_buf(),
            source: e,
        })?;
        let mut w = BufWriter::new(file);

        let env = JsonEnvelopeRef {
            format: JSON_FORMAT_NAME,
            version: JSON_VERSION,
            settings: self,
        };

        serde_json::to_writer_pretty(&mut w, &env).map_err(|e| ConfigIOError::Serialize {
            path: path_ref.to_path_buf(),
            source: e,
        })?;
        w.flush().map_err(|e| ConfigIOError::Flush {
            path: path_ref.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// Load settings from a versioned **JSON envelope**, validating format & version.
    ///
    /// ### Errors
    /// - Returns `ConfigIOError::{Open, Parse, FormatMismatch, VersionMismatch}` as appropriate.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigIOResult<Self> {
        let path_ref = path.as_ref();

        let file = File::open(path_ref).map_err(|e| ConfigIOError::Open {
            path: path_ref.to_path_buf(),
            source: e,
        })?;
        let reader = BufReader::new(file);

        let env: JsonEnvelopeOwned<Self> =
            serde_json::from_reader(reader).map_err(|e| ConfigIOError::Parse {
                path: path_ref.to_path_buf(),
                source: e,
            })?;

        if env.format != JSON_FORMAT_NAME {
            return Err(ConfigIOError::FormatMismatch {
                path: path_ref.to_path_buf(),
                found: env.format,
                expected: JSON_FORMAT_NAME,
            });
        }

        if env.version != JSON_VERSION {
            return Err(ConfigIOError::VersionMismatch {
                path: path_ref.to_path_buf(),
                found: env.version,
                expected: JSON_VERSION,
            });
        }

        Ok(env.settings)
    }
}

/// Errors that can occur when saving or loading [`FieldSettings`].
#[derive(Debug)]
pub enum ConfigIOError {
    /// Failed to create the target file before writing.
    Create { path: PathBuf, source: io::Error },
    /// Failed to open an existing settings file for reading.
    Open { path: PathBuf, source: io::Error },
    /// Failed to flush buffered output when finishing a write.
    Flush { path: PathBuf, source: io::Error },
    /// Error serializing the settings to JSON.
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Error parsing JSON when reading settings from disk.
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// The JSON `format` field does not match the expected format.
    FormatMismatch {
        path: PathBuf,
        found: String,
        expected: &'static str,
    },
    /// The JSON `version` field does not match the supported version.
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}

impl fmt::Display for ConfigIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIOError::Create { path, source } => {
                write!(f, "creating {}: {}", path.display(), source)
            }
            ConfigIOError::Open { path, source } => {
                write!(f, "opening {}: {}", path.display(), source)
            }
            ConfigIOError::Flush { path, source } => {
                write!(f, "flushing {}: {}", path.display(), source)
            }
            ConfigIOError::Serialize { path, source } => {
                write!(f, "serializing JSON to {}: {}", path.display(), source)
            }
            ConfigIOError::Parse { path, source } => {
                write!(f, "parsing JSON in {}: {}", path.display(), source)
            }
            ConfigIOError::FormatMismatch {
                path,
                found,
                expected,
            } => write!(
                f,
                "unsupported format {:?} (expected {:?}) in {}",
                found,
                expected,
                path.display()
            ),
            ConfigIOError::VersionMismatch {
                path,
                found,
                expected,
            } => write!(
                f,
                "unsupported version {} (expected {}) in {}",
                found,
                expected,
                path.display()
            ),
        }
    }
}

impl Error for ConfigIOError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigIOError::Create { source, .. }
            | ConfigIOError::Open { source, .. }
            | ConfigIOError::Flush { source, .. } => Some(source),
            ConfigIOError::Serialize { source, .. } | ConfigIOError::Parse { source, .. } => {
                Some(source)
            }
            ConfigIOError::FormatMismatch { .. } | ConfigIOError::VersionMismatch { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lattice_sdf_{}_{}.json", name, std::process::id()))
    }

    #[test]
    fn solve_options_defaults() {
        let options = SolveOptions::default();
        assert_eq!(options.downscale_factor, 2);
        assert!(options.tile);
        assert_eq!(options.tile_size, 16);
        assert!(options.cg);
        assert_eq!(options.error_tolerance, 1e-3);
    }

    #[test]
    fn builder_overrides_defaults() {
        let options = SolveOptions::builder()
            .downscale_factor(1)
            .tile(false)
            .cg(false)
            .error_tolerance(1e-8)
            .build();
        assert_eq!(options.downscale_factor, 1);
        assert!(!options.tile);
        assert!(!options.cg);
        assert_eq!(options.tile_size, 16);
        assert_eq!(options.error_tolerance, 1e-8);
    }

    #[test]
    #[should_panic]
    fn builder_rejects_zero_tile_size() {
        SolveOptions::builder().tile_size(0).build();
    }

    #[test]
    fn settings_round_trip_through_json() {
        let settings = FieldSettings {
            weights: Weights {
                model_1: 0.25,
                gradient_kernel: GradientKernel::LinearInterpolation,
                ..Weights::default()
            },
            solve_options: SolveOptions::builder().tile_size(8).build(),
        };

        let path = temp_path("round_trip");
        settings.save(&path).expect("save settings");
        let loaded = FieldSettings::load(&path).expect("load settings");
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, settings);
    }

    #[test]
    fn load_rejects_foreign_format() {
        let path = temp_path("foreign");
        let json = serde_json::json!({
            "format": "something.else",
            "version": 1,
            "weights": Weights::default(),
            "solve_options": SolveOptions::default(),
        });
        std::fs::write(&path, json.to_string()).expect("write file");

        let err = FieldSettings::load(&path).expect_err("format should be rejected");
        let _ = std::fs::remove_file(&path);

        assert!(matches!(err, ConfigIOError::FormatMismatch { .. }));
        assert!(err.to_string().contains("something.else"));
    }

    #[test]
    fn load_missing_file_reports_open_error() {
        let err = FieldSettings::load(temp_path("missing")).expect_err("file does not exist");
        assert!(matches!(err, ConfigIOError::Open { .. }));
        assert!(err.source().is_some());
    }
}
