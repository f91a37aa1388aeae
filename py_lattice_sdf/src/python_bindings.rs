/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements PyO3 bindings, configuration wrappers, and NumPy conversion utilities for lattice_sdf.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::Mat;
use faer_ext::IntoFaer;
use lattice_sdf::{self, config, progress, test_shapes};
use numpy::{PyArray1, PyArray2, PyArrayMethods, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::{PyOSError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyList;
use std::sync::Arc;

/// Convert a `faer::Mat<T>` to a NumPy array.
pub fn mat_to_numpy<'py, T>(mat: &Mat<T>, py: Python<'py>) -> Bound<'py, PyArray2<T>>
where
    T: numpy::Element + Copy,
{
    let (nrows, ncols) = mat.shape();

    let array = PyArray2::<T>::zeros(py, [nrows, ncols], false);
    let mut slice_mut = unsafe { array.as_array_mut() };

    for i in 0..nrows {
        for j in 0..ncols {
            slice_mut[[i, j]] = *mat.get(i, j);
        }
    }

    array
}

#[pyclass(eq, eq_int)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradientKernel {
    NearestNeighbor,
    CellEdges,
    LinearInterpolation,
}

impl From<GradientKernel> for config::GradientKernel {
    fn from(k: GradientKernel) -> config::GradientKernel {
        match k {
            GradientKernel::NearestNeighbor => config::GradientKernel::NearestNeighbor,
            GradientKernel::CellEdges => config::GradientKernel::CellEdges,
            GradientKernel::LinearInterpolation => config::GradientKernel::LinearInterpolation,
        }
    }
}

impl From<config::GradientKernel> for GradientKernel {
    fn from(k: config::GradientKernel) -> GradientKernel {
        match k {
            config::GradientKernel::NearestNeighbor => GradientKernel::NearestNeighbor,
            config::GradientKernel::CellEdges => GradientKernel::CellEdges,
            config::GradientKernel::LinearInterpolation => GradientKernel::LinearInterpolation,
        }
    }
}

#[pyclass]
#[derive(Debug, Clone, Copy)]
pub struct Weights {
    inner: config::Weights,
}

#[pymethods]
impl Weights {
    #[new]
    #[pyo3(signature=(
        *,
        data_pos = 1.0,
        data_gradient = 1.0,
        model_0 = 0.0,
        model_1 = 0.0,
        model_2 = 1.0,
        model_3 = 0.0,
        model_4 = 0.0,
        gradient_smoothness = 0.0,
        gradient_kernel = GradientKernel::CellEdges,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        data_pos: f64,
        data_gradient: f64,
        model_0: f64,
        model_1: f64,
        model_2: f64,
        model_3: f64,
        model_4: f64,
        gradient_smoothness: f64,
        gradient_kernel: GradientKernel,
    ) -> PyResult<Self> {
        Ok(Self {
            inner: config::Weights {
                data_pos,
                data_gradient,
                model_0,
                model_1,
                model_2,
                model_3,
                model_4,
                gradient_smoothness,
                gradient_kernel: gradient_kernel.into(),
            },
        })
    }

    #[getter]
    fn gradient_kernel(&self) -> GradientKernel {
        self.inner.gradient_kernel.into()
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self.inner)
    }
}

#[pyclass]
#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    inner: config::SolveOptions,
}

#[pymethods]
impl SolveOptions {
    #[new]
    #[pyo3(signature=(
        *,
        downscale_factor = None,
        tile = None,
        tile_size = None,
        cg = None,
        error_tolerance = None,
        max_iterations = None,
    ))]
    fn new(
        downscale_factor: Option<usize>,
        tile: Option<bool>,
        tile_size: Option<usize>,
        cg: Option<bool>,
        error_tolerance: Option<f64>,
        max_iterations: Option<usize>,
    ) -> PyResult<Self> {
        if downscale_factor == Some(0) {
            return Err(PyValueError::new_err("downscale_factor must be at least 1"));
        }
        if tile_size == Some(0) {
            return Err(PyValueError::new_err("tile_size must be at least 1"));
        }

        let mut builder = config::SolveOptions::builder();
        if let Some(v) = downscale_factor {
            builder = builder.downscale_factor(v);
        }
        if let Some(v) = tile {
            builder = builder.tile(v);
        }
        if let Some(v) = tile_size {
            builder = builder.tile_size(v);
        }
        if let Some(v) = cg {
            builder = builder.cg(v);
        }
        if let Some(v) = error_tolerance {
            builder = builder.error_tolerance(v);
        }
        if let Some(v) = max_iterations {
            builder = builder.max_iterations(v);
        }

        Ok(Self {
            inner: builder.build(),
        })
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self.inner)
    }
}

#[pyclass]
#[derive(Debug, Clone, Copy)]
pub struct FieldSettings {
    inner: config::FieldSettings,
}

#[pymethods]
impl FieldSettings {
    #[new]
    #[pyo3(signature=(weights = None, solve_options = None))]
    fn new(weights: Option<Weights>, solve_options: Option<SolveOptions>) -> Self {
        Self {
            inner: config::FieldSettings {
                weights: weights.map(|w| w.inner).unwrap_or_default(),
                solve_options: solve_options.map(|o| o.inner).unwrap_or_default(),
            },
        }
    }

    #[getter]
    fn weights(&self) -> Weights {
        Weights {
            inner: self.inner.weights,
        }
    }

    #[getter]
    fn solve_options(&self) -> SolveOptions {
        SolveOptions {
            inner: self.inner.solve_options,
        }
    }

    fn save(&self, path: &str) -> PyResult<()> {
        self.inner.save(path).map_err(config_error_to_py)
    }

    #[staticmethod]
    fn load(path: &str) -> PyResult<Self> {
        let inner = config::FieldSettings::load(path).map_err(config_error_to_py)?;
        Ok(Self { inner })
    }
}

fn config_error_to_py(err: config::ConfigIOError) -> PyErr {
    use config::ConfigIOError::*;
    let io_to_py = |path: &std::path::PathBuf, e: &std::io::Error, action: &str| {
        let msg = format!("{} {}: {}", action, path.display(), e);
        if let Some(code) = e.raw_os_error() {
            PyOSError::new_err((code, msg))
        } else {
            PyOSError::new_err(msg)
        }
    };

    match err {
        Create { path, source } => io_to_py(&path, &source, "creating"),
        Open { path, source } => io_to_py(&path, &source, "opening"),
        Flush { path, source } => io_to_py(&path, &source, "flushing"),
        other => PyOSError::new_err(other.to_string()),
    }
}

#[pyclass]
pub struct ProgressEvent;

#[pyclass]
pub struct SolverIteration {
    #[pyo3(get)]
    pub iter: usize,
    #[pyo3(get)]
    pub residual: f64,
    #[pyo3(get)]
    pub progress: f64,
}

#[pyclass]
pub struct TileSweep {
    #[pyo3(get)]
    pub level: usize,
    #[pyo3(get)]
    pub sweep: usize,
    #[pyo3(get)]
    pub num_tiles: usize,
    #[pyo3(get)]
    pub residual: f64,
}

#[pyclass]
pub struct LevelSolved {
    #[pyo3(get)]
    pub level: usize,
    #[pyo3(get)]
    pub num_unknowns: usize,
}

#[pyclass]
pub struct Message {
    #[pyo3(get)]
    pub message: String,
}

fn map_msg_to_py(py: Python<'_>, msg: progress::ProgressMsg) -> PyResult<Py<PyAny>> {
    Ok(match msg {
        progress::ProgressMsg::SolverIteration { iter, residual, progress } => {
            Py::new(py, SolverIteration { iter, residual, progress })?.into()
        }
        progress::ProgressMsg::TileSweep { level, sweep, num_tiles, residual } => {
            Py::new(py, TileSweep { level, sweep, num_tiles, residual })?.into()
        }
        progress::ProgressMsg::LevelSolved { level, num_unknowns } => {
            Py::new(py, LevelSolved { level, num_unknowns })?.into()
        }
        progress::ProgressMsg::Message { message } => Py::new(py, Message { message })?.into(),
    })
}

#[derive(Debug)]
struct PyProgressSink {
    callback: Option<Py<PyAny>>,
}

impl progress::ProgressSink for PyProgressSink {
    fn emit(&self, msg: progress::ProgressMsg) {
        if let Some(cb) = self.callback.as_ref() {
            Python::attach(|py| {
                let result = map_msg_to_py(py, msg).and_then(|obj| cb.call1(py, (obj,)));
                if let Err(e) = result {
                    e.print(py); // don't crash on callback exceptions
                }
            });
        }
    }
}

#[pyclass]
pub struct Progress {
    sink: Arc<dyn progress::ProgressSink>,
}

#[pymethods]
impl Progress {
    /// Create a synchronous progress sink.
    #[new]
    #[pyo3(signature=(callback=None))]
    fn new(callback: Option<Py<PyAny>>) -> PyResult<Self> {
        let sink: Arc<dyn progress::ProgressSink> = Arc::new(PyProgressSink { callback });
        Ok(Self { sink })
    }
}

impl Progress {
    pub fn __clone_sink__(&self) -> Arc<dyn progress::ProgressSink> {
        self.sink.clone()
    }
}

#[pyclass(eq, eq_int)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveMode {
    Exact,
    Approximate,
}

impl From<SolveMode> for lattice_sdf::SolveMode {
    fn from(m: SolveMode) -> lattice_sdf::SolveMode {
        match m {
            SolveMode::Exact => lattice_sdf::SolveMode::Exact,
            SolveMode::Approximate => lattice_sdf::SolveMode::Approximate,
        }
    }
}

/// Owned copies of the sample arrays, checked against the lattice.
struct Samples {
    positions: Mat<f64>,
    normals: Option<Mat<f64>>,
    point_weights: Option<Vec<f64>>,
}

fn extract_samples(
    sizes: &[usize],
    positions: PyReadonlyArray2<'_, f64>,
    normals: Option<PyReadonlyArray2<'_, f64>>,
    point_weights: Option<PyReadonlyArray1<'_, f64>>,
) -> PyResult<Samples> {
    if sizes.is_empty() || sizes.len() > lattice_sdf::MAX_DIM {
        return Err(PyValueError::new_err(format!(
            "sizes must have between 1 and {} entries",
            lattice_sdf::MAX_DIM
        )));
    }
    if sizes.contains(&0) {
        return Err(PyValueError::new_err("every lattice size must be positive"));
    }

    let positions: Mat<f64> = positions.into_faer().to_owned();
    if positions.ncols() != sizes.len() {
        return Err(PyValueError::new_err(
            "positions must have one column per lattice dimension",
        ));
    }

    let normals: Option<Mat<f64>> = normals.map(|n| n.into_faer().to_owned());
    if normals.as_ref().is_some_and(|n| n.shape() != positions.shape()) {
        return Err(PyValueError::new_err("normals must have the same shape as positions"));
    }

    let point_weights = point_weights
        .map(|w| w.to_vec())
        .transpose()
        .map_err(|_| PyValueError::new_err("point_weights must be a contiguous array"))?;
    if point_weights.as_ref().is_some_and(|w| w.len() != positions.nrows()) {
        return Err(PyValueError::new_err("point_weights must have one entry per point"));
    }

    Ok(Samples {
        positions,
        normals,
        point_weights,
    })
}

/// Reconstructs a signed distance field on a lattice from boundary samples.
///
/// Returns one value per lattice node, the first axis varying fastest.
#[pyfunction]
#[pyo3(signature = (
    sizes,
    positions,
    normals = None,
    point_weights = None,
    *,
    settings = None,
    mode = SolveMode::Exact,
    progress_callback = None,
))]
#[allow(clippy::too_many_arguments)]
pub fn generate_sdf<'py>(
    py: Python<'py>,
    sizes: Vec<usize>,
    positions: PyReadonlyArray2<'_, f64>,
    normals: Option<PyReadonlyArray2<'_, f64>>,
    point_weights: Option<PyReadonlyArray1<'_, f64>>,
    settings: Option<FieldSettings>,
    mode: SolveMode,
    progress_callback: Option<Py<Progress>>,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let samples = extract_samples(&sizes, positions, normals, point_weights)?;
    let settings = settings.map(|s| s.inner).unwrap_or_default();
    let sink = progress_callback.map(|p| p.borrow(py).__clone_sink__());

    // Run the heavy work without the GIL
    let sdf = py.detach(|| {
        lattice_sdf::generate_sdf_with_progress(
            &sizes,
            &settings,
            samples.positions.as_ref(),
            samples.normals.as_ref().map(|n| n.as_ref()),
            samples.point_weights.as_deref(),
            mode.into(),
            sink,
        )
    });

    Ok(PyArray1::from_vec(py, sdf))
}

/// Per-node heatmap of the squared equation errors left by `solution`.
#[pyfunction]
#[pyo3(signature = (sizes, solution, positions, normals = None, point_weights = None, *, weights = None))]
pub fn generate_error_map<'py>(
    py: Python<'py>,
    sizes: Vec<usize>,
    solution: PyReadonlyArray1<'_, f64>,
    positions: PyReadonlyArray2<'_, f64>,
    normals: Option<PyReadonlyArray2<'_, f64>>,
    point_weights: Option<PyReadonlyArray1<'_, f64>>,
    weights: Option<Weights>,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let samples = extract_samples(&sizes, positions, normals, point_weights)?;
    let solution = solution
        .to_vec()
        .map_err(|_| PyValueError::new_err("solution must be a contiguous array"))?;
    if solution.len() != sizes.iter().product::<usize>() {
        return Err(PyValueError::new_err("solution must have one value per lattice node"));
    }
    let weights = weights.map(|w| w.inner).unwrap_or_default();

    let heatmap = py.detach(|| {
        let field = lattice_sdf::sdf_from_points(
            &sizes,
            &weights,
            samples.positions.as_ref(),
            samples.normals.as_ref().map(|n| n.as_ref()),
            samples.point_weights.as_deref(),
        );
        let (triplets, rhs) = field.into_equation().into_parts();
        lattice_sdf::generate_error_map(&triplets, &solution, &rhs)
    });

    Ok(PyArray1::from_vec(py, heatmap))
}

#[pyclass]
#[derive(Debug, Clone, Copy)]
pub struct Shape {
    inner: test_shapes::Shape,
}

#[pymethods]
impl Shape {
    #[new]
    #[pyo3(signature=(
        *,
        inverted = false,
        num_points = 64,
        center = 0.5,
        radius = 0.35,
        squareness = 0.0,
        angle_offset = 0.0,
    ))]
    fn new(
        inverted: bool,
        num_points: usize,
        center: f64,
        radius: f64,
        squareness: f64,
        angle_offset: f64,
    ) -> Self {
        Self {
            inner: test_shapes::Shape {
                inverted,
                num_points,
                center,
                radius,
                squareness,
                angle_offset,
            },
        }
    }

    fn expected_area(&self) -> f64 {
        self.inner.expected_area()
    }
}

#[pyclass]
#[derive(Debug, Clone, Copy)]
pub struct Noise {
    inner: test_shapes::Noise,
}

#[pymethods]
impl Noise {
    #[new]
    #[pyo3(signature=(*, seed = 0, position = 0.005, direction = 0.05))]
    fn new(seed: u64, position: f64, direction: f64) -> Self {
        Self {
            inner: test_shapes::Noise {
                seed,
                position,
                direction,
            },
        }
    }
}

/// The default scene: a disc with a small hole in its middle.
#[pyfunction]
pub fn default_shapes(py: Python<'_>) -> PyResult<Bound<'_, PyList>> {
    let shapes = test_shapes::default_shapes()
        .into_iter()
        .map(|inner| Shape { inner })
        .collect::<Vec<_>>();
    PyList::new(py, shapes)
}

/// Samples shapes in the unit square, or on a square lattice with `resolution` nodes per
/// axis. Returns `(positions, normals)`.
#[pyfunction]
#[pyo3(signature = (shapes, *, noise = None, resolution = None))]
pub fn sample_shapes<'py>(
    py: Python<'py>,
    shapes: Vec<Shape>,
    noise: Option<Noise>,
    resolution: Option<usize>,
) -> (Bound<'py, PyArray2<f64>>, Bound<'py, PyArray2<f64>>) {
    let shapes: Vec<test_shapes::Shape> = shapes.iter().map(|s| s.inner).collect();
    let noise = noise.map(|n| n.inner);

    let samples = test_shapes::sample_shapes(&shapes, noise.as_ref());
    let samples = match resolution {
        Some(resolution) => samples.to_lattice(resolution),
        None => samples,
    };

    (
        mat_to_numpy(&samples.positions, py),
        mat_to_numpy(&samples.normals, py),
    )
}
