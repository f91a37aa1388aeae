/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines the Python extension module and submodules for the lattice_sdf reconstruction API.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use pyo3::prelude::*;

mod python_bindings;

#[pymodule]
pub fn lattice_sdf(m: &Bound<'_, PyModule>) -> PyResult<()> {
    faer::set_global_parallelism(faer::Par::Seq);

    let cfg = PyModule::new(m.py(), "config")?;
    cfg.add_class::<python_bindings::GradientKernel>()?;
    cfg.add_class::<python_bindings::Weights>()?;
    cfg.add_class::<python_bindings::SolveOptions>()?;
    cfg.add_class::<python_bindings::FieldSettings>()?;

    m.add_submodule(&cfg)?;
    m.py().import("sys")?.getattr("modules")?.set_item("lattice_sdf.config", cfg)?;

    let prog = PyModule::new(m.py(), "progress")?;
    prog.add_class::<python_bindings::SolverIteration>()?;
    prog.add_class::<python_bindings::TileSweep>()?;
    prog.add_class::<python_bindings::LevelSolved>()?;
    prog.add_class::<python_bindings::Message>()?;
    prog.add_class::<python_bindings::ProgressEvent>()?;
    prog.add_class::<python_bindings::Progress>()?;

    m.add_submodule(&prog)?;
    m.py().import("sys")?.getattr("modules")?.set_item("lattice_sdf.progress", prog)?;

    let shapes = PyModule::new(m.py(), "test_shapes")?;
    shapes.add_class::<python_bindings::Shape>()?;
    shapes.add_class::<python_bindings::Noise>()?;
    shapes.add_function(wrap_pyfunction!(python_bindings::sample_shapes, &shapes)?)?;
    shapes.add_function(wrap_pyfunction!(python_bindings::default_shapes, &shapes)?)?;

    m.add_submodule(&shapes)?;
    m.py().import("sys")?.getattr("modules")?.set_item("lattice_sdf.test_shapes", shapes)?;

    m.add_class::<python_bindings::SolveMode>()?;

    m.add_function(wrap_pyfunction!(python_bindings::generate_sdf, m)?)?;
    m.add_function(wrap_pyfunction!(python_bindings::generate_error_map, m)?)?;
    Ok(())
}
