use lattice_sdf::{
    Lattice, SolveMode, generate_error_map, generate_sdf, sdf_from_points,
    config::FieldSettings,
    progress::{ProgressMsg, closure_sink},
    solve_approximate_with_progress,
    test_shapes::{Noise, default_shapes, sample_shapes},
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    // A noisy disc with a hole, scaled onto a 64 x 64 lattice
    let resolution = 64usize;
    let sizes = [resolution, resolution];
    let samples = sample_shapes(&default_shapes(), Some(&Noise::default())).to_lattice(resolution);

    // Exact solve with the default weights
    let settings = FieldSettings::default();
    let exact = generate_sdf(
        &sizes,
        &settings,
        samples.positions.as_ref(),
        Some(samples.normals.as_ref()),
        None,
        SolveMode::Exact,
    );

    // Approximate solve of the same system, printing progress as it goes
    let field = sdf_from_points(
        &sizes,
        &settings.weights,
        samples.positions.as_ref(),
        Some(samples.normals.as_ref()),
        None,
    );
    let (triplets, rhs) = field.into_equation().into_parts();

    let (sink, listener) = closure_sink(256, |msg| match msg {
        ProgressMsg::LevelSolved { level, num_unknowns } => {
            println!("level {level} solved ({num_unknowns} unknowns)")
        }
        ProgressMsg::TileSweep { level, sweep, residual, .. } => {
            println!("level {level} sweep {sweep}: residual {residual:.3e}")
        }
        ProgressMsg::Message { message } => println!("{message}"),
        _ => {}
    });
    let approximate = solve_approximate_with_progress(
        &triplets,
        &rhs,
        &sizes,
        &settings.solve_options,
        Some(sink),
    )?;
    listener.join().map_err(|_| "progress listener panicked")?;

    let max_diff = exact
        .iter()
        .zip(&approximate)
        .fold(0.0f64, |acc, (a, b)| acc.max((a - b).abs()));
    println!("max difference between exact and approximate: {max_diff:.3e}");

    // Where the exact solution struggles to satisfy the equations
    let heatmap = generate_error_map(&triplets, &exact, &rhs);
    let lattice = Lattice::new(&sizes);
    let (worst, blame) = heatmap
        .iter()
        .enumerate()
        .fold((0, 0.0f64), |acc, (i, &b)| if b > acc.1 { (i, b) } else { acc });
    println!(
        "largest blame {blame:.3e} at node {:?}",
        lattice.coordinate_from_index(worst)
    );

    Ok(())
}
