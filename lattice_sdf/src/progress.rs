/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines progress reporting messages, sinks, and helper functions for long-running solves.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Progress reporting primitives for long-running solves.

use std::fmt::Debug;
use std::sync::{Arc, mpsc};
use std::thread;

/// Progress events emitted while solving a lattice field.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMsg {
    /// Iteration status of the conjugate gradient solver.
    SolverIteration { iter: usize, residual: f64, progress: f64 },

    /// Completion of one Schwarz sweep over all tile colours of a lattice level.
    TileSweep {
        level: usize,
        sweep: usize,
        num_tiles: usize,
        residual: f64,
    },

    /// A lattice level of the multiresolution solve has been solved.
    /// Level `0` is the full resolution lattice.
    LevelSolved { level: usize, num_unknowns: usize },

    /// Informational message, such as a coarse level that failed and was replaced by zeros.
    Message { message: String },
}

/// Sink that consumes progress messages.
pub trait ProgressSink: Send + Sync + Debug {
    fn emit(&self, msg: ProgressMsg);
}

/// Progress sink that forwards messages over a channel.
#[derive(Debug)]
pub struct ClosureSink {
    tx: mpsc::SyncSender<ProgressMsg>,
}

impl ProgressSink for ClosureSink {
    #[inline]
    fn emit(&self, msg: ProgressMsg) {
        let _ = self.tx.try_send(msg);
    }
}

/// Spawns a listener thread that runs a handler closure for each progress message.
///
/// Messages are dropped rather than blocking the solver when the buffer is full.
/// The listener exits once every clone of the returned sink has been dropped.
pub fn closure_sink<F>(
    buffer: usize,
    mut handler: F,
) -> (Arc<dyn ProgressSink>, thread::JoinHandle<()>)
where
    F: FnMut(ProgressMsg) + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel::<ProgressMsg>(buffer.max(1));
    let sink: Arc<dyn ProgressSink> = Arc::new(ClosureSink { tx });

    let handle = thread::spawn(move || {
        while let Ok(msg) = rx.recv() {
            handler(msg);
        }
    });

    (sink, handle)
}

/// Calculates the fractional progress of an iterative solve from the
/// current residual, the starting residual, and the target tolerance,
/// on a logarithmic scale. Returns a value in `[0, 1]`.
#[inline]
pub(crate) fn progress_from_rel(current_res: f64, start_res: f64, target_res: f64) -> f64 {
    if current_res <= target_res {
        1.0
    } else if start_res <= target_res || current_res >= start_res {
        0.0
    } else {
        ((start_res.log10() - current_res.log10()) / (start_res.log10() - target_res.log10()))
            .clamp(0.0, 1.0)
    }
}
