//! Forward-modelling run loop.
//!
//! Producers synthesise traces in parallel; a single writer drains them and
//! hands each to the sinks in strict (inline, crossline) order. The writer
//! holds a min-heap keyed by task index, releasing a result only when it is
//! the next expected one, so SEG-Y order never depends on the thread
//! schedule. The result channel is bounded, which backpressures producers
//! when the writer falls behind.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use tracing::info;

use crate::error::{Result, SeisError};
use crate::output::SeisOutput;
use crate::session::Session;
use crate::trace::{self, TraceResult, TraceTask};

/// Progress sink for the run loop.
pub trait Reporter: Send {
    /// Called once with the total trace count.
    fn start(&mut self, total: usize);
    /// Called after every written trace.
    fn tick(&mut self, completed: usize);
    /// Called when the last trace is written.
    fn finish(&mut self);
}

/// 50-tick console progress bar.
#[derive(Default)]
pub struct ConsoleReporter {
    monitor_size: f64,
    next_monitor: f64,
}

impl Reporter for ConsoleReporter {
    fn start(&mut self, total: usize) {
        self.monitor_size = (total as f64 * 0.02).max(1.0);
        self.next_monitor = self.monitor_size;
        print!("\n  0%       20%       40%       60%       80%      100%\n  |    |    |    |    |    |    |    |    |    |    |  \n  ^");
    }

    fn tick(&mut self, completed: usize) {
        while completed as f64 + 1.0 >= self.next_monitor {
            self.next_monitor += self.monitor_size;
            print!("^");
            use std::io::Write;
            let _ = std::io::stdout().flush();
        }
    }

    fn finish(&mut self) {
        println!();
    }
}

/// Discards progress; used by tests.
#[derive(Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn start(&mut self, _total: usize) {}
    fn tick(&mut self, _completed: usize) {}
    fn finish(&mut self) {}
}

/// Run trace synthesis and write every requested output under `dir`.
pub fn run(session: &mut Session, dir: &Path, reporter: &mut dyn Reporter) -> Result<()> {
    let axes = session.generate_axes()?;
    let mut output = SeisOutput::new(session, &axes, dir)?;

    if session.settings.output.any_seismic() {
        let tasks = build_tasks(session);
        let n_threads = session
            .settings
            .max_threads
            .min(std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);
        info!(
            n_threads,
            n_traces = tasks.len(),
            nmo = session.settings.nmo,
            ps = session.settings.ps_seismic,
            "generating traces"
        );
        reporter.start(tasks.len());

        if n_threads <= 1 {
            for (idx, task) in tasks.iter().enumerate() {
                let result = trace::generate(session, &axes, task);
                output.add_trace(&result)?;
                reporter.tick(idx + 1);
            }
        } else {
            run_parallel(session, &axes, &tasks, &mut output, reporter, n_threads)?;
        }
        reporter.finish();
    } else {
        info!("no seismic gates requested; writing grid outputs only");
    }

    output.finalize(session)?;

    // Intermediate grids are only needed during synthesis.
    session.release_time_grids();
    session.release_elastic_grids();
    Ok(())
}

/// The iteration set in ascending (il, xl) order. With acquisition geometry
/// the numbering comes from it; otherwise traces map one-to-one onto grid
/// columns.
fn build_tasks(session: &Session) -> Vec<TraceTask> {
    let mut tasks = Vec::new();
    match session.segy_geometry.as_ref() {
        Some(geometry) => {
            let mut il = geometry.min_il();
            while il <= geometry.max_il() {
                let mut xl = geometry.min_xl();
                while xl <= geometry.max_xl() {
                    let (i, j) = geometry.find_index_from_ilxl(il, xl);
                    let (x, y) = geometry.find_xy_from_ilxl(il, xl);
                    tasks.push(TraceTask { il, xl, i, j, x, y });
                    xl += geometry.xl_step();
                }
                il += geometry.il_step();
            }
        }
        None => {
            let nx = session.geometry.nx();
            let ny = session.geometry.ny();
            for i in 0..nx {
                for j in 0..ny {
                    tasks.push(TraceTask {
                        il: i as i32,
                        xl: j as i32,
                        i,
                        j,
                        x: 0.0,
                        y: 0.0,
                    });
                }
            }
        }
    }
    tasks
}

/// Heap entry ordered by task index only.
struct Pending {
    idx: usize,
    result: TraceResult,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.idx == other.idx
    }
}
impl Eq for Pending {}
impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.idx.cmp(&other.idx)
    }
}

fn run_parallel(
    session: &Session,
    axes: &crate::session::TimeAxes,
    tasks: &[TraceTask],
    output: &mut SeisOutput,
    reporter: &mut dyn Reporter,
    n_threads: usize,
) -> Result<()> {
    let next_task = AtomicUsize::new(0);
    let (tx, rx) = mpsc::sync_channel::<Pending>(2 * n_threads);

    std::thread::scope(|scope| -> Result<()> {
        for _ in 0..n_threads {
            let tx = tx.clone();
            let next_task = &next_task;
            scope.spawn(move || loop {
                let idx = next_task.fetch_add(1, Ordering::Relaxed);
                if idx >= tasks.len() {
                    break;
                }
                let result = trace::generate(session, axes, &tasks[idx]);
                if tx.send(Pending { idx, result }).is_err() {
                    // Writer bailed out; stop producing.
                    break;
                }
            });
        }
        drop(tx);

        // Single writer: reorder via min-heap, emit only the next expected
        // index.
        let mut heap: BinaryHeap<Reverse<Pending>> = BinaryHeap::new();
        let mut next_write = 0usize;
        for pending in rx {
            heap.push(Reverse(pending));
            while heap
                .peek()
                .map(|Reverse(p)| p.idx == next_write)
                .unwrap_or(false)
            {
                let Reverse(pending) = heap.pop().expect("peeked entry exists");
                output.add_trace(&pending.result)?;
                next_write += 1;
                reporter.tick(next_write);
            }
        }
        if next_write != tasks.len() {
            return Err(SeisError::Config(format!(
                "writer drained {} of {} traces",
                next_write,
                tasks.len()
            )));
        }
        Ok(())
    })
}
