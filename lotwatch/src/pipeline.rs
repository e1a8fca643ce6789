// THEORY:
// The `pipeline` module is the top-level API for the counting engine. It wires
// the stateless grid reducer, the stateful baseline tracker, and the running
// counter into a single per-frame operation, and it owns the control loop that
// drives them from a frame source to a frame sink.
//
// Key architectural principles:
// 1.  **Explicit state machine**: the loop is Uninitialized until the first
//     frame seeds the baselines, Running while frames flow, and Stopped once
//     the stream ends or the operator cancels. Transitions are methods, not
//     implicit branches buried in a loop body, so termination conditions and
//     release points stay auditable.
// 2.  **Traits at the I/O seams**: `FrameSource` and `FrameSink` are the only
//     contact points with the outside world. The production runner implements
//     them over a camera and a preview window; tests implement them over
//     scripted frames. The analysis core never touches a device handle.
// 3.  **One direction, one thread**: each iteration flows acquire → reduce →
//     evaluate → count → present, strictly in acquisition order, with no
//     concurrency. Cancellation is cooperative and polled once per iteration,
//     after presenting; an iteration in progress always completes.
// 4.  **Two kinds of failure**: losing the stream after startup is ordinary
//     end-of-stream, logged and absorbed. Failing to deliver a *first* frame,
//     or violating a module contract (wrong dimensions, evaluate before
//     initialize), is an error the caller must see.

use crate::core_modules::baseline::{BaselineError, BaselineTracker};
use crate::core_modules::counter::EventCounter;
use crate::core_modules::grid::{Grid, GridError};
use anyhow::{Context, Result, anyhow};
use thiserror::Error;

// Re-export key data structures for the public API.
pub use crate::core_modules::change_log::{ChangeSink, FileChangeLog};
pub use crate::core_modules::frame::{FrameError, GrayFrame};
pub use crate::core_modules::grid::GridConfig;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("the monitor loop was already started")]
    AlreadyStarted,
    #[error("frames cannot be processed in the {0:?} state")]
    NotRunning(LoopState),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Baseline(#[from] BaselineError),
}

/// The lifecycle of one monitoring run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No baseline exists yet; waiting for a first frame.
    Uninitialized,
    /// Baselines are seeded and frames are being evaluated.
    Running,
    /// Terminal. The stream ended or the operator cancelled.
    Stopped,
}

/// What the engine found in a single frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Flagged cell indices, ascending (row-major cell order).
    pub flagged: Vec<usize>,
    /// The running count after this frame was accumulated.
    pub total_count: u64,
}

/// Aggregate result of a completed run.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    /// Frames evaluated after the baseline-seeding first frame.
    pub frames_processed: u64,
    /// Final running count of change events.
    pub total_count: u64,
}

/// Verdict a sink returns after presenting a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSignal {
    Continue,
    Cancel,
}

/// Delivers normalized frames in acquisition order. `Ok(None)` means the
/// stream ended; errors during acquisition are startup-fatal only for the
/// first frame.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<GrayFrame>>;
}

/// Consumes each evaluated frame for display and reports whether the operator
/// asked to stop.
pub trait FrameSink {
    fn present(&mut self, frame: &GrayFrame, report: &FrameReport) -> Result<LoopSignal>;
}

/// The engine: grid reducer, baseline tracker, and event counter behind one
/// per-frame API and a run loop.
pub struct MonitorPipeline {
    grid: Grid,
    tracker: BaselineTracker,
    counter: EventCounter,
    state: LoopState,
}

impl MonitorPipeline {
    pub fn new(config: GridConfig) -> Self {
        let tracker = BaselineTracker::new(config.threshold);
        Self {
            grid: Grid::new(config),
            tracker,
            counter: EventCounter::new(),
            state: LoopState::Uninitialized,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn config(&self) -> &GridConfig {
        self.grid.config()
    }

    pub fn total_count(&self) -> u64 {
        self.counter.total()
    }

    /// Seeds the baselines from the first normalized frame and enters the
    /// Running state. Valid exactly once, from Uninitialized.
    pub fn start(&mut self, first_frame: &GrayFrame) -> Result<(), PipelineError> {
        if self.state != LoopState::Uninitialized {
            return Err(PipelineError::AlreadyStarted);
        }
        let initial_means = self.grid.cell_means(first_frame)?;
        self.tracker.initialize(&initial_means);
        self.state = LoopState::Running;
        Ok(())
    }

    /// Evaluates one frame: reduce to cell means, compare against baselines,
    /// accumulate the flagged count. Only valid while Running.
    pub fn process(&mut self, frame: &GrayFrame) -> Result<FrameReport, PipelineError> {
        if self.state != LoopState::Running {
            return Err(PipelineError::NotRunning(self.state));
        }
        let means = self.grid.cell_means(frame)?;
        let flagged = self.tracker.evaluate(&means)?;
        self.counter.add(flagged.len());
        for &cell in &flagged {
            tracing::debug!(cell, "change detected");
        }
        Ok(FrameReport {
            flagged,
            total_count: self.counter.total(),
        })
    }

    /// Terminal transition. Idempotent.
    pub fn stop(&mut self) {
        self.state = LoopState::Stopped;
    }

    /// Drives the full loop: acquire the first frame and seed the baselines,
    /// then acquire → evaluate → log → present until the stream ends or the
    /// sink signals cancellation. A missing first frame is a startup error;
    /// any later acquisition failure is treated as ordinary end-of-stream.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        mut change_log: Option<&mut dyn ChangeSink>,
    ) -> Result<RunSummary> {
        let first_frame = source
            .next_frame()
            .context("could not read from the video source")?
            .ok_or_else(|| anyhow!("video source ended before delivering a first frame"))?;
        self.start(&first_frame)?;
        tracing::info!(
            rows = self.config().rows,
            cols = self.config().cols,
            cell_size = self.config().cell_size,
            threshold = self.config().threshold,
            "monitoring started"
        );

        let mut frames_processed = 0u64;
        loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::info!("video stream ended");
                    break;
                }
                Err(err) => {
                    // Transient device errors after startup are stream-end,
                    // not a crash.
                    tracing::info!("video stream ended: {err:#}");
                    break;
                }
            };
            frames_processed += 1;

            let report = self.process(&frame)?;
            if let Some(log) = change_log.as_mut() {
                for &cell in &report.flagged {
                    log.record(frames_processed, cell)?;
                }
            }

            match sink.present(&frame, &report)? {
                LoopSignal::Continue => {}
                LoopSignal::Cancel => {
                    tracing::info!("cancellation requested");
                    break;
                }
            }
        }

        self.stop();
        let summary = RunSummary {
            frames_processed,
            total_count: self.counter.total(),
        };
        tracing::info!(
            frames = summary.frames_processed,
            events = summary.total_count,
            "monitoring stopped"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    const CONFIG: (u32, u32, u32, f64) = (3, 3, 10, 40.0);

    fn config() -> GridConfig {
        let (rows, cols, cell_size, threshold) = CONFIG;
        GridConfig::new(rows, cols, cell_size, threshold).unwrap()
    }

    /// Builds a frame where every cell is flat at the given intensity.
    fn frame_with_cells(config: &GridConfig, cell_values: &[u8]) -> GrayFrame {
        let width = config.frame_width() as usize;
        let height = config.frame_height() as usize;
        let mut data = vec![0u8; width * height];
        for (idx, &value) in cell_values.iter().enumerate() {
            let (x, y) = config.cell_origin(idx);
            for row in 0..config.cell_size as usize {
                let start = (y as usize + row) * width + x as usize;
                for sample in &mut data[start..start + config.cell_size as usize] {
                    *sample = value;
                }
            }
        }
        GrayFrame::new(width as u32, height as u32, data).unwrap()
    }

    /// A frame source playing back a fixed script. An entry of `None` makes
    /// the next acquisition fail with a device error.
    struct ScriptedSource {
        frames: VecDeque<Option<GrayFrame>>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Option<GrayFrame>>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<GrayFrame>> {
            match self.frames.pop_front() {
                Some(Some(frame)) => Ok(Some(frame)),
                Some(None) => Err(anyhow!("simulated device error")),
                None => Ok(None),
            }
        }
    }

    /// Records every presented report; cancels after an optional frame budget.
    struct RecordingSink {
        reports: Vec<FrameReport>,
        cancel_after: Option<usize>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                reports: Vec::new(),
                cancel_after: None,
            }
        }

        fn cancelling_after(frames: usize) -> Self {
            Self {
                reports: Vec::new(),
                cancel_after: Some(frames),
            }
        }
    }

    impl FrameSink for RecordingSink {
        fn present(&mut self, _frame: &GrayFrame, report: &FrameReport) -> Result<LoopSignal> {
            self.reports.push(report.clone());
            match self.cancel_after {
                Some(budget) if self.reports.len() >= budget => Ok(LoopSignal::Cancel),
                _ => Ok(LoopSignal::Continue),
            }
        }
    }

    struct RecordingChangeSink {
        events: Vec<(u64, usize)>,
    }

    impl ChangeSink for RecordingChangeSink {
        fn record(&mut self, frame_index: u64, cell: usize) -> Result<()> {
            self.events.push((frame_index, cell));
            Ok(())
        }
    }

    #[test]
    fn process_before_start_fails_fast() {
        let config = config();
        let mut pipeline = MonitorPipeline::new(config);
        let frame = frame_with_cells(&config, &[50; 9]);
        assert!(matches!(
            pipeline.process(&frame),
            Err(PipelineError::NotRunning(LoopState::Uninitialized))
        ));
    }

    #[test]
    fn start_twice_is_a_contract_violation() {
        let config = config();
        let mut pipeline = MonitorPipeline::new(config);
        let frame = frame_with_cells(&config, &[50; 9]);
        pipeline.start(&frame).unwrap();
        assert!(matches!(
            pipeline.start(&frame),
            Err(PipelineError::AlreadyStarted)
        ));
    }

    #[test]
    fn one_deviating_cell_counts_once() {
        // Scenario: all cells seed at 50; cell 4 jumps to 95 (diff 45 > 40).
        let config = config();
        let mut pipeline = MonitorPipeline::new(config);
        pipeline.start(&frame_with_cells(&config, &[50; 9])).unwrap();

        let mut cells = [50u8; 9];
        cells[4] = 95;
        let report = pipeline.process(&frame_with_cells(&config, &cells)).unwrap();
        assert_eq!(report.flagged, vec![4]);
        assert_eq!(report.total_count, 1);

        // Follow-up: cell 4 drifts to 100 (diff 5 from its new anchor) and
        // cell 0 drops to 10 (diff exactly 40). Nothing flags.
        let mut cells = [50u8; 9];
        cells[4] = 100;
        cells[0] = 10;
        let report = pipeline.process(&frame_with_cells(&config, &cells)).unwrap();
        assert!(report.flagged.is_empty());
        assert_eq!(report.total_count, 1);
    }

    #[test]
    fn run_stops_cleanly_when_stream_ends() {
        let config = config();
        let quiet = frame_with_cells(&config, &[50; 9]);
        let mut busy_cells = [50u8; 9];
        busy_cells[2] = 120;
        let busy = frame_with_cells(&config, &busy_cells);

        let mut source = ScriptedSource::new(vec![
            Some(quiet.clone()),
            Some(quiet.clone()),
            Some(busy),
            Some(quiet),
        ]);
        let mut sink = RecordingSink::new();
        let mut changes = RecordingChangeSink { events: Vec::new() };

        let mut pipeline = MonitorPipeline::new(config);
        let summary = pipeline
            .run(&mut source, &mut sink, Some(&mut changes))
            .unwrap();

        assert_eq!(summary.frames_processed, 3);
        // Cell 2 jumps on frame 2 and jumps back on frame 3: two events.
        assert_eq!(summary.total_count, 2);
        assert_eq!(pipeline.state(), LoopState::Stopped);
        assert_eq!(changes.events, vec![(2, 2), (3, 2)]);
        assert_eq!(sink.reports.len(), 3);
    }

    #[test]
    fn device_error_after_startup_is_ordinary_stream_end() {
        let config = config();
        let quiet = frame_with_cells(&config, &[50; 9]);
        let mut source = ScriptedSource::new(vec![
            Some(quiet.clone()),
            Some(quiet.clone()),
            None, // device error on the third acquisition
            Some(quiet),
        ]);
        let mut sink = RecordingSink::new();

        let mut pipeline = MonitorPipeline::new(config);
        let summary = pipeline.run(&mut source, &mut sink, None).unwrap();
        assert_eq!(summary.frames_processed, 1);
        assert_eq!(summary.total_count, 0);
        assert_eq!(pipeline.state(), LoopState::Stopped);
    }

    #[test]
    fn missing_first_frame_is_a_startup_error() {
        let config = config();
        let mut source = ScriptedSource::new(vec![]);
        let mut sink = RecordingSink::new();

        let mut pipeline = MonitorPipeline::new(config);
        assert!(pipeline.run(&mut source, &mut sink, None).is_err());
        // The loop was never entered.
        assert_eq!(pipeline.state(), LoopState::Uninitialized);
        assert_eq!(pipeline.total_count(), 0);
        assert!(sink.reports.is_empty());
    }

    #[test]
    fn failing_first_acquisition_is_a_startup_error() {
        let config = config();
        let mut source = ScriptedSource::new(vec![None]);
        let mut sink = RecordingSink::new();

        let mut pipeline = MonitorPipeline::new(config);
        assert!(pipeline.run(&mut source, &mut sink, None).is_err());
        assert_eq!(pipeline.state(), LoopState::Uninitialized);
    }

    #[test]
    fn cancellation_is_polled_after_presenting() {
        let config = config();
        let quiet = frame_with_cells(&config, &[50; 9]);
        let mut source = ScriptedSource::new(vec![
            Some(quiet.clone()),
            Some(quiet.clone()),
            Some(quiet.clone()),
            Some(quiet.clone()),
            Some(quiet),
        ]);
        let mut sink = RecordingSink::cancelling_after(2);

        let mut pipeline = MonitorPipeline::new(config);
        let summary = pipeline.run(&mut source, &mut sink, None).unwrap();
        // The second iteration completes fully before the cancel takes effect.
        assert_eq!(summary.frames_processed, 2);
        assert_eq!(sink.reports.len(), 2);
        assert_eq!(pipeline.state(), LoopState::Stopped);
    }

    #[test]
    fn repeated_runs_over_the_same_script_are_deterministic() {
        let config = config();
        let run_once = || {
            let quiet = frame_with_cells(&config, &[50; 9]);
            let mut cells = [50u8; 9];
            cells[0] = 120;
            cells[8] = 200;
            let busy = frame_with_cells(&config, &cells);
            let mut source = ScriptedSource::new(vec![
                Some(quiet.clone()),
                Some(busy.clone()),
                Some(quiet.clone()),
                Some(busy),
                Some(quiet),
            ]);
            let mut sink = RecordingSink::new();
            let mut pipeline = MonitorPipeline::new(config);
            let summary = pipeline.run(&mut source, &mut sink, None).unwrap();
            let flagged: Vec<Vec<usize>> =
                sink.reports.iter().map(|r| r.flagged.clone()).collect();
            (summary.total_count, flagged)
        };

        let (count_a, flagged_a) = run_once();
        let (count_b, flagged_b) = run_once();
        assert_eq!(count_a, count_b);
        assert_eq!(flagged_a, flagged_b);
        assert_eq!(count_a, 8);
    }

    #[test]
    fn dimension_mismatch_mid_stream_fails_loudly() {
        let config = config();
        let mut pipeline = MonitorPipeline::new(config);
        pipeline.start(&frame_with_cells(&config, &[50; 9])).unwrap();
        let wrong = GrayFrame::new(20, 20, vec![0u8; 400]).unwrap();
        assert!(matches!(
            pipeline.process(&wrong),
            Err(PipelineError::Grid(GridError::DimensionMismatch { .. }))
        ));
    }
}
