// The live runner for the `lotwatch` engine. It owns everything the library
// deliberately does not: the capture device, the normalization of raw camera
// frames, and the preview window with its grid-and-count overlay. The engine
// sees only `GrayFrame`s through the `FrameSource`/`FrameSink` seams.

use anyhow::{Context, Result, bail};
use clap::Parser;
use lotwatch::core_modules::snapshot;
use lotwatch::pipeline::{
    FileChangeLog, FrameReport, FrameSink, FrameSource, GrayFrame, GridConfig, LoopSignal,
    MonitorPipeline,
};
use opencv::{
    core::{self, Mat, Point, Rect, Scalar, Size},
    highgui, imgproc,
    prelude::*,
    videoio,
};
use std::path::PathBuf;

const WINDOW_NAME: &str = "lotwatch";
const QUIT_KEY: i32 = 'q' as i32;

#[derive(Parser, Debug)]
#[command(name = "lotwatch", about = "Region-based motion event counter for a fixed camera view")]
struct Args {
    /// Camera device index to open.
    #[arg(long, default_value_t = 0, conflicts_with = "file")]
    device: i32,
    /// Process a video file instead of a live camera.
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
    /// Number of grid rows.
    #[arg(long, default_value_t = 3)]
    rows: u32,
    /// Number of grid columns.
    #[arg(long, default_value_t = 3)]
    cols: u32,
    /// Cell edge length in pixels; frames are resized to cols*cell_size x rows*cell_size.
    #[arg(long, default_value_t = 100)]
    cell_size: u32,
    /// Mean-intensity deviation (0-255 scale) a cell must exceed to register a change.
    #[arg(long, default_value_t = 40.0)]
    threshold: f64,
    /// Append one timestamped line per change event to this file.
    #[arg(long, default_value = "lotwatch_changes.log")]
    log_file: PathBuf,
    /// Save the first normalized frame as a PNG, for grid alignment checks.
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,
    /// Run without a preview window (no cancellation key either).
    #[arg(long)]
    headless: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();
    run(args)
}

fn run(args: Args) -> Result<()> {
    let config = GridConfig::new(args.rows, args.cols, args.cell_size, args.threshold)?;
    let mut source = CameraSource::open(&args, &config)?;
    let mut change_log = FileChangeLog::append(&args.log_file)?;
    let mut pipeline = MonitorPipeline::new(config);

    let summary = if args.headless {
        let mut sink = HeadlessSink;
        pipeline.run(&mut source, &mut sink, Some(&mut change_log))?
    } else {
        let mut sink = WindowSink::open(config)?;
        pipeline.run(&mut source, &mut sink, Some(&mut change_log))?
    };

    tracing::info!(
        frames = summary.frames_processed,
        events = summary.total_count,
        "video stream stopped"
    );
    Ok(())
}

/// Owns the capture device and performs the full normalization step:
/// grayscale, horizontal mirror, resize to the grid's exact pixel dimensions.
struct CameraSource {
    capture: videoio::VideoCapture,
    target: Size,
    snapshot: Option<PathBuf>,
}

impl CameraSource {
    fn open(args: &Args, config: &GridConfig) -> Result<Self> {
        let capture = match &args.file {
            Some(path) => {
                let path = path.to_str().context("video file path is not valid UTF-8")?;
                videoio::VideoCapture::from_file(path, videoio::CAP_ANY)
                    .with_context(|| format!("failed to open video file {path}"))?
            }
            None => videoio::VideoCapture::new(args.device, videoio::CAP_ANY)
                .with_context(|| format!("failed to open camera device {}", args.device))?,
        };
        if !capture.is_opened()? {
            bail!("could not open video stream");
        }
        Ok(Self {
            capture,
            target: Size::new(
                config.frame_width() as i32,
                config.frame_height() as i32,
            ),
            snapshot: args.snapshot.clone(),
        })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<GrayFrame>> {
        let mut raw = Mat::default();
        if !self.capture.read(&mut raw)? || raw.empty() {
            return Ok(None);
        }

        let mut gray = Mat::default();
        imgproc::cvt_color(&raw, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
        let mut mirrored = Mat::default();
        core::flip(&gray, &mut mirrored, 1)?;
        let mut resized = Mat::default();
        imgproc::resize(
            &mirrored,
            &mut resized,
            self.target,
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let frame = GrayFrame::new(
            self.target.width as u32,
            self.target.height as u32,
            resized.data_bytes()?.to_vec(),
        )?;

        if let Some(path) = self.snapshot.take() {
            match snapshot::save_png(&path, &frame) {
                Ok(()) => tracing::info!("saved normalized frame to {}", path.display()),
                Err(err) => tracing::warn!("failed to save snapshot: {err}"),
            }
        }
        Ok(Some(frame))
    }
}

/// Draws the grid overlay and running count on a display copy of each frame
/// and polls the preview window for the quit key.
struct WindowSink {
    config: GridConfig,
}

impl WindowSink {
    fn open(config: GridConfig) -> Result<Self> {
        highgui::named_window(WINDOW_NAME, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self { config })
    }
}

impl FrameSink for WindowSink {
    fn present(&mut self, frame: &GrayFrame, report: &FrameReport) -> Result<LoopSignal> {
        // The analysis frame stays untouched; all drawing happens on a copy.
        let mut display = Mat::from_slice_rows_cols(
            frame.data(),
            frame.height() as usize,
            frame.width() as usize,
        )?;

        let cell = self.config.cell_size as i32;
        for idx in 0..self.config.cell_count() {
            let (x, y) = self.config.cell_origin(idx);
            imgproc::rectangle(
                &mut display,
                Rect::new(x as i32, y as i32, cell, cell),
                Scalar::all(255.0),
                2,
                imgproc::LINE_8,
                0,
            )?;
        }
        imgproc::put_text(
            &mut display,
            &format!("Events: {}", report.total_count),
            Point::new(10, 30),
            imgproc::FONT_HERSHEY_SIMPLEX,
            1.0,
            Scalar::all(255.0),
            2,
            imgproc::LINE_8,
            false,
        )?;

        highgui::imshow(WINDOW_NAME, &display)?;
        let key = highgui::wait_key(1)?;
        if key == QUIT_KEY {
            return Ok(LoopSignal::Cancel);
        }
        Ok(LoopSignal::Continue)
    }
}

impl Drop for WindowSink {
    fn drop(&mut self) {
        let _ = highgui::destroy_all_windows();
    }
}

/// Sink for `--headless` runs: nothing to draw, nothing to poll.
struct HeadlessSink;

impl FrameSink for HeadlessSink {
    fn present(&mut self, _frame: &GrayFrame, _report: &FrameReport) -> Result<LoopSignal> {
        Ok(LoopSignal::Continue)
    }
}
