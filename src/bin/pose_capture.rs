//! pose_capture - capture one gated body-pose snapshot from a camera
//!
//! `pose_capture tests` lists the mobility test catalog.
//! `pose_capture capture --test shoulder_flexion` runs a capture session and
//! prints the normalized keypoints as JSON on stdout.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pose_capture::analysis::AnalysisRequest;
use pose_capture::assessment::{self, TestDescriptor};
use pose_capture::config::CaptureConfig;
use pose_capture::ui::Ui;
use pose_capture::{
    engine, surface, CaptureController, CaptureErrorKind, CaptureHandoff, CaptureState,
    SessionSnapshot,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (TOML, or JSON with a .json extension).
    #[arg(long, env = "POSE_CAPTURE_CONFIG")]
    config: Option<PathBuf>,
    /// Console output: auto, plain or pretty.
    #[arg(long)]
    ui: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the built-in mobility tests.
    Tests {
        #[arg(long)]
        json: bool,
    },
    /// Run one capture session.
    Capture(CaptureArgs),
}

#[derive(clap::Args, Debug)]
struct CaptureArgs {
    /// Test id, e.g. shoulder_flexion.
    #[arg(long)]
    test: String,
    /// Camera URI (stub://name or a V4L2 device path).
    #[arg(long)]
    camera: Option<String>,
    /// Comma-separated backend preference (stub, tract, ort-gpu, ort-cpu).
    #[arg(long)]
    backends: Option<String>,
    #[arg(long)]
    threshold: Option<f32>,
    /// Start the countdown without waiting for Enter.
    #[arg(long)]
    auto_start: bool,
    /// Countdowns to attempt before giving up on capture timeouts.
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,
    /// Also write the hand-off JSON to this file.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Submit the keypoints to the analysis service.
    #[arg(long)]
    submit: bool,
    /// Analysis service conversation id (defaults to config).
    #[arg(long)]
    session_id: Option<String>,
}

enum Input {
    Enter,
    Interrupt,
}

enum Waited {
    Reached(SessionSnapshot),
    Enter,
    Interrupted,
    TimedOut,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Command::Tests { json } => list_tests(json),
        Command::Capture(capture) => {
            let mut cfg = CaptureConfig::load_from(args.config.as_deref())?;
            apply_overrides(&mut cfg, &capture)?;
            let ui = Ui::from_args(args.ui.as_deref(), std::io::stderr().is_terminal());
            run_capture(&cfg, &capture, &ui)
        }
    }
}

fn list_tests(json: bool) -> Result<()> {
    let tests: Vec<TestDescriptor> = assessment::catalog().collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&tests)?);
        return Ok(());
    }
    for test in tests {
        println!("{:<28} {}", test.id, test.name);
        println!("{:<28} {}", "", test.description);
    }
    Ok(())
}

fn apply_overrides(cfg: &mut CaptureConfig, args: &CaptureArgs) -> Result<()> {
    if let Some(camera) = &args.camera {
        cfg.camera_uri = camera.clone();
    }
    if let Some(backends) = &args.backends {
        cfg.backends = backends
            .split(',')
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
    }
    if let Some(threshold) = args.threshold {
        cfg.threshold = threshold;
    }
    if let Some(session_id) = &args.session_id {
        cfg.analysis.session_id = Some(session_id.clone());
    }
    cfg.gate()?;
    if args.max_attempts == 0 {
        bail!("--max-attempts must be >= 1");
    }
    Ok(())
}

fn run_capture(cfg: &CaptureConfig, args: &CaptureArgs, ui: &Ui) -> Result<()> {
    let test = TestDescriptor::find(&args.test).ok_or_else(|| {
        anyhow!(
            "unknown test {:?}; run `pose_capture tests` for the catalog",
            args.test
        )
    })?;

    let camera = surface::from_uri(&cfg.camera_uri)?;
    let registry = engine::registry_from_names(&cfg.backends, &cfg.model_path)?;
    log::info!(
        "camera {}, backends [{}], threshold {:.2}",
        cfg.camera_uri,
        registry.list().join(", "),
        cfg.threshold
    );

    let controller = CaptureController::builder(camera, Arc::new(registry))
        .constraints(cfg.constraints.clone())
        .renderer(cfg.renderer)
        .gate(cfg.gate()?)
        .timings(cfg.timings.clone())
        .observer(ui.observer())
        .spawn()?;
    let inputs = spawn_inputs()?;

    let result = drive_session(&controller, &inputs, cfg, args, &test);
    controller.close();
    let handoff = result?;

    let json = serde_json::to_string_pretty(&handoff)?;
    println!("{}", json);
    if let Some(path) = &args.out {
        std::fs::write(path, &json)
            .with_context(|| format!("write hand-off to {}", path.display()))?;
    }
    if args.submit {
        submit(cfg, &handoff, ui)?;
    }
    Ok(())
}

fn drive_session(
    controller: &CaptureController,
    inputs: &Receiver<Input>,
    cfg: &CaptureConfig,
    args: &CaptureArgs,
    test: &TestDescriptor,
) -> Result<CaptureHandoff> {
    controller.open(test.clone())?;

    let init_budget = cfg.timings.init_timeout + Duration::from_secs(1);
    let ready = match wait_for(controller, inputs, init_budget, false, |s| {
        s.state == CaptureState::Detecting || s.state == CaptureState::Error
    }) {
        Waited::Reached(snapshot) => snapshot,
        Waited::Interrupted => bail!("interrupted"),
        _ => bail!("capture session did not start"),
    };
    if ready.state == CaptureState::Error {
        return Err(session_error(&ready));
    }

    let mut attempts = 0;
    loop {
        if !args.auto_start {
            match wait_for(controller, inputs, Duration::MAX, true, |s| {
                s.state == CaptureState::Error
            }) {
                Waited::Enter => {}
                Waited::Reached(snapshot) => return Err(session_error(&snapshot)),
                _ => bail!("interrupted"),
            }
        }

        let started = controller.snapshot();
        controller.start_countdown()?;
        attempts += 1;

        let countdown = cfg.timings.countdown_interval * cfg.timings.countdown_ticks;
        let budget = countdown + cfg.timings.capture_timeout + Duration::from_secs(2);
        let outcome = wait_for(controller, inputs, budget, false, |s| {
            s.state == CaptureState::Captured
                || (s.state == CaptureState::Error
                    && s.last_error.as_ref().is_some_and(|e| e.is_fatal()))
                || (s.state == CaptureState::Detecting
                    && s.last_error.as_ref().map(|e| e.kind)
                        == Some(CaptureErrorKind::CaptureTimeout)
                    && s.detection_ticks > started.detection_ticks)
        });
        let snapshot = match outcome {
            Waited::Reached(snapshot) => snapshot,
            Waited::Interrupted => bail!("interrupted"),
            _ => bail!("capture session stalled"),
        };

        match snapshot.state {
            CaptureState::Captured => {
                let keypoints = controller.complete()?;
                let (frame_width, frame_height) = snapshot.frame_size.unwrap_or((0, 0));
                return Ok(CaptureHandoff {
                    session_id: snapshot.session_id,
                    test_id: test.id.clone(),
                    frame_width,
                    frame_height,
                    keypoints,
                });
            }
            CaptureState::Error => return Err(session_error(&snapshot)),
            _ if attempts >= args.max_attempts => {
                bail!("no acceptable pose after {} attempt(s)", attempts)
            }
            _ => log::info!("capture attempt {} timed out, retrying", attempts),
        }
    }
}

/// Poll the controller until `predicate` holds, Enter is pressed (when
/// `want_enter`), Ctrl-C arrives, or `timeout` passes.
fn wait_for(
    controller: &CaptureController,
    inputs: &Receiver<Input>,
    timeout: Duration,
    want_enter: bool,
    mut predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> Waited {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if let Some(snapshot) = controller.wait_until(Duration::ZERO, &mut predicate) {
            return Waited::Reached(snapshot);
        }
        match inputs.recv_timeout(Duration::from_millis(50)) {
            Ok(Input::Interrupt) | Err(RecvTimeoutError::Disconnected) => {
                return Waited::Interrupted
            }
            Ok(Input::Enter) if want_enter => return Waited::Enter,
            Ok(Input::Enter) | Err(RecvTimeoutError::Timeout) => {}
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Waited::TimedOut;
        }
    }
}

/// Ctrl-C and Enter presses as one stream of inputs.
fn spawn_inputs() -> Result<Receiver<Input>> {
    let (tx, rx) = mpsc::channel();
    let interrupt = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt.send(Input::Interrupt);
    })
    .context("error setting Ctrl-C handler")?;

    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                if line.is_err() || tx.send(Input::Enter).is_err() {
                    break;
                }
            }
        })
        .context("spawn stdin reader")?;
    Ok(rx)
}

fn session_error(snapshot: &SessionSnapshot) -> anyhow::Error {
    match &snapshot.last_error {
        Some(err) => anyhow!("{} ({})", err.kind.summary(), err),
        None => anyhow!("capture session failed"),
    }
}

#[cfg(feature = "analysis-http")]
fn submit(cfg: &CaptureConfig, handoff: &CaptureHandoff, ui: &Ui) -> Result<()> {
    use pose_capture::analysis::{AnalysisClient, HttpAnalysisClient};

    let url = cfg
        .analysis
        .url
        .as_deref()
        .ok_or_else(|| anyhow!("--submit needs POSE_CAPTURE_ANALYSIS_URL or [analysis] url"))?;
    let session_id = cfg
        .analysis
        .session_id
        .clone()
        .unwrap_or_else(|| handoff.session_id.to_string());
    let request = AnalysisRequest::from_handoff(session_id, handoff);

    let mut stage = ui.stage("submit keypoints for analysis");
    let client = HttpAnalysisClient::new(url).with_timeout(cfg.analysis.timeout);
    match client.submit(&request) {
        Ok(response) => {
            drop(stage);
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(err) => {
            stage.fail(format!("{:#}", err));
            Err(err)
        }
    }
}

#[cfg(not(feature = "analysis-http"))]
fn submit(_cfg: &CaptureConfig, handoff: &CaptureHandoff, _ui: &Ui) -> Result<()> {
    let request = AnalysisRequest::from_handoff(handoff.session_id.to_string(), handoff);
    log::debug!("analysis request for {} not sent", request.test_id);
    bail!("this build has no analysis client; rebuild with --features analysis-http")
}
