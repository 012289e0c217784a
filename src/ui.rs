//! Console progress for the capture CLI: spinners on a TTY, plain lines
//! otherwise.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::controller::{CaptureHandoff, CaptureObserver, CaptureState};
use crate::error::CaptureError;
use crate::gate::Quality;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    fn spinner(&self, message: String) -> Option<ProgressBar> {
        if !self.pretty() {
            return None;
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_draw_target(ProgressDrawTarget::stderr());
        spinner.enable_steady_tick(Duration::from_millis(120));
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message);
        Some(spinner)
    }

    /// Timed stage; reports its duration when dropped.
    pub fn stage(&self, name: &str) -> StageGuard {
        let spinner = self.spinner(format!("{name}…"));
        if spinner.is_none() {
            eprintln!("==> {}", name);
        }
        StageGuard {
            name: name.to_string(),
            start: Instant::now(),
            spinner,
            failed: None,
        }
    }

    /// Observer that mirrors session progress on the console.
    pub fn observer(&self) -> ConsoleObserver {
        ConsoleObserver {
            spinner: self.spinner("starting capture session…".to_string()),
            state: CaptureState::Idle,
            quality: None,
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    failed: Option<String>,
}

impl StageGuard {
    /// Mark the stage failed; the reason is shown instead of a check mark.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failed = Some(reason.into());
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = format_duration(self.start.elapsed());
        let message = match &self.failed {
            Some(reason) => format!("✘ {} ({}): {}", self.name, elapsed, reason),
            None => format!("✔ {} ({})", self.name, elapsed),
        };
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

pub struct ConsoleObserver {
    spinner: Option<ProgressBar>,
    state: CaptureState,
    quality: Option<Quality>,
}

impl ConsoleObserver {
    fn show(&self, message: String) {
        match &self.spinner {
            Some(spinner) => spinner.set_message(message),
            None => eprintln!("    {}", message),
        }
    }

    fn announce(&self, message: String) {
        match &self.spinner {
            Some(spinner) => spinner.println(message),
            None => eprintln!("{}", message),
        }
    }
}

impl CaptureObserver for ConsoleObserver {
    fn on_transition(&mut self, _from: CaptureState, to: CaptureState) {
        self.state = to;
        self.quality = None;
        let message = match to {
            CaptureState::Initializing => "starting camera and pose model…",
            CaptureState::Detecting => "detecting, press Enter to start the countdown",
            CaptureState::CountdownRunning => "get ready…",
            CaptureState::AwaitingGatedCapture => "hold still…",
            CaptureState::Captured => "pose captured",
            CaptureState::Error => "error",
            CaptureState::Closed => "session closed",
            CaptureState::Idle => "idle",
        };
        self.show(message.to_string());
    }

    fn on_countdown(&mut self, remaining: u32) {
        if remaining > 0 {
            self.show(format!("capturing in {}…", remaining));
        }
    }

    fn on_quality(&mut self, score: f32, quality: Quality) {
        if !self.state.is_detecting() || self.quality == Some(quality) {
            return;
        }
        self.quality = Some(quality);
        if self.state == CaptureState::Detecting {
            self.show(format!(
                "detecting ({}, confidence {:.2}), press Enter to start the countdown",
                quality.label(),
                score
            ));
        }
    }

    fn on_error(&mut self, error: &CaptureError) {
        let mut message = format!("{}: {}", error.kind.summary(), error.message);
        for hint in error.kind.remediation() {
            message.push_str("\n  - ");
            message.push_str(hint);
        }
        self.announce(message);
    }

    fn on_complete(&mut self, handoff: &CaptureHandoff) {
        self.announce(format!(
            "✔ captured {} keypoints for {} ({}x{})",
            handoff.keypoints.len(),
            handoff.test_id,
            handoff.frame_width,
            handoff.frame_height
        ));
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn on_close(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_with_message("session cancelled");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_tty_never_draws_spinners() {
        let ui = Ui::from_args(Some("pretty"), false);
        assert!(ui.spinner("x".to_string()).is_none());
        let ui = Ui::from_args(Some("plain"), true);
        assert!(ui.spinner("x".to_string()).is_none());
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
