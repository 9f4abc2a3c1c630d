use crate::dashboard::DashboardSnapshot;
use crate::error::RenderError;
use crate::thresholds::DisplayColor;
use std::io::Write;

const ANSI_RED: &str = "\x1b[31m";
const ANSI_BOLD_RED: &str = "\x1b[1;31m";
const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_RESET: &str = "\x1b[0m";
const ANSI_CLEAR: &str = "\x1b[2J\x1b[H";

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Draws dashboard frames
#[cfg_attr(test, mockall::automock)]
pub trait Renderer: Send {
    /// Render one frame; called after every state change
    fn render(&mut self, snapshot: &DashboardSnapshot) -> Result<(), RenderError>;
}

/// Text dashboard: value boxes, a sparkline per sensor, and the fault banner
pub struct ConsoleRenderer<W: Write + Send> {
    out: W,
    /// Emit ANSI colors and clear the screen between frames
    ansi: bool,
}

impl<W: Write + Send> ConsoleRenderer<W> {
    pub fn new(out: W, ansi: bool) -> Self {
        Self { out, ansi }
    }

    /// Build the text of one frame
    pub fn format_frame(&self, snapshot: &DashboardSnapshot) -> String {
        let mut frame = String::new();
        if self.ansi {
            frame.push_str(ANSI_CLEAR);
        }

        frame.push_str("Motor Sensor Dashboard\n");
        frame.push_str("======================\n");

        if snapshot.show_critical_warning() {
            let banner = "\u{26a0} CRITICAL FAULT DETECTED: System stopped due to fault condition!";
            if self.ansi {
                frame.push_str(&format!("{}{}{}\n", ANSI_BOLD_RED, banner, ANSI_RESET));
            } else {
                frame.push_str(banner);
                frame.push('\n');
            }
        }

        let state = if snapshot.running { "RUNNING" } else { "STOPPED" };
        let action = if snapshot.running { "stop" } else { "start" };
        let state = if self.ansi {
            let code = if snapshot.running { ANSI_GREEN } else { ANSI_RED };
            format!("{}{}{}", code, state, ANSI_RESET)
        } else {
            state.to_string()
        };
        frame.push_str(&format!("State: {}  (type '{}' or press Enter)\n\n", state, action));

        for panel in &snapshot.panels {
            let value = match panel.latest {
                Some(v) => format!("{:.2}", v),
                None => "--".to_string(),
            };
            // Pad before painting; escape codes must not count toward the width
            frame.push_str(&format!(
                "{:<26}{}  {}\n",
                panel.label,
                self.paint(&format!("{:>10}", value), panel.color),
                sparkline(&panel.y)
            ));
        }

        if let Some(prediction) = snapshot.prediction {
            frame.push_str(&format!(
                "{:<26}{}\n",
                "Prediction",
                self.paint(
                    &format!("{:>10}", prediction.code()),
                    snapshot.prediction_color
                )
            ));
        }

        frame
    }

    fn paint(&self, text: &str, color: DisplayColor) -> String {
        match color {
            DisplayColor::Alert if self.ansi => format!("{}{}{}", ANSI_RED, text, ANSI_RESET),
            _ => text.to_string(),
        }
    }
}

impl<W: Write + Send> Renderer for ConsoleRenderer<W> {
    fn render(&mut self, snapshot: &DashboardSnapshot) -> Result<(), RenderError> {
        let frame = self.format_frame(snapshot);
        self.out.write_all(frame.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

/// Emits each snapshot as one line of JSON for an external chart
pub struct JsonRenderer<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> Renderer for JsonRenderer<W> {
    fn render(&mut self, snapshot: &DashboardSnapshot) -> Result<(), RenderError> {
        serde_json::to_writer(&mut self.out, snapshot)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Unicode sparkline scaled between the series minimum and maximum
pub fn sparkline(values: &[f64]) -> String {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min;

    values
        .iter()
        .map(|&v| {
            if span <= f64::EPSILON {
                SPARK_LEVELS[SPARK_LEVELS.len() / 2]
            } else {
                let level = ((v - min) / span * (SPARK_LEVELS.len() - 1) as f64).round();
                SPARK_LEVELS[level as usize]
            }
        })
        .collect()
}
