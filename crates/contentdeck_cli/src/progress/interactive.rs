use std::sync::Mutex;
use std::time::Duration;

use console::style;
use contentdeck::DeployEvent;
use indicatif::{ProgressBar, ProgressStyle};

/// Interactive reporter: a single spinner tracking the deploy.
pub struct InteractiveReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    pub fn handle(&self, event: DeployEvent) {
        let mut bar = self.bar.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            DeployEvent::Started { initial_version } => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(Self::spinner_style());
                pb.enable_steady_tick(Duration::from_millis(100));
                pb.set_message(format!(
                    "Waiting for deploy (live version {})",
                    display_version(&initial_version)
                ));
                *bar = Some(pb);
            }

            DeployEvent::Waiting { attempt, delay } => {
                if let Some(pb) = bar.as_ref() {
                    pb.set_message(format!(
                        "Attempt {}: next check in {:.1}s",
                        attempt + 1,
                        delay.as_secs_f64()
                    ));
                }
            }

            DeployEvent::Progress { attempt, status } => {
                if let Some(pb) = bar.as_ref() {
                    let state = if status.complete { "complete" } else { "building" };
                    pb.set_message(format!("Attempt {}: deploy {}", attempt, state));
                }
            }

            DeployEvent::PollFailed { attempt, error } => {
                if let Some(pb) = bar.as_ref() {
                    pb.println(format!(
                        "{} attempt {}: {}",
                        style("!").yellow(),
                        attempt,
                        error
                    ));
                }
            }

            DeployEvent::VersionUnchanged { attempt, version } => {
                if let Some(pb) = bar.as_ref() {
                    pb.set_message(format!(
                        "Attempt {}: built, site still on {}",
                        attempt,
                        display_version(&version)
                    ));
                }
            }

            DeployEvent::Succeeded { version } => {
                if let Some(pb) = bar.take() {
                    pb.finish_with_message(format!(
                        "{} Deploy live: {}",
                        style("✓").green().bold(),
                        display_version(&version)
                    ));
                }
            }

            DeployEvent::Failed { error, unconfirmed } => {
                if let Some(pb) = bar.take() {
                    let mark = if unconfirmed {
                        style("?").yellow().bold()
                    } else {
                        style("✗").red().bold()
                    };
                    pb.finish_with_message(format!("{} {}", mark, error));
                }
            }

            DeployEvent::Stopped => {
                if let Some(pb) = bar.take() {
                    pb.finish_with_message(format!("{} Monitoring stopped", style("-").dim()));
                }
            }

            _ => {}
        }
    }

    pub fn finish(&self) {
        let mut bar = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pb) = bar.take() {
            pb.finish_and_clear();
        }
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn display_version(version: &str) -> &str {
    if version.is_empty() { "(none)" } else { version }
}
