//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{default_config_path, default_hint_path, default_token_path};
use crate::models::{CleanupReport, EventFolderInfo, PublishedFile};
use crate::provisioner::RollbackOutcome;

#[derive(Parser, Debug)]
#[command(name = "drive-provisioner")]
#[command(version)]
#[command(about = "Provision and clean up Google Drive distribution folders", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the stored OAuth token
    #[arg(long, global = true)]
    pub token_file: Option<PathBuf>,

    /// Path to the remembered root folder ID
    #[arg(long, global = true)]
    pub hint_file: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    pub fn token_path(&self) -> PathBuf {
        self.token_file.clone().unwrap_or_else(default_token_path)
    }

    pub fn hint_path(&self) -> PathBuf {
        self.hint_file.clone().unwrap_or_else(default_hint_path)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authorize access to Google Drive
    Auth {
        /// Discard the stored token and authorize again
        #[arg(long)]
        force: bool,
    },

    /// Upload files into <root>/<event>/<model> and share them publicly
    Publish {
        /// Event folder name
        #[arg(long)]
        event: String,

        /// Model folder name inside the event folder
        #[arg(long)]
        model: String,

        /// Delete everything created by this run if a step fails
        #[arg(long)]
        rollback_on_failure: bool,

        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Delete event folders older than the retention period
    Cleanup {
        /// Override the configured retention period
        #[arg(long)]
        retention_days: Option<i64>,

        /// Only list what would be deleted
        #[arg(long)]
        dry_run: bool,

        /// Delete without confirmation
        #[arg(long)]
        force: bool,
    },

    /// Show local token, hint and configuration state
    Status,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share a MultiProgress with the log writer so log lines print above bars
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::with_template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style =
            ProgressStyle::with_template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn println(&self, msg: impl AsRef<str>) {
        let _ = self.multi.println(msg);
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        self.println(format!("  ✓ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn folder_line(folder: &EventFolderInfo) -> String {
    format!(
        "  - {} ({} days old, created {}, ID: {})",
        folder.name,
        folder.age_days,
        folder.created_at.format("%Y-%m-%d"),
        folder.id
    )
}

/// Text summary of a cleanup run
pub fn render_cleanup_report(report: &CleanupReport, retention_days: i64) -> String {
    let mut out = String::new();

    match report {
        CleanupReport::DryRun(stale) => {
            if stale.is_empty() {
                out.push_str(&format!("No folders older than {} days.\n", retention_days));
            } else {
                out.push_str(&format!(
                    "Would delete {} folder(s) older than {} days:\n",
                    stale.len(),
                    retention_days
                ));
                for folder in stale {
                    out.push_str(&folder_line(folder));
                    out.push('\n');
                }
            }
            out.push_str("Dry run complete. No changes were made.\n");
        }
        CleanupReport::Executed(outcome) => {
            out.push_str(&format!("Deleted {} folder(s)", outcome.deleted_count));
            if outcome.deleted.is_empty() {
                out.push('\n');
            } else {
                out.push_str(":\n");
                for folder in &outcome.deleted {
                    out.push_str(&folder_line(folder));
                    out.push('\n');
                }
            }
            if outcome.is_partial() {
                out.push_str(&format!(
                    "Failed to delete {} folder(s):\n",
                    outcome.failures.len()
                ));
                for failure in &outcome.failures {
                    out.push_str(&format!("  - {}: {}\n", failure.item.name, failure.reason));
                }
            }
        }
    }

    out
}

/// Text summary of a publish run
pub fn render_publish_summary(folder_url: &str, files: &[PublishedFile]) -> String {
    let mut out = format!("Folder: {}\n", folder_url);
    for file in files {
        out.push_str(&format!("  - {}: {}\n", file.name, file.url));
    }
    out
}

pub fn render_rollback(outcome: &RollbackOutcome) -> String {
    let mut out = format!("Rolled back {} created resource(s)\n", outcome.deleted.len());
    for failure in &outcome.failures {
        out.push_str(&format!(
            "  ! could not delete {} ({}): {}\n",
            failure.resource.name, failure.resource.id, failure.reason
        ));
    }
    out
}
