// Rich terminal output for fleetcast

use std::io::IsTerminal;
use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::executor::RunSummary;
use crate::inventory::HostPool;

/// Terminal output manager
pub struct TerminalOutput {
    verbose: bool,
    quiet: bool,
    is_tty: bool,
}

impl TerminalOutput {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        let is_tty = std::io::stdout().is_terminal();

        // Respect NO_COLOR environment variable (https://no-color.org/)
        // Also disable colors if not a TTY
        if std::env::var("NO_COLOR").is_ok() || !is_tty {
            colored::control::set_override(false);
        }

        TerminalOutput {
            verbose,
            quiet,
            is_tty,
        }
    }

    /// Print a header for a run
    pub fn print_run_header(&self, mode: &str, hosts_count: usize) {
        if self.quiet {
            return;
        }

        println!();
        println!(
            "{} {} ({} hosts)",
            "RUN".green().bold(),
            mode.cyan(),
            hosts_count
        );
        println!("{}", separator().dimmed());
    }

    /// Progress bar counting hosts through the aggregator
    pub fn create_progress(&self, total: usize) -> ProgressBar {
        if self.quiet || !self.is_tty {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

        pb.set_style(style);
        pb.set_message(format!("{} remaining", total));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Print the per-host results (verbose only) and the run summary
    pub fn print_summary(&self, summary: &RunSummary, pool: &HostPool) {
        if self.quiet {
            return;
        }

        if self.verbose {
            println!();
            for host in pool.hosts() {
                let status = if !host.liveness.is_online() {
                    "OFFLINE".dimmed()
                } else if summary.probe_only {
                    "ONLINE".green()
                } else if host.succeeded {
                    "SUCCESS".green()
                } else {
                    "FAILED".red().bold()
                };

                println!("  {} {} {}", status, "=>".dimmed(), host.address.white().bold());

                if !summary.probe_only && host.liveness.is_online() {
                    if !host.report.is_empty() {
                        println!("      {}", host.report.dimmed());
                    }
                    for line in host.error.lines() {
                        println!("      {}", line.red());
                    }
                }
            }
        }

        let stats = &summary.stats;
        println!();
        println!("{}", "RUN RECAP".green().bold());
        println!("{}", separator().dimmed());

        let offline = if stats.offline > 0 {
            format!("offline={}", stats.offline).red()
        } else {
            format!("offline={}", stats.offline).normal()
        };

        if summary.probe_only {
            println!(
                "total={}    {}    {}",
                stats.total,
                format!("online={}", stats.online).green(),
                offline
            );
        } else {
            let failed = stats.online - stats.succeeded;
            let failed = if failed > 0 {
                format!("failed={}", failed).red().bold()
            } else {
                format!("failed={}", failed).normal()
            };

            println!(
                "total={}    {}    {}    {}    {}",
                stats.total,
                format!("online={}", stats.online).green(),
                offline,
                format!("succeeded={}", stats.succeeded).green(),
                failed
            );
        }

        println!();
        println!("Report: {}", summary.report.display().to_string().cyan());
        println!("Total time: {:.2}s", summary.duration().as_secs_f64());
    }
}

/// Horizontal rule, at most 60 columns wide
fn separator() -> String {
    let (_, cols) = console::Term::stdout().size();
    "─".repeat(usize::from(cols).clamp(20, 60))
}
