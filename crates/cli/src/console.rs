use anyhow::Result;
use autoproxy_core::CandidateView;
use autoproxy_engine::scheduler::{Notice, NoticeLevel};
use autoproxy_engine::{Scheduler, SchedulerMetrics, SchedulerStatus, TriggerOutcome, TriggerSource};
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Color scheme for console output.
struct Colors;

impl Colors {
    const PROMPT: Color = Color::Green;
    const INFO: Color = Color::Cyan;
    const WARN: Color = Color::Yellow;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
    const ACTIVE: Color = Color::Green;
}

/// One operator command read from stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Enable,
    Disable,
    Trigger,
    Status,
    Pool,
    Metrics,
    Help,
    Quit,
}

impl Command {
    pub fn parse(input: &str) -> Option<Self> {
        let command = match input.trim().to_ascii_lowercase().as_str() {
            "enable" | "on" => Command::Enable,
            "disable" | "off" => Command::Disable,
            "trigger" | "run" => Command::Trigger,
            "status" | "s" => Command::Status,
            "pool" | "p" => Command::Pool,
            "metrics" | "m" => Command::Metrics,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            _ => return None,
        };
        Some(command)
    }
}

fn print_colored(color: Color, text: &str) -> Result<()> {
    let mut stdout = io::stdout();
    execute!(stdout, SetForegroundColor(color), Print(text), ResetColor)?;
    stdout.flush()?;
    Ok(())
}

pub fn print_banner(enabled: bool) -> Result<()> {
    let mut stdout = io::stdout();
    execute!(
        stdout,
        SetForegroundColor(Colors::HEADER),
        Print("autoproxy"),
        ResetColor,
        Print(" - adaptive proxy endpoint scheduler\n"),
        SetForegroundColor(Colors::DIM),
        Print(format!(
            "Auto speed test: {}\n",
            if enabled { "enabled" } else { "disabled" }
        )),
        Print("Commands: enable, disable, trigger, status, pool, metrics, help, quit\n"),
        Print("---\n"),
        ResetColor,
    )?;
    stdout.flush()?;
    Ok(())
}

fn print_help() -> Result<()> {
    print_colored(
        Colors::DIM,
        "  enable    turn automatic rounds on\n  \
         disable   turn automatic rounds off (a running round winds down)\n  \
         trigger   start a round now\n  \
         status    show the current status\n  \
         pool      list candidates in rank order\n  \
         metrics   show round counters\n  \
         quit      shut down\n",
    )
}

pub fn print_notice(notice: &Notice) -> Result<()> {
    let color = match notice.level {
        NoticeLevel::Info => Colors::INFO,
        NoticeLevel::Warn => Colors::WARN,
        NoticeLevel::Error => Colors::ERROR,
    };
    print_colored(
        color,
        &format!("[{}] {}\n", notice.at.format("%H:%M:%S"), notice.message),
    )
}

pub fn format_status(status: &SchedulerStatus) -> String {
    let mut out = format!(
        "enabled: {}  running: {}",
        status.enabled, status.running
    );
    if let Some(step) = status.step {
        out.push_str(&format!("  step: {step}"));
    }
    if let Some(next) = &status.time_to_next {
        out.push_str(&format!("  next: {next}"));
    }
    if let Some(last) = &status.last_duration {
        out.push_str(&format!("  last round: {last}"));
    }
    match &status.active {
        Some(active) => out.push_str(&format!(
            "\nactive: {} {} ({}, {})",
            active.address, active.label, active.delay, active.throughput
        )),
        None => out.push_str("\nactive: none"),
    }
    if !status.message.is_empty() {
        out.push_str(&format!("\n{}", status.message));
    }
    out
}

pub fn format_pool(views: &[CandidateView]) -> String {
    if views.is_empty() {
        return "pool is empty".to_string();
    }
    views
        .iter()
        .map(|v| {
            format!(
                "{} {:>4}  {:<24} {:>10} {:>12}  {}",
                if v.is_active { "*" } else { " " },
                v.sort_key,
                v.address,
                v.delay,
                v.throughput,
                v.label
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_metrics(metrics: &SchedulerMetrics) -> String {
    serde_json::to_string_pretty(metrics).unwrap_or_else(|e| format!("metrics unavailable: {e}"))
}

fn print_pool(views: &[CandidateView]) -> Result<()> {
    for line in format_pool(views).lines() {
        let color = if line.starts_with('*') {
            Colors::ACTIVE
        } else {
            Colors::DIM
        };
        print_colored(color, &format!("{line}\n"))?;
    }
    Ok(())
}

/// Print every notice until the scheduler goes away.
pub async fn follow_notices(mut notices: broadcast::Receiver<Notice>) {
    loop {
        match notices.recv().await {
            Ok(notice) => {
                if let Err(e) = print_notice(&notice) {
                    debug!(error = %e, "failed to print notice");
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "console fell behind on notices");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Read commands from stdin until `quit` or end of input.
pub async fn run(scheduler: Arc<Scheduler>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_colored(Colors::PROMPT, "autoproxy> ")?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let Some(command) = Command::parse(&line) else {
            print_colored(
                Colors::ERROR,
                &format!("unknown command '{}', try 'help'\n", line.trim()),
            )?;
            continue;
        };

        match command {
            Command::Enable => scheduler.set_enabled(true),
            Command::Disable => scheduler.set_enabled(false),
            Command::Trigger => {
                // Rounds can take hours; keep the console responsive.
                let scheduler = Arc::clone(&scheduler);
                tokio::spawn(async move {
                    if let TriggerOutcome::Finished(report) =
                        scheduler.trigger(TriggerSource::Manual).await
                    {
                        debug!(outcome = ?report.outcome, cycles = report.cycles, "manual round finished");
                    }
                });
            }
            Command::Status => {
                print_colored(Colors::INFO, &format!("{}\n", format_status(&scheduler.status())))?
            }
            Command::Pool => match scheduler.pool().views().await {
                Ok(views) => print_pool(&views)?,
                Err(e) => print_colored(Colors::ERROR, &format!("{e}\n"))?,
            },
            Command::Metrics => {
                print_colored(Colors::INFO, &format!("{}\n", format_metrics(&scheduler.metrics())))?
            }
            Command::Help => print_help()?,
            Command::Quit => break,
        }
    }
    Ok(())
}
