use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use crate::commands::rename_pipeline::{RunController, RunOptions};
use crate::models::run::RunEvent;
use crate::services::export_service;
use crate::services::import_service;
use crate::services::naming_client::{ContentHint, OpenAiNamingClient};
use crate::services::rename_service::RenameEngine;
use crate::services::settings_service::{self, Credential, Provider, Settings};

#[derive(Parser, Debug)]
#[command(author, version, about = "Rename SVG/EPS/AI files with AI-suggested titles")]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Name every vector file in a folder and export a zip of renamed copies
    Rename(RenameArgs),
    /// List the vector files a folder would contribute to a run
    Preview {
        /// Input folder
        dir: PathBuf,
    },
    /// Show the resolved settings, or store new values with --save
    Config(ConfigArgs),
}

#[derive(Args, Debug, Default)]
pub struct SettingsOverrides {
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,
    #[arg(long)]
    pub model: Option<String>,
    /// Delay between files in milliseconds
    #[arg(long)]
    pub pacing_ms: Option<u64>,
}

impl SettingsOverrides {
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(provider) = self.provider {
            settings.provider = provider;
        }
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if let Some(pacing_ms) = self.pacing_ms {
            settings.pacing_ms = pacing_ms;
        }
    }
}

#[derive(Args, Debug)]
pub struct RenameArgs {
    /// Input folder (searched recursively)
    pub dir: PathBuf,
    /// Output archive path
    #[arg(short, long)]
    pub out: Option<PathBuf>,
    /// Also write a JSON manifest of old and new names
    #[arg(long)]
    pub manifest: Option<PathBuf>,
    /// API key for the naming service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Review names after the run and regenerate single files before export
    #[arg(long)]
    pub review: bool,
    #[command(flatten)]
    pub overrides: SettingsOverrides,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Write the given values to the settings file
    #[arg(long)]
    pub save: bool,
    #[command(flatten)]
    pub overrides: SettingsOverrides,
}

#[derive(Debug, PartialEq, Eq)]
enum ReviewCommand {
    /// Zero-based index of the file to name again.
    Regenerate(usize),
    Export,
}

/// `g <n>` regenerates file n (1-based as listed); an empty line or `x` exports.
fn parse_review_command(line: &str) -> Option<ReviewCommand> {
    let line = line.trim();
    if line.is_empty() || line == "x" {
        return Some(ReviewCommand::Export);
    }
    let number = line.strip_prefix('g')?.trim().parse::<usize>().ok()?;
    number.checked_sub(1).map(ReviewCommand::Regenerate)
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Rename(args) => rename(args).await,
        Command::Preview { dir } => preview(dir),
        Command::Config(args) => config(args),
    }
}

fn progress_bar(total: usize) -> Result<ProgressBar> {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} files renamed — {msg}")?
            .progress_chars("##-"),
    );
    bar.set_message("0%");
    Ok(bar)
}

async fn render_events(mut events: broadcast::Receiver<RunEvent>, bar: ProgressBar) {
    loop {
        match events.recv().await {
            Ok(RunEvent::FileRenamed {
                outcome,
                processed,
                percent,
                ..
            }) => {
                if let Some(err) = &outcome.naming_error {
                    bar.println(format!(
                        "Rename failed for #{}: {err} (using {})",
                        outcome.index + 1,
                        outcome.final_name
                    ));
                }
                bar.set_position(processed as u64);
                bar.set_message(format!("{percent}%"));
            }
            Ok(RunEvent::Paused) => bar.println("Paused. Enter r to resume, s to stop."),
            Ok(RunEvent::Resumed) => bar.println("Resumed."),
            Ok(RunEvent::StopRequested) => {
                bar.println("Stop requested, finishing the current file.")
            }
            Ok(RunEvent::Stopped { processed, total }) => {
                bar.println(format!("Stopped after {processed} of {total} files."))
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress renderer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Forwards stdin lines for the whole session so run controls and the
/// post-run review read from one reader.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn apply_run_control(controller: &RunController, line: &str) {
    let result = match line.trim() {
        "p" => controller.toggle_pause().map(|_| ()),
        "r" => controller.resume(),
        "s" => controller.stop(),
        _ => return,
    };
    if let Err(err) = result {
        tracing::warn!(error = %err, "control ignored");
    }
}

fn print_names(controller: &RunController) {
    let files = controller.files();
    let snapshot = controller.snapshot();
    for entry in export_service::plan_entries(&files, &snapshot.names) {
        let new_name = if entry.computed { entry.renamed.as_str() } else { "—" };
        println!("{:>4}  {}  ->  {}", entry.index + 1, entry.original, new_name);
    }
}

async fn review(controller: &RunController, lines: &mut mpsc::UnboundedReceiver<String>) {
    println!("Enter g <n> to regenerate file n, or press Enter to export.");
    while let Some(line) = lines.recv().await {
        match parse_review_command(&line) {
            Some(ReviewCommand::Export) => break,
            Some(ReviewCommand::Regenerate(index)) => match controller.regenerate(index).await {
                Ok(outcome) => {
                    let files = controller.files();
                    let original = files
                        .get(index)
                        .map_or("", |file| file.original_name.as_str());
                    println!("{:>4}  {}  ->  {}", index + 1, original, outcome.final_name);
                    if let Some(err) = outcome.naming_error {
                        println!("      naming failed: {err}");
                    }
                }
                Err(err) => println!("{err}"),
            },
            None => println!("Unrecognized input: {}", line.trim()),
        }
    }
}

async fn stop_on_ctrl_c(controller: Arc<RunController>) {
    if tokio::signal::ctrl_c().await.is_ok() {
        let _ = controller.stop();
    }
}

async fn rename(args: RenameArgs) -> Result<()> {
    let mut settings = settings_service::load_settings().context("failed to load settings")?;
    args.overrides.apply_to(&mut settings);

    let files = import_service::import_folder(&args.dir)?;
    let client = Arc::new(OpenAiNamingClient::new(&settings)?);
    let engine = RenameEngine::new(client, Credential::new(args.api_key.clone()));
    let controller = Arc::new(RunController::new(
        files,
        engine,
        RunOptions {
            pacing: settings.pacing(),
        },
    ));

    let bar = progress_bar(controller.files().len())?;
    let renderer = tokio::spawn(render_events(controller.subscribe(), bar.clone()));
    let run_id = controller.start()?;
    let interrupt = tokio::spawn(stop_on_ctrl_c(controller.clone()));
    let mut lines = stdin_lines();

    let summary = {
        let drive = controller.drive(&run_id);
        tokio::pin!(drive);
        loop {
            tokio::select! {
                summary = &mut drive => break summary,
                Some(line) = lines.recv() => apply_run_control(&controller, &line),
            }
        }
    };

    interrupt.abort();
    renderer.abort();
    bar.finish_with_message(format!("{} ({}%)", summary.status, controller.snapshot().percent));

    print_names(&controller);
    if args.review {
        review(&controller, &mut lines).await;
    }

    let files = controller.files();
    let snapshot = controller.snapshot();
    let entries = export_service::plan_entries(&files, &snapshot.names);
    let archive = export_service::build_archive(&files, &snapshot.names)?;
    let out = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.archive_name));
    tokio::fs::write(&out, archive)
        .await
        .with_context(|| format!("failed to write archive {}", out.display()))?;
    println!(
        "{} / {} files renamed. Archive written to {}",
        snapshot.processed,
        snapshot.total,
        out.display()
    );

    if let Some(path) = &args.manifest {
        let json = export_service::manifest_json(&entries)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("failed to write manifest {}", path.display()))?;
    }

    tracing::info!(
        run_id = %summary.run_id,
        status = %summary.status,
        fallbacks = summary.fallbacks,
        "rename finished"
    );
    Ok(())
}

fn preview(dir: PathBuf) -> Result<()> {
    let files = import_service::import_folder(&dir)?;
    for file in files.iter() {
        println!(
            "{:>4}  {}  ({})",
            file.index + 1,
            file.original_name,
            ContentHint::for_file(file).description
        );
    }
    println!("{} files imported.", files.len());
    Ok(())
}

fn config(args: ConfigArgs) -> Result<()> {
    let mut settings = settings_service::load_settings().context("failed to load settings")?;
    let path = settings_service::settings_path();
    if args.save {
        let path = path
            .as_deref()
            .context("no config directory available to save settings")?;
        args.overrides.apply_to(&mut settings);
        settings_service::save_settings_to(path, &settings)
            .with_context(|| format!("failed to save settings to {}", path.display()))?;
        println!("Saved settings to {}", path.display());
    }
    match &path {
        Some(path) => println!("Settings file: {}", path.display()),
        None => println!("Settings file: <no config directory>"),
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_args_override_settings() {
        let cli = Cli::try_parse_from([
            "structor",
            "rename",
            "art",
            "--provider",
            "openai",
            "--model",
            "gpt-4o",
            "--pacing-ms",
            "0",
        ])
        .unwrap();
        let Command::Rename(args) = cli.command else {
            panic!("expected rename command");
        };

        let mut settings = Settings {
            provider: Provider::Gemini,
            ..Settings::default()
        };
        args.overrides.apply_to(&mut settings);
        assert!(!args.review);

        assert_eq!(args.dir, PathBuf::from("art"));
        assert_eq!(settings.provider, Provider::OpenAi);
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.pacing_ms, 0);
    }

    #[test]
    fn preview_and_config_parse() {
        let cli = Cli::try_parse_from(["structor", "--json-logs", "preview", "in"]).unwrap();
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Command::Preview { .. }));
        assert!(matches!(
            Cli::try_parse_from(["structor", "config"]).unwrap().command,
            Command::Config(ConfigArgs { save: false, .. })
        ));
    }

    #[test]
    fn config_save_takes_overrides() {
        let cli =
            Cli::try_parse_from(["structor", "config", "--save", "--model", "gpt-4o"]).unwrap();
        let Command::Config(args) = cli.command else {
            panic!("expected config command");
        };
        assert!(args.save);
        assert_eq!(args.overrides.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn review_commands_use_one_based_numbers() {
        assert_eq!(parse_review_command("g 3"), Some(ReviewCommand::Regenerate(2)));
        assert_eq!(parse_review_command("g1"), Some(ReviewCommand::Regenerate(0)));
        assert_eq!(parse_review_command(""), Some(ReviewCommand::Export));
        assert_eq!(parse_review_command(" x "), Some(ReviewCommand::Export));
        assert_eq!(parse_review_command("g 0"), None);
        assert_eq!(parse_review_command("g two"), None);
        assert_eq!(parse_review_command("s"), None);
    }
}
