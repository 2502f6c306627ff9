//! Cayt - Context-Aware Transcript Translator
//!
//! Command line entry point: translates caption files and caption-directory
//! items into timestamp-aligned SRT files.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::{non_blocking, rolling};

use cayt::cli::{Args, Commands};
use cayt::config::Config;
use cayt::language::LanguagePair;
use cayt::subtitle::{generate_srt, parse_cues};
use cayt::workflow::{ItemOptions, JobStatus, TranslationJob, Workflow};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;
    info!("Starting Cayt - Context-Aware Transcript Translator");

    if let Commands::InitConfig { output, force } = &args.command {
        return init_config(output, *force);
    }

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Translate { input, output, source, target, no_context, refine, item_id } => {
            info!("Translating caption file: {}", input.display());

            let content = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let fragments = parse_cues(&content);
            if fragments.is_empty() {
                bail!("No cues found in {}", input.display());
            }

            let workflow = Workflow::new(config)?;
            let item_id = match item_id {
                Some(item_id) => item_id,
                None => file_stem(&input)?,
            };

            let mut request = workflow.default_request(item_id, fragments);
            let defaults = request.languages.clone();
            request.languages = LanguagePair::new(
                source.unwrap_or(defaults.source),
                target.unwrap_or(defaults.target),
            );
            request.use_context_analysis &= !no_context;
            request.refine |= refine;

            let job = workflow.request_translation(request).await?;
            deliver(&job, &output).await?;
            print_cache_stats(&workflow);
        }
        Commands::Item { item, dir, output, source, target, force_speech, no_context, refine } => {
            if let Some(dir) = dir {
                config.source.caption_dir = dir;
            }
            info!("Translating item {} from {}", item, config.source.caption_dir.display());

            let mut options = ItemOptions::from_config(&config);
            if let Some(source) = source {
                options.source_language = source;
            }
            if let Some(target) = target {
                options.target_language = target;
            }
            options.force_speech = force_speech;
            options.use_context_analysis &= !no_context;
            options.refine |= refine;

            let output = output.unwrap_or_else(|| {
                config
                    .source
                    .caption_dir
                    .join(format!("{}.{}.srt", item, options.target_language))
            });

            let workflow = Workflow::new(config)?;
            let job = workflow.translate_item(&item, options).await?;
            deliver(&job, &output).await?;
            print_cache_stats(&workflow);
        }
        Commands::Models => {
            let workflow = Workflow::new(config.clone())?;
            let models = workflow.list_models().await?;

            println!("\nCurrent model: {}", config.completion.model);
            println!("Available models at {}:", config.completion.endpoint);
            println!("{}", "-".repeat(40));
            for model in &models {
                let marker = if *model == config.completion.model { "*" } else { " " };
                println!("{} {}", marker, model);
            }
        }
        Commands::Check => {
            let workflow = Workflow::new(config.clone())?;
            if workflow.check_connection().await {
                println!("Completion service reachable at {}", config.completion.endpoint);
            } else {
                bail!(
                    "Completion service unreachable at {}. Start it with 'ollama serve'.",
                    config.completion.endpoint
                );
            }
        }
        Commands::InitConfig { .. } => {}
    }

    info!("Cayt finished successfully");
    Ok(())
}

/// Write the SRT of a completed job; cancelled jobs write nothing
async fn deliver(job: &TranslationJob, output: &Path) -> Result<()> {
    match job.status {
        JobStatus::Completed => {
            generate_srt(&job.segments, output).await?;
            println!(
                "Translated '{}' ({} -> {}, {}, {} segments{}) to {}",
                job.title,
                job.source_language,
                job.target_language,
                job.source_type.as_str(),
                job.segments.len(),
                if job.cached { ", cached" } else { "" },
                output.display()
            );
            println!("Context: {}", job.context.summary());
            Ok(())
        }
        JobStatus::Cancelled => {
            warn!("Translation of {} was cancelled, no output written", job.item_id);
            Ok(())
        }
        JobStatus::Failed => bail!(
            "Translation of {} failed: {}",
            job.item_id,
            job.error_message.as_deref().unwrap_or("unknown error")
        ),
        status => bail!("Translation of {} ended in unexpected state {:?}", job.item_id, status),
    }
}

fn print_cache_stats(workflow: &Workflow) {
    let stats = workflow.cache_stats();
    info!(
        "Cache: {}/{} entries, {} in progress, ttl {}",
        stats.count, stats.max_size, stats.in_progress_count, format_duration(stats.ttl_secs)
    );
}

fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists, use --force to overwrite", output.display());
    }
    Config::default().save_to_file(output)?;
    println!("Default configuration written to {}", output.display());
    Ok(())
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .with_context(|| format!("Cannot derive an item id from {}", path.display()))
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".cayt").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation; the guard must outlive the program
    let file_appender = rolling::daily(&log_dir, "cayt.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("cayt.log").display());

    Ok(())
}

/// Format duration in seconds to human readable string
fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
