mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::path::Path;
use std::process;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use music_sorter_core::{AppConfig, CancelToken, Pipeline};
use progress::CliReporter;
use tracing::{error, info, warn};

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> CliResult {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match music_sorter_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("{}", "Stopping after the current file...".yellow());
        handler_token.cancel();
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let pipeline = Pipeline::new(config.clone());

    let outcome = match args.command {
        Some(Commands::Index { root, no_resume }) => {
            run_index(&pipeline, &root, !no_resume, &cancel)
        }
        Some(Commands::Metadata) => run_metadata(&pipeline, &cancel),
        Some(Commands::Dedupe) => run_dedupe(&pipeline, &cancel),
        Some(Commands::Duplicates { limit }) => run_duplicates(&pipeline, limit),
        Some(Commands::Migrate {
            include_duplicates,
            dry_run,
        }) => run_migrate(&pipeline, !include_duplicates, dry_run, &cancel),
        Some(Commands::Status) => run_status(&pipeline),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(())
        }
        Some(Commands::ResetDb) => run_reset(&pipeline, &config),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = outcome {
        error!("Error: {}", err);
        process::exit(1);
    }

    Ok(())
}

fn print_error_sample(error_files: &[String]) {
    for path in error_files {
        println!("    {} {}", "✗".red(), path);
    }
}

fn stopped_note(stopped: bool) {
    if stopped {
        println!("{}", "Stopped before completion; run again to continue.".yellow());
    }
}

fn run_index(pipeline: &Pipeline, root: &Path, resume: bool, cancel: &CancelToken) -> CliResult {
    let reporter = CliReporter::new();
    let result = pipeline.index_directory(root, resume, &reporter, cancel)?;

    println!();
    if result.resumed_from > 0 {
        info!("Resumed from checkpoint at {} files", result.resumed_from);
    }
    info!(
        "{} added, {} skipped, {} errors in {} ({:.1} files/s)",
        format!("{}", result.files_added).green(),
        format!("{}", result.files_skipped).cyan(),
        format!("{}", result.errors).red(),
        format!("{:.2}s", result.elapsed.as_secs_f64()).green(),
        result.files_per_second,
    );
    print_error_sample(&result.error_files);
    stopped_note(result.stopped);
    Ok(())
}

fn run_metadata(pipeline: &Pipeline, cancel: &CancelToken) -> CliResult {
    let reporter = CliReporter::new();
    let result = pipeline.extract_metadata(&reporter, cancel)?;

    println!();
    info!(
        "{} extracted, {} failed",
        format!("{}", result.extracted).green(),
        format!("{}", result.failed).red(),
    );
    print_error_sample(&result.error_files);
    stopped_note(result.stopped);
    Ok(())
}

fn run_dedupe(pipeline: &Pipeline, cancel: &CancelToken) -> CliResult {
    let reporter = CliReporter::new();
    let stats = pipeline.find_duplicates(&reporter, cancel)?;

    println!();
    info!(
        "{} duplicate groups, {} files, {} reclaimable",
        format!("{}", stats.groups).red(),
        format!("{}", stats.duplicate_files).red(),
        format!("{:.2} MB", stats.space_savings as f64 / 1024.0 / 1024.0).red(),
    );
    stopped_note(stats.stopped);
    Ok(())
}

fn run_duplicates(pipeline: &Pipeline, limit: usize) -> CliResult {
    let groups = pipeline.get_duplicate_groups(limit)?;
    if groups.is_empty() {
        println!("No duplicate groups. Run `dedupe` first.");
        return Ok(());
    }
    for group in &groups {
        println!("{}", format!("Group {}", group.group_id).bold());
        for member in &group.members {
            let marker = if member.is_primary {
                "★".green()
            } else {
                " ".normal()
            };
            println!(
                "  {} [{:>4}] {} ({} bytes, {}, {})",
                marker,
                member.quality_score,
                member.path,
                member.size,
                member.format.as_deref().unwrap_or("?"),
                member
                    .bitrate
                    .map(|b| format!("{} kbps", b))
                    .unwrap_or_else(|| "? kbps".to_string()),
            );
        }
    }
    Ok(())
}

fn run_migrate(
    pipeline: &Pipeline,
    skip_duplicates: bool,
    dry_run: bool,
    cancel: &CancelToken,
) -> CliResult {
    let reporter = CliReporter::new();
    let result = if dry_run {
        pipeline.dry_run_migration(skip_duplicates, &reporter, cancel)?
    } else {
        pipeline.migrate_library(skip_duplicates, &reporter, cancel)?
    };

    println!();
    if dry_run {
        for mapping in &result.mappings {
            println!("  {} {} {}", mapping.source, "→".cyan(), mapping.target);
        }
        info!(
            "{} files would be migrated ({} shown), {} already done",
            format!("{}", result.migrated).green(),
            result.mappings.len(),
            result.skipped,
        );
    } else {
        info!(
            "{} migrated, {} skipped, {} failed",
            format!("{}", result.migrated).green(),
            format!("{}", result.skipped).cyan(),
            format!("{}", result.failed).red(),
        );
        print_error_sample(&result.error_files);
    }
    stopped_note(result.stopped);
    Ok(())
}

fn run_status(pipeline: &Pipeline) -> CliResult {
    let stats = pipeline.catalog_statistics()?;
    let migration = pipeline.migration_status()?;

    println!(
        "{} files, {:.2} GB",
        stats.total_files,
        stats.total_bytes as f64 / 1024.0 / 1024.0 / 1024.0
    );
    for (status, count) in &stats.status_counts {
        println!("  {:<10} {}", status, count);
    }
    println!(
        "Migrated {}/{} ({:.1}%)",
        migration.migrated_files, migration.total_files, migration.progress_percentage
    );
    for record in &migration.recent_migrations {
        println!("  {} {} {}", record.source_path, "→".cyan(), record.target_path);
    }
    Ok(())
}

fn run_reset(pipeline: &Pipeline, config: &AppConfig) -> CliResult {
    let question = format!(
        "Are you SURE you want to COMPLETELY DELETE the catalog in {}?",
        config.database.path
    );
    if prompt_confirm(&question, Some(false))? {
        pipeline.reset()?;
        println!("All tables truncated");
    }
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
