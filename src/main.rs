use clap::{Parser, Subcommand};
use forge_sync::acquire::{acquire_updates, DownloadsDirImporter};
use forge_sync::config::Config;
use forge_sync::download::{Downloader, RetryPolicy};
use forge_sync::enrich::{
    check_updates, diagnose_install, enrich_installs, import_mapping_file, SidecarSink,
};
use forge_sync::forge::{ForgeClient, UpdateEntry};
use forge_sync::mapping::load_mapping;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "forge-sync", version, about = "Reconcile installed SPT mods against the Forge catalog")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Match every install folder against the catalog and write attributes
    Enrich,
    /// Check installed mods for newer releases
    Updates {
        /// Download and stage the available updates
        #[arg(long)]
        download: bool,
    },
    /// Download the latest release archive for a single mod by guid
    Download {
        guid: String,
        /// Destination directory; defaults to the configured downloads dir
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show evidence, mapping hits and scored search results for one install
    Diagnose { folder: String },
    /// Manage the curated override table
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },
}

#[derive(Subcommand)]
enum MappingAction {
    /// Parse a mapping file (JSON or free text) and save it as the override table
    Import { source: PathBuf },
    /// Print the current override table
    Show,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("forge_sync=info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let client = ForgeClient::new(config.api_key.clone(), config.base_url.clone());

    match cli.command {
        Command::Enrich => {
            let sink = SidecarSink::new(config.install_root.clone());
            let report = enrich_installs(
                &client,
                &sink,
                &config.install_root,
                &config.mapping_path,
                config.guid_rules.clone(),
            )
            .await?;
            println!("Enriched {} installs, {} skipped", report.enriched, report.skipped);
        }
        Command::Updates { download } => {
            let report = check_updates(
                &client,
                &config.install_root,
                config.spt_version.as_deref(),
            )
            .await?;
            print_updates("Updates available", &report.updates);
            print_updates("Blocked", &report.blocked);
            print_updates("Incompatible with SPT version", &report.incompatible);
            println!("{} up to date", report.up_to_date.len());

            if download && !report.updates.is_empty() {
                let downloader = Downloader::new(RetryPolicy::default());
                let importer = DownloadsDirImporter::new(config.downloads_dir.clone());
                let staging = config.downloads_dir.join(".staging");
                let result = acquire_updates(
                    &client,
                    &downloader,
                    &importer,
                    &staging,
                    &report.updates,
                )
                .await;
                println!("Downloaded {}, failed {}", result.succeeded, result.failed);
            }
        }
        Command::Download { guid, out } => {
            let entry = UpdateEntry {
                guid: guid.clone(),
                name: None,
                current_version: None,
                latest_version: None,
                assets: Vec::new(),
            };
            let downloader = Downloader::new(RetryPolicy::default());
            let dir = out.unwrap_or_else(|| config.downloads_dir.clone());
            let importer = DownloadsDirImporter::new(dir.clone());
            let result = acquire_updates(
                &client,
                &downloader,
                &importer,
                &dir.join(".staging"),
                std::slice::from_ref(&entry),
            )
            .await;
            if result.failed > 0 {
                return Err(format!("download failed for {}", guid).into());
            }
            println!("Downloaded {}", guid);
        }
        Command::Diagnose { folder } => {
            let report = diagnose_install(
                &client,
                &config.install_root,
                &config.mapping_path,
                &folder,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Mapping { action } => match action {
            MappingAction::Import { source } => {
                let entries = import_mapping_file(&source, &config.mapping_path).await?;
                println!(
                    "Imported {} mapping entries into {}",
                    entries.len(),
                    config.mapping_path.display()
                );
            }
            MappingAction::Show => {
                let entries = load_mapping(&config.mapping_path).await;
                if entries.is_empty() {
                    println!("No mapping entries at {}", config.mapping_path.display());
                }
                for entry in entries {
                    println!("{} -> {} ({:?})", entry.key_raw, entry.target, entry.target_kind);
                }
            }
        },
    }
    Ok(())
}

fn print_updates(label: &str, entries: &[UpdateEntry]) {
    if entries.is_empty() {
        return;
    }
    println!("{}:", label);
    for e in entries {
        println!(
            "  {} {} -> {}",
            e.name.as_deref().unwrap_or(&e.guid),
            e.current_version.as_deref().unwrap_or("?"),
            e.latest_version.as_deref().unwrap_or("?")
        );
    }
}
