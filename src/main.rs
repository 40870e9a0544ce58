//! jsprobe - JavaScript API call-site extractor CLI

use clap::{ArgGroup, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::builder::Builder;
use tabled::settings::Style;
use tracing_subscriber::EnvFilter;

use jsprobe::acquire::{Fetcher, ScanInput};
use jsprobe::config::{self, CliOverrides};
use jsprobe::engine::Engine;
use jsprobe::http::HttpClient;
use jsprobe::models::{RequestKind, RunConfig, RunStatus, ScanRun};
use jsprobe::report;
use jsprobe::scan;

/// jsprobe - find the backend API calls hiding in JavaScript
#[derive(Parser)]
#[command(name = "jsprobe", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract API call sites from pages, scripts or a local file
    #[command(group(
        ArgGroup::new("input")
            .required(true)
            .args(["url", "extract_url", "list", "extract_list", "file"]),
    ))]
    Scan {
        /// Page URL whose external and inline scripts are analyzed
        #[arg(short, long)]
        url: Option<String>,

        /// Single JavaScript URL to analyze
        #[arg(long)]
        extract_url: Option<String>,

        /// File of page URLs, one per line
        #[arg(short, long)]
        list: Option<PathBuf>,

        /// File of JavaScript URLs, one per line
        #[arg(long)]
        extract_list: Option<PathBuf>,

        /// Local JavaScript file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Text report path
        #[arg(short, long)]
        output: Option<String>,

        /// Also write an HTML report
        #[arg(long)]
        html: Option<String>,

        /// Also export the run as JSON
        #[arg(long)]
        json: Option<String>,

        /// Maximum concurrent fetches
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Accept invalid TLS certificates
        #[arg(short = 'k', long)]
        insecure: bool,

        /// Overlap resolution for competing matches (longest or priority)
        #[arg(long)]
        overlap: Option<String>,

        /// Custom headers (format: "Key: Value")
        #[arg(short = 'H', long)]
        header: Option<Vec<String>>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List the call patterns the extractor recognizes
    Patterns,

    /// Generate an HTML report from a previous run's JSON export
    Report {
        /// Path to the JSON export
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path
        #[arg(short, long, default_value = "jsprobe_report.html")]
        output: String,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "jsprobe=debug" } else { "jsprobe=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

fn print_banner() {
    let banner = r#"
    ╔═══════════════════════════════════════╗
    ║  JSPROBE v0.1.0                       ║
    ║  JavaScript API call-site extractor   ║
    ╚═══════════════════════════════════════╝
    "#;
    println!("{}", banner.cyan());
}

fn print_summary(run: &ScanRun) {
    println!("\n{}", "  Extraction Summary".bold());
    println!("  {}", "─".repeat(35));

    let mut builder = Builder::default();
    builder.push_record(["Type", "Count"]);
    for kind in RequestKind::ALL {
        builder.push_record([
            kind.label().to_string(),
            run.result.count_by_kind(kind).to_string(),
        ]);
    }
    builder.push_record([
        "Total".to_string(),
        run.result.total_candidates().to_string(),
    ]);

    let mut table = builder.build();
    table.with(Style::rounded());
    println!("{table}");

    println!(
        "\n  {} {} {} {}",
        format!("{} origins", run.result.origins.len()).cyan(),
        format!("{} with parameters", run.result.total_with_parameters()).green(),
        format!("{} warnings", run.result.warnings.len()).yellow(),
        format!("{} requests", run.total_requests).white(),
    );

    match &run.status {
        RunStatus::Completed => {}
        RunStatus::Interrupted => println!(
            "\n  {} {}",
            "Interrupted:".yellow().bold(),
            "partial results were saved".yellow()
        ),
        RunStatus::Failed(reason) => {
            println!("\n  {} {}", "Failed:".red().bold(), reason.red())
        }
    }
}

fn scan_input(
    url: Option<String>,
    extract_url: Option<String>,
    list: Option<PathBuf>,
    extract_list: Option<PathBuf>,
    file: Option<PathBuf>,
) -> Option<ScanInput> {
    url.map(ScanInput::PageUrl)
        .or_else(|| extract_url.map(ScanInput::ScriptUrl))
        .or_else(|| list.map(ScanInput::PageList))
        .or_else(|| extract_list.map(ScanInput::ScriptList))
        .or_else(|| file.map(ScanInput::LocalFile))
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            url,
            extract_url,
            list,
            extract_list,
            file,
            output,
            html,
            json,
            concurrency,
            timeout,
            config: config_path,
            insecure,
            overlap,
            header,
            verbose,
        } => {
            init_tracing(verbose);
            print_banner();

            let Some(input) = scan_input(url, extract_url, list, extract_list, file) else {
                eprintln!("  {} no input given", "Error:".red().bold());
                std::process::exit(2);
            };

            let mut run_config = if let Some(ref path) = config_path {
                config::load_config(path)?
            } else {
                let default_path = Path::new("config/default.toml");
                if default_path.exists() {
                    config::load_config(default_path)?
                } else {
                    RunConfig::default()
                }
            };

            config::merge_cli_args(
                &mut run_config,
                CliOverrides {
                    concurrency,
                    timeout,
                    insecure,
                    overlap,
                    output,
                    html,
                    json,
                    headers: header,
                },
            )?;

            println!("  {} {}", "Input:".bold(), input.to_string().green());
            println!(
                "  {} {}",
                "Concurrency:".bold(),
                run_config.concurrency.to_string().cyan()
            );
            println!(
                "  {} {}\n",
                "Report:".bold(),
                run_config.report_path.cyan()
            );

            let client: Arc<dyn Fetcher> = Arc::new(HttpClient::from_config(&run_config)?);
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            let run = scan::run_scan(&run_config, input, client, shutdown).await?;

            print_summary(&run);

            if let Some(ref path) = run_config.html_path {
                report::html::generate(&run, Path::new(path))?;
                println!("\n  {} {}", "HTML report:".bold(), path.green());
            }
            if let Some(ref path) = run_config.json_path {
                report::json::export(&run, Path::new(path))?;
                println!("  {} {}", "JSON export:".bold(), path.green());
            }
            println!(
                "\n  {} {}",
                "Report saved to:".bold(),
                run_config.report_path.green()
            );

            if let RunStatus::Failed(_) = run.status {
                std::process::exit(1);
            }
        }

        Commands::Patterns => {
            print_banner();
            let engine = Engine::with_defaults()?;

            println!("  {}\n", "Recognized Call Patterns:".bold());
            for (name, description) in engine.patterns().list_patterns() {
                println!("    {} {}", format!("{name:20}").cyan().bold(), description);
            }
            println!();
        }

        Commands::Report { input, output } => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("jsprobe=info"))
                .with_target(false)
                .init();

            print_banner();

            let run = report::json::load(&input)?;
            report::html::generate(&run, Path::new(&output))?;

            print_summary(&run);
            println!("\n  {} {}", "Report saved to:".bold(), output.green());
        }
    }

    Ok(())
}
