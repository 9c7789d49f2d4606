use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use rpmscan::{
    config::Config,
    detector::{all_detectors, get_detector, Detector},
    model::{Format, LayerScan, ScanResult},
    output::{format_result_to_string, print_result, OutputFormat},
    rpm::{parse_query_output, resolve_source_package, ListError, RpmLister, QUERY_FORMAT},
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const MALFORMED_DATABASE: u8 = 2;
}

#[derive(Parser)]
#[command(name = "rpmscan")]
#[command(
    author,
    version,
    about = "Inventory installed packages in RPM-based image layers"
)]
struct Cli {
    /// Log more detail to stderr (repeat for trace output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan extracted image roots for installed packages
    Scan {
        /// Image root directories (extracted layers or filesystems)
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Only run the detector for this format (rpm)
        #[arg(long)]
        detector: Option<String>,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Write output to file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Scan roots one at a time
        #[arg(long)]
        no_parallel: bool,
    },

    /// List features from saved `rpm -qa --queryformat` output
    List {
        /// File holding the query output, or `-` for stdin
        #[arg(default_value = "-")]
        input: String,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Resolve source RPM filenames into source name and version
    ParseSource {
        /// Source RPM filenames, e.g. bash-4.4.23-1.fc28.src.rpm
        #[arg(required = true)]
        filenames: Vec<String>,
    },

    /// Print the rpm query format expected by `list`
    QueryFormat,

    /// List available detectors
    ListDetectors,

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if e.downcast_ref::<ListError>().is_some() {
                ExitCode::from(exit_codes::MALFORMED_DATABASE)
            } else {
                ExitCode::from(exit_codes::ERROR)
            }
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<u8> {
    let config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "ignoring unreadable config file");
        Config::default()
    });

    match cli.command {
        Commands::Scan {
            roots,
            detector,
            format,
            output,
            no_parallel,
        } => {
            let format_str = format.unwrap_or(config.default_format.clone());
            let parallel = !no_parallel && config.parallel;
            run_scan(&config, roots, detector, format_str, output, parallel).await
        }
        Commands::List { input, format } => {
            let format_str = format.unwrap_or(config.default_format.clone());
            run_list(&config, &input, &format_str)
        }
        Commands::ParseSource { filenames } => Ok(parse_sources(&filenames)),
        Commands::QueryFormat => {
            print!("{}", QUERY_FORMAT);
            Ok(exit_codes::SUCCESS)
        }
        Commands::ListDetectors => {
            list_detectors(&config);
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

async fn run_scan(
    config: &Config,
    roots: Vec<PathBuf>,
    detector_filter: Option<String>,
    format: String,
    output_file: Option<PathBuf>,
    parallel: bool,
) -> Result<u8> {
    let format = OutputFormat::from_str(&format).map_err(|e| anyhow::anyhow!(e))?;
    let is_interactive = format == OutputFormat::Table && output_file.is_none();

    let detectors: Vec<Box<dyn Detector>> = if let Some(name) = detector_filter {
        let format = Format::from_str(&name).map_err(|e| anyhow::anyhow!(e))?;
        vec![get_detector(format, config)]
    } else {
        all_detectors(config)
    };

    let jobs: Vec<(&dyn Detector, &Path)> = roots
        .iter()
        .flat_map(|root| {
            detectors
                .iter()
                .map(move |detector| (&**detector, root.as_path()))
        })
        .collect();

    let (layers, malformed) = if parallel && jobs.len() > 1 {
        scan_concurrent(&jobs, is_interactive).await
    } else {
        scan_sequential(&jobs, is_interactive).await
    };

    let mut result = ScanResult::new(layers);
    result.retain_features(|f| !config.ignore.should_ignore_package(&f.name));

    if let Some(path) = output_file {
        let text = format_result_to_string(&result, format)?;
        std::fs::write(&path, text)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Results written to: {}", path.display());
    } else {
        print_result(&result, format)?;
    }

    Ok(if malformed {
        exit_codes::MALFORMED_DATABASE
    } else if result.has_errors() {
        exit_codes::ERROR
    } else {
        exit_codes::SUCCESS
    })
}

/// Runs one detector against one root, turning failures into a failed layer.
/// The flag is set when the failure came from a malformed database.
async fn scan_root(detector: &dyn Detector, root: &Path) -> (LayerScan, bool) {
    let name = detector.format().as_str();
    match detector.detect(root).await {
        Ok(features) => (
            LayerScan::new(root.to_path_buf(), name, features.into_iter().collect()),
            false,
        ),
        Err(e) => {
            warn!(root = %root.display(), detector = name, error = %e, "scan failed");
            let malformed = e.downcast_ref::<ListError>().is_some();
            (
                LayerScan::failed(root.to_path_buf(), name, format!("{:#}", e)),
                malformed,
            )
        }
    }
}

fn progress_bar(len: usize, is_interactive: bool) -> Option<ProgressBar> {
    if !is_interactive {
        return None;
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Scan all roots concurrently
async fn scan_concurrent(
    jobs: &[(&dyn Detector, &Path)],
    is_interactive: bool,
) -> (Vec<LayerScan>, bool) {
    let progress = progress_bar(jobs.len(), is_interactive).map(Arc::new);
    if let Some(ref pb) = progress {
        pb.set_message("Scanning roots...");
    }

    let futures: Vec<_> = jobs
        .iter()
        .map(|(detector, root)| {
            let pb = progress.clone();
            async move {
                let scanned = scan_root(*detector, root).await;
                if let Some(ref pb) = pb {
                    pb.inc(1);
                }
                scanned
            }
        })
        .collect();

    let results = join_all(futures).await;

    if let Some(pb) = progress {
        let total: usize = results.iter().map(|(l, _)| l.features.len()).sum();
        pb.finish_with_message(format!("Found {} packages", total));
    }

    collect_layers(results)
}

/// Scan roots one at a time
async fn scan_sequential(
    jobs: &[(&dyn Detector, &Path)],
    is_interactive: bool,
) -> (Vec<LayerScan>, bool) {
    let progress = progress_bar(jobs.len(), is_interactive);
    let mut results = Vec::with_capacity(jobs.len());

    for (detector, root) in jobs {
        if let Some(ref pb) = progress {
            pb.set_message(format!("Scanning {}...", root.display()));
        }

        results.push(scan_root(*detector, root).await);

        if let Some(ref pb) = progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        let total: usize = results.iter().map(|(l, _)| l.features.len()).sum();
        pb.finish_with_message(format!("Found {} packages", total));
    }

    collect_layers(results)
}

fn collect_layers(results: Vec<(LayerScan, bool)>) -> (Vec<LayerScan>, bool) {
    let malformed = results.iter().any(|(_, m)| *m);
    let layers = results.into_iter().map(|(l, _)| l).collect();
    (layers, malformed)
}

fn run_list(config: &Config, input: &str, format: &str) -> Result<u8> {
    let format = OutputFormat::from_str(format).map_err(|e| anyhow::anyhow!(e))?;

    let text = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read query output from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input))?
    };

    let entries = parse_query_output(&text);
    debug!(entries = entries.len(), "decoded query output");
    let features = RpmLister.list(&entries)?;

    let mut result = ScanResult::new(vec![LayerScan::new(
        PathBuf::from(input),
        Format::Rpm.as_str(),
        features.into_iter().collect(),
    )]);
    result.retain_features(|f| !config.ignore.should_ignore_package(&f.name));

    print_result(&result, format)?;
    Ok(exit_codes::SUCCESS)
}

fn parse_sources(filenames: &[String]) -> u8 {
    let mut code = exit_codes::SUCCESS;

    for filename in filenames {
        match resolve_source_package(filename) {
            Ok(source) => println!("{}\t{}\t{}", filename, source.name, source.version),
            Err(e) => {
                eprintln!("{}: {}", filename, e);
                code = exit_codes::ERROR;
            }
        }
    }

    code
}

fn list_detectors(config: &Config) {
    println!("Available detectors:");
    println!();

    for detector in all_detectors(config) {
        println!("  {:<8} {}", detector.format().as_str(), detector.name());
        for path in detector.database_paths() {
            println!("  {:<8} Database: {}", "", path);
        }
        println!();
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'rpmscan config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
