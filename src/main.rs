// SPDX-License-Identifier: GPL-3.0-only

use barcode_scanner::constants::ResolutionTier;
use barcode_scanner::constants::app_info;
use barcode_scanner::SymbologyFilter;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "barcode-scanner")]
#[command(about = "Scan barcodes from a camera or image files")]
#[command(version = app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Scan a barcode with a camera
    Scan {
        /// Device node to use (from 'barcode-scanner list')
        #[arg(short, long)]
        device: Option<String>,

        /// Symbologies to look for
        #[arg(short, long, value_enum)]
        filter: Option<FilterArg>,

        /// Minimum capture resolution
        #[arg(short, long, value_enum)]
        resolution: Option<ResolutionArg>,

        /// Decode cycles per second (5-15)
        #[arg(long)]
        frequency: Option<u32>,

        /// Give up after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Switch the torch on while scanning
        #[arg(long)]
        torch: bool,

        /// Mirror the overlay (front camera)
        #[arg(long)]
        mirror: bool,

        /// Save the final overlay as an image
        #[arg(long)]
        overlay_out: Option<PathBuf>,
    },

    /// Scan a barcode from image files (directories are expanded)
    ScanFiles {
        /// Images to replay as a camera
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Symbologies to look for
        #[arg(short, long, value_enum)]
        filter: Option<FilterArg>,

        /// Decode cycles per second (5-15)
        #[arg(long)]
        frequency: Option<u32>,

        /// Give up after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Play the images once instead of looping
        #[arg(long)]
        once: bool,
    },

    /// Inspect persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings as JSON
    Show,
    /// Print the settings file location
    Path,
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    All,
    EanUpc,
    Code128,
    Qr,
}

impl From<FilterArg> for SymbologyFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => SymbologyFilter::All,
            FilterArg::EanUpc => SymbologyFilter::EanUpc,
            FilterArg::Code128 => SymbologyFilter::Code128,
            FilterArg::Qr => SymbologyFilter::QrCode,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ResolutionArg {
    Sd,
    Hd,
    FullHd,
}

impl From<ResolutionArg> for ResolutionTier {
    fn from(arg: ResolutionArg) -> Self {
        match arg {
            ResolutionArg::Sd => ResolutionTier::SD,
            ResolutionArg::Hd => ResolutionTier::HD,
            ResolutionArg::FullHd => ResolutionTier::FullHD,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=barcode_scanner=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => cli::list_cameras(),
        Commands::Scan {
            device,
            filter,
            resolution,
            frequency,
            timeout,
            torch,
            mirror,
            overlay_out,
        } => cli::scan_camera(cli::CameraScanArgs {
            overrides: cli::ScanOverrides {
                filter: filter.map(Into::into),
                resolution: resolution.map(Into::into),
                frequency,
                timeout,
            },
            device,
            torch,
            mirror,
            overlay_out,
        }),
        Commands::ScanFiles {
            paths,
            filter,
            frequency,
            timeout,
            once,
        } => cli::scan_files(
            &paths,
            cli::ScanOverrides {
                filter: filter.map(Into::into),
                resolution: None,
                frequency,
                timeout,
            },
            once,
        ),
        Commands::Config { action } => match action {
            ConfigAction::Show => cli::show_config(),
            ConfigAction::Path => cli::show_config_path(),
        },
    }
}
