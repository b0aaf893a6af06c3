use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pcapflow::{list_interfaces, shared, ConsoleListener, PacketReader, ReaderConfig};

#[derive(Parser)]
#[command(name = "pcapflow")]
#[command(about = "Parse captured frames and route them through TCP/UDP reassembly")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a recorded capture file to the end
    Read {
        /// Path to a pcap file
        file: PathBuf,
        #[command(flatten)]
        dispatch: DispatchArgs,
    },
    /// Capture from a live interface until interrupted
    Live {
        /// Interface name (e.g., eth0)
        device: String,
        /// Put the interface in promiscuous mode
        #[arg(short, long)]
        promiscuous: bool,
        #[command(flatten)]
        dispatch: DispatchArgs,
    },
    /// List capture interfaces
    Interfaces,
}

#[derive(Args)]
struct DispatchArgs {
    /// BPF filter expression
    #[arg(short, long, default_value = "")]
    filter: String,
    /// Deliver TCP segments without reassembly
    #[arg(long)]
    no_tcp: bool,
    /// Deliver UDP datagrams without reassembly
    #[arg(long)]
    no_udp: bool,
    /// Report frames with unknown layers as errors
    #[arg(long)]
    unknown_as_error: bool,
    /// Show link-layer addresses
    #[arg(short, long)]
    verbose: bool,
}

impl DispatchArgs {
    fn reader(&self) -> Result<PacketReader> {
        let mut config = ReaderConfig::load().context("Failed to load configuration")?;
        if self.no_tcp {
            config.tcp_reassembly = false;
        }
        if self.no_udp {
            config.udp_reassembly = false;
        }
        if self.unknown_as_error {
            config.unknown_layer_as_error = true;
        }

        let listener = shared(ConsoleListener::new().with_verbose(self.verbose));
        Ok(PacketReader::new(listener, config))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Read { file, dispatch } => read(&file, &dispatch),
        Commands::Live {
            device,
            promiscuous,
            dispatch,
        } => live(&device, promiscuous, &dispatch),
        Commands::Interfaces => interfaces(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn read(file: &Path, dispatch: &DispatchArgs) -> Result<()> {
    let mut reader = dispatch.reader()?;

    reader
        .read_file(file, &dispatch.filter)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    reader.flush();

    info!("{}", reader.stats());
    Ok(())
}

fn live(device: &str, promiscuous: bool, dispatch: &DispatchArgs) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl-C handler")?;

    let mut reader = dispatch.reader()?;
    reader
        .open_live(device, promiscuous, &dispatch.filter)
        .with_context(|| format!("Failed to open {}", device))?;
    info!("Capturing on {}, press Ctrl-C to stop", device);

    while running.load(Ordering::SeqCst) {
        reader.read_packets().context("Capture failed")?;
    }

    info!("Stopping capture");
    reader.flush();
    reader.close()?;

    info!("{}", reader.stats());
    Ok(())
}

fn interfaces() -> Result<()> {
    for line in list_interfaces()? {
        println!("{}", line);
    }
    Ok(())
}
