// Serial SUMP device example
//
// Turns a serial port into a SUMP logic analyzer that PulseView or the OLS client
// can connect to. Pins are simulated: bit 0 toggles every sample, bit 1 every second
// sample and so on. Pair it with a virtual null-modem (e.g. `socat`) to try it
// without hardware.

use clap::Parser;
use std::time::Duration;
use sump_analyzer::{AnalyzerConfig, AnalyzerError, LogicAnalyzer, SerialTransport, SpinDelay};

#[derive(Parser)]
#[command(name = "serial_device")]
#[command(version = "1.0")]
#[command(about = "Serve a simulated SUMP logic analyzer over a serial port")]
struct Args {
    /// Serial port to listen on
    port: String,

    #[arg(short, long, default_value_t = 115_200, help = "Baud rate")]
    baud: u32,

    #[arg(short, long, default_value_t = 1000, help = "Sample memory size")]
    samples: usize,

    #[arg(long, default_value_t = 1_000_000, help = "Advertised sample rate in Hz")]
    max_frequency: u64,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let mut counter = 0u8;
    let pins = move || {
        counter = counter.wrapping_add(1);
        counter
    };

    let config = AnalyzerConfig::new(args.samples)
        .with_max_frequency(args.max_frequency)
        .with_max_paced_frequency(args.max_frequency)
        .with_description("RUST-SUMP-SIM");

    let transport = SerialTransport::open(&args.port, args.baud)?;
    let mut analyzer = LogicAnalyzer::new(config, transport, pins, SpinDelay)?;
    analyzer.set_event_handler(|event| log::debug!("event: {:?}", event));

    println!("SUMP device listening on {} ({} baud)", args.port, args.baud);
    println!("Press Ctrl+C to stop\n");

    loop {
        match analyzer.process_command() {
            Ok(true) => {}
            Ok(false) => std::thread::sleep(Duration::from_millis(1)),
            Err(AnalyzerError::Transport(e)) => {
                log::error!("Transport error: {}", e);
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => return Err(e.into()),
        }
    }
}
