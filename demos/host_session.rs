// Host side of a SUMP session
//
// Talks to any SUMP device (including the `serial_device` example) the way
// PulseView does: identify, configure, arm, then read the dump back.

use clap::Parser;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use sump_analyzer::capture_engine::divider_to_frequency;
use sump_analyzer::Command;

#[derive(Parser)]
#[command(name = "host_session")]
#[command(version = "1.0")]
#[command(about = "Run one capture against a SUMP device")]
struct Args {
    /// Serial port of the device
    port: String,

    #[arg(short, long, default_value_t = 115_200, help = "Baud rate")]
    baud: u32,

    #[arg(short, long, default_value_t = 64, help = "Number of samples to read")]
    samples: u16,

    #[arg(short, long, default_value_t = 99, help = "Clock divider (100 MHz / (divider + 1))")]
    divider: u32,

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

    let mut port = serialport::new(&args.port, args.baud)
        .timeout(Duration::from_secs(2))
        .open()?;

    // Several resets flush out a half-received long command
    for _ in 0..5 {
        send(&mut *port, Command::Reset)?;
    }
    std::thread::sleep(Duration::from_millis(100));
    port.clear(serialport::ClearBuffer::Input)?;

    send(&mut *port, Command::Id)?;
    let mut id = [0u8; 4];
    port.read_exact(&mut id)?;
    println!("Device ID: {}", String::from_utf8_lossy(&id));

    send(&mut *port, Command::SetDivider(args.divider))?;
    send(
        &mut *port,
        Command::SetReadDelayCount {
            read_count: args.samples,
            delay_count: args.samples,
        },
    )?;
    send(&mut *port, Command::Arm)?;
    println!(
        "Capturing {} samples at {} Hz...",
        args.samples,
        divider_to_frequency(args.divider)
    );

    let mut dump = vec![0u8; usize::from(args.samples) * 4];
    port.read_exact(&mut dump)?;

    for (i, word) in dump.chunks_exact(4).enumerate() {
        let word = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
        println!("{:5}: 0x{:08x}", i, word);
    }

    Ok(())
}

fn send(port: &mut dyn SerialPort, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    log::debug!("<-{}", command.opcode().as_str());
    port.write_all(&command.to_bytes())?;
    port.flush()?;
    Ok(())
}
