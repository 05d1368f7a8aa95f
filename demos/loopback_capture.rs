// In-memory capture example
//
// This example plays the host's part of a PulseView session against an analyzer
// whose pins are a simulated 8-bit counter, then decodes the dumped samples.

use sump_analyzer::{
    AnalyzerConfig, BitState, Command, Event, LogicAnalyzer, MemoryTransport, NoDelay,
    TriggerBuilder,
};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("SUMP Loopback Capture Example");
    println!("=============================\n");

    let mut counter = 0u8;
    let pins = move || {
        counter = counter.wrapping_add(1);
        counter
    };

    let config = AnalyzerConfig::new(256)
        .with_description("LOOPBACK")
        .with_reset_debounce(Duration::from_millis(50));
    let mut analyzer = LogicAnalyzer::new(config, MemoryTransport::new(), pins, NoDelay)?;
    analyzer.set_event_handler(|event| log::info!("{} event: {:?}", describe(event), event));

    // 1. Identification, as sent by the host when it connects
    println!("1. Identifying device...");
    send(&mut analyzer, &[Command::Reset, Command::Reset, Command::Id])?;
    let id = analyzer.transport_mut().take_output();
    println!("   ID: {}", String::from_utf8_lossy(&id));

    send(&mut analyzer, &[Command::GetMetadata])?;
    let metadata = analyzer.transport_mut().take_output();
    println!("   Metadata: {} bytes", metadata.len());

    // 2. Trigger on bit 4 going high, keep 4 samples of history
    println!("\n2. Configuring capture...");
    let trigger = TriggerBuilder::<u8>::start_capturing_when()
        .bit4(BitState::High)
        .matching();
    send(&mut analyzer, &trigger.to_commands())?;
    send(
        &mut analyzer,
        &[
            Command::SetDivider(99),
            Command::SetReadDelayCount {
                read_count: 16,
                delay_count: 12,
            },
        ],
    )?;
    println!(
        "   {} Hz, {} samples, {} after trigger",
        analyzer.session().capture_frequency,
        analyzer.session().read_count,
        analyzer.session().delay_count
    );

    // 3. Arm and decode
    println!("\n3. Capturing...");
    send(&mut analyzer, &[Command::Arm])?;
    let dump = analyzer.transport_mut().take_output();
    println!("   Outcome: {:?}", analyzer.last_outcome());

    for (i, word) in dump.chunks_exact(4).enumerate() {
        let sample = word[0];
        let marker = if trigger.matches(sample) { "*" } else { " " };
        println!("   {:3}: {:08b} {}", i, sample, marker);
    }

    println!("\nCapture completed successfully!");
    Ok(())
}

fn send<P>(
    analyzer: &mut LogicAnalyzer<u8, MemoryTransport, P, NoDelay>,
    commands: &[Command],
) -> Result<(), Box<dyn std::error::Error>>
where
    P: sump_analyzer::PinReader<u8>,
{
    for command in commands {
        analyzer.transport_mut().push_input(command.to_bytes());
    }
    analyzer.process_pending()?;
    Ok(())
}

fn describe(event: Event) -> &'static str {
    match event {
        Event::Reset => "reset",
        Event::Status => "status",
        _ => "setting",
    }
}
