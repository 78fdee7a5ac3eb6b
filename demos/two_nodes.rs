use std::sync::Arc;
use std::time::Duration;

use dot11_link::{Air, AirConfig, LinkConfig, LinkLayer, MacAddr};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> dot11_link::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // One shared channel, two stations; the second runs 3 seconds ahead
    let air = Air::new(AirConfig::default());
    let config = LinkConfig {
        beacon_interval: Duration::from_secs(2),
        ..Default::default()
    };
    let alice = LinkLayer::new(MacAddr(101), Arc::new(air.attach()), config.clone())?;
    let bob = LinkLayer::new(MacAddr(202), Arc::new(air.attach_with_skew(3_000)), config)?;

    println!("Starting two stations on a simulated channel:");
    println!("- alice: {}", alice.mac());
    println!("- bob:   {} (clock +3000ms)", bob.mac());

    let messages = ["hello bob", "are you there?", "over and out"];
    for message in messages {
        let accepted = alice.send(bob.mac(), message.as_bytes(), message.len())?;
        println!("\nalice queued {} bytes", accepted);

        let mut buf = [0u8; 64];
        let incoming = bob.recv(&mut buf).await?;
        println!(
            "bob got {:?} from {}",
            String::from_utf8_lossy(&buf[..incoming.len]),
            incoming.source
        );
        sleep(Duration::from_secs(1)).await;
        println!("alice status: {:?}", alice.status());
    }

    // Let a few beacons go by
    sleep(Duration::from_secs(5)).await;
    println!("\nClock offsets after beacons:");
    println!("- alice: {}ms", alice.clock_offset());
    println!("- bob:   {}ms", bob.clock_offset());

    let log = air.transmissions();
    let lost = log.iter().filter(|t| t.lost).count();
    println!("\n{} transmissions on the air, {} lost", log.len(), lost);

    alice.shutdown().await;
    bob.shutdown().await;
    Ok(())
}
