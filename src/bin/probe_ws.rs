//! Raw push-endpoint probe.
//!
//! Connects without the reconnecting client, subscribes to one channel and
//! prints every frame (decoded through the envelope adapter) for a fixed
//! number of seconds.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use bitredict_live::envelope::{self, Inbound, OutboundFrame};
use bitredict_live::{Channel, DEFAULT_WS_URL};

#[derive(Parser)]
#[command(name = "probe_ws", about = "Print raw frames from the push-update endpoint")]
struct Args {
    /// WebSocket URL
    #[arg(long, env = "BITREDICT_WS_URL", default_value = DEFAULT_WS_URL)]
    url: String,

    /// Channel to subscribe to, e.g. `pool:12` or `user:0xabc`
    #[arg(long, default_value = "liquidity:added")]
    channel: String,

    /// How long to listen, in seconds
    #[arg(long, default_value_t = 30)]
    seconds: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    println!("=== Probe: push-update WebSocket ===");
    println!("URL: {}", args.url);
    println!();

    println!("--- Connecting ---");
    let (ws_stream, response) = connect_async(args.url.as_str()).await?;
    println!("Connected! Response status: {}", response.status());
    println!();

    let (mut write, mut read) = ws_stream.split();

    let subscribe = OutboundFrame::Subscribe {
        channel: Channel::new(args.channel.clone()),
    }
    .to_text();
    println!("--- Sending subscription ---");
    println!("  {subscribe}");
    write.send(Message::Text(subscribe.into())).await?;
    println!();

    println!("--- Listening for {} seconds ---", args.seconds);
    let start = Instant::now();
    let timeout = Duration::from_secs(args.seconds);
    let mut msg_count = 0;
    let mut kinds: BTreeMap<&'static str, usize> = BTreeMap::new();

    loop {
        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining.min(Duration::from_secs(1)), read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                msg_count += 1;
                let kind = match envelope::decode(text.as_str()) {
                    Ok(Inbound::Event(event)) => {
                        println!(
                            "  [{:>5.1}s] event route={:?} payload={:?}",
                            start.elapsed().as_secs_f64(),
                            event.route,
                            event.payload
                        );
                        "event"
                    }
                    Ok(Inbound::Subscribed(channel)) => {
                        println!("  subscribed: {channel}");
                        "subscribed"
                    }
                    Ok(Inbound::Unsubscribed(channel)) => {
                        println!("  unsubscribed: {channel}");
                        "unsubscribed"
                    }
                    Ok(Inbound::ServerError(message)) => {
                        println!("  server error: {message}");
                        "error"
                    }
                    Err(e) => {
                        println!("  undecodable ({e}): {}", text.as_str());
                        "undecodable"
                    }
                };
                *kinds.entry(kind).or_default() += 1;
            }
            Ok(Some(Ok(Message::Close(frame)))) => {
                println!("  Server closed: {frame:?}");
                break;
            }
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(e))) => {
                println!("  Error: {e}");
                break;
            }
            Ok(None) => {
                println!("  Stream ended");
                break;
            }
            Err(_) => {}
        }
    }

    let _ = write.send(Message::Close(None)).await;

    println!();
    println!("=== Summary ===");
    println!("Frames received: {msg_count}");
    for (kind, count) in &kinds {
        println!("  {kind}: {count}");
    }
    Ok(())
}
