use clap::Parser;
use futures::{SinkExt, StreamExt};
use log::{info, warn};
use shared::{ClientPacket, ServerPacket};
use std::time::Duration;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Headless client that walks through one drawing session
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the canvas server
    #[arg(short, long, default_value = "ws://127.0.0.1:3000")]
    server: String,

    /// Display name to announce
    #[arg(short, long, default_value = "test-client")]
    name: String,

    /// Also trigger a chaos cycle
    #[arg(long)]
    chaos: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    info!("Connecting to {}", args.server);
    let (ws, _) = connect_async(args.server.as_str()).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let reader = tokio::spawn(async move {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(Message::Text(text)) => match ServerPacket::decode(text.as_str()) {
                    Ok(packet) => println!("<- {:?}", packet),
                    Err(e) => warn!("Undecodable packet from server: {}", e),
                },
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    let mut script = vec![
        ClientPacket::AnnounceIdentity {
            name: args.name.clone(),
            color: "#ee82ee".to_string(),
        },
        ClientPacket::MoveCursor { x: 100.0, y: 100.0 },
    ];

    // One drag gesture: a start followed by continuations along a line
    for step in 0..5 {
        let offset = step as f32 * 20.0;
        script.push(ClientPacket::PlaceResource {
            x: 100.0 + offset,
            y: 100.0 + offset,
            is_continuation: step > 0,
            use_existing_resource: None,
            is_chaos_variant: false,
            scale: 1.1,
        });
    }
    script.push(ClientPacket::EndGesture);

    if args.chaos {
        script.push(ClientPacket::ChaosTrigger);
        script.push(ClientPacket::ChaosEnd);
    }

    for packet in script {
        println!("-> {:?}", packet);
        ws_tx.send(Message::text(packet.encode()?)).await?;
        sleep(Duration::from_millis(200)).await;
    }

    sleep(Duration::from_secs(1)).await;
    ws_tx.close().await?;
    let _ = reader.await;

    println!("Test client finished");
    Ok(())
}
