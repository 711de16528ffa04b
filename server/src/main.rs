use clap::Parser;
use log::info;
use server::assets::DirectoryInventory;
use server::config::ServerConfig;
use server::network::Server;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Directory containing the regular N.png images
    #[arg(long, default_value = "public/images")]
    images_dir: PathBuf,

    /// Directory containing the peaceful N.jpg images used in chaos mode
    #[arg(long, default_value = "public/peaceful")]
    peaceful_dir: PathBuf,

    /// Maximum number of concurrent sessions
    #[arg(short, long, default_value = "64")]
    max_sessions: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            images_dir: args.images_dir,
            peaceful_dir: args.peaceful_dir,
            max_sessions: args.max_sessions,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());
    info!("Images directory: {}", config.images_dir.display());
    info!("Peaceful images directory: {}", config.peaceful_dir.display());

    let inventory = DirectoryInventory::new(&config.images_dir, &config.peaceful_dir);
    let server = Server::new(&config, Box::new(inventory)).await?;

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
