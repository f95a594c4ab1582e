use clap::Parser;
use log::info;
use server::network::Server;
use shared::MapDefinition;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "5555")]
    port: u16,

    /// JSON map file; the builtin demo map is used when omitted
    #[arg(short, long)]
    map: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let map = match &args.map {
        Some(path) => MapDefinition::load(path)?,
        None => MapDefinition::builtin(),
    };
    info!(
        "Serving {}x{} map, spawnpoint ({:.0}, {:.0})",
        map.map_x, map.map_y, map.spawnpoint.0, map.spawnpoint.1
    );

    let addr = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&addr, map).await?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down");
            shutdown.shutdown();
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}
