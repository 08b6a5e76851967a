use std::net::SocketAddr;

use chrono::Utc;
use clap::Parser;
use log::{error, info};
use tokio::net::TcpListener;

use chat_relay::server::{Broker, ws};

#[derive(Parser, Debug)]
#[command(name = "chat-relay", about = "Presence registry and call-signaling relay")]
struct Args {
    /// Address to listen on for WebSocket connections.
    #[arg(long, default_value = "0.0.0.0:3001")]
    bind: SocketAddr,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Utc::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to build tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    rt.block_on(async {
        let listener = match TcpListener::bind(args.bind).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("failed to bind {}: {e}", args.bind);
                std::process::exit(1);
            }
        };
        info!("relay listening on {}", args.bind);

        let broker = Broker::new();
        tokio::select! {
            res = ws::serve(broker, listener) => {
                if let Err(e) = res {
                    error!("accept loop failed: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
            }
        }
    });
}
