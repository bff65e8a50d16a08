use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use flexi_logger::{Duplicate, Logger};
use log::{info, warn};

use irc_bridge::bridge::Bridge;
use irc_bridge::config::Config;
use irc_bridge::gateway::memory::MemoryGateway;
use irc_bridge::gateway::{Gateway, GuildPermissions, Member, Presence, Role};
use irc_bridge::handlers;
use irc_bridge::server::{IrcServer, ServerHandle};

#[derive(Parser, Debug)]
#[command(name = "irc_bridge", about = "IRC facade over a chat platform guild")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "./bridge.toml")]
    config: PathBuf,

    /// Override the configured listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Log specification passed to the logger
    #[arg(long, default_value = "debug")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    Logger::try_with_str(&args.log)
        .and_then(|op| op.log_to_stderr().duplicate_to_stderr(Duplicate::All).start())
        .ok();

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            warn!("could not load {}: {e}, using defaults", args.config.display());
            Config::default()
        }
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    let gateway = Arc::new(demo_gateway());
    let mut events = gateway.subscribe();

    let handle = Arc::new(ServerHandle::new(
        &config.hostname,
        Duration::from_millis(config.timeout_ms),
    ));
    let bridge = Arc::new(Bridge::new(gateway.clone(), handle, config));
    let registry = Arc::new(handlers::register(&bridge));

    let pump = bridge.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            pump.handle_event(event).await;
        }
    });

    info!("bridging guild as {}", gateway.current_username());
    IrcServer::run(bridge, registry).await?;
    Ok(())
}

/// A small self-contained guild so the binary is usable without any
/// platform credentials.
fn demo_gateway() -> MemoryGateway {
    let gateway = MemoryGateway::new(1, 100, "bridge");
    gateway.set_owner(100);
    gateway.add_text_channel(10, "general", Some("Welcome aboard"));
    gateway.add_text_channel(11, "dev", None);
    gateway.add_voice_channel(20, "Lounge");
    gateway.define_role(Role {
        id: 50,
        name: "moderators".to_owned(),
        permissions: GuildPermissions {
            manage_messages: true,
            kick_members: true,
            ..GuildPermissions::default()
        },
        send_messages: true,
    });
    gateway.add_member(Member {
        id: 101,
        username: "alice".to_owned(),
        discriminator: "0001".to_owned(),
        nickname: None,
        is_bot: false,
        role_ids: vec![50],
        presence: Presence::Online,
        created_at: 1_600_000_000,
    });
    gateway.add_member(Member {
        id: 102,
        username: "mr. bot".to_owned(),
        discriminator: "0002".to_owned(),
        nickname: Some("helper".to_owned()),
        is_bot: true,
        role_ids: Vec::new(),
        presence: Presence::Idle,
        created_at: 1_500_000_000,
    });
    gateway
}
