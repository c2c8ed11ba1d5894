use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use tracing::info;

use wireflow::{
    setup_rolling_tracing, LineCodec, ManagedSessionListener, Result, ServerConfig, SessionManager, TcpSessionWrapper,
};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

struct EchoListener;

impl ManagedSessionListener<LineCodec> for EchoListener {
    fn on_session_registered(&self, wrapper: &Arc<TcpSessionWrapper<LineCodec>>) {
        info!(session = %wrapper, "client connected");
    }

    fn on_message_received(&self, message: String, wrapper: &Arc<TcpSessionWrapper<LineCodec>>) {
        info!(session = %wrapper, message = %message, "echoing");
        if let Err(e) = wrapper.session().send(&message) {
            info!(session = %wrapper, error = %e, "echo failed");
        }
    }

    fn on_after_session_closed(&self, wrapper: &Arc<TcpSessionWrapper<LineCodec>>) {
        info!(session = %wrapper, "client disconnected");
    }

    fn on_session_idle_removed(&self, wrapper: &Arc<TcpSessionWrapper<LineCodec>>) {
        info!(session = %wrapper, "client evicted for idleness");
    }
}

fn main() -> Result<()> {
    dotenv().ok();
    let _guard = setup_rolling_tracing("logs", "echoserv.log");

    let commandline = CommandLine::parse();
    let config = match &commandline.conf {
        Some(path) => ServerConfig::from_file(PathBuf::from(path))?,
        None => ServerConfig {
            name: "echoserv".to_string(),
            ..ServerConfig::default()
        },
    };

    let manager = SessionManager::new(config, LineCodec::new(), EchoListener);
    manager.start()?;
    info!(addr = ?manager.local_addr(), "echo server running, press enter to stop");

    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    manager.stop();
    info!("echo server shut down");
    Ok(())
}
