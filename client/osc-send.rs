// osc-send: send one OSC message, or query one value, and exit
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use clap::Parser;
use osc_client::{init_logging, ConsoleOutput};
use osc_session::{Session, SessionConfig, UdpConfig, UdpTransport};

#[derive(Parser)]
#[command(name = "osc-send")]
#[command(about = "Send a single OSC message", long_about = None)]
#[command(version = "0.1.0")]
#[command(trailing_var_arg = true)]
struct Cli {
    /// Destination as ip:port
    #[arg(short, long, value_name = "IP:PORT", default_value = "127.0.0.1:10023")]
    to: SocketAddr,

    /// Wait for the value at ADDRESS (probe and await a reply of this type)
    #[arg(short, long, value_name = "TAG")]
    query: Option<char>,

    /// Allow broadcast destinations
    #[arg(short, long)]
    broadcast: bool,

    /// <address> [<types> <values...>]
    #[arg(required = true, allow_hyphen_values = true, value_name = "MESSAGE")]
    message: Vec<String>,
}

fn main() {
    init_logging("warn");
    let cli = Cli::parse();

    let transport = Arc::new(UdpTransport::new(UdpConfig {
        remote_ip: Some(cli.to.ip()),
        remote_port: Some(cli.to.port()),
        broadcast: cli.broadcast,
        ..UdpConfig::default()
    }));
    let session = Session::new(
        transport,
        SessionConfig::from_env(),
        Arc::new(ConsoleOutput::stdout(None)),
    );
    if let Err(e) = session.open() {
        eprintln!("Failed to open socket: {}", e);
        process::exit(1);
    }

    let result = match cli.query {
        Some(tag) => session
            .query(&cli.message[0], tag)
            .map(|value| println!("{}", session.format(&value))),
        None => session.execute(&cli.message),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        process::exit(1);
    }
}
