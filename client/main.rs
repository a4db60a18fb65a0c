// osc-repl: interactive OSC console
use std::io;
use std::net::{IpAddr, ToSocketAddrs};
use std::process;
use std::sync::Arc;

use clap::Parser;
use osc_client::{init_logging, Console, ConsoleOutput, PROMPT};
use osc_session::{Session, SessionConfig, UdpConfig, UdpTransport};

#[derive(Parser)]
#[command(name = "osc-repl")]
#[command(about = "Interactive console for OSC devices over UDP", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Local address to bind
    #[arg(short = 'i', long, value_name = "IP")]
    local_ip: Option<IpAddr>,

    /// Local port to bind (0 picks a free one)
    #[arg(short = 'p', long, value_name = "PORT")]
    local_port: Option<u16>,

    /// Allow sending to broadcast addresses
    #[arg(short, long)]
    broadcast: bool,

    /// Default remote host, used until @connect selects a peer. An empty
    /// value with --broadcast sends to 255.255.255.255.
    #[arg(value_name = "REMOTE_HOST")]
    remote_host: Option<String>,

    #[arg(value_name = "REMOTE_PORT")]
    remote_port: Option<u16>,
}

impl Cli {
    fn udp_config(&self) -> io::Result<UdpConfig> {
        let defaults = UdpConfig::default();
        let remote_ip = match self.remote_host.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(host) => Some(resolve_host(host)?),
        };
        Ok(UdpConfig {
            local_ip: self.local_ip.unwrap_or(defaults.local_ip),
            local_port: self.local_port.unwrap_or(defaults.local_port),
            remote_ip,
            remote_port: self.remote_port,
            broadcast: self.broadcast,
            ..defaults
        })
    }
}

fn resolve_host(host: &str) -> io::Result<IpAddr> {
    (host, 0)
        .to_socket_addrs()?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("cannot resolve {host}")))
}

fn main() {
    init_logging("warn");
    let cli = Cli::parse();

    let config = match cli.udp_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Bad remote address: {}", e);
            process::exit(1);
        }
    };
    let transport = Arc::new(UdpTransport::new(config));
    let output = Arc::new(ConsoleOutput::stdout(Some(PROMPT)));
    let session = Session::new(transport.clone(), SessionConfig::from_env(), output.clone());

    if let Err(e) = session.open() {
        eprintln!("Failed to open socket: {}", e);
        process::exit(1);
    }
    if let Some(local) = transport.local_addr() {
        session.println(&format!("Listening on {}. Type @help for commands.", local));
    }
    if let Some(remote) = transport.config().default_destination() {
        session.println(&format!("Sending to {} until @connect.", remote));
    }

    let console = Console::new(session, output);
    if let Err(e) = console.run(io::stdin().lock()) {
        eprintln!("Console error: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};

    #[test]
    fn remote_may_be_a_hostname() {
        let cli = Cli::parse_from(["osc-repl", "localhost", "10023"]);
        let config = cli.udp_config().unwrap();
        assert!(config.remote_ip.is_some_and(|ip| ip.is_loopback()));
        assert_eq!(config.remote_port, Some(10023));
    }

    #[test]
    fn empty_host_with_broadcast_targets_everyone() {
        let cli = Cli::parse_from(["osc-repl", "-b", "", "10023"]);
        let config = cli.udp_config().unwrap();
        assert_eq!(config.remote_ip, None);
        assert_eq!(
            config.default_destination(),
            Some(SocketAddr::from((Ipv4Addr::BROADCAST, 10023)))
        );
    }

    #[test]
    fn literal_ip_passes_through() {
        let cli = Cli::parse_from(["osc-repl", "-i", "127.0.0.1", "192.168.1.20", "10023"]);
        let config = cli.udp_config().unwrap();
        assert_eq!(config.remote_ip, Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))));
        assert_eq!(config.local_ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
