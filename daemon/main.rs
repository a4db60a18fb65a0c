// osc-echo: stand-in OSC device for trying out osc-repl
//
// Remembers the last arguments written to each address and answers
// argument-less probes with them, which is how consoles read values back.
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::process;

use clap::Parser;
use osc_core::{OscArg, OscMessage, OscPacket};
use osc_transport::{Transport, UdpConfig, UdpTransport};
use tracing::{debug, info, warn};

const MAX_DATAGRAM: usize = 65_536;

#[derive(Parser)]
#[command(name = "osc-echo")]
#[command(about = "OSC peer that stores values and answers probes", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Address to bind
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 10023)]
    port: u16,

    /// Preset values as ADDRESS=FLOAT, e.g. /ch/01/mix/fader=0.75
    #[arg(short, long = "set", value_name = "ADDRESS=FLOAT")]
    set: Vec<String>,
}

#[derive(Default)]
struct EchoState {
    values: HashMap<String, Vec<OscArg>>,
}

impl EchoState {
    /// Store writes; answer probes for known addresses.
    fn handle(&mut self, message: OscMessage) -> Option<OscMessage> {
        if message.is_probe() {
            let args = self.values.get(&message.address)?;
            return Some(OscMessage::new(&message.address, args.clone()));
        }
        self.values.insert(message.address, message.args);
        None
    }

    fn preset(&mut self, spec: &str) -> Result<(), String> {
        let (address, value) = spec
            .split_once('=')
            .ok_or_else(|| format!("expected ADDRESS=FLOAT, got {:?}", spec))?;
        let value: f32 = value
            .parse()
            .map_err(|_| format!("not a number: {:?}", value))?;
        self.values.insert(address.to_string(), vec![OscArg::Float(value)]);
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let mut state = EchoState::default();
    for spec in &cli.set {
        if let Err(e) = state.preset(spec) {
            eprintln!("{}", e);
            process::exit(1);
        }
    }

    let transport = UdpTransport::new(UdpConfig {
        local_ip: cli.bind,
        local_port: cli.port,
        ..UdpConfig::default()
    });
    if let Err(e) = transport.open() {
        eprintln!("Failed to bind {}:{}: {}", cli.bind, cli.port, e);
        process::exit(1);
    }
    info!(local = ?transport.local_addr(), presets = state.values.len(), "osc-echo serving");

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (n, origin) = match transport.receive(&mut buf) {
            Ok(Some(received)) => received,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "receive failed");
                continue;
            }
        };
        serve(&mut state, &transport, &buf[..n], origin);
    }
}

fn serve(state: &mut EchoState, transport: &dyn Transport, data: &[u8], origin: SocketAddr) {
    let packet = match OscPacket::from_bytes(data) {
        Ok(packet) => packet,
        Err(e) => {
            warn!(%origin, error = %e, "dropping undecodable datagram");
            return;
        }
    };

    for message in packet.into_messages() {
        debug!(%origin, address = %message.address, tags = %message.type_tags(), "received");
        if let Some(reply) = state.handle(message) {
            if let Err(e) = transport.send(&reply.to_bytes(), Some(origin)) {
                warn!(%origin, error = %e, "reply failed");
            }
        }
    }
}
