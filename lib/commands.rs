// Console commands: `@name args...` lines are routed here
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use osc_core::{OscArg, OscMessage};
use tracing::warn;

use crate::config::is_switch_on;
use crate::effects::{FadeSpec, Waveform};
use crate::error::{Result, SessionError};
use crate::link::Peer;
use crate::query::QueryOptions;
use crate::session::Session;

/// A command handler gets the live session and the raw tokens after the
/// command name.
pub type CommandFn = Arc<dyn Fn(&Session, &[String]) -> Result<()> + Send + Sync>;

const USAGE: &[(&str, &str)] = &[
    ("connect", "@connect <ip> <port>"),
    ("disconnect", "@disconnect"),
    ("every", "@every <intervalSec> <address> [<types> <values...>]"),
    ("stop", "@stop [<address>]"),
    ("fade", "@fade <durationSec> <address> <from|in|out|to> [<to>]"),
    ("sin", "@sin <periodSec> <address> <min> <max>"),
    ("tri", "@tri <periodSec> <address> <min> <max>"),
    ("get", "@get <address> [<tag>] [<timeoutSec>]"),
    ("buffers", "@buffers <on|off>"),
    ("timestamps", "@timestamps <on|off>"),
    ("help", "@help"),
    ("quit", "@quit"),
];

fn usage_of(name: &str) -> Option<&'static str> {
    USAGE.iter().find(|(n, _)| *n == name).map(|(_, u)| *u)
}

fn usage(name: &str) -> SessionError {
    SessionError::usage(usage_of(name).unwrap_or(name))
}

/// Command name (without `@`) -> handler.
pub struct CommandDispatcher {
    commands: HashMap<String, CommandFn>,
}

impl CommandDispatcher {
    pub fn empty() -> Self {
        CommandDispatcher {
            commands: HashMap::new(),
        }
    }

    /// Dispatcher with the built-in console commands.
    pub fn new() -> Self {
        let mut dispatcher = Self::empty();
        dispatcher.register("connect", connect);
        dispatcher.register("disconnect", disconnect);
        dispatcher.register("every", every);
        dispatcher.register("stop", stop);
        dispatcher.register("fade", fade);
        dispatcher.register("sin", |session: &Session, args: &[String]| {
            periodic(session, args, "sin")
        });
        dispatcher.register("tri", |session: &Session, args: &[String]| {
            periodic(session, args, "tri")
        });
        dispatcher.register("get", get);
        dispatcher.register("buffers", buffers);
        dispatcher.register("timestamps", timestamps);
        dispatcher.register("help", help);
        dispatcher.register("quit", |session: &Session, _: &[String]| session.terminate());
        dispatcher
    }

    /// Replaces any command already registered under `name`.
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&Session, &[String]) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.strip_prefix('@').unwrap_or(name);
        self.commands.insert(name.to_string(), Arc::new(handler));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Result<CommandFn> {
        self.commands
            .get(name)
            .cloned()
            .ok_or_else(|| SessionError::UnknownCommand(name.to_string()))
    }

    /// Runs the handler to completion, including any network round trips.
    pub fn dispatch(&self, name: &str, session: &Session, args: &[String]) -> Result<()> {
        let handler = self.lookup(name)?;
        handler(session, args)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn seconds(value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| *s > 0.0)
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .ok_or_else(|| SessionError::InvalidValue {
            tag: 'f',
            value: value.to_string(),
        })
}

fn level(value: &str) -> Result<f32> {
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| SessionError::InvalidValue {
            tag: 'f',
            value: value.to_string(),
        })
}

fn connect(session: &Session, args: &[String]) -> Result<()> {
    let [ip, port, ..] = args else {
        return Err(usage("connect"));
    };
    let peer = Peer::resolve(ip, port)?;
    session.println(&format!("Connecting to {}.", peer));
    session.connect(peer);
    Ok(())
}

fn disconnect(session: &Session, _: &[String]) -> Result<()> {
    match session.disconnect() {
        Some(peer) => session.println(&format!("Disconnecting from {}.", peer)),
        None => session.println("Not connected to any peer at the moment"),
    }
    Ok(())
}

fn every(session: &Session, args: &[String]) -> Result<()> {
    let [interval, address, rest @ ..] = args else {
        return Err(usage("every"));
    };
    let interval = seconds(interval)?;
    let (types, values) = match rest {
        [types, values @ ..] => (types.as_str(), values),
        [] => ("", rest),
    };
    let message = OscMessage::new(address, session.parse_args(types, values.iter().cloned())?);

    // The first send happens here so its errors reach the console
    session.send(&message)?;

    let link = session.link();
    let mut first_tick = true;
    session.schedule(address, interval, move |_| {
        if std::mem::take(&mut first_tick) {
            return true;
        }
        match link.send(&message) {
            Ok(()) => true,
            Err(e) => {
                warn!(address = %message.address, error = %e, "repeat stopped");
                false
            }
        }
    })?;
    session.println("Timer set.");
    Ok(())
}

fn stop(session: &Session, args: &[String]) -> Result<()> {
    let Some(key) = args.first().cloned().or_else(|| session.last_key()) else {
        session.println("No timer to clear.");
        return Ok(());
    };
    if session.stop(&key) {
        session.println("Timer cleared.");
    } else {
        session.println(&format!("No timer for {}.", key));
    }
    Ok(())
}

fn fade(session: &Session, args: &[String]) -> Result<()> {
    let [duration, address, mode, rest @ ..] = args else {
        return Err(usage("fade"));
    };
    let duration = seconds(duration)?;
    let spec = FadeSpec::parse(mode, rest.first().map(String::as_str))?;

    let (from, to) = spec.resolve(session.config().fade_level, || {
        let current = session.query(address, 'f')?;
        current.as_f32().ok_or_else(|| SessionError::InvalidValue {
            tag: current.tag(),
            value: session.format(&current),
        })
    })?;

    session.start_effect(address, Waveform::Fade { from, to, duration })?;
    session.println(&format!("Fading {} from {} to {}.", address, from, to));
    Ok(())
}

fn periodic(session: &Session, args: &[String], name: &str) -> Result<()> {
    let [period, address, min, max, ..] = args else {
        return Err(usage(name));
    };
    let period = seconds(period)?;
    let (min, max) = (level(min)?, level(max)?);
    let waveform = if name == "tri" {
        Waveform::Triangle { min, max, period }
    } else {
        Waveform::Sine { min, max, period }
    };

    session.start_effect(address, waveform)?;
    session.println("Timer set.");
    Ok(())
}

fn get(session: &Session, args: &[String]) -> Result<()> {
    let Some(address) = args.first() else {
        return Err(usage("get"));
    };
    let tag = match args.get(1).map(|t| t.chars().collect::<Vec<_>>()) {
        None => 'f',
        Some(chars) if chars.len() == 1 => chars[0],
        Some(_) => return Err(usage("get")),
    };
    let mut options = session.query_options();
    if let Some(timeout) = args.get(2) {
        options = QueryOptions {
            timeout: seconds(timeout)?,
            ..options
        };
    }

    let value: OscArg = session.query_with(address, tag, options)?;
    session.println(&format!("{} = {}", address, session.format(&value)));
    Ok(())
}

fn buffers(session: &Session, args: &[String]) -> Result<()> {
    let on = args.first().is_some_and(|v| is_switch_on(v));
    session.set_print_buffers(on);
    session.println(&format!("Verbose buffers are {}.", if on { "on" } else { "off" }));
    Ok(())
}

fn timestamps(session: &Session, args: &[String]) -> Result<()> {
    let on = args.first().is_some_and(|v| is_switch_on(v));
    session.set_timestamps(on);
    session.println(&format!("Timestamps are {}.", if on { "on" } else { "off" }));
    Ok(())
}

fn help(session: &Session, _: &[String]) -> Result<()> {
    session.println("Commands:");
    for name in session.command_names() {
        match usage_of(&name) {
            Some(text) => session.println(&format!("  {}", text)),
            None => session.println(&format!("  @{}", name)),
        }
    }
    session.println("Anything else is sent as a message:");
    session.println("  <address> [<types> <values...>]");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::output::MemoryOutput;
    use osc_transport::MemoryTransport;

    fn session() -> (Session, Arc<MemoryOutput>) {
        let (transport, _remote) = MemoryTransport::pair();
        let output = Arc::new(MemoryOutput::new());
        let session = Session::new(Arc::new(transport), SessionConfig::default(), output.clone());
        (session, output)
    }

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn builtins_are_registered() {
        let dispatcher = CommandDispatcher::new();
        for (name, _) in USAGE {
            assert!(dispatcher.contains(name), "{name}");
        }
        assert_eq!(dispatcher.names().len(), USAGE.len());
    }

    #[test]
    fn unknown_command_names_itself() {
        let (session, _) = session();
        let err = CommandDispatcher::empty()
            .dispatch("nope", &session, &[])
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown command: @nope");
    }

    #[test]
    fn register_strips_sigil_and_replaces() {
        let (session, output) = session();
        let mut dispatcher = CommandDispatcher::empty();
        dispatcher.register("@hello", |s: &Session, _: &[String]| {
            s.println("first");
            Ok(())
        });
        dispatcher.register("hello", |s: &Session, args: &[String]| {
            s.println(&format!("hello {}", args.join(",")));
            Ok(())
        });

        dispatcher.dispatch("hello", &session, &strings(&["a", "b"])).unwrap();
        assert_eq!(output.lines(), vec!["hello a,b"]);
    }

    #[test]
    fn usage_errors() {
        let (session, _) = session();
        let dispatcher = CommandDispatcher::new();
        let err = dispatcher.dispatch("connect", &session, &strings(&["127.0.0.1"])).unwrap_err();
        assert_eq!(err.to_string(), "Usage: @connect <ip> <port>");
        assert!(matches!(
            dispatcher.dispatch("sin", &session, &strings(&["1", "/x", "0"])),
            Err(SessionError::Usage(_))
        ));
        assert!(matches!(
            dispatcher.dispatch("every", &session, &strings(&["-1", "/x"])),
            Err(SessionError::InvalidValue { .. })
        ));
    }

    #[test]
    fn seconds_rejects_nonsense() {
        assert_eq!(seconds("0.5").unwrap(), Duration::from_millis(500));
        assert!(seconds("0").is_err());
        assert!(seconds("soon").is_err());
        assert!(seconds("1e300").is_err());
    }

    #[test]
    fn disconnect_without_peer() {
        let (session, output) = session();
        disconnect(&session, &[]).unwrap();
        assert_eq!(output.take(), vec!["Not connected to any peer at the moment"]);

        connect(&session, &strings(&["127.0.0.1", "9000"])).unwrap();
        disconnect(&session, &[]).unwrap();
        assert_eq!(
            output.take(),
            vec!["Connecting to 127.0.0.1:9000.", "Disconnecting from 127.0.0.1:9000."]
        );
    }

    #[test]
    fn switches() {
        let (session, output) = session();
        buffers(&session, &strings(&["yes"])).unwrap();
        assert!(session.print_buffers());
        buffers(&session, &[]).unwrap();
        assert!(!session.print_buffers());
        timestamps(&session, &strings(&["on"])).unwrap();
        assert!(session.timestamps());
        assert_eq!(
            output.lines(),
            vec!["Verbose buffers are on.", "Verbose buffers are off.", "Timestamps are on."]
        );
    }

    #[test]
    fn stop_without_any_timer() {
        let (session, output) = session();
        stop(&session, &[]).unwrap();
        stop(&session, &strings(&["/x"])).unwrap();
        assert_eq!(output.lines(), vec!["No timer to clear.", "No timer for /x."]);
    }

    #[test]
    fn help_lists_custom_commands() {
        let (session, output) = session();
        session.register_command("ping", |_: &Session, _: &[String]| Ok(()));
        help(&session, &[]).unwrap();
        assert!(output.contains("@connect <ip> <port>"));
        assert!(output.contains("  @ping"));
    }
}
