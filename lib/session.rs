// Session: the one place console state lives
//
// Owns the link to the peer, the type and command registries, inbound
// subscriptions and running timers. Input lines are handled one at a time on
// the caller's thread; inbound datagrams are handled on the "osc-rx" thread;
// every timer runs on its own thread.
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Local;
use osc_core::{OscArg, OscMessage, OscPacket};
use osc_transport::Transport;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::commands::CommandDispatcher;
use crate::config::SessionConfig;
use crate::effects::{effect_tick, Waveform};
use crate::error::{Result, SessionError};
use crate::link::{Link, Peer};
use crate::output::Output;
use crate::query::{query, QueryOptions};
use crate::registry::{FormatOptions, TypeRegistry};
use crate::scheduler::{CancelHandle, Scheduler};
use crate::subscriptions::{SubscriptionId, SubscriptionRegistry};
use crate::tokenize::tokenize;

const MAX_DATAGRAM: usize = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Running,
    Terminating,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Idle,
    Connected(Peer),
}

#[derive(Debug, Clone)]
struct SessionState {
    print_buffers: bool,
    timestamps: bool,
    /// Key of the most recently scheduled task, for `@stop` without a target.
    last_key: Option<String>,
}

struct Inner {
    config: SessionConfig,
    link: Arc<Link>,
    types: RwLock<TypeRegistry>,
    commands: RwLock<CommandDispatcher>,
    subscriptions: SubscriptionRegistry,
    scheduler: Scheduler,
    state: Mutex<SessionState>,
    lifecycle: Mutex<Lifecycle>,
    output: Arc<dyn Output>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Timers hold the link, not the session; do not let them outlive it
        self.scheduler.cancel_all();
    }
}

/// Handle to a console session. Clones share the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig, output: Arc<dyn Output>) -> Self {
        let state = SessionState {
            print_buffers: config.print_buffers,
            timestamps: config.timestamps,
            last_key: None,
        };
        Session {
            inner: Arc::new(Inner {
                config,
                link: Arc::new(Link::new(transport)),
                types: RwLock::new(TypeRegistry::new()),
                commands: RwLock::new(CommandDispatcher::new()),
                subscriptions: SubscriptionRegistry::new(),
                scheduler: Scheduler::new(),
                state: Mutex::new(state),
                lifecycle: Mutex::new(Lifecycle::Running),
                output,
                receiver: Mutex::new(None),
            }),
        }
    }

    /// Open the transport and start handling inbound datagrams.
    pub fn open(&self) -> Result<()> {
        self.ensure_running()?;
        let mut receiver = self.inner.receiver.lock();
        if receiver.is_some() {
            return Ok(());
        }

        let transport = Arc::clone(self.inner.link.transport());
        transport.open()?;

        let weak = Arc::downgrade(&self.inner);
        let handle = thread::Builder::new()
            .name("osc-rx".to_string())
            .spawn(move || receive_loop(weak, transport))?;
        *receiver = Some(handle);
        info!("session open");
        Ok(())
    }

    /// Shut down once: later calls return immediately. Prints `Bye!`, stops
    /// every timer, drops every subscription, stops the receive thread and
    /// closes the transport.
    pub fn terminate(&self) -> Result<()> {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if *lifecycle != Lifecycle::Running {
                return Ok(());
            }
            *lifecycle = Lifecycle::Terminating;
        }

        self.println("Bye!");
        let tasks = self.inner.scheduler.cancel_all();
        let handlers = self.inner.subscriptions.unsubscribe(None, None);
        debug!(tasks, handlers, "session terminating");

        let receiver = self.inner.receiver.lock().take();
        if let Some(receiver) = receiver {
            // A handler on the receive thread may be the one terminating
            if receiver.thread().id() != thread::current().id() {
                let _ = receiver.join();
            }
        }

        let closed = self.inner.link.transport().close();
        *self.inner.lifecycle.lock() = Lifecycle::Terminated;
        info!("session terminated");
        closed.map_err(SessionError::from)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.inner.lifecycle.lock()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(SessionError::Terminated)
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn println(&self, line: &str) {
        self.inner.output.println(line);
    }

    // Peer

    pub fn connect(&self, peer: Peer) {
        if let Some(previous) = self.inner.link.set_peer(Some(peer)) {
            debug!(%previous, "replacing peer");
        }
        info!(%peer, "peer selected");
    }

    /// Forget the peer, returning it if there was one.
    pub fn disconnect(&self) -> Option<Peer> {
        let previous = self.inner.link.set_peer(None);
        if let Some(peer) = previous {
            info!(%peer, "peer cleared");
        }
        previous
    }

    pub fn peer(&self) -> Option<Peer> {
        self.inner.link.peer()
    }

    pub fn peer_state(&self) -> PeerState {
        match self.peer() {
            Some(peer) => PeerState::Connected(peer),
            None => PeerState::Idle,
        }
    }

    pub(crate) fn link(&self) -> Arc<Link> {
        Arc::clone(&self.inner.link)
    }

    // Registries

    pub fn register_command<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Session, &[String]) -> Result<()> + Send + Sync + 'static,
    {
        self.inner.commands.write().register(name, handler);
    }

    pub fn command_names(&self) -> Vec<String> {
        self.inner.commands.read().names()
    }

    pub fn register_parser<F>(&self, tag: char, parser: F)
    where
        F: Fn(&mut VecDeque<String>) -> Result<OscArg> + Send + Sync + 'static,
    {
        self.inner.types.write().register_parser(tag, parser);
    }

    pub fn register_formatter<F>(&self, tag: char, formatter: F)
    where
        F: Fn(&OscArg, &FormatOptions) -> String + Send + Sync + 'static,
    {
        self.inner.types.write().register_formatter(tag, formatter);
    }

    pub fn parse_args<I>(&self, types: &str, values: I) -> Result<Vec<OscArg>>
    where
        I: IntoIterator<Item = String>,
    {
        self.inner.types.read().parse_args(types, values)
    }

    fn format_options(&self) -> FormatOptions {
        FormatOptions {
            print_buffers: self.inner.state.lock().print_buffers,
        }
    }

    pub fn format(&self, arg: &OscArg) -> String {
        let opts = self.format_options();
        self.inner.types.read().format(arg, &opts)
    }

    pub fn format_args(&self, args: &[OscArg]) -> Vec<String> {
        let opts = self.format_options();
        self.inner.types.read().format_args(args, &opts)
    }

    pub fn subscribe<F>(&self, address: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        self.inner.subscriptions.subscribe(address, handler)
    }

    pub fn unsubscribe(&self, address: Option<&str>, id: Option<SubscriptionId>) -> usize {
        self.inner.subscriptions.unsubscribe(address, id)
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.inner.subscriptions
    }

    // Flags

    pub fn print_buffers(&self) -> bool {
        self.inner.state.lock().print_buffers
    }

    pub fn set_print_buffers(&self, on: bool) {
        self.inner.state.lock().print_buffers = on;
    }

    pub fn timestamps(&self) -> bool {
        self.inner.state.lock().timestamps
    }

    pub fn set_timestamps(&self, on: bool) {
        self.inner.state.lock().timestamps = on;
    }

    // Sending, queries and timers

    pub fn send(&self, message: &OscMessage) -> Result<()> {
        self.ensure_running()?;
        self.inner.link.send(message)
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            timeout: self.inner.config.query_timeout,
            resend: self.inner.config.query_resend,
        }
    }

    /// Ask the peer for the current value at `address`, waiting for a reply
    /// whose first argument has type `tag`.
    pub fn query(&self, address: &str, tag: char) -> Result<OscArg> {
        self.query_with(address, tag, self.query_options())
    }

    pub fn query_with(&self, address: &str, tag: char, options: QueryOptions) -> Result<OscArg> {
        self.ensure_running()?;
        query(&self.inner.link, &self.inner.subscriptions, address, tag, options)
    }

    /// Run `callback` every `interval` under `key`, replacing whatever ran
    /// there before. `key` becomes the default target of `@stop`.
    pub fn schedule<F>(&self, key: &str, interval: Duration, callback: F) -> Result<CancelHandle>
    where
        F: FnMut(Duration) -> bool + Send + 'static,
    {
        self.ensure_running()?;
        let handle = self.inner.scheduler.schedule(key, interval, callback)?;
        self.inner.state.lock().last_key = Some(key.to_string());
        Ok(handle)
    }

    pub fn start_effect(&self, address: &str, waveform: Waveform) -> Result<CancelHandle> {
        let tick = effect_tick(self.link(), address.to_string(), waveform);
        debug!(address, effect = waveform.name(), "starting effect");
        self.schedule(address, self.inner.config.effect_tick, tick)
    }

    pub fn stop(&self, key: &str) -> bool {
        self.inner.scheduler.cancel(key)
    }

    pub fn last_key(&self) -> Option<String> {
        self.inner.state.lock().last_key.clone()
    }

    pub fn active_tasks(&self) -> Vec<String> {
        self.inner.scheduler.active_keys()
    }

    // Input

    /// Handle one console line, returning its error instead of printing it.
    pub fn handle_line(&self, line: &str) -> Result<()> {
        self.ensure_running()?;
        let tokens = tokenize(line);
        if tokens.is_empty() {
            return Ok(());
        }
        self.execute(&tokens)
    }

    /// `@name args...` runs a command; anything else is
    /// `<address> [<types> <values...>]` sent to the peer.
    pub fn execute(&self, tokens: &[String]) -> Result<()> {
        let Some((head, rest)) = tokens.split_first() else {
            return Ok(());
        };

        if let Some(name) = head.strip_prefix('@') {
            // Released before running so handlers may register commands
            let command = self.inner.commands.read().lookup(name)?;
            return command(self, rest);
        }

        let (types, values) = match rest {
            [types, values @ ..] => (types.as_str(), values),
            [] => ("", rest),
        };
        let args = self.parse_args(types, values.iter().cloned())?;
        self.send(&OscMessage::new(head, args))
    }

    /// Handle one console line, printing any error. Returns false once the
    /// session no longer accepts input.
    pub fn process_line(&self, line: &str) -> bool {
        if let Err(e) = self.handle_line(line) {
            debug!(error = ?e, line, "line failed");
            self.println(&e.to_string());
        }
        self.is_running()
    }

    // Inbound

    pub fn handle_datagram(&self, data: &[u8], origin: SocketAddr) {
        match OscPacket::from_bytes(data) {
            Ok(packet) => {
                for message in packet.into_messages() {
                    self.handle_inbound(&message);
                }
            }
            Err(e) => {
                warn!(%origin, len = data.len(), error = %e, "undecodable datagram");
                self.inner
                    .output
                    .notify(&format!("! malformed packet from {}: {}", origin, e));
            }
        }
    }

    /// Subscribers take the message; unclaimed messages are printed.
    pub fn handle_inbound(&self, message: &OscMessage) {
        if self.inner.subscriptions.dispatch(message) {
            return;
        }
        self.inner.output.notify(&self.render(message));
    }

    /// `> /address arg1 arg2`, optionally prefixed with the local time.
    pub fn render(&self, message: &OscMessage) -> String {
        let mut line = String::new();
        if self.timestamps() {
            line.push_str(&format!("[{}] ", Local::now().format("%H:%M:%S%.3f")));
        }
        line.push_str("> ");
        line.push_str(&message.address);
        for arg in self.format_args(&message.args) {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

fn receive_loop(session: Weak<Inner>, transport: Arc<dyn Transport>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    debug!("receive loop started");

    loop {
        let received = transport.receive(&mut buf);
        let Some(inner) = session.upgrade() else {
            break;
        };
        if *inner.lifecycle.lock() != Lifecycle::Running {
            break;
        }

        match received {
            Ok(Some((n, origin))) => Session { inner }.handle_datagram(&buf[..n], origin),
            Ok(None) => {}
            Err(e) if !transport.is_open() => {
                debug!(error = %e, "transport closed");
                break;
            }
            Err(e) => warn!(error = %e, "receive failed"),
        }
    }

    debug!("receive loop stopped");
}
