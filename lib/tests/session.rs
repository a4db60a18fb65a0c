// End-to-end console sessions over the in-memory transport
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use osc_session::{
    Lifecycle, MemoryOutput, MemoryPeer, MemoryTransport, OscArg, OscMessage, PeerState, Session,
    SessionConfig, SessionError,
};

struct Harness {
    session: Session,
    remote: MemoryPeer,
    output: Arc<MemoryOutput>,
}

fn harness() -> Harness {
    harness_with(SessionConfig {
        query_timeout: Duration::from_millis(500),
        query_resend: Duration::from_millis(20),
        effect_tick: Duration::from_millis(10),
        ..SessionConfig::default()
    })
}

fn harness_with(config: SessionConfig) -> Harness {
    let (transport, remote) = MemoryTransport::pair();
    let output = Arc::new(MemoryOutput::new());
    let session = Session::new(Arc::new(transport), config, output.clone());
    session.open().unwrap();
    Harness { session, remote, output }
}

fn origin() -> SocketAddr {
    "127.0.0.1:9000".parse().unwrap()
}

fn decode(data: &[u8]) -> OscMessage {
    OscMessage::from_bytes(data).unwrap()
}

fn wait_for<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn connect_then_send_int_and_float() {
    let h = harness();
    assert!(h.session.process_line("@connect 127.0.0.1 9000"));
    assert!(matches!(h.session.peer_state(), PeerState::Connected(_)));
    assert_eq!(h.output.take(), vec!["Connecting to 127.0.0.1:9000."]);

    assert!(h.session.process_line("/foo if 1 2.5"));
    let datagram = h.remote.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(datagram.peer, Some(origin()));
    assert_eq!(
        decode(&datagram.data),
        OscMessage::new("/foo", vec![OscArg::Int(1), OscArg::Float(2.5)])
    );
    assert!(h.output.lines().is_empty());
    h.session.terminate().unwrap();
}

#[test]
fn sending_without_peer_reports_error() {
    let h = harness();
    assert!(h.session.process_line("/foo i 1"));
    let lines = h.output.take();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("no peer selected"), "{}", lines[0]);
    assert!(h.remote.try_recv().is_none());
}

#[test]
fn errors_are_rendered_and_session_continues() {
    let h = harness();
    h.session.process_line("@connect 127.0.0.1 9000");
    h.output.take();

    assert!(h.session.process_line("@frobnicate now"));
    assert!(h.session.process_line("/foo x 1"));
    assert!(h.session.process_line("/foo ii 1"));
    assert!(h.session.process_line("@connect 127.0.0.1"));
    assert_eq!(
        h.output.take(),
        vec![
            "Unknown command: @frobnicate",
            "Unknown type: 'x'",
            "Missing value",
            "Usage: @connect <ip> <port>",
        ]
    );
    assert!(h.remote.try_recv().is_none());

    // Blank lines are ignored
    assert!(h.session.process_line("   "));
    assert!(h.output.lines().is_empty());
}

#[test]
fn inbound_messages_render_unless_subscribed() {
    let h = harness();
    h.remote.inject(
        OscMessage::new("/ch/01/mix/fader", vec![OscArg::Float(0.25)]).to_bytes(),
        origin(),
    );
    assert!(wait_for(Duration::from_secs(1), || h.output.contains("> /ch/01/mix/fader 0.25")));

    let (tx, rx) = crossbeam::channel::unbounded();
    h.session.subscribe("/ch/01/mix/on", move |msg| {
        let _ = tx.send(msg.clone());
    });
    h.remote.inject(
        OscMessage::new("/ch/01/mix/on", vec![OscArg::Bool(true)]).to_bytes(),
        origin(),
    );
    let claimed = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(claimed.args, vec![OscArg::Bool(true)]);
    assert!(!h.output.contains("/ch/01/mix/on"));

    h.session.unsubscribe(Some("/ch/01/mix/on"), None);
    h.remote.inject(OscMessage::probe("/ch/01/mix/on").to_bytes(), origin());
    assert!(wait_for(Duration::from_secs(1), || h.output.contains("> /ch/01/mix/on")));
}

#[test]
fn every_repeats_until_stop_without_argument() {
    let h = harness();
    h.session.process_line("@connect 127.0.0.1 9000");
    assert!(h.session.process_line("@every 0.02 /xremote"));
    assert_eq!(h.session.last_key().as_deref(), Some("/xremote"));

    // First send is immediate, then one per interval
    thread::sleep(Duration::from_millis(110));
    assert!(h.session.process_line("@stop"));
    let sent = h.remote.drain();
    assert!(sent.len() >= 3, "only {} sends", sent.len());
    assert!(sent.iter().all(|d| decode(&d.data) == OscMessage::probe("/xremote")));
    assert!(h.output.contains("Timer set."));
    assert!(h.output.contains("Timer cleared."));
    assert!(h.session.active_tasks().is_empty());

    thread::sleep(Duration::from_millis(60));
    assert!(h.remote.drain().is_empty());
}

#[test]
fn stop_names_a_specific_timer() {
    let h = harness();
    h.session.process_line("@connect 127.0.0.1 9000");
    h.session.process_line("@every 1 /a i 1");
    h.session.process_line("@every 1 /b i 2");
    assert_eq!(h.session.active_tasks(), vec!["/a", "/b"]);

    h.session.process_line("@stop /a");
    assert_eq!(h.session.active_tasks(), vec!["/b"]);
    h.session.process_line("@stop /a");
    assert!(h.output.contains("No timer for /a."));
    h.session.terminate().unwrap();
}

#[test]
fn second_effect_on_a_key_replaces_the_first() {
    let h = harness();
    h.session.process_line("@connect 127.0.0.1 9000");
    h.session.process_line("@sin 1 /fx 0 1");
    thread::sleep(Duration::from_millis(50));
    h.session.process_line("@tri 1 /fx 0.2 0.4");
    assert_eq!(h.session.active_tasks(), vec!["/fx"]);

    // Anything sent from here on comes from the triangle: always in [0.2, 0.4]
    h.remote.drain();
    thread::sleep(Duration::from_millis(80));
    let values: Vec<f32> = h
        .remote
        .drain()
        .iter()
        .filter_map(|d| decode(&d.data).args.first().and_then(OscArg::as_f32))
        .collect();
    assert!(values.len() >= 3);
    assert!(values.iter().all(|v| (0.2..=0.4).contains(v)), "{values:?}");
    h.session.terminate().unwrap();
}

#[test]
fn fade_in_stops_on_the_reference_level() {
    let h = harness();
    h.session.process_line("@connect 127.0.0.1 9000");
    assert!(h.session.process_line("@fade 0.1 /main/st/mix/fader in"));
    assert!(wait_for(Duration::from_secs(2), || h.session.active_tasks().is_empty()));

    let values: Vec<f32> = h
        .remote
        .drain()
        .iter()
        .filter_map(|d| decode(&d.data).args.first().and_then(OscArg::as_f32))
        .collect();
    assert!(values.len() >= 2);
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
    assert_eq!(values.last().copied(), Some(0.75));
    assert!(h.output.contains("Fading /main/st/mix/fader from 0 to 0.75."));
}

// Answers the first probe per address with `value`, like a mixing desk would
fn spawn_desk(session: Session, remote: MemoryPeer, value: f32) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut answered = HashSet::new();
        while session.is_running() {
            let Some(datagram) = remote.recv_timeout(Duration::from_millis(10)) else {
                continue;
            };
            let msg = decode(&datagram.data);
            if msg.is_probe() && answered.insert(msg.address.clone()) {
                let reply = OscMessage::new(&msg.address, vec![OscArg::Float(value)]);
                remote.inject(reply.to_bytes(), origin());
            }
        }
    })
}

#[test]
fn get_queries_the_peer() {
    let h = harness();
    h.session.process_line("@connect 127.0.0.1 9000");
    let desk = spawn_desk(h.session.clone(), h.remote, 0.5);

    assert!(h.session.process_line("@get /ch/02/mix/fader"));
    assert!(h.output.contains("/ch/02/mix/fader = 0.5"), "{:?}", h.output.lines());
    // The reply went to the query, not the console
    assert!(!h.output.contains("> /ch/02/mix/fader"));
    assert!(h.session.subscriptions().is_empty());

    h.session.terminate().unwrap();
    desk.join().unwrap();
}

#[test]
fn fade_out_starts_from_the_live_value() {
    let h = harness();
    h.session.process_line("@connect 127.0.0.1 9000");
    let desk = spawn_desk(h.session.clone(), h.remote, 0.6);

    assert!(h.session.process_line("@fade 0.05 /bus/1/mix/fader out"));
    assert!(h.output.contains("Fading /bus/1/mix/fader from 0.6 to 0."), "{:?}", h.output.lines());
    h.session.terminate().unwrap();
    desk.join().unwrap();
}

#[test]
fn get_times_out_on_a_silent_peer() {
    let h = harness();
    h.session.process_line("@connect 127.0.0.1 9000");
    let err = h.session.handle_line("@get /nothing f 0.1").unwrap_err();
    assert!(err.is_timeout());
    assert!(h.session.subscriptions().is_empty());
    assert!(h.remote.drain().len() >= 2);
}

#[test]
fn custom_types_and_commands() {
    let h = harness();
    h.session.register_parser('D', |values| {
        let db = osc_session::registry::take(values)?;
        let db: f32 = db
            .parse()
            .map_err(|_| SessionError::InvalidValue { tag: 'D', value: db.clone() })?;
        Ok(OscArg::Float(10f32.powf(db / 20.0)))
    });
    h.session.register_command("mute", |session: &Session, args: &[String]| {
        let [channel] = args else {
            return Err(SessionError::usage("@mute <channel>"));
        };
        session.send(&OscMessage::new(
            &format!("/ch/{:0>2}/mix/on", channel),
            vec![OscArg::Int(0)],
        ))
    });

    h.session.process_line("@connect 127.0.0.1 9000");
    h.session.process_line("/gain D 0");
    h.session.process_line("@mute 3");
    let sent: Vec<OscMessage> = h.remote.drain().iter().map(|d| decode(&d.data)).collect();
    assert_eq!(
        sent,
        vec![
            OscMessage::new("/gain", vec![OscArg::Float(1.0)]),
            OscMessage::new("/ch/03/mix/on", vec![OscArg::Int(0)]),
        ]
    );
}

#[test]
fn quit_terminates_once() {
    let h = harness();
    h.session.process_line("@connect 127.0.0.1 9000");
    h.session.process_line("@sin 1 /fx 0 1");
    let (tx, _rx) = crossbeam::channel::unbounded();
    h.session.subscribe("/fx", move |msg| {
        let _ = tx.send(msg.clone());
    });

    assert!(!h.session.process_line("@quit"));
    assert_eq!(h.session.lifecycle(), Lifecycle::Terminated);
    assert!(h.session.active_tasks().is_empty());
    assert!(h.session.subscriptions().is_empty());

    h.session.terminate().unwrap();
    assert!(!h.session.process_line("/fx f 1"));
    let lines = h.output.lines();
    assert_eq!(lines.iter().filter(|l| *l == "Bye!").count(), 1);
    assert_eq!(lines.last().map(String::as_str), Some("Session terminated"));

    // Nothing is sent once terminated
    h.remote.drain();
    thread::sleep(Duration::from_millis(40));
    assert!(h.remote.drain().is_empty());
}

#[test]
fn every_accepts_any_typed_address() {
    let h = harness();
    h.session.process_line("@connect 127.0.0.1 9000");
    assert!(h.session.process_line("@every 1 /a\u{0}b"));
    assert_eq!(h.session.active_tasks(), vec!["/a\u{0}b"]);
    assert!(h.session.process_line("@stop"));
    assert!(h.session.active_tasks().is_empty());
    assert!(h.session.is_running());
}
