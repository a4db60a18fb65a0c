// Request/response on top of a send-only protocol
//
// A query subscribes to the address, probes it (argument-less send) right
// away and again on every resend tick, and gives up at the deadline. The
// first inbound message whose first argument carries the expected tag wins.
use std::time::{Duration, Instant};

use crossbeam::channel::{after, bounded, select, tick};
use osc_core::{OscArg, OscMessage};
use tracing::debug;

use crate::config::{DEFAULT_QUERY_RESEND, DEFAULT_QUERY_TIMEOUT};
use crate::error::{Result, SessionError};
use crate::link::Link;
use crate::subscriptions::SubscriptionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub timeout: Duration,
    pub resend: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            timeout: DEFAULT_QUERY_TIMEOUT,
            resend: DEFAULT_QUERY_RESEND,
        }
    }
}

/// Blocks until a matching reply arrives, the deadline passes, or a probe
/// cannot be sent. The subscription, resend ticker and deadline are gone
/// when this returns, whatever the outcome.
///
/// Queries are not deduplicated: two concurrent queries on one address
/// are two subscriptions and both resolve from the same reply.
pub fn query(
    link: &Link,
    subscriptions: &SubscriptionRegistry,
    address: &str,
    expected: char,
    options: QueryOptions,
) -> Result<OscArg> {
    let (reply_tx, reply_rx) = bounded::<OscArg>(1);
    let _subscription = subscriptions.scoped(address, move |msg| {
        if let Some(first) = msg.args.first() {
            if first.tag() == expected {
                // A second match while the first is unread changes nothing
                let _ = reply_tx.try_send(first.clone());
            }
        }
    });

    let started = Instant::now();
    let probe = OscMessage::probe(address);
    let resend = tick(options.resend);
    let deadline = after(options.timeout);

    link.send(&probe)?;
    let mut probes = 1u32;

    loop {
        select! {
            recv(reply_rx) -> reply => {
                return match reply {
                    Ok(value) => {
                        debug!(address, probes, elapsed = ?started.elapsed(), "query answered");
                        Ok(value)
                    }
                    // Our handler was removed out from under us
                    Err(_) => Err(SessionError::QueryCancelled { address: address.to_string() }),
                };
            }
            recv(resend) -> _ => {
                link.send(&probe)?;
                probes += 1;
            }
            recv(deadline) -> _ => {
                debug!(address, probes, "query timed out");
                return Err(SessionError::QueryTimeout {
                    address: address.to_string(),
                    timeout: options.timeout,
                });
            }
        }
    }
}
