//! Per-connection send channels and group membership.
//!
//! The hub is the transport half of the broadcast path: it owns one bounded
//! outbound channel per connection plus the `group → members` table, and
//! implements the `GroupSender` primitive consumed by the broadcaster.
//!
//! Sends are fire-and-forget `try_send`s. A full or closed channel counts
//! as a drop; a client exceeding the lifetime drop threshold is
//! unregistered, which closes its write loop and thereby the socket.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use relay_core::{ConnectionId, GroupId};
use relay_hub::GroupSender;

use crate::message::OutboundEvent;

/// Maximum total lifetime message drops before forcibly disconnecting a
/// slow client.
const MAX_TOTAL_DROPS: u64 = 100;

/// Outbound channel of one connected client.
struct ClientChannel {
    tx: mpsc::Sender<Arc<String>>,
    dropped: AtomicU64,
}

impl ClientChannel {
    fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Transport-level fan-out: connection channels + group membership.
pub struct WsHub {
    channels: RwLock<HashMap<ConnectionId, ClientChannel>>,
    groups: RwLock<HashMap<GroupId, HashSet<ConnectionId>>>,
}

impl WsHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection's outbound channel.
    pub fn register(&self, id: ConnectionId, tx: mpsc::Sender<Arc<String>>) {
        let channel = ClientChannel {
            tx,
            dropped: AtomicU64::new(0),
        };
        let _ = self.channels.write().insert(id, channel);
    }

    /// Remove a connection's channel and drop all its group memberships.
    ///
    /// Dropping the channel closes the connection's write loop.
    pub fn unregister(&self, id: &ConnectionId) {
        let _ = self.channels.write().remove(id);
        let mut groups = self.groups.write();
        groups.retain(|_, members| {
            let _ = members.remove(id);
            !members.is_empty()
        });
    }

    /// Join a connection to a group.
    pub fn join_group(&self, id: &ConnectionId, group: GroupId) {
        debug!(conn = %id, %group, "joined group");
        let _ = self
            .groups
            .write()
            .entry(group)
            .or_default()
            .insert(id.clone());
    }

    /// Remove a connection from a group. Safe no-op when not a member.
    pub fn leave_group(&self, id: &ConnectionId, group: &GroupId) {
        debug!(conn = %id, %group, "left group");
        let mut groups = self.groups.write();
        if let Some(members) = groups.get_mut(group) {
            let _ = members.remove(id);
            if members.is_empty() {
                let _ = groups.remove(group);
            }
        }
    }

    /// Groups the connection is currently joined to.
    #[must_use]
    pub fn groups_of(&self, id: &ConnectionId) -> Vec<GroupId> {
        self.groups
            .read()
            .iter()
            .filter(|(_, members)| members.contains(id))
            .map(|(group, _)| group.clone())
            .collect()
    }

    /// Number of members in a group.
    #[must_use]
    pub fn group_size(&self, group: &GroupId) -> usize {
        self.groups.read().get(group).map_or(0, HashSet::len)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Send an event to a single connection.
    ///
    /// Returns `false` when the channel is full or closed.
    pub fn send_to_connection(&self, id: &ConnectionId, event: &str, data: Value) -> bool {
        let Some(frame) = encode_frame(event, &data) else {
            return false;
        };
        let channels = self.channels.read();
        let Some(channel) = channels.get(id) else {
            return false;
        };
        let sent = channel.send(frame);
        if !sent {
            counter!("ws_send_drops_total").increment(1);
            warn!(conn = %id, event, "failed to enqueue event (channel full or closed)");
        }
        sent
    }

    /// Disconnect a connection from the server side.
    ///
    /// Unregisters the channel; the write loop observes the closed channel
    /// and shuts the socket down.
    pub fn disconnect(&self, id: &ConnectionId, reason: &str) {
        warn!(conn = %id, reason, "disconnecting client");
        let _ = self.send_to_connection(id, relay_core::events::ERROR, Value::String(reason.into()));
        self.unregister(id);
    }
}

impl Default for WsHub {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupSender for WsHub {
    fn send_to_group(&self, group: &GroupId, event_id: &str, payload: &Value) {
        let Some(frame) = encode_frame(event_id, payload) else {
            return;
        };

        let mut to_remove = Vec::new();
        {
            let channels = self.channels.read();
            let groups = self.groups.read();
            let Some(members) = groups.get(group) else {
                debug!(%group, event = event_id, "no members in group, nothing sent");
                return;
            };

            let mut recipients = 0u32;
            for member in members {
                let Some(channel) = channels.get(member) else {
                    continue;
                };
                if channel.send(Arc::clone(&frame)) {
                    recipients += 1;
                } else {
                    counter!("ws_broadcast_drops_total").increment(1);
                    let drops = channel.drop_count();
                    if drops >= MAX_TOTAL_DROPS {
                        warn!(conn = %member, %group, drops, "disconnecting slow client");
                        to_remove.push(member.clone());
                    } else {
                        warn!(conn = %member, %group, total_drops = drops, "dropped broadcast frame (channel full)");
                    }
                }
            }
            debug!(event = event_id, %group, recipients, "group broadcast");
        }

        for id in &to_remove {
            self.unregister(id);
        }
    }
}

/// Serialize the wire envelope once so fan-out shares one allocation.
fn encode_frame(event: &str, data: &Value) -> Option<Arc<String>> {
    let envelope = OutboundEvent::new(event, data.clone());
    match serde_json::to_string(&envelope) {
        Ok(json) => Some(Arc::new(json)),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize outbound event");
            None
        }
    }
}
