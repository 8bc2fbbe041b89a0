use crate::config::LoopbackSettings;
use crate::error::{Result, SyncError};
use crate::game_logic::OwnerId;
use crate::prediction::StateSnapshot;
use crate::protocol::{
    decode_line, encode_line, ClientMessage, InputSample, RemoteActorInfo, ServerMessage,
};
use crate::transport::Transport;
use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    Authority,
    Owner(OwnerId),
}

struct InFlight {
    deliver_at: f64,
    order: u64,
    route: Route,
    /// Owner the line is about: the sender of an input, the subject of a
    /// snapshot or remote info
    about: OwnerId,
    line: String,
}

struct Outgoing {
    route: Route,
    about: OwnerId,
    line: String,
}

/// In-process network: JSON lines between links, delayed by a fixed latency
/// plus seeded random jitter. With jitter, lines can overtake each other.
pub struct LoopbackNetwork {
    clock: f64,
    latency: f64,
    jitter: f64,
    rng: StdRng,
    outgoing_tx: Sender<Outgoing>,
    outgoing_rx: Mutex<Receiver<Outgoing>>,
    in_flight: Vec<InFlight>,
    sent: u64,
    delivered: u64,
    mailboxes: HashMap<Route, Sender<String>>,
}

impl LoopbackNetwork {
    pub fn new(settings: &LoopbackSettings) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::channel();
        Self {
            clock: 0.0,
            latency: f64::from(settings.latency),
            jitter: f64::from(settings.jitter),
            rng: StdRng::seed_from_u64(settings.seed),
            outgoing_tx,
            outgoing_rx: Mutex::new(outgoing_rx),
            in_flight: Vec::new(),
            sent: 0,
            delivered: 0,
            mailboxes: HashMap::new(),
        }
    }

    pub fn authority_link(&mut self) -> LoopbackLink {
        self.link(Route::Authority)
    }

    pub fn client_link(&mut self, owner: OwnerId) -> LoopbackLink {
        self.link(Route::Owner(owner))
    }

    fn link(&mut self, route: Route) -> LoopbackLink {
        let (inbox_tx, inbox_rx) = mpsc::channel();
        if self.mailboxes.insert(route, inbox_tx).is_some() {
            warn!("replacing existing loopback link for {:?}", route);
        }
        LoopbackLink {
            route,
            outgoing: self.outgoing_tx.clone(),
            inbox: Mutex::new(inbox_rx),
        }
    }

    /// Close an owner's mailbox and drop every undelivered line sent by it,
    /// addressed to it or about it
    pub fn disconnect(&mut self, owner: OwnerId) {
        self.mailboxes.remove(&Route::Owner(owner));
        self.collect_outgoing();

        let before = self.in_flight.len();
        self.in_flight
            .retain(|message| message.about != owner && message.route != Route::Owner(owner));
        let purged = before - self.in_flight.len();
        if purged > 0 {
            debug!("purged {} in-flight lines for {}", purged, owner);
        }
    }

    /// Lines sent but not yet delivered
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Stamp lines sent since the last call with their delivery time
    fn collect_outgoing(&mut self) {
        let outgoing: Vec<Outgoing> = {
            let receiver = self
                .outgoing_rx
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner);
            receiver.try_iter().collect()
        };

        for message in outgoing {
            let jitter = if self.jitter > 0.0 {
                self.rng.gen_range(0.0..self.jitter)
            } else {
                0.0
            };
            self.in_flight.push(InFlight {
                deliver_at: self.clock + self.latency + jitter,
                order: self.sent,
                route: message.route,
                about: message.about,
                line: message.line,
            });
            self.sent += 1;
        }
    }

    /// Pick up newly sent lines, move time forward, deliver what is due
    pub fn advance(&mut self, delta: f32) {
        self.collect_outgoing();

        self.clock += f64::from(delta);

        let (mut due, pending): (Vec<InFlight>, Vec<InFlight>) = self
            .in_flight
            .drain(..)
            .partition(|message| message.deliver_at <= self.clock);
        self.in_flight = pending;
        due.sort_by(|a, b| {
            a.deliver_at
                .total_cmp(&b.deliver_at)
                .then(a.order.cmp(&b.order))
        });

        for message in due {
            let route = message.route;
            let sent = self
                .mailboxes
                .get(&route)
                .is_some_and(|mailbox| mailbox.send(message.line).is_ok());
            if sent {
                self.delivered += 1;
            } else {
                debug!("dropping line for unreachable {:?}", route);
            }
        }
    }
}

/// One participant's end of a [`LoopbackNetwork`]
pub struct LoopbackLink {
    route: Route,
    outgoing: Sender<Outgoing>,
    inbox: Mutex<Receiver<String>>,
}

impl LoopbackLink {
    pub fn route(&self) -> Route {
        self.route
    }

    /// Decode every delivered line; undecodable lines are logged and skipped
    pub fn receive<T: DeserializeOwned>(&mut self) -> Vec<T> {
        let inbox = self.inbox.get_mut().unwrap_or_else(PoisonError::into_inner);
        inbox
            .try_iter()
            .filter_map(|line| match decode_line(&line) {
                Ok(message) => Some(message),
                Err(err) => {
                    warn!("{:?} dropped an undecodable line: {}", self.route, err);
                    None
                }
            })
            .collect()
    }

    fn send(&self, route: Route, about: OwnerId, line: String) -> Result<()> {
        self.outgoing
            .send(Outgoing { route, about, line })
            .map_err(|_| SyncError::ChannelClosed("loopback network".into()))
    }
}

impl Transport for LoopbackLink {
    fn send_to_authority(&mut self, sample: &InputSample, info: &RemoteActorInfo) -> Result<()> {
        let line = encode_line(&ClientMessage::PlayerInput {
            sample: *sample,
            info: *info,
        })?;
        self.send(Route::Authority, sample.owner_id, line)
    }

    fn send_to_owner(&mut self, snapshot: &StateSnapshot) -> Result<()> {
        let line = encode_line(&ServerMessage::Snapshot {
            snapshot: *snapshot,
        })?;
        self.send(Route::Owner(snapshot.owner_id), snapshot.owner_id, line)
    }

    fn send_to_other(&mut self, info: &RemoteActorInfo, target: OwnerId) -> Result<()> {
        let line = encode_line(&ServerMessage::RemoteActor { info: *info })?;
        self.send(Route::Owner(target), info.owner_id, line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::{ActorHandle, Pose};

    fn settings(latency: f32, jitter: f32) -> LoopbackSettings {
        LoopbackSettings {
            latency,
            jitter,
            seed: 11,
        }
    }

    fn info(owner: u32) -> RemoteActorInfo {
        RemoteActorInfo::from_pose(
            &Pose::at(Vec3::splat(owner as f32)),
            ActorHandle(owner),
            OwnerId(owner),
        )
    }

    #[test]
    fn test_delivery_waits_for_latency() {
        let mut network = LoopbackNetwork::new(&settings(0.05, 0.0));
        let mut client = network.client_link(OwnerId(1));
        let mut authority = network.authority_link();

        let sample = InputSample {
            sequence_index: 4,
            owner_id: OwnerId(1),
            ..default()
        };
        client.send_to_authority(&sample, &info(1)).unwrap();

        network.advance(0.02);
        assert!(authority.receive::<ClientMessage>().is_empty());
        assert_eq!(network.in_flight(), 1);

        network.advance(0.04);
        let received = authority.receive::<ClientMessage>();
        assert_eq!(
            received,
            vec![ClientMessage::PlayerInput {
                sample,
                info: info(1)
            }]
        );
        assert_eq!(network.delivered(), 1);
    }

    #[test]
    fn test_authority_routes_by_owner() {
        let mut network = LoopbackNetwork::new(&settings(0.0, 0.0));
        let mut one = network.client_link(OwnerId(1));
        let mut two = network.client_link(OwnerId(2));
        let mut authority = network.authority_link();

        let snapshot = StateSnapshot::capture(&Pose::default(), Some(3), OwnerId(1));
        authority.send_to_owner(&snapshot).unwrap();
        authority.send_to_other(&info(1), OwnerId(2)).unwrap();
        network.advance(0.0);

        assert_eq!(
            one.receive::<ServerMessage>(),
            vec![ServerMessage::Snapshot { snapshot }]
        );
        assert_eq!(
            two.receive::<ServerMessage>(),
            vec![ServerMessage::RemoteActor { info: info(1) }]
        );
    }

    #[test]
    fn test_jitter_can_reorder() {
        let mut network = LoopbackNetwork::new(&settings(0.0, 0.5));
        let mut client = network.client_link(OwnerId(1));
        let mut authority = network.authority_link();

        for sequence_index in 0..32 {
            let sample = InputSample {
                sequence_index,
                owner_id: OwnerId(1),
                ..default()
            };
            client.send_to_authority(&sample, &info(1)).unwrap();
        }
        network.advance(1.0);

        let order: Vec<u64> = authority
            .receive::<ClientMessage>()
            .into_iter()
            .map(|message| match message {
                ClientMessage::PlayerInput { sample, .. } => sample.sequence_index,
            })
            .collect();
        assert_eq!(order.len(), 32);
        assert!(order.windows(2).any(|pair| pair[0] > pair[1]));
    }

    #[test]
    fn test_disconnected_owner_drops_lines() {
        let mut network = LoopbackNetwork::new(&settings(0.0, 0.0));
        let _one = network.client_link(OwnerId(1));
        let mut authority = network.authority_link();
        network.disconnect(OwnerId(1));

        let snapshot = StateSnapshot::capture(&Pose::default(), Some(0), OwnerId(1));
        authority.send_to_owner(&snapshot).unwrap();
        network.advance(0.1);

        assert_eq!(network.delivered(), 0);
        assert_eq!(network.in_flight(), 0);
    }

    #[test]
    fn test_disconnect_purges_lines_from_and_about_owner() {
        let mut network = LoopbackNetwork::new(&settings(0.05, 0.0));
        let mut one = network.client_link(OwnerId(1));
        let mut two = network.client_link(OwnerId(2));
        let mut authority = network.authority_link();

        let sample = InputSample {
            owner_id: OwnerId(2),
            ..default()
        };
        two.send_to_authority(&sample, &info(2)).unwrap();
        network.advance(0.01);
        // Still in the outgoing channel when the owner leaves
        authority.send_to_other(&info(2), OwnerId(1)).unwrap();
        authority.send_to_other(&info(3), OwnerId(1)).unwrap();

        network.disconnect(OwnerId(2));
        assert_eq!(network.in_flight(), 1);

        network.advance(0.1);
        assert!(authority.receive::<ClientMessage>().is_empty());
        assert_eq!(
            one.receive::<ServerMessage>(),
            vec![ServerMessage::RemoteActor { info: info(3) }]
        );
    }
}
