pub mod loopback;

pub use loopback::{LoopbackLink, LoopbackNetwork};

use crate::error::{Result, SyncError};
use crate::game_logic::OwnerId;
use crate::prediction::StateSnapshot;
use crate::protocol::{InputSample, RemoteActorInfo};
use std::sync::mpsc::Sender;

/// Outbound side of the network, as seen by the core.
///
/// Delivery is fire-and-forget: no ordering, no acknowledgement.
pub trait Transport {
    /// Client to authority: one predicted input plus the sender's own pose
    fn send_to_authority(&mut self, sample: &InputSample, info: &RemoteActorInfo) -> Result<()>;

    /// Authority to the snapshot's owner
    fn send_to_owner(&mut self, snapshot: &StateSnapshot) -> Result<()>;

    /// Authority to a non-owner
    fn send_to_other(&mut self, info: &RemoteActorInfo, target: OwnerId) -> Result<()>;
}

/// In-process route from a player hosted inside the authority process
/// straight into the authority's input queue.
///
/// Only carries inputs. The authority hands the hosted player its snapshots
/// by direct call, so anything routed the other way is an error.
pub struct DirectLink {
    sender: Sender<InputSample>,
}

impl DirectLink {
    pub fn new(sender: Sender<InputSample>) -> Self {
        Self { sender }
    }
}

impl Transport for DirectLink {
    fn send_to_authority(&mut self, sample: &InputSample, _info: &RemoteActorInfo) -> Result<()> {
        self.sender
            .send(*sample)
            .map_err(|_| SyncError::ChannelClosed("authority".into()))
    }

    fn send_to_owner(&mut self, snapshot: &StateSnapshot) -> Result<()> {
        Err(SyncError::ChannelClosed(format!(
            "direct link has no route to {}",
            snapshot.owner_id
        )))
    }

    fn send_to_other(&mut self, _info: &RemoteActorInfo, target: OwnerId) -> Result<()> {
        Err(SyncError::ChannelClosed(format!(
            "direct link has no route to {}",
            target
        )))
    }
}

/// Everything a [`RecordingTransport`] was asked to send
#[cfg(test)]
#[derive(Clone, Debug, PartialEq)]
pub enum Sent {
    ToAuthority(InputSample),
    ToOwner(StateSnapshot),
    ToOther(RemoteActorInfo, OwnerId),
}

#[cfg(test)]
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Vec<Sent>,
    pub fail: bool,
}

#[cfg(test)]
impl RecordingTransport {
    /// `(about, to)` pairs of every reduced info sent
    pub fn infos(&self) -> Vec<(OwnerId, OwnerId)> {
        self.sent
            .iter()
            .filter_map(|sent| match sent {
                Sent::ToOther(info, target) => Some((info.owner_id, *target)),
                _ => None,
            })
            .collect()
    }

    pub fn snapshots(&self) -> Vec<StateSnapshot> {
        self.sent
            .iter()
            .filter_map(|sent| match sent {
                Sent::ToOwner(snapshot) => Some(*snapshot),
                _ => None,
            })
            .collect()
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            Err(SyncError::ChannelClosed("recording".into()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
impl Transport for RecordingTransport {
    fn send_to_authority(&mut self, sample: &InputSample, _info: &RemoteActorInfo) -> Result<()> {
        self.check()?;
        self.sent.push(Sent::ToAuthority(*sample));
        Ok(())
    }

    fn send_to_owner(&mut self, snapshot: &StateSnapshot) -> Result<()> {
        self.check()?;
        self.sent.push(Sent::ToOwner(*snapshot));
        Ok(())
    }

    fn send_to_other(&mut self, info: &RemoteActorInfo, target: OwnerId) -> Result<()> {
        self.check()?;
        self.sent.push(Sent::ToOther(*info, target));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::{ActorHandle, Pose};
    use bevy::prelude::*;
    use std::sync::mpsc;

    #[test]
    fn test_direct_link_feeds_channel() {
        let (sender, receiver) = mpsc::channel();
        let mut link = DirectLink::new(sender);
        let sample = InputSample {
            sequence_index: 3,
            owner_id: OwnerId(1),
            ..default()
        };
        let info = RemoteActorInfo::from_pose(&Pose::default(), ActorHandle(0), OwnerId(1));

        link.send_to_authority(&sample, &info).unwrap();
        assert_eq!(receiver.try_recv().unwrap(), sample);
    }

    #[test]
    fn test_direct_link_reports_closed_authority() {
        let (sender, receiver) = mpsc::channel();
        drop(receiver);
        let mut link = DirectLink::new(sender);
        let info = RemoteActorInfo::from_pose(&Pose::default(), ActorHandle(0), OwnerId(1));

        let err = link
            .send_to_authority(&InputSample::default(), &info)
            .unwrap_err();
        assert!(matches!(err, SyncError::ChannelClosed(_)));
    }

    #[test]
    fn test_direct_link_rejects_outbound_routes() {
        let (sender, receiver) = mpsc::channel();
        let mut link = DirectLink::new(sender);
        let snapshot = StateSnapshot::capture(&Pose::default(), Some(0), OwnerId(1));
        let info = RemoteActorInfo::from_pose(&Pose::default(), ActorHandle(0), OwnerId(1));

        assert!(matches!(
            link.send_to_owner(&snapshot),
            Err(SyncError::ChannelClosed(_))
        ));
        assert!(matches!(
            link.send_to_other(&info, OwnerId(2)),
            Err(SyncError::ChannelClosed(_))
        ));
        assert!(receiver.try_recv().is_err());
    }
}
