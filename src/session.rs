use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::game_logic::{CharacterMotion, OwnerId, Pose, ScriptedInput};
use crate::interpolation::RemoteInterpolator;
use crate::prediction::{LocalPredictor, PredictionStats};
use crate::protocol::{ClientMessage, InputSample, ServerMessage};
use crate::server::{ActorDirectory, ActorRegistry, AuthorityTickProcessor, TickReport};
use crate::tick::TickClock;
use crate::transport::{DirectLink, LoopbackLink, LoopbackNetwork};
use bevy::prelude::*;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

/// A player connected to the authority over the loopback network. Keeps its
/// own view of the scene, fed by prediction for itself and interpolation for
/// everyone else.
pub struct RemoteClient {
    pub predictor: LocalPredictor<ScriptedInput, CharacterMotion, LoopbackLink>,
    pub interpolator: RemoteInterpolator,
    pub scene: ActorRegistry,
}

impl RemoteClient {
    pub fn owner_id(&self) -> OwnerId {
        self.predictor.owner_id()
    }

    fn receive(&mut self) {
        let messages = self.predictor.transport_mut().receive::<ServerMessage>();
        for message in messages {
            match message {
                ServerMessage::Snapshot { snapshot } => {
                    self.predictor.on_authoritative_state(snapshot)
                }
                ServerMessage::RemoteActor { info } => self.interpolator.on_receive(info),
            }
        }
    }

    fn frame(&mut self, delta: f32) {
        self.predictor.frame(delta);

        let owner = self.owner_id();
        if let Some(handle) = self.scene.resolve(owner) {
            self.scene.set_pose(handle, *self.predictor.pose());
        }

        let remote = self.interpolator.tick(delta);
        self.interpolator.apply(&remote, &mut self.scene);
    }
}

/// A player living inside the authority process. Its inputs go straight
/// into the authority queue and its view of other players is the
/// authority's own directory.
pub struct HostPlayer {
    pub predictor: LocalPredictor<ScriptedInput, CharacterMotion, DirectLink>,
    pub interpolator: RemoteInterpolator,
}

/// Per-client numbers reported at the end of a run
#[derive(Clone, Debug, PartialEq)]
pub struct ClientSummary {
    pub owner_id: OwnerId,
    pub hosted: bool,
    pub stats: PredictionStats,
    /// Distance between the predicted pose and the authority's pose
    pub drift: f32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionSummary {
    pub elapsed: f32,
    pub frames: u64,
    pub ticks: u64,
    pub snapshots: u64,
    pub delivered: u64,
    pub clients: Vec<ClientSummary>,
}

impl SessionSummary {
    pub fn corrections(&self) -> u64 {
        self.clients.iter().map(|client| client.stats.corrections).sum()
    }

    pub fn confirmations(&self) -> u64 {
        self.clients
            .iter()
            .map(|client| client.stats.confirmations)
            .sum()
    }
}

/// Authority plus any number of clients running in one process, joined by
/// a simulated network and driven by a single frame delta.
#[derive(Resource)]
pub struct LoopbackSession {
    config: SyncConfig,
    client_motion: CharacterMotion,
    network: LoopbackNetwork,
    clock: TickClock,
    authority: AuthorityTickProcessor<ActorRegistry, CharacterMotion, LoopbackLink>,
    host: Option<HostPlayer>,
    host_tx: Sender<InputSample>,
    host_inputs: Mutex<Receiver<InputSample>>,
    clients: Vec<RemoteClient>,
    elapsed: f32,
    frames: u64,
    snapshots: u64,
}

impl LoopbackSession {
    pub fn new(config: &SyncConfig) -> Self {
        let motion = CharacterMotion::from(&config.motion);
        Self::with_motions(config, motion.clone(), motion)
    }

    /// Clients and authority can be handed different motion models, which
    /// makes every prediction wrong and exercises reconciliation.
    pub fn with_motions(
        config: &SyncConfig,
        client_motion: CharacterMotion,
        authority_motion: CharacterMotion,
    ) -> Self {
        let mut network = LoopbackNetwork::new(&config.loopback);
        let clock = TickClock::from_hz(config.tick_rate_hz);
        let mut authority = AuthorityTickProcessor::new(
            ActorRegistry::new(config.max_actors),
            authority_motion,
            network.authority_link(),
        );
        authority.on_attach(&clock);
        let (host_tx, host_rx) = mpsc::channel();

        info!(
            "loopback session: {} Hz authority, {:.0} ms latency, {:.0} ms jitter",
            config.tick_rate_hz,
            config.loopback.latency * 1000.0,
            config.loopback.jitter * 1000.0
        );

        Self {
            config: config.clone(),
            client_motion,
            network,
            clock,
            authority,
            host: None,
            host_tx,
            host_inputs: Mutex::new(host_rx),
            clients: Vec::new(),
            elapsed: 0.0,
            frames: 0,
            snapshots: 0,
        }
    }

    /// Host a player inside the authority process
    pub fn with_host(mut self, owner: OwnerId, input: ScriptedInput) -> Result<Self> {
        if self.host.is_some() {
            return Err(SyncError::InvalidConfig("session already has a host".into()));
        }

        self.authority = self.authority.with_local_owner(owner)?;
        let handle = self
            .authority
            .directory()
            .lookup(owner)
            .ok_or(SyncError::DirectoryFull(owner))?;

        let predictor = LocalPredictor::new(
            owner,
            handle,
            Pose::spawn_for(owner),
            &self.config,
            input,
            self.client_motion.clone(),
            DirectLink::new(self.host_tx.clone()),
        );
        self.host = Some(HostPlayer {
            predictor,
            interpolator: RemoteInterpolator::from_hz(self.config.tick_rate_hz),
        });
        info!("{} hosted in the authority process", owner);
        Ok(self)
    }

    pub fn add_client(&mut self, owner: OwnerId, input: ScriptedInput) -> Result<()> {
        if self.clients.iter().any(|client| client.owner_id() == owner)
            || self.authority.local_owner() == Some(owner)
        {
            return Err(SyncError::InvalidConfig(format!("{} is already connected", owner)));
        }

        let handle = self.authority.connect(owner)?;
        let predictor = LocalPredictor::new(
            owner,
            handle,
            Pose::spawn_for(owner),
            &self.config,
            input,
            self.client_motion.clone(),
            self.network.client_link(owner),
        );
        self.clients.push(RemoteClient {
            predictor,
            interpolator: RemoteInterpolator::from_hz(self.config.tick_rate_hz),
            scene: ActorRegistry::new(self.config.max_actors),
        });
        info!("{} joined over loopback", owner);
        Ok(())
    }

    pub fn remove_client(&mut self, owner: OwnerId) -> bool {
        let Some(index) = self
            .clients
            .iter()
            .position(|client| client.owner_id() == owner)
        else {
            return false;
        };

        self.clients.remove(index);
        self.network.disconnect(owner);
        self.authority.disconnect(owner);
        for client in &mut self.clients {
            client.interpolator.forget(owner);
            client.scene.release(owner);
        }
        if let Some(host) = self.host.as_mut() {
            host.interpolator.forget(owner);
        }
        info!("{} left", owner);
        true
    }

    pub fn clients(&self) -> &[RemoteClient] {
        &self.clients
    }

    pub fn client(&self, owner: OwnerId) -> Option<&RemoteClient> {
        self.clients.iter().find(|client| client.owner_id() == owner)
    }

    pub fn host(&self) -> Option<&HostPlayer> {
        self.host.as_ref()
    }

    pub fn authority(&self) -> &AuthorityTickProcessor<ActorRegistry, CharacterMotion, LoopbackLink> {
        &self.authority
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// One variable-length frame for every participant, then whatever
    /// authority ticks fall due
    pub fn step_frame(&mut self, delta: f32) -> Vec<TickReport> {
        self.network.advance(delta);

        let inbound = self.authority.transport_mut().receive::<ClientMessage>();
        for message in inbound {
            self.authority.receive(message);
        }

        for client in &mut self.clients {
            client.receive();
            client.frame(delta);
        }

        if let Some(host) = self.host.as_mut() {
            host.predictor.frame(delta);
            let directory = self.authority.directory_mut();
            if let Some(handle) = directory.lookup(host.predictor.owner_id()) {
                directory.set_pose(handle, *host.predictor.pose());
            }
            let remote = host.interpolator.tick(delta);
            host.interpolator.apply(&remote, directory);
        }
        self.drain_host_inputs();

        self.clock.advance(delta);
        let reports = self.authority.pump();
        for report in &reports {
            self.snapshots += report.snapshots.len() as u64;
            if let Some(host) = self.host.as_mut() {
                if let Some(snapshot) = report.local_snapshot {
                    host.predictor.on_authoritative_state(snapshot);
                }
                for info in &report.local_remote_infos {
                    host.interpolator.on_receive(*info);
                }
            }
        }

        self.elapsed += delta;
        self.frames += 1;
        reports
    }

    /// Run fixed client frames until `duration` seconds have passed
    pub fn run_for(&mut self, duration: f32) {
        let delta = self.config.client_timestep;
        let frames = (duration / delta).round() as u64;
        for _ in 0..frames {
            self.step_frame(delta);
        }
    }

    fn drain_host_inputs(&mut self) {
        let samples: Vec<InputSample> = self
            .host_inputs
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .try_iter()
            .collect();
        for sample in samples {
            if let Err(err) = self.authority.enqueue(sample) {
                warn!("dropping hosted input {}: {}", sample.sequence_index, err);
            }
        }
    }

    fn client_summary(
        &self,
        owner: OwnerId,
        hosted: bool,
        stats: &PredictionStats,
        pose: &Pose,
    ) -> ClientSummary {
        let drift = self
            .authority
            .authoritative_pose(owner)
            .map(|authoritative| authoritative.position.distance(pose.position))
            .unwrap_or(0.0);
        ClientSummary {
            owner_id: owner,
            hosted,
            stats: stats.clone(),
            drift,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let mut clients = Vec::new();
        if let Some(host) = &self.host {
            clients.push(self.client_summary(
                host.predictor.owner_id(),
                true,
                host.predictor.stats(),
                host.predictor.pose(),
            ));
        }
        for client in &self.clients {
            clients.push(self.client_summary(
                client.owner_id(),
                false,
                client.predictor.stats(),
                client.predictor.pose(),
            ));
        }

        SessionSummary {
            elapsed: self.elapsed,
            frames: self.frames,
            ticks: self.clock.tick(),
            snapshots: self.snapshots,
            delivered: self.network.delivered(),
            clients,
        }
    }

    pub fn log_summary(&self) {
        let summary = self.summary();
        info!(
            "{:.2}s simulated: {} frames, {} ticks, {} snapshots, {} lines delivered",
            summary.elapsed, summary.frames, summary.ticks, summary.snapshots, summary.delivered
        );
        for client in &summary.clients {
            info!(
                "{}{}: {} frames, {} confirmed, {} corrected ({} replayed), {} overwritten, drift {:.4}",
                client.owner_id,
                if client.hosted { " (host)" } else { "" },
                client.stats.frames,
                client.stats.confirmations,
                client.stats.corrections,
                client.stats.inputs_replayed,
                client.stats.overwritten,
                client.drift
            );
        }
    }
}
