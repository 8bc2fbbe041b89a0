use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, Weak};

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    senders: Vec<(u64, Sender<u64>)>,
}

/// Fixed-rate tick source driven by variable frame deltas.
///
/// Listeners subscribe and receive tick numbers over a channel; the
/// returned [`TickSubscription`] deregisters itself when dropped.
pub struct TickClock {
    interval: f64,
    accumulator: f64,
    tick: u64,
    subscribers: Arc<Mutex<Subscribers>>,
}

impl TickClock {
    pub fn new(interval: f32) -> Self {
        Self {
            interval: f64::from(interval),
            accumulator: 0.0,
            tick: 0,
            subscribers: Arc::new(Mutex::new(Subscribers::default())),
        }
    }

    pub fn from_hz(hz: f32) -> Self {
        Self::new(1.0 / hz)
    }

    pub fn interval(&self) -> f32 {
        self.interval as f32
    }

    /// Number of ticks fired so far
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().senders.len()
    }

    pub fn subscribe(&self) -> TickSubscription {
        let (sender, receiver) = mpsc::channel();
        let mut subscribers = self.lock();
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.senders.push((id, sender));

        TickSubscription {
            id,
            ticks: Mutex::new(receiver),
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Accumulate frame time and fire one tick per elapsed interval
    pub fn advance(&mut self, delta: f32) -> u32 {
        self.accumulator += f64::from(delta);
        let mut fired = 0;

        while self.accumulator >= self.interval {
            self.accumulator -= self.interval;
            self.tick += 1;
            fired += 1;

            let tick = self.tick;
            // Listeners that went away without dropping their guard are pruned
            self.lock()
                .senders
                .retain(|(_, sender)| sender.send(tick).is_ok());
        }

        fired
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration with a [`TickClock`]; dropping it unsubscribes.
pub struct TickSubscription {
    id: u64,
    ticks: Mutex<Receiver<u64>>,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl TickSubscription {
    /// Tick numbers fired since the last call, oldest first
    pub fn drain(&mut self) -> Vec<u64> {
        let receiver = self.ticks.get_mut().unwrap_or_else(PoisonError::into_inner);
        receiver.try_iter().collect()
    }
}

impl Drop for TickSubscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            let mut subscribers = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            subscribers.senders.retain(|(id, _)| *id != self.id);
        }
    }
}
