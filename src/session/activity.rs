use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use crate::device::types::DeviceId;
use crate::midi::decoder::{DomainMessage, SequenceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityEffect {
    /// Move arrived messages into the visible set.
    Arrival,
    /// Hand the visible set to the render layer.
    Render,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThrottleKey {
    pub device_id: DeviceId,
    pub effect: ActivityEffect,
}

/// Book keeping of a timer based throttle: the first request for a key opens a window and asks
/// the caller to schedule a timer, later requests inside the window are coalesced, and the key
/// fires exactly once when the timer ends.
#[derive(Debug)]
pub struct Throttle<K> {
    pending: HashSet<K>,
}

impl<K: Eq + Hash + Clone> Throttle<K> {
    pub fn new() -> Self {
        Throttle { pending: HashSet::new() }
    }

    /// Returns true when the caller must schedule a timer for `key`.
    pub fn request(&mut self, key: &K) -> bool {
        self.pending.insert(key.clone())
    }

    /// Returns true when `key` had an open window, which is now closed.
    pub fn fire(&mut self, key: &K) -> bool {
        self.pending.remove(key)
    }

    fn is_pending(&self, key: &K) -> bool {
        self.pending.contains(key)
    }
}

impl<K: Eq + Hash + Clone> Default for Throttle<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Coalesces bursts of messages into rate limited renders of per device activity sets.
/// The methods return the throttle keys the caller has to schedule a timer for.
#[derive(Debug, Default)]
pub struct ActivityAggregator {
    arrived: HashMap<DeviceId, Vec<DomainMessage>>,
    visible: HashMap<DeviceId, BTreeMap<SequenceId, DomainMessage>>,
    throttle: Throttle<ThrottleKey>,
}

impl ActivityAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn request(&mut self, device_id: &DeviceId, effect: ActivityEffect) -> Option<ThrottleKey> {
        let key = ThrottleKey { device_id: device_id.clone(), effect };
        self.throttle.request(&key).then_some(key)
    }

    /// Both windows open on the first message, so an isolated hit renders one interval later.
    pub fn enqueue(&mut self, message: DomainMessage) -> Vec<ThrottleKey> {
        let device_id = message.device_id.clone();
        self.arrived.entry(device_id.clone()).or_default().push(message);

        [ActivityEffect::Arrival, ActivityEffect::Render]
            .into_iter()
            .filter_map(|effect| self.request(&device_id, effect))
            .collect()
    }

    /// Move arrived messages into the visible set. Returns true when anything was added.
    pub fn commit(&mut self, device_id: &DeviceId) -> bool {
        let Some(arrived) = self.arrived.remove(device_id) else {
            return false;
        };

        let visible = self.visible.entry(device_id.clone()).or_default();
        let mut added = false;
        for message in arrived {
            added |= visible.insert(message.sequence_id, message).is_none();
        }
        added
    }

    /// Dispatch a fired timer. Returns the entries to render when the render window closed,
    /// and a follow up throttle key when the arrival window closed after the render did.
    pub fn fire(&mut self, key: &ThrottleKey) -> (Option<Vec<DomainMessage>>, Option<ThrottleKey>) {
        if !self.throttle.fire(key) {
            return (None, None);
        }

        let device_id = &key.device_id;
        match key.effect {
            ActivityEffect::Arrival => {
                let render = ThrottleKey { device_id: device_id.clone(), effect: ActivityEffect::Render };
                if self.commit(device_id) && !self.throttle.is_pending(&render) {
                    (None, self.request(device_id, ActivityEffect::Render))
                } else {
                    (None, None)
                }
            },
            ActivityEffect::Render => {
                self.commit(device_id);
                (Some(self.entries(device_id)), None)
            },
        }
    }

    /// Drop everything kept for a device that went away. Pending timers fire into nothing.
    pub fn forget(&mut self, device_id: &DeviceId) {
        self.arrived.remove(device_id);
        self.visible.remove(device_id);
        self.throttle.pending.retain(|key| key.device_id != *device_id);
    }

    /// The render layer reports that the pulse for `sequence_id` ended.
    pub fn expire(&mut self, device_id: &DeviceId, sequence_id: SequenceId) -> Option<ThrottleKey> {
        let removed = self.visible
            .get_mut(device_id)
            .and_then(|visible| visible.remove(&sequence_id))
            .is_some();

        if removed {
            self.request(device_id, ActivityEffect::Render)
        } else {
            None
        }
    }

    pub fn entries(&self, device_id: &DeviceId) -> Vec<DomainMessage> {
        self.visible
            .get(device_id)
            .map(|visible| visible.values().cloned().collect())
            .unwrap_or_default()
    }
}
