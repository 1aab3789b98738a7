use std::sync::Arc;

use log::{debug, trace};
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::client::broker::{is_seed_id, Broker, BrokerId};
use crate::errors::{ErrorKind, Result};
use crate::protocol::BrokerMetadata;

struct Inner {
    brokers: std::collections::HashMap<BrokerId, Broker>,
    rotation: Vec<BrokerId>,
    rotation_index: usize,
    stopped: bool,
}

/// Owns `broker_id -> Broker` and the shuffled any-broker rotation (§4.3).
pub struct BrokerRegistry {
    inner: RwLock<Inner>,
}

impl BrokerRegistry {
    pub fn new(seeds: Vec<Broker>) -> Self {
        let rotation: Vec<BrokerId> = seeds.iter().map(Broker::id).collect();
        let mut brokers = std::collections::HashMap::new();
        for b in seeds {
            brokers.insert(b.id(), b);
        }
        BrokerRegistry {
            inner: RwLock::new(Inner {
                brokers,
                rotation,
                rotation_index: 0,
                stopped: false,
            }),
        }
    }

    /// Next broker in the rotation; reshuffles and resets the index once it
    /// wraps. Uncontested calls are O(1); concurrent callers serialize on
    /// the write lock (§4.3, §5).
    pub fn any_broker(&self) -> Result<Broker> {
        let mut inner = self.inner.write();
        if inner.rotation.is_empty() {
            return Err(ErrorKind::ClientClosed.into());
        }
        if inner.rotation_index >= inner.rotation.len() {
            inner.rotation_index = 0;
        }
        if inner.rotation_index == 0 {
            inner.rotation.shuffle(&mut thread_rng());
            trace!("any_broker: rotation exhausted, reshuffled {} broker(s)", inner.rotation.len());
        }
        let id = inner.rotation[inner.rotation_index];
        inner.rotation_index += 1;
        trace!("any_broker: rotation index advanced to {}, picked broker #{}", inner.rotation_index, id);
        inner
            .brokers
            .get(&id)
            .cloned()
            .ok_or_else(|| ErrorKind::UnknownBroker(id).into())
    }

    pub fn broker_or_err(&self, id: BrokerId) -> Result<Broker> {
        self.inner
            .read()
            .brokers
            .get(&id)
            .cloned()
            .ok_or_else(|| ErrorKind::UnknownBroker(id).into())
    }

    pub fn all_brokers(&self) -> Vec<Broker> {
        self.inner.read().brokers.values().cloned().collect()
    }

    /// Brokers with a real (non-seed) id, as reported by the cluster.
    pub fn discovered_brokers(&self) -> Vec<Broker> {
        self.inner
            .read()
            .brokers
            .values()
            .filter(|b| !b.is_seed())
            .cloned()
            .collect()
    }

    pub fn seed_brokers(&self) -> Vec<Broker> {
        self.inner
            .read()
            .brokers
            .values()
            .filter(|b| b.is_seed())
            .cloned()
            .collect()
    }

    /// Reconciles the registry against a fresh broker list from a metadata
    /// response: new ids are created by the caller and inserted, ids whose
    /// address changed are replaced (the old instance stopped), real ids no
    /// longer present are dropped (and stopped); seeds are always retained.
    /// A no-op once the registry has entered shutdown (§4.3).
    pub fn update_brokers(&self, fresh: Vec<Broker>) {
        let mut inner = self.inner.write();
        if inner.stopped {
            return;
        }

        let fresh_ids: std::collections::HashSet<BrokerId> =
            fresh.iter().map(Broker::id).collect();

        let stale: Vec<BrokerId> = inner
            .brokers
            .values()
            .filter(|b| !is_seed_id(b.id()) && !fresh_ids.contains(&b.id()))
            .map(Broker::id)
            .collect();
        for id in stale {
            if let Some(old) = inner.brokers.remove(&id) {
                debug!("update_brokers: broker #{} no longer in cluster, stopped", id);
                old.stop_forever();
            }
        }

        for new_broker in fresh {
            match inner.brokers.get(&new_broker.id()) {
                Some(existing) if existing.same_address(new_broker.host(), new_broker.port()) => {
                    // unchanged; keep the live connection.
                }
                Some(existing) => {
                    debug!(
                        "update_brokers: broker #{} address changed {} -> {}, replaced",
                        new_broker.id(),
                        existing.addr(),
                        new_broker.addr()
                    );
                    existing.stop_forever();
                    inner.brokers.insert(new_broker.id(), new_broker);
                }
                None => {
                    debug!(
                        "update_brokers: broker #{} ({}) created",
                        new_broker.id(),
                        new_broker.addr()
                    );
                    inner.brokers.insert(new_broker.id(), new_broker);
                }
            }
        }

        inner.rotation = inner.brokers.keys().copied().collect();
        if inner.rotation_index > inner.rotation.len() {
            inner.rotation_index = 0;
        }
    }

    /// §4.7 step 4: prevent further resurrection, stop every broker, and
    /// wake their queues so parked producer/consumer tasks observe shutdown.
    pub fn shutdown(&self) {
        let mut inner = self.inner.write();
        inner.stopped = true;
        debug!("registry shutdown: stopping {} broker(s)", inner.brokers.len());
        for broker in inner.brokers.values() {
            broker.stop_forever();
            broker.wake_queues();
        }
        inner.rotation.clear();
        inner.rotation_index = 0;
    }
}

/// Builds the `Broker` the registry should hold for a `Metadata` response
/// entry; connection construction is left to the caller (out of scope).
pub fn broker_from_metadata(
    meta: &BrokerMetadata,
    conn: Arc<dyn crate::client::BrokerConnection>,
) -> Broker {
    Broker::new(meta.id, meta.host.clone(), meta.port, conn)
}
