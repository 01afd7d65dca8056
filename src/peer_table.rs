use crate::config::RudpConfig;
use crate::host::ReliableTransportHost;
use crate::sequence_number::SequenceNumber;
use crate::transmit::{Clock, TransmitSink};
use anyhow::{anyhow, bail};
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, info};

/// All reliable channels of a node, keyed by peer. The peers share configuration and clock,
///  each has its own transmit sink.
pub struct ReliablePeers<K> {
    config: Arc<RudpConfig>,
    clock: Arc<dyn Clock>,
    hosts: FxHashMap<K, ReliableTransportHost>,
}

impl<K: Eq + Hash + Clone + Debug> ReliablePeers<K> {
    pub fn new(config: Arc<RudpConfig>, clock: Arc<dyn Clock>) -> anyhow::Result<ReliablePeers<K>> {
        config.validate()?;
        Ok(ReliablePeers {
            config,
            clock,
            hosts: FxHashMap::default(),
        })
    }

    pub fn add_peer(&mut self, key: K, start_sequence: SequenceNumber, sink: Arc<dyn TransmitSink>) -> anyhow::Result<()> {
        match self.hosts.entry(key) {
            Entry::Occupied(e) => bail!("peer {:?} is already registered", e.key()),
            Entry::Vacant(e) => {
                info!("adding reliable channel to peer {:?}", e.key());
                let host = ReliableTransportHost::new(self.config.clone(), start_sequence, sink, self.clock.clone())?;
                e.insert(host);
                Ok(())
            }
        }
    }

    /// returns `false` if there was no such peer
    pub fn remove_peer(&mut self, key: &K) -> bool {
        match self.hosts.remove(key) {
            Some(host) => {
                info!("removing reliable channel to peer {:?}", key);
                host.dispose();
                true
            }
            None => false,
        }
    }

    pub fn send(&mut self, key: &K, data: &[u8]) -> anyhow::Result<()> {
        self.host_mut(key)
            .ok_or_else(|| anyhow!("sending to unknown peer {:?}", key))?
            .send(data);
        Ok(())
    }

    /// Datagrams from unknown peers are dropped. Malformed datagrams are returned as errors so
    ///  the owner can disconnect the peer.
    pub fn on_datagram(&mut self, key: &K, datagram: &[u8]) -> anyhow::Result<()> {
        match self.hosts.get_mut(key) {
            Some(host) => host.take_received_datagram(datagram),
            None => {
                debug!("received datagram from unknown peer {:?} - dropping", key);
                Ok(())
            }
        }
    }

    pub fn tick_all(&mut self, elapsed: f64) {
        for host in self.hosts.values_mut() {
            host.tick(elapsed);
        }
    }

    /// the peers that have not acknowledged a frame for more than `max_age` seconds
    pub fn peers_exceeding_resend_age(&self, max_age: f64) -> Vec<K> {
        self.hosts.iter()
            .filter(|(_, host)| host.longest_pending_resend_age() > max_age)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn host(&self, key: &K) -> Option<&ReliableTransportHost> {
        self.hosts.get(key)
    }

    pub fn host_mut(&mut self, key: &K) -> Option<&mut ReliableTransportHost> {
        self.hosts.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{ManualClock, RecordingSink};
    use crate::transmit::MockTransmitSink;
    use std::net::SocketAddr;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn peers(clock: &ManualClock) -> ReliablePeers<SocketAddr> {
        ReliablePeers::new(Arc::new(RudpConfig::default()), Arc::new(clock.clone())).unwrap()
    }

    #[test]
    fn test_add_remove() {
        let clock = ManualClock::new(0.0);
        let mut peers = peers(&clock);
        assert!(peers.is_empty());

        peers.add_peer(addr("1.2.3.4:5"), SequenceNumber::ZERO, Arc::new(RecordingSink::new())).unwrap();
        peers.add_peer(addr("1.2.3.4:6"), SequenceNumber::ZERO, Arc::new(RecordingSink::new())).unwrap();
        assert!(peers.add_peer(addr("1.2.3.4:5"), SequenceNumber::ZERO, Arc::new(RecordingSink::new())).is_err());
        assert_eq!(peers.len(), 2);

        assert!(peers.remove_peer(&addr("1.2.3.4:5")));
        assert!(!peers.remove_peer(&addr("1.2.3.4:5")));
        assert_eq!(peers.len(), 1);
        assert!(peers.host(&addr("1.2.3.4:6")).is_some());
        assert!(peers.host(&addr("1.2.3.4:5")).is_none());
    }

    #[test]
    fn test_invalid_config() {
        let config = RudpConfig {
            min_resend_rate: -1.0,
            ..RudpConfig::default()
        };
        assert!(ReliablePeers::<u32>::new(Arc::new(config), Arc::new(ManualClock::new(0.0))).is_err());
    }

    #[test]
    fn test_send_and_tick() {
        let clock = ManualClock::new(0.0);
        let mut peers = peers(&clock);

        let sink_a = RecordingSink::new();
        let mut sink_b = MockTransmitSink::new();
        sink_b.expect_transmit()
            .never();

        peers.add_peer(addr("10.0.0.1:1"), SequenceNumber::ZERO, Arc::new(sink_a.clone())).unwrap();
        peers.add_peer(addr("10.0.0.2:1"), SequenceNumber::ZERO, Arc::new(sink_b)).unwrap();

        peers.send(&addr("10.0.0.1:1"), b"for a").unwrap();
        assert!(peers.send(&addr("10.0.0.3:1"), b"for nobody").is_err());

        clock.advance(0.1);
        peers.tick_all(0.1);
        assert_eq!(sink_a.num_sent(), 1);
    }

    #[test]
    fn test_on_datagram() {
        let clock = ManualClock::new(0.0);
        let mut peers = peers(&clock);
        peers.add_peer(addr("10.0.0.1:1"), SequenceNumber::ZERO, Arc::new(RecordingSink::new())).unwrap();

        peers.on_datagram(&addr("10.0.0.1:1"), &[1, 0,0,0,0, 3, b'a', b'b', b'c']).unwrap();
        assert!(peers.on_datagram(&addr("10.0.0.1:1"), &[9, 9, 9]).is_err());
        peers.on_datagram(&addr("10.0.0.9:1"), &[1, 0,0,0,0, 1, b'x']).unwrap();

        let host = peers.host_mut(&addr("10.0.0.1:1")).unwrap();
        assert_eq!(host.reassembled_stream().as_slice(), b"abc");
    }

    #[test]
    fn test_peers_exceeding_resend_age() {
        let clock = ManualClock::new(0.0);
        let mut peers = peers(&clock);
        for port in [1, 2, 3] {
            peers.add_peer(addr(&format!("10.0.0.1:{}", port)), SequenceNumber::ZERO, Arc::new(RecordingSink::new())).unwrap();
        }

        peers.send(&addr("10.0.0.1:1"), b"never acked").unwrap();
        clock.advance(0.1);
        peers.tick_all(0.1);

        peers.send(&addr("10.0.0.1:2"), b"never acked either").unwrap();
        clock.advance(5.0);
        peers.tick_all(5.0);

        clock.advance(5.0);
        assert_eq!(peers.peers_exceeding_resend_age(8.0), vec![addr("10.0.0.1:1")]);

        let mut exceeding = peers.peers_exceeding_resend_age(1.0);
        exceeding.sort();
        assert_eq!(exceeding, vec![addr("10.0.0.1:1"), addr("10.0.0.1:2")]);

        assert!(peers.peers_exceeding_resend_age(60.0).is_empty());
    }
}
