//! Peer registry: known peers ordered by address, with last-known status and clock.

use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

/// Reachability of a peer as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerStatus {
    Online,
    Offline,
}

impl PeerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PeerStatus::Online => "ONLINE",
            PeerStatus::Offline => "OFFLINE",
        }
    }

    pub fn is_online(self) -> bool {
        self == PeerStatus::Online
    }
}

impl fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status token other than `ONLINE` / `OFFLINE`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown peer status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for PeerStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONLINE" => Ok(PeerStatus::Online),
            "OFFLINE" => Ok(PeerStatus::Offline),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A known peer. `address` (host:port) is the unique key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub address: String,
    pub status: PeerStatus,
    pub clock: u64,
}

impl Peer {
    pub fn new(address: impl Into<String>, status: PeerStatus, clock: u64) -> Self {
        Self {
            address: address.into(),
            status,
            clock,
        }
    }
}

/// Concurrency-safe set of peers sorted by address. At most one entry per address.
///
/// The registry does no freshness comparison of its own: `add` always overwrites.
/// Callers decide whether incoming information is newer before calling it.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<Vec<Peer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert by address. Inserts at the sorted position, or overwrites status and clock.
    pub fn add(&self, peer: Peer) {
        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
        match peers.binary_search_by(|p| p.address.as_str().cmp(&peer.address)) {
            Ok(pos) => {
                peers[pos].status = peer.status;
                peers[pos].clock = peer.clock;
            }
            Err(pos) => peers.insert(pos, peer),
        }
    }

    /// Read-modify-write of one address under a single write lock.
    ///
    /// `f` sees the current entry (if any) and returns the entry to store, or `None`
    /// to leave the registry unchanged. Returns the entry as it was before the call.
    pub fn update<F>(&self, address: &str, f: F) -> Option<Peer>
    where
        F: FnOnce(Option<&Peer>) -> Option<Peer>,
    {
        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
        match peers.binary_search_by(|p| p.address.as_str().cmp(address)) {
            Ok(pos) => {
                let previous = peers[pos].clone();
                if let Some(next) = f(Some(&previous)) {
                    peers[pos].status = next.status;
                    peers[pos].clock = next.clock;
                }
                Some(previous)
            }
            Err(pos) => {
                if let Some(mut next) = f(None) {
                    next.address = address.to_string();
                    peers.insert(pos, next);
                }
                None
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<Peer> {
        let peers = self.peers.read().unwrap_or_else(PoisonError::into_inner);
        peers
            .binary_search_by(|p| p.address.as_str().cmp(address))
            .ok()
            .map(|pos| peers[pos].clone())
    }

    /// Independent copy of every peer, in address order.
    pub fn get_all(&self) -> Vec<Peer> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the status of a known peer, keeping its clock. Returns the previous
    /// status, or `None` when the address is unknown (nothing is inserted).
    pub fn set_status(&self, address: &str, status: PeerStatus) -> Option<PeerStatus> {
        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
        let pos = peers
            .binary_search_by(|p| p.address.as_str().cmp(address))
            .ok()?;
        let previous = peers[pos].status;
        peers[pos].status = status;
        Some(previous)
    }

    pub fn len(&self) -> usize {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get() {
        let reg = PeerRegistry::new();
        let p = Peer::new("127.0.0.1:9001", PeerStatus::Offline, 0);
        reg.add(p.clone());
        assert_eq!(reg.get("127.0.0.1:9001"), Some(p));
        assert_eq!(reg.get("127.0.0.1:9002"), None);
    }

    #[test]
    fn second_add_overwrites() {
        let reg = PeerRegistry::new();
        reg.add(Peer::new("10.0.0.1:5000", PeerStatus::Online, 9));
        // Lower clock still wins: the registry itself is last-write-wins.
        reg.add(Peer::new("10.0.0.1:5000", PeerStatus::Offline, 3));
        let got = reg.get("10.0.0.1:5000").unwrap();
        assert_eq!(got.status, PeerStatus::Offline);
        assert_eq!(got.clock, 3);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn snapshot_is_sorted_and_independent() {
        let reg = PeerRegistry::new();
        for addr in ["127.0.0.1:9003", "127.0.0.1:9001", "127.0.0.1:9002"] {
            reg.add(Peer::new(addr, PeerStatus::Offline, 0));
        }
        let mut snapshot = reg.get_all();
        let addrs: Vec<&str> = snapshot.iter().map(|p| p.address.as_str()).collect();
        assert_eq!(addrs, ["127.0.0.1:9001", "127.0.0.1:9002", "127.0.0.1:9003"]);

        snapshot[0].status = PeerStatus::Online;
        assert_eq!(
            reg.get("127.0.0.1:9001").unwrap().status,
            PeerStatus::Offline
        );
    }

    #[test]
    fn set_status_keeps_clock() {
        let reg = PeerRegistry::new();
        reg.add(Peer::new("a:1", PeerStatus::Online, 12));
        assert_eq!(
            reg.set_status("a:1", PeerStatus::Offline),
            Some(PeerStatus::Online)
        );
        assert_eq!(reg.get("a:1").unwrap().clock, 12);
        assert_eq!(reg.set_status("b:2", PeerStatus::Online), None);
        assert!(reg.get("b:2").is_none());
    }

    #[test]
    fn update_inserts_overwrites_or_keeps() {
        let reg = PeerRegistry::new();
        let before = reg.update("a:1", |known| {
            assert!(known.is_none());
            Some(Peer::new("a:1", PeerStatus::Online, 4))
        });
        assert_eq!(before, None);

        // Returning None leaves the entry alone.
        let before = reg.update("a:1", |_| None);
        assert_eq!(before.map(|p| p.clock), Some(4));
        assert_eq!(reg.get("a:1").unwrap().clock, 4);

        reg.update("a:1", |known| {
            known.map(|k| Peer::new(k.address.clone(), PeerStatus::Offline, k.clock + 1))
        });
        let got = reg.get("a:1").unwrap();
        assert_eq!((got.status, got.clock), (PeerStatus::Offline, 5));

        assert_eq!(reg.update("b:2", |_| None), None);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn concurrent_max_updates_keep_largest_clock() {
        let reg = PeerRegistry::new();
        std::thread::scope(|s| {
            for t in 0..8u64 {
                let reg = &reg;
                s.spawn(move || {
                    for i in 0..500u64 {
                        let clock = i * 8 + t;
                        reg.update("a:1", |known| {
                            let kept = known.map_or(clock, |k| k.clock.max(clock));
                            Some(Peer::new("a:1", PeerStatus::Online, kept))
                        });
                    }
                });
            }
        });
        assert_eq!(reg.get("a:1").unwrap().clock, 499 * 8 + 7);
    }

    #[test]
    fn status_parse_and_display() {
        assert_eq!("ONLINE".parse::<PeerStatus>(), Ok(PeerStatus::Online));
        assert_eq!("OFFLINE".parse::<PeerStatus>(), Ok(PeerStatus::Offline));
        assert!("online".parse::<PeerStatus>().is_err());
        assert_eq!(PeerStatus::Online.to_string(), "ONLINE");
    }
}
