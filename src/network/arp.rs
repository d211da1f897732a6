use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;

use chrono::{DateTime, Duration, Utc};
use pnet::util::MacAddr;
use serde::Serialize;

/// Minimum spacing between two ARP requests for the same address.
pub const REQUEST_INTERVAL_SECS: i64 = 1;
/// ARP requests sent for an address before its queued frames are abandoned.
pub const MAX_REQUESTS: u32 = 5;
/// Frames held per unresolved address; further frames are dropped.
pub const MAX_PENDING_FRAMES: usize = 64;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ArpEntry {
    #[serde(serialize_with = "serialize_mac")]
    pub mac: MacAddr,
    pub added: DateTime<Utc>,
}

fn serialize_mac<S: serde::Serializer>(mac: &MacAddr, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(mac)
}

/// An Ethernet frame waiting for its next hop to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFrame {
    pub frame: Vec<u8>,
    /// Interface the frame leaves through once resolved.
    pub iface: String,
}

/// Outstanding resolution of one next-hop address.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub ip: Ipv4Addr,
    /// Interface the ARP requests go out on.
    pub iface: String,
    pub frames: VecDeque<PendingFrame>,
    pub times_sent: u32,
    pub last_sent: Option<DateTime<Utc>>,
}

impl PendingRequest {
    fn new(ip: Ipv4Addr, iface: &str) -> Self {
        Self {
            ip,
            iface: iface.to_string(),
            frames: VecDeque::new(),
            times_sent: 0,
            last_sent: None,
        }
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        let interval = Duration::seconds(REQUEST_INTERVAL_SECS);
        self.last_sent
            .is_none_or(|sent| now.signed_duration_since(sent) >= interval)
    }
}

/// Outcome of polling a pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAction {
    /// An ARP request should go out on `iface` now.
    Send { iface: String },
    /// A request went out recently, nothing to do.
    Wait,
}

/// Result of one periodic sweep over the cache.
#[derive(Debug, Default)]
pub struct Sweep {
    /// Addresses due for another ARP request, with the interface to use.
    pub resend: Vec<(Ipv4Addr, String)>,
    /// Requests that ran out of attempts. Their frames are undeliverable.
    pub abandoned: Vec<PendingRequest>,
    pub evicted: usize,
}

/// IPv4 to Ethernet address cache plus the queue of frames waiting on a
/// resolution. Lookups hand out copies, never references into the table.
#[derive(Debug)]
pub struct ArpCache {
    entries: HashMap<Ipv4Addr, ArpEntry>,
    requests: HashMap<Ipv4Addr, PendingRequest>,
    timeout: Duration,
}

impl ArpCache {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            requests: HashMap::new(),
            timeout,
        }
    }

    pub fn lookup(&self, ip: Ipv4Addr, now: DateTime<Utc>) -> Option<MacAddr> {
        self.entries
            .get(&ip)
            .filter(|entry| now.signed_duration_since(entry.added) <= self.timeout)
            .map(|entry| entry.mac)
    }

    /// Records a mapping and hands back the request that was waiting on it.
    pub fn insert(
        &mut self,
        ip: Ipv4Addr,
        mac: MacAddr,
        now: DateTime<Utc>,
    ) -> Option<PendingRequest> {
        self.entries.insert(ip, ArpEntry { mac, added: now });
        self.requests.remove(&ip)
    }

    /// Queues `frame` behind the resolution of `ip`, creating the request on
    /// the first miss. Returns false when the queue for `ip` is full.
    pub fn queue(&mut self, ip: Ipv4Addr, frame: Vec<u8>, iface: &str) -> bool {
        let request = self
            .requests
            .entry(ip)
            .or_insert_with(|| PendingRequest::new(ip, iface));
        if request.frames.len() >= MAX_PENDING_FRAMES {
            return false;
        }
        request.frames.push_back(PendingFrame {
            frame,
            iface: iface.to_string(),
        });
        true
    }

    /// Decides whether an ARP request for `ip` should go out now and, if so,
    /// counts it as sent. Never abandons the request; that is left to
    /// [`ArpCache::sweep`].
    pub fn poll_request(&mut self, ip: Ipv4Addr, now: DateTime<Utc>) -> RequestAction {
        match self.requests.get_mut(&ip) {
            Some(request) if request.times_sent < MAX_REQUESTS && request.is_due(now) => {
                request.times_sent += 1;
                request.last_sent = Some(now);
                RequestAction::Send {
                    iface: request.iface.clone(),
                }
            }
            _ => RequestAction::Wait,
        }
    }

    /// Evicts stale entries, picks the requests due for a retry and removes
    /// those that already used up their attempts.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Sweep {
        let mut sweep = Sweep::default();

        let before = self.entries.len();
        let timeout = self.timeout;
        self.entries
            .retain(|_, entry| now.signed_duration_since(entry.added) <= timeout);
        sweep.evicted = before - self.entries.len();

        let mut exhausted = Vec::new();
        for (ip, request) in &mut self.requests {
            if !request.is_due(now) {
                continue;
            }
            if request.times_sent >= MAX_REQUESTS {
                exhausted.push(*ip);
            } else {
                request.times_sent += 1;
                request.last_sent = Some(now);
                sweep.resend.push((*ip, request.iface.clone()));
            }
        }
        for ip in exhausted {
            if let Some(request) = self.requests.remove(&ip) {
                sweep.abandoned.push(request);
            }
        }

        sweep
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Ipv4Addr, &ArpEntry)> {
        self.entries.iter()
    }

    pub fn pending(&self, ip: Ipv4Addr) -> Option<&PendingRequest> {
        self.requests.get(&ip)
    }

    pub fn pending_count(&self) -> usize {
        self.requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOP: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 2);

    #[test]
    fn lookup_respects_timeout() {
        let now = Utc::now();
        let mut cache = ArpCache::new(Duration::seconds(15));
        let mac = MacAddr::new(2, 0, 0, 0, 0, 1);
        cache.insert(HOP, mac, now);

        assert_eq!(cache.lookup(HOP, now + Duration::seconds(10)), Some(mac));
        assert_eq!(cache.lookup(HOP, now + Duration::seconds(16)), None);
    }

    #[test]
    fn request_is_paced_once_per_second() {
        let now = Utc::now();
        let mut cache = ArpCache::new(Duration::seconds(15));
        assert!(cache.queue(HOP, vec![1], "eth0"));
        assert!(cache.queue(HOP, vec![2], "eth0"));

        assert_eq!(
            cache.poll_request(HOP, now),
            RequestAction::Send { iface: "eth0".into() }
        );
        assert_eq!(cache.poll_request(HOP, now), RequestAction::Wait);
        assert_eq!(cache.pending(HOP).map(|r| r.frames.len()), Some(2));
    }

    #[test]
    fn insert_releases_waiting_frames() {
        let now = Utc::now();
        let mut cache = ArpCache::new(Duration::seconds(15));
        cache.queue(HOP, vec![1], "eth0");

        let request = cache.insert(HOP, MacAddr::new(2, 0, 0, 0, 0, 1), now).unwrap();
        assert_eq!(request.frames.len(), 1);
        assert_eq!(cache.pending_count(), 0);
    }

    #[test]
    fn sweep_abandons_after_max_requests() {
        let start = Utc::now();
        let mut cache = ArpCache::new(Duration::seconds(15));
        cache.queue(HOP, vec![1], "eth0");
        cache.poll_request(HOP, start);

        for second in 1..MAX_REQUESTS as i64 {
            let sweep = cache.sweep(start + Duration::seconds(second));
            assert_eq!(sweep.resend.len(), 1);
            assert!(sweep.abandoned.is_empty());
        }

        let sweep = cache.sweep(start + Duration::seconds(MAX_REQUESTS as i64));
        assert!(sweep.resend.is_empty());
        assert_eq!(sweep.abandoned.len(), 1);
        assert_eq!(sweep.abandoned[0].frames[0].frame, vec![1]);
        assert_eq!(cache.pending_count(), 0);
    }

    #[test]
    fn queue_is_bounded() {
        let mut cache = ArpCache::new(Duration::seconds(15));
        for _ in 0..MAX_PENDING_FRAMES {
            assert!(cache.queue(HOP, vec![0], "eth0"));
        }
        assert!(!cache.queue(HOP, vec![0], "eth0"));
    }
}
