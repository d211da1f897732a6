use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::RouterId;

#[derive(Debug, Clone, Serialize)]
pub struct Neighbor {
    pub router_id: RouterId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_hello: DateTime<Utc>,
}

impl Neighbor {
    pub fn is_alive(&self, now: DateTime<Utc>, dead_interval: Duration) -> bool {
        now.signed_duration_since(self.last_hello) <= dead_interval
    }
}

/// Live neighbors, at most one entry per router identifier.
#[derive(Debug, Default)]
pub struct NeighborRegistry {
    neighbors: HashMap<RouterId, Neighbor>,
}

impl NeighborRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a HELLO from `router_id`. Returns true when the neighbor was
    /// not known before.
    pub fn refresh(&mut self, router_id: RouterId, now: DateTime<Utc>) -> bool {
        match self.neighbors.get_mut(&router_id) {
            Some(neighbor) => {
                neighbor.last_hello = now;
                false
            }
            None => {
                self.neighbors.insert(
                    router_id,
                    Neighbor {
                        router_id,
                        last_hello: now,
                    },
                );
                true
            }
        }
    }

    /// Removes every neighbor silent for longer than `dead_interval` and
    /// returns their identifiers.
    pub fn expire(&mut self, now: DateTime<Utc>, dead_interval: Duration) -> Vec<RouterId> {
        let dead: Vec<RouterId> = self
            .neighbors
            .values()
            .filter(|neighbor| !neighbor.is_alive(now, dead_interval))
            .map(|neighbor| neighbor.router_id)
            .collect();

        for router_id in &dead {
            self.neighbors.remove(router_id);
        }

        dead
    }

    pub fn get(&self, router_id: &RouterId) -> Option<&Neighbor> {
        self.neighbors.get(router_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.values()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn repeated_hellos_never_duplicate() {
        let now = Utc::now();
        let mut registry = NeighborRegistry::new();
        let rid = Ipv4Addr::new(10, 0, 0, 2);

        assert!(registry.refresh(rid, now));
        assert!(!registry.refresh(rid, now + Duration::seconds(5)));
        assert!(!registry.refresh(rid, now + Duration::seconds(10)));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&rid).map(|n| n.last_hello), Some(now + Duration::seconds(10)));
    }

    #[test]
    fn expire_removes_only_silent_neighbors() {
        let now = Utc::now();
        let mut registry = NeighborRegistry::new();
        registry.refresh(Ipv4Addr::new(10, 0, 0, 2), now - Duration::seconds(20));
        registry.refresh(Ipv4Addr::new(10, 0, 0, 3), now - Duration::seconds(3));

        let dead = registry.expire(now, Duration::seconds(15));

        assert_eq!(dead, vec![Ipv4Addr::new(10, 0, 0, 2)]);
        assert_eq!(registry.len(), 1);
        assert!(registry.expire(now, Duration::seconds(15)).is_empty());
    }
}
