//! Endpoint identity, the concurrent endpoint set and listing filters.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use parking_lot::RwLock;

use crate::hashing::stable_hash;
use crate::ydb::discovery as wire;

pub(crate) const SERVICE_NAME_QUERY: &str = "query_service";

/// Uniquely identifies one reachable endpoint of the cluster.
///
/// Equality and hashing use the four identity fields; `address_hash` is a
/// process-stable id derived from `address:port` and doubles as the
/// connection id inside the balancer.
#[derive(Debug, Clone)]
pub struct EndpointInfo {
    pub node_id: u32,
    pub address: String,
    pub port: u16,
    pub location: String,
    pub address_hash: u64,
}

impl EndpointInfo {
    pub(crate) fn from_wire(ep: &wire::EndpointInfo) -> Self {
        let address_hash = stable_hash(&format!("{}:{}", ep.address, ep.port));
        Self {
            node_id: ep.node_id,
            address: ep.address.clone(),
            port: ep.port as u16,
            location: ep.location.clone(),
            address_hash,
        }
    }

    pub fn full_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl PartialEq for EndpointInfo {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id
            && self.address == other.address
            && self.port == other.port
            && self.location == other.location
    }
}

impl Eq for EndpointInfo {}

impl Hash for EndpointInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node_id.hash(state);
        self.address.hash(state);
        self.port.hash(state);
        self.location.hash(state);
    }
}

/// Differential message about changes in the cluster view. Consumed by the
/// dispatcher to adjust the balancing grid. Never emitted empty.
#[derive(Debug, Clone, Default)]
pub struct Announcement {
    pub add: Vec<EndpointInfo>,
    pub del: Vec<EndpointInfo>,
}

impl Announcement {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.del.is_empty()
    }
}

/// Thread-safe snapshot of the currently known endpoints. Mutation is an
/// atomic swap with a newly constructed set.
#[derive(Debug, Default)]
pub struct EndpointSet {
    set: RwLock<HashSet<EndpointInfo>>,
}

impl EndpointSet {
    pub fn snapshot(&self) -> Vec<EndpointInfo> {
        self.set.read().iter().cloned().collect()
    }

    /// True when `endpoints` carries exactly the identities already known.
    pub fn matches(&self, endpoints: &[EndpointInfo]) -> bool {
        let set = self.set.read();
        let incoming: HashSet<&EndpointInfo> = endpoints.iter().collect();
        if incoming.len() != set.len() {
            return false;
        }
        incoming.iter().all(|ep| set.contains(*ep))
    }

    /// Replaces the set with `endpoints` and returns the diff against the
    /// previous state.
    pub fn replace(&self, endpoints: Vec<EndpointInfo>) -> Announcement {
        let fresh: HashSet<EndpointInfo> = endpoints.into_iter().collect();

        let mut set = self.set.write();
        let add = fresh.difference(&set).cloned().collect();
        let del = set.difference(&fresh).cloned().collect();
        *set = fresh;

        Announcement { add, del }
    }

    pub fn len(&self) -> usize {
        self.set.read().len()
    }
}

/// Listing filter: `require` must hold for an endpoint to be usable at all,
/// `prefer` splits the usable ones into preferred and fallback groups.
#[derive(Debug, Default)]
pub struct Filter {
    require_services: Vec<String>,
    require_locations: Vec<String>,
    prefer_locations: Vec<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query_service(mut self) -> Self {
        self.require_services.push(SERVICE_NAME_QUERY.to_string());
        self
    }

    #[allow(dead_code)]
    pub fn require_locations(mut self, locations: Vec<String>) -> Self {
        self.require_locations = locations;
        self
    }

    pub fn prefer_locations(mut self, locations: Vec<String>) -> Self {
        self.prefer_locations = locations;
        self
    }

    fn matches_required(&self, ep: &wire::EndpointInfo) -> bool {
        let services: HashSet<&str> = ep.service.iter().map(String::as_str).collect();
        if !self
            .require_services
            .iter()
            .all(|svc| services.contains(svc.as_str()))
        {
            return false;
        }
        location_matches(&ep.location, &self.require_locations)
    }

    fn matches_preferred(&self, ep: &wire::EndpointInfo) -> bool {
        location_matches(&ep.location, &self.prefer_locations)
    }

    /// Splits a listing into `(preferred, required-but-not-preferred)`,
    /// dropping endpoints that fail the `require` rules.
    pub fn split(
        &self,
        endpoints: &[wire::EndpointInfo],
    ) -> (Vec<EndpointInfo>, Vec<EndpointInfo>) {
        let mut preferred = Vec::new();
        let mut fallback = Vec::new();
        for ep in endpoints {
            if !self.matches_required(ep) {
                continue;
            }
            let info = EndpointInfo::from_wire(ep);
            if self.matches_preferred(ep) {
                preferred.push(info);
            } else {
                fallback.push(info);
            }
        }
        (preferred, fallback)
    }
}

fn location_matches(location: &str, locations: &[String]) -> bool {
    locations.is_empty() || locations.iter().any(|loc| loc == location)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_ep(node_id: u32, address: &str, location: &str, services: &[&str]) -> wire::EndpointInfo {
        wire::EndpointInfo {
            address: address.to_string(),
            port: 2136,
            load_factor: 0.0,
            ssl: false,
            service: services.iter().map(|s| s.to_string()).collect(),
            location: location.to_string(),
            node_id,
        }
    }

    fn ep(node_id: u32, address: &str) -> EndpointInfo {
        EndpointInfo::from_wire(&wire_ep(node_id, address, "zone", &[SERVICE_NAME_QUERY]))
    }

    #[test]
    fn test_identity_equality() {
        let a = ep(1, "node-a");
        let mut b = a.clone();
        b.address_hash = 0; // derived field does not participate in identity
        assert_eq!(a, b);

        let c = ep(2, "node-a");
        assert_ne!(a, c);
    }

    /// The diff sequence from a changing cluster: `{A}` → `{A,B}` announces
    /// `add={B}`; `{B}` announces `del={A}`; `{B}` again announces nothing.
    #[test]
    fn test_diff_sequence() {
        let set = EndpointSet::default();

        let ann = set.replace(vec![ep(1, "a")]);
        assert_eq!(ann.add.len(), 1);
        assert!(ann.del.is_empty());

        assert!(!set.matches(&[ep(1, "a"), ep(2, "b")]));
        let ann = set.replace(vec![ep(1, "a"), ep(2, "b")]);
        assert_eq!(ann.add, vec![ep(2, "b")]);
        assert!(ann.del.is_empty());

        let ann = set.replace(vec![ep(2, "b")]);
        assert!(ann.add.is_empty());
        assert_eq!(ann.del, vec![ep(1, "a")]);

        assert!(set.matches(&[ep(2, "b")]));
    }

    #[test]
    fn test_matches_identical_set() {
        let set = EndpointSet::default();
        set.replace(vec![ep(1, "a"), ep(2, "b")]);

        assert!(set.matches(&[ep(2, "b"), ep(1, "a")]));
        assert!(!set.matches(&[ep(1, "a")]));
        assert!(!set.matches(&[ep(1, "a"), ep(2, "b"), ep(3, "c")]));
    }

    #[test]
    fn test_announcement_add_del_disjoint() {
        let set = EndpointSet::default();
        set.replace(vec![ep(1, "a"), ep(2, "b")]);
        let ann = set.replace(vec![ep(2, "b"), ep(3, "c")]);

        assert_eq!(ann.add, vec![ep(3, "c")]);
        assert_eq!(ann.del, vec![ep(1, "a")]);
        for added in &ann.add {
            assert!(!ann.del.contains(added));
        }
    }

    #[test]
    fn test_filter_requires_query_service() {
        let filter = Filter::new().with_query_service();
        let listing = vec![
            wire_ep(1, "a", "zone-a", &[SERVICE_NAME_QUERY]),
            wire_ep(2, "b", "zone-a", &["table_service"]),
        ];
        let (preferred, fallback) = filter.split(&listing);
        assert_eq!(preferred.len(), 1);
        assert_eq!(preferred[0].node_id, 1);
        assert!(fallback.is_empty());
    }

    #[test]
    fn test_filter_prefers_locations() {
        let filter = Filter::new()
            .with_query_service()
            .prefer_locations(vec!["zone-b".to_string()]);
        let listing = vec![
            wire_ep(1, "a", "zone-a", &[SERVICE_NAME_QUERY]),
            wire_ep(2, "b", "zone-b", &[SERVICE_NAME_QUERY]),
        ];
        let (preferred, fallback) = filter.split(&listing);
        assert_eq!(preferred.len(), 1);
        assert_eq!(preferred[0].node_id, 2);
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].node_id, 1);
    }

    #[test]
    fn test_filter_required_locations() {
        let filter = Filter::new()
            .with_query_service()
            .require_locations(vec!["zone-a".to_string()]);
        let listing = vec![
            wire_ep(1, "a", "zone-a", &[SERVICE_NAME_QUERY]),
            wire_ep(2, "b", "zone-b", &[SERVICE_NAME_QUERY]),
        ];
        let (preferred, fallback) = filter.split(&listing);
        assert_eq!(preferred.len(), 1);
        assert_eq!(preferred[0].node_id, 1);
        assert!(fallback.is_empty());
    }
}
