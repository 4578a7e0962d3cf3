//! Pool allocator: unique IPv4 blocks and AS numbers handed out from bounded pools.
//!
//! Each pool sits behind its own `tokio::sync::Mutex`, so allocations against one
//! pool are serialized while different pools proceed independently. Expansions take
//! a [`PoolLease`]: owned guards over every pool they need (acquired in sorted id
//! order), allocating into private copies that only replace the live state on
//! [`PoolLease::commit`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{AssignedValue, Assignment};
use crate::utils;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("pool {pool} is exhausted")]
    PoolExhausted { pool: String },
    #[error("unknown pool: {pool}")]
    UnknownPool { pool: String },
    #[error("invalid size hint /{size_hint} for pool {pool}")]
    InvalidSizeHint { pool: String, size_hint: u8 },
    #[error("invalid pool {pool}: {message}")]
    InvalidPool { pool: String, message: String },
}

/// Range a pool hands values out of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolRange {
    Prefix { prefix: String },
    Asn { start: u32, end: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDefinition {
    pub id: String,
    #[serde(flatten)]
    pub range: PoolRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
struct Issued {
    end: u32,
    identifier: String,
    value: AssignedValue,
}

/// PoolResource is a pool definition plus everything issued from it
#[derive(Debug, Clone)]
pub struct PoolResource {
    definition: PoolDefinition,
    start: u32,
    end: u32,
    prefix_length: Option<u8>,
    issued: BTreeMap<u32, Issued>,
    by_identifier: HashMap<String, u32>,
    cursor: u32,
}

impl PoolResource {
    pub fn new(definition: PoolDefinition) -> Result<Self, PoolError> {
        let (start, end, prefix_length) = match &definition.range {
            PoolRange::Prefix { prefix } => {
                let (net, bcast, len) =
                    utils::parse_cidr(prefix).map_err(|message| PoolError::InvalidPool {
                        pool: definition.id.clone(),
                        message,
                    })?;
                (net, bcast, Some(len))
            }
            PoolRange::Asn { start, end } => {
                if start > end || *start == 0 {
                    return Err(PoolError::InvalidPool {
                        pool: definition.id.clone(),
                        message: format!("invalid ASN range {}-{}", start, end),
                    });
                }
                (*start, *end, None)
            }
        };

        Ok(PoolResource {
            definition,
            start,
            end,
            prefix_length,
            issued: BTreeMap::new(),
            by_identifier: HashMap::new(),
            cursor: start,
        })
    }

    /// Rebuild a pool from its definition and previously persisted assignments
    pub fn with_assignments(
        definition: PoolDefinition,
        assignments: Vec<Assignment>,
    ) -> Result<Self, PoolError> {
        let mut pool = Self::new(definition)?;
        for assignment in assignments {
            let (start, end) = match assignment.value {
                AssignedValue::Prefix { network, prefix_length } => {
                    (network, (network as u64 + utils::block_size(prefix_length) - 1) as u32)
                }
                AssignedValue::Asn { asn } => (asn, asn),
            };
            if start < pool.start || end > pool.end {
                return Err(PoolError::InvalidPool {
                    pool: pool.id().to_string(),
                    message: format!("assignment {} lies outside the pool", assignment),
                });
            }
            pool.record(start, end, assignment.identifier, assignment.value);
        }
        Ok(pool)
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &PoolDefinition {
        &self.definition
    }

    /// Prefix length of the pool's range; `None` for ASN pools
    pub fn prefix_length(&self) -> Option<u8> {
        self.prefix_length
    }

    /// Lowest value above everything issued so far
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }

    /// All issued values in address/number order
    pub fn assignments(&self) -> Vec<Assignment> {
        self.issued
            .values()
            .map(|i| Assignment {
                pool: self.id().to_string(),
                identifier: i.identifier.clone(),
                value: i.value,
            })
            .collect()
    }

    pub fn get(&self, identifier: &str) -> Option<Assignment> {
        let start = self.by_identifier.get(identifier)?;
        let issued = self.issued.get(start)?;
        Some(Assignment {
            pool: self.id().to_string(),
            identifier: issued.identifier.clone(),
            value: issued.value,
        })
    }

    /// Hand out the lowest free value. Returns the assignment and whether it is new.
    pub fn allocate_for(
        &mut self,
        identifier: &str,
        size_hint: u8,
    ) -> Result<(Assignment, bool), PoolError> {
        if let Some(existing) = self.get(identifier) {
            return Ok((existing, false));
        }

        let taken: Vec<(u64, u64)> = self
            .issued
            .iter()
            .map(|(s, i)| (*s as u64, i.end as u64))
            .collect();

        let (start, end, value) = match self.prefix_length {
            Some(pool_len) => {
                if size_hint > 32 || size_hint < pool_len {
                    return Err(PoolError::InvalidSizeHint {
                        pool: self.id().to_string(),
                        size_hint,
                    });
                }
                // Host addresses skip the network and broadcast addresses of the pool
                let (lo, hi) = if size_hint == 32 && pool_len < 31 {
                    (self.start as u64 + 1, self.end as u64 - 1)
                } else {
                    (self.start as u64, self.end as u64)
                };
                let size = utils::block_size(size_hint);
                let net = utils::first_fit(lo, hi, size, size, &taken).ok_or_else(|| {
                    PoolError::PoolExhausted {
                        pool: self.id().to_string(),
                    }
                })?;
                (
                    net as u32,
                    (net + size - 1) as u32,
                    AssignedValue::Prefix {
                        network: net as u32,
                        prefix_length: size_hint,
                    },
                )
            }
            None => {
                let asn = utils::first_fit(self.start as u64, self.end as u64, 1, 1, &taken)
                    .ok_or_else(|| PoolError::PoolExhausted {
                        pool: self.id().to_string(),
                    })? as u32;
                (asn, asn, AssignedValue::Asn { asn })
            }
        };

        self.record(start, end, identifier.to_string(), value);
        Ok((
            Assignment {
                pool: self.id().to_string(),
                identifier: identifier.to_string(),
                value,
            },
            true,
        ))
    }

    fn record(&mut self, start: u32, end: u32, identifier: String, value: AssignedValue) {
        self.by_identifier.insert(identifier.clone(), start);
        self.issued.insert(start, Issued { end, identifier, value });
        self.cursor = self.cursor.max(end.saturating_add(1));
    }
}

/// Allocator owns every pool; cloning shares the same pools
#[derive(Debug, Clone, Default)]
pub struct Allocator {
    pools: Arc<HashMap<String, Arc<Mutex<PoolResource>>>>,
}

impl Allocator {
    pub fn from_pools(pools: Vec<PoolResource>) -> Self {
        let pools = pools
            .into_iter()
            .map(|p| (p.id().to_string(), Arc::new(Mutex::new(p))))
            .collect();
        Allocator { pools: Arc::new(pools) }
    }

    pub fn pool_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pools.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn pool(&self, pool_id: &str) -> Result<&Arc<Mutex<PoolResource>>, PoolError> {
        self.pools.get(pool_id).ok_or_else(|| PoolError::UnknownPool {
            pool: pool_id.to_string(),
        })
    }

    /// Allocate an anonymous value from a pool
    pub async fn allocate(&self, pool_id: &str, size_hint: u8) -> Result<Assignment, PoolError> {
        let identifier = uuid::Uuid::new_v4().to_string();
        self.allocate_for(pool_id, &identifier, size_hint).await
    }

    /// Allocate for an identifier, returning its existing value if it already holds one
    pub async fn allocate_for(
        &self,
        pool_id: &str,
        identifier: &str,
        size_hint: u8,
    ) -> Result<Assignment, PoolError> {
        let mut pool = self.pool(pool_id)?.lock().await;
        let (assignment, created) = pool.allocate_for(identifier, size_hint)?;
        if created {
            tracing::debug!("Allocated {} from {} for {}", assignment, pool_id, identifier);
        }
        Ok(assignment)
    }

    /// Copy of a pool's current state
    pub async fn snapshot(&self, pool_id: &str) -> Result<PoolResource, PoolError> {
        Ok(self.pool(pool_id)?.lock().await.clone())
    }

    /// Lock every named pool (sorted, deduplicated) for a staged allocation
    pub async fn lease<S: AsRef<str>>(&self, pool_ids: &[S]) -> Result<PoolLease, PoolError> {
        let mut ids: Vec<&str> = pool_ids.iter().map(|s| s.as_ref()).collect();
        ids.sort_unstable();
        ids.dedup();

        // Resolve every id before locking anything
        let handles = ids
            .iter()
            .map(|id| self.pool(id).map(|p| (id.to_string(), Arc::clone(p))))
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = BTreeMap::new();
        for (id, handle) in handles {
            let guard = handle.lock_owned().await;
            let staged = guard.clone();
            entries.insert(id, LeaseEntry { guard, staged });
        }

        Ok(PoolLease {
            entries,
            issued: Vec::new(),
        })
    }
}

struct LeaseEntry {
    guard: OwnedMutexGuard<PoolResource>,
    staged: PoolResource,
}

/// Exclusive hold on a set of pools. Allocations are staged and only become
/// visible on `commit`; dropping the lease discards them.
pub struct PoolLease {
    entries: BTreeMap<String, LeaseEntry>,
    issued: Vec<Assignment>,
}

impl PoolLease {
    pub fn allocate_for(
        &mut self,
        pool_id: &str,
        identifier: &str,
        size_hint: u8,
    ) -> Result<Assignment, PoolError> {
        let entry = self.entries.get_mut(pool_id).ok_or_else(|| PoolError::UnknownPool {
            pool: pool_id.to_string(),
        })?;
        let (assignment, created) = entry.staged.allocate_for(identifier, size_hint)?;
        if created {
            self.issued.push(assignment.clone());
        }
        Ok(assignment)
    }

    /// Prefix length of a leased pool's range
    pub fn prefix_length(&self, pool_id: &str) -> Option<u8> {
        self.entries.get(pool_id)?.staged.prefix_length()
    }

    /// Assignments created under this lease, in allocation order
    pub fn issued(&self) -> &[Assignment] {
        &self.issued
    }

    pub fn commit(self) {
        let count = self.issued.len();
        for (_, entry) in self.entries {
            let LeaseEntry { mut guard, staged } = entry;
            *guard = staged;
        }
        if count > 0 {
            tracing::debug!("Committed {} pool allocations", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn prefix_pool(id: &str, prefix: &str) -> PoolResource {
        PoolResource::new(PoolDefinition {
            id: id.to_string(),
            range: PoolRange::Prefix {
                prefix: prefix.to_string(),
            },
            description: None,
        })
        .unwrap()
    }

    fn asn_pool(id: &str, start: u32, end: u32) -> PoolResource {
        PoolResource::new(PoolDefinition {
            id: id.to_string(),
            range: PoolRange::Asn { start, end },
            description: None,
        })
        .unwrap()
    }

    fn span(a: &Assignment) -> (u64, u64) {
        match a.value {
            AssignedValue::Prefix { network, prefix_length } => {
                (network as u64, network as u64 + utils::block_size(prefix_length) - 1)
            }
            AssignedValue::Asn { asn } => (asn as u64, asn as u64),
        }
    }

    #[tokio::test]
    async fn test_loopbacks_skip_network_address() {
        let allocator = Allocator::from_pools(vec![prefix_pool("lo", "10.255.0.0/24")]);
        let a = allocator.allocate("lo", 32).await.unwrap();
        let b = allocator.allocate("lo", 32).await.unwrap();
        assert_eq!(a.to_string(), "10.255.0.1/32");
        assert_eq!(b.to_string(), "10.255.0.2/32");
    }

    #[tokio::test]
    async fn test_point_to_point_blocks_are_aligned() {
        let allocator = Allocator::from_pools(vec![prefix_pool("p2p", "10.1.0.0/24")]);
        let a = allocator.allocate("p2p", 31).await.unwrap();
        let b = allocator.allocate("p2p", 31).await.unwrap();
        let c = allocator.allocate("p2p", 30).await.unwrap();
        assert_eq!(a.to_string(), "10.1.0.0/31");
        assert_eq!(b.to_string(), "10.1.0.2/31");
        assert_eq!(c.to_string(), "10.1.0.4/30");
    }

    #[tokio::test]
    async fn test_pool_exhaustion() {
        let allocator = Allocator::from_pools(vec![prefix_pool("tiny", "10.0.0.0/30")]);
        assert!(allocator.allocate("tiny", 31).await.is_ok());
        assert!(allocator.allocate("tiny", 31).await.is_ok());
        let err = allocator.allocate("tiny", 31).await.unwrap_err();
        assert_eq!(err, PoolError::PoolExhausted { pool: "tiny".to_string() });
    }

    #[tokio::test]
    async fn test_invalid_size_hint_and_unknown_pool() {
        let allocator = Allocator::from_pools(vec![prefix_pool("p2p", "10.1.0.0/24")]);
        assert!(matches!(
            allocator.allocate("p2p", 16).await,
            Err(PoolError::InvalidSizeHint { size_hint: 16, .. })
        ));
        assert!(matches!(
            allocator.allocate("p2p", 33).await,
            Err(PoolError::InvalidSizeHint { .. })
        ));
        assert!(matches!(
            allocator.allocate("nope", 32).await,
            Err(PoolError::UnknownPool { .. })
        ));
    }

    #[tokio::test]
    async fn test_asn_pool_ignores_size_hint() {
        let allocator = Allocator::from_pools(vec![asn_pool("asn", 65000, 65002)]);
        assert_eq!(allocator.allocate("asn", 0).await.unwrap().asn(), Some(65000));
        assert_eq!(allocator.allocate("asn", 31).await.unwrap().asn(), Some(65001));
        assert_eq!(allocator.allocate("asn", 32).await.unwrap().asn(), Some(65002));
        assert!(matches!(
            allocator.allocate("asn", 0).await,
            Err(PoolError::PoolExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn test_allocate_for_is_idempotent() {
        let allocator = Allocator::from_pools(vec![asn_pool("asn", 65000, 65100)]);
        let first = allocator.allocate_for("asn", "dc1-leaf-01", 0).await.unwrap();
        let other = allocator.allocate_for("asn", "dc1-leaf-02", 0).await.unwrap();
        let again = allocator.allocate_for("asn", "dc1-leaf-01", 0).await.unwrap();
        assert_eq!(first, again);
        assert_ne!(first.asn(), other.asn());
        assert_eq!(allocator.snapshot("asn").await.unwrap().issued_count(), 2);
    }

    #[tokio::test]
    async fn test_mixed_sizes_never_overlap() {
        let allocator = Allocator::from_pools(vec![prefix_pool("mix", "10.9.0.0/24")]);
        let hints = [32u8, 31, 30, 32, 29, 31, 32, 28, 30, 32, 31, 29];
        let mut spans = Vec::new();
        for hint in hints {
            spans.push(span(&allocator.allocate("mix", hint).await.unwrap()));
        }
        spans.sort();
        for pair in spans.windows(2) {
            assert!(pair[0].1 < pair[1].0, "{:?} overlaps {:?}", pair[0], pair[1]);
        }
    }

    #[tokio::test]
    async fn test_concurrent_allocation_is_unique() {
        let allocator = Allocator::from_pools(vec![prefix_pool("lo", "10.255.0.0/24")]);
        let mut handles = Vec::new();
        for i in 0..64 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move {
                allocator.allocate_for("lo", &format!("device-{}", i), 32).await
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            let assignment = handle.await.unwrap().unwrap();
            assert!(seen.insert(assignment.to_string()), "duplicate {}", assignment);
        }
        assert_eq!(seen.len(), 64);
    }

    #[tokio::test]
    async fn test_lease_commit_and_rollback() {
        let allocator = Allocator::from_pools(vec![
            prefix_pool("lo", "10.255.0.0/24"),
            asn_pool("asn", 65000, 65010),
        ]);

        {
            let mut lease = allocator.lease(&["lo", "asn"]).await.unwrap();
            lease.allocate_for("lo", "dropped", 32).unwrap();
            assert_eq!(lease.issued().len(), 1);
        }
        assert_eq!(allocator.snapshot("lo").await.unwrap().issued_count(), 0);

        let mut lease = allocator.lease(&["asn", "lo", "lo"]).await.unwrap();
        let kept = lease.allocate_for("lo", "kept", 32).unwrap();
        assert_eq!(lease.prefix_length("lo"), Some(24));
        assert_eq!(lease.prefix_length("asn"), None);
        assert!(matches!(
            lease.allocate_for("p2p", "x", 31),
            Err(PoolError::UnknownPool { .. })
        ));
        lease.commit();

        let again = allocator.allocate_for("lo", "kept", 32).await.unwrap();
        assert_eq!(again, kept);
        assert_eq!(kept.to_string(), "10.255.0.1/32");
    }

    #[tokio::test]
    async fn test_lease_unknown_pool_locks_nothing() {
        let allocator = Allocator::from_pools(vec![prefix_pool("lo", "10.255.0.0/24")]);
        assert!(allocator.lease(&["lo", "missing"]).await.is_err());
        assert!(allocator.allocate("lo", 32).await.is_ok());
    }

    #[test]
    fn test_with_assignments_restores_state() {
        let mut pool = prefix_pool("lo", "10.255.0.0/24");
        let (a, _) = pool.allocate_for("dc1-spine-01-Loopback0", 32).unwrap();
        let (b, _) = pool.allocate_for("dc1-leaf-01-Loopback0", 32).unwrap();

        let mut restored =
            PoolResource::with_assignments(pool.definition().clone(), pool.assignments()).unwrap();
        assert_eq!(restored.get("dc1-spine-01-Loopback0"), Some(a));
        assert_eq!(restored.get("dc1-leaf-01-Loopback0"), Some(b));
        let (c, created) = restored.allocate_for("dc1-leaf-02-Loopback0", 32).unwrap();
        assert!(created);
        assert_eq!(c.to_string(), "10.255.0.3/32");
        assert_eq!(restored.cursor(), utils::ipv4_to_u32("10.255.0.4").unwrap());
    }

    #[test]
    fn test_invalid_pool_definitions() {
        let bad_prefix = PoolResource::new(PoolDefinition {
            id: "bad".to_string(),
            range: PoolRange::Prefix {
                prefix: "10.0.0.0".to_string(),
            },
            description: None,
        });
        assert!(matches!(bad_prefix, Err(PoolError::InvalidPool { .. })));

        let bad_asn = PoolResource::new(PoolDefinition {
            id: "bad".to_string(),
            range: PoolRange::Asn { start: 10, end: 5 },
            description: None,
        });
        assert!(matches!(bad_asn, Err(PoolError::InvalidPool { .. })));
    }

    #[test]
    fn test_pool_definition_json() {
        let json = r#"[
            {"id": "lo", "kind": "prefix", "prefix": "10.255.0.0/24"},
            {"id": "asn", "kind": "asn", "start": 65000, "end": 65100, "description": "fabric ASNs"}
        ]"#;
        let defs: Vec<PoolDefinition> = serde_json::from_str(json).unwrap();
        assert_eq!(defs[0].range, PoolRange::Prefix { prefix: "10.255.0.0/24".to_string() });
        assert_eq!(defs[1].range, PoolRange::Asn { start: 65000, end: 65100 });
    }
}
