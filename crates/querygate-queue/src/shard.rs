//! Per-tenant querier shuffle shards.
//!
//! Rendezvous hashing keeps each tenant's worker subset deterministic and
//! as stable as possible when workers come and go: removing one worker
//! replaces at most one shard member, and adding one replaces at most one.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::Hasher;

fn weight(tenant: &str, worker: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(tenant.as_bytes());
    hasher.write_u8(0);
    hasher.write(worker.as_bytes());
    hasher.finish()
}

/// Whether `worker` belongs to `tenant`'s shard of size `limit` within the
/// registered worker set (worker id -> stream refcount). A limit of zero,
/// or one covering every worker, makes all workers eligible.
pub(crate) fn worker_is_eligible(
    tenant: &str,
    worker: &str,
    workers: &BTreeMap<String, usize>,
    limit: usize,
) -> bool {
    if limit == 0 || limit >= workers.len() {
        return true;
    }
    if !workers.contains_key(worker) {
        return false;
    }

    let own = weight(tenant, worker);
    // The worker is in the shard if fewer than `limit` registered workers
    // hash below it. Ties broken by worker id ordering.
    let mut below = 0usize;
    for other in workers.keys() {
        if other == worker {
            continue;
        }
        let w = weight(tenant, other);
        if w < own || (w == own && other.as_str() < worker) {
            below += 1;
            if below >= limit {
                return false;
            }
        }
    }
    true
}
