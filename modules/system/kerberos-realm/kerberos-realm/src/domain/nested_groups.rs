//! Concurrent, depth-bounded discovery of nested directory groups.
//!
//! One resolution run owns a [`JoinSet`] of expansion tasks, a semaphore
//! sized to the worker bound, and the discovered-group map shared by all of
//! its tasks. The run is complete once every submitted task has been joined.
//! Dropping the run future aborts whatever is still outstanding.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use kerberos_realm_sdk::DirectoryClient;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Discovered groups for one run, keyed by lowercased distinguished name.
type Discovered = Arc<DashMap<String, String>>;

/// Walks the "member of" graph below a seed group.
#[derive(Clone)]
pub struct NestedGroupResolver {
    directory: Arc<dyn DirectoryClient>,
}

impl NestedGroupResolver {
    #[must_use]
    pub fn new(directory: Arc<dyn DirectoryClient>) -> Self {
        Self { directory }
    }

    /// Return every group transitively nested below `seed`.
    ///
    /// The seed is depth 1. Children of a depth-`d` group are always recorded
    /// but only expanded when `d + 1 <= max_depth`, so `max_depth == 1` issues
    /// exactly one query. At most `max_workers` directory queries are in flight
    /// at once. The seed itself is never part of the result, even when a cycle
    /// leads back to it. A failed query counts as "no children".
    #[tracing::instrument(skip(self), fields(seed = %seed))]
    pub async fn resolve(&self, seed: &str, max_depth: usize, max_workers: usize) -> Vec<String> {
        let discovered: Discovered = Arc::new(DashMap::new());
        let seed_key = seed.to_lowercase();
        discovered.insert(seed_key.clone(), seed.to_owned());

        let permits = Arc::new(Semaphore::new(max_workers.max(1)));
        let mut tasks = JoinSet::new();
        self.submit(&mut tasks, &discovered, &permits, seed.to_owned(), 1);

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((depth, children)) => {
                    let next = depth + 1;
                    if next > max_depth {
                        continue;
                    }
                    for child in children {
                        self.submit(&mut tasks, &discovered, &permits, child, next);
                    }
                }
                Err(e) => warn!(error = %e, "nested group task did not complete"),
            }
        }
        tasks.shutdown().await;

        let mut groups: Vec<String> = discovered
            .iter()
            .filter(|entry| *entry.key() != seed_key)
            .map(|entry| entry.value().clone())
            .collect();
        groups.sort();
        debug!(count = groups.len(), "nested group resolution complete");
        groups
    }

    fn submit(
        &self,
        tasks: &mut JoinSet<(usize, Vec<String>)>,
        discovered: &Discovered,
        permits: &Arc<Semaphore>,
        group_dn: String,
        depth: usize,
    ) {
        let directory = Arc::clone(&self.directory);
        let discovered = Arc::clone(discovered);
        let permits = Arc::clone(permits);
        tasks.spawn(async move {
            let children = expand(directory.as_ref(), &discovered, &permits, &group_dn).await;
            (depth, children)
        });
    }
}

/// Query the direct children of `group_dn` and claim the ones not seen yet.
///
/// Returns only the children this task inserted, so each group is expanded
/// by at most one task.
async fn expand(
    directory: &dyn DirectoryClient,
    discovered: &DashMap<String, String>,
    permits: &Semaphore,
    group_dn: &str,
) -> Vec<String> {
    let Ok(_permit) = permits.acquire().await else {
        return Vec::new();
    };

    let children = match directory.member_groups(group_dn).await {
        Ok(children) => children,
        Err(e) => {
            warn!(group = %group_dn, error = %e, "member group query failed, treating as leaf");
            return Vec::new();
        }
    };

    children
        .into_iter()
        .filter(|child| match discovered.entry(child.to_lowercase()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                debug!(group = %group_dn, nested = %child, "found nested group");
                slot.insert(child.clone());
                true
            }
        })
        .collect()
}
