//! Set comparison between local records and remote observations

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Partition of a local set and a remote set by external id
#[derive(Debug)]
pub struct Diff<L, R> {
    /// Local entries with no remote counterpart, in local order
    pub removed: Vec<L>,
    /// Pairs sharing an external id, in local order
    pub matched: Vec<(L, R)>,
    /// Remote entries with no local counterpart, in remote order
    pub added: Vec<R>,
}

/// Bucket sizes of a [`Diff`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub removed: usize,
    pub matched: usize,
    pub added: usize,
}

impl<L, R> Diff<L, R> {
    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            removed: self.removed.len(),
            matched: self.matched.len(),
            added: self.added.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.matched.is_empty() && self.added.is_empty()
    }
}

/// Compare `local` against `remote` by the keys the two closures extract.
///
/// A remote key seen twice fails the whole comparison with
/// `DuplicateExternalId`; an empty remote key is `InvalidObservation`. Local entries with
/// an empty key, or a key already matched by an earlier local entry, land in
/// `removed`, so every input element ends up in exactly one bucket.
pub fn diff_sets<L, R, KL, KR>(
    local: Vec<L>,
    remote: Vec<R>,
    local_key: KL,
    remote_key: KR,
) -> Result<Diff<L, R>>
where
    KL: Fn(&L) -> String,
    KR: Fn(&R) -> String,
{
    let mut index: HashMap<String, usize> = HashMap::with_capacity(remote.len());
    for (position, item) in remote.iter().enumerate() {
        let key = remote_key(item);
        if key.is_empty() {
            return Err(SyncError::invalid_observation(
                format!("remote #{}", position),
                "remote resource has no external id",
            ));
        }
        if index.insert(key.clone(), position).is_some() {
            return Err(SyncError::DuplicateExternalId(key));
        }
    }

    let mut unclaimed: Vec<Option<R>> = remote.into_iter().map(Some).collect();
    let mut removed = Vec::new();
    let mut matched = Vec::new();

    for item in local {
        let key = local_key(&item);
        let counterpart = match index.get(&key) {
            Some(&position) if !key.is_empty() => unclaimed[position].take(),
            _ => None,
        };
        match counterpart {
            Some(observation) => matched.push((item, observation)),
            None => removed.push(item),
        }
    }

    let added = unclaimed.into_iter().flatten().collect();

    Ok(Diff {
        removed,
        matched,
        added,
    })
}
