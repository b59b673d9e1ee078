//! Storage backend for profiles, votes and the tag index
//!
//! Single RocksDB instance with three column families:
//! - `profiles`: entity storage key → bincode [`TagProfile`]
//! - `votes`: votable key ∥ voter key → bincode [`Vote`]
//! - `tag_index`: entity_type ∥ tag ∥ entity_id → f64 cached weight
//!
//! The tag index is an inverted view of every profile's `tags_cache`,
//! maintained in the same `WriteBatch` as the profile write so it can never
//! diverge from the profile it mirrors. It serves `all_tags`, `tagged_with`
//! and the shared-tag scan the recommender uses to avoid a full cross
//! product.

use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use crate::constants::KEY_SEP;
use crate::errors::{RecoError, Result};
use crate::recommend::types::{EntityRef, TagProfile, Vote};

pub(crate) const CF_PROFILES: &str = "profiles";
pub(crate) const CF_VOTES: &str = "votes";
pub(crate) const CF_TAG_INDEX: &str = "tag_index";

/// Helper trait to safely iterate over RocksDB results with error logging.
/// Unlike `.flatten()` which silently ignores errors, this logs them.
trait LogErrors<T> {
    fn log_errors(self) -> impl Iterator<Item = T>;
}

impl<I, T, E> LogErrors<T> for I
where
    I: Iterator<Item = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    fn log_errors(self) -> impl Iterator<Item = T> {
        self.filter_map(|r| match r {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("RocksDB iterator error (continuing): {}", e);
                None
            }
        })
    }
}

pub struct ProfileStorage {
    db: Arc<DB>,
    write_opts_sync: bool,
}

impl ProfileStorage {
    pub fn open(path: &Path, sync_writes: bool) -> Result<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| RecoError::Storage(format!("create {}: {e}", path.display())))?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_max_background_jobs(2);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_PROFILES, Options::default()),
            ColumnFamilyDescriptor::new(CF_VOTES, Options::default()),
            ColumnFamilyDescriptor::new(CF_TAG_INDEX, Options::default()),
        ];

        let db = Arc::new(DB::open_cf_descriptors(&opts, path, cfs)?);
        tracing::info!(
            "Recommendation storage opened at {} ({} writes)",
            path.display(),
            if sync_writes { "sync" } else { "async" }
        );

        Ok(Self {
            db,
            write_opts_sync: sync_writes,
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| RecoError::Storage(format!("missing column family: {name}")))
    }

    /// Commit a batch; sync mode fsyncs the WAL before returning
    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut wo = WriteOptions::default();
        wo.set_sync(self.write_opts_sync);
        self.db.write_opt(batch, &wo)?;
        Ok(())
    }

    // ========================================================================
    // PROFILES
    // ========================================================================

    pub fn get_profile(&self, entity: &EntityRef) -> Result<Option<TagProfile>> {
        let cf = self.cf(CF_PROFILES)?;
        match self.db.get_cf(cf, entity.storage_key())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stage a profile write plus the tag-index diff into `batch`
    ///
    /// `old_cache_tags` are the cache keys the stored profile had before this
    /// mutation; index rows for tags no longer present are deleted. Caller
    /// prunes zero tags before staging.
    pub fn stage_profile(
        &self,
        batch: &mut WriteBatch,
        profile: &TagProfile,
        old_cache_tags: &BTreeSet<String>,
    ) -> Result<()> {
        let cf = self.cf(CF_PROFILES)?;
        batch.put_cf(cf, profile.owner.storage_key(), bincode::serialize(profile)?);

        let index_cf = self.cf(CF_TAG_INDEX)?;
        for (tag, weight) in &profile.tags_cache {
            batch.put_cf(
                index_cf,
                tag_index_key(&profile.owner, tag),
                weight.to_le_bytes(),
            );
        }
        for tag in old_cache_tags {
            if !profile.tags_cache.contains_key(tag) {
                batch.delete_cf(index_cf, tag_index_key(&profile.owner, tag));
            }
        }
        Ok(())
    }

    /// Convenience: stage and commit a lone profile write
    pub fn save_profile(
        &self,
        profile: &TagProfile,
        old_cache_tags: &BTreeSet<String>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_profile(&mut batch, profile, old_cache_tags)?;
        self.write(batch)
    }

    // ========================================================================
    // VOTES
    // ========================================================================

    pub fn get_vote(&self, votable: &EntityRef, voter: &EntityRef) -> Result<Option<Vote>> {
        let cf = self.cf(CF_VOTES)?;
        match self.db.get_cf(cf, Vote::storage_key(votable, voter))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn stage_vote(&self, batch: &mut WriteBatch, vote: &Vote) -> Result<()> {
        let cf = self.cf(CF_VOTES)?;
        batch.put_cf(
            cf,
            Vote::storage_key(&vote.votable, &vote.voter),
            bincode::serialize(vote)?,
        );
        Ok(())
    }

    pub fn stage_vote_delete(
        &self,
        batch: &mut WriteBatch,
        votable: &EntityRef,
        voter: &EntityRef,
    ) -> Result<()> {
        let cf = self.cf(CF_VOTES)?;
        batch.delete_cf(cf, Vote::storage_key(votable, voter));
        Ok(())
    }

    /// All votes where `votable` is the target, one prefix scan
    pub fn votes_for(&self, votable: &EntityRef) -> Result<Vec<Vote>> {
        let cf = self.cf(CF_VOTES)?;
        let mut prefix = votable.storage_key();
        prefix.push(KEY_SEP);

        let mut votes = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, rocksdb::Direction::Forward));
        for (key, value) in iter.log_errors() {
            if !key.starts_with(&prefix) {
                break;
            }
            votes.push(bincode::deserialize(&value)?);
        }
        Ok(votes)
    }

    /// Sum of vote weights targeting `votable`; 0 when no votes exist
    pub fn popularity(&self, votable: &EntityRef) -> Result<i64> {
        Ok(self
            .votes_for(votable)?
            .iter()
            .map(|v| v.weight as i64)
            .sum())
    }

    // ========================================================================
    // TAG INDEX
    // ========================================================================

    /// Distinct canonical tag keys across all profiles of `entity_type`
    pub fn all_tags(&self, entity_type: &str) -> Result<BTreeSet<String>> {
        let cf = self.cf(CF_TAG_INDEX)?;
        let mut prefix = entity_type.as_bytes().to_vec();
        prefix.push(KEY_SEP);

        let mut tags = BTreeSet::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, rocksdb::Direction::Forward));
        for (key, _) in iter.log_errors() {
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some((tag, _)) = split_index_suffix(&key[prefix.len()..]) {
                tags.insert(tag);
            }
        }
        Ok(tags)
    }

    /// Entities of `entity_type` whose cache holds `tag` with nonzero weight,
    /// with that cached weight
    pub fn entities_with_tag(&self, entity_type: &str, tag: &str) -> Result<Vec<(EntityRef, f64)>> {
        let cf = self.cf(CF_TAG_INDEX)?;
        let mut prefix = entity_type.as_bytes().to_vec();
        prefix.push(KEY_SEP);
        prefix.extend_from_slice(tag.as_bytes());
        prefix.push(KEY_SEP);

        let mut hits = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, rocksdb::Direction::Forward));
        for (key, value) in iter.log_errors() {
            if !key.starts_with(&prefix) {
                break;
            }
            let id = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            let weight = decode_weight(&value)?;
            hits.push((EntityRef::new(entity_type, id), weight));
        }
        Ok(hits)
    }
}

fn tag_index_key(entity: &EntityRef, tag: &str) -> Vec<u8> {
    let mut key = entity.entity_type.as_bytes().to_vec();
    key.push(KEY_SEP);
    key.extend_from_slice(tag.as_bytes());
    key.push(KEY_SEP);
    key.extend_from_slice(entity.entity_id.as_bytes());
    key
}

/// Split `tag ∥ entity_id` (the index key after its type prefix)
fn split_index_suffix(suffix: &[u8]) -> Option<(String, String)> {
    let sep = suffix.iter().position(|&b| b == KEY_SEP)?;
    let tag = String::from_utf8_lossy(&suffix[..sep]).into_owned();
    let id = String::from_utf8_lossy(&suffix[sep + 1..]).into_owned();
    Some((tag, id))
}

fn decode_weight(value: &[u8]) -> Result<f64> {
    let bytes: [u8; 8] = value
        .try_into()
        .map_err(|_| RecoError::Storage(format!("tag index weight of {} bytes", value.len())))?;
    Ok(f64::from_le_bytes(bytes))
}
