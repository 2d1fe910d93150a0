//! On-disk cache of base OTs for the malicious OT extension.
//!
//! Base OTs are public key operations and dominate the cost of small batches.
//! A party can store the result of its base OTs and reuse them in a later
//! session with the same peer. When fresh base OTs are computed, both parties
//! agree on a random id by a coin toss and store it with their state. Every
//! file also carries an epoch. Both parties exchange id and epoch before the
//! extension, and only if they match the base OTs are skipped. The extension
//! seeds are derived from the cached seeds and the epoch. After a session the
//! stored epoch is incremented, so no two sessions use the same seeds.
//!
//! A cache that can not be read is ignored. A cache that can not be written
//! only costs fresh base OTs in the next session. A failed malicious check
//! removes the cache of the checking party.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use rotbridge_core::{Block, random_oracle::derive_block};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use subtle::Choice;
use tracing::{debug, warn};

/// Directory used by [`CacheConfig::for_port`].
pub const DEFAULT_CACHE_DIR: &str = "data";

/// Location of the base OT cache files of one party.
///
/// The sender and receiver of an extension use distinct files
/// `<dir>/<identity>.sender` and `<dir>/<identity>.receiver`, so both parties
/// can share a directory. Only one session per identity may run at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    dir: PathBuf,
    identity: String,
}

/// Which side of the OT extension a cache file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheRole {
    Sender,
    Receiver,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct Cached<T> {
    pub(crate) id: Block,
    pub(crate) epoch: u64,
    pub(crate) state: T,
}

/// Base OT state of the extension sender, which is the base OT receiver.
#[derive(Serialize, Deserialize)]
pub(crate) struct SenderBaseOts {
    pub(crate) delta: Block,
    pub(crate) seeds: Vec<Block>,
}

/// Base OT state of the extension receiver, which is the base OT sender.
#[derive(Serialize, Deserialize)]
pub(crate) struct ReceiverBaseOts {
    pub(crate) seeds: Vec<[Block; 2]>,
}

impl CacheConfig {
    pub fn new(dir: impl Into<PathBuf>, identity: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            identity: identity.into(),
        }
    }

    /// Cache in [`DEFAULT_CACHE_DIR`] keyed by `port`.
    pub fn for_port(port: u16) -> Self {
        Self::new(DEFAULT_CACHE_DIR, port.to_string())
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn path(&self, role: CacheRole) -> PathBuf {
        let suffix = match role {
            CacheRole::Sender => "sender",
            CacheRole::Receiver => "receiver",
        };
        self.dir.join(format!("{}.{suffix}", self.identity))
    }

    /// Remove the cache files of both roles.
    pub fn clear(&self) -> io::Result<()> {
        for role in [CacheRole::Sender, CacheRole::Receiver] {
            match fs::remove_file(self.path(role)) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err),
                _ => {}
            }
        }
        Ok(())
    }

    pub(crate) fn load<T: DeserializeOwned>(&self, role: CacheRole) -> Option<Cached<T>> {
        let path = self.path(role);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %path.display(), %err, "unable to read base OT cache");
                return None;
            }
        };
        match bincode::deserialize(&bytes) {
            Ok(cached) => Some(cached),
            Err(err) => {
                warn!(path = %path.display(), %err, "ignoring corrupt base OT cache");
                None
            }
        }
    }

    pub(crate) fn store<T: Serialize>(&self, role: CacheRole, id: Block, epoch: u64, state: &T) {
        let path = self.path(role);
        if let Err(err) = self.write_atomic(&path, &Cached { id, epoch, state }) {
            warn!(path = %path.display(), %err, "unable to write base OT cache");
        } else {
            debug!(path = %path.display(), epoch, "stored base OTs");
        }
    }

    fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let bytes = bincode::serialize(value).map_err(io::Error::other)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".tmp-{}", std::process::id()));
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)
    }
}

impl SenderBaseOts {
    pub(crate) fn choices(&self) -> Vec<Choice> {
        let delta = u128::from(self.delta);
        (0..Block::BITS)
            .map(|i| Choice::from(((delta >> i) & 1) as u8))
            .collect()
    }

    pub(crate) fn derive_seeds(&self, epoch: u64) -> Vec<Block> {
        self.seeds.iter().map(|s| derive_block(s, epoch)).collect()
    }
}

impl ReceiverBaseOts {
    pub(crate) fn derive_seeds(&self, epoch: u64) -> Vec<[Block; 2]> {
        self.seeds
            .iter()
            .map(|[s0, s1]| [derive_block(s0, epoch), derive_block(s1, epoch)])
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;

    use rand::{Rng, SeedableRng, rngs::StdRng};
    use rotbridge_core::Block;

    use super::{CacheConfig, CacheRole, Cached, ReceiverBaseOts, SenderBaseOts};

    pub(crate) fn temp_cache_dir() -> PathBuf {
        let suffix: u64 = rand::random();
        std::env::temp_dir().join(format!("rotbridge-cache-test-{suffix:x}"))
    }

    #[test]
    fn store_and_load() {
        let cache = CacheConfig::new(temp_cache_dir(), "4242");
        let mut rng = StdRng::seed_from_u64(5);
        let state = ReceiverBaseOts {
            seeds: (0..128).map(|_| [rng.random(), rng.random()]).collect(),
        };
        let id: Block = rng.random();
        cache.store(CacheRole::Receiver, id, 3, &state);
        let loaded: Cached<ReceiverBaseOts> = cache.load(CacheRole::Receiver).unwrap();
        assert_eq!(id, loaded.id);
        assert_eq!(3, loaded.epoch);
        assert_eq!(state.seeds, loaded.state.seeds);
        // the other role has its own file
        assert!(cache.load::<SenderBaseOts>(CacheRole::Sender).is_none());
        cache.clear().unwrap();
        assert!(cache.load::<ReceiverBaseOts>(CacheRole::Receiver).is_none());
        std::fs::remove_dir_all(cache.dir()).unwrap();
    }

    #[test]
    fn corrupt_cache_is_ignored() {
        let cache = CacheConfig::new(temp_cache_dir(), "corrupt");
        std::fs::create_dir_all(cache.dir()).unwrap();
        std::fs::write(cache.path(CacheRole::Sender), b"not bincode").unwrap();
        assert!(cache.load::<SenderBaseOts>(CacheRole::Sender).is_none());
        std::fs::remove_dir_all(cache.dir()).unwrap();
    }

    #[test]
    fn clear_missing_files_is_ok() {
        let cache = CacheConfig::new(temp_cache_dir(), "missing");
        cache.clear().unwrap();
    }

    #[test]
    fn role_file_names() {
        let cache = CacheConfig::for_port(9000);
        assert_eq!(
            PathBuf::from("data/9000.sender"),
            cache.path(CacheRole::Sender)
        );
        assert_eq!(
            PathBuf::from("data/9000.receiver"),
            cache.path(CacheRole::Receiver)
        );
    }

    #[test]
    fn sender_choices_match_delta() {
        let delta = Block::from(0b1011_u128 | (1 << 127));
        let state = SenderBaseOts {
            delta,
            seeds: vec![],
        };
        let choices = state.choices();
        assert_eq!(delta, Block::from_choices(&choices));
    }
}
