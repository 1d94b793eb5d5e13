//! User profiles and their persistence
//!
//! A profile is the three registration answers: gender, country and age
//! bracket. The in-memory Profile Store lives in the controller; this module
//! defines the record types and the `ProfileSource` persistence seam with a
//! memory implementation and a JSON-lines file implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ProfileError;
use crate::types::UserId;

/// Self-declared gender, also used as the search filter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

/// Country of residence (closed list)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Country {
    Russia,
    Ukraine,
    Belarus,
    Kazakhstan,
    Uzbekistan,
    EuropeanUnion,
    Usa,
    Other,
}

/// Age bracket (closed list)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeBracket {
    #[serde(rename = "up_to_14")]
    UpTo14,
    #[serde(rename = "15_17")]
    From15To17,
    #[serde(rename = "18_21")]
    From18To21,
    #[serde(rename = "22_25")]
    From22To25,
    #[serde(rename = "26_35")]
    From26To35,
    #[serde(rename = "36_plus")]
    From36,
}

/// Registration attributes of one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub gender: Gender,
    pub country: Country,
    pub age: AgeBracket,
}

/// One line of the profile file
#[derive(Debug, Serialize, Deserialize)]
struct ProfileRecord {
    user_id: UserId,
    #[serde(flatten)]
    profile: UserProfile,
}

/// Persistence seam for profiles
///
/// The core only reads and writes whole records through this trait.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Every stored profile, used to warm the in-memory store at startup
    async fn load_all(&self) -> Result<HashMap<UserId, UserProfile>, ProfileError>;

    /// Look up one profile
    async fn get(&self, user: UserId) -> Result<Option<UserProfile>, ProfileError>;

    /// Insert or replace one profile
    async fn save(&self, user: UserId, profile: UserProfile) -> Result<(), ProfileError>;
}

/// Volatile profile source
#[derive(Debug, Default)]
pub struct MemoryProfiles {
    profiles: Mutex<HashMap<UserId, UserProfile>>,
}

impl MemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileSource for MemoryProfiles {
    async fn load_all(&self) -> Result<HashMap<UserId, UserProfile>, ProfileError> {
        Ok(self.profiles.lock().map(|p| p.clone()).unwrap_or_default())
    }

    async fn get(&self, user: UserId) -> Result<Option<UserProfile>, ProfileError> {
        Ok(self
            .profiles
            .lock()
            .ok()
            .and_then(|p| p.get(&user).copied()))
    }

    async fn save(&self, user: UserId, profile: UserProfile) -> Result<(), ProfileError> {
        if let Ok(mut profiles) = self.profiles.lock() {
            profiles.insert(user, profile);
        }
        Ok(())
    }
}

/// Line-delimited JSON profile file
///
/// One `ProfileRecord` per line. The file is read once on open and
/// rewritten whole (temp file + rename) on every save.
#[derive(Debug)]
pub struct JsonlProfiles {
    path: PathBuf,
    cache: tokio::sync::Mutex<HashMap<UserId, UserProfile>>,
}

impl JsonlProfiles {
    /// Open the file at `path`; a missing file is an empty store
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref().to_path_buf();
        let cache = match tokio::fs::read_to_string(&path).await {
            Ok(text) => parse_records(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Profile file {} not found, starting empty", path.display());
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!("Loaded {} profiles from {}", cache.len(), path.display());

        Ok(Self {
            path,
            cache: tokio::sync::Mutex::new(cache),
        })
    }

    async fn flush(&self, profiles: &HashMap<UserId, UserProfile>) -> Result<(), ProfileError> {
        let mut records: Vec<_> = profiles.iter().collect();
        records.sort_by_key(|(user_id, _)| **user_id);

        let mut out = String::new();
        for (user_id, profile) in records {
            let record = ProfileRecord {
                user_id: *user_id,
                profile: *profile,
            };
            out.push_str(&serde_json::to_string(&record)?);
            out.push('\n');
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, out).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Saved {} profiles", profiles.len());
        Ok(())
    }
}

#[async_trait]
impl ProfileSource for JsonlProfiles {
    async fn load_all(&self) -> Result<HashMap<UserId, UserProfile>, ProfileError> {
        Ok(self.cache.lock().await.clone())
    }

    async fn get(&self, user: UserId) -> Result<Option<UserProfile>, ProfileError> {
        Ok(self.cache.lock().await.get(&user).copied())
    }

    async fn save(&self, user: UserId, profile: UserProfile) -> Result<(), ProfileError> {
        let mut cache = self.cache.lock().await;
        cache.insert(user, profile);
        self.flush(&cache).await
    }
}

/// Parse profile lines, skipping blank and corrupt ones
fn parse_records(text: &str) -> HashMap<UserId, UserProfile> {
    let mut profiles = HashMap::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ProfileRecord>(line) {
            Ok(record) => {
                profiles.insert(record.user_id, record.profile);
            }
            Err(e) => warn!("Skipping corrupt profile line {}: {}", n + 1, e),
        }
    }
    profiles
}
