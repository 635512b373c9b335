use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use config_model::ActiveConfig;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::events::MediaKind;
use crate::platform::files;
use crate::tasks::indexer::{self, MediaItem};

/// Boost parameters taken from the operator configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostSettings {
    pub favorite_factor: u32,
    pub recent_enabled: bool,
    pub recent_factor: u32,
    pub recent_window: Duration,
}

impl BoostSettings {
    /// Largest number of occurrences a single boost may give an item.
    pub const MAX_FACTOR: u32 = 20;

    pub fn from_active(active: &ActiveConfig) -> Self {
        Self {
            favorite_factor: capped_factor("favorite_boost_factor", active.favorite_boost_factor),
            recent_enabled: active.telegram_boost_enabled,
            recent_factor: capped_factor("telegram_boost_factor", active.telegram_boost_factor),
            recent_window: active.recent_window(),
        }
    }

    fn is_recent(&self, fresh: Option<SystemTime>, now: SystemTime) -> bool {
        if !self.recent_enabled {
            return false;
        }
        match fresh {
            // Timestamps from the future count as just arrived.
            Some(fresh) => now
                .duration_since(fresh)
                .map(|age| age < self.recent_window)
                .unwrap_or(true),
            None => false,
        }
    }

    /// Number of occurrences `item` gets in a lap.
    pub fn multiplicity_for(&self, item: &MediaItem, now: SystemTime) -> usize {
        let mut multiplicity = 1usize;
        if self.is_recent(item.fresh, now) {
            multiplicity += self.recent_factor.clamp(1, Self::MAX_FACTOR) as usize - 1;
        }
        if item.favorite {
            multiplicity += self.favorite_factor.clamp(1, Self::MAX_FACTOR) as usize - 1;
        }
        multiplicity
    }
}

fn capped_factor(name: &str, factor: u32) -> u32 {
    if factor > BoostSettings::MAX_FACTOR {
        warn!(setting = name, factor, max = BoostSettings::MAX_FACTOR, "boost factor capped");
        BoostSettings::MAX_FACTOR
    } else {
        factor
    }
}

/// An ordered play sequence. Entries share their item, so weighting by
/// duplication stays cheap.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    /// Set for named transient playlists.
    pub name: Option<String>,
    pub entries: Vec<Arc<MediaItem>>,
}

impl Playlist {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<MediaItem>> {
        self.entries.get(index)
    }
}

/// Weighted multiset in index order, before shuffling.
pub fn build_unshuffled(items: &[MediaItem], boosts: &BoostSettings, now: SystemTime) -> Playlist {
    let mut entries = Vec::new();
    for item in items {
        let multiplicity = boosts.multiplicity_for(item, now);
        debug!(
            path = %item.display_path.display(),
            multiplicity,
            "playlist multiplicity"
        );
        let shared = Arc::new(item.clone());
        for _ in 0..multiplicity {
            entries.push(Arc::clone(&shared));
        }
    }
    Playlist {
        name: None,
        entries,
    }
}

pub fn build(
    items: &[MediaItem],
    boosts: &BoostSettings,
    now: SystemTime,
    rng: &mut StdRng,
    reason: RebuildReason,
) -> Playlist {
    let mut playlist = build_unshuffled(items, boosts, now);
    playlist.entries.shuffle(rng);
    let favorites = items.iter().filter(|i| i.favorite).count();
    match reason {
        RebuildReason::Startup => info!(
            items = items.len(),
            scheduled = playlist.len(),
            favorites,
            now = ?now,
            reason = ?reason,
            "playlist rebuilt"
        ),
        RebuildReason::LapComplete => debug!(
            items = items.len(),
            scheduled = playlist.len(),
            favorites,
            now = ?now,
            reason = ?reason,
            "playlist rebuilt"
        ),
    }
    playlist
}

#[derive(Debug, Clone, Copy)]
pub enum RebuildReason {
    Startup,
    LapComplete,
}

/// Upcoming display order for `iterations` slots, rebuilding a fresh lap
/// whenever one runs out.
pub fn simulate_playlist(
    items: &[MediaItem],
    boosts: &BoostSettings,
    now: SystemTime,
    iterations: usize,
    seed: Option<u64>,
) -> Vec<PathBuf> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut plan = Vec::with_capacity(iterations);
    let mut reason = RebuildReason::Startup;
    while plan.len() < iterations {
        let lap = build(items, boosts, now, &mut rng, reason);
        if lap.is_empty() {
            break;
        }
        plan.extend(
            lap.entries
                .iter()
                .take(iterations - plan.len())
                .map(|item| item.display_path.clone()),
        );
        reason = RebuildReason::LapComplete;
    }
    plan
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OverrideFile {
    Named {
        #[serde(default)]
        name: Option<String>,
        photos: Vec<String>,
    },
    Bare(Vec<String>),
}

/// Consume the one-shot playlist override at `path`, if any.
///
/// The file is deleted whether or not it parses. Entries are relative to
/// `prepared_dir`; the first path component names the source.
pub fn take_transient(path: &Path, prepared_dir: &Path) -> Option<Playlist> {
    let raw = match files::read_and_delete(path) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!("ignoring playlist override: {err:#}");
            return None;
        }
    };
    let (name, photos) = match serde_json::from_str::<OverrideFile>(&raw) {
        Ok(OverrideFile::Named { name, photos }) => (name.filter(|n| !n.trim().is_empty()), photos),
        Ok(OverrideFile::Bare(photos)) => (None, photos),
        Err(err) => {
            warn!(path = %path.display(), "ignoring unparsable playlist override: {err}");
            return None;
        }
    };
    let entries: Vec<Arc<MediaItem>> = photos
        .iter()
        .map(|rel| Arc::new(transient_item(prepared_dir, rel)))
        .collect();
    info!(
        name = name.as_deref().unwrap_or("<unnamed>"),
        items = entries.len(),
        "transient playlist loaded"
    );
    Some(Playlist { name, entries })
}

fn transient_item(prepared_dir: &Path, relative: &str) -> MediaItem {
    let relative = Path::new(relative);
    let display_path = prepared_dir.join(relative);
    let source = relative
        .components()
        .next()
        .filter(|_| relative.components().count() > 1)
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_default();
    let base_name = relative
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let kind = indexer::kind_of(&display_path);
    let thumbnail = match kind {
        MediaKind::Video => indexer::video_thumbnail(&display_path),
        MediaKind::Image => None,
    };
    MediaItem {
        source,
        base_name,
        kind,
        display_path,
        thumbnail,
        favorite: false,
        fresh: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn item(name: &str, favorite: bool, fresh: Option<u64>) -> MediaItem {
        MediaItem {
            source: "telegram".into(),
            base_name: name.into(),
            kind: MediaKind::Image,
            display_path: PathBuf::from(format!("/p/telegram/{name}")),
            thumbnail: None,
            favorite,
            fresh: fresh.map(|s| UNIX_EPOCH + Duration::from_secs(s)),
        }
    }

    fn boosts() -> BoostSettings {
        BoostSettings {
            favorite_factor: 2,
            recent_enabled: true,
            recent_factor: 4,
            recent_window: Duration::from_secs(7 * 86_400),
        }
    }

    #[test]
    fn recent_window_is_exclusive() {
        let now = UNIX_EPOCH + Duration::from_secs(10 * 86_400);
        let b = boosts();
        assert_eq!(b.multiplicity_for(&item("a", false, Some(3 * 86_400)), now), 1);
        assert_eq!(b.multiplicity_for(&item("a", false, Some(3 * 86_400 + 1)), now), 4);
    }

    #[test]
    fn disabled_recency_ignores_fresh() {
        let now = UNIX_EPOCH + Duration::from_secs(100);
        let b = BoostSettings {
            recent_enabled: false,
            ..boosts()
        };
        assert_eq!(b.multiplicity_for(&item("a", true, Some(90)), now), 2);
    }

    #[test]
    fn factors_below_one_add_nothing() {
        let b = BoostSettings {
            favorite_factor: 0,
            recent_factor: 0,
            ..boosts()
        };
        let now = UNIX_EPOCH + Duration::from_secs(100);
        assert_eq!(b.multiplicity_for(&item("a", true, Some(90)), now), 1);
    }

    #[test]
    fn huge_factors_are_capped() {
        let active = ActiveConfig::from_json_str(
            r#"{"favorite_boost_factor": 1e9, "telegram_boost_factor": "4000000000"}"#,
        )
        .unwrap();
        let b = BoostSettings::from_active(&active);
        assert_eq!(b.favorite_factor, BoostSettings::MAX_FACTOR);
        assert_eq!(b.recent_factor, BoostSettings::MAX_FACTOR);

        let now = UNIX_EPOCH + Duration::from_secs(86_400);
        let both = item("a", true, Some(86_400));
        assert_eq!(b.multiplicity_for(&both, now), 2 * 20 - 1);

        let raw = BoostSettings {
            favorite_factor: u32::MAX,
            ..b
        };
        assert_eq!(raw.multiplicity_for(&item("b", true, None), now), 20);
    }

    #[test]
    fn simulation_is_seeded() {
        let items = vec![item("a", false, None), item("b", true, None), item("c", false, None)];
        let now = UNIX_EPOCH;
        let first = simulate_playlist(&items, &boosts(), now, 10, Some(7));
        let second = simulate_playlist(&items, &boosts(), now, 10, Some(7));
        assert_eq!(first.len(), 10);
        assert_eq!(first, second);
    }

    #[test]
    fn simulation_of_nothing_is_empty() {
        assert!(simulate_playlist(&[], &boosts(), UNIX_EPOCH, 5, Some(1)).is_empty());
    }
}
