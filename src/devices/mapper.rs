//! Device mapper - fuzzy, confidence-scored device identity matching
//!
//! Platforms report the same physical device under different names depending
//! on the active profile ("AirPods Pro" vs "AirPods Pro (Hands-Free)") and
//! the API used to enumerate it. The mapper normalizes both sides into
//! [`DeviceSignature`]s and scores every input-capable candidate.
//!
//! Usable results are cached per signature key. A cached entry expires after
//! the configured TTL (24h by default) or as soon as its device disconnects,
//! and it is always returned with the confidence it was stored with.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::normalize::{classify_transport, NormalizeRules};
use super::{Confidence, DeviceId, DeviceSignature, MappingResult, NativeDevice, Transport};
use crate::config::MapperConfig;

/// Scoring parameters plus prepared normalization rules
#[derive(Debug, Clone)]
struct MapperRules {
    scoring: MapperConfig,
    normalize: NormalizeRules,
}

impl MapperRules {
    fn from_config(config: &MapperConfig) -> Self {
        Self {
            scoring: config.clone(),
            normalize: NormalizeRules::new(
                config.strip_suffixes.iter().cloned(),
                config
                    .aliases
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            ),
        }
    }
}

/// Cached mapping
#[derive(Debug, Clone)]
struct CacheEntry {
    result: MappingResult,
    inserted_at: Instant,
}

/// Scored candidate
#[derive(Debug, Clone)]
struct Scored<'a> {
    device: &'a NativeDevice,
    score: u32,
}

/// Resolves desired devices against a candidate list
pub struct DeviceMapper {
    rules: RwLock<MapperRules>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl DeviceMapper {
    pub fn new(config: &MapperConfig) -> Self {
        Self {
            rules: RwLock::new(MapperRules::from_config(config)),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Replace scoring parameters (config hot-reload)
    ///
    /// The cache is dropped because cached confidences were earned under the
    /// old thresholds.
    pub fn update_config(&self, config: &MapperConfig) {
        *self.rules.write() = MapperRules::from_config(config);
        self.clear_cache();
    }

    /// Normalize a raw device name with the current rules
    pub fn normalize(&self, raw: &str) -> String {
        self.rules.read().normalize.normalize(raw)
    }

    /// Convert a native descriptor into its signature
    pub fn signature(&self, device: &NativeDevice) -> DeviceSignature {
        let transport = classify_transport(
            &device.name,
            device.manufacturer.as_deref(),
            device.transport_hint(),
        );
        DeviceSignature::from_normalized(
            self.normalize(&device.name),
            transport,
            device.channels,
            device
                .manufacturer
                .as_ref()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty()),
        )
    }

    /// Signature for a user preference given only by name
    pub fn signature_from_name(&self, name: &str, channels: Option<u16>) -> DeviceSignature {
        DeviceSignature::from_normalized(
            self.normalize(name),
            classify_transport(name, None, None),
            channels.unwrap_or(0),
            None,
        )
    }

    /// Resolve a native descriptor against `candidates`
    pub fn resolve(
        &self,
        desired: &NativeDevice,
        candidates: &[NativeDevice],
        now: Instant,
    ) -> MappingResult {
        let signature = self.signature(desired);
        self.resolve_signature(&signature, candidates, now)
    }

    /// Resolve a signature against `candidates`
    pub fn resolve_signature(
        &self,
        desired: &DeviceSignature,
        candidates: &[NativeDevice],
        now: Instant,
    ) -> MappingResult {
        if let Some(hit) = self.cache_lookup(desired, candidates, now) {
            return hit;
        }

        let result = self.score_candidates(desired, candidates);

        debug!(
            desired = %desired,
            confidence = %result.confidence,
            score = result.score,
            handle = ?result.handle,
            reason = %result.reason,
            "device mapping"
        );

        if result.is_usable() {
            self.cache.lock().insert(
                desired.cache_key(),
                CacheEntry {
                    result: result.clone(),
                    inserted_at: now,
                },
            );
        }

        result
    }

    fn cache_lookup(
        &self,
        desired: &DeviceSignature,
        candidates: &[NativeDevice],
        now: Instant,
    ) -> Option<MappingResult> {
        let ttl = Duration::from_secs(self.rules.read().scoring.cache_ttl_secs);
        let key = desired.cache_key();
        let mut cache = self.cache.lock();

        let entry = cache.get(&key)?;
        let expired = now.saturating_duration_since(entry.inserted_at) >= ttl;
        let present = entry.result.handle.as_ref().is_some_and(|handle| {
            candidates
                .iter()
                .any(|c| c.is_input && &c.id == handle)
        });

        if expired || !present {
            trace!(key = %key, expired, present, "evicting cached mapping");
            cache.remove(&key);
            return None;
        }

        let mut hit = entry.result.clone();
        hit.cached = true;
        hit.reason = format!("cached: {}", entry.result.reason);
        Some(hit)
    }

    fn score_candidates(&self, desired: &DeviceSignature, candidates: &[NativeDevice]) -> MappingResult {
        let rules = self.rules.read();
        let scoring = &rules.scoring;

        let mut scored: Vec<Scored<'_>> = candidates
            .iter()
            .filter(|c| c.is_input)
            .map(|device| {
                let candidate = DeviceSignature::from_normalized(
                    rules.normalize.normalize(&device.name),
                    classify_transport(
                        &device.name,
                        device.manufacturer.as_deref(),
                        device.transport_hint(),
                    ),
                    device.channels,
                    None,
                );
                Scored {
                    device,
                    score: score_pair(scoring, desired, &candidate),
                }
            })
            .collect();

        if scored.is_empty() {
            return MappingResult::none("no matching devices found");
        }

        // Stable sort keeps enumeration order among equal scores
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        let best = &scored[0];
        if best.score == 0 {
            return MappingResult::none("no matching devices found");
        }

        let mut confidence = if best.score >= scoring.high_threshold {
            Confidence::High
        } else if best.score >= scoring.medium_threshold {
            Confidence::Medium
        } else if best.score >= scoring.low_threshold {
            Confidence::Low
        } else {
            Confidence::None
        };

        let second = scored.get(1).map(|s| s.score).unwrap_or(0);
        let ambiguous = second > 0 && f64::from(second) >= scoring.ambiguity_ratio * f64::from(best.score);

        let mut reason = format!("best '{}' scored {}", best.device.name, best.score);
        if ambiguous {
            confidence = confidence.downgrade();
            reason.push_str(&format!(", runner-up scored {} (ambiguous)", second));
        }

        if confidence == Confidence::None {
            return MappingResult {
                handle: None,
                confidence,
                reason: format!("{}, below threshold", reason),
                score: best.score,
                cached: false,
            };
        }

        MappingResult {
            handle: Some(best.device.id.clone()),
            confidence,
            reason,
            score: best.score,
            cached: false,
        }
    }

    /// Drop cached mappings pointing at a disconnected device
    pub fn evict_device(&self, id: &DeviceId) {
        self.cache
            .lock()
            .retain(|_, entry| entry.result.handle.as_ref() != Some(id));
    }

    /// Drop every cached mapping
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}

/// Score one candidate against the desired signature
fn score_pair(scoring: &MapperConfig, desired: &DeviceSignature, candidate: &DeviceSignature) -> u32 {
    let mut score = 0;

    if desired.name() == candidate.name() {
        score += scoring.exact_name_score;
    } else if !desired.name().is_empty()
        && !candidate.name().is_empty()
        && (desired.name().contains(candidate.name()) || candidate.name().contains(desired.name()))
    {
        score += scoring.substring_score;
    }

    // 0 channels means unknown on either side
    if desired.channels() > 0 && candidate.channels() > 0 {
        let diff = desired.channels().abs_diff(candidate.channels());
        if diff == 0 {
            score += scoring.exact_channels_score;
        } else if diff == 1 {
            score += scoring.near_channels_score;
        }
    }

    if desired.transport() == Transport::Bluetooth && candidate.transport() == Transport::Bluetooth {
        score += scoring.bluetooth_bonus;
    }

    score
}
