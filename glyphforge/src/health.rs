//! Per-resource success/failure scoring with exponential-decay cooldowns.
//!
//! Fonts and background images both go through this tracker. It is an owned
//! object handed to the scheduler (shared behind a mutex there), never a
//! global.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::foundation::error::{ForgeError, ForgeResult};

/// Health record for a single resource, serialized as part of the snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceHealth {
    pub resource_id: String,
    pub score: f64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    /// Unix seconds until which the resource is unavailable.
    pub cooldown_until: Option<f64>,
    pub last_error_kind: Option<String>,
}

impl ResourceHealth {
    fn fresh(resource_id: String) -> Self {
        Self {
            resource_id,
            score: 100.0,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            cooldown_until: None,
            last_error_kind: None,
        }
    }
}

/// Tunables for the tracker. Defaults match the documented contract.
#[derive(Clone, Copy, Debug)]
pub struct TrackerOptions {
    pub threshold: f64,
    pub success_increment: f64,
    pub failure_decrement: f64,
    pub base_cooldown_secs: f64,
    pub max_cooldown_secs: f64,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            threshold: 50.0,
            success_increment: 1.0,
            failure_decrement: 10.0,
            base_cooldown_secs: 300.0,
            max_cooldown_secs: 3600.0,
        }
    }
}

/// Serialized tracker state (`font_health.state` / `background_scores.state`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub resources: Vec<ResourceHealth>,
}

/// Aggregate numbers for the end-of-run report.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub cooling_down: usize,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug)]
pub struct ResourceHealthTracker {
    entries: BTreeMap<String, ResourceHealth>,
    opts: TrackerOptions,
}

impl Default for ResourceHealthTracker {
    fn default() -> Self {
        Self::new(TrackerOptions::default())
    }
}

impl ResourceHealthTracker {
    pub fn new(opts: TrackerOptions) -> Self {
        Self {
            entries: BTreeMap::new(),
            opts,
        }
    }

    fn entry(&mut self, id: &str) -> &mut ResourceHealth {
        self.entries
            .entry(id.to_owned())
            .or_insert_with(|| ResourceHealth::fresh(id.to_owned()))
    }

    pub fn record_success(&mut self, id: &str) {
        self.record_success_at(id, unix_now());
    }

    pub fn record_success_at(&mut self, id: &str, _now: f64) {
        let inc = self.opts.success_increment;
        let e = self.entry(id);
        e.success_count += 1;
        e.consecutive_failures = 0;
        e.cooldown_until = None;
        e.score = (e.score + inc).min(100.0);
    }

    pub fn record_failure(&mut self, id: &str, kind: &str) {
        self.record_failure_at(id, kind, unix_now());
    }

    pub fn record_failure_at(&mut self, id: &str, kind: &str, now: f64) {
        let opts = self.opts;
        let e = self.entry(id);
        e.failure_count += 1;
        e.consecutive_failures += 1;
        e.last_error_kind = Some(kind.to_owned());
        e.score = (e.score - opts.failure_decrement).max(0.0);

        let backoff = opts.base_cooldown_secs
            * 2f64.powi(e.consecutive_failures.saturating_sub(1).min(16) as i32);
        e.cooldown_until = Some(now + backoff.min(opts.max_cooldown_secs));
        tracing::debug!(
            resource = id,
            kind,
            score = e.score,
            consecutive = e.consecutive_failures,
            "resource failure recorded"
        );
    }

    /// Weighted selection among eligible candidates.
    ///
    /// Eligibility: `score >= threshold` and not in cooldown. Draw probability
    /// is proportional to `pattern_weight * score`.
    pub fn select(&mut self, candidates: &[(String, f64)], rng: &mut StdRng) -> ForgeResult<String> {
        self.select_at(candidates, rng, unix_now())
    }

    pub fn select_at(
        &mut self,
        candidates: &[(String, f64)],
        rng: &mut StdRng,
        now: f64,
    ) -> ForgeResult<String> {
        let threshold = self.opts.threshold;
        for (id, _) in candidates {
            self.entry(id);
        }

        let eligible: Vec<(&str, f64)> = candidates
            .iter()
            .filter_map(|(id, weight)| {
                let e = &self.entries[id];
                if e.score < threshold {
                    return None;
                }
                if let Some(until) = e.cooldown_until {
                    if now < until {
                        return None;
                    }
                }
                Some((id.as_str(), weight * e.score))
            })
            .collect();

        if eligible.is_empty() {
            return Err(ForgeError::NoHealthyResource(format!(
                "0 of {} candidates eligible",
                candidates.len()
            )));
        }

        let total: f64 = eligible.iter().map(|(_, w)| w.max(0.0)).sum();
        if total <= 0.0 {
            return Ok(eligible[0].0.to_owned());
        }

        let mut pick = rng.gen_range(0.0..total);
        for (id, w) in &eligible {
            pick -= w.max(0.0);
            if pick <= 0.0 {
                return Ok((*id).to_owned());
            }
        }
        Ok(eligible[eligible.len() - 1].0.to_owned())
    }

    pub fn score(&self, id: &str) -> Option<f64> {
        self.entries.get(id).map(|e| e.score)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            resources: self.entries.values().cloned().collect(),
        }
    }

    pub fn restore(&mut self, snapshot: HealthSnapshot) {
        self.entries = snapshot
            .resources
            .into_iter()
            .map(|e| (e.resource_id.clone(), e))
            .collect();
    }

    pub fn summary(&self) -> HealthSummary {
        self.summary_at(unix_now())
    }

    pub fn summary_at(&self, now: f64) -> HealthSummary {
        let mut s = HealthSummary {
            total: self.entries.len(),
            ..Default::default()
        };
        for e in self.entries.values() {
            let cooling = e.cooldown_until.is_some_and(|t| now < t);
            if cooling {
                s.cooling_down += 1;
            } else if e.score >= self.opts.threshold {
                s.healthy += 1;
            }
            s.successes += e.success_count;
            s.failures += e.failure_count;
        }
        s
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn cands(ids: &[&str]) -> Vec<(String, f64)> {
        ids.iter().map(|s| (s.to_string(), 1.0)).collect()
    }

    #[test]
    fn score_saturates_at_both_ends() {
        let mut t = ResourceHealthTracker::default();
        t.record_success_at("a", 0.0);
        assert_eq!(t.score("a"), Some(100.0));
        for _ in 0..20 {
            t.record_failure_at("a", "glyph_miss", 0.0);
        }
        assert_eq!(t.score("a"), Some(0.0));
    }

    #[test]
    fn cooldown_backs_off_exponentially_and_is_capped() {
        let mut t = ResourceHealthTracker::default();
        t.record_failure_at("a", "io", 0.0);
        let c1 = t.entries["a"].cooldown_until.unwrap();
        assert_eq!(c1, 300.0);

        t.record_failure_at("a", "io", 0.0);
        let c2 = t.entries["a"].cooldown_until.unwrap();
        assert_eq!(c2, 600.0);

        for _ in 0..10 {
            t.record_failure_at("a", "io", 0.0);
        }
        let capped = t.entries["a"].cooldown_until.unwrap();
        assert_eq!(capped, 3600.0);
    }

    #[test]
    fn success_clears_cooldown_and_streak() {
        let mut t = ResourceHealthTracker::default();
        t.record_failure_at("a", "io", 0.0);
        t.record_success_at("a", 1.0);
        assert_eq!(t.entries["a"].consecutive_failures, 0);
        assert!(t.entries["a"].cooldown_until.is_none());
    }

    #[test]
    fn selection_skips_unhealthy_and_cooling_resources() {
        let mut t = ResourceHealthTracker::default();
        // Drive "bad" below the threshold of 50.
        for _ in 0..6 {
            t.record_failure_at("bad", "glyph_miss", 0.0);
        }
        // "cooling" is healthy by score but inside its cooldown window.
        t.record_failure_at("cooling", "io", 0.0);

        let mut r = rng();
        for _ in 0..50 {
            let got = t
                .select_at(&cands(&["bad", "cooling", "good"]), &mut r, 10.0)
                .unwrap();
            assert_eq!(got, "good");
        }
    }

    #[test]
    fn cooldown_expiry_restores_eligibility() {
        let mut t = ResourceHealthTracker::default();
        t.record_failure_at("a", "io", 0.0);
        let mut r = rng();
        assert!(t.select_at(&cands(&["a"]), &mut r, 10.0).is_err());
        assert_eq!(t.select_at(&cands(&["a"]), &mut r, 301.0).unwrap(), "a");
    }

    #[test]
    fn no_eligible_resource_is_a_typed_error() {
        let mut t = ResourceHealthTracker::default();
        for _ in 0..6 {
            t.record_failure_at("only", "glyph_miss", 0.0);
        }
        let mut r = rng();
        let err = t.select_at(&cands(&["only"]), &mut r, 10.0).unwrap_err();
        assert!(matches!(err, ForgeError::NoHealthyResource(_)));
    }

    #[test]
    fn weighted_draw_prefers_heavier_patterns() {
        let mut t = ResourceHealthTracker::default();
        let mut r = rng();
        let candidates = vec![("heavy".to_string(), 10.0), ("light".to_string(), 1.0)];
        let mut heavy = 0;
        for _ in 0..1000 {
            if t.select_at(&candidates, &mut r, 0.0).unwrap() == "heavy" {
                heavy += 1;
            }
        }
        assert!(heavy > 800, "heavy picked {heavy}/1000");
    }

    #[test]
    fn snapshot_roundtrip_preserves_state() {
        let mut t = ResourceHealthTracker::default();
        t.record_failure_at("a", "io", 5.0);
        t.record_success_at("b", 5.0);

        let snap = t.snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let back: HealthSnapshot = serde_json::from_str(&json).unwrap();

        let mut restored = ResourceHealthTracker::default();
        restored.restore(back);
        assert_eq!(restored.snapshot().resources, t.snapshot().resources);
    }

    #[test]
    fn summary_counts_buckets() {
        let mut t = ResourceHealthTracker::default();
        t.record_success_at("healthy", 0.0);
        t.record_failure_at("cooling", "io", 0.0);
        let s = t.summary_at(1.0);
        assert_eq!(s.total, 2);
        assert_eq!(s.healthy, 1);
        assert_eq!(s.cooling_down, 1);
        assert_eq!(s.successes, 1);
        assert_eq!(s.failures, 1);
    }
}
