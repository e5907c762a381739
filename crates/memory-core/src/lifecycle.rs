//! Memory lifecycle policy.
//!
//! Pure functions computing importance, TTL, expiration, refresh, decay,
//! and prune eligibility. Nothing here touches storage; callers apply the
//! results inside their own transactions, and everything is computed
//! lazily when an operation touches a record — there is no background
//! sweep.
//!
//! Implicit state machine:
//!
//! ```text
//! Active --forget--> SoftDeleted --retention+prune--> Purged
//! Active --expires_at elapsed--> Expired --prune--> Purged
//! ```
//!
//! "Expired" is never persisted; it is derived from `expires_at` against
//! the current time.

use memory_types::{days_to_ms, MemoryType};

/// Importance is always clamped to this range.
pub const IMPORTANCE_MAX: f64 = 10.0;

/// Importance at or above this is permanent (no TTL).
pub const PERMANENT_THRESHOLD: f64 = 9.0;

/// Floor applied when metadata marks a memory permanent.
const PERMANENT_FLOOR: f64 = PERMANENT_THRESHOLD;

// Base-importance signal weights
const BASE_SCORE: f64 = 2.5;
const LENGTH_STEP: f64 = 0.5;
const STRUCTURE_BONUS: f64 = 0.5;
const ENTITY_BONUS: f64 = 0.4;
const ENTITY_BONUS_CAP: f64 = 1.2;
const MARKER_BONUS: f64 = 1.5;
const PREFERENCE_BONUS: f64 = 1.0;
const PROVENANCE_BONUS: f64 = 0.5;

// Context-adjustment modifiers
const SECURITY_BONUS: f64 = 1.0;
const IDENTITY_BONUS: f64 = 1.0;
const REQUIREMENT_BONUS: f64 = 1.0;
const DEPRECATION_PENALTY: f64 = 2.0;

// Expiration bonus: importance-proportional, capped
const BONUS_DAYS_PER_POINT: f64 = 2.0;
const MAX_BONUS_DAYS: f64 = 14.0;

// Refresh-on-access thresholds
const HIGH_IMPORTANCE: f64 = 7.0;
const MODERATE_IMPORTANCE: f64 = 4.0;
const HIGH_IDLE_DAYS: f64 = 7.0;
const MODERATE_IDLE_DAYS: f64 = 14.0;

// Read-time decay of importance
const DECAY_FLOOR: f64 = 0.7;
const DECAY_WINDOW_DAYS: f64 = 90.0;

// Access-triggered boost
const ACCESS_WINDOW_DAYS: f64 = 7.0;
const BOOST_PER_ACCESS: f64 = 0.25;
const BOOST_CAP: f64 = 2.0;

fn clamp(importance: f64) -> f64 {
    importance.clamp(0.0, IMPORTANCE_MAX)
}

/// Base importance from content signals, clamped to [0, 10].
///
/// Signals: content length and structure, associated entity count,
/// explicit remember/important markers, user-preference phrasing, a
/// provenance source, and a type bonus (self-referential memories score
/// highest).
pub fn base_importance(
    content: &str,
    entity_count: usize,
    has_provenance: bool,
    memory_type: MemoryType,
) -> f64 {
    let lower = content.to_lowercase();
    let mut score = BASE_SCORE;

    for threshold in [100, 300, 800] {
        if content.len() >= threshold {
            score += LENGTH_STEP;
        }
    }
    if is_structured(content) {
        score += STRUCTURE_BONUS;
    }

    score += (entity_count as f64 * ENTITY_BONUS).min(ENTITY_BONUS_CAP);

    if ["remember", "important", "don't forget", "do not forget"]
        .iter()
        .any(|m| lower.contains(m))
    {
        score += MARKER_BONUS;
    }
    if ["i prefer", "i like", "i always", "i never", "my favorite"]
        .iter()
        .any(|m| lower.contains(m))
    {
        score += PREFERENCE_BONUS;
    }
    if has_provenance {
        score += PROVENANCE_BONUS;
    }

    score += match memory_type {
        MemoryType::SelfRef => 1.5,
        MemoryType::Relationship => 0.75,
        MemoryType::Entity => 0.5,
        MemoryType::Fact => 0.0,
    };

    clamp(score)
}

fn is_structured(content: &str) -> bool {
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() >= 4 {
        return true;
    }
    lines.iter().any(|l| {
        let t = l.trim_start();
        t.starts_with("- ") || t.starts_with("* ") || t.chars().next().is_some_and(|c| c.is_ascii_digit()) && t.contains(". ")
    })
}

/// Context adjustment over a base importance, re-clamped to [0, 10].
///
/// Reads only the documented metadata keys: `permanent`, `deprecated`,
/// `project_requirement`. Arbitrary metadata never influences scoring.
pub fn adjust_importance(
    base: f64,
    content: &str,
    metadata: &std::collections::HashMap<String, serde_json::Value>,
) -> f64 {
    let lower = content.to_lowercase();
    let mut score = base;

    if ["password", "api key", "secret", "credential", "access token"]
        .iter()
        .any(|m| lower.contains(m))
    {
        score += SECURITY_BONUS;
    }
    if ["my name is", "i am called", "call me"]
        .iter()
        .any(|m| lower.contains(m))
    {
        score += IDENTITY_BONUS;
    }
    if metadata_flag(metadata, "project_requirement") || lower.contains("project requirement") {
        score += REQUIREMENT_BONUS;
    }
    if metadata_flag(metadata, "deprecated") || lower.contains("deprecated") {
        score -= DEPRECATION_PENALTY;
    }
    if metadata_flag(metadata, "permanent") {
        score = score.max(PERMANENT_FLOOR);
    }

    clamp(score)
}

fn metadata_flag(
    metadata: &std::collections::HashMap<String, serde_json::Value>,
    key: &str,
) -> bool {
    match metadata.get(key) {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s == "true" || s == "1",
        Some(serde_json::Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
        _ => false,
    }
}

/// Recommended TTL in days for an importance value; `None` = permanent.
///
/// Importance buckets into tiers with a base lifetime each; within a tier
/// the lifetime scales up monotonically with importance. The tier bases
/// are far enough apart that the scaled value is monotonic across the
/// whole range too.
pub fn ttl_days(importance: f64) -> Option<f64> {
    let imp = clamp(importance);
    if imp >= PERMANENT_THRESHOLD {
        return None;
    }
    let (tier_low, base_days) = if imp >= 7.0 {
        (7.0, 365.0)
    } else if imp >= 5.0 {
        (5.0, 180.0)
    } else if imp >= 3.0 {
        (3.0, 90.0)
    } else {
        (0.0, 30.0)
    };
    Some(base_days * (1.0 + (imp - tier_low) * 0.1))
}

/// Importance-proportional expiration bonus in days, capped.
fn bonus_days(importance: f64) -> f64 {
    (clamp(importance) * BONUS_DAYS_PER_POINT).min(MAX_BONUS_DAYS)
}

/// Expiration timestamp at creation: created + TTL + bonus.
/// `None` for the permanent tier.
pub fn expiration(created_ms: i64, importance: f64) -> Option<i64> {
    ttl_days(importance).map(|ttl| created_ms + days_to_ms(ttl + bonus_days(importance)))
}

/// Candidate new expiration on access, or `None` when no refresh applies.
///
/// Low importance is left to expire naturally. Moderate importance earns a
/// partial (half-TTL) extension once idle past the longer threshold. High
/// importance earns full TTL renewal plus the full bonus past the shorter
/// threshold. The caller applies the candidate only if it extends the
/// current expiration — refresh never shortens.
pub fn refresh_expiration(importance: f64, idle_days: f64, now_ms: i64) -> Option<i64> {
    let imp = clamp(importance);
    if imp >= HIGH_IMPORTANCE && idle_days >= HIGH_IDLE_DAYS {
        ttl_days(imp).map(|ttl| now_ms + days_to_ms(ttl + bonus_days(imp)))
    } else if imp >= MODERATE_IMPORTANCE && idle_days >= MODERATE_IDLE_DAYS {
        ttl_days(imp).map(|ttl| now_ms + days_to_ms(ttl * 0.5))
    } else {
        None
    }
}

/// Read-time importance: stored importance decayed by idle time.
///
/// Used only for ranking; never persisted. Bounded below by
/// `DECAY_FLOOR` so an old but important memory keeps most of its weight.
pub fn effective_importance(importance: f64, idle_days: f64) -> f64 {
    let decay = DECAY_FLOOR + (1.0 - DECAY_FLOOR) * (-idle_days.max(0.0) / DECAY_WINDOW_DAYS).exp();
    clamp(importance) * decay
}

/// Access-triggered importance boost.
///
/// Repeated access within the early window after creation raises
/// importance, monotonically in `access_count` for a fixed age, saturating
/// at 10 rather than overflowing. Outside the window (or on a first
/// access) the stored importance is returned unchanged apart from
/// clamping.
pub fn access_boost(importance: f64, access_count: i64, age_days: f64) -> f64 {
    if age_days > ACCESS_WINDOW_DAYS || access_count < 2 {
        return clamp(importance);
    }
    let boost = (BOOST_PER_ACCESS * (access_count - 1) as f64).min(BOOST_CAP);
    clamp(importance + boost)
}

/// Retention cutoff for purging soft-deleted records.
pub fn purge_cutoff(now_ms: i64, older_than_days: u32) -> i64 {
    now_ms - days_to_ms(older_than_days as f64)
}
