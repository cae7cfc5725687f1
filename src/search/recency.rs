//! Half-life recency decay.

/// Milliseconds per day.
pub const MS_PER_DAY: f64 = 86_400_000.0;

/// Boost factor for content with `content_timestamp` at time `now_ms`.
///
/// `1 / (1 + age_days / half_life_days)`: 1.0 for brand-new content, 0.5
/// at one half-life, 1/3 at two. Absent or future timestamps get 1.0, as
/// does a non-positive half-life.
#[must_use]
pub fn recency_boost(content_timestamp: Option<i64>, now_ms: i64, half_life_days: f64) -> f64 {
    let Some(timestamp) = content_timestamp else {
        return 1.0;
    };
    if timestamp > now_ms || half_life_days <= 0.0 || !half_life_days.is_finite() {
        return 1.0;
    }

    let age_days = (now_ms - timestamp) as f64 / MS_PER_DAY;
    1.0 / (1.0 + age_days / half_life_days)
}

/// Blends a hybrid score with a recency boost.
///
/// A weight of 0 returns `hybrid` unchanged.
#[inline]
#[must_use]
pub fn apply_recency(hybrid: f64, boost: f64, weight: f64) -> f64 {
    hybrid * (1.0 - weight + weight * boost)
}
