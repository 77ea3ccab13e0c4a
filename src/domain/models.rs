use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub const MAX_NOTE_CHARS: usize = 500;
pub const DEFAULT_MOOD_RATING: i32 = 3;

const LOCAL_ID_PREFIX: &str = "local";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Generates an id for records that never reached the remote store. The
/// prefix lets later code recognize local-only records (see `is_local_only`).
pub fn next_local_id() -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{LOCAL_ID_PREFIX}-{}-{sequence}", Utc::now().timestamp_micros())
}

pub fn is_local_only(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Productive,
    Rest,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub color: String,
    #[serde(rename = "type")]
    pub kind: CategoryKind,
}

impl Category {
    /// Structural admission check for untrusted remote records. Enum
    /// membership of `kind` is already enforced by deserialization.
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "category.id")?;
        validate_non_empty(&self.user_id, "category.user_id")?;
        validate_non_empty(&self.name, "category.name")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeBlock {
    pub id: String,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub category_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_rating: Option<i32>,
}

impl TimeBlock {
    /// Structural admission check. Deliberately does not check
    /// `start_time < end_time`: range validity is enforced on the write path
    /// and out-of-range remote records are still displayable context.
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "block.id")?;
        validate_non_empty(&self.user_id, "block.user_id")?;
        validate_non_empty(&self.category_id, "block.category_id")?;
        Ok(())
    }
}

/// Write payload for a block create (no id) or edit (id present).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockCandidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub category_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_rating: Option<i32>,
}

impl BlockCandidate {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.user_id, "candidate.user_id")?;
        validate_non_empty(&self.category_id, "candidate.category_id")?;
        if self.end_time <= self.start_time {
            return Err("candidate.end_time must be after candidate.start_time".to_string());
        }
        if let Some(notes) = &self.notes {
            if notes.chars().count() > MAX_NOTE_CHARS {
                return Err(format!("candidate.notes must be at most {MAX_NOTE_CHARS} characters"));
            }
        }
        Ok(())
    }

    /// Materializes the candidate into a block with the given id, filling the
    /// mood rating default.
    pub fn into_block(self, id: String) -> TimeBlock {
        TimeBlock {
            id,
            user_id: self.user_id,
            start_time: self.start_time,
            end_time: self.end_time,
            category_id: self.category_id,
            notes: self.notes,
            mood_rating: Some(self.mood_rating.unwrap_or(DEFAULT_MOOD_RATING)),
        }
    }
}

/// Write payload for a category create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryDraft {
    pub user_id: String,
    pub name: String,
    pub color: String,
    #[serde(rename = "type")]
    pub kind: CategoryKind,
}

impl CategoryDraft {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.user_id, "category.user_id")?;
        validate_non_empty(&self.name, "category.name")?;
        if normalize_color(&self.color).is_none() {
            return Err(format!("category.color '{}' is not a recognized color", self.color));
        }
        Ok(())
    }
}

/// Partial update for a category; only present fields are sent or applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<CategoryKind>,
}

impl CategoryPatch {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            validate_non_empty(name, "patch.name")?;
        }
        if let Some(color) = &self.color {
            if normalize_color(color).is_none() {
                return Err(format!("patch.color '{color}' is not a recognized color"));
            }
        }
        Ok(())
    }

    pub fn apply(&self, category: &mut Category) {
        if let Some(name) = &self.name {
            category.name = name.clone();
        }
        if let Some(color) = &self.color {
            category.color = normalize_color(color).unwrap_or_else(|| color.clone());
        }
        if let Some(kind) = self.kind {
            category.kind = kind;
        }
    }
}

/// Full-field update sent for a block edit; mirrors what the edit dialog
/// submits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockPatch {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub category_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub mood_rating: i32,
}

impl BlockPatch {
    pub fn from_candidate(candidate: &BlockCandidate) -> Self {
        Self {
            start_time: candidate.start_time,
            end_time: candidate.end_time,
            category_id: candidate.category_id.clone(),
            notes: candidate.notes.clone(),
            mood_rating: candidate.mood_rating.unwrap_or(DEFAULT_MOOD_RATING),
        }
    }

    pub fn from_block(block: &TimeBlock) -> Self {
        Self {
            start_time: block.start_time,
            end_time: block.end_time,
            category_id: block.category_id.clone(),
            notes: block.notes.clone(),
            mood_rating: block.mood_rating.unwrap_or(DEFAULT_MOOD_RATING),
        }
    }

    pub fn apply(&self, block: &mut TimeBlock) {
        block.start_time = self.start_time;
        block.end_time = self.end_time;
        block.category_id = self.category_id.clone();
        block.notes = self.notes.clone();
        block.mood_rating = Some(self.mood_rating);
    }
}

/// Unsaved snapshot of an in-progress block edit. Written to the cache on
/// every field change so an interrupted session can be recovered; discarded
/// on save or explicit cancel. Never sent to the remote store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Draft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_mood_rating")]
    pub mood_rating: i32,
}

fn default_mood_rating() -> i32 {
    DEFAULT_MOOD_RATING
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

/// Normalizes `#rgb`, `#rrggbb`, `rgb(r, g, b)` and `hsl(h, s%, l%)` inputs
/// to the 6-hex-digit `#rrggbb` form the remote schema stores.
pub fn normalize_color(input: &str) -> Option<String> {
    let value = input.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(body) = value.strip_prefix("rgb(").and_then(|rest| rest.strip_suffix(')')) {
        let mut parts = body.split(',').map(str::trim);
        let r = parts.next()?.parse::<u16>().ok()?;
        let g = parts.next()?.parse::<u16>().ok()?;
        let b = parts.next()?.parse::<u16>().ok()?;
        if parts.next().is_some() || r > 255 || g > 255 || b > 255 {
            return None;
        }
        return Some(rgb_to_hex(r as f64, g as f64, b as f64));
    }
    if let Some(body) = value.strip_prefix("hsl(").and_then(|rest| rest.strip_suffix(')')) {
        let mut parts = body.split(',').map(str::trim);
        let h = parts.next()?.parse::<u16>().ok()?;
        let s = parts.next()?.strip_suffix('%')?.parse::<u16>().ok()?;
        let l = parts.next()?.strip_suffix('%')?.parse::<u16>().ok()?;
        if parts.next().is_some() || h > 360 {
            return None;
        }
        return Some(hsl_to_hex(h as f64, s as f64, l as f64));
    }
    normalize_hex(value)
}

fn normalize_hex(value: &str) -> Option<String> {
    let digits = value.strip_prefix('#').unwrap_or(value);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match digits.len() {
        3 => {
            let expanded: String = digits.chars().flat_map(|c| [c, c]).collect();
            Some(format!("#{}", expanded.to_ascii_lowercase()))
        }
        6 => Some(format!("#{}", digits.to_ascii_lowercase())),
        _ => None,
    }
}

fn rgb_to_hex(r: f64, g: f64, b: f64) -> String {
    let channel = |n: f64| (n.clamp(0.0, 255.0).round()) as u8;
    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}

fn hsl_to_hex(h: f64, s: f64, l: f64) -> String {
    let s = (s.clamp(0.0, 100.0)) / 100.0;
    let l = (l.clamp(0.0, 100.0)) / 100.0;
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;
    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    rgb_to_hex((r + m) * 255.0, (g + m) * 255.0, (b + m) * 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_category() -> Category {
        Category {
            id: "cat-1".to_string(),
            user_id: "user-1".to_string(),
            name: "Deep Work".to_string(),
            color: "#818cf8".to_string(),
            kind: CategoryKind::Productive,
        }
    }

    fn sample_block() -> TimeBlock {
        TimeBlock {
            id: "blk-1".to_string(),
            user_id: "user-1".to_string(),
            start_time: fixed_time("2024-01-01T09:00:00Z"),
            end_time: fixed_time("2024-01-01T09:45:00Z"),
            category_id: "cat-1".to_string(),
            notes: Some("morning review".to_string()),
            mood_rating: Some(4),
        }
    }

    fn sample_candidate() -> BlockCandidate {
        BlockCandidate {
            id: None,
            user_id: "user-1".to_string(),
            start_time: fixed_time("2024-01-01T09:00:00Z"),
            end_time: fixed_time("2024-01-01T09:15:00Z"),
            category_id: "cat-1".to_string(),
            notes: None,
            mood_rating: None,
        }
    }

    #[test]
    fn category_validate_accepts_valid_record() {
        assert!(sample_category().validate().is_ok());
    }

    #[test]
    fn category_validate_rejects_blank_name() {
        let mut category = sample_category();
        category.name = "   ".to_string();
        assert!(category.validate().is_err());
    }

    #[test]
    fn block_validate_is_structural_only() {
        let mut block = sample_block();
        // Reversed ranges pass the structural check; range validity belongs to
        // the write path, not admission.
        block.end_time = block.start_time;
        assert!(block.validate().is_ok());

        block.category_id = String::new();
        assert!(block.validate().is_err());
    }

    #[test]
    fn candidate_validate_rejects_empty_range() {
        let mut candidate = sample_candidate();
        candidate.end_time = candidate.start_time;
        assert!(candidate.validate().is_err());
    }

    #[test]
    fn candidate_validate_enforces_note_limit() {
        let mut candidate = sample_candidate();
        candidate.notes = Some("x".repeat(MAX_NOTE_CHARS));
        assert!(candidate.validate().is_ok());

        candidate.notes = Some("x".repeat(MAX_NOTE_CHARS + 1));
        assert!(candidate.validate().is_err());
    }

    #[test]
    fn candidate_into_block_fills_mood_default() {
        let block = sample_candidate().into_block("blk-9".to_string());
        assert_eq!(block.id, "blk-9");
        assert_eq!(block.mood_rating, Some(DEFAULT_MOOD_RATING));
    }

    #[test]
    fn local_ids_are_recognizable_and_distinct() {
        let first = next_local_id();
        let second = next_local_id();
        assert!(is_local_only(&first));
        assert!(is_local_only(&second));
        assert_ne!(first, second);
        assert!(!is_local_only("blk-1"));
    }

    #[test]
    fn normalize_color_handles_known_forms() {
        assert_eq!(normalize_color("#abc").as_deref(), Some("#aabbcc"));
        assert_eq!(normalize_color("60A5FA").as_deref(), Some("#60a5fa"));
        assert_eq!(normalize_color("rgb(255, 0, 0)").as_deref(), Some("#ff0000"));
        assert_eq!(normalize_color("hsl(120, 50%, 50%)").as_deref(), Some("#40bf40"));
        assert_eq!(normalize_color(""), None);
        assert_eq!(normalize_color("#abcd"), None);
        assert_eq!(normalize_color("rgb(300, 0, 0)"), None);
    }

    #[test]
    fn records_support_serde_roundtrip() {
        let category = sample_category();
        let block = sample_block();

        let category_roundtrip: Category =
            serde_json::from_str(&serde_json::to_string(&category).expect("serialize category"))
                .expect("deserialize category");
        let block_roundtrip: TimeBlock =
            serde_json::from_str(&serde_json::to_string(&block).expect("serialize block"))
                .expect("deserialize block");

        assert_eq!(category_roundtrip, category);
        assert_eq!(block_roundtrip, block);
    }

    #[test]
    fn category_kind_uses_wire_name() {
        let raw = serde_json::to_value(sample_category()).expect("serialize category");
        assert_eq!(raw.get("type").and_then(|v| v.as_str()), Some("productive"));
    }

    proptest! {
        #[test]
        fn rgb_inputs_normalize_to_their_hex(r in 0u16..=255, g in 0u16..=255, b in 0u16..=255) {
            let normalized = normalize_color(&format!("rgb({r}, {g}, {b})"))
                .expect("rgb in range normalizes");
            prop_assert_eq!(normalized, format!("#{r:02x}{g:02x}{b:02x}"));
        }
    }
}
