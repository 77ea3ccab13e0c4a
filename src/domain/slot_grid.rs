use crate::domain::models::TimeBlock;
use chrono::{DateTime, Duration, NaiveDate, Utc};

pub const SLOT_MINUTES: i64 = 15;
pub const SLOTS_PER_DAY: usize = (24 * 60 / SLOT_MINUTES) as usize;

pub fn slot_width() -> Duration {
    Duration::minutes(SLOT_MINUTES)
}

pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}

/// The ordered sequence of slot start instants for one day: 96 instants,
/// 15 minutes apart, beginning at midnight.
pub fn day_slots(day: NaiveDate) -> Vec<DateTime<Utc>> {
    let start = day_start(day);
    (0..SLOTS_PER_DAY as i64)
        .map(|index| start + Duration::minutes(index * SLOT_MINUTES))
        .collect()
}

/// Resolves which block occupies the slot starting at `slot`, i.e. the block
/// with `start_time <= slot < end_time`. Blocks drawn through the gesture
/// path never overlap, but remote writes are not hard-rejected, so overlaps
/// are broken deterministically: earliest start first, then lowest id.
pub fn occupying_block<'a>(slot: DateTime<Utc>, blocks: &'a [TimeBlock]) -> Option<&'a TimeBlock> {
    blocks
        .iter()
        .filter(|block| block.start_time <= slot && slot < block.end_time)
        .min_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.id.cmp(&b.id))
        })
}
