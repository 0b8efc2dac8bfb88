//! Average visit duration per calendar bucket.

use crate::models::EventRecord;

use super::models::DurationPoint;
use super::window::TimeBucket;

/// One point per bucket, in bucket order, zero-filled. Records without a
/// valid duration and records outside every bucket do not contribute.
pub fn bucket_durations(records: &[EventRecord], buckets: &[TimeBucket]) -> Vec<DurationPoint> {
    let mut sums = vec![(0u64, 0i128); buckets.len()];

    for record in records {
        let Some(duration) = record.valid_duration() else {
            continue;
        };
        // buckets are sorted and contiguous
        let position = buckets.partition_point(|bucket| bucket.end <= record.created_at);
        if let Some(bucket) = buckets.get(position) {
            if bucket.contains(record.created_at) {
                let (count, total) = &mut sums[position];
                *count += 1;
                *total += i128::from(duration);
            }
        }
    }

    buckets
        .iter()
        .zip(sums)
        .map(|(bucket, (count, total))| DurationPoint {
            bucket_start: bucket.start,
            bucket_end: bucket.end,
            count,
            average: if count == 0 {
                0.0
            } else {
                total as f64 / count as f64
            },
        })
        .collect()
}
