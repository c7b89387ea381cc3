//! Per-connection price samples ordered by timestamp.

/// Price samples keyed by timestamp, kept sorted for range queries.
///
/// Inserting a timestamp that is already present replaces its price.
#[derive(Debug, Default)]
pub struct PriceHistory {
    samples: Vec<(i32, i32)>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct timestamps held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Record `price` at `timestamp`.
    pub fn insert(&mut self, timestamp: i32, price: i32) {
        let idx = self.lower_bound(timestamp);
        match self.samples.get_mut(idx) {
            Some(sample) if sample.0 == timestamp => sample.1 = price,
            _ => self.samples.insert(idx, (timestamp, price)),
        }
    }

    /// Mean price over `min_time..=max_time`, truncated toward zero.
    ///
    /// Zero when the range is inverted or holds no samples.
    pub fn mean(&self, min_time: i32, max_time: i32) -> i32 {
        if min_time > max_time {
            return 0;
        }

        let start = self.lower_bound(min_time);
        let (sum, count) = self.samples[start..]
            .iter()
            .take_while(|(ts, _)| *ts <= max_time)
            .fold((0i64, 0i64), |(sum, count), (_, price)| {
                (sum + i64::from(*price), count + 1)
            });

        if count == 0 {
            0
        } else {
            (sum / count) as i32
        }
    }

    fn lower_bound(&self, timestamp: i32) -> usize {
        self.samples.partition_point(|(ts, _)| *ts < timestamp)
    }
}
