//! Download timing statistics, bucketed by (chunk size, origin count, file size).

use std::time::Duration;

/// Bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatKey {
    pub chunk_size: u64,
    pub origin_count: usize,
    pub file_size: u64,
}

/// Elapsed times of every download that shared one key.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferStatistic {
    pub key: StatKey,
    pub durations: Vec<Duration>,
}

impl TransferStatistic {
    /// Mean elapsed time in seconds.
    pub fn mean_secs(&self) -> f64 {
        if self.durations.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.durations.iter().map(Duration::as_secs_f64).sum();
        sum / self.durations.len() as f64
    }

    /// Population standard deviation in seconds.
    pub fn std_dev_secs(&self) -> f64 {
        if self.durations.is_empty() {
            return 0.0;
        }
        let mean = self.mean_secs();
        let var: f64 = self
            .durations
            .iter()
            .map(|d| {
                let x = d.as_secs_f64() - mean;
                x * x
            })
            .sum::<f64>()
            / self.durations.len() as f64;
        var.sqrt()
    }
}

/// Accumulator shared by every download of the process. Buckets keep first-seen order.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    buckets: Vec<TransferStatistic>,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: StatKey, elapsed: Duration) {
        match self.buckets.iter_mut().find(|b| b.key == key) {
            Some(bucket) => bucket.durations.push(elapsed),
            None => self.buckets.push(TransferStatistic {
                key,
                durations: vec![elapsed],
            }),
        }
    }

    pub fn get(&self, key: &StatKey) -> Option<&TransferStatistic> {
        self.buckets.iter().find(|b| b.key == *key)
    }

    pub fn buckets(&self) -> &[TransferStatistic] {
        &self.buckets
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: StatKey = StatKey {
        chunk_size: 256,
        origin_count: 2,
        file_size: 1000,
    };

    #[test]
    fn same_key_shares_bucket() {
        let mut stats = TransferStats::new();
        stats.record(KEY, Duration::from_secs(1));
        stats.record(KEY, Duration::from_secs(3));
        assert_eq!(stats.buckets().len(), 1);
        let bucket = stats.get(&KEY).unwrap();
        assert_eq!(bucket.durations.len(), 2);
        assert!((bucket.mean_secs() - 2.0).abs() < 1e-9);
        // Population stddev of {1, 3} is 1.
        assert!((bucket.std_dev_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn different_keys_split() {
        let mut stats = TransferStats::new();
        stats.record(KEY, Duration::from_millis(500));
        stats.record(
            StatKey {
                origin_count: 3,
                ..KEY
            },
            Duration::from_millis(700),
        );
        assert_eq!(stats.buckets().len(), 2);
        assert_eq!(stats.get(&KEY).unwrap().std_dev_secs(), 0.0);
    }

    #[test]
    fn empty_bucket_is_zero() {
        let s = TransferStatistic {
            key: KEY,
            durations: vec![],
        };
        assert_eq!(s.mean_secs(), 0.0);
        assert_eq!(s.std_dev_secs(), 0.0);
    }
}
