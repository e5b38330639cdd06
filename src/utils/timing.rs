use std::time::Duration;
use log::debug;

/// Running average of a repeated measurement (decode latency).
#[derive(Debug, Clone)]
pub struct TimingStats {
    pub name: String,
    pub total_time: Duration,
    pub max_time: Duration,
    pub count: u32,
}

impl TimingStats {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            total_time: Duration::from_secs(0),
            max_time: Duration::from_secs(0),
            count: 0,
        }
    }

    pub fn add_measurement(&mut self, duration: Duration) {
        self.total_time += duration;
        self.max_time = self.max_time.max(duration);
        self.count += 1;

        debug!("{} - Current: {:.2}ms, Avg: {:.2}ms, Count: {}",
            self.name,
            duration.as_secs_f64() * 1000.0,
            self.average_ms(),
            self.count
        );
    }

    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.total_time.as_secs_f64() * 1000.0) / self.count as f64
        }
    }
}
