/// Linearly weighted moving average over a ring buffer. The newest value
/// carries weight `n`, the oldest weight `1`.
///
/// The ring may retain more values than the averaging window (see
/// [`Wma::windowed`]); only the last `period` values are weighted.
#[derive(Debug, Clone)]
pub struct Wma {
    period: usize,
    buffer: Vec<f64>,
    head: usize,
    count: usize,
}

impl Wma {
    pub fn new(period: usize) -> Self {
        Self::windowed(period, period)
    }

    /// Average over the last `period` values of a ring holding `capacity`.
    pub fn windowed(period: usize, capacity: usize) -> Self {
        assert!(period > 0, "WMA period must be > 0");
        assert!(capacity >= period, "WMA capacity must cover its period");
        Self {
            period,
            buffer: vec![0.0; capacity],
            head: 0,
            count: 0,
        }
    }

    /// Push a new value and return the average over what is buffered so far.
    pub fn push(&mut self, value: f64) -> f64 {
        let cap = self.buffer.len();
        self.buffer[self.head] = value;
        self.head = (self.head + 1) % cap;
        if self.count < cap {
            self.count += 1;
        }
        self.value().unwrap_or(0.0)
    }

    pub fn value(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let cap = self.buffer.len();
        let take = self.count.min(self.period);
        let mut weighted = 0.0;
        let mut weight_sum = 0.0;
        // Walk oldest to newest so weights ascend.
        for i in 0..take {
            let idx = (self.head + cap - take + i) % cap;
            let w = (i + 1) as f64;
            weighted += self.buffer[idx] * w;
            weight_sum += w;
        }
        Some(weighted / weight_sum)
    }

    pub fn is_ready(&self) -> bool {
        self.count >= self.period
    }

    pub fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|v| *v = 0.0);
        self.head = 0;
        self.count = 0;
    }
}
