use std::time::{Duration, Instant};

/// Per-connection command budget: a small token bucket so one socket can't
/// flood the room's serial processor.
#[derive(Debug, Clone)]
pub struct CommandBudget {
    tokens: u32,
    capacity: u32,
    refill_every: Duration,
    last_refill: Instant,
}

impl CommandBudget {
    pub fn new() -> Self {
        // 20 commands burst, one replenished per second
        Self::with_limits(20, Duration::from_secs(1))
    }

    pub fn with_limits(capacity: u32, refill_every: Duration) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_every,
            last_refill: Instant::now(),
        }
    }

    pub fn allow(&mut self) -> bool {
        self.refill();
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed();
        if elapsed >= self.refill_every {
            let earned = (elapsed.as_millis() / self.refill_every.as_millis()) as u32;
            self.tokens = (self.tokens + earned).min(self.capacity);
            self.last_refill = Instant::now();
        }
    }
}

impl Default for CommandBudget {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exhausts_and_refills() {
        let mut budget = CommandBudget::with_limits(2, Duration::from_millis(10));

        assert!(budget.allow());
        assert!(budget.allow());
        assert!(!budget.allow());

        std::thread::sleep(Duration::from_millis(25));
        assert!(budget.allow());
    }
}
