use std::time;

/// Useful for cases where you want to do something once per time interval.
#[derive(Default)]
pub struct PeriodicEvent {
    last_time_triggered: Option<time::Instant>,
}

impl PeriodicEvent {
    /// Call try_take_event to see if the required time has elapsed. It will return true only once
    /// enough time has passed since it last returned true.
    pub fn try_take_event(
        &mut self,
        current_time: time::Instant,
        wait_duration: time::Duration,
    ) -> bool {
        match self.last_time_triggered {
            None => {
                self.last_time_triggered = Some(current_time);
                true
            }
            Some(last_time_triggered) => {
                if current_time - last_time_triggered >= wait_duration {
                    self.last_time_triggered = Some(current_time);
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// Simulated time. With a fixed step every update advances by the same amount regardless of how
/// long the frame took, so headless runs produce the same frames every time.
#[derive(Clone)]
pub struct TimeState {
    fixed_step: Option<time::Duration>,
    app_start_instant: time::Instant,
    previous_update_instant: time::Instant,

    total_time: time::Duration,
    previous_update_time: time::Duration,
    previous_update_dt: f32,
    update_count: u64,
}

impl TimeState {
    /// Advances by wall clock time
    #[allow(clippy::new_without_default)]
    pub fn new() -> TimeState {
        let now_instant = time::Instant::now();
        TimeState {
            fixed_step: None,
            app_start_instant: now_instant,
            previous_update_instant: now_instant,
            total_time: time::Duration::default(),
            previous_update_time: time::Duration::default(),
            previous_update_dt: 0.0,
            update_count: 0,
        }
    }

    /// Advances by `step` every update
    pub fn with_fixed_step(step: time::Duration) -> TimeState {
        TimeState {
            fixed_step: Some(step),
            ..Self::new()
        }
    }

    /// Call every frame to capture time passing and update values
    pub fn update(&mut self) {
        let now_instant = time::Instant::now();
        let elapsed = match self.fixed_step {
            Some(step) => step,
            None => now_instant - self.previous_update_instant,
        };

        self.previous_update_instant = now_instant;
        self.total_time += elapsed;
        self.previous_update_time = elapsed;
        self.previous_update_dt = elapsed.as_secs_f32();
        self.update_count += 1;
    }

    /// rust Instant object captured when the application started
    pub fn app_start_instant(&self) -> time::Instant {
        self.app_start_instant
    }

    /// Wall clock instant captured at the start of the most recent update
    pub fn current_instant(&self) -> time::Instant {
        self.previous_update_instant
    }

    /// Simulated time passed since the first update
    pub fn total_time(&self) -> time::Duration {
        self.total_time
    }

    pub fn total_seconds(&self) -> f32 {
        self.total_time.as_secs_f32()
    }

    /// duration of time passed during the previous update
    pub fn previous_update_time(&self) -> time::Duration {
        self.previous_update_time
    }

    /// previous update time in f32 seconds
    pub fn previous_update_dt(&self) -> f32 {
        self.previous_update_dt
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn is_fixed_step(&self) -> bool {
        self.fixed_step.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_step() {
        let mut time_state = TimeState::with_fixed_step(time::Duration::from_millis(20));
        assert_eq!(time_state.update_count(), 0);
        assert_eq!(time_state.previous_update_dt(), 0.0);

        for _ in 0..50 {
            time_state.update();
        }

        assert_eq!(time_state.update_count(), 50);
        assert_eq!(time_state.total_time(), time::Duration::from_secs(1));
        assert!((time_state.previous_update_dt() - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_periodic_event() {
        let mut event = PeriodicEvent::default();
        let start = time::Instant::now();
        let wait = time::Duration::from_secs(1);

        assert!(event.try_take_event(start, wait));
        assert!(!event.try_take_event(start + time::Duration::from_millis(500), wait));
        assert!(event.try_take_event(start + time::Duration::from_millis(1000), wait));
        assert!(!event.try_take_event(start + time::Duration::from_millis(1999), wait));
    }
}
