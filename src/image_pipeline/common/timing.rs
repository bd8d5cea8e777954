use std::time::{Duration, Instant};
use std::collections::HashMap;

use tracing::info;

#[derive(Debug, Clone)]
pub struct StepTiming {
    pub name: String,
    pub duration: Duration,
}

/// Wall-clock durations of the stages of one run, in execution order.
#[derive(Debug, Default)]
pub struct PipelineTimings {
    steps: Vec<StepTiming>,
    step_map: HashMap<String, Duration>,
}

impl PipelineTimings {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            step_map: HashMap::new(),
        }
    }

    pub fn add_step(&mut self, name: impl Into<String>, duration: Duration) {
        let name = name.into();
        self.steps.push(StepTiming {
            name: name.clone(),
            duration,
        });
        *self.step_map.entry(name).or_insert(Duration::ZERO) += duration;
    }

    /// Stops `timer` and records it.
    pub fn record(&mut self, timer: Timer) {
        let (name, duration) = timer.stop();
        self.add_step(name, duration);
    }

    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.duration).sum()
    }

    pub fn get_step(&self, name: &str) -> Option<Duration> {
        self.step_map.get(name).copied()
    }

    pub fn steps(&self) -> &[StepTiming] {
        &self.steps
    }

    pub fn log_summary(&self) {
        let total = self.total_duration();
        for step in &self.steps {
            let percentage = if total.as_secs_f64() > 0.0 {
                (step.duration.as_secs_f64() / total.as_secs_f64()) * 100.0
            } else {
                0.0
            };
            info!(
                step = %step.name,
                "{:>12.3}ms ({:>5.1}%)",
                step.duration.as_secs_f64() * 1000.0,
                percentage
            );
        }
        info!("total {:>12.3}ms", total.as_secs_f64() * 1000.0);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    pub fn stop(self) -> (String, Duration) {
        (self.name, self.start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_steps_accumulate_in_lookup() {
        let mut timings = PipelineTimings::new();
        timings.add_step("render_tier", Duration::from_millis(5));
        timings.add_step("index", Duration::from_millis(2));
        timings.add_step("render_tier", Duration::from_millis(7));

        assert_eq!(timings.steps().len(), 3);
        assert_eq!(timings.get_step("render_tier"), Some(Duration::from_millis(12)));
        assert_eq!(timings.total_duration(), Duration::from_millis(14));
        assert_eq!(timings.get_step("missing"), None);
    }
}
