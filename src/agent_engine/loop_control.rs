// Step bound for one task run.
pub struct LoopController {
    max_steps: u32,
    steps: u32,
}

impl LoopController {
    pub fn new(max_steps: u32) -> Self {
        Self { max_steps, steps: 0 }
    }

    /// Starts the next step and returns its 1-based number, or `None` once
    /// `max_steps` steps have already begun.
    pub fn begin_step(&mut self) -> Option<u32> {
        if self.steps >= self.max_steps {
            tracing::warn!(max_steps = self.max_steps, "step limit reached");
            return None;
        }
        self.steps += 1;
        Some(self.steps)
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_max_steps() {
        let mut lc = LoopController::new(2);
        assert_eq!(lc.begin_step(), Some(1));
        assert_eq!(lc.begin_step(), Some(2));
        assert_eq!(lc.begin_step(), None);
        assert_eq!(lc.steps(), 2);
    }

    #[test]
    fn zero_budget_never_starts() {
        assert_eq!(LoopController::new(0).begin_step(), None);
    }
}
