// Pointer movement: `PreciseMover` glides in two phases with verification and
// bounded micro-corrections; `FallbackMover` jumps straight to the target.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::DeskPilotResult;
use crate::executor::input::{InputDevice, MouseButton, Press};
use crate::perception::types::Point;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Beyond this distance the pointer is always moved, even without `move_first`.
    pub move_threshold_px: f64,
    /// Fraction of the way covered by the coarse first phase.
    pub intermediate_ratio: f64,
    /// The coarse phase is skipped when it would move less than this.
    pub intermediate_min_offset_px: f64,
    pub tolerance_px: f64,
    pub correction_step_px: f64,
    pub max_correction_steps: u32,
    pub glide_ms: u64,
    pub glide_frames: u32,
    pub correction_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            move_threshold_px: 50.0,
            intermediate_ratio: 0.8,
            intermediate_min_offset_px: 10.0,
            tolerance_px: 2.0,
            correction_step_px: 2.0,
            max_correction_steps: 10,
            glide_ms: 50,
            glide_frames: 10,
            correction_ms: 20,
        }
    }
}

/// Sleeps between input events; disabled in tests.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    enabled: bool,
}

impl Pacing {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub async fn pause_ms(&self, ms: u64) {
        if self.enabled && ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

/// What to do once the pointer has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAct {
    Hover,
    Click { button: MouseButton, clicks: u32 },
    Press(MouseButton),
    Release(MouseButton),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerReport {
    pub target: Point,
    pub landed: Point,
    pub travel: f64,
    pub moved: bool,
    pub fallback: bool,
}

impl PointerReport {
    pub fn error(&self) -> (f64, f64) {
        ((self.landed.x - self.target.x).abs(), (self.landed.y - self.target.y).abs())
    }
}

fn ease_in_out_quad(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

pub(crate) async fn perform_act(
    device: &mut dyn InputDevice,
    act: PointerAct,
    pacing: Pacing,
) -> DeskPilotResult<()> {
    match act {
        PointerAct::Hover => Ok(()),
        PointerAct::Click { button, clicks } => {
            for i in 0..clicks.max(1) {
                if i > 0 {
                    pacing.pause_ms(30).await;
                }
                device.button(button, Press::Click)?;
            }
            Ok(())
        }
        PointerAct::Press(button) => device.button(button, Press::Down),
        PointerAct::Release(button) => device.button(button, Press::Up),
    }
}

#[derive(Debug, Clone)]
pub struct PreciseMover {
    config: MotionConfig,
    pacing: Pacing,
}

impl PreciseMover {
    pub fn new(config: MotionConfig, pacing: Pacing) -> Self {
        Self { config, pacing }
    }

    /// Moves along an eased curve from `from` to `to`. Integer conversion
    /// happens per frame only.
    pub async fn glide(&self, device: &mut dyn InputDevice, from: Point, to: Point) -> DeskPilotResult<()> {
        self.glide_for(device, from, to, self.config.glide_ms).await
    }

    /// Same as [`glide`](Self::glide) over an explicit duration; long glides
    /// get more frames.
    pub async fn glide_for(
        &self,
        device: &mut dyn InputDevice,
        from: Point,
        to: Point,
        duration_ms: u64,
    ) -> DeskPilotResult<()> {
        let frames = self.config.glide_frames.max((duration_ms / 20) as u32).max(1);
        let frame_ms = duration_ms / frames as u64;
        for i in 1..=frames {
            let t = ease_in_out_quad(i as f64 / frames as f64);
            let p = from.lerp(&to, t);
            let (x, y) = p.rounded();
            device.move_to(x, y)?;
            self.pacing.pause_ms(frame_ms).await;
        }
        Ok(())
    }

    /// Brings the pointer onto `target` and returns where it actually is.
    pub async fn settle(
        &self,
        device: &mut dyn InputDevice,
        target: Point,
        move_first: bool,
    ) -> DeskPilotResult<PointerReport> {
        let cfg = &self.config;
        let current = device.cursor_position()?;
        let travel = current.distance_to(&target);

        if !move_first && travel <= cfg.move_threshold_px {
            return Ok(PointerReport {
                target,
                landed: current,
                travel,
                moved: false,
                fallback: false,
            });
        }

        let intermediate = current.lerp(&target, cfg.intermediate_ratio);
        let mut from = current;
        if (intermediate.x - current.x).abs() > cfg.intermediate_min_offset_px
            || (intermediate.y - current.y).abs() > cfg.intermediate_min_offset_px
        {
            self.glide(device, current, intermediate).await?;
            from = intermediate;
        }
        self.glide(device, from, target).await?;

        let mut landed = device.cursor_position()?;
        let off_x = (landed.x - target.x).abs();
        let off_y = (landed.y - target.y).abs();
        if off_x > cfg.tolerance_px || off_y > cfg.tolerance_px {
            tracing::debug!(off_x, off_y, "pointer off target, correcting");
            let step = cfg.correction_step_px.max(0.1);
            let mut pos = landed;
            for _ in 0..cfg.max_correction_steps {
                let dx = (target.x - pos.x).clamp(-step, step);
                let dy = (target.y - pos.y).clamp(-step, step);
                if dx == 0.0 && dy == 0.0 {
                    break;
                }
                pos = Point::new(pos.x + dx, pos.y + dy);
                let (x, y) = pos.rounded();
                device.move_to(x, y)?;
                self.pacing.pause_ms(cfg.correction_ms).await;
            }
            landed = device.cursor_position()?;
        }

        Ok(PointerReport {
            target,
            landed,
            travel,
            moved: true,
            fallback: false,
        })
    }

    pub async fn perform(
        &self,
        device: &mut dyn InputDevice,
        target: Point,
        move_first: bool,
        act: PointerAct,
    ) -> DeskPilotResult<PointerReport> {
        let report = self.settle(device, target, move_first).await?;
        perform_act(device, act, self.pacing).await?;
        Ok(report)
    }
}

/// Direct, unrefined move-and-act.
#[derive(Debug, Clone)]
pub struct FallbackMover {
    pacing: Pacing,
}

impl FallbackMover {
    pub fn new(pacing: Pacing) -> Self {
        Self { pacing }
    }

    pub async fn perform(
        &self,
        device: &mut dyn InputDevice,
        target: Point,
        act: PointerAct,
    ) -> DeskPilotResult<PointerReport> {
        let (x, y) = target.rounded();
        device.move_to(x, y)?;
        perform_act(device, act, self.pacing).await?;
        let landed = Point::new(x as f64, y as f64);
        Ok(PointerReport {
            target,
            landed,
            travel: 0.0,
            moved: true,
            fallback: true,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::errors::DeskPilotError;
    use crate::executor::input::{KeyCode, ScrollAxis};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Event {
        Move(i32, i32),
        Button(MouseButton, Press),
        Scroll(i32, ScrollAxis),
        Key(KeyCode, Press),
        Text(String),
    }

    /// Records every call. `drift` is added to each move to simulate an
    /// imprecise backend; `fail_position_reads` makes location queries fail.
    #[derive(Debug, Default)]
    pub struct RecordingDevice {
        pub pos: (i32, i32),
        pub events: Vec<Event>,
        pub drift: (i32, i32),
        pub drift_moves: usize,
        pub fail_position_reads: bool,
    }

    impl RecordingDevice {
        pub fn at(x: i32, y: i32) -> Self {
            Self {
                pos: (x, y),
                ..Default::default()
            }
        }

        pub fn moves(&self) -> Vec<(i32, i32)> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Move(x, y) => Some((*x, *y)),
                    _ => None,
                })
                .collect()
        }

        pub fn clicks(&self) -> Vec<MouseButton> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Button(b, Press::Click) => Some(*b),
                    _ => None,
                })
                .collect()
        }
    }

    impl InputDevice for RecordingDevice {
        fn cursor_position(&mut self) -> DeskPilotResult<Point> {
            if self.fail_position_reads {
                return Err(DeskPilotError::Input("location unavailable".into()));
            }
            Ok(Point::new(self.pos.0 as f64, self.pos.1 as f64))
        }

        fn move_to(&mut self, x: i32, y: i32) -> DeskPilotResult<()> {
            let (dx, dy) = if self.drift_moves > 0 {
                self.drift_moves -= 1;
                self.drift
            } else {
                (0, 0)
            };
            self.pos = (x + dx, y + dy);
            self.events.push(Event::Move(x, y));
            Ok(())
        }

        fn button(&mut self, button: MouseButton, press: Press) -> DeskPilotResult<()> {
            self.events.push(Event::Button(button, press));
            Ok(())
        }

        fn scroll(&mut self, notches: i32, axis: ScrollAxis) -> DeskPilotResult<()> {
            self.events.push(Event::Scroll(notches, axis));
            Ok(())
        }

        fn key(&mut self, key: KeyCode, press: Press) -> DeskPilotResult<()> {
            self.events.push(Event::Key(key, press));
            Ok(())
        }

        fn text(&mut self, text: &str) -> DeskPilotResult<()> {
            self.events.push(Event::Text(text.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Event, RecordingDevice};
    use super::*;

    fn mover() -> PreciseMover {
        PreciseMover::new(MotionConfig::default(), Pacing::disabled())
    }

    #[tokio::test]
    async fn long_moves_pass_through_intermediate_point() {
        let mut dev = RecordingDevice::at(0, 0);
        let report = mover()
            .perform(&mut dev, Point::new(1000.0, 500.0), false, PointerAct::Hover)
            .await
            .unwrap();

        assert!(report.moved);
        assert_eq!(dev.pos, (1000, 500));
        // End of the coarse phase sits at 80 % of the way.
        assert!(dev.moves().contains(&(800, 400)));
        assert_eq!(*dev.moves().last().unwrap(), (1000, 500));
    }

    #[tokio::test]
    async fn short_moves_skip_intermediate_phase() {
        let mut dev = RecordingDevice::at(100, 100);
        mover()
            .perform(&mut dev, Point::new(108.0, 104.0), true, PointerAct::Hover)
            .await
            .unwrap();
        // Only the eased glide frames, no separate coarse glide.
        assert_eq!(dev.moves().len(), MotionConfig::default().glide_frames as usize);
        assert_eq!(dev.pos, (108, 104));
    }

    #[tokio::test]
    async fn nearby_pointer_is_not_moved_without_move_first() {
        let mut dev = RecordingDevice::at(100, 100);
        let report = mover()
            .perform(
                &mut dev,
                Point::new(120.0, 110.0),
                false,
                PointerAct::Click { button: MouseButton::Left, clicks: 1 },
            )
            .await
            .unwrap();
        assert!(!report.moved);
        assert!(dev.moves().is_empty());
        assert_eq!(dev.clicks(), vec![MouseButton::Left]);
    }

    #[tokio::test]
    async fn drift_is_corrected_in_small_steps() {
        let mut dev = RecordingDevice::at(0, 0);
        dev.drift = (7, -5);
        dev.drift_moves = 20; // every glide frame drifts
        let report = mover()
            .perform(&mut dev, Point::new(600.0, 400.0), true, PointerAct::Hover)
            .await
            .unwrap();

        let moves = dev.moves();
        let corrections: Vec<_> = moves.iter().skip(20).collect();
        assert!(!corrections.is_empty());
        assert!(corrections.len() <= 10);
        assert!(report.error().0 <= 2.0 && report.error().1 <= 2.0);
        for pair in moves[19..].windows(2) {
            assert!((pair[1].0 - pair[0].0).abs() <= 9); // drifted start, then ≤2 px steps
        }
    }

    #[tokio::test]
    async fn clicks_happen_after_settling() {
        let mut dev = RecordingDevice::at(0, 0);
        mover()
            .perform(
                &mut dev,
                Point::new(300.0, 300.0),
                true,
                PointerAct::Click { button: MouseButton::Right, clicks: 2 },
            )
            .await
            .unwrap();
        let first_click = dev
            .events
            .iter()
            .position(|e| matches!(e, Event::Button(..)))
            .unwrap();
        assert!(dev.events[..first_click].iter().all(|e| matches!(e, Event::Move(..))));
        assert_eq!(dev.clicks(), vec![MouseButton::Right, MouseButton::Right]);
    }

    #[tokio::test]
    async fn fallback_rounds_and_acts() {
        let mut dev = RecordingDevice::at(0, 0);
        let report = FallbackMover::new(Pacing::disabled())
            .perform(&mut dev, Point::new(10.6, 20.4), PointerAct::Press(MouseButton::Left))
            .await
            .unwrap();
        assert!(report.fallback);
        assert_eq!(dev.events, vec![Event::Move(11, 20), Event::Button(MouseButton::Left, Press::Down)]);
    }

    #[test]
    fn easing_is_monotonic_and_bounded() {
        let mut prev = 0.0;
        for i in 0..=100 {
            let v = ease_in_out_quad(i as f64 / 100.0);
            assert!(v >= prev && (0.0..=1.0).contains(&v));
            prev = v;
        }
        assert_eq!(ease_in_out_quad(1.0), 1.0);
    }
}
