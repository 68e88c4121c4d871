// Turns parsed tool calls into input events. Calls run strictly in order; a
// failing call becomes an error line and the batch carries on. `complete_task`
// and `pause_task` end the batch and hand a `ControlSignal` back to the loop.
use std::fmt;
use std::time::Duration;

use crate::config::{ExecutorConfig, SafetyConfig};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::adapter::{AdapterRegistry, TargetType};
use crate::executor::coordinator::CoordinateTransformer;
use crate::executor::input::{primary_modifier, InputDevice, KeyCode, MouseButton, Press, ScrollAxis};
use crate::executor::motion::{FallbackMover, MotionConfig, Pacing, PointerAct, PointerReport, PreciseMover};
use crate::executor::safety;
use crate::executor::text_input;
use crate::llm::tool_parser::{ToolArgs, ToolCall};
use crate::perception::types::{Point, ScreenGeometry};

const DEFAULT_PAUSE_REASON: &str = "manual user action";
const DEFAULT_COMPLETE_MESSAGE: &str = "task completed";
/// Upper bound for `delete_text(count=…)`; larger requests are rejected.
pub const MAX_DELETE_COUNT: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    fn parse(s: &str) -> DeskPilotResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(DeskPilotError::Executor(format!("unknown scroll direction: {other}"))),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// What `delete_text` removes: everything in the field, or a number of
/// characters after the caret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    All,
    Chars(u32),
}

impl Deletion {
    /// Negative counts select everything; 1..=`MAX_DELETE_COUNT` deletes that many.
    fn from_count(count: i64) -> DeskPilotResult<Self> {
        if count < 0 {
            return Ok(Self::All);
        }
        match u32::try_from(count) {
            Ok(n) if (1..=MAX_DELETE_COUNT).contains(&n) => Ok(Self::Chars(n)),
            _ => Err(DeskPilotError::Executor(format!(
                "delete_text count must be between 1 and {MAX_DELETE_COUNT}, or negative to delete everything (got {count})"
            ))),
        }
    }
}

/// One variant per tool the model may call.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    MouseClick { x: f64, y: f64, button: MouseButton, clicks: u32, adapter: Option<String>, move_first: bool },
    DoubleClick { x: f64, y: f64, button: MouseButton, adapter: Option<String>, move_first: bool },
    RightClick { x: f64, y: f64, adapter: Option<String>, move_first: bool },
    MouseHover { x: f64, y: f64, adapter: Option<String>, move_first: bool },
    MouseDown { x: f64, y: f64, button: MouseButton, adapter: Option<String>, move_first: bool },
    MouseUp { x: f64, y: f64, button: MouseButton, adapter: Option<String>, move_first: bool },
    MouseDrag { start_x: f64, start_y: f64, end_x: f64, end_y: f64, duration: f64 },
    TypeText { text: String, at: Option<(f64, f64)>, adapter: Option<String> },
    DeleteText { x: f64, y: f64, deletion: Deletion },
    ClearInput { x: f64, y: f64 },
    ScrollWindow { x: f64, y: f64, direction: ScrollDirection, amount: Option<i32>, adapter: Option<String> },
    CloseWindow { x: f64, y: f64 },
    PressKey { key: String },
    PressEnter,
    PressWindowsKey,
    PressHotkey { hotkey: String, focus: Option<(f64, f64)> },
    OpenTerminal { command: Option<String> },
    Wait { seconds: f64 },
    PauseTask { reason: String },
    CompleteTask { message: String },
    Unknown { name: String },
}

fn required(args: &ToolArgs, key: &str, tool: &str) -> DeskPilotResult<f64> {
    args.f64(key)
        .ok_or_else(|| DeskPilotError::Executor(format!("{tool} requires a numeric `{key}` argument")))
}

fn optional_point(args: &ToolArgs) -> Option<(f64, f64)> {
    Some((args.f64("x")?, args.f64("y")?))
}

fn adapter_of(args: &ToolArgs) -> Option<String> {
    args.string("adapter_id")
        .or_else(|| args.string("adapter"))
        .filter(|s| !s.trim().is_empty())
}

fn button_of(args: &ToolArgs, default: MouseButton) -> DeskPilotResult<MouseButton> {
    match args.string("button") {
        Some(b) => MouseButton::parse(&b),
        None => Ok(default),
    }
}

impl Action {
    pub fn from_call(call: &ToolCall) -> DeskPilotResult<Self> {
        let args = &call.arguments;
        let name = call.name.as_str();
        let move_first = args.bool("move_first").unwrap_or(true);

        let action = match name {
            "mouse_click" => Self::MouseClick {
                x: required(args, "x", name)?,
                y: required(args, "y", name)?,
                button: button_of(args, MouseButton::Left)?,
                clicks: args.i64("clicks").unwrap_or(1).clamp(1, 3) as u32,
                adapter: adapter_of(args),
                move_first,
            },
            "double_click" => Self::DoubleClick {
                x: required(args, "x", name)?,
                y: required(args, "y", name)?,
                button: button_of(args, MouseButton::Left)?,
                adapter: adapter_of(args),
                move_first,
            },
            "right_click" => Self::RightClick {
                x: required(args, "x", name)?,
                y: required(args, "y", name)?,
                adapter: adapter_of(args),
                move_first,
            },
            "mouse_hover" => Self::MouseHover {
                x: required(args, "x", name)?,
                y: required(args, "y", name)?,
                adapter: adapter_of(args),
                move_first,
            },
            "mouse_down" => Self::MouseDown {
                x: required(args, "x", name)?,
                y: required(args, "y", name)?,
                button: button_of(args, MouseButton::Left)?,
                adapter: adapter_of(args),
                move_first,
            },
            "mouse_up" => Self::MouseUp {
                x: required(args, "x", name)?,
                y: required(args, "y", name)?,
                button: button_of(args, MouseButton::Left)?,
                adapter: adapter_of(args),
                move_first,
            },
            "mouse_drag" => Self::MouseDrag {
                start_x: required(args, "start_x", name)?,
                start_y: required(args, "start_y", name)?,
                end_x: required(args, "end_x", name)?,
                end_y: required(args, "end_y", name)?,
                duration: args.f64("duration").unwrap_or(0.5).clamp(0.0, 5.0),
            },
            "type_text" => Self::TypeText {
                text: args
                    .string("text")
                    .ok_or_else(|| DeskPilotError::Executor("type_text requires a `text` argument".into()))?,
                at: optional_point(args),
                adapter: adapter_of(args),
            },
            "delete_text" => Self::DeleteText {
                x: required(args, "x", name)?,
                y: required(args, "y", name)?,
                deletion: Deletion::from_count(args.i64("count").unwrap_or(1))?,
            },
            "clear_input" => Self::ClearInput {
                x: required(args, "x", name)?,
                y: required(args, "y", name)?,
            },
            "scroll_window" => Self::ScrollWindow {
                x: required(args, "x", name)?,
                y: required(args, "y", name)?,
                direction: ScrollDirection::parse(&args.string("direction").unwrap_or_else(|| "down".into()))?,
                amount: args.i64("amount").map(|a| a.clamp(1, 50) as i32),
                adapter: adapter_of(args),
            },
            "close_window" => Self::CloseWindow {
                x: required(args, "x", name)?,
                y: required(args, "y", name)?,
            },
            "press_key" => Self::PressKey {
                key: args
                    .string("key")
                    .ok_or_else(|| DeskPilotError::Executor("press_key requires a `key` argument".into()))?,
            },
            "press_enter" => Self::PressEnter,
            "press_windows_key" => Self::PressWindowsKey,
            "press_hotkey" => Self::PressHotkey {
                hotkey: args
                    .string("hotkey")
                    .or_else(|| args.string("keys"))
                    .ok_or_else(|| DeskPilotError::Executor("press_hotkey requires a `hotkey` argument".into()))?,
                focus: optional_point(args),
            },
            "open_terminal" => Self::OpenTerminal {
                command: args.string("command").filter(|c| !c.trim().is_empty()),
            },
            "wait" => Self::Wait {
                seconds: args.f64("seconds").unwrap_or(1.0),
            },
            "pause_task" => Self::PauseTask {
                reason: args
                    .string("reason")
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_PAUSE_REASON.into()),
            },
            "complete_task" => Self::CompleteTask {
                message: args
                    .string("message")
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_COMPLETE_MESSAGE.into()),
            },
            other => Self::Unknown { name: other.to_string() },
        };
        Ok(action)
    }
}

/// Raised by a control tool; the loop acts on it after the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    Pause { reason: String },
    Complete { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionEntry {
    pub tool: String,
    pub success: bool,
    pub text: String,
    /// Screen position the call acted on, if any.
    pub position: Option<Point>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    pub entries: Vec<ExecutionEntry>,
    pub signal: Option<ControlSignal>,
}

impl ExecutionReport {
    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| !e.success).count()
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(&entry.text)?;
        }
        Ok(())
    }
}

struct Outcome {
    text: String,
    position: Option<Point>,
    signal: Option<ControlSignal>,
}

impl Outcome {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            position: None,
            signal: None,
        }
    }

    fn at(text: impl Into<String>, position: Point) -> Self {
        Self {
            text: text.into(),
            position: Some(position),
            signal: None,
        }
    }
}

fn describe(report: &PointerReport) -> String {
    let (x, y) = report.target.rounded();
    format!("({x}, {y}) (precise: {:.2}, {:.2})", report.target.x, report.target.y)
}

pub struct ActionExecutor {
    device: Box<dyn InputDevice>,
    transformer: CoordinateTransformer,
    adapters: AdapterRegistry,
    precise: PreciseMover,
    fallback: FallbackMover,
    pacing: Pacing,
    config: ExecutorConfig,
    safety: SafetyConfig,
}

impl ActionExecutor {
    pub fn new(
        device: Box<dyn InputDevice>,
        adapters: AdapterRegistry,
        config: ExecutorConfig,
        motion: MotionConfig,
        safety: SafetyConfig,
    ) -> Self {
        let pacing = Pacing::new(config.pacing);
        Self {
            device,
            transformer: CoordinateTransformer::new(),
            adapters,
            precise: PreciseMover::new(motion, pacing),
            fallback: FallbackMover::new(pacing),
            pacing,
            config,
            safety,
        }
    }

    /// Geometry of the screenshot the next batch refers to.
    pub fn set_geometry(&mut self, geometry: ScreenGeometry) {
        self.transformer.set_geometry(geometry);
    }

    pub async fn execute(&mut self, calls: &[ToolCall]) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for (idx, call) in calls.iter().enumerate() {
            let result = match Action::from_call(call) {
                Ok(Action::Unknown { name }) => {
                    tracing::warn!(tool = %name, "unknown tool requested");
                    report.entries.push(ExecutionEntry {
                        tool: name.clone(),
                        success: false,
                        text: format!("Unknown tool: {name}"),
                        position: None,
                    });
                    continue;
                }
                Ok(action) => self.run(action).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(outcome) => {
                    tracing::info!(tool = %call.name, result = %outcome.text, "tool executed");
                    report.entries.push(ExecutionEntry {
                        tool: call.name.clone(),
                        success: true,
                        text: format!("Tool {} result: {}", call.name, outcome.text),
                        position: outcome.position,
                    });
                    if let Some(signal) = outcome.signal {
                        if matches!(signal, ControlSignal::Pause { .. }) {
                            for skipped in &calls[idx + 1..] {
                                report.entries.push(ExecutionEntry {
                                    tool: skipped.name.clone(),
                                    success: false,
                                    text: format!("Tool {} skipped: task paused", skipped.name),
                                    position: None,
                                });
                            }
                        }
                        report.signal = Some(signal);
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(tool = %call.name, error = %e, "tool failed");
                    report.entries.push(ExecutionEntry {
                        tool: call.name.clone(),
                        success: false,
                        text: format!("Error executing tool {}: {}", call.name, e),
                        position: None,
                    });
                }
            }
        }
        report
    }

    fn resolve(&self, x: f64, y: f64, adapter: Option<&str>, target: TargetType) -> DeskPilotResult<Point> {
        let (ax, ay) = self.adapters.apply(x, y, adapter, target);
        self.transformer.to_actual(ax, ay)
    }

    /// Precise path first; on any error one direct attempt.
    async fn pointer(&mut self, target: Point, move_first: bool, act: PointerAct) -> DeskPilotResult<PointerReport> {
        match self.precise.perform(self.device.as_mut(), target, move_first, act).await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::warn!(error = %e, "precise pointer path failed, using direct move");
                self.fallback.perform(self.device.as_mut(), target, act).await
            }
        }
    }

    async fn click_at(&mut self, target: Point) -> DeskPilotResult<PointerReport> {
        let report = self
            .pointer(target, true, PointerAct::Click { button: MouseButton::Left, clicks: 1 })
            .await?;
        self.pacing.pause_ms(100).await;
        Ok(report)
    }

    async fn run(&mut self, action: Action) -> DeskPilotResult<Outcome> {
        match action {
            Action::MouseClick { x, y, button, clicks, adapter, move_first } => {
                let target = self.resolve(x, y, adapter.as_deref(), TargetType::Click)?;
                let r = self.pointer(target, move_first, PointerAct::Click { button, clicks }).await?;
                Ok(Outcome::at(
                    format!("{} click x{} at {}", button.as_str(), clicks, describe(&r)),
                    target,
                ))
            }
            Action::DoubleClick { x, y, button, adapter, move_first } => {
                let target = self.resolve(x, y, adapter.as_deref(), TargetType::Click)?;
                let r = self.pointer(target, move_first, PointerAct::Click { button, clicks: 2 }).await?;
                Ok(Outcome::at(format!("double click at {}", describe(&r)), target))
            }
            Action::RightClick { x, y, adapter, move_first } => {
                let target = self.resolve(x, y, adapter.as_deref(), TargetType::Click)?;
                let act = PointerAct::Click { button: MouseButton::Right, clicks: 1 };
                let r = self.pointer(target, move_first, act).await?;
                Ok(Outcome::at(format!("right click at {}", describe(&r)), target))
            }
            Action::MouseHover { x, y, adapter, move_first } => {
                let target = self.resolve(x, y, adapter.as_deref(), TargetType::Click)?;
                let r = self.pointer(target, move_first, PointerAct::Hover).await?;
                Ok(Outcome::at(format!("pointer hovering at {}", describe(&r)), target))
            }
            Action::MouseDown { x, y, button, adapter, move_first } => {
                let target = self.resolve(x, y, adapter.as_deref(), TargetType::Click)?;
                let r = self.pointer(target, move_first, PointerAct::Press(button)).await?;
                Ok(Outcome::at(format!("{} button held at {}", button.as_str(), describe(&r)), target))
            }
            Action::MouseUp { x, y, button, adapter, move_first } => {
                let target = self.resolve(x, y, adapter.as_deref(), TargetType::Click)?;
                let r = self.pointer(target, move_first, PointerAct::Release(button)).await?;
                Ok(Outcome::at(format!("{} button released at {}", button.as_str(), describe(&r)), target))
            }
            Action::MouseDrag { start_x, start_y, end_x, end_y, duration } => {
                let start = self.transformer.to_actual(start_x, start_y)?;
                let end = self.transformer.to_actual(end_x, end_y)?;
                self.drag(start, end, (duration * 1000.0) as u64).await?;
                let (sx, sy) = start.rounded();
                let (ex, ey) = end.rounded();
                Ok(Outcome::at(format!("dragged from ({sx}, {sy}) to ({ex}, {ey})"), end))
            }
            Action::TypeText { text, at, adapter } => {
                let position = match at {
                    Some((x, y)) => {
                        let target = self.resolve(x, y, adapter.as_deref(), TargetType::Type)?;
                        self.click_at(target).await?;
                        Some(target)
                    }
                    None => None,
                };
                text_input::type_text(self.device.as_mut(), &text, self.pacing).await?;
                self.pacing.pause_ms(100).await;
                let place = match position {
                    Some(p) => {
                        let (px, py) = p.rounded();
                        format!(" at ({px}, {py})")
                    }
                    None => String::new(),
                };
                Ok(Outcome {
                    text: format!("typed {text:?}{place}"),
                    position,
                    signal: None,
                })
            }
            Action::DeleteText { x, y, deletion } => {
                let target = self.transformer.to_actual(x, y)?;
                self.click_at(target).await?;
                let (px, py) = target.rounded();
                match deletion {
                    Deletion::All => {
                        text_input::select_all_and_delete(self.device.as_mut())?;
                        Ok(Outcome::at(format!("deleted all content at ({px}, {py})"), target))
                    }
                    Deletion::Chars(count) => {
                        text_input::delete_forward(self.device.as_mut(), count)?;
                        Ok(Outcome::at(format!("deleted {count} characters at ({px}, {py})"), target))
                    }
                }
            }
            Action::ClearInput { x, y } => {
                let target = self.transformer.to_actual(x, y)?;
                self.click_at(target).await?;
                text_input::select_all_and_delete(self.device.as_mut())?;
                let (px, py) = target.rounded();
                Ok(Outcome::at(format!("cleared input at ({px}, {py})"), target))
            }
            Action::ScrollWindow { x, y, direction, amount, adapter } => {
                let target = self.resolve(x, y, adapter.as_deref(), TargetType::Scroll)?;
                let r = self.pointer(target, true, PointerAct::Hover).await?;
                let notches = amount.unwrap_or(self.config.scroll_notches);
                let (signed, axis) = match direction {
                    ScrollDirection::Up => (-notches, ScrollAxis::Vertical),
                    ScrollDirection::Down => (notches, ScrollAxis::Vertical),
                    ScrollDirection::Left => (-notches, ScrollAxis::Horizontal),
                    ScrollDirection::Right => (notches, ScrollAxis::Horizontal),
                };
                self.device.scroll(signed, axis)?;
                self.pacing.pause_ms(100).await;
                Ok(Outcome::at(
                    format!("scrolled {} by {notches} at {}", direction.as_str(), describe(&r)),
                    target,
                ))
            }
            Action::CloseWindow { x, y } => {
                let target = self.transformer.to_actual(x, y)?;
                let clicked = self
                    .pointer(target, true, PointerAct::Click { button: MouseButton::Left, clicks: 1 })
                    .await;
                self.pacing.pause_ms(200).await;
                match clicked {
                    Ok(r) => Ok(Outcome::at(format!("clicked close button at {}", describe(&r)), target)),
                    Err(e) => {
                        tracing::warn!(error = %e, "close button click failed, using close hotkey");
                        let chord = close_window_chord();
                        text_input::press_chord(self.device.as_mut(), &chord)?;
                        Ok(Outcome::text("closed window with the close-window hotkey"))
                    }
                }
            }
            Action::PressKey { key } => {
                let code = KeyCode::parse(&key)?;
                self.device.key(code, Press::Click)?;
                self.pacing.pause_ms(100).await;
                Ok(Outcome::text(format!("pressed {key}")))
            }
            Action::PressEnter => {
                self.device.key(KeyCode::Return, Press::Click)?;
                self.pacing.pause_ms(100).await;
                Ok(Outcome::text("pressed enter"))
            }
            Action::PressWindowsKey => {
                self.device.key(KeyCode::Meta, Press::Click)?;
                self.pacing.pause_ms(100).await;
                Ok(Outcome::text("pressed the windows key"))
            }
            Action::PressHotkey { hotkey, focus } => {
                let chord = parse_hotkey(&hotkey)?;
                let position = match focus {
                    Some((x, y)) => {
                        let target = self.transformer.to_actual(x, y)?;
                        self.click_at(target).await?;
                        Some(target)
                    }
                    None => None,
                };
                text_input::press_chord(self.device.as_mut(), &chord)?;
                self.pacing.pause_ms(150).await;
                Ok(Outcome {
                    text: format!("pressed hotkey {hotkey}"),
                    position,
                    signal: None,
                })
            }
            Action::OpenTerminal { command } => {
                safety::check_terminal_command(command.as_deref(), &self.safety)?;
                let launched = launch_terminal(command.as_deref()).await?;
                self.pacing.pause_ms(500).await;
                Ok(Outcome::text(match command {
                    Some(cmd) => format!("opened {launched} running {cmd:?}"),
                    None => format!("opened {launched}"),
                }))
            }
            Action::Wait { seconds } => {
                // Tolerates a negative or NaN bound.
                let seconds = if seconds.is_finite() {
                    seconds.min(self.config.max_wait_seconds).max(0.0)
                } else {
                    0.0
                };
                if self.config.pacing {
                    tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
                }
                Ok(Outcome::text(format!("waited {seconds} seconds")))
            }
            Action::PauseTask { reason } => Ok(Outcome {
                text: format!("task paused for '{reason}', waiting for the user to finish"),
                position: None,
                signal: Some(ControlSignal::Pause { reason }),
            }),
            Action::CompleteTask { message } => Ok(Outcome {
                text: format!("task completed: {message}"),
                position: None,
                signal: Some(ControlSignal::Complete { message }),
            }),
            Action::Unknown { name } => Err(DeskPilotError::Executor(format!("Unknown tool: {name}"))),
        }
    }

    async fn drag_precise(&mut self, start: Point, end: Point, duration_ms: u64) -> DeskPilotResult<()> {
        self.precise
            .perform(self.device.as_mut(), start, true, PointerAct::Press(MouseButton::Left))
            .await?;
        self.precise
            .glide_for(self.device.as_mut(), start, end, duration_ms)
            .await?;
        self.device.button(MouseButton::Left, Press::Up)
    }

    async fn drag(&mut self, start: Point, end: Point, duration_ms: u64) -> DeskPilotResult<()> {
        if let Err(e) = self.drag_precise(start, end, duration_ms).await {
            tracing::warn!(error = %e, "precise drag failed, using direct drag");
            // Never leave the button held.
            let _ = self.device.button(MouseButton::Left, Press::Up);
            self.fallback
                .perform(self.device.as_mut(), start, PointerAct::Press(MouseButton::Left))
                .await?;
            self.fallback
                .perform(self.device.as_mut(), end, PointerAct::Release(MouseButton::Left))
                .await?;
        }
        Ok(())
    }
}

/// Parses `ctrl+shift+t` / `Ctrl + Shift + T` into key codes.
pub fn parse_hotkey(hotkey: &str) -> DeskPilotResult<Vec<KeyCode>> {
    let compact: String = hotkey.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(DeskPilotError::Executor("empty hotkey".into()));
    }
    let keys = compact
        .split('+')
        .filter(|p| !p.is_empty())
        .map(KeyCode::parse)
        .collect::<DeskPilotResult<Vec<_>>>()?;
    if keys.is_empty() {
        return Err(DeskPilotError::Executor(format!("no keys in hotkey {hotkey:?}")));
    }
    Ok(keys)
}

fn close_window_chord() -> Vec<KeyCode> {
    if cfg!(target_os = "macos") {
        vec![primary_modifier(), KeyCode::Char('w')]
    } else {
        vec![KeyCode::Alt, KeyCode::F(4)]
    }
}

/// Spawns the platform terminal without waiting for it. Returns the program
/// that was started.
async fn launch_terminal(command: Option<&str>) -> DeskPilotResult<String> {
    let candidates: Vec<(&str, Vec<String>)> = if cfg!(target_os = "windows") {
        let mut args = vec!["/c".to_string(), "start".into(), "cmd.exe".into()];
        if let Some(cmd) = command {
            args.extend(["/k".to_string(), cmd.to_string()]);
        }
        vec![("cmd.exe", args)]
    } else if cfg!(target_os = "macos") {
        match command {
            Some(cmd) => {
                let script = format!(
                    "tell application \"Terminal\" to do script \"{}\"",
                    cmd.replace('\\', "\\\\").replace('"', "\\\"")
                );
                vec![("osascript", vec!["-e".to_string(), script])]
            }
            None => vec![("open", vec!["-a".to_string(), "Terminal".into()])],
        }
    } else {
        let shell: Vec<String> = match command {
            Some(cmd) => vec!["bash".into(), "-c".into(), format!("{cmd}; exec bash")],
            None => Vec::new(),
        };
        let with = |flag: &str| {
            if shell.is_empty() {
                Vec::new()
            } else {
                std::iter::once(flag.to_string()).chain(shell.iter().cloned()).collect()
            }
        };
        vec![
            ("gnome-terminal", with("--")),
            ("konsole", with("-e")),
            ("xterm", with("-e")),
            ("x-terminal-emulator", with("-e")),
        ]
    };

    for (program, args) in candidates {
        match tokio::process::Command::new(program).args(&args).spawn() {
            Ok(_child) => {
                tracing::info!(program, "terminal launched");
                return Ok(program.to_string());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(DeskPilotError::Executor("no terminal emulator found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::adapter::{Adapter, AdapterRule, Adjustment};
    use crate::executor::motion::testing::{Event, RecordingDevice};
    use crate::llm::tool_parser::{ToolCallParser, DEFAULT_MARKER};
    use std::sync::{Arc, Mutex};

    /// Shares a RecordingDevice with the test after it is boxed into the executor.
    struct Shared(Arc<Mutex<RecordingDevice>>);

    impl InputDevice for Shared {
        fn cursor_position(&mut self) -> DeskPilotResult<Point> {
            self.0.lock().unwrap().cursor_position()
        }
        fn move_to(&mut self, x: i32, y: i32) -> DeskPilotResult<()> {
            self.0.lock().unwrap().move_to(x, y)
        }
        fn button(&mut self, button: MouseButton, press: Press) -> DeskPilotResult<()> {
            self.0.lock().unwrap().button(button, press)
        }
        fn scroll(&mut self, notches: i32, axis: ScrollAxis) -> DeskPilotResult<()> {
            self.0.lock().unwrap().scroll(notches, axis)
        }
        fn key(&mut self, key: KeyCode, press: Press) -> DeskPilotResult<()> {
            self.0.lock().unwrap().key(key, press)
        }
        fn text(&mut self, text: &str) -> DeskPilotResult<()> {
            self.0.lock().unwrap().text(text)
        }
    }

    fn executor_with(device: RecordingDevice, adapters: AdapterRegistry, safety: SafetyConfig) -> (ActionExecutor, Arc<Mutex<RecordingDevice>>) {
        let shared = Arc::new(Mutex::new(device));
        let config = ExecutorConfig {
            pacing: false,
            ..ExecutorConfig::default()
        };
        let mut exec = ActionExecutor::new(
            Box::new(Shared(shared.clone())),
            adapters,
            config,
            MotionConfig::default(),
            safety,
        );
        exec.set_geometry(ScreenGeometry::unscaled(1920, 1080));
        (exec, shared)
    }

    fn executor() -> (ActionExecutor, Arc<Mutex<RecordingDevice>>) {
        executor_with(RecordingDevice::at(0, 0), AdapterRegistry::new(), SafetyConfig::default())
    }

    fn calls(text: &str) -> Vec<ToolCall> {
        ToolCallParser::new(DEFAULT_MARKER).unwrap().parse(text)
    }

    #[tokio::test]
    async fn centre_click_lands_on_half_resolution() {
        let (mut exec, dev) = executor();
        let report = exec.execute(&calls("mouse_click(x=0.5, y=0.5)<|tool_call|>")).await;

        assert_eq!(report.entries.len(), 1);
        assert!(report.entries[0].success);
        assert!(report.entries[0].text.starts_with("Tool mouse_click result:"));
        let dev = dev.lock().unwrap();
        assert_eq!(dev.pos, (960, 540));
        assert_eq!(dev.clicks(), vec![MouseButton::Left]);
    }

    #[tokio::test]
    async fn failures_do_not_abort_the_batch() {
        let (mut exec, dev) = executor();
        let report = exec
            .execute(&calls(
                "<|tool_call|>mouse_click(y=0.5)<|tool_call|>\n\
                 <|tool_call|>fly_away(speed=3)<|tool_call|>\n\
                 <|tool_call|>press_key(key=\"enter\")<|tool_call|>",
            ))
            .await;

        let texts: Vec<_> = report.entries.iter().map(|e| e.text.as_str()).collect();
        assert!(texts[0].starts_with("Error executing tool mouse_click:"));
        assert_eq!(texts[1], "Unknown tool: fly_away");
        assert!(texts[2].starts_with("Tool press_key result:"));
        assert_eq!(report.failures(), 2);
        assert_eq!(dev.lock().unwrap().events, vec![Event::Key(KeyCode::Return, Press::Click)]);
    }

    #[tokio::test]
    async fn complete_task_stops_the_batch() {
        let (mut exec, dev) = executor();
        let report = exec
            .execute(&calls(
                "<|tool_call|>complete_task(message=\"done\")<|tool_call|>\n\
                 <|tool_call|>press_enter()<|tool_call|>",
            ))
            .await;
        assert_eq!(report.signal, Some(ControlSignal::Complete { message: "done".into() }));
        assert_eq!(report.entries.len(), 1);
        assert!(dev.lock().unwrap().events.is_empty());
    }

    #[tokio::test]
    async fn pause_task_reports_remaining_calls_as_skipped() {
        let (mut exec, dev) = executor();
        let report = exec
            .execute(&calls(
                "<|tool_call|>pause_task(reason=\"login\")<|tool_call|>\n\
                 <|tool_call|>press_enter()<|tool_call|>",
            ))
            .await;
        assert_eq!(report.signal, Some(ControlSignal::Pause { reason: "login".into() }));
        assert_eq!(report.entries.len(), 2);
        assert!(report.entries[1].text.contains("skipped"));
        assert!(dev.lock().unwrap().events.is_empty());
    }

    #[tokio::test]
    async fn adapter_offsets_are_applied_before_transform() {
        let mut adapters = AdapterRegistry::new();
        adapters.insert(
            "browser",
            Adapter {
                name: "Browser".into(),
                rules: vec![AdapterRule {
                    kind: Some("click".into()),
                    target: None,
                    adjustment: Adjustment { x: 0.25, y: 0.0 },
                }],
            },
        );
        let (mut exec, dev) = executor_with(RecordingDevice::at(0, 0), adapters, SafetyConfig::default());
        exec.execute(&calls("mouse_click(x=0.25, y=0.5, adapter_id=\"browser\")<|tool_call|>"))
            .await;
        assert_eq!(dev.lock().unwrap().pos, (960, 540));
    }

    #[tokio::test]
    async fn broken_position_reads_fall_back_to_direct_move() {
        let device = RecordingDevice {
            fail_position_reads: true,
            ..RecordingDevice::at(10, 10)
        };
        let (mut exec, dev) = executor_with(device, AdapterRegistry::new(), SafetyConfig::default());
        let report = exec.execute(&calls("<|tool_call|>right_click(x=0.1, y=0.1)<|tool_call|>")).await;
        assert!(report.entries[0].success);
        let dev = dev.lock().unwrap();
        assert_eq!(dev.events, vec![Event::Move(192, 108), Event::Button(MouseButton::Right, Press::Click)]);
    }

    #[tokio::test]
    async fn scroll_direction_maps_to_signed_notches() {
        let (mut exec, dev) = executor();
        exec.execute(&calls(
            "<|tool_call|>scroll_window(x=0.5, y=0.5, direction=\"up\", amount=3)<|tool_call|>",
        ))
        .await;
        let dev = dev.lock().unwrap();
        assert_eq!(dev.events.last(), Some(&Event::Scroll(-3, ScrollAxis::Vertical)));
    }

    #[tokio::test]
    async fn type_text_clicks_then_types() {
        let (mut exec, dev) = executor();
        let report = exec
            .execute(&calls("<|tool_call|>type_text(text=\"hello\", x=0.5, y=0.5)<|tool_call|>"))
            .await;
        assert!(report.entries[0].success);
        assert_eq!(report.entries[0].position, Some(Point::new(960.0, 540.0)));
        let dev = dev.lock().unwrap();
        assert_eq!(dev.clicks(), vec![MouseButton::Left]);
        assert_eq!(dev.events.last(), Some(&Event::Text("hello".into())));
    }

    #[tokio::test]
    async fn hotkey_chord_is_pressed_in_order() {
        let (mut exec, dev) = executor();
        exec.execute(&calls("press_hotkey(hotkey=\"ctrl + shift + t\")\n")).await;
        let dev = dev.lock().unwrap();
        assert_eq!(
            dev.events,
            vec![
                Event::Key(KeyCode::Control, Press::Down),
                Event::Key(KeyCode::Shift, Press::Down),
                Event::Key(KeyCode::Char('t'), Press::Click),
                Event::Key(KeyCode::Shift, Press::Up),
                Event::Key(KeyCode::Control, Press::Up),
            ]
        );
    }

    #[tokio::test]
    async fn drag_presses_moves_and_releases() {
        let (mut exec, dev) = executor();
        exec.execute(&calls(
            "<|tool_call|>mouse_drag(start_x=0.1, start_y=0.1, end_x=0.5, end_y=0.5, duration=0.2)<|tool_call|>",
        ))
        .await;
        let dev = dev.lock().unwrap();
        let buttons: Vec<_> = dev
            .events
            .iter()
            .filter(|e| matches!(e, Event::Button(..)))
            .cloned()
            .collect();
        assert_eq!(
            buttons,
            vec![
                Event::Button(MouseButton::Left, Press::Down),
                Event::Button(MouseButton::Left, Press::Up),
            ]
        );
        assert_eq!(dev.pos, (960, 540));
    }

    #[tokio::test]
    async fn terminal_commands_respect_safety_policy() {
        let strict = SafetyConfig {
            allow_terminal_commands: false,
        };
        let (mut exec, _dev) = executor_with(RecordingDevice::at(0, 0), AdapterRegistry::new(), strict);
        let report = exec
            .execute(&calls("<|tool_call|>open_terminal(command=\"rm -rf ~\")<|tool_call|>"))
            .await;
        assert!(!report.entries[0].success);
        assert!(report.entries[0].text.contains("Safety violation"));
    }

    #[test]
    fn wait_takes_fractional_seconds() {
        let call = &calls("wait(seconds=2.5)\n")[0];
        assert_eq!(Action::from_call(call).unwrap(), Action::Wait { seconds: 2.5 });
    }

    #[test]
    fn delete_count_is_bounded() {
        let action = |count: &str| {
            let call = &calls(&format!("<|tool_call|>delete_text(x=0.5, y=0.5, count={count})<|tool_call|>"))[0];
            Action::from_call(call)
        };
        let deletion = |count: &str| match action(count) {
            Ok(Action::DeleteText { deletion, .. }) => Some(deletion),
            _ => None,
        };
        assert_eq!(deletion("1"), Some(Deletion::Chars(1)));
        assert_eq!(deletion("500"), Some(Deletion::Chars(MAX_DELETE_COUNT)));
        assert_eq!(deletion("-1"), Some(Deletion::All));
        assert!(action("0").is_err());
        assert!(action("501").is_err());
        assert!(action("4294967297").is_err());
    }

    #[tokio::test]
    async fn oversized_delete_presses_nothing() {
        let (mut exec, dev) = executor();
        let report = exec
            .execute(&calls("<|tool_call|>delete_text(x=0.5, y=0.5, count=4294967297)<|tool_call|>"))
            .await;
        assert!(!report.entries[0].success);
        assert!(report.entries[0].text.contains("between 1 and 500"));
        assert!(dev.lock().unwrap().events.is_empty());

        let report = exec
            .execute(&calls("<|tool_call|>delete_text(x=0.5, y=0.5, count=3)<|tool_call|>"))
            .await;
        assert!(report.entries[0].text.contains("deleted 3 characters"));
        let deletes = dev
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| **e == Event::Key(KeyCode::Delete, Press::Click))
            .count();
        assert_eq!(deletes, 3);
    }

    #[tokio::test]
    async fn wait_tolerates_a_bad_bound() {
        for bound in [-1.0, f64::NAN] {
            let config = ExecutorConfig {
                pacing: false,
                max_wait_seconds: bound,
                ..ExecutorConfig::default()
            };
            let mut exec = ActionExecutor::new(
                Box::new(RecordingDevice::at(0, 0)),
                AdapterRegistry::new(),
                config,
                MotionConfig::default(),
                SafetyConfig::default(),
            );
            let report = exec.execute(&calls("wait(seconds=2)\n")).await;
            assert!(report.entries[0].success, "bound {bound}");
        }
    }

    #[test]
    fn missing_coordinates_are_an_error() {
        let call = &calls("<|tool_call|>clear_input(x=0.5)<|tool_call|>")[0];
        assert!(Action::from_call(call).is_err());
    }

    #[test]
    fn hotkey_parsing() {
        assert_eq!(parse_hotkey("Alt+F4").unwrap(), vec![KeyCode::Alt, KeyCode::F(4)]);
        assert!(parse_hotkey(" + ").is_err());
        assert!(parse_hotkey("ctrl+hyper").is_err());
    }
}
