// Physical input simulation.
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::perception::types::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn parse(name: &str) -> DeskPilotResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "left" | "" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "middle" => Ok(Self::Middle),
            other => Err(DeskPilotError::Executor(format!("unknown mouse button: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Press {
    Down,
    Up,
    Click,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAxis {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Control,
    Alt,
    Shift,
    Meta,
    Return,
    Tab,
    Escape,
    Backspace,
    Delete,
    Space,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
    Char(char),
}

impl KeyCode {
    /// Accepts the names models tend to use: `ctrl`, `win`, `cmd`, `enter`, `f5`, `a`, …
    pub fn parse(name: &str) -> DeskPilotResult<Self> {
        let lower = name.trim().to_lowercase();
        let key = match lower.as_str() {
            "ctrl" | "control" => Self::Control,
            "alt" | "option" => Self::Alt,
            "shift" => Self::Shift,
            "win" | "windows" | "winleft" | "super" | "meta" | "cmd" | "command" => Self::Meta,
            "enter" | "return" => Self::Return,
            "tab" => Self::Tab,
            "esc" | "escape" => Self::Escape,
            "backspace" => Self::Backspace,
            "delete" | "del" => Self::Delete,
            "space" => Self::Space,
            "up" => Self::Up,
            "down" => Self::Down,
            "left" => Self::Left,
            "right" => Self::Right,
            "home" => Self::Home,
            "end" => Self::End,
            "pageup" | "pgup" => Self::PageUp,
            "pagedown" | "pgdn" => Self::PageDown,
            f if f.len() >= 2 && f.starts_with('f') && f[1..].chars().all(|c| c.is_ascii_digit()) => {
                match f[1..].parse::<u8>() {
                    Ok(n @ 1..=12) => Self::F(n),
                    _ => return Err(DeskPilotError::Executor(format!("unsupported function key: {name}"))),
                }
            }
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Self::Char(c),
                    _ => return Err(DeskPilotError::Executor(format!("unknown key: {name}"))),
                }
            }
        };
        Ok(key)
    }
}

/// Modifier used for select-all / copy / paste on this platform.
pub fn primary_modifier() -> KeyCode {
    if cfg!(target_os = "macos") {
        KeyCode::Meta
    } else {
        KeyCode::Control
    }
}

/// The single shared mouse/keyboard. Implementations are driven from one
/// worker thread only.
pub trait InputDevice {
    fn cursor_position(&mut self) -> DeskPilotResult<Point>;
    fn move_to(&mut self, x: i32, y: i32) -> DeskPilotResult<()>;
    fn button(&mut self, button: MouseButton, press: Press) -> DeskPilotResult<()>;
    /// Positive notches scroll down (or right), negative up (or left).
    fn scroll(&mut self, notches: i32, axis: ScrollAxis) -> DeskPilotResult<()>;
    fn key(&mut self, key: KeyCode, press: Press) -> DeskPilotResult<()>;
    fn text(&mut self, text: &str) -> DeskPilotResult<()>;
}

/// `enigo`-backed device. Must be created on the thread that uses it.
pub struct EnigoInput {
    enigo: Enigo,
}

impl EnigoInput {
    pub fn new() -> DeskPilotResult<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| DeskPilotError::Input(format!("failed to open input backend: {e}")))?;
        Ok(Self { enigo })
    }
}

fn input_err(e: enigo::InputError) -> DeskPilotError {
    DeskPilotError::Input(e.to_string())
}

fn to_enigo_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}

fn to_direction(press: Press) -> Direction {
    match press {
        Press::Down => Direction::Press,
        Press::Up => Direction::Release,
        Press::Click => Direction::Click,
    }
}

fn to_enigo_key(key: KeyCode) -> Key {
    match key {
        KeyCode::Control => Key::Control,
        KeyCode::Alt => Key::Alt,
        KeyCode::Shift => Key::Shift,
        KeyCode::Meta => Key::Meta,
        KeyCode::Return => Key::Return,
        KeyCode::Tab => Key::Tab,
        KeyCode::Escape => Key::Escape,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Space => Key::Space,
        KeyCode::Up => Key::UpArrow,
        KeyCode::Down => Key::DownArrow,
        KeyCode::Left => Key::LeftArrow,
        KeyCode::Right => Key::RightArrow,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::F(n) => match n {
            1 => Key::F1,
            2 => Key::F2,
            3 => Key::F3,
            4 => Key::F4,
            5 => Key::F5,
            6 => Key::F6,
            7 => Key::F7,
            8 => Key::F8,
            9 => Key::F9,
            10 => Key::F10,
            11 => Key::F11,
            _ => Key::F12,
        },
        KeyCode::Char(c) => Key::Unicode(c),
    }
}

impl InputDevice for EnigoInput {
    fn cursor_position(&mut self) -> DeskPilotResult<Point> {
        let (x, y) = self.enigo.location().map_err(input_err)?;
        Ok(Point::new(x as f64, y as f64))
    }

    fn move_to(&mut self, x: i32, y: i32) -> DeskPilotResult<()> {
        self.enigo.move_mouse(x, y, Coordinate::Abs).map_err(input_err)
    }

    fn button(&mut self, button: MouseButton, press: Press) -> DeskPilotResult<()> {
        self.enigo
            .button(to_enigo_button(button), to_direction(press))
            .map_err(input_err)
    }

    fn scroll(&mut self, notches: i32, axis: ScrollAxis) -> DeskPilotResult<()> {
        let axis = match axis {
            ScrollAxis::Vertical => Axis::Vertical,
            ScrollAxis::Horizontal => Axis::Horizontal,
        };
        self.enigo.scroll(notches, axis).map_err(input_err)
    }

    fn key(&mut self, key: KeyCode, press: Press) -> DeskPilotResult<()> {
        self.enigo.key(to_enigo_key(key), to_direction(press)).map_err(input_err)
    }

    fn text(&mut self, text: &str) -> DeskPilotResult<()> {
        self.enigo.text(text).map_err(input_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_key_names() {
        assert_eq!(KeyCode::parse("Ctrl").unwrap(), KeyCode::Control);
        assert_eq!(KeyCode::parse("windows").unwrap(), KeyCode::Meta);
        assert_eq!(KeyCode::parse("enter").unwrap(), KeyCode::Return);
        assert_eq!(KeyCode::parse("F4").unwrap(), KeyCode::F(4));
        assert_eq!(KeyCode::parse("a").unwrap(), KeyCode::Char('a'));
        assert_eq!(KeyCode::parse("F").unwrap(), KeyCode::Char('f'));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(KeyCode::parse("hyper").is_err());
        assert!(KeyCode::parse("f13").is_err());
        assert!(KeyCode::parse("").is_err());
    }

    #[test]
    fn parses_buttons() {
        assert_eq!(MouseButton::parse("RIGHT").unwrap(), MouseButton::Right);
        assert_eq!(MouseButton::parse("").unwrap(), MouseButton::Left);
        assert!(MouseButton::parse("fourth").is_err());
    }
}
