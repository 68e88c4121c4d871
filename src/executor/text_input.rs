// CJK-aware text entry.
// Input methods swallow bulk CJK strings on some backends, so those are
// typed one character at a time with a short gap. Everything else goes
// through the device in a single call.
use crate::errors::DeskPilotResult;
use crate::executor::input::{primary_modifier, InputDevice, KeyCode, Press};
use crate::executor::motion::Pacing;

const CJK_CHAR_GAP_MS: u64 = 20;

/// Returns true if the text contains CJK (Chinese/Japanese/Korean) characters.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| {
        ('\u{4e00}'..='\u{9fff}').contains(&c)
            || ('\u{3400}'..='\u{4dbf}').contains(&c)
            || ('\u{3040}'..='\u{309f}').contains(&c)
            || ('\u{30a0}'..='\u{30ff}').contains(&c)
            || ('\u{ac00}'..='\u{d7af}').contains(&c)
            || ('\u{3000}'..='\u{303f}').contains(&c)
            || ('\u{ff00}'..='\u{ffef}').contains(&c)
    })
}

pub async fn type_text(device: &mut dyn InputDevice, text: &str, pacing: Pacing) -> DeskPilotResult<()> {
    if text.is_empty() {
        return Ok(());
    }
    if !contains_cjk(text) {
        return device.text(text);
    }

    tracing::debug!(chars = text.chars().count(), "typing CJK text per character");
    let mut buf = [0u8; 4];
    for c in text.chars() {
        device.text(c.encode_utf8(&mut buf))?;
        pacing.pause_ms(CJK_CHAR_GAP_MS).await;
    }
    Ok(())
}

/// Holds every modifier, taps the final key, then releases in reverse order.
pub fn press_chord(device: &mut dyn InputDevice, keys: &[KeyCode]) -> DeskPilotResult<()> {
    let Some((last, modifiers)) = keys.split_last() else {
        return Ok(());
    };
    for key in modifiers {
        device.key(*key, Press::Down)?;
    }
    let tapped = device.key(*last, Press::Click);
    for key in modifiers.iter().rev() {
        device.key(*key, Press::Up)?;
    }
    tapped
}

/// Selects the whole field content and deletes it.
pub fn select_all_and_delete(device: &mut dyn InputDevice) -> DeskPilotResult<()> {
    press_chord(device, &[primary_modifier(), KeyCode::Char('a')])?;
    device.key(KeyCode::Delete, Press::Click)
}

/// Presses Delete `count` times at the caret.
pub fn delete_forward(device: &mut dyn InputDevice, count: u32) -> DeskPilotResult<()> {
    for _ in 0..count {
        device.key(KeyCode::Delete, Press::Click)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::motion::testing::{Event, RecordingDevice};

    #[test]
    fn detects_cjk() {
        assert!(contains_cjk("搜索 rust"));
        assert!(contains_cjk("こんにちは"));
        assert!(contains_cjk("안녕"));
        assert!(!contains_cjk("hello, world"));
    }

    #[tokio::test]
    async fn latin_text_is_sent_at_once() {
        let mut dev = RecordingDevice::default();
        type_text(&mut dev, "hello world", Pacing::disabled()).await.unwrap();
        assert_eq!(dev.events, vec![Event::Text("hello world".into())]);
    }

    #[tokio::test]
    async fn cjk_text_is_sent_per_character() {
        let mut dev = RecordingDevice::default();
        type_text(&mut dev, "天气a", Pacing::disabled()).await.unwrap();
        assert_eq!(
            dev.events,
            vec![
                Event::Text("天".into()),
                Event::Text("气".into()),
                Event::Text("a".into()),
            ]
        );
    }

    #[test]
    fn chord_releases_in_reverse_order() {
        let mut dev = RecordingDevice::default();
        press_chord(&mut dev, &[KeyCode::Control, KeyCode::Shift, KeyCode::Escape]).unwrap();
        assert_eq!(
            dev.events,
            vec![
                Event::Key(KeyCode::Control, Press::Down),
                Event::Key(KeyCode::Shift, Press::Down),
                Event::Key(KeyCode::Escape, Press::Click),
                Event::Key(KeyCode::Shift, Press::Up),
                Event::Key(KeyCode::Control, Press::Up),
            ]
        );
    }
}
