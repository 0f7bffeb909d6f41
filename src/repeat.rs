// Key repeat module
// Re-issues the command of a held key at the compositor's repeat rate

use crate::app::Command;
use std::time::{Duration, Instant};

/// Fallback when the compositor never sends repeat info (25 keys/s after 600 ms)
const DEFAULT_RATE: u32 = 25;
const DEFAULT_DELAY_MS: u32 = 600;

#[derive(Debug, Clone, Copy)]
struct HeldKey {
    raw_code: u32,
    command: Command,
    next_fire: Instant,
}

#[derive(Debug)]
pub struct KeyRepeat {
    /// `None` when repeat is disabled
    interval: Option<Duration>,
    delay: Duration,
    held: Option<HeldKey>,
}

impl Default for KeyRepeat {
    fn default() -> Self {
        let mut repeat = Self {
            interval: None,
            delay: Duration::ZERO,
            held: None,
        };
        repeat.set_rate(DEFAULT_RATE, DEFAULT_DELAY_MS);
        repeat
    }
}

impl KeyRepeat {
    /// Repeat `rate` times per second once a key has been held for `delay_ms`.
    /// A zero rate disables repeat.
    pub fn set_rate(&mut self, rate: u32, delay_ms: u32) {
        self.interval = (rate > 0).then(|| Duration::from_secs(1) / rate);
        self.delay = Duration::from_millis(delay_ms as u64);
        if self.interval.is_none() {
            self.held = None;
        }
    }

    pub fn disable(&mut self) {
        self.set_rate(0, 0);
    }

    /// A key mapped to `command` went down; it replaces any held key
    pub fn press(&mut self, raw_code: u32, command: Command, now: Instant) {
        if self.interval.is_none() {
            return;
        }
        self.held = Some(HeldKey {
            raw_code,
            command,
            next_fire: now + self.delay,
        });
    }

    /// Stop repeating if `raw_code` is the held key
    pub fn release(&mut self, raw_code: u32) {
        if self.held.is_some_and(|held| held.raw_code == raw_code) {
            self.held = None;
        }
    }

    /// Forget the held key (focus lost)
    pub fn clear(&mut self) {
        self.held = None;
    }

    /// Next repeated command due at `now`, if any. Call until it returns
    /// `None` to catch up on every repeat since the last poll.
    pub fn due(&mut self, now: Instant) -> Option<Command> {
        let interval = self.interval?;
        let held = self.held.as_mut()?;
        if now < held.next_fire {
            return None;
        }
        held.next_fire += interval;
        Some(held.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_LEFT: u32 = 105;
    const KEY_MINUS: u32 = 12;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn drain(repeat: &mut KeyRepeat, now: Instant) -> Vec<Command> {
        std::iter::from_fn(|| repeat.due(now)).collect()
    }

    #[test]
    fn nothing_repeats_before_the_delay() {
        let t0 = Instant::now();
        let mut repeat = KeyRepeat::default();
        repeat.set_rate(25, 600);
        repeat.press(KEY_LEFT, Command::PanLeft, t0);

        assert_eq!(repeat.due(t0), None);
        assert_eq!(repeat.due(t0 + ms(599)), None);
    }

    #[test]
    fn repeats_at_the_configured_rate() {
        let t0 = Instant::now();
        let mut repeat = KeyRepeat::default();
        repeat.set_rate(25, 600);
        repeat.press(KEY_LEFT, Command::PanLeft, t0);

        assert_eq!(repeat.due(t0 + ms(600)), Some(Command::PanLeft));
        assert_eq!(repeat.due(t0 + ms(600)), None);
        assert_eq!(repeat.due(t0 + ms(639)), None);
        assert_eq!(repeat.due(t0 + ms(640)), Some(Command::PanLeft));
    }

    #[test]
    fn late_poll_catches_up() {
        let t0 = Instant::now();
        let mut repeat = KeyRepeat::default();
        repeat.set_rate(10, 100);
        repeat.press(KEY_MINUS, Command::ZoomOut, t0);

        // fires at 100, 200, 300, 400 ms
        assert_eq!(drain(&mut repeat, t0 + ms(450)).len(), 4);
        assert!(drain(&mut repeat, t0 + ms(450)).is_empty());
    }

    #[test]
    fn release_stops_only_the_held_key() {
        let t0 = Instant::now();
        let mut repeat = KeyRepeat::default();
        repeat.set_rate(25, 0);
        repeat.press(KEY_LEFT, Command::PanLeft, t0);

        repeat.release(KEY_MINUS);
        assert_eq!(repeat.due(t0), Some(Command::PanLeft));

        repeat.release(KEY_LEFT);
        assert_eq!(repeat.due(t0 + ms(1000)), None);
    }

    #[test]
    fn new_press_replaces_held_key() {
        let t0 = Instant::now();
        let mut repeat = KeyRepeat::default();
        repeat.set_rate(25, 0);
        repeat.press(KEY_LEFT, Command::PanLeft, t0);
        repeat.press(KEY_MINUS, Command::ZoomOut, t0);

        assert_eq!(repeat.due(t0), Some(Command::ZoomOut));
        repeat.release(KEY_LEFT);
        assert_eq!(repeat.due(t0 + ms(40)), Some(Command::ZoomOut));
    }

    #[test]
    fn clear_and_disable_stop_repeat() {
        let t0 = Instant::now();
        let mut repeat = KeyRepeat::default();
        repeat.press(KEY_LEFT, Command::PanLeft, t0);
        repeat.clear();
        assert!(drain(&mut repeat, t0 + ms(5000)).is_empty());

        repeat.press(KEY_LEFT, Command::PanLeft, t0);
        repeat.disable();
        assert!(drain(&mut repeat, t0 + ms(5000)).is_empty());

        repeat.press(KEY_LEFT, Command::PanLeft, t0);
        assert!(drain(&mut repeat, t0 + ms(5000)).is_empty());
    }

    #[test]
    fn default_rate_applies_without_repeat_info() {
        let t0 = Instant::now();
        let mut repeat = KeyRepeat::default();
        repeat.press(KEY_LEFT, Command::PanUp, t0);
        assert_eq!(repeat.due(t0 + ms(599)), None);
        assert_eq!(repeat.due(t0 + ms(600)), Some(Command::PanUp));
    }
}
