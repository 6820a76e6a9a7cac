//! Terminal keyboard surface for the `play` command
//!
//! - Left/Right: cutoff down/up, Down/Up: Q down/up (held)
//! - Space: play/pause
//! - 0-9: seek to tenths of the source
//! - o: reload the next file
//! - q/Esc: quit
//!
//! Terminals that report key releases get exact hold tracking. Elsewhere a
//! held key is considered released once its auto-repeat stops arriving.

use anyhow::Result;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use resonant_core::domain::filter::Adjustment;
use resonant_core::domain::streaming::{ControlEvent, ControlSender};
use std::collections::HashMap;
use std::io::stdout;
use std::panic;
use std::time::{Duration, Instant};
use tracing::debug;

/// Hold window when the terminal only reports presses (covers the initial
/// auto-repeat delay)
const REPEAT_HOLD: Duration = Duration::from_millis(550);

/// What a key means to the session
#[derive(Debug, Clone, PartialEq)]
pub enum KeyInput {
    Hold(Adjustment),
    Release(Adjustment),
    Control(ControlEvent),
    ReloadNext,
    Quit,
}

/// Map a terminal key event to a session input
pub fn translate(key: &KeyEvent) -> Option<KeyInput> {
    let adjustment = match key.code {
        KeyCode::Left => Some(Adjustment::CutoffDown),
        KeyCode::Right => Some(Adjustment::CutoffUp),
        KeyCode::Down => Some(Adjustment::QDown),
        KeyCode::Up => Some(Adjustment::QUp),
        _ => None,
    };
    if let Some(adjustment) = adjustment {
        return Some(match key.kind {
            KeyEventKind::Release => KeyInput::Release(adjustment),
            KeyEventKind::Press | KeyEventKind::Repeat => KeyInput::Hold(adjustment),
        });
    }

    if key.kind == KeyEventKind::Release {
        return None;
    }

    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(KeyInput::Quit),
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyInput::Quit),
        KeyCode::Char(' ') => Some(KeyInput::Control(ControlEvent::TogglePlayback)),
        KeyCode::Char('o') => Some(KeyInput::ReloadNext),
        KeyCode::Char(c) => c
            .to_digit(10)
            .map(|d| KeyInput::Control(ControlEvent::Seek(d as f64 / 10.0))),
        _ => None,
    }
}

/// Tracks which adjustment keys are held
#[derive(Debug)]
pub struct HeldAdjustments {
    /// Last press per key; `None` expiry means wait for an explicit release
    held: HashMap<Adjustment, Instant>,
    expiry: Option<Duration>,
}

impl HeldAdjustments {
    /// Tracker for terminals that report releases
    pub fn with_release_events() -> Self {
        Self {
            held: HashMap::new(),
            expiry: None,
        }
    }

    /// Tracker that times out keys whose repeats stop arriving
    pub fn with_timeout(expiry: Duration) -> Self {
        Self {
            held: HashMap::new(),
            expiry: Some(expiry),
        }
    }

    pub fn press(&mut self, adjustment: Adjustment, now: Instant) {
        self.held.insert(adjustment, now);
    }

    pub fn release(&mut self, adjustment: Adjustment) {
        self.held.remove(&adjustment);
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Events for one tick: one `Adjust` per held key, then `AdjustReleased`
    /// on the tick the last key lets go
    pub fn tick(&mut self, now: Instant) -> Vec<ControlEvent> {
        let was_held = !self.held.is_empty();

        if let Some(expiry) = self.expiry {
            self.held
                .retain(|_, pressed| now.saturating_duration_since(*pressed) < expiry);
        }

        let mut adjustments: Vec<Adjustment> = self.held.keys().copied().collect();
        adjustments.sort_by_key(|a| *a as u8);

        let mut events: Vec<ControlEvent> =
            adjustments.into_iter().map(ControlEvent::Adjust).collect();
        if was_held && self.held.is_empty() {
            events.push(ControlEvent::AdjustReleased);
        }
        events
    }
}

/// Raw-mode terminal session; restores the terminal on drop or panic
pub struct KeyboardSurface {
    sender: ControlSender,
    held: HeldAdjustments,
    enhanced: bool,
}

impl KeyboardSurface {
    pub fn new(sender: ControlSender) -> Result<Self> {
        let enhanced = supports_keyboard_enhancement().unwrap_or(false);

        // Keyboard enhancements must come before the alternate screen
        if enhanced {
            stdout().execute(PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::REPORT_EVENT_TYPES,
            ))?;
        }

        enable_raw_mode()?;
        stdout().execute(EnterAlternateScreen)?;
        stdout().execute(crossterm::cursor::Hide)?;

        let original_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            cleanup_terminal(enhanced);
            original_hook(panic_info);
        }));

        debug!(enhanced, "Keyboard surface ready");

        let held = if enhanced {
            HeldAdjustments::with_release_events()
        } else {
            HeldAdjustments::with_timeout(REPEAT_HOLD)
        };

        Ok(Self {
            sender,
            held,
            enhanced,
        })
    }

    /// Read keys until `deadline`, queueing control events, then queue this
    /// tick's held adjustments. Returns the non-control inputs seen.
    pub fn pump(&mut self, deadline: Instant) -> Result<Vec<KeyInput>> {
        let mut other = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !event::poll(remaining)? {
                break;
            }
            let Event::Key(key) = event::read()? else {
                continue;
            };

            match translate(&key) {
                Some(KeyInput::Hold(adjustment)) => self.held.press(adjustment, Instant::now()),
                Some(KeyInput::Release(adjustment)) => self.held.release(adjustment),
                Some(KeyInput::Control(event)) => {
                    self.sender.send(event);
                }
                Some(input) => other.push(input),
                None => {}
            }

            if remaining.is_zero() {
                break;
            }
        }

        for event in self.held.tick(Instant::now()) {
            self.sender.send(event);
        }
        Ok(other)
    }

    pub fn sender(&self) -> &ControlSender {
        &self.sender
    }
}

impl Drop for KeyboardSurface {
    fn drop(&mut self) {
        cleanup_terminal(self.enhanced);
        let _ = panic::take_hook();
    }
}

fn cleanup_terminal(has_keyboard_enhancements: bool) {
    if has_keyboard_enhancements {
        let _ = stdout().execute(PopKeyboardEnhancementFlags);
    }
    let _ = stdout().execute(crossterm::cursor::Show);
    let _ = stdout().execute(LeaveAlternateScreen);
    let _ = disable_raw_mode();
}
