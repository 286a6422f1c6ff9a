use std::collections::VecDeque;

use crate::types::ButtonEvent;

/// Presses shorter than this are contact bounce.
pub const DEBOUNCE_MS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Press {
    Short,
    Long,
}

/// Turns sampled pin levels into presses. A long press fires once while
/// still held; its release is swallowed.
#[derive(Debug, Clone)]
pub struct PressTracker {
    long_press_ms: u64,
    pressed_since: Option<u64>,
    long_fired: bool,
}

impl PressTracker {
    pub fn new(long_press_ms: u64) -> Self {
        Self {
            long_press_ms,
            pressed_since: None,
            long_fired: false,
        }
    }

    pub fn update(&mut self, pressed: bool, now_ms: u64) -> Option<Press> {
        match (pressed, self.pressed_since) {
            (true, None) => {
                self.pressed_since = Some(now_ms);
                self.long_fired = false;
                None
            }
            (true, Some(since)) => {
                if !self.long_fired && now_ms.saturating_sub(since) >= self.long_press_ms {
                    self.long_fired = true;
                    Some(Press::Long)
                } else {
                    None
                }
            }
            (false, Some(since)) => {
                self.pressed_since = None;
                let held = now_ms.saturating_sub(since);
                (!self.long_fired && held >= DEBOUNCE_MS).then_some(Press::Short)
            }
            (false, None) => None,
        }
    }
}

/// Scroll and Select buttons. Holding Select yields `Hold`; Scroll has no
/// long-press meaning and reports `Next` either way.
///
/// One event comes out per sample. Events that land on the same sample wait
/// for the next one, Select first.
#[derive(Debug, Clone)]
pub struct ButtonPanel {
    scroll: PressTracker,
    select: PressTracker,
    pending: VecDeque<ButtonEvent>,
}

impl ButtonPanel {
    pub fn new(long_press_ms: u64) -> Self {
        Self {
            scroll: PressTracker::new(long_press_ms),
            select: PressTracker::new(long_press_ms),
            pending: VecDeque::new(),
        }
    }

    pub fn update(&mut self, scroll_pressed: bool, select_pressed: bool, now_ms: u64) -> Option<ButtonEvent> {
        if let Some(press) = self.select.update(select_pressed, now_ms) {
            self.pending.push_back(match press {
                Press::Short => ButtonEvent::Select,
                Press::Long => ButtonEvent::Hold,
            });
        }
        if self.scroll.update(scroll_pressed, now_ms).is_some() {
            self.pending.push_back(ButtonEvent::Next);
        }
        self.pending.pop_front()
    }
}
