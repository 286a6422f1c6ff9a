use crate::{config::ClockConfig, screen::Screen};

pub const BOOT_TITLE: &str = "DESK CLOCK";

pub const FETCH_STAGES: [&str; 4] = [
    "Syncing time",
    "Loading timezones",
    "Reading selection",
    "Ready!",
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    screen: Screen,
    duration_ms: u64,
}

/// Timed frames advanced by the poll loop instead of blocking delays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSequence {
    steps: Vec<Step>,
    started_ms: u64,
}

impl StepSequence {
    pub fn new(started_ms: u64) -> Self {
        Self {
            steps: Vec::new(),
            started_ms,
        }
    }

    pub fn then(mut self, screen: Screen, duration_ms: u64) -> Self {
        self.steps.push(Step {
            screen,
            duration_ms,
        });
        self
    }

    pub fn boot_animation(config: &ClockConfig, now_ms: u64) -> Self {
        let chars: Vec<char> = BOOT_TITLE.chars().collect();
        let mut sequence = Self::new(now_ms);
        for typed in 0..=chars.len() {
            let hold = if typed == chars.len() {
                config.boot_hold_ms
            } else {
                0
            };
            let mut text = String::from(">");
            text.extend(&chars[..typed]);
            sequence = sequence.then(Screen::Boot { typed: text }, config.boot_char_ms + hold);
        }
        sequence
    }

    pub fn fetch_progress(config: &ClockConfig, now_ms: u64) -> Self {
        let mut sequence = Self::new(now_ms);
        for stage in FETCH_STAGES {
            for percent in (0..=100_u8).step_by(10) {
                let hold = if percent == 100 {
                    config.progress_stage_hold_ms
                } else {
                    0
                };
                sequence = sequence.then(
                    Screen::Progress {
                        stage: stage.to_string(),
                        percent,
                    },
                    config.progress_tick_ms + hold,
                );
            }
        }
        sequence
    }

    pub fn message(text: &str, hold_ms: u64, now_ms: u64) -> Self {
        Self::new(now_ms).then(
            Screen::Message {
                text: text.to_string(),
            },
            hold_ms,
        )
    }

    pub fn followed_by(mut self, next: StepSequence) -> Self {
        self.steps.extend(next.steps);
        self
    }

    pub fn total_ms(&self) -> u64 {
        self.steps.iter().map(|step| step.duration_ms).sum()
    }

    pub fn poll(&self, now_ms: u64) -> Option<&Screen> {
        let mut remaining = now_ms.saturating_sub(self.started_ms);
        for step in &self.steps {
            if remaining < step.duration_ms {
                return Some(&step.screen);
            }
            remaining -= step.duration_ms;
        }
        None
    }

    pub fn is_finished(&self, now_ms: u64) -> bool {
        self.poll(now_ms).is_none()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn boot_animation_types_title() {
        let config = ClockConfig::default();
        let boot = StepSequence::boot_animation(&config, 1_000);

        assert_eq!(
            boot.poll(1_000),
            Some(&Screen::Boot {
                typed: ">".to_string()
            })
        );
        assert_eq!(
            boot.poll(1_250),
            Some(&Screen::Boot {
                typed: ">DE".to_string()
            })
        );

        let typed_all = 1_000 + config.boot_char_ms * BOOT_TITLE.len() as u64;
        assert_eq!(
            boot.poll(typed_all + config.boot_hold_ms),
            Some(&Screen::Boot {
                typed: format!(">{BOOT_TITLE}")
            })
        );
        assert!(boot.is_finished(typed_all + config.boot_char_ms + config.boot_hold_ms));
    }

    #[test]
    fn fetch_progress_walks_every_stage() {
        let config = ClockConfig::default();
        let progress = StepSequence::fetch_progress(&config, 0);
        let per_stage = config.progress_tick_ms * 11 + config.progress_stage_hold_ms;

        assert_eq!(progress.total_ms(), per_stage * FETCH_STAGES.len() as u64);
        assert_eq!(
            progress.poll(per_stage + config.progress_tick_ms * 2),
            Some(&Screen::Progress {
                stage: FETCH_STAGES[1].to_string(),
                percent: 20,
            })
        );
        assert!(progress.is_finished(progress.total_ms()));
    }

    #[test]
    fn message_holds_then_finishes() {
        let message = StepSequence::message("Connection Failed!", 2_000, 500);

        assert!(!message.is_finished(2_499));
        assert!(message.is_finished(2_500));
    }
}
