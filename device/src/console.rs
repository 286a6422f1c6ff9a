use deskclock_common::screen::{ClockView, MenuView, Screen};

const BAR_WIDTH: usize = 10;

pub fn screen_lines(screen: &Screen) -> Vec<String> {
    match screen {
        Screen::Boot { typed } => vec![typed.clone()],
        Screen::PortalInstructions {
            ssid,
            password,
            address,
        } => vec![
            "Connect to:".to_string(),
            format!("SSID: {ssid}"),
            format!("PASS: {password}"),
            format!("Go to: {address}"),
        ],
        Screen::Message { text } => vec![text.clone()],
        Screen::Progress { stage, percent } => {
            let filled = usize::from(*percent) * BAR_WIDTH / 100;
            vec![
                stage.clone(),
                format!(
                    "[{}{}] {percent}%",
                    "#".repeat(filled),
                    " ".repeat(BAR_WIDTH - filled)
                ),
            ]
        }
        Screen::Clock(view) => clock_lines(view),
        Screen::Menu(view) => menu_lines(view),
    }
}

fn clock_lines(view: &ClockView) -> Vec<String> {
    let mut lines = vec![format!("{} {}", view.home.time, view.home.abbreviation)];
    lines.extend(
        view.extras
            .iter()
            .map(|line| format!("{} {}", line.time, line.abbreviation)),
    );
    if view.link_lost {
        lines.push("(wifi lost)".to_string());
    }
    lines
}

fn menu_lines(view: &MenuView) -> Vec<String> {
    let mut lines = vec![view.title.to_string()];
    for row in &view.rows {
        lines.push(format!(
            "{}[{}] {} {}",
            if row.highlighted { ">" } else { " " },
            if row.selected { "x" } else { " " },
            row.abbreviation,
            row.name
        ));
    }
    lines.push(view.hints.to_string());
    lines.push(format!("Selected:{}/{}", view.selected_count, view.cap));
    lines
}

#[cfg(test)]
mod tests {
    use deskclock_common::screen::{MenuRow, ZoneLine};
    use pretty_assertions::assert_eq;

    use super::*;

    fn line(time: &str, abbreviation: &str) -> ZoneLine {
        ZoneLine {
            time: time.to_string(),
            abbreviation: abbreviation.to_string(),
            hour: 0,
            minute: 0,
            second: 0,
        }
    }

    #[test]
    fn progress_bar_scales_to_width() {
        let lines = screen_lines(&Screen::Progress {
            stage: "Syncing time".to_string(),
            percent: 40,
        });
        assert_eq!(lines, vec!["Syncing time", "[####      ] 40%"]);
    }

    #[test]
    fn clock_lists_home_first_and_flags_lost_link() {
        let lines = screen_lines(&Screen::Clock(ClockView {
            home: line("9:41:00 AM", "IST"),
            extras: vec![line("11:11:00 PM", "NYC")],
            link_lost: true,
        }));
        assert_eq!(
            lines,
            vec!["9:41:00 AM IST", "11:11:00 PM NYC", "(wifi lost)"]
        );
    }

    #[test]
    fn menu_marks_cursor_and_selection() {
        let lines = screen_lines(&Screen::Menu(MenuView {
            title: "SELECT TIMEZONES",
            rows: vec![
                MenuRow {
                    abbreviation: "NYC",
                    name: "New_York".to_string(),
                    selected: true,
                    highlighted: false,
                },
                MenuRow {
                    abbreviation: "LON",
                    name: "London".to_string(),
                    selected: false,
                    highlighted: true,
                },
            ],
            selected_count: 1,
            cap: 2,
            hints: "BTN1:Next BTN2:Select Hold:Exit",
        }));
        assert_eq!(lines[1], " [x] NYC New_York");
        assert_eq!(lines[2], ">[ ] LON London");
        assert_eq!(lines.last().map(String::as_str), Some("Selected:1/2"));
    }
}
