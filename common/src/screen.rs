use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneLine {
    pub time: String,
    pub abbreviation: String,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClockView {
    pub home: ZoneLine,
    pub extras: Vec<ZoneLine>,
    pub link_lost: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuRow {
    pub abbreviation: &'static str,
    pub name: String,
    pub selected: bool,
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuView {
    pub title: &'static str,
    pub rows: Vec<MenuRow>,
    pub selected_count: usize,
    pub cap: usize,
    pub hints: &'static str,
}

/// Fully computed display content. Pixel layout is the renderer's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum Screen {
    Boot {
        typed: String,
    },
    PortalInstructions {
        ssid: String,
        password: String,
        address: String,
    },
    Message {
        text: String,
    },
    Progress {
        stage: String,
        percent: u8,
    },
    Clock(ClockView),
    Menu(MenuView),
}

pub trait Renderer {
    fn render(&mut self, screen: &Screen);
}

/// Forwards a screen to the renderer only when it differs from the last one.
pub struct ScreenController<R> {
    renderer: R,
    last: Option<Screen>,
}

impl<R: Renderer> ScreenController<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            last: None,
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn current(&self) -> Option<&Screen> {
        self.last.as_ref()
    }

    /// Returns `true` when the renderer was invoked.
    pub fn show(&mut self, screen: Screen) -> bool {
        if self.last.as_ref() == Some(&screen) {
            return false;
        }
        self.renderer.render(&screen);
        self.last = Some(screen);
        true
    }
}
