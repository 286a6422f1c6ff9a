use crate::{
    catalog,
    clock::ZoneClock,
    config::RuntimeConfig,
    connectivity::{ConnectError, ConnectivityMachine, LinkAction, Transition},
    menu::MenuController,
    screen::{ClockView, Renderer, Screen, ScreenController, ZoneLine},
    selection::{SelectionStore, ToggleOutcome, SELECTION_CAP},
    sequence::StepSequence,
    store::{KeyValueStore, StoreError},
    time_cache::{format_12_hour, slot_for_catalog, TimeCache, HOME_SLOT},
    types::{ButtonEvent, DeviceState, DeviceStatus, TimeOfDay},
};

#[derive(Debug)]
pub enum MenuEvent {
    Entered,
    Toggled {
        index: usize,
        outcome: ToggleOutcome,
    },
    Exited {
        saved: Result<bool, StoreError>,
        changed: Vec<usize>,
    },
}

/// Per loop iteration: `service_network`, queued `submit_credential`s, then `service_display`.
pub struct DeskClock<C, S, R> {
    config: RuntimeConfig,
    machine: ConnectivityMachine,
    cache: TimeCache<C>,
    selection: SelectionStore<S>,
    menu: Option<MenuController>,
    screens: ScreenController<R>,
    overlay: Option<StepSequence>,
    portal_address: String,
    next_clock_refresh_ms: u64,
}

impl<C, S, R> DeskClock<C, S, R>
where
    C: ZoneClock,
    S: KeyValueStore,
    R: Renderer,
{
    pub fn new(config: RuntimeConfig, clock: C, store: S, renderer: R, now_ms: u64) -> Self {
        let overlay = StepSequence::boot_animation(&config.clock, now_ms);
        Self {
            machine: ConnectivityMachine::new(config.clock.connect_timeout_ms),
            cache: TimeCache::new(clock, &config.clock),
            selection: SelectionStore::new(store),
            menu: None,
            screens: ScreenController::new(renderer),
            overlay: Some(overlay),
            portal_address: String::new(),
            next_clock_refresh_ms: 0,
            config,
        }
    }

    pub fn load_selection(&mut self) -> Result<usize, StoreError> {
        self.selection.load()
    }

    pub fn set_portal_address(&mut self, address: impl Into<String>) {
        self.portal_address = address.into();
    }

    pub fn state(&self) -> DeviceState {
        self.machine.state()
    }

    pub fn in_menu(&self) -> bool {
        self.menu.is_some()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn cache(&self) -> &TimeCache<C> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut TimeCache<C> {
        &mut self.cache
    }

    pub fn selection(&self) -> &SelectionStore<S> {
        &self.selection
    }

    pub fn screen(&self) -> Option<&Screen> {
        self.screens.current()
    }

    pub fn renderer(&self) -> &R {
        self.screens.renderer()
    }

    pub fn take_transitions(&mut self) -> Vec<Transition> {
        self.machine.take_transitions()
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            state: self.machine.state().as_str(),
            in_menu: self.menu.is_some(),
            selected_count: self.selection.count(),
            selection_cap: SELECTION_CAP,
            link_lost: self.machine.link_lost_since_ms().is_some(),
            home_zone: self.config.home.zone.clone(),
        }
    }

    pub fn service_network(&mut self, now_ms: u64, link_up: bool) -> Vec<LinkAction> {
        match self.machine.state() {
            DeviceState::Startup => {
                if self.overlay_finished(now_ms) {
                    self.overlay = None;
                    return self.machine.boot_complete(now_ms);
                }
                Vec::new()
            }
            DeviceState::Connecting => {
                let actions = self.machine.check_link(link_up, now_ms);
                match self.machine.state() {
                    DeviceState::FetchingData => {
                        let timing = &self.config.clock;
                        self.overlay = Some(
                            StepSequence::message("Connected to WiFi", timing.message_hold_ms, now_ms)
                                .followed_by(StepSequence::fetch_progress(timing, now_ms)),
                        );
                    }
                    DeviceState::ApMode => {
                        self.overlay = Some(StepSequence::message(
                            "Connection Failed!",
                            self.config.clock.failure_message_hold_ms,
                            now_ms,
                        ));
                    }
                    _ => {}
                }
                actions
            }
            DeviceState::Ready => {
                if link_up {
                    self.machine.report_link_restored();
                } else {
                    self.machine.report_link_lost(now_ms);
                }
                Vec::new()
            }
            DeviceState::ApMode | DeviceState::FetchingData => Vec::new(),
        }
    }

    pub fn submit_credential(
        &mut self,
        ssid: &str,
        password: &str,
        now_ms: u64,
    ) -> Result<Vec<LinkAction>, ConnectError> {
        let actions = self.machine.submit_credential(ssid, password, now_ms)?;
        self.overlay = None;
        self.screens.show(Screen::Message {
            text: "Connecting...".to_string(),
        });
        Ok(actions)
    }

    pub fn service_display(&mut self, now_ms: u64, button: Option<ButtonEvent>) -> Option<MenuEvent> {
        if let Some(overlay) = self.overlay.as_ref() {
            if let Some(frame) = overlay.poll(now_ms) {
                let frame = frame.clone();
                self.screens.show(frame);
                return None;
            }
            self.overlay = None;
        }

        match self.machine.state() {
            DeviceState::Startup => None,
            DeviceState::ApMode => {
                self.screens.show(Screen::PortalInstructions {
                    ssid: self.config.portal.ap_ssid.clone(),
                    password: self.config.portal.ap_password.clone(),
                    address: self.portal_address.clone(),
                });
                None
            }
            DeviceState::Connecting => {
                self.screens.show(Screen::Message {
                    text: "Connecting...".to_string(),
                });
                None
            }
            DeviceState::FetchingData => {
                self.seed_cache(now_ms);
                None
            }
            DeviceState::Ready => {
                let event = button.and_then(|button| self.handle_button(button));
                if let Some(menu) = self.menu.as_ref() {
                    let view = menu.view(&self.selection);
                    self.screens.show(Screen::Menu(view));
                } else if now_ms >= self.next_clock_refresh_ms {
                    self.next_clock_refresh_ms = now_ms + self.config.clock.clock_refresh_ms;
                    let view = self.clock_view(now_ms);
                    self.screens.show(Screen::Clock(view));
                }
                event
            }
        }
    }

    fn overlay_finished(&self, now_ms: u64) -> bool {
        self.overlay
            .as_ref()
            .map(|overlay| overlay.is_finished(now_ms))
            .unwrap_or(true)
    }

    fn seed_cache(&mut self, now_ms: u64) {
        self.cache.invalidate_all();
        self.cache.get(&self.config.home.zone, HOME_SLOT, now_ms);
        if self.cache.home_seeded() {
            self.machine.cache_seeded(now_ms);
            self.next_clock_refresh_ms = now_ms;
        }
    }

    fn handle_button(&mut self, button: ButtonEvent) -> Option<MenuEvent> {
        match (self.menu.take(), button) {
            (None, ButtonEvent::Hold) => {
                self.menu = Some(MenuController::enter());
                Some(MenuEvent::Entered)
            }
            (None, _) => None,
            (Some(menu), ButtonEvent::Hold) => {
                let saved = menu.exit(&mut self.selection);
                let changed = self.selection.take_changed();
                for index in &changed {
                    self.cache.invalidate(slot_for_catalog(*index));
                }
                self.next_clock_refresh_ms = 0;
                Some(MenuEvent::Exited { saved, changed })
            }
            (Some(mut menu), ButtonEvent::Next) => {
                menu.advance();
                self.menu = Some(menu);
                None
            }
            (Some(menu), ButtonEvent::Select) => {
                let index = menu.cursor().index();
                let outcome = menu.select(&mut self.selection);
                self.menu = Some(menu);
                Some(MenuEvent::Toggled { index, outcome })
            }
        }
    }

    fn clock_view(&mut self, now_ms: u64) -> ClockView {
        let home = self.cache.get(&self.config.home.zone, HOME_SLOT, now_ms);
        let home = zone_line(home, &self.config.home.abbreviation);

        let displayed: Vec<usize> = self.selection.display_indices().collect();
        let extras = displayed
            .into_iter()
            .filter_map(|index| {
                let entry = catalog::entry(index)?;
                let time = self.cache.get(entry.zone, slot_for_catalog(index), now_ms);
                Some(zone_line(time, entry.abbreviation))
            })
            .collect();

        ClockView {
            home,
            extras,
            link_lost: self.machine.link_lost_since_ms().is_some(),
        }
    }
}

fn zone_line(time: TimeOfDay, abbreviation: &str) -> ZoneLine {
    ZoneLine {
        time: format_12_hour(time.hour, time.minute, time.second, true),
        abbreviation: abbreviation.to_string(),
        hour: time.hour,
        minute: time.minute,
        second: time.second,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        screen::tests::RecordingRenderer,
        store::{MemoryStore, SELECTION_KEY, SELECTION_RECORD_SIZE},
        time_cache::tests::FakeClock,
    };

    type TestClock = DeskClock<FakeClock, MemoryStore, RecordingRenderer>;

    fn device(store: MemoryStore) -> TestClock {
        let mut device = DeskClock::new(
            RuntimeConfig::default(),
            FakeClock::at(13, 5, 9),
            store,
            RecordingRenderer::default(),
            0,
        );
        device.load_selection().unwrap();
        device.set_portal_address("192.168.4.1");
        device
    }

    fn run(device: &mut TestClock, from_ms: u64, until_ms: u64, link_up: bool) -> Vec<LinkAction> {
        let mut actions = Vec::new();
        let mut now = from_ms;
        while now <= until_ms {
            actions.extend(device.service_network(now, link_up));
            device.service_display(now, None);
            now += 10;
        }
        actions
    }

    fn boot_to_ap(device: &mut TestClock) -> u64 {
        let actions = run(device, 0, 3_000, false);
        assert_eq!(actions, vec![LinkAction::StartPortal]);
        assert_eq!(device.state(), DeviceState::ApMode);
        3_000
    }

    fn boot_to_ready(device: &mut TestClock) -> u64 {
        let now = boot_to_ap(device);
        device.submit_credential("home", "secret", now).unwrap();
        run(device, now, now + 10_000, true);
        assert_eq!(device.state(), DeviceState::Ready);
        now + 10_000
    }

    #[test]
    fn boot_shows_animation_then_portal_instructions() {
        let mut device = device(MemoryStore::new());
        boot_to_ap(&mut device);

        let frames = &device.renderer().frames;
        assert!(matches!(frames.first(), Some(Screen::Boot { typed }) if typed == ">"));
        assert_eq!(
            device.screen(),
            Some(&Screen::PortalInstructions {
                ssid: "ESPClock".to_string(),
                password: "espclock".to_string(),
                address: "192.168.4.1".to_string(),
            })
        );
    }

    #[test]
    fn credential_submission_is_rejected_during_boot() {
        let mut device = device(MemoryStore::new());
        assert!(device.submit_credential("home", "pw", 10).is_err());
        assert_eq!(device.state(), DeviceState::Startup);
    }

    #[test]
    fn successful_connection_seeds_home_slot_and_shows_clock() {
        let mut device = device(MemoryStore::new());
        boot_to_ready(&mut device);

        let states: Vec<_> = device
            .take_transitions()
            .iter()
            .map(|t| t.to)
            .collect();
        assert_eq!(
            states,
            vec![
                DeviceState::ApMode,
                DeviceState::Connecting,
                DeviceState::FetchingData,
                DeviceState::Ready,
            ]
        );
        assert!(device.cache().home_seeded());

        let Some(Screen::Clock(view)) = device.screen() else {
            panic!("expected clock screen, got {:?}", device.screen());
        };
        assert_eq!(view.home.time, "1:05:09 PM");
        assert_eq!(view.home.abbreviation, "IST");
        assert!(view.extras.is_empty());
    }

    #[test]
    fn failed_connection_returns_to_portal() {
        let mut device = device(MemoryStore::new());
        let now = boot_to_ap(&mut device);
        device.submit_credential("away", "secret", now).unwrap();

        let actions = run(&mut device, now, now + 15_000, false);
        assert!(actions.iter().all(|a| matches!(a, LinkAction::JoinNetwork { .. })));
        assert_eq!(device.state(), DeviceState::Connecting);

        let actions = run(&mut device, now + 15_010, now + 15_010, false);
        assert_eq!(
            actions,
            vec![
                LinkAction::Disconnect,
                LinkAction::StopPortal,
                LinkAction::StartPortal
            ]
        );
        assert_eq!(device.state(), DeviceState::ApMode);
        assert_eq!(
            device.screen(),
            Some(&Screen::Message {
                text: "Connection Failed!".to_string()
            })
        );

        run(&mut device, now + 15_020, now + 18_000, false);
        assert!(matches!(
            device.screen(),
            Some(Screen::PortalInstructions { .. })
        ));
        assert!(!device
            .take_transitions()
            .iter()
            .any(|t| t.to == DeviceState::Ready));
    }

    #[test]
    fn menu_toggles_and_persists_on_exit() {
        let mut device = device(MemoryStore::new());
        let now = boot_to_ready(&mut device);

        assert!(matches!(
            device.service_display(now, Some(ButtonEvent::Hold)),
            Some(MenuEvent::Entered)
        ));
        device.service_display(now + 10, Some(ButtonEvent::Select));
        device.service_display(now + 20, Some(ButtonEvent::Next));
        device.service_display(now + 30, Some(ButtonEvent::Next));
        device.service_display(now + 40, Some(ButtonEvent::Select));
        device.service_display(now + 50, Some(ButtonEvent::Next));
        let rejected = device.service_display(now + 60, Some(ButtonEvent::Select));
        assert!(matches!(
            rejected,
            Some(MenuEvent::Toggled {
                index: 3,
                outcome: ToggleOutcome::Rejected
            })
        ));

        let Some(Screen::Menu(view)) = device.screen() else {
            panic!("expected menu screen");
        };
        assert_eq!(view.selected_count, 2);
        assert_eq!(view.rows.len(), 3);
        assert!(view.rows[0].highlighted);

        let exited = device.service_display(now + 70, Some(ButtonEvent::Hold));
        let Some(MenuEvent::Exited { saved, changed }) = exited else {
            panic!("expected exit event");
        };
        assert!(saved.unwrap());
        assert_eq!(changed, vec![0, 2]);
        assert!(!device.in_menu());

        let record = device.selection().backend().record(SELECTION_KEY).unwrap();
        assert_eq!(&record[..4], &[1, 0, 1, 0]);

        let Some(Screen::Clock(view)) = device.screen() else {
            panic!("expected clock screen after exit");
        };
        assert_eq!(
            view.extras
                .iter()
                .map(|line| line.abbreviation.as_str())
                .collect::<Vec<_>>(),
            vec!["NYC", "TYO"]
        );
    }

    #[test]
    fn menu_exit_requeries_only_toggled_slots() {
        let mut record = vec![0_u8; SELECTION_RECORD_SIZE];
        record[1] = 1;
        let mut device = device(MemoryStore::new().with_record(SELECTION_KEY, &record));
        let now = boot_to_ready(&mut device);

        let home = device.config().home.zone.clone();
        let london = catalog::entry(1).unwrap().zone;
        device.cache_mut().invalidate_all();
        device.cache_mut().get(&home, HOME_SLOT, now);
        device.cache_mut().get(london, slot_for_catalog(1), now);
        let reads = device.cache().clock().reads;

        device.service_display(now + 10, Some(ButtonEvent::Hold));
        device.service_display(now + 20, Some(ButtonEvent::Next));
        device.service_display(now + 30, Some(ButtonEvent::Select));
        device.service_display(now + 40, Some(ButtonEvent::Select));
        assert_eq!(device.cache().clock().reads, reads);

        let exited = device.service_display(now + 50, Some(ButtonEvent::Hold));
        let Some(MenuEvent::Exited { saved, changed }) = exited else {
            panic!("expected exit event");
        };
        assert!(saved.unwrap());
        assert_eq!(changed, vec![1]);

        assert_eq!(device.cache().clock().reads, reads + 1);
        assert_eq!(
            device.cache().clock().zones.last().map(String::as_str),
            Some(london)
        );
        let Some(Screen::Clock(view)) = device.screen() else {
            panic!("expected clock screen after exit");
        };
        assert_eq!(view.extras.len(), 1);
        assert_eq!(view.extras[0].abbreviation, "LON");
    }

    #[test]
    fn buttons_are_ignored_before_ready() {
        let mut device = device(MemoryStore::new());
        boot_to_ap(&mut device);

        assert!(device
            .service_display(3_010, Some(ButtonEvent::Hold))
            .is_none());
        assert!(!device.in_menu());
    }

    #[test]
    fn stale_over_cap_selection_shows_first_two() {
        let mut record = vec![0_u8; SELECTION_RECORD_SIZE];
        record[1] = 1;
        record[4] = 1;
        record[6] = 1;
        let mut device = device(MemoryStore::new().with_record(SELECTION_KEY, &record));
        assert_eq!(device.selection().count(), 3);

        boot_to_ready(&mut device);

        let Some(Screen::Clock(view)) = device.screen() else {
            panic!("expected clock screen");
        };
        assert_eq!(
            view.extras
                .iter()
                .map(|line| line.abbreviation.as_str())
                .collect::<Vec<_>>(),
            vec!["LON", "DXB"]
        );
    }

    #[test]
    fn link_loss_is_flagged_on_clock_screen() {
        let mut device = device(MemoryStore::new());
        let now = boot_to_ready(&mut device);

        run(&mut device, now, now + 1_500, false);
        assert!(device.status().link_lost);
        let Some(Screen::Clock(view)) = device.screen() else {
            panic!("expected clock screen");
        };
        assert!(view.link_lost);
        assert_eq!(device.state(), DeviceState::Ready);

        run(&mut device, now + 1_510, now + 3_000, true);
        assert!(!device.status().link_lost);
    }
}
