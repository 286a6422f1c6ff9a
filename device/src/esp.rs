use core::convert::TryInto;
use std::{
    sync::{
        mpsc::{self, Receiver, Sender, SyncSender},
        Arc, Mutex, OnceLock, PoisonError,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::{Headers, Method},
    io::{Read, Write},
    wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::gpio::{AnyIOPin, Input, PinDriver, Pull};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::prelude::Peripherals,
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault},
    sntp::EspSntp,
    wifi::EspWifi,
};
use log::{debug, info, warn};

use deskclock_common::{
    config::PortalConfig, ButtonEvent, ButtonPanel, ConnectError, DeskClock, DeviceStatus,
    KeyValueStore, LinkAction, MenuEvent, Renderer, RuntimeConfig, Screen, StoreError,
    SystemZoneClock, ToggleOutcome, RUNTIME_KEY,
};

use crate::{
    console::screen_lines,
    portal::{connect_reply, parse_connect_form, ConnectForm, PORTAL_HTML},
};

const NVS_NAMESPACE: &str = "deskclock";
const MAX_HTTP_BODY: usize = 512;
const MAX_RUNTIME_RECORD: usize = 1024;
const LOOP_TICK_MS: u64 = 10;
const SUBMISSION_REPLY_TIMEOUT_MS: u64 = 5_000;
const FALLBACK_PORTAL_ADDRESS: &str = "192.168.71.1";

type EspClock = DeskClock<SystemZoneClock, NvsStore, LogRenderer>;

struct Submission {
    form: ConnectForm,
    reply: SyncSender<Result<(), ConnectError>>,
}

struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

struct Radio {
    wifi: EspWifi<'static>,
    access_point: AccessPointConfiguration,
    client: Option<ClientConfiguration>,
    portal: HttpPortal,
}

struct HttpPortal {
    server: Option<EspHttpServer<'static>>,
    submissions: Sender<Submission>,
    status: Arc<Mutex<DeviceStatus>>,
}

struct Buttons {
    scroll: PinDriver<'static, AnyIOPin, Input>,
    select: PinDriver<'static, AnyIOPin, Input>,
    panel: ButtonPanel,
}

struct LogRenderer;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let mut store = NvsStore {
        nvs: EspNvs::new(nvs_partition.clone(), NVS_NAMESPACE, true)
            .context("failed to open NVS namespace")?,
    };

    let runtime = load_runtime_config(&mut store).unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    info!(
        "NVS config loaded: home=`{}` ({}), portal ap=`{}`",
        runtime.home.zone, runtime.home.abbreviation, runtime.portal.ap_ssid
    );

    let Peripherals { modem, pins, .. } = Peripherals::take()?;
    let buttons = Buttons {
        scroll: input_pin(pins.gpio14.into())?,
        select: input_pin(pins.gpio12.into())?,
        panel: ButtonPanel::new(runtime.clock.long_press_ms),
    };

    let mut clock = DeskClock::new(
        runtime,
        SystemZoneClock::new(),
        store,
        LogRenderer,
        monotonic_ms(),
    );
    match clock.load_selection() {
        Ok(count) => info!("timezone selection loaded: {count} selected"),
        Err(err) => warn!("failed to load timezone selection, starting empty: {err:#}"),
    }

    let (submission_tx, submission_rx) = mpsc::channel();
    let status = Arc::new(Mutex::new(clock.status()));
    let portal = HttpPortal {
        server: None,
        submissions: submission_tx,
        status: status.clone(),
    };

    let wifi = EspWifi::new(modem, sys_loop, Some(nvs_partition))
        .context("wifi driver init failed")?;
    let mut radio = Radio::new(wifi, &clock.config().portal, portal)?;
    clock.set_portal_address(radio.portal_address());

    let _sntp = EspSntp::new_default().context("failed to start SNTP")?;
    info!("SNTP initialized");

    run_poll_loop(clock, &mut radio, buttons, submission_rx, &status)
}

fn load_runtime_config(store: &mut NvsStore) -> anyhow::Result<RuntimeConfig> {
    let mut buffer = vec![0_u8; MAX_RUNTIME_RECORD];
    match store.read_record(RUNTIME_KEY, &mut buffer)? {
        Some(len) => Ok(RuntimeConfig::from_json(&buffer[..len])?),
        None => Ok(RuntimeConfig::default()),
    }
}

fn run_poll_loop(
    mut clock: EspClock,
    radio: &mut Radio,
    mut buttons: Buttons,
    submissions: Receiver<Submission>,
    status: &Mutex<DeviceStatus>,
) -> anyhow::Result<()> {
    loop {
        let now_ms = monotonic_ms();

        let actions = clock.service_network(now_ms, radio.link_up());
        radio.apply(actions);

        while let Ok(Submission { form, reply }) = submissions.try_recv() {
            let verdict = clock
                .submit_credential(&form.ssid, &form.password, now_ms)
                .map(|actions| radio.apply(actions));
            match &verdict {
                Ok(()) => info!("credentials accepted for `{}`", form.ssid.trim()),
                Err(err) => warn!("credential submission rejected: {err}"),
            }
            let _ = reply.send(verdict);
        }

        let button = buttons.poll(now_ms);
        if let Some(event) = clock.service_display(now_ms, button) {
            log_menu_event(event);
        }

        for transition in clock.take_transitions() {
            info!("device state: {} -> {}", transition.from, transition.to);
        }
        *status.lock().unwrap_or_else(PoisonError::into_inner) = clock.status();

        thread::sleep(Duration::from_millis(LOOP_TICK_MS));
    }
}

fn log_menu_event(event: MenuEvent) {
    match event {
        MenuEvent::Entered => info!("timezone menu opened"),
        MenuEvent::Toggled {
            index,
            outcome: ToggleOutcome::Rejected,
        } => info!("timezone {index} not selected: selection is full"),
        MenuEvent::Toggled { index, outcome } => debug!("timezone {index}: {outcome:?}"),
        MenuEvent::Exited { saved, changed } => match saved {
            Ok(true) => info!("timezone selection saved, changed entries {changed:?}"),
            Ok(false) => info!("timezone menu closed without changes"),
            Err(err) => warn!("failed to save timezone selection: {err:#}"),
        },
    }
}

fn create_http_server(
    submissions: Sender<Submission>,
    status: Arc<Mutex<DeviceStatus>>,
) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        stack_size: 10 * 1024,
        uri_match_wildcard: true,
        ..Default::default()
    };
    let mut server = EspHttpServer::new(&conf)?;

    server.fn_handler::<anyhow::Error, _>("/", Method::Get, move |req| {
        req.into_response(200, Some("OK"), &[("Content-Type", "text/html; charset=utf-8")])?
            .write_all(PORTAL_HTML.as_bytes())?;
        Ok(())
    })?;

    {
        let submissions = Mutex::new(submissions);
        server.fn_handler::<anyhow::Error, _>("/connect", Method::Post, move |mut req| {
            let body = read_request_body(&mut req)?;
            let form = parse_connect_form(&body);

            let (reply, verdict) = mpsc::sync_channel(1);
            let queued = submissions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .send(Submission { form, reply });
            if queued.is_err() {
                return write_error(req, 503, "device loop is not running");
            }
            let Ok(verdict) =
                verdict.recv_timeout(Duration::from_millis(SUBMISSION_REPLY_TIMEOUT_MS))
            else {
                return write_error(req, 503, "device loop did not answer");
            };

            let (code, body) = connect_reply(&verdict);
            if verdict.is_err() {
                return write_error(req, code, &body);
            }
            req.into_response(code, None, &[("Content-Type", "text/plain; charset=utf-8")])?
                .write_all(body.as_bytes())?;
            Ok(())
        })?;
    }

    server.fn_handler::<anyhow::Error, _>("/api/status", Method::Get, move |req| {
        let payload = status.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let body = serde_json::to_vec(&payload)?;
        req.into_response(
            200,
            Some("OK"),
            &[("Content-Type", "application/json; charset=utf-8")],
        )?
        .write_all(&body)?;
        Ok(())
    })?;

    // Captive probes ("/generate_204", "/hotspot-detect.html", ...) and
    // anything else land on the form.
    server.fn_handler::<anyhow::Error, _>("/*", Method::Get, move |req| {
        req.into_response(302, Some("Found"), &[("Location", "/")])?;
        Ok(())
    })?;

    Ok(server)
}

fn read_request_body(
    req: &mut esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
) -> anyhow::Result<Vec<u8>> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_HTTP_BODY {
        return Err(anyhow!("request body too large"));
    }

    let mut body = vec![0_u8; len];
    if len > 0 {
        req.read_exact(&mut body)?;
    }
    Ok(body)
}

fn write_error(
    req: esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
    status_code: u16,
    message: &str,
) -> anyhow::Result<()> {
    let payload = serde_json::json!({ "error": message });
    let body = serde_json::to_vec(&payload)?;
    req.into_response(
        status_code,
        None,
        &[("Content-Type", "application/json; charset=utf-8")],
    )?
    .write_all(&body)?;
    Ok(())
}

fn input_pin(pin: AnyIOPin) -> anyhow::Result<PinDriver<'static, AnyIOPin, Input>> {
    let mut driver = PinDriver::input(pin)?;
    driver.set_pull(Pull::Up)?;
    Ok(driver)
}

impl Buttons {
    // Buttons pull to ground when pressed.
    fn poll(&mut self, now_ms: u64) -> Option<ButtonEvent> {
        self.panel
            .update(self.scroll.is_low(), self.select.is_low(), now_ms)
    }
}

impl Radio {
    fn new(
        wifi: EspWifi<'static>,
        portal: &PortalConfig,
        http: HttpPortal,
    ) -> anyhow::Result<Self> {
        let access_point = AccessPointConfiguration {
            ssid: portal
                .ap_ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("portal AP SSID too long"))?,
            password: portal
                .ap_password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("portal AP password too long"))?,
            auth_method: AuthMethod::WPA2Personal,
            channel: 1,
            ..Default::default()
        };

        Ok(Self {
            wifi,
            access_point,
            client: None,
            portal: http,
        })
    }

    fn portal_address(&self) -> String {
        match self.wifi.ap_netif().get_ip_info() {
            Ok(info) => info.ip.to_string(),
            Err(err) => {
                warn!("failed to read portal address: {err}");
                FALLBACK_PORTAL_ADDRESS.to_string()
            }
        }
    }

    fn link_up(&self) -> bool {
        self.client.is_some() && self.wifi.is_connected().unwrap_or(false)
    }

    fn apply(&mut self, actions: Vec<LinkAction>) {
        for action in actions {
            if let Err(err) = self.apply_one(action) {
                warn!("wifi action failed: {err:#}");
            }
        }
    }

    fn apply_one(&mut self, action: LinkAction) -> anyhow::Result<()> {
        match action {
            LinkAction::StartPortal => {
                self.portal.open()?;
                self.reconfigure()?;
                info!("portal AP `{}` up", self.access_point.ssid);
            }
            LinkAction::StopPortal => {
                self.portal.close();
                self.reconfigure()?;
                info!("portal AP down");
            }
            LinkAction::JoinNetwork { ssid, password } => {
                let auth_method = if password.is_empty() {
                    AuthMethod::None
                } else {
                    AuthMethod::WPAWPA2Personal
                };
                self.client = Some(ClientConfiguration {
                    ssid: ssid
                        .as_str()
                        .try_into()
                        .map_err(|_| anyhow!("wifi ssid too long"))?,
                    password: password
                        .as_str()
                        .try_into()
                        .map_err(|_| anyhow!("wifi password too long"))?,
                    auth_method,
                    ..Default::default()
                });
                self.reconfigure()?;
                self.wifi.connect()?;
                info!("wifi connecting to `{ssid}`");
            }
            LinkAction::Disconnect => {
                self.client = None;
                if let Err(err) = self.wifi.disconnect() {
                    debug!("wifi disconnect: {err}");
                }
            }
        }
        Ok(())
    }

    fn reconfigure(&mut self) -> anyhow::Result<()> {
        let configuration = match (self.client.clone(), self.portal.is_open()) {
            (Some(client), true) => Configuration::Mixed(client, self.access_point.clone()),
            (Some(client), false) => Configuration::Client(client),
            (None, true) => Configuration::AccessPoint(self.access_point.clone()),
            (None, false) => Configuration::None,
        };
        self.wifi.set_configuration(&configuration)?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        Ok(())
    }
}

impl HttpPortal {
    fn open(&mut self) -> anyhow::Result<()> {
        if self.server.is_none() {
            self.server = Some(create_http_server(
                self.submissions.clone(),
                self.status.clone(),
            )?);
            info!("portal http server started");
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.server.take().is_some() {
            info!("portal http server stopped");
        }
    }

    fn is_open(&self) -> bool {
        self.server.is_some()
    }
}

impl KeyValueStore for NvsStore {
    fn read_record(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, StoreError> {
        let len = match self.nvs.blob_len(key) {
            Ok(Some(len)) => len,
            Ok(None) => return Ok(None),
            Err(err) => return Err(StoreError::Backend(format!("nvs `{key}`: {err}"))),
        };
        if len > buf.len() {
            return Err(StoreError::RecordTooLarge {
                key: key.to_string(),
                len,
                limit: buf.len(),
            });
        }
        self.nvs
            .get_blob(key, buf)
            .map(|record| record.map(<[u8]>::len))
            .map_err(|err| StoreError::Backend(format!("nvs `{key}`: {err}")))
    }

    fn write_record(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.nvs
            .set_blob(key, data)
            .map_err(|err| StoreError::Backend(format!("nvs `{key}`: {err}")))
    }
}

impl Renderer for LogRenderer {
    fn render(&mut self, screen: &Screen) {
        let text = screen_lines(screen).join(" | ");
        match screen {
            Screen::Boot { .. } | Screen::Progress { .. } => debug!("display: {text}"),
            _ => info!("display: {text}"),
        }
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
