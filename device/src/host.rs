use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Serialize;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    sync::{
        mpsc::{self, error::TryRecvError},
        oneshot, Mutex,
    },
};
use tracing::{debug, info, warn};

use deskclock_common::{
    ButtonEvent, ConnectError, DeskClock, DeviceStatus, KeyValueStore, LinkAction, MenuEvent,
    Renderer, RuntimeConfig, Screen, StoreError, SystemZoneClock, ToggleOutcome, RUNTIME_KEY,
};

use crate::{
    console::screen_lines,
    portal::{connect_reply, ConnectForm, PORTAL_HTML},
};

const LOOP_TICK_MS: u64 = 20;
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_LINK_DELAY_MS: u64 = 3_000;
const MAX_RUNTIME_RECORD: usize = 4096;

type HostClock = DeskClock<SystemZoneClock, FileStore, TracingRenderer>;

struct Submission {
    form: ConnectForm,
    reply: oneshot::Sender<Result<(), ConnectError>>,
}

#[derive(Clone)]
struct AppState {
    submissions: mpsc::Sender<Submission>,
    status: Arc<Mutex<DeviceStatus>>,
    portal_open: Arc<AtomicBool>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct FileStore {
    data_dir: PathBuf,
}

struct SimulatedRadio {
    reachable: Option<Vec<String>>,
    link_delay_ms: u64,
    link_up_at_ms: Option<u64>,
    portal_open: Arc<AtomicBool>,
}

struct TracingRenderer;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut store = FileStore::new();
    let runtime = load_runtime_config(&mut store).unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    info!(
        "runtime config loaded: home=`{}` ({}), portal ap=`{}`",
        runtime.home.zone, runtime.home.abbreviation, runtime.portal.ap_ssid
    );

    let port = std::env::var("DESKCLOCK_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_HTTP_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind captive portal at {addr}"))?;

    let mut clock = DeskClock::new(
        runtime,
        SystemZoneClock::new(),
        store,
        TracingRenderer,
        monotonic_ms(),
    );
    clock.set_portal_address(format!("127.0.0.1:{port}"));
    match clock.load_selection() {
        Ok(count) => info!("timezone selection loaded: {count} selected"),
        Err(err) => warn!("failed to load timezone selection, starting empty: {err:#}"),
    }

    let (submission_tx, submission_rx) = mpsc::channel(8);
    let (button_tx, button_rx) = mpsc::channel(16);
    let status = Arc::new(Mutex::new(clock.status()));

    let radio = SimulatedRadio::from_env();
    let portal_open = radio.portal_open.clone();

    spawn_button_reader(button_tx);
    spawn_poll_loop(clock, radio, submission_rx, button_rx, status.clone())?;

    let app = Router::new()
        .route("/", get(handle_root))
        .route("/connect", post(handle_connect))
        .route("/api/status", get(handle_get_status))
        .fallback(handle_redirect)
        .with_state(AppState {
            submissions: submission_tx,
            status,
            portal_open,
        });

    info!("captive portal listening on http://{addr}");
    info!("buttons on stdin: n = next, s = select, h = hold");
    axum::serve(listener, app).await?;
    Ok(())
}

fn load_runtime_config(store: &mut FileStore) -> anyhow::Result<RuntimeConfig> {
    let mut buffer = vec![0_u8; MAX_RUNTIME_RECORD];
    match store.read_record(RUNTIME_KEY, &mut buffer)? {
        Some(len) => Ok(RuntimeConfig::from_json(&buffer[..len])?),
        None => {
            let runtime = RuntimeConfig::default();
            store.write_record(RUNTIME_KEY, &runtime.to_json()?)?;
            info!("no runtime config found; wrote defaults");
            Ok(runtime)
        }
    }
}

// Clock reads block, so the loop runs off the runtime.
fn spawn_poll_loop(
    clock: HostClock,
    radio: SimulatedRadio,
    submissions: mpsc::Receiver<Submission>,
    buttons: mpsc::Receiver<ButtonEvent>,
    status: Arc<Mutex<DeviceStatus>>,
) -> anyhow::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("deskclock-poll".to_string())
        .spawn(move || run_poll_loop(clock, radio, submissions, buttons, &status))
        .context("failed to spawn poll loop thread")
}

fn run_poll_loop(
    mut clock: HostClock,
    mut radio: SimulatedRadio,
    mut submissions: mpsc::Receiver<Submission>,
    mut buttons: mpsc::Receiver<ButtonEvent>,
    status: &Mutex<DeviceStatus>,
) {
    loop {
        let now_ms = monotonic_ms();

        let actions = clock.service_network(now_ms, radio.link_up(now_ms));
        radio.apply(actions, now_ms);

        loop {
            let Submission { form, reply } = match submissions.try_recv() {
                Ok(submission) => submission,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("portal closed its queue; poll loop exiting");
                    return;
                }
            };
            let verdict = clock
                .submit_credential(&form.ssid, &form.password, now_ms)
                .map(|actions| radio.apply(actions, now_ms));
            match &verdict {
                Ok(()) => info!("credentials accepted for `{}`", form.ssid.trim()),
                Err(err) => warn!("credential submission rejected: {err}"),
            }
            let _ = reply.send(verdict);
        }

        let button = buttons.try_recv().ok();
        if let Some(event) = clock.service_display(now_ms, button) {
            log_menu_event(event);
        }

        for transition in clock.take_transitions() {
            info!("device state: {} -> {}", transition.from, transition.to);
        }
        *status.blocking_lock() = clock.status();

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

fn spawn_button_reader(buttons: mpsc::Sender<ButtonEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let Some(event) = parse_button(&line) else {
                        warn!("unknown button `{}` (use n, s or h)", line.trim());
                        continue;
                    };
                    if buttons.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("stdin read failed, buttons disabled: {err}");
                    break;
                }
            }
        }
    });
}

fn parse_button(line: &str) -> Option<ButtonEvent> {
    match line.trim().to_ascii_lowercase().as_str() {
        "n" | "next" => Some(ButtonEvent::Next),
        "s" | "select" => Some(ButtonEvent::Select),
        "h" | "hold" => Some(ButtonEvent::Hold),
        _ => None,
    }
}

async fn handle_root(State(state): State<AppState>) -> axum::response::Response {
    if !state.portal_is_open() {
        return StatusCode::NOT_FOUND.into_response();
    }
    Html(PORTAL_HTML).into_response()
}

async fn handle_connect(
    State(state): State<AppState>,
    Form(form): Form<ConnectForm>,
) -> axum::response::Response {
    if !state.portal_is_open() {
        return error_response(StatusCode::NOT_FOUND, "configuration portal is closed");
    }
    let (reply, verdict) = oneshot::channel();
    if state
        .submissions
        .send(Submission { form, reply })
        .await
        .is_err()
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "device loop is not running");
    }
    let Ok(verdict) = verdict.await else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "device loop dropped the submission",
        );
    };

    let (code, body) = connect_reply(&verdict);
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if verdict.is_ok() {
        (status, body).into_response()
    } else {
        error_response(status, &body)
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.status.lock().await.clone();
    Json(status)
}

async fn handle_redirect(State(state): State<AppState>) -> axum::response::Response {
    if !state.portal_is_open() {
        return StatusCode::NOT_FOUND.into_response();
    }
    (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
}

impl AppState {
    fn portal_is_open(&self) -> bool {
        self.portal_open.load(Ordering::Acquire)
    }
}

impl FileStore {
    fn new() -> Self {
        let data_dir = std::env::var("DESKCLOCK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.deskclock"));
        Self { data_dir }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.data_dir.join(key)
    }
}

impl KeyValueStore for FileStore {
    fn read_record(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, StoreError> {
        let path = self.path(key);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StoreError::Backend(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };
        if raw.len() > buf.len() {
            return Err(StoreError::RecordTooLarge {
                key: key.to_string(),
                len: raw.len(),
                limit: buf.len(),
            });
        }
        buf[..raw.len()].copy_from_slice(&raw);
        Ok(Some(raw.len()))
    }

    fn write_record(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.data_dir).map_err(|err| {
            StoreError::Backend(format!(
                "failed to create {}: {err}",
                self.data_dir.display()
            ))
        })?;
        let path = self.path(key);
        std::fs::write(&path, data)
            .map_err(|err| StoreError::Backend(format!("failed to write {}: {err}", path.display())))
    }
}

impl SimulatedRadio {
    fn from_env() -> Self {
        let reachable = std::env::var("DESKCLOCK_REACHABLE_SSIDS").ok().map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|ssid| !ssid.is_empty())
                .map(str::to_string)
                .collect()
        });
        let link_delay_ms = std::env::var("DESKCLOCK_LINK_DELAY_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_LINK_DELAY_MS);
        Self::new(reachable, link_delay_ms)
    }

    fn new(reachable: Option<Vec<String>>, link_delay_ms: u64) -> Self {
        Self {
            reachable,
            link_delay_ms,
            link_up_at_ms: None,
            portal_open: Arc::new(AtomicBool::new(false)),
        }
    }

    fn link_up(&self, now_ms: u64) -> bool {
        self.link_up_at_ms.is_some_and(|up_at| now_ms >= up_at)
    }

    fn apply(&mut self, actions: Vec<LinkAction>, now_ms: u64) {
        for action in actions {
            match action {
                LinkAction::StartPortal => {
                    self.portal_open.store(true, Ordering::Release);
                    info!("portal access point up");
                }
                LinkAction::StopPortal => {
                    if self.portal_open.swap(false, Ordering::AcqRel) {
                        info!("portal access point and http responders down");
                    }
                }
                LinkAction::JoinNetwork { ssid, .. } => {
                    let in_range = self
                        .reachable
                        .as_ref()
                        .map_or(true, |names| names.iter().any(|name| *name == ssid));
                    if in_range {
                        self.link_up_at_ms = Some(now_ms + self.link_delay_ms);
                        info!("associating with `{ssid}`");
                    } else {
                        self.link_up_at_ms = None;
                        warn!("network `{ssid}` is out of range");
                    }
                }
                LinkAction::Disconnect => self.link_up_at_ms = None,
            }
        }
    }
}

impl Renderer for TracingRenderer {
    fn render(&mut self, screen: &Screen) {
        let text = screen_lines(screen).join(" | ");
        match screen {
            Screen::Boot { .. } | Screen::Progress { .. } => debug!("display: {text}"),
            _ => info!("display: {text}"),
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
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
