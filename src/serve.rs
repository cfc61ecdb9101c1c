// ABOUTME: Live preview server for the lecture-deck application
// ABOUTME: Serves pages and JSON over HTTP, runs WebSocket sessions and reloads tabs on source changes

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher};
use notify_debouncer_full::new_debouncer;
use parking_lot::{Mutex, RwLock};
use percent_encoding::percent_decode_str;
use serde_json::json;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tungstenite::{Message, WebSocket};
use url::Url;
use uuid::Uuid;

use crate::assets::Asset;
use crate::config::{Config as AppConfig, ServeConfig};
use crate::course::{load_course, Course};
use crate::errors::{DeckError, Result};
use crate::html::{module_url, render_not_found, render_page, PageOptions};
use crate::loader::{CachedLoader, ContentLoader, FileLoader};
use crate::runtime::RuntimeConfig;
use crate::scroll_spy::SpyConfig;
use crate::session::{ServerCommand, Session};
use crate::utils;
use crate::view_mode::{FileStorage, MemoryStorage, ModeScope, Storage, ViewMode, ViewModeStore};

/// Read timeout of session sockets; bounds the latency of timer work
const SESSION_TICK: Duration = Duration::from_millis(20);

/// An HTTP response before it is handed to the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Reply {
    fn html(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "text/html; charset=utf-8",
            body: body.into_bytes(),
        }
    }

    fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
        }
    }

    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// State shared by the HTTP handler, the session threads and the watcher
pub struct ServerState {
    loader: Arc<CachedLoader<FileLoader>>,
    store: ViewModeStore,
    course: RwLock<Course>,
    single_file: bool,
    css: Vec<Asset>,
    js: Vec<Asset>,
    embed: bool,
    session_port: u16,
    runtime_config: RuntimeConfig,
    spy_config: SpyConfig,
    sessions: Mutex<HashMap<Uuid, mpsc::Sender<()>>>,
}

impl ServerState {
    pub fn new(config: &ServeConfig, app_config: &AppConfig) -> Result<Self> {
        if !config.root.exists() {
            return Err(DeckError::PathNotFoundError(config.root.clone()));
        }
        let single_file = config.root.is_file();

        let loader = Arc::new(CachedLoader::new(FileLoader::new(
            config.root.clone(),
            app_config.get_segment_config(None, None),
        )));

        let storage: Arc<dyn Storage> = match &config.state_file {
            Some(path) => {
                info!("Persisting view mode in {:?}", path);
                Arc::new(FileStorage::new(path.clone()))
            }
            None => Arc::new(MemoryStorage::new()),
        };
        let store = ViewModeStore::new(storage, config.breakpoint_px);

        let course = if single_file {
            let key = single_file_key(&config.root);
            let doc = loader.load(&key)?;
            Course::single(&doc.title, &key)
        } else {
            load_course(&config.root)?
        };
        info!(
            "Serving {:?} with {} entries",
            course.title,
            course.entries.len()
        );

        Ok(Self {
            loader,
            store,
            course: RwLock::new(course),
            single_file,
            css: config.css_files.iter().map(|p| Asset::css(p)).collect(),
            js: config.js_files.iter().map(|p| Asset::js(p)).collect(),
            embed: config.embed_resources,
            session_port: config.session_port(),
            runtime_config: app_config.get_runtime_config(None),
            spy_config: app_config.get_spy_config(None, None),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &ViewModeStore {
        &self.store
    }

    pub fn course(&self) -> Course {
        self.course.read().clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// New session for a connecting tab
    pub fn open_session(&self) -> Session {
        let loader: Arc<dyn ContentLoader> = self.loader.clone();
        Session::new(
            loader,
            self.store.clone(),
            self.runtime_config.clone(),
            self.spy_config.clone(),
        )
    }

    /// Drop cached documents, re-read course metadata and reload every tab
    pub fn sources_changed(&self) {
        self.loader.invalidate_all();
        if !self.single_file {
            let root = self.loader.inner().root().to_path_buf();
            match load_course(&root) {
                Ok(course) => *self.course.write() = course,
                Err(e) => warn!("Keeping previous course metadata: {}", e),
            }
        }
        self.broadcast_reload();
    }

    fn register(&self, id: Uuid, sender: mpsc::Sender<()>) {
        self.sessions.lock().insert(id, sender);
    }

    fn unregister(&self, id: Uuid) {
        self.sessions.lock().remove(&id);
    }

    fn broadcast_reload(&self) {
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, sender| sender.send(()).is_ok());
        info!("Reloading {} connected tabs", sessions.len());
    }

    /// Route one HTTP request
    pub fn handle_request(&self, method: &Method, raw_url: &str) -> Reply {
        if *method != Method::Get {
            return Reply::text(405, "405 Method Not Allowed");
        }
        let url = match Url::parse("http://localhost").and_then(|base| base.join(raw_url)) {
            Ok(url) => url,
            Err(e) => {
                debug!("Rejecting malformed URL {:?}: {}", raw_url, e);
                return Reply::text(400, "400 Bad Request");
            }
        };
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let path = url.path().to_string();

        match path.as_str() {
            "/" => self.landing_page(),
            "/api/course" => self.course_json(),
            "/api/headings" => self.headings_json(query.get("key").map(String::as_str)),
            _ => {
                if let Some(key) = path.strip_prefix("/m/") {
                    let key = decode_path(key);
                    let view = query.get("view").and_then(|v| v.parse::<ViewMode>().ok());
                    self.module_page(&key, view)
                } else if let Some(file) = path.strip_prefix("/files/") {
                    self.static_file(&decode_path(file))
                } else {
                    Reply::text(404, "404 Not Found")
                }
            }
        }
    }

    fn landing_page(&self) -> Reply {
        let landing = self.course.read().first_visible().map(|e| e.path.clone());
        match landing {
            Some(key) => self.module_page(&key, None),
            None => Reply::html(404, render_not_found("/")),
        }
    }

    fn module_page(&self, key: &str, view: Option<ViewMode>) -> Reply {
        match self.loader.load(key) {
            Ok(doc) => {
                let scope = ModeScope::with_override(self.store.clone(), view);
                let course = self.course.read();
                let page_url = module_url(key);
                let options = PageOptions {
                    css: &self.css,
                    js: &self.js,
                    embed: self.embed,
                    session_port: Some(self.session_port),
                    course: Some(&*course),
                    page_url: Some(&page_url),
                };
                Reply::html(200, render_page(&doc, &scope, &options))
            }
            Err(e) if is_not_found(&e) => {
                debug!("No document for {:?}: {}", key, e);
                Reply::html(404, render_not_found(key))
            }
            Err(e) => {
                error!("Failed to load {:?}: {}", key, e);
                Reply::text(500, &format!("Failed to load document: {}", e))
            }
        }
    }

    fn course_json(&self) -> Reply {
        match serde_json::to_value(&*self.course.read()) {
            Ok(value) => Reply::json(200, &value),
            Err(e) => Reply::json(500, &json!({ "error": e.to_string() })),
        }
    }

    fn headings_json(&self, key: Option<&str>) -> Reply {
        let Some(key) = key.filter(|k| !k.trim().is_empty()) else {
            return Reply::json(400, &json!({ "error": "missing key parameter" }));
        };
        match self.loader.load(key) {
            Ok(doc) => Reply::json(200, &json!(doc.headings)),
            Err(e) if is_not_found(&e) => {
                Reply::json(404, &json!({ "error": format!("unknown document: {}", key) }))
            }
            Err(e) => Reply::json(500, &json!({ "error": e.to_string() })),
        }
    }

    fn static_file(&self, relative: &str) -> Reply {
        if utils::validate_relative_key(relative).is_err() {
            warn!("Rejecting file request outside the content root: {:?}", relative);
            return Reply::text(403, "403 Forbidden");
        }
        let file_path = self.loader.inner().content_dir().join(relative);
        debug!("Request for {:?} -> {:?}", relative, file_path);

        if !file_path.is_file() {
            return Reply::text(404, "404 Not Found");
        }
        match fs::read(&file_path) {
            Ok(content) => Reply {
                status: 200,
                content_type: content_type(&file_path),
                body: content,
            },
            Err(e) => {
                error!("Failed to read file {:?}: {}", file_path, e);
                Reply::text(500, &format!("Failed to read file: {}", e))
            }
        }
    }
}

fn is_not_found(err: &DeckError) -> bool {
    matches!(
        err,
        DeckError::ContentNotFound(_)
            | DeckError::InvalidContentKey(_)
            | DeckError::PathNotFoundError(_)
    )
}

fn decode_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

fn single_file_key(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string())
}

/// Content type for a served file, by extension
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "md" | "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Start the HTTP server on its own thread
fn start_http_server(state: Arc<ServerState>, port: u16) -> Result<()> {
    let server = Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| DeckError::ServerError(format!("Failed to start HTTP server: {}", e)))?;

    thread::spawn(move || {
        info!("HTTP server listening on http://localhost:{}", port);
        println!("Preview available at http://localhost:{}", port);

        for request in server.incoming_requests() {
            let reply = state.handle_request(request.method(), request.url());
            let mut response =
                Response::from_data(reply.body).with_status_code(StatusCode(reply.status));
            if let Ok(header) = Header::from_bytes("Content-Type", reply.content_type) {
                response = response.with_header(header);
            }
            if let Err(e) = request.respond(response) {
                error!("Failed to send response: {}", e);
            }
        }
    });

    Ok(())
}

/// Accept WebSocket sessions, one thread per tab
fn start_session_listener(state: Arc<ServerState>, port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .map_err(|e| DeckError::ServerError(format!("Failed to bind session port {}: {}", port, e)))?;

    thread::spawn(move || {
        info!("Session endpoint listening on ws://localhost:{}", port);
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let state = Arc::clone(&state);
                    thread::spawn(move || {
                        if let Err(e) = run_session(&state, stream) {
                            warn!("Session ended with error: {}", e);
                        }
                    });
                }
                Err(e) => error!("Failed to accept session connection: {}", e),
            }
        }
    });

    Ok(())
}

fn run_session(state: &ServerState, stream: TcpStream) -> Result<()> {
    let mut socket = tungstenite::accept(stream)
        .map_err(|e| DeckError::SessionError(format!("Handshake failed: {}", e)))?;
    socket
        .get_ref()
        .set_read_timeout(Some(SESSION_TICK))
        .map_err(|e| DeckError::SessionError(format!("Failed to set read timeout: {}", e)))?;

    let mut session = state.open_session();
    let id = session.id();
    let (reload_tx, reload_rx) = mpsc::channel();
    state.register(id, reload_tx);

    let result = session_loop(&mut socket, &mut session, &reload_rx);

    session.close();
    state.unregister(id);
    result
}

fn session_loop(
    socket: &mut WebSocket<TcpStream>,
    session: &mut Session,
    reload: &mpsc::Receiver<()>,
) -> Result<()> {
    loop {
        match socket.read() {
            Ok(Message::Text(text)) => {
                let commands = session.handle_text(&text, Instant::now());
                send_commands(socket, commands)?;
            }
            Ok(Message::Close(_)) => return Ok(()),
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                return Ok(())
            }
            Err(e) => return Err(e.into()),
        }

        if reload.try_iter().count() > 0 {
            send_commands(socket, vec![ServerCommand::reload()])?;
        }
        let commands = session.tick(Instant::now());
        send_commands(socket, commands)?;
    }
}

fn send_commands(
    socket: &mut WebSocket<TcpStream>,
    commands: Vec<ServerCommand>,
) -> Result<()> {
    for command in commands {
        socket.send(Message::Text(command.to_json()?))?;
    }
    Ok(())
}

/// Checks if a changed path should reload open pages. Writes to the view-mode
/// state file never do.
pub fn is_relevant_path(path: &Path, state_file: Option<&Path>) -> bool {
    if state_file.is_some_and(|state| state == path) {
        return false;
    }
    match path.extension() {
        Some(ext) => {
            let ext_str = ext.to_string_lossy().to_lowercase();
            matches!(
                ext_str.as_str(),
                "md" | "json" | "css" | "js" | "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp"
            )
        }
        None => false,
    }
}

/// Serve a document or course directory until the process is stopped
pub fn serve(config: ServeConfig, app_config: &AppConfig) -> Result<()> {
    let state = Arc::new(ServerState::new(&config, app_config)?);

    start_http_server(Arc::clone(&state), config.port)?;
    start_session_listener(Arc::clone(&state), config.session_port())?;

    watch_sources(&state, &config)
}

/// Absolute form of the state file as the watcher reports it; the file itself
/// may not exist yet
fn absolute_state_path(path: &Path) -> PathBuf {
    if let Ok(absolute) = utils::get_absolute_path(path) {
        return absolute;
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (utils::get_absolute_path(parent), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

fn watch_sources(state: &ServerState, config: &ServeConfig) -> Result<()> {
    let (tx, rx) = mpsc::channel();

    let mut debouncer = new_debouncer(Duration::from_millis(config.watch_debounce_ms), None, tx)
        .map_err(|e| DeckError::WatchError(format!("Failed to create file watcher: {}", e)))?;

    let watch_path: PathBuf = if config.root.is_file() {
        match config.root.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    } else {
        config.root.clone()
    };
    let abs_watch_path = utils::get_absolute_path(&watch_path)?;
    debug!("Watching absolute path: {:?}", abs_watch_path);

    debouncer
        .watcher()
        .watch(&abs_watch_path, RecursiveMode::Recursive)
        .map_err(|e| {
            DeckError::WatchError(format!(
                "Failed to start watching directory {:?}: {}",
                abs_watch_path, e
            ))
        })?;

    let state_file = config.state_file.as_deref().map(absolute_state_path);

    info!("Watching for changes in {:?}", watch_path);
    println!(
        "Watching for changes in {:?} (Press Ctrl+C to stop)",
        watch_path
    );

    for result in rx {
        match result {
            Ok(events) => {
                let relevant = events.iter().any(|event| {
                    event.paths.iter().any(|path| {
                        let relevant = is_relevant_path(path, state_file.as_deref());
                        if relevant {
                            debug!("Detected relevant change in {:?}", path);
                        }
                        relevant
                    })
                });
                if relevant {
                    info!("Sources changed, reloading");
                    state.sources_changed();
                }
            }
            Err(errors) => error!("Watch error: {:?}", errors),
        }
    }

    Ok(())
}
