// src/stream.rs
use std::borrow::Cow;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use log::{debug, info, warn};
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{HandshakeError, Message, WebSocket};
use url::Url;
use crate::telemetry::ViewerError;
use crate::types::{LinkId, StreamEvent, StreamEventKind};

/// Close code sent when the viewer ends a link on purpose.
pub const NORMAL_CLOSE: u16 = 1000;
/// Text frame sent as the liveness probe.
pub const KEEPALIVE_PROBE: &str = "ping";
/// How long a blocking read may wait before the worker checks commands and timers.
const POLL_INTERVAL: Duration = Duration::from_millis(200);
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);
const CLOSE_WAIT: Duration = Duration::from_secs(2);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Called after every emitted event, e.g. to wake the UI thread.
pub type RepaintHook = Arc<dyn Fn() + Send + Sync>;

/// Builds `<base>/ws/app/<device>?token=<credential>`.
pub fn endpoint_url(base: &str, device_id: &str, credential: &str) -> Result<Url, ViewerError> {
    let mut url = Url::parse(base)?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(ViewerError::InvalidEndpoint(format!(
                "unsupported scheme '{other}'"
            )))
        }
    };
    if url.scheme() != scheme {
        url.set_scheme(scheme)
            .map_err(|_| ViewerError::InvalidEndpoint(format!("cannot switch to {scheme}")))?;
    }
    url.path_segments_mut()
        .map_err(|_| ViewerError::InvalidEndpoint(base.to_owned()))?
        .pop_if_empty()
        .extend(["ws", "app", device_id]);
    url.set_query(None);
    url.query_pairs_mut().append_pair("token", credential);
    Ok(url)
}

/// Periodic liveness probe schedule. Only fires while started.
#[derive(Debug)]
pub struct Keepalive {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Keepalive {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    /// Returns true once per elapsed interval and schedules the next probe.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(at) if now >= at => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

/// Sending half handed to a link worker, stamped with that link's id.
#[derive(Clone)]
pub struct EventSink {
    link: LinkId,
    tx: Sender<StreamEvent>,
    repaint: Option<RepaintHook>,
}

impl EventSink {
    pub fn link(&self) -> LinkId {
        self.link
    }

    /// Returns false once the session side has gone away.
    pub fn emit(&self, kind: StreamEventKind) -> bool {
        let delivered = self
            .tx
            .send(StreamEvent {
                link: self.link,
                kind,
            })
            .is_ok();
        if let Some(repaint) = &self.repaint {
            repaint();
        }
        delivered
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkRequest {
    pub device_id: String,
    pub credential: String,
}

/// Opens links; each link reports its lifecycle through the given sink.
pub trait Connector {
    fn open(&mut self, request: &LinkRequest, sink: EventSink)
        -> Result<Box<dyn Link>, ViewerError>;
}

/// Handle to one live connection.
pub trait Link {
    fn id(&self) -> LinkId;
    /// Gracefully closes the link and waits (bounded) for its worker to stop.
    fn close(&mut self, code: u16);
}

/// Owns the event channel and at most one live link.
pub struct StreamClient<C: Connector> {
    connector: C,
    tx: Sender<StreamEvent>,
    rx: Receiver<StreamEvent>,
    link: Option<Box<dyn Link>>,
    next_id: u64,
    repaint: Option<RepaintHook>,
}

impl<C: Connector> StreamClient<C> {
    pub fn new(connector: C) -> Self {
        let (tx, rx) = channel();
        Self {
            connector,
            tx,
            rx,
            link: None,
            next_id: 1,
            repaint: None,
        }
    }

    pub fn set_repaint_hook(&mut self, hook: RepaintHook) {
        self.repaint = Some(hook);
    }

    #[cfg(test)]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    pub fn connect(&mut self, device_id: &str, credential: &str) -> Result<LinkId, ViewerError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(ViewerError::EmptyDeviceId);
        }
        self.disconnect();
        let id = LinkId(self.next_id);
        self.next_id += 1;
        let sink = EventSink {
            link: id,
            tx: self.tx.clone(),
            repaint: self.repaint.clone(),
        };
        let request = LinkRequest {
            device_id: device_id.to_owned(),
            credential: credential.to_owned(),
        };
        let link = self.connector.open(&request, sink)?;
        info!("opening link {} to device '{}'", id.0, device_id);
        self.link = Some(link);
        Ok(id)
    }

    pub fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            info!("closing link {}", link.id().0);
            link.close(NORMAL_CLOSE);
        }
    }

    pub fn current(&self) -> Option<LinkId> {
        self.link.as_ref().map(|l| l.id())
    }

    /// Forgets a link that has already closed on its own.
    pub fn release(&mut self, id: LinkId) {
        if self.current() == Some(id) {
            self.link = None;
        }
    }

    pub fn try_next(&self) -> Option<StreamEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl<C: Connector> Drop for StreamClient<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

pub(crate) enum LinkCommand {
    Close(u16),
}

/// Link backed by a worker thread that owns the actual connection.
pub(crate) struct WorkerLink {
    id: LinkId,
    commands: Sender<LinkCommand>,
    done: Receiver<()>,
    closed: bool,
}

impl WorkerLink {
    pub(crate) fn spawn<F>(id: LinkId, name: String, work: F) -> Result<Self, ViewerError>
    where
        F: FnOnce(Receiver<LinkCommand>) + Send + 'static,
    {
        let (commands, command_rx) = channel();
        let (done_tx, done) = channel();
        thread::Builder::new().name(name).spawn(move || {
            work(command_rx);
            let _ = done_tx.send(());
        })
        .map_err(|err| ViewerError::Connect(format!("could not start link worker: {err}")))?;
        Ok(Self {
            id,
            commands,
            done,
            closed: false,
        })
    }
}

impl Link for WorkerLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn close(&mut self, code: u16) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.commands.send(LinkCommand::Close(code)).is_err() {
            return;
        }
        if self.done.recv_timeout(CLOSE_WAIT).is_err() {
            warn!("link {} did not finish closing in time", self.id.0);
        }
    }
}

impl Drop for WorkerLink {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.commands.send(LinkCommand::Close(NORMAL_CLOSE));
        }
    }
}

/// WebSocket links to the telemetry backend.
pub struct WsConnector {
    base_url: String,
    keepalive: Duration,
    connect_timeout: Duration,
}

impl WsConnector {
    /// `connect_timeout` bounds the TCP connect and, separately, the upgrade handshake.
    pub fn new(base_url: impl Into<String>, keepalive: Duration, connect_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            keepalive,
            connect_timeout,
        }
    }
}

impl Connector for WsConnector {
    fn open(
        &mut self,
        request: &LinkRequest,
        sink: EventSink,
    ) -> Result<Box<dyn Link>, ViewerError> {
        let url = endpoint_url(&self.base_url, &request.device_id, &request.credential)?;
        let keepalive = self.keepalive;
        let connect_timeout = self.connect_timeout;
        let device = request.device_id.clone();
        let id = sink.link();
        let link = WorkerLink::spawn(id, format!("ws-link-{}", id.0), move |commands| {
            run_ws_link(url, &device, commands, sink, keepalive, connect_timeout)
        })?;
        Ok(Box::new(link))
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

enum Dial {
    Open(Socket),
    Cancelled(u16),
    Failed(String),
}

fn run_ws_link(
    url: Url,
    device: &str,
    commands: Receiver<LinkCommand>,
    sink: EventSink,
    keepalive_every: Duration,
    connect_timeout: Duration,
) {
    let mut socket = match dial(&url, &commands, connect_timeout) {
        Dial::Open(socket) => socket,
        Dial::Cancelled(code) => {
            info!("link {} to '{device}' cancelled before open", sink.link().0);
            sink.emit(StreamEventKind::Closed {
                code: Some(code),
                reason: "closed by viewer".to_owned(),
            });
            return;
        }
        Dial::Failed(reason) => {
            warn!("link {} to '{device}' failed: {reason}", sink.link().0);
            sink.emit(StreamEventKind::Closed { code: None, reason });
            return;
        }
    };
    info!("link {} to '{device}' open", sink.link().0);
    sink.emit(StreamEventKind::Opened);
    let mut keepalive = Keepalive::new(keepalive_every);
    keepalive.start(Instant::now());
    let (code, reason) = pump_socket(&mut socket, &commands, &sink, &mut keepalive);
    keepalive.stop();
    info!("link {} closed (code {code:?})", sink.link().0);
    sink.emit(StreamEventKind::Closed { code, reason });
}

/// Opens the TCP stream and runs the upgrade handshake in poll-sized steps,
/// so a close command or the deadline ends a stalled attempt.
fn dial(url: &Url, commands: &Receiver<LinkCommand>, timeout: Duration) -> Dial {
    let addrs = match url.socket_addrs(|| None) {
        Ok(addrs) => addrs,
        Err(err) => return Dial::Failed(format!("cannot resolve {url}: {err}")),
    };
    let stream = match connect_any(&addrs, timeout) {
        Ok(stream) => stream,
        Err(err) => return Dial::Failed(format!("tcp connect failed: {err}")),
    };
    if let Err(err) = stream
        .set_read_timeout(Some(POLL_INTERVAL))
        .and_then(|()| stream.set_write_timeout(Some(WRITE_TIMEOUT)))
    {
        return Dial::Failed(format!("cannot set socket timeouts: {err}"));
    }
    if let Some(code) = pending_close(commands) {
        return Dial::Cancelled(code);
    }
    let deadline = Instant::now() + timeout;
    let mut attempt = tungstenite::client_tls_with_config(url.as_str(), stream, None, None);
    loop {
        match attempt {
            Ok((socket, _response)) => return Dial::Open(socket),
            Err(HandshakeError::Failure(err)) => return Dial::Failed(err.to_string()),
            Err(HandshakeError::Interrupted(mid)) => {
                if let Some(code) = pending_close(commands) {
                    return Dial::Cancelled(code);
                }
                if Instant::now() >= deadline {
                    return Dial::Failed(format!("handshake not finished after {timeout:?}"));
                }
                attempt = mid.handshake();
            }
        }
    }
}

fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    let mut last = io::Error::new(io::ErrorKind::NotFound, "no address resolved");
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last = err,
        }
    }
    Err(last)
}

/// Close code of a pending close request; a dropped command channel counts as a normal close.
fn pending_close(commands: &Receiver<LinkCommand>) -> Option<u16> {
    match commands.try_recv() {
        Ok(LinkCommand::Close(code)) => Some(code),
        Err(TryRecvError::Disconnected) => Some(NORMAL_CLOSE),
        Err(TryRecvError::Empty) => None,
    }
}

fn pump_socket(
    socket: &mut Socket,
    commands: &Receiver<LinkCommand>,
    sink: &EventSink,
    keepalive: &mut Keepalive,
) -> (Option<u16>, String) {
    let mut code = None;
    let mut reason = String::new();
    loop {
        if let Some(requested) = pending_close(commands) {
            close_gracefully(socket, requested);
            return (Some(requested), "closed by viewer".to_owned());
        }
        if keepalive.due(Instant::now()) {
            match socket.send(Message::Text(KEEPALIVE_PROBE.to_owned())) {
                Ok(()) => debug!("keepalive sent on link {}", sink.link().0),
                Err(err) => warn!("keepalive failed on link {}: {err}", sink.link().0),
            }
        }
        match socket.read() {
            Ok(Message::Text(text)) => {
                sink.emit(StreamEventKind::Frame(text));
            }
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => {
                    sink.emit(StreamEventKind::Frame(text));
                }
                Err(_) => debug!("dropping non-UTF-8 binary frame on link {}", sink.link().0),
            },
            Ok(Message::Close(frame)) => {
                // tungstenite answers the close; the next read reports ConnectionClosed.
                keepalive.stop();
                if let Some(frame) = frame {
                    code = Some(u16::from(frame.code));
                    reason = frame.reason.into_owned();
                }
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(err)) if is_timeout(&err) => {}
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                return (code, reason);
            }
            Err(err) if code.is_some() => {
                debug!("link {} ended after close frame: {err}", sink.link().0);
                return (code, reason);
            }
            Err(err) => {
                warn!("link {} read error: {err}", sink.link().0);
                return (None, err.to_string());
            }
        }
    }
}

fn close_gracefully(socket: &mut Socket, code: u16) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: Cow::Borrowed(""),
    };
    if let Err(err) = socket.close(Some(frame)) {
        debug!("close frame not sent: {err}");
        return;
    }
    let deadline = Instant::now() + CLOSE_HANDSHAKE_TIMEOUT;
    while Instant::now() < deadline {
        match socket.read() {
            Ok(_) => {}
            Err(tungstenite::Error::Io(err)) if is_timeout(&err) => {}
            Err(_) => break,
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
