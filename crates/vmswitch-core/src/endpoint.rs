//! Client endpoint (§4.3): one guest's stream connection, its outbound
//! regulator, its inbound reader, and the state cache they maintain.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, watch, RwLock};

use vmswitch_protocol::{
    encode_request, extract, Command, Frame, FrameDecoder, KbdLedsReturn, MouseStatusReturn,
    ProcessInfoReturn, XenStatusReturn,
};

use crate::adapters::ConsoleBackend;
use crate::error::AttachError;
use crate::registry::{FocusCell, Registry};

/// A lightweight, cloneable handle to an endpoint's outbound side. Callers
/// that only need to enqueue a command (the input pipeline forwarding a key
/// event, a focus transition sending `send-kbd-reset`) use this instead of
/// holding the registry lock for the round trip.
#[derive(Clone)]
pub struct EndpointHandle {
    outbound_tx: Option<mpsc::UnboundedSender<OutRequest>>,
}

impl EndpointHandle {
    /// Enqueue `command` and await its response. Returns `Ok(Value::Null)`
    /// immediately for the host (no wire connection) and `Err` if the
    /// endpoint has been detached.
    pub async fn send_command(&self, command: Command) -> Result<serde_json::Value, AttachError> {
        let Some(tx) = &self.outbound_tx else {
            return Ok(serde_json::Value::Null);
        };
        let (caller, rx) = oneshot::channel();
        tx.send(OutRequest { command, caller }).map_err(|_| AttachError::Closed)?;
        rx.await.map_err(|_| AttachError::Closed)?
    }

    /// Enqueue `command` without waiting for its response. The input
    /// pipeline's producer side must only push (§2, §5: "only the regulator
    /// pops, only producers push") — awaiting the guest's reply here would
    /// couple every forwarded keystroke to a round trip it doesn't need.
    /// Returns `Ok(())` immediately for the host (no wire connection) and
    /// `Err` if the endpoint has been detached.
    pub fn enqueue(&self, command: Command) -> Result<(), AttachError> {
        let Some(tx) = &self.outbound_tx else {
            return Ok(());
        };
        let (caller, _rx) = oneshot::channel();
        tx.send(OutRequest { command, caller }).map_err(|_| AttachError::Closed)
    }
}

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Consecutive unmatched-id responses before a protocol violation escalates
/// to fatal endpoint I/O (§7: "if repeated at high rate, treat as fatal").
const PROTOCOL_VIOLATION_THRESHOLD: u32 = 3;

/// Cached LED bit-set (§3 `led_state`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedSet {
    pub caps: bool,
    pub num: bool,
    pub scroll: bool,
}

/// Fields of `ClientEndpoint` (§3) learned from the guest over time.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointCache {
    pub domain_id: i64,
    pub process_id: i64,
    pub led_state: LedSet,
    pub mouse_mode_absolute: bool,
    pub recv_count: u64,
    pub sent_count: u64,
}

/// Shared, process-wide context every endpoint needs but none of them owns:
/// the focus cursor, the console backend, the message-id allocator, and the
/// configured response timeout.
pub struct EndpointContext {
    pub focus: FocusCell,
    pub backend: Arc<dyn ConsoleBackend>,
    pub next_id: AtomicI64,
    pub response_timeout: Option<Duration>,
}

impl EndpointContext {
    pub fn new(focus: FocusCell, backend: Arc<dyn ConsoleBackend>, response_timeout: Option<Duration>) -> Self {
        Self { focus, backend, next_id: AtomicI64::new(1), response_timeout }
    }

    fn alloc_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

struct OutRequest {
    command: Command,
    caller: oneshot::Sender<Result<serde_json::Value, AttachError>>,
}

/// The socket-backed half of an endpoint. `None` for the synthetic host
/// client (slot 0), which has no wire connection (§6).
struct GuestLink {
    outbound_tx: mpsc::UnboundedSender<OutRequest>,
    shutdown_tx: watch::Sender<bool>,
}

/// A member of the registry: either the synthetic host (slot 0) or a guest
/// with a live regulator/reader pair behind it.
pub struct Endpoint {
    pub slot_id: i64,
    /// Assigned by `Registry::insert`; disambiguates two endpoints that
    /// briefly share a `slot_id` across a collision (§4.4, §9).
    pub instance_id: u64,
    pub socket_path: Option<PathBuf>,
    pub active: Arc<AtomicBool>,
    pub cache: Arc<RwLock<EndpointCache>>,
    link: Option<GuestLink>,
}

impl Endpoint {
    /// The synthetic, immortal privileged client (§3 E2, §6).
    pub fn host() -> Self {
        Self {
            slot_id: 0,
            instance_id: 0,
            socket_path: None,
            active: Arc::new(AtomicBool::new(true)),
            cache: Arc::new(RwLock::new(EndpointCache::default())),
            link: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn domain_id(&self) -> i64 {
        self.cache.read().await.domain_id
    }

    pub async fn process_id(&self) -> i64 {
        self.cache.read().await.process_id
    }

    pub async fn led_state(&self) -> LedSet {
        self.cache.read().await.led_state
    }

    /// A cloneable handle to this endpoint's outbound side (see [`EndpointHandle`]).
    pub fn handle(&self) -> EndpointHandle {
        EndpointHandle { outbound_tx: self.link.as_ref().map(|l| l.outbound_tx.clone()) }
    }

    /// Enqueue `command` and await its response. Returns `Err` if this
    /// endpoint has no live connection (the host) or has been detached.
    pub async fn send_command(&self, command: Command) -> Result<serde_json::Value, AttachError> {
        self.handle().send_command(command).await
    }

    /// Mark inactive and signal the regulator/reader pair to wind down.
    /// Idempotent. Does not touch the registry — callers detach via
    /// `Registry::remove`, which calls this as part of teardown.
    pub fn mark_inactive(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(link) = &self.link {
            let _ = link.shutdown_tx.send(true);
        }
    }
}

/// Parse a non-negative slot id out of a `slot-<N>` socket path.
pub fn parse_slot_id(path: &std::path::Path) -> Option<i64> {
    let name = path.file_name()?.to_str()?;
    let n: i64 = name.strip_prefix("slot-")?.parse().ok()?;
    if n <= 0 {
        None
    } else {
        Some(n)
    }
}

/// Attach sequence (§4.3 steps 1-6): connect with retry, build the endpoint,
/// insert it into `registry`, spawn its regulator and reader, and fire off
/// the initial handshake. Returns once the endpoint is registered; the
/// regulator/reader/handshake continue running as background tasks.
pub async fn attach(
    path: PathBuf,
    registry: Registry,
    context: Arc<EndpointContext>,
) -> Result<(), AttachError> {
    let slot_id = parse_slot_id(&path).ok_or_else(|| AttachError::InvalidSlot(path.clone()))?;

    let mut last_err = None;
    let mut stream = None;
    for attempt in 0..CONNECT_ATTEMPTS {
        match UnixStream::connect(&path).await {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < CONNECT_ATTEMPTS {
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
            }
        }
    }
    let Some(stream) = stream else {
        return Err(AttachError::ConnectExhausted {
            path,
            attempts: CONNECT_ATTEMPTS,
            source: last_err.expect("loop ran at least once"),
        });
    };

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let active = Arc::new(AtomicBool::new(true));
    let cache = Arc::new(RwLock::new(EndpointCache::default()));

    let endpoint = Endpoint {
        slot_id,
        instance_id: 0,
        socket_path: Some(path.clone()),
        active: active.clone(),
        cache: cache.clone(),
        link: Some(GuestLink { outbound_tx: outbound_tx.clone(), shutdown_tx }),
    };

    let instance_id = registry.insert(endpoint).await;

    let (read_half, write_half) = stream.into_split();
    let pending = Arc::new(tokio::sync::Mutex::new(std::collections::HashMap::new()));

    tokio::spawn(run_regulator(
        slot_id,
        instance_id,
        write_half,
        outbound_rx,
        shutdown_rx.clone(),
        pending.clone(),
        active.clone(),
        cache.clone(),
        context.clone(),
        registry.clone(),
    ));
    tokio::spawn(run_reader(
        slot_id,
        instance_id,
        read_half,
        shutdown_rx,
        pending,
        active,
        cache,
        context.clone(),
        registry.clone(),
    ));

    tracing::info!(slot_id, ?path, "endpoint attached");

    let handshake_tx = outbound_tx;
    tokio::spawn(run_handshake(slot_id, handshake_tx));

    Ok(())
}

async fn run_handshake(slot_id: i64, outbound_tx: mpsc::UnboundedSender<OutRequest>) {
    for command in [
        Command::QmpCapabilities,
        Command::QueryXenStatus,
        Command::QueryProcessInfo,
        Command::QueryKbdLeds,
    ] {
        let (tx, rx) = oneshot::channel();
        if outbound_tx.send(OutRequest { command, caller: tx }).is_err() {
            return;
        }
        if rx.await.is_err() {
            tracing::warn!(slot_id, "handshake aborted: endpoint detached");
            return;
        }
    }
    tracing::debug!(slot_id, "handshake complete");
}

type PendingMap = Arc<tokio::sync::Mutex<std::collections::HashMap<i64, oneshot::Sender<serde_json::Value>>>>;

#[allow(clippy::too_many_arguments)]
async fn run_regulator(
    slot_id: i64,
    instance_id: u64,
    mut write_half: tokio::net::unix::OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<OutRequest>,
    mut shutdown_rx: watch::Receiver<bool>,
    pending: PendingMap,
    active: Arc<AtomicBool>,
    cache: Arc<RwLock<EndpointCache>>,
    context: Arc<EndpointContext>,
    registry: Registry,
) {
    loop {
        let req = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            req = outbound_rx.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };

        if !active.load(Ordering::SeqCst) {
            let _ = req.caller.send(Err(AttachError::Closed));
            continue;
        }

        let id = context.alloc_id();
        let (pending_tx, pending_rx) = oneshot::channel();
        pending.lock().await.insert(id, pending_tx);

        let bytes = encode_request(id, &req.command);
        if let Err(e) = write_half.write_all(&bytes).await {
            tracing::warn!(slot_id, error = %e, "write failed, detaching endpoint");
            pending.lock().await.remove(&id);
            let _ = req.caller.send(Err(AttachError::Closed));
            active.store(false, Ordering::SeqCst);
            registry.remove_instance(slot_id, instance_id).await;
            break;
        }
        cache.write().await.sent_count += 1;

        let awaited = match context.response_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, pending_rx).await {
                Ok(inner) => inner,
                Err(_) => {
                    tracing::warn!(slot_id, id, "response timed out, detaching endpoint");
                    pending.lock().await.remove(&id);
                    let _ = req.caller.send(Err(AttachError::Timeout));
                    active.store(false, Ordering::SeqCst);
                    registry.remove_instance(slot_id, instance_id).await;
                    break;
                }
            },
            None => pending_rx.await,
        };

        match awaited {
            Ok(value) => {
                apply_returned_fields(&req.command, &value, &cache, &context, slot_id).await;
                let _ = req.caller.send(Ok(value));
            }
            Err(_) => {
                // Reader dropped the sender without fulfilling it: the
                // endpoint is already detaching.
                let _ = req.caller.send(Err(AttachError::Closed));
                break;
            }
        }
    }

    tracing::debug!(slot_id, "regulator exiting");
}

#[allow(clippy::too_many_arguments)]
async fn run_reader(
    slot_id: i64,
    instance_id: u64,
    mut read_half: tokio::net::unix::OwnedReadHalf,
    mut shutdown_rx: watch::Receiver<bool>,
    pending: PendingMap,
    active: Arc<AtomicBool>,
    cache: Arc<RwLock<EndpointCache>>,
    context: Arc<EndpointContext>,
    registry: Registry,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0_u8; 4096];
    let mut violations: u32 = 0;

    loop {
        let n = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            result = read_half.read(&mut buf) => match result {
                Ok(0) => {
                    tracing::info!(slot_id, "endpoint EOF");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(slot_id, error = %e, "read error, detaching endpoint");
                    break;
                }
            },
        };

        let frames = match decoder.feed(&buf[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(slot_id, error = %e, "malformed frame, dropping");
                continue;
            }
        };

        for frame in frames {
            match frame {
                Frame::Return { id, value } => {
                    let sender = pending.lock().await.remove(&id);
                    match sender {
                        Some(tx) => {
                            violations = 0;
                            cache.write().await.recv_count += 1;
                            let _ = tx.send(value);
                        }
                        None => {
                            violations += 1;
                            tracing::warn!(slot_id, id, violations, "response with no matching pending request");
                            if violations >= PROTOCOL_VIOLATION_THRESHOLD {
                                tracing::warn!(slot_id, "protocol violations exceeded threshold, detaching endpoint");
                                active.store(false, Ordering::SeqCst);
                                pending.lock().await.clear();
                                registry.remove_instance(slot_id, instance_id).await;
                                return;
                            }
                        }
                    }
                }
                Frame::Event(event) => {
                    apply_event(&event, &cache, &context, slot_id).await;
                }
                Frame::Malformed(value) => {
                    tracing::warn!(slot_id, ?value, "unrecognized frame shape, dropping");
                }
            }
        }
    }

    active.store(false, Ordering::SeqCst);
    // Drop every in-flight sender so a regulator parked on `pending_rx.await`
    // (response_timeout defaults to `None`, i.e. unbounded) resolves with an
    // error instead of hanging forever (§4.3: waiting senders are released
    // with a failure).
    pending.lock().await.clear();
    registry.remove_instance(slot_id, instance_id).await;
    tracing::debug!(slot_id, "reader exiting");
}

async fn apply_returned_fields(
    command: &Command,
    value: &serde_json::Value,
    cache: &Arc<RwLock<EndpointCache>>,
    context: &Arc<EndpointContext>,
    slot_id: i64,
) {
    match command {
        Command::QueryXenStatus => {
            let parsed: XenStatusReturn = extract(value);
            if let Some(domain) = parsed.domain {
                cache.write().await.domain_id = domain;
            }
        }
        Command::QueryProcessInfo => {
            let parsed: ProcessInfoReturn = extract(value);
            if let Some(pid) = parsed.pid {
                cache.write().await.process_id = pid;
            }
        }
        Command::QueryKbdLeds => apply_kbd_leds(value, cache, context, slot_id).await,
        Command::QueryMouseStatus => apply_mouse_status(value, cache).await,
        _ => {}
    }
}

async fn apply_event(
    event: &vmswitch_protocol::GuestEvent,
    cache: &Arc<RwLock<EndpointCache>>,
    context: &Arc<EndpointContext>,
    slot_id: i64,
) {
    match event.name.as_str() {
        "KBD_LEDS_UPDATE" => apply_kbd_leds(&event.data, cache, context, slot_id).await,
        "MOUSE_MODE_UPDATE" => apply_mouse_status(&event.data, cache).await,
        "DISPLAY_MODE_UPDATE" => {
            tracing::debug!(slot_id, "display mode update event (reserved, no-op)");
        }
        other => {
            tracing::debug!(slot_id, event = other, "unhandled event name");
        }
    }
}

async fn apply_kbd_leds(
    value: &serde_json::Value,
    cache: &Arc<RwLock<EndpointCache>>,
    context: &Arc<EndpointContext>,
    slot_id: i64,
) {
    let parsed: KbdLedsReturn = extract(value);
    let mut guard = cache.write().await;
    if let Some(caps) = parsed.caps {
        guard.led_state.caps = caps;
    }
    if let Some(num) = parsed.num {
        guard.led_state.num = num;
    }
    if let Some(scroll) = parsed.scroll {
        guard.led_state.scroll = scroll;
    }
    let leds = guard.led_state;
    drop(guard);

    if context.focus.is_focused(slot_id) {
        context.backend.set_leds(leds).await;
    }
}

async fn apply_mouse_status(value: &serde_json::Value, cache: &Arc<RwLock<EndpointCache>>) {
    let parsed: MouseStatusReturn = extract(value);
    if let Some(absolute) = parsed.absolute {
        cache.write().await.mouse_mode_absolute = absolute;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positive_slot_id() {
        assert_eq!(parse_slot_id(std::path::Path::new("/var/run/qips/slot-3")), Some(3));
    }

    #[test]
    fn rejects_non_positive_or_malformed_slot_id() {
        assert_eq!(parse_slot_id(std::path::Path::new("/var/run/qips/slot-0")), None);
        assert_eq!(parse_slot_id(std::path::Path::new("/var/run/qips/slot--1")), None);
        assert_eq!(parse_slot_id(std::path::Path::new("/var/run/qips/not-a-slot")), None);
    }
}
