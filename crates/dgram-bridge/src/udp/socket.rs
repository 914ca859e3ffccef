//! UDP socket with signal-based event delivery.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use dgram_bridge_core::Signal;
use dgram_bridge_core::logging::targets;
use parking_lot::Mutex;

use super::config::{AddressInfo, Message, OutputFormat, RemoteInfo, SocketKind, UdpSocketConfig};
use super::request::{BindRequest, SendRequest, bind_target};
use super::state::{SocketState, StateEvent};
use crate::buffer::Payload;
use crate::error::{Result, SocketError};
use crate::service::{
    CreateInfo, Protocol, RecvFromInfo, SendInfo, SocketId, SocketInfo, SocketService,
    result_codes,
};

/// Signals emitted by a [`UdpSocket`].
///
/// - [`created`](Self::created): the service created the socket
/// - [`listening`](Self::listening): bound, with the receive loop running
/// - [`message`](Self::message): a datagram arrived
/// - [`error`](Self::error): a transport error, or a deferred call that failed
/// - [`close`](Self::close): the socket was closed
///
/// Every slot is disconnected by [`UdpSocket::close`], right after `close`
/// is emitted.
#[derive(Debug, Default)]
pub struct SocketEvents {
    /// Emitted once, when the service hands out the socket handle.
    pub created: Signal<CreateInfo>,
    /// Emitted once, when the socket starts listening.
    pub listening: Signal<()>,
    /// Emitted for every received datagram.
    pub message: Signal<Message>,
    /// Emitted for asynchronous errors. Unhandled errors are logged.
    pub error: Signal<SocketError>,
    /// Emitted when the socket is closed.
    pub close: Signal<()>,
}

impl SocketEvents {
    fn disconnect_all(&self) {
        self.created.disconnect_all();
        self.listening.disconnect_all();
        self.message.disconnect_all();
        self.error.disconnect_all();
        self.close.disconnect_all();
    }
}

/// Mutable socket state, guarded by one lock.
///
/// The lock is never held across a service call or a signal emission.
#[derive(Debug, Default)]
struct Lifecycle {
    state: SocketState,
    handle: Option<SocketId>,
    local_endpoint: Option<AddressInfo>,
    pending_binds: VecDeque<BindRequest>,
    pending_sends: VecDeque<SendRequest>,
    /// Set once `listening` has been emitted.
    announced: bool,
    /// A receive that completed before `listening` was emitted.
    early_receive: Option<RecvFromInfo>,
}

impl Lifecycle {
    fn apply(&mut self, event: StateEvent) -> Result<SocketState> {
        let next = self.state.transition(event)?;
        tracing::debug!(target: targets::SOCKET, from = %self.state, to = %next, %event, "state transition");
        self.state = next;
        Ok(next)
    }
}

struct Shared {
    config: UdpSocketConfig,
    service: Arc<dyn SocketService>,
    lifecycle: Mutex<Lifecycle>,
    events: SocketEvents,
}

/// What the send gate decided for a request.
enum Gate {
    Open(SocketId, SendRequest),
    /// Queued, with an implicit bind queued behind creation.
    Create,
    /// Queued behind a bind that is pending or about to be issued.
    Deferred { trigger_bind: bool },
}

/// A UDP socket driven by an asynchronous [`SocketService`].
///
/// `bind` and `send` return immediately. A socket that has not been created
/// yet is created on the first `bind` or `send`; a `send` on a socket that is
/// not listening yet binds it to an ephemeral port. Calls that arrive too
/// early are queued and replayed, in order, once the socket reaches the
/// state they need. At most one create and one bind are ever in flight.
///
/// Handles are cheap to clone and share one socket. Service callbacks only
/// hold a weak reference: once every handle is dropped, outstanding
/// completions are ignored and the receive loop ends.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use dgram_bridge::service::{MockSocketService, SocketInfo};
/// use dgram_bridge::udp::{UdpSocket, UdpSocketConfig};
///
/// let service = Arc::new(MockSocketService::auto(
///     7,
///     SocketInfo {
///         local_address: Some("0.0.0.0".into()),
///         local_port: Some(41234),
///         socket_type: "udp4".into(),
///     },
/// ));
/// let socket = UdpSocket::new(service.clone(), UdpSocketConfig::new());
///
/// socket.events().message.connect(|message| {
///     println!("{} bytes from {}", message.data.len(), message.remote.address);
/// });
///
/// // Creates, binds and then sends.
/// socket.send(b"hello", 0, 5, 9000, "127.0.0.1").unwrap();
/// assert!(socket.is_listening());
/// ```
#[derive(Clone)]
pub struct UdpSocket {
    shared: Arc<Shared>,
}

impl UdpSocket {
    /// Create a socket on top of `service`. No service call is made yet.
    pub fn new(service: Arc<dyn SocketService>, config: UdpSocketConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                service,
                lifecycle: Mutex::new(Lifecycle::default()),
                events: SocketEvents::default(),
            }),
        }
    }

    /// Create a socket with a slot already connected to `message`.
    pub fn with_message_listener<F>(
        service: Arc<dyn SocketService>,
        config: UdpSocketConfig,
        listener: F,
    ) -> Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let socket = Self::new(service, config);
        socket.shared.events.message.connect(listener);
        socket
    }

    fn downgrade(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    fn upgrade(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    /// The socket's signals.
    pub fn events(&self) -> &SocketEvents {
        &self.shared.events
    }

    /// The configured socket kind.
    pub fn kind(&self) -> SocketKind {
        self.shared.config.kind
    }

    /// The configured payload representation for received datagrams.
    pub fn output(&self) -> OutputFormat {
        self.shared.config.output
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SocketState {
        self.shared.lifecycle.lock().state
    }

    /// Whether the socket is bound and receiving.
    pub fn is_listening(&self) -> bool {
        self.state() == SocketState::Listening
    }

    /// The service handle, once created. Kept after close.
    pub fn handle(&self) -> Option<SocketId> {
        self.shared.lifecycle.lock().handle
    }

    /// The local endpoint.
    ///
    /// Fails with [`SocketError::NotBound`] until the socket has listened. The
    /// endpoint is kept after close.
    pub fn address(&self) -> Result<AddressInfo> {
        self.shared
            .lifecycle
            .lock()
            .local_endpoint
            .clone()
            .ok_or(SocketError::NotBound)
    }

    /// Ask the service for a socket unless one exists or is on its way.
    pub fn ensure_created(&self) -> Result<()> {
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            match lifecycle.state {
                SocketState::Closed => return Err(SocketError::Closed),
                SocketState::Idle => {
                    lifecycle.apply(StateEvent::BeginCreate)?;
                }
                _ => return Ok(()),
            }
        }

        let weak = self.downgrade();
        self.shared.service.create(
            Protocol::Udp,
            Box::new(move |info| {
                if let Some(socket) = Self::upgrade(&weak) {
                    socket.on_created(info);
                }
            }),
        );
        Ok(())
    }

    fn on_created(&self, info: CreateInfo) {
        let Some(socket_id) = SocketId::from_raw(info.socket_id) else {
            let discarded = {
                let mut lifecycle = self.shared.lifecycle.lock();
                if lifecycle.apply(StateEvent::CreateFailed).is_err() {
                    return;
                }
                std::mem::take(&mut lifecycle.pending_binds).len()
            };
            if discarded > 0 {
                tracing::warn!(target: targets::SOCKET, discarded, "socket creation failed, dropping queued binds");
            }
            self.report_error(SocketError::Create {
                code: info.socket_id,
            });
            return;
        };

        let binds = {
            let mut lifecycle = self.shared.lifecycle.lock();
            if lifecycle.state == SocketState::Closed {
                drop(lifecycle);
                tracing::debug!(target: targets::SOCKET, %socket_id, "created after close, destroying");
                self.shared.service.destroy(socket_id);
                return;
            }
            if let Err(err) = lifecycle.apply(StateEvent::CreateSucceeded) {
                tracing::warn!(target: targets::SOCKET, error = %err, "unexpected create completion");
                return;
            }
            lifecycle.handle = Some(socket_id);
            std::mem::take(&mut lifecycle.pending_binds)
        };

        self.shared.events.created.emit(info);

        for request in binds {
            if let Err(err) = self.bind(request.port, request.address.as_deref()) {
                self.report_error(err);
            }
        }
    }

    /// Bind the socket.
    ///
    /// `port` defaults to 0 (an ephemeral port chosen by the system) and
    /// `address` to `0.0.0.0`; `"localhost"` is bound as `0.0.0.0`. Before the
    /// socket exists the call is queued and creation is started. Completion
    /// is reported through [`SocketEvents::listening`] or
    /// [`SocketEvents::error`].
    ///
    /// # Errors
    ///
    /// [`SocketError::AlreadyListening`], [`SocketError::AlreadyBinding`],
    /// [`SocketError::Closed`].
    pub fn bind(&self, port: Option<u16>, address: Option<&str>) -> Result<&Self> {
        let socket_id = {
            let mut lifecycle = self.shared.lifecycle.lock();
            match lifecycle.state {
                SocketState::Closed => return Err(SocketError::Closed),
                SocketState::Idle | SocketState::Creating => {
                    lifecycle
                        .pending_binds
                        .push_back(BindRequest::new(port, address));
                    None
                }
                state => {
                    let socket_id = lifecycle.handle.ok_or(SocketError::InvalidTransition {
                        from: state,
                        event: StateEvent::BeginBind,
                    })?;
                    lifecycle.apply(StateEvent::BeginBind)?;
                    Some(socket_id)
                }
            }
        };

        let Some(socket_id) = socket_id else {
            tracing::debug!(target: targets::SOCKET, "bind deferred until the socket is created");
            self.ensure_created()?;
            return Ok(self);
        };

        let (address, port) = bind_target(port, address);
        tracing::debug!(target: targets::SOCKET, %socket_id, %address, port, "binding");

        let weak = self.downgrade();
        let target = address.clone();
        self.shared.service.bind(
            socket_id,
            &address,
            port,
            Box::new(move |result_code| {
                if let Some(socket) = Self::upgrade(&weak) {
                    socket.on_bound(socket_id, target, port, result_code);
                }
            }),
        );
        Ok(self)
    }

    fn on_bound(&self, socket_id: SocketId, address: String, port: u16, result_code: i32) {
        if result_code < 0 {
            if self
                .shared
                .lifecycle
                .lock()
                .apply(StateEvent::BindFailed)
                .is_err()
            {
                return;
            }
            self.report_error(SocketError::Bind {
                code: result_code,
                address,
                port,
            });
            return;
        }

        if self.state() == SocketState::Closed {
            return;
        }

        let weak = self.downgrade();
        self.shared.service.get_info(
            socket_id,
            Box::new(move |info| {
                if let Some(socket) = Self::upgrade(&weak) {
                    socket.on_info(socket_id, address, port, info);
                }
            }),
        );
    }

    fn on_info(&self, socket_id: SocketId, address: String, port: u16, info: SocketInfo) {
        let endpoint = match (info.local_address, info.local_port) {
            (Some(local_address), Some(local_port)) => AddressInfo {
                address: local_address,
                port: local_port,
                family: info.socket_type,
            },
            _ => {
                tracing::warn!(target: targets::SOCKET, %socket_id, "service reported no local endpoint after bind");
                if self
                    .shared
                    .lifecycle
                    .lock()
                    .apply(StateEvent::BindFailed)
                    .is_err()
                {
                    return;
                }
                self.report_error(SocketError::Bind {
                    code: result_codes::FAILED,
                    address,
                    port,
                });
                return;
            }
        };

        {
            let mut lifecycle = self.shared.lifecycle.lock();
            if lifecycle.state != SocketState::Binding {
                return;
            }
            lifecycle.local_endpoint = Some(endpoint);
        }

        // Completions arriving before `listening` is out are held back.
        self.arm_receive(socket_id);

        let sends = {
            let mut lifecycle = self.shared.lifecycle.lock();
            if let Err(err) = lifecycle.apply(StateEvent::BindSucceeded) {
                tracing::debug!(target: targets::SOCKET, error = %err, "bind completed after state change");
                return;
            }
            std::mem::take(&mut lifecycle.pending_sends)
        };

        self.shared.events.listening.emit(());

        let early = {
            let mut lifecycle = self.shared.lifecycle.lock();
            lifecycle.announced = true;
            lifecycle.early_receive.take()
        };
        if let Some(info) = early {
            self.dispatch_received(socket_id, info);
        }

        for request in sends {
            if let Err(err) = self.submit(request) {
                self.report_error(err);
            }
        }
    }

    fn arm_receive(&self, socket_id: SocketId) {
        let weak = self.downgrade();
        self.shared.service.recv_from(
            socket_id,
            Box::new(move |info| {
                if let Some(socket) = Self::upgrade(&weak) {
                    socket.on_received(socket_id, info);
                }
            }),
        );
    }

    fn on_received(&self, socket_id: SocketId, info: RecvFromInfo) {
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            if !lifecycle.announced && lifecycle.state != SocketState::Closed {
                tracing::trace!(target: targets::SOCKET, %socket_id, "holding receive completion until listening");
                lifecycle.early_receive = Some(info);
                return;
            }
        }
        self.dispatch_received(socket_id, info);
    }

    fn dispatch_received(&self, socket_id: SocketId, info: RecvFromInfo) {
        if self.state() == SocketState::Closed {
            tracing::trace!(target: targets::SOCKET, %socket_id, "dropping receive completion after close");
            return;
        }

        // A failed receive is not re-armed.
        if info.result_code < 0 {
            self.report_error(SocketError::Recv {
                code: info.result_code,
            });
            return;
        }

        self.arm_receive(socket_id);

        tracing::trace!(
            target: targets::SOCKET,
            %socket_id,
            bytes = info.data.byte_length(),
            from = %info.address,
            port = info.port,
            "datagram received"
        );
        let data = Payload::from_service(info.data, self.shared.config.output);
        self.shared.events.message.emit(Message::new(
            data,
            RemoteInfo {
                address: info.address,
                port: info.port,
            },
        ));
    }

    /// Send `buffer[offset..offset + length]` to `address:port`.
    ///
    /// On a socket that is not listening yet the send is queued, the socket is
    /// bound to an ephemeral port if no bind is pending, and the datagram goes
    /// out once [`SocketEvents::listening`] has fired.
    ///
    /// # Errors
    ///
    /// [`SocketError::OffsetOutOfRange`] if `offset >= buffer.len()`,
    /// [`SocketError::LengthOutOfRange`] if `offset + length > buffer.len()`,
    /// [`SocketError::Closed`]. A failing call makes no service calls.
    pub fn send(
        &self,
        buffer: impl Into<Payload>,
        offset: usize,
        length: usize,
        port: u16,
        address: &str,
    ) -> Result<()> {
        self.submit(SendRequest {
            buffer: buffer.into(),
            offset,
            length,
            port,
            address: address.to_string(),
            callback: None,
        })
    }

    /// Like [`send`](Self::send), invoking `callback` with the service's raw
    /// result once the datagram has been handed over.
    ///
    /// The callback is dropped without being called if the socket is closed
    /// while the send is still queued.
    pub fn send_with_callback<F>(
        &self,
        buffer: impl Into<Payload>,
        offset: usize,
        length: usize,
        port: u16,
        address: &str,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(SendInfo) + Send + 'static,
    {
        self.submit(SendRequest {
            buffer: buffer.into(),
            offset,
            length,
            port,
            address: address.to_string(),
            callback: Some(Box::new(callback)),
        })
    }

    fn submit(&self, request: SendRequest) -> Result<()> {
        request.validate()?;

        let gate = {
            let mut lifecycle = self.shared.lifecycle.lock();
            match (lifecycle.state, lifecycle.handle) {
                (SocketState::Closed, _) => return Err(SocketError::Closed),
                (SocketState::Listening, Some(socket_id)) => Gate::Open(socket_id, request),
                (state, _) => {
                    lifecycle.pending_sends.push_back(request);
                    let bind_pending =
                        state == SocketState::Binding || !lifecycle.pending_binds.is_empty();
                    match state {
                        SocketState::Idle | SocketState::Creating if !bind_pending => {
                            lifecycle.pending_binds.push_back(BindRequest::new(None, None));
                            Gate::Create
                        }
                        _ => Gate::Deferred {
                            trigger_bind: !bind_pending,
                        },
                    }
                }
            }
        };

        match gate {
            Gate::Open(socket_id, request) => {
                self.transmit(socket_id, request);
                Ok(())
            }
            Gate::Create => {
                tracing::debug!(target: targets::SOCKET, "send deferred until the socket is created and bound");
                self.ensure_created()
            }
            Gate::Deferred { trigger_bind } => {
                tracing::debug!(target: targets::SOCKET, trigger_bind, "send deferred until listening");
                if !trigger_bind {
                    return Ok(());
                }
                match self.bind(None, None) {
                    // Another caller got there first; the queued send rides on that bind.
                    Ok(_) | Err(SocketError::AlreadyBinding | SocketError::AlreadyListening) => {
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    fn transmit(&self, socket_id: SocketId, request: SendRequest) {
        let data = request
            .buffer
            .slice_for_service(request.offset, request.length);
        tracing::trace!(
            target: targets::SOCKET,
            %socket_id,
            bytes = data.byte_length(),
            to = %request.address,
            port = request.port,
            "sending datagram"
        );

        let callback = request.callback;
        self.shared.service.send_to(
            socket_id,
            data,
            &request.address,
            request.port,
            Box::new(move |info| {
                if let Some(callback) = callback {
                    callback(info);
                }
            }),
        );
    }

    /// Close the socket.
    ///
    /// Destroys the service socket without waiting for completion, emits
    /// [`SocketEvents::close`], then disconnects every slot. Queued binds and
    /// sends are dropped. The socket cannot be reused.
    ///
    /// # Errors
    ///
    /// [`SocketError::Closed`] if the socket is already closed.
    pub fn close(&self) -> Result<()> {
        let handle = {
            let mut lifecycle = self.shared.lifecycle.lock();
            lifecycle.apply(StateEvent::Close)?;
            lifecycle.pending_binds.clear();
            lifecycle.early_receive = None;
            let dropped = lifecycle.pending_sends.len();
            lifecycle.pending_sends.clear();
            if dropped > 0 {
                tracing::warn!(target: targets::SOCKET, dropped, "closing with queued sends");
            }
            lifecycle.handle
        };

        match handle {
            Some(socket_id) => self.shared.service.destroy(socket_id),
            None => tracing::debug!(target: targets::SOCKET, "closed before the socket was created"),
        }

        self.shared.events.close.emit(());
        self.shared.events.disconnect_all();
        Ok(())
    }

    fn report_error(&self, err: SocketError) {
        let description = err.to_string();
        if self.shared.events.error.emit(err) == 0 {
            tracing::error!(target: targets::SOCKET, error = %description, "unhandled socket error");
        }
    }

    // Socket options the service does not support.

    /// Not supported; always fails with [`SocketError::NotImplemented`].
    pub fn set_broadcast(&self, _enabled: bool) -> Result<()> {
        Err(SocketError::NotImplemented("set_broadcast"))
    }

    /// Not supported; always fails with [`SocketError::NotImplemented`].
    pub fn set_ttl(&self, _ttl: u32) -> Result<()> {
        Err(SocketError::NotImplemented("set_ttl"))
    }

    /// Not supported; always fails with [`SocketError::NotImplemented`].
    pub fn set_multicast_ttl(&self, _ttl: u32) -> Result<()> {
        Err(SocketError::NotImplemented("set_multicast_ttl"))
    }

    /// Not supported; always fails with [`SocketError::NotImplemented`].
    pub fn set_multicast_loopback(&self, _enabled: bool) -> Result<()> {
        Err(SocketError::NotImplemented("set_multicast_loopback"))
    }

    /// Not supported; always fails with [`SocketError::NotImplemented`].
    pub fn add_membership(
        &self,
        _multicast_address: &str,
        _interface_address: Option<&str>,
    ) -> Result<()> {
        Err(SocketError::NotImplemented("add_membership"))
    }

    /// Not supported; always fails with [`SocketError::NotImplemented`].
    pub fn drop_membership(
        &self,
        _multicast_address: &str,
        _interface_address: Option<&str>,
    ) -> Result<()> {
        Err(SocketError::NotImplemented("drop_membership"))
    }
}

/// Create a socket of `kind` with `Buffer` output.
pub fn create_socket(service: Arc<dyn SocketService>, kind: SocketKind) -> UdpSocket {
    UdpSocket::new(service, UdpSocketConfig::new().kind(kind))
}

impl std::fmt::Debug for UdpSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lifecycle = self.shared.lifecycle.lock();
        f.debug_struct("UdpSocket")
            .field("kind", &self.shared.config.kind)
            .field("output", &self.shared.config.output)
            .field("state", &lifecycle.state)
            .field("handle", &lifecycle.handle)
            .field("local_endpoint", &lifecycle.local_endpoint)
            .field("pending_binds", &lifecycle.pending_binds.len())
            .field("pending_sends", &lifecycle.pending_sends.len())
            .finish()
    }
}
