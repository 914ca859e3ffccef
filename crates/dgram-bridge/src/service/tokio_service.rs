//! Socket service backed by `tokio::net::UdpSocket`.

use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dgram_bridge_core::logging::targets;
use parking_lot::Mutex;
use tokio::net::UdpSocket as TokioUdpSocket;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use super::result_codes;
use super::{
    Callback, CreateInfo, Protocol, RecvFromInfo, SendInfo, SocketId, SocketInfo, SocketService,
};
use crate::buffer::ArrayBuffer;

/// Default receive buffer size in bytes.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65535;

/// A service socket: reserved by `create`, filled in by `bind`.
#[derive(Default)]
struct Entry {
    socket: Option<Arc<TokioUdpSocket>>,
    /// Outstanding bind/recv/send tasks, aborted on destroy.
    tasks: Vec<AbortHandle>,
}

type Sockets = Arc<Mutex<HashMap<SocketId, Entry>>>;

/// A [`SocketService`] that moves real datagrams.
///
/// `create` only reserves an id; the OS socket comes into existence on
/// `bind`. Bind, receive and send run as tasks on the given runtime and
/// invoke their callbacks from a runtime thread. `destroy` aborts any
/// outstanding task, so callbacks for a destroyed socket may never fire.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use dgram_bridge::service::TokioSocketService;
/// use dgram_bridge::udp::{UdpSocket, UdpSocketConfig};
///
/// let service = Arc::new(TokioSocketService::current());
/// let socket = UdpSocket::new(service, UdpSocketConfig::new());
///
/// socket.events().message.connect(|message| {
///     println!("{} bytes from {}", message.data.len(), message.remote.address);
/// });
/// socket.bind(Some(9000), None)?;
/// ```
pub struct TokioSocketService {
    runtime: Handle,
    recv_buffer_size: usize,
    next_id: AtomicU32,
    sockets: Sockets,
}

impl TokioSocketService {
    /// Create a service that spawns its tasks on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            next_id: AtomicU32::new(1),
            sockets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a service on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Set the receive buffer size. Longer datagrams are truncated.
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    /// Number of sockets created and not yet destroyed.
    pub fn socket_count(&self) -> usize {
        self.sockets.lock().len()
    }

    fn socket(&self, socket_id: SocketId) -> Option<Arc<TokioUdpSocket>> {
        self.sockets
            .lock()
            .get(&socket_id)
            .and_then(|entry| entry.socket.clone())
    }

    fn spawn_tracked<F>(&self, socket_id: SocketId, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.runtime.spawn(task);
        let mut sockets = self.sockets.lock();
        match sockets.get_mut(&socket_id) {
            Some(entry) => {
                entry.tasks.retain(|task| !task.is_finished());
                entry.tasks.push(handle.abort_handle());
            }
            None => handle.abort(),
        }
    }
}

fn parse_ip(address: &str) -> Option<IpAddr> {
    address.parse().ok()
}

fn result_len(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

impl SocketService for TokioSocketService {
    fn create(&self, protocol: Protocol, callback: Callback<CreateInfo>) {
        if protocol != Protocol::Udp {
            tracing::warn!(target: targets::SERVICE, ?protocol, "unsupported protocol");
            callback(CreateInfo {
                socket_id: result_codes::INVALID_ARGUMENT,
            });
            return;
        }

        let socket_id = SocketId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sockets.lock().insert(socket_id, Entry::default());
        tracing::debug!(target: targets::SERVICE, %socket_id, "socket created");

        let raw = i32::try_from(socket_id.0).unwrap_or(result_codes::FAILED);
        callback(CreateInfo { socket_id: raw });
    }

    fn bind(&self, socket_id: SocketId, address: &str, port: u16, callback: Callback<i32>) {
        let Some(ip) = parse_ip(address) else {
            callback(result_codes::ADDRESS_INVALID);
            return;
        };
        let bound = self
            .sockets
            .lock()
            .get(&socket_id)
            .map(|entry| entry.socket.is_some());
        match bound {
            None => callback(result_codes::INVALID_HANDLE),
            Some(true) => callback(result_codes::FAILED),
            Some(false) => {
                let sockets = self.sockets.clone();
                let addr = SocketAddr::new(ip, port);
                self.spawn_tracked(socket_id, async move {
                    match TokioUdpSocket::bind(addr).await {
                        Ok(socket) => {
                            let stored = match sockets.lock().get_mut(&socket_id) {
                                Some(entry) => {
                                    entry.socket = Some(Arc::new(socket));
                                    true
                                }
                                None => false,
                            };
                            if stored {
                                tracing::debug!(target: targets::SERVICE, %socket_id, %addr, "socket bound");
                                callback(result_codes::OK);
                            }
                        }
                        Err(err) => {
                            tracing::debug!(target: targets::SERVICE, %socket_id, %addr, error = %err, "bind failed");
                            callback(result_codes::from_io(&err));
                        }
                    }
                });
            }
        }
    }

    fn get_info(&self, socket_id: SocketId, callback: Callback<SocketInfo>) {
        let local = self
            .socket(socket_id)
            .and_then(|socket| socket.local_addr().ok());
        let info = match local {
            Some(addr) => SocketInfo {
                local_address: Some(addr.ip().to_string()),
                local_port: Some(addr.port()),
                socket_type: if addr.is_ipv4() { "udp4" } else { "udp6" }.to_string(),
            },
            None => SocketInfo {
                local_address: None,
                local_port: None,
                socket_type: "udp".to_string(),
            },
        };
        callback(info);
    }

    fn recv_from(&self, socket_id: SocketId, callback: Callback<RecvFromInfo>) {
        let Some(socket) = self.socket(socket_id) else {
            callback(RecvFromInfo {
                result_code: result_codes::SOCKET_NOT_CONNECTED,
                data: ArrayBuffer::default(),
                address: String::new(),
                port: 0,
            });
            return;
        };

        let size = self.recv_buffer_size;
        self.spawn_tracked(socket_id, async move {
            let mut buffer = vec![0u8; size];
            let info = match socket.recv_from(&mut buffer).await {
                Ok((n, source)) => {
                    buffer.truncate(n);
                    tracing::trace!(target: targets::SERVICE, %socket_id, bytes = n, %source, "datagram received");
                    RecvFromInfo {
                        result_code: result_len(n),
                        data: ArrayBuffer::from(buffer),
                        address: source.ip().to_string(),
                        port: source.port(),
                    }
                }
                Err(err) => RecvFromInfo {
                    result_code: result_codes::from_io(&err),
                    data: ArrayBuffer::default(),
                    address: String::new(),
                    port: 0,
                },
            };
            callback(info);
        });
    }

    fn send_to(
        &self,
        socket_id: SocketId,
        data: ArrayBuffer,
        address: &str,
        port: u16,
        callback: Callback<SendInfo>,
    ) {
        let Some(ip) = parse_ip(address) else {
            callback(SendInfo {
                result_code: result_codes::ADDRESS_INVALID,
            });
            return;
        };
        let Some(socket) = self.socket(socket_id) else {
            callback(SendInfo {
                result_code: result_codes::SOCKET_NOT_CONNECTED,
            });
            return;
        };

        let target = SocketAddr::new(ip, port);
        self.spawn_tracked(socket_id, async move {
            let result_code = match socket.send_to(data.as_bytes(), target).await {
                Ok(n) => result_len(n),
                Err(err) => result_codes::from_io(&err),
            };
            callback(SendInfo { result_code });
        });
    }

    fn destroy(&self, socket_id: SocketId) {
        if let Some(entry) = self.sockets.lock().remove(&socket_id) {
            for task in entry.tasks {
                task.abort();
            }
            tracing::debug!(target: targets::SERVICE, %socket_id, "socket destroyed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn channel<T: Send + 'static>() -> (Callback<T>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Box::new(move |value| {
                let _ = tx.send(value);
            }),
            rx,
        )
    }

    async fn recv<T>(rx: oneshot::Receiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("callback timed out")
            .expect("callback dropped")
    }

    async fn create(service: &TokioSocketService) -> SocketId {
        let (callback, rx) = channel();
        service.create(Protocol::Udp, callback);
        SocketId::from_raw(recv(rx).await.socket_id).expect("create failed")
    }

    #[tokio::test]
    async fn test_create_reserves_ids() {
        let service = TokioSocketService::current();

        let first = create(&service).await;
        let second = create(&service).await;

        assert_eq!(second.0, first.0 + 1);
        assert_eq!(service.socket_count(), 2);

        service.destroy(first);
        assert_eq!(service.socket_count(), 1);
    }

    #[tokio::test]
    async fn test_tcp_is_rejected() {
        let service = TokioSocketService::current();
        let (callback, rx) = channel();
        service.create(Protocol::Tcp, callback);
        assert!(recv(rx).await.socket_id < 0);
        assert_eq!(service.socket_count(), 0);
    }

    #[tokio::test]
    async fn test_bind_invalid_address() {
        let service = TokioSocketService::current();
        let id = create(&service).await;
        let (callback, rx) = channel();
        service.bind(id, "localhost", 0, callback);
        assert_eq!(recv(rx).await, result_codes::ADDRESS_INVALID);
    }

    #[tokio::test]
    async fn test_bind_unknown_socket() {
        let service = TokioSocketService::current();
        let (callback, rx) = channel();
        service.bind(SocketId(42), "127.0.0.1", 0, callback);
        assert_eq!(recv(rx).await, result_codes::INVALID_HANDLE);
    }

    #[tokio::test]
    async fn test_bind_then_get_info() {
        let service = TokioSocketService::current();
        let id = create(&service).await;

        let (callback, rx) = channel();
        service.bind(id, "127.0.0.1", 0, callback);
        assert_eq!(recv(rx).await, result_codes::OK);

        let (callback, rx) = channel();
        service.bind(id, "127.0.0.1", 0, callback);
        assert_eq!(recv(rx).await, result_codes::FAILED);

        let (callback, rx) = channel();
        service.get_info(id, callback);
        let info = recv(rx).await;
        assert_eq!(info.local_address.as_deref(), Some("127.0.0.1"));
        assert!(info.local_port.unwrap() > 0);
        assert_eq!(info.socket_type, "udp4");
    }

    #[tokio::test]
    async fn test_recv_on_unbound_socket_fails() {
        let service = TokioSocketService::current();
        let (callback, rx) = channel();
        service.recv_from(SocketId(9), callback);
        assert_eq!(
            recv(rx).await.result_code,
            result_codes::SOCKET_NOT_CONNECTED
        );
    }

    #[tokio::test]
    async fn test_send_and_receive_between_sockets() {
        let service = TokioSocketService::current();
        let a = create(&service).await;
        let b = create(&service).await;
        for id in [a, b] {
            let (callback, rx) = channel();
            service.bind(id, "127.0.0.1", 0, callback);
            assert_eq!(recv(rx).await, result_codes::OK);
        }

        let (callback, rx) = channel();
        service.get_info(b, callback);
        let port_b = recv(rx).await.local_port.unwrap();

        let (recv_callback, recv_rx) = channel();
        service.recv_from(b, recv_callback);

        let (callback, rx) = channel();
        service.send_to(a, ArrayBuffer::from(b"ping".to_vec()), "127.0.0.1", port_b, callback);
        assert_eq!(recv(rx).await.result_code, 4);

        let info = recv(recv_rx).await;
        assert_eq!(info.result_code, 4);
        assert_eq!(info.data.as_bytes(), b"ping");
        assert_eq!(info.address, "127.0.0.1");
    }
}
