//! Scriptable in-memory socket service.

use std::collections::VecDeque;

use dgram_bridge_core::logging::targets;
use parking_lot::Mutex;

use super::{
    Callback, CreateInfo, Protocol, RecvFromInfo, SendInfo, SocketId, SocketInfo, SocketService,
};
use crate::buffer::ArrayBuffer;

/// A call recorded by [`MockSocketService`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCall {
    Create(Protocol),
    Bind {
        socket_id: SocketId,
        address: String,
        port: u16,
    },
    GetInfo(SocketId),
    RecvFrom(SocketId),
    SendTo {
        socket_id: SocketId,
        data: ArrayBuffer,
        address: String,
        port: u16,
    },
    Destroy(SocketId),
}

/// The primitive a [`MockCall`] invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockCallKind {
    Create,
    Bind,
    GetInfo,
    RecvFrom,
    SendTo,
    Destroy,
}

impl MockCall {
    /// Which primitive was called.
    pub fn kind(&self) -> MockCallKind {
        match self {
            MockCall::Create(_) => MockCallKind::Create,
            MockCall::Bind { .. } => MockCallKind::Bind,
            MockCall::GetInfo(_) => MockCallKind::GetInfo,
            MockCall::RecvFrom(_) => MockCallKind::RecvFrom,
            MockCall::SendTo { .. } => MockCallKind::SendTo,
            MockCall::Destroy(_) => MockCallKind::Destroy,
        }
    }
}

/// Results handed out immediately instead of waiting for the test.
#[derive(Clone, Debug)]
struct AutoComplete {
    socket_id: i32,
    info: SocketInfo,
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    create: VecDeque<Callback<CreateInfo>>,
    bind: VecDeque<Callback<i32>>,
    get_info: VecDeque<Callback<SocketInfo>>,
    recv: VecDeque<Callback<RecvFromInfo>>,
    send: VecDeque<Callback<SendInfo>>,
    /// Datagrams handed to the next receives as soon as they are issued.
    inbox: VecDeque<RecvFromInfo>,
    auto: Option<AutoComplete>,
}

/// A [`SocketService`] whose callbacks are completed by the test.
///
/// Every call is recorded. Callbacks are parked in per-primitive FIFO queues
/// until one of the `complete_*` methods hands them a result. Callbacks are
/// always invoked with no lock held, so they may call back into the service.
///
/// ```
/// use std::sync::Arc;
/// use dgram_bridge::service::{MockCallKind, MockSocketService, SocketInfo};
/// use dgram_bridge::udp::{UdpSocket, UdpSocketConfig};
///
/// let service = Arc::new(MockSocketService::new());
/// let socket = UdpSocket::new(service.clone(), UdpSocketConfig::new());
/// socket.bind(None, None).unwrap();
///
/// service.complete_create(7);
/// service.complete_bind(0);
/// service.complete_get_info(SocketInfo {
///     local_address: Some("0.0.0.0".into()),
///     local_port: Some(54321),
///     socket_type: "udp4".into(),
/// });
///
/// assert_eq!(socket.address().unwrap().port, 54321);
/// assert_eq!(service.call_count(MockCallKind::RecvFrom), 1);
/// ```
#[derive(Default)]
pub struct MockSocketService {
    state: Mutex<MockState>,
}

impl MockSocketService {
    /// Create a service that parks every callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a service that completes create, bind, get_info and send_to
    /// immediately and successfully. Receives are still parked.
    pub fn auto(socket_id: i32, info: SocketInfo) -> Self {
        let service = Self::new();
        service.state.lock().auto = Some(AutoComplete { socket_id, info });
        service
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls of one kind received so far.
    pub fn call_count(&self, kind: MockCallKind) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.kind() == kind)
            .count()
    }

    /// Number of parked callbacks of one kind.
    pub fn pending(&self, kind: MockCallKind) -> usize {
        let state = self.state.lock();
        match kind {
            MockCallKind::Create => state.create.len(),
            MockCallKind::Bind => state.bind.len(),
            MockCallKind::GetInfo => state.get_info.len(),
            MockCallKind::RecvFrom => state.recv.len(),
            MockCallKind::SendTo => state.send.len(),
            MockCallKind::Destroy => 0,
        }
    }

    /// Complete the oldest create call. Returns `false` if none was pending.
    pub fn complete_create(&self, socket_id: i32) -> bool {
        let callback = self.state.lock().create.pop_front();
        match callback {
            Some(callback) => {
                callback(CreateInfo { socket_id });
                true
            }
            None => false,
        }
    }

    /// Complete the oldest bind call with a result code.
    pub fn complete_bind(&self, result_code: i32) -> bool {
        let callback = self.state.lock().bind.pop_front();
        match callback {
            Some(callback) => {
                callback(result_code);
                true
            }
            None => false,
        }
    }

    /// Complete the oldest get_info call.
    pub fn complete_get_info(&self, info: SocketInfo) -> bool {
        let callback = self.state.lock().get_info.pop_front();
        match callback {
            Some(callback) => {
                callback(info);
                true
            }
            None => false,
        }
    }

    /// Complete the oldest receive with a datagram from `address:port`.
    pub fn deliver(&self, data: impl Into<Vec<u8>>, address: &str, port: u16) -> bool {
        let data = ArrayBuffer::from(data.into());
        let result_code = i32::try_from(data.byte_length()).unwrap_or(i32::MAX);
        self.complete_recv(RecvFromInfo {
            result_code,
            data,
            address: address.to_string(),
            port,
        })
    }

    /// Queue a datagram for the next receive call.
    ///
    /// Unlike [`deliver`](Self::deliver), the receive completes inside
    /// `recv_from` itself, before the call returns.
    pub fn queue_datagram(&self, data: impl Into<Vec<u8>>, address: &str, port: u16) {
        let data = ArrayBuffer::from(data.into());
        let result_code = i32::try_from(data.byte_length()).unwrap_or(i32::MAX);
        self.state.lock().inbox.push_back(RecvFromInfo {
            result_code,
            data,
            address: address.to_string(),
            port,
        });
    }

    /// Fail the oldest receive with a negative result code.
    pub fn fail_recv(&self, result_code: i32) -> bool {
        self.complete_recv(RecvFromInfo {
            result_code,
            data: ArrayBuffer::default(),
            address: String::new(),
            port: 0,
        })
    }

    fn complete_recv(&self, info: RecvFromInfo) -> bool {
        let callback = self.state.lock().recv.pop_front();
        match callback {
            Some(callback) => {
                callback(info);
                true
            }
            None => false,
        }
    }

    /// Complete the oldest send with a result code.
    pub fn complete_send(&self, result_code: i32) -> bool {
        let callback = self.state.lock().send.pop_front();
        match callback {
            Some(callback) => {
                callback(SendInfo { result_code });
                true
            }
            None => false,
        }
    }

    fn auto_complete(&self) -> Option<AutoComplete> {
        self.state.lock().auto.clone()
    }
}

impl SocketService for MockSocketService {
    fn create(&self, protocol: Protocol, callback: Callback<CreateInfo>) {
        tracing::trace!(target: targets::SERVICE, ?protocol, "mock create");
        self.state.lock().calls.push(MockCall::Create(protocol));
        match self.auto_complete() {
            Some(auto) => callback(CreateInfo {
                socket_id: auto.socket_id,
            }),
            None => self.state.lock().create.push_back(callback),
        }
    }

    fn bind(&self, socket_id: SocketId, address: &str, port: u16, callback: Callback<i32>) {
        tracing::trace!(target: targets::SERVICE, %socket_id, address, port, "mock bind");
        self.state.lock().calls.push(MockCall::Bind {
            socket_id,
            address: address.to_string(),
            port,
        });
        match self.auto_complete() {
            Some(_) => callback(super::result_codes::OK),
            None => self.state.lock().bind.push_back(callback),
        }
    }

    fn get_info(&self, socket_id: SocketId, callback: Callback<SocketInfo>) {
        self.state.lock().calls.push(MockCall::GetInfo(socket_id));
        match self.auto_complete() {
            Some(auto) => callback(auto.info),
            None => self.state.lock().get_info.push_back(callback),
        }
    }

    fn recv_from(&self, socket_id: SocketId, callback: Callback<RecvFromInfo>) {
        let queued = {
            let mut state = self.state.lock();
            state.calls.push(MockCall::RecvFrom(socket_id));
            state.inbox.pop_front()
        };
        match queued {
            Some(info) => callback(info),
            None => self.state.lock().recv.push_back(callback),
        }
    }

    fn send_to(
        &self,
        socket_id: SocketId,
        data: ArrayBuffer,
        address: &str,
        port: u16,
        callback: Callback<SendInfo>,
    ) {
        let written = i32::try_from(data.byte_length()).unwrap_or(i32::MAX);
        self.state.lock().calls.push(MockCall::SendTo {
            socket_id,
            data,
            address: address.to_string(),
            port,
        });
        match self.auto_complete() {
            Some(_) => callback(SendInfo {
                result_code: written,
            }),
            None => self.state.lock().send.push_back(callback),
        }
    }

    fn destroy(&self, socket_id: SocketId) {
        tracing::trace!(target: targets::SERVICE, %socket_id, "mock destroy");
        self.state.lock().calls.push(MockCall::Destroy(socket_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_parks_until_completed() {
        let service = MockSocketService::new();
        let seen = Arc::new(Mutex::new(None));

        let seen_clone = seen.clone();
        service.create(
            Protocol::Udp,
            Box::new(move |info| *seen_clone.lock() = Some(info.socket_id)),
        );
        assert_eq!(service.pending(MockCallKind::Create), 1);
        assert!(seen.lock().is_none());

        assert!(service.complete_create(3));
        assert_eq!(*seen.lock(), Some(3));
        assert!(!service.complete_create(4));
    }

    #[test]
    fn test_callback_may_reenter_service() {
        let service = Arc::new(MockSocketService::new());

        let service_clone = service.clone();
        service.recv_from(
            SocketId(1),
            Box::new(move |_| {
                service_clone.recv_from(SocketId(1), Box::new(|_| {}));
            }),
        );

        assert!(service.deliver(vec![1u8, 2], "10.0.0.1", 9));
        assert_eq!(service.pending(MockCallKind::RecvFrom), 1);
        assert_eq!(service.call_count(MockCallKind::RecvFrom), 2);
    }

    #[test]
    fn test_queued_datagram_completes_inside_recv_from() {
        let service = MockSocketService::new();
        service.queue_datagram(b"early".to_vec(), "10.0.0.9", 99);
        let seen = Arc::new(Mutex::new(None));

        let seen_clone = seen.clone();
        service.recv_from(
            SocketId(1),
            Box::new(move |info| *seen_clone.lock() = Some(info)),
        );

        let info = seen.lock().take().unwrap();
        assert_eq!(info.result_code, 5);
        assert_eq!(info.data.as_bytes(), b"early");
        assert_eq!(info.port, 99);
        assert_eq!(service.pending(MockCallKind::RecvFrom), 0);

        // The inbox is empty again, so the next receive parks.
        service.recv_from(SocketId(1), Box::new(|_| {}));
        assert_eq!(service.pending(MockCallKind::RecvFrom), 1);
    }

    #[test]
    fn test_auto_completes_setup_calls() {
        let service = MockSocketService::auto(
            5,
            SocketInfo {
                local_address: Some("0.0.0.0".into()),
                local_port: Some(4000),
                socket_type: "udp4".into(),
            },
        );
        let written = Arc::new(Mutex::new(None));

        let written_clone = written.clone();
        service.send_to(
            SocketId(5),
            ArrayBuffer::from(vec![0u8; 12]),
            "127.0.0.1",
            9,
            Box::new(move |info| *written_clone.lock() = Some(info.result_code)),
        );

        assert_eq!(*written.lock(), Some(12));
        assert_eq!(service.pending(MockCallKind::SendTo), 0);
        assert_eq!(service.calls()[0].kind(), MockCallKind::SendTo);
    }
}
