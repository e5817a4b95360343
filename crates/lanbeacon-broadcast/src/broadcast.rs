//! The LAN broadcaster: one socket, one timer loop.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::advertisement::Advertisement;
use crate::resolver::{self, ResolveError};

/// The multicast group and port watched by vanilla Minecraft clients.
pub const DISCOVERY_TARGET: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(224, 0, 2, 60), 4445);

/// Interval used when none has been configured, or when it was set to zero.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Errors that can occur while creating a broadcaster.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// The advertised port must be nonzero.
    #[error("invalid port provided")]
    InvalidPort,

    /// No usable local address could be determined.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Failed to open or bind the announcement socket.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Lifecycle of a broadcaster.
///
/// An instance is single-use: `Created` to `Running` to `Stopped`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Constructed, loop not yet started.
    Created = 0,
    /// The announcement loop is ticking.
    Running = 1,
    /// Cancelled; the loop has exited.
    Stopped = 2,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Mutable announcement settings, guarded by the broadcaster's lock.
#[derive(Debug, Clone)]
struct BroadcastSettings {
    motd: String,
    port: u16,
    interval: Duration,
}

/// A LAN broadcaster.
///
/// Owns a multicast-capable UDP socket and periodically announces a display
/// name and port to [`DISCOVERY_TARGET`] until [`close`](Self::close) is
/// called. Intended to be shared behind an `Arc`: the caller runs
/// [`broadcast`](Self::broadcast) on a dedicated task and keeps a handle for
/// the control operations.
pub struct LanBroadcaster {
    socket: UdpSocket,
    target: SocketAddrV4,
    settings: Mutex<BroadcastSettings>,
    state: AtomicU8,
    cancel: CancellationToken,
}

impl LanBroadcaster {
    /// Create a broadcaster advertising `port` under the display name `motd`.
    ///
    /// The advertised port must be nonzero. When `bind` is absent,
    /// unspecified, or loopback, a local address is auto-detected via
    /// [`resolver::resolve`]. The socket binds to an ephemeral local port;
    /// only the advertised `port` matters to listeners.
    pub fn new(
        bind: Option<Ipv4Addr>,
        port: u16,
        motd: impl Into<String>,
    ) -> Result<Self, BroadcastError> {
        if port == 0 {
            return Err(BroadcastError::InvalidPort);
        }

        let bind = match bind {
            Some(addr) if !addr.is_unspecified() && !addr.is_loopback() => addr,
            _ => resolver::resolve(None)?,
        };

        Self::with_target(bind, port, motd, DISCOVERY_TARGET)
    }

    // The discovery group is fixed for the process lifetime; target injection
    // exists so tests can point the loop at a local receiver.
    pub(crate) fn with_target(
        bind: Ipv4Addr,
        port: u16,
        motd: impl Into<String>,
        target: SocketAddrV4,
    ) -> Result<Self, BroadcastError> {
        let socket = create_socket(bind)?;

        Ok(Self {
            socket,
            target,
            settings: Mutex::new(BroadcastSettings {
                motd: motd.into(),
                port,
                interval: DEFAULT_INTERVAL,
            }),
            state: AtomicU8::new(LifecycleState::Created as u8),
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the advertised display name. Visible to the next tick's send.
    pub fn set_motd(&self, motd: impl Into<String>) {
        self.settings.lock().motd = motd.into();
    }

    /// Set the interval between announcements in seconds.
    ///
    /// Zero restores the default of five seconds. The loop reads the interval
    /// once per tick, so a change takes effect on the next scheduling
    /// decision, not retroactively.
    pub fn set_interval(&self, secs: u64) {
        let interval = if secs == 0 {
            DEFAULT_INTERVAL
        } else {
            Duration::from_secs(secs)
        };
        self.settings.lock().interval = interval;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// The local address the announcement socket is bound to.
    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }

    /// Drive the announcement loop until [`close`](Self::close) is called.
    ///
    /// Blocks the calling task; run it on a dedicated one. One announcement
    /// is sent per elapsed interval. Transport errors and short writes are
    /// logged and do not stop the loop. Returns once cancellation is
    /// observed, after which the instance is `Stopped` for good.
    ///
    /// # Panics
    ///
    /// Panics when called on an instance that is already running or has
    /// stopped. A broadcaster is single-use; this is misuse detection, not a
    /// recoverable condition.
    pub async fn broadcast(&self) {
        if self
            .state
            .compare_exchange(
                LifecycleState::Created as u8,
                LifecycleState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            panic!("tried to start multiple broadcasts on one LanBroadcaster");
        }

        loop {
            let interval = self.settings.lock().interval;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.send_announcement().await {
                        warn!(error = %e, "error sending LAN announcement");
                    }
                }
                _ = self.cancel.cancelled() => {
                    break;
                }
            }
        }

        self.state
            .store(LifecycleState::Stopped as u8, Ordering::SeqCst);
        debug!("broadcast loop stopped");
    }

    /// Request cancellation of the announcement loop.
    ///
    /// Non-blocking and idempotent: any number of calls, at any point in the
    /// lifecycle, signals cancellation at most once and never errors. Callers
    /// that need to synchronize with loop termination await the task running
    /// [`broadcast`](Self::broadcast).
    pub fn close(&self) {
        self.cancel.cancel();
    }

    async fn send_announcement(&self) -> io::Result<()> {
        let payload = {
            let settings = self.settings.lock();
            Advertisement::new(settings.motd.clone(), settings.port).to_bytes()
        };

        let sent = self.socket.send_to(&payload, self.target).await?;
        if sent != payload.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "short write on announcement",
            ));
        }

        trace!(bytes = sent, target = %self.target, "sent LAN announcement");
        Ok(())
    }
}

impl Drop for LanBroadcaster {
    fn drop(&mut self) {
        self.close();
    }
}

fn create_socket(bind: Ipv4Addr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.bind(&SockAddr::from(SocketAddrV4::new(bind, 0)))?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, SocketAddr};
    use std::sync::Arc;

    const LOOPBACK: Ipv4Addr = Ipv4Addr::LOCALHOST;

    async fn test_pair(motd: &str, port: u16) -> (Arc<LanBroadcaster>, UdpSocket) {
        let receiver = UdpSocket::bind((LOOPBACK, 0)).await.unwrap();
        let target = match receiver.local_addr().unwrap() {
            SocketAddr::V4(v4) => v4,
            other => panic!("unexpected receiver address: {other}"),
        };
        let broadcaster = LanBroadcaster::with_target(LOOPBACK, port, motd, target).unwrap();
        (Arc::new(broadcaster), receiver)
    }

    async fn recv_payload(receiver: &UdpSocket) -> String {
        let mut buf = [0u8; 512];
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[test]
    fn test_zero_port_is_rejected() {
        // Validation comes before address resolution and socket setup, so
        // this fails the same way on any host and leaves nothing open.
        assert!(matches!(
            LanBroadcaster::new(None, 0, "x"),
            Err(BroadcastError::InvalidPort)
        ));
        assert!(matches!(
            LanBroadcaster::new(Some(Ipv4Addr::new(192, 0, 2, 1)), 0, "x"),
            Err(BroadcastError::InvalidPort)
        ));
    }

    #[tokio::test]
    async fn test_construction_binds_ephemeral_local_port() {
        let (broadcaster, _receiver) = test_pair("A Server", 25565).await;
        assert_eq!(broadcaster.state(), LifecycleState::Created);

        let addr = broadcaster.local_addr().unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(LOOPBACK));
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_announces_on_each_tick_until_closed() {
        let (broadcaster, receiver) = test_pair("A Server", 25565).await;
        broadcaster.set_interval(2);

        let worker = Arc::clone(&broadcaster);
        let loop_task = tokio::spawn(async move { worker.broadcast().await });

        for _ in 0..3 {
            let payload = recv_payload(&receiver).await;
            assert_eq!(payload, "[MOTD]A Server[/MOTD][AD]25565[/AD]");
        }
        assert_eq!(broadcaster.state(), LifecycleState::Running);

        broadcaster.close();
        loop_task.await.unwrap();
        assert_eq!(broadcaster.state(), LifecycleState::Stopped);

        // Anything still queued was sent before the close; drain it, then
        // make sure ticks that would have elapsed afterwards produce nothing.
        let mut buf = [0u8; 512];
        while receiver.try_recv_from(&mut buf).is_ok() {}
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(receiver.try_recv_from(&mut buf).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_motd_change_applies_to_a_later_tick() {
        let (broadcaster, receiver) = test_pair("A Server", 25565).await;
        broadcaster.set_interval(1);

        let worker = Arc::clone(&broadcaster);
        let loop_task = tokio::spawn(async move { worker.broadcast().await });

        assert_eq!(
            recv_payload(&receiver).await,
            "[MOTD]A Server[/MOTD][AD]25565[/AD]"
        );

        broadcaster.set_motd("Renamed");
        // A tick armed before the rename may still carry the old name.
        let mut payload = recv_payload(&receiver).await;
        if payload.contains("A Server") {
            payload = recv_payload(&receiver).await;
        }
        assert_eq!(payload, "[MOTD]Renamed[/MOTD][AD]25565[/AD]");

        broadcaster.close();
        loop_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_applies_to_next_scheduling_decision() {
        let (broadcaster, receiver) = test_pair("A Server", 25565).await;
        broadcaster.set_interval(1);

        let worker = Arc::clone(&broadcaster);
        let loop_task = tokio::spawn(async move { worker.broadcast().await });

        recv_payload(&receiver).await;
        broadcaster.set_interval(3600);

        // At most one already-armed one-second tick can still fire; after
        // that the hour-long interval governs and a minute stays quiet.
        let grace = tokio::time::timeout(Duration::from_secs(5), recv_payload(&receiver)).await;
        if grace.is_ok() {
            let quiet =
                tokio::time::timeout(Duration::from_secs(60), recv_payload(&receiver)).await;
            assert!(quiet.is_err());
        }

        broadcaster.close();
        loop_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent_in_any_interleaving() {
        let (broadcaster, _receiver) = test_pair("A Server", 25565).await;

        broadcaster.close();
        broadcaster.close();

        // An already-cancelled loop exits at its first wait without sending.
        let worker = Arc::clone(&broadcaster);
        let loop_task = tokio::spawn(async move { worker.broadcast().await });
        loop_task.await.unwrap();
        assert_eq!(broadcaster.state(), LifecycleState::Stopped);

        broadcaster.close();
        broadcaster.close();
        assert_eq!(broadcaster.state(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_panics_and_leaves_first_loop_running() {
        let (broadcaster, receiver) = test_pair("A Server", 25565).await;
        broadcaster.set_interval(1);

        let first = Arc::clone(&broadcaster);
        let first_task = tokio::spawn(async move { first.broadcast().await });
        // Let the first loop claim the running state.
        tokio::task::yield_now().await;
        assert_eq!(broadcaster.state(), LifecycleState::Running);

        let second = Arc::clone(&broadcaster);
        let second_task = tokio::spawn(async move { second.broadcast().await });
        let err = second_task.await.unwrap_err();
        assert!(err.is_panic());

        // The first loop is unaffected and keeps ticking.
        let payload = recv_payload(&receiver).await;
        assert!(payload.ends_with("[AD]25565[/AD]"));

        broadcaster.close();
        first_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop_panics() {
        let (broadcaster, _receiver) = test_pair("A Server", 25565).await;

        broadcaster.close();
        let worker = Arc::clone(&broadcaster);
        tokio::spawn(async move { worker.broadcast().await })
            .await
            .unwrap();
        assert_eq!(broadcaster.state(), LifecycleState::Stopped);

        let again = Arc::clone(&broadcaster);
        let err = tokio::spawn(async move { again.broadcast().await })
            .await
            .unwrap_err();
        assert!(err.is_panic());
    }
}
