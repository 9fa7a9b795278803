use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng as _;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::error::LsdError;
use super::message::LsdAnnounce;
use crate::constants::{LSD_MULTICAST_V4, LSD_MULTICAST_V6, LSD_PORT};
use crate::discovery::{is_transient_recv_error, PeerSink, PeerSource};
use crate::torrent::{TorrentContext, TorrentSession};

const LSD_COOKIE_SIZE: usize = 8;
const LSD_MAX_PACKET: usize = 1400;

/// Announces public torrents to the local multicast group and publishes
/// the peers other clients announce.
pub struct LsdService {
    socket: UdpSocket,
    group: SocketAddr,
    port: u16,
    cookie: String,
    torrents: Arc<TorrentContext>,
    sink: PeerSink,
}

impl LsdService {
    /// Joins the IPv4 group, falling back to IPv6 when the host has no
    /// usable IPv4 interface.
    pub async fn bind(
        port: u16,
        torrents: Arc<TorrentContext>,
        sink: PeerSink,
    ) -> Result<Self, LsdError> {
        let (socket, group) = match Self::join_v4().await {
            Ok(joined) => joined,
            Err(v4) => {
                debug!("LSD IPv4 group unavailable: {}", v4);
                Self::join_v6()
                    .await
                    .map_err(|v6| LsdError::Unavailable(format!("ipv4: {v4}, ipv6: {v6}")))?
            }
        };

        info!("LSD joined {}", group);
        Ok(Self::with_socket(socket, group, port, torrents, sink))
    }

    /// Uses an already bound socket and sends announces to `group`.
    pub fn with_socket(
        socket: UdpSocket,
        group: SocketAddr,
        port: u16,
        torrents: Arc<TorrentContext>,
        sink: PeerSink,
    ) -> Self {
        let mut cookie = [0u8; LSD_COOKIE_SIZE];
        rand::rng().fill(&mut cookie);

        Self {
            socket,
            group,
            port,
            cookie: hex::encode(cookie),
            torrents,
            sink,
        }
    }

    async fn join_v4() -> std::io::Result<(UdpSocket, SocketAddr)> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, LSD_PORT)).await?;
        socket.set_multicast_loop_v4(false)?;
        socket.join_multicast_v4(LSD_MULTICAST_V4, Ipv4Addr::UNSPECIFIED)?;
        Ok((socket, SocketAddr::V4(SocketAddrV4::new(LSD_MULTICAST_V4, LSD_PORT))))
    }

    async fn join_v6() -> std::io::Result<(UdpSocket, SocketAddr)> {
        let socket =
            UdpSocket::bind(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, LSD_PORT, 0, 0)).await?;
        socket.set_multicast_loop_v6(false)?;
        socket.join_multicast_v6(&LSD_MULTICAST_V6, 0)?;
        Ok((socket, SocketAddr::V6(SocketAddrV6::new(LSD_MULTICAST_V6, LSD_PORT, 0, 0))))
    }

    pub fn group(&self) -> SocketAddr {
        self.group
    }

    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LsdError> {
        Ok(self.socket.local_addr()?)
    }

    /// Announces every public torrent in `torrents`. Returns how many were
    /// sent.
    pub async fn multicast(&self, torrents: &[Arc<TorrentSession>]) -> usize {
        let mut sent = 0;
        for torrent in torrents {
            let info_hash = torrent.info_hash();
            if torrent.is_private() {
                debug!(%info_hash, "private torrent, skipping LSD announce");
                continue;
            }

            match self.announce(torrent).await {
                Ok(()) => {
                    trace!(%info_hash, "LSD announce sent");
                    sent += 1;
                }
                Err(e) => warn!(%info_hash, "LSD announce failed: {}", e),
            }
        }
        sent
    }

    async fn announce(&self, torrent: &TorrentSession) -> Result<(), LsdError> {
        let message = LsdAnnounce {
            host: Some(self.group),
            port: self.port,
            info_hashes: vec![*torrent.info_hash()],
            cookie: Some(self.cookie.clone()),
        };
        self.socket.send_to(message.encode().as_bytes(), self.group).await?;
        Ok(())
    }

    /// Publishes the announcing peer for every torrent we manage. Our own
    /// echoes and unknown torrents are dropped. Returns how many peers were
    /// published.
    pub fn handle_datagram(&self, data: &[u8], from: SocketAddr) -> usize {
        let announce = match LsdAnnounce::parse(data) {
            Ok(announce) => announce,
            Err(e) => {
                debug!("ignoring LSD datagram from {}: {}", from, e);
                return 0;
            }
        };

        if announce.cookie.as_deref() == Some(self.cookie.as_str()) {
            trace!("ignoring own LSD announce");
            return 0;
        }

        let peer = SocketAddr::new(from.ip(), announce.port);
        let mut published = 0;
        for info_hash in announce.info_hashes {
            match self.torrents.get(&info_hash) {
                Some(torrent) if !torrent.is_private() => {
                    self.sink.publish(info_hash, peer, PeerSource::Lsd);
                    published += 1;
                }
                Some(_) => debug!(%info_hash, "ignoring LSD peer for private torrent"),
                None => trace!(%info_hash, "LSD announce for unknown torrent"),
            }
        }
        published
    }

    /// Announces every `interval` and listens in between, until aborted.
    pub fn start(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            let mut buf = vec![0u8; LSD_MAX_PACKET];
            loop {
                tokio::select! {
                    result = self.socket.recv_from(&mut buf) => {
                        match result {
                            Ok((n, from)) => {
                                self.handle_datagram(&buf[..n], from);
                            }
                            Err(e) if is_transient_recv_error(&e) => {
                                debug!("LSD receive error, continuing: {}", e);
                            }
                            Err(e) => {
                                warn!("LSD receive failed: {}", e);
                                break;
                            }
                        }
                    }
                    _ = ticker.tick() => {
                        let torrents = self.torrents.all();
                        let sent = self.multicast(&torrents).await;
                        debug!("LSD announced {} of {} torrents", sent, torrents.len());
                    }
                }
            }
        })
    }
}
