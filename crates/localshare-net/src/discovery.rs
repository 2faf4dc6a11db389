//! mDNS announce/browse and the per-peer discovery state machine.
//!
//! Each peer instance (keyed by its mDNS fullname) moves through
//! `Unknown -> Announced -> Resolving -> Resolved -> Handshaking -> Known`.
//! [`PeerTable`] holds that state and decides when a handshake is due; the
//! driver spawned by [`spawn_discovery`] feeds it mDNS events and runs the
//! handshakes it asks for.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use localshare_shared::constants::SERVICE_TYPE;

use crate::error::NetError;
use crate::handshake::Handshaker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPhase {
    Unknown,
    /// Announcement seen, nothing requested yet.
    Announced,
    /// Waiting for address and port.
    Resolving,
    Resolved(SocketAddr),
    Handshaking(SocketAddr),
    /// Device row written; `SocketAddr` is the address that handshake used.
    Known { device_id: i64, addr: SocketAddr },
}

/// Discovery state of every peer instance seen on the network.
#[derive(Debug)]
pub struct PeerTable {
    own_fullname: String,
    peers: HashMap<String, PeerPhase>,
}

impl PeerTable {
    pub fn new(own_fullname: impl Into<String>) -> Self {
        Self {
            own_fullname: own_fullname.into(),
            peers: HashMap::new(),
        }
    }

    pub fn phase(&self, fullname: &str) -> PeerPhase {
        self.peers
            .get(fullname)
            .copied()
            .unwrap_or(PeerPhase::Unknown)
    }

    pub fn is_self(&self, fullname: &str) -> bool {
        fullname == self.own_fullname
    }

    /// An announcement arrived. Returns `true` for an instance not seen yet.
    pub fn on_announced(&mut self, fullname: &str) -> bool {
        if self.is_self(fullname) || self.phase(fullname) != PeerPhase::Unknown {
            return false;
        }
        self.peers.insert(fullname.to_string(), PeerPhase::Announced);
        true
    }

    /// Resolution was requested for an announced instance.
    pub fn begin_resolve(&mut self, fullname: &str) {
        if self.phase(fullname) == PeerPhase::Announced {
            self.peers.insert(fullname.to_string(), PeerPhase::Resolving);
        }
    }

    /// Address and port are known. Returns `true` if a handshake is due:
    /// none is running and `addr` differs from the last known address.
    pub fn on_resolved(&mut self, fullname: &str, addr: SocketAddr) -> bool {
        if self.is_self(fullname) {
            return false;
        }
        match self.phase(fullname) {
            PeerPhase::Handshaking(_) => false,
            PeerPhase::Known { addr: known, .. } if known == addr => false,
            _ => {
                self.peers.insert(fullname.to_string(), PeerPhase::Resolved(addr));
                true
            }
        }
    }

    /// Claim the handshake for a resolved instance, returning its address.
    pub fn begin_handshake(&mut self, fullname: &str) -> Option<SocketAddr> {
        match self.phase(fullname) {
            PeerPhase::Resolved(addr) => {
                self.peers
                    .insert(fullname.to_string(), PeerPhase::Handshaking(addr));
                Some(addr)
            }
            _ => None,
        }
    }

    pub fn on_handshake_ok(&mut self, fullname: &str, device_id: i64, addr: SocketAddr) {
        self.peers
            .insert(fullname.to_string(), PeerPhase::Known { device_id, addr });
    }

    /// Settle a successful exchange. Without a device id the peer cannot be
    /// tracked, so it is treated like a failure and may be retried.
    pub fn on_handshake_done(&mut self, fullname: &str, device_id: Option<i64>, addr: SocketAddr) {
        match device_id {
            Some(id) => self.on_handshake_ok(fullname, id, addr),
            None => self.on_handshake_failed(fullname),
        }
    }

    /// A failed handshake leaves the peer undiscovered until it is announced
    /// or resolved again.
    pub fn on_handshake_failed(&mut self, fullname: &str) {
        self.peers.remove(fullname);
    }

    pub fn on_removed(&mut self, fullname: &str) {
        self.peers.remove(fullname);
    }

    pub fn known_count(&self) -> usize {
        self.peers
            .values()
            .filter(|p| matches!(p, PeerPhase::Known { .. }))
            .count()
    }
}

/// Full mDNS instance name for `client_code`.
pub fn instance_fullname(client_code: &str) -> String {
    format!("{client_code}.{SERVICE_TYPE}")
}

/// Best-guess LAN address of this host: the source address the OS would use
/// for an outbound IPv4 route. Nothing is sent. Falls back to loopback.
pub fn detect_local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(192, 168, 0, 1), 9))?;
        Ok(socket.local_addr()?.ip())
    };
    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            debug!(error = %e, "Could not detect local address");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Prefer a non-loopback IPv4 address, then any IPv4, then anything.
fn pick_address(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let mut addrs: Vec<IpAddr> = addrs.into_iter().collect();
    addrs.sort_by_key(|ip| match ip {
        IpAddr::V4(v4) if !v4.is_loopback() => 0,
        IpAddr::V4(_) => 1,
        IpAddr::V6(_) => 2,
    });
    addrs.into_iter().next()
}

/// Running announce/browse loop.
pub struct DiscoveryHandle {
    daemon: ServiceDaemon,
    fullname: String,
    table: Arc<Mutex<PeerTable>>,
    task: JoinHandle<()>,
}

impl DiscoveryHandle {
    pub fn peers(&self) -> Arc<Mutex<PeerTable>> {
        self.table.clone()
    }

    /// Withdraw our announcement and stop browsing.
    pub fn shutdown(self) {
        if let Err(e) = self.daemon.unregister(&self.fullname) {
            warn!(error = %e, "Failed to unregister service");
        }
        if let Err(e) = self.daemon.shutdown() {
            warn!(error = %e, "Failed to stop mDNS daemon");
        }
        self.task.abort();
    }
}

/// Announce this device as `client_code` on `port` and handshake with every
/// other instance that shows up.
pub fn spawn_discovery(
    client_code: &str,
    ip: IpAddr,
    port: u16,
    handshaker: Handshaker,
) -> Result<DiscoveryHandle, NetError> {
    let daemon = ServiceDaemon::new()?;

    let host = format!("{client_code}.local.");
    let service = ServiceInfo::new(
        SERVICE_TYPE,
        client_code,
        &host,
        ip,
        port,
        None::<HashMap<String, String>>,
    )?
    .enable_addr_auto();
    let fullname = service.get_fullname().to_string();
    daemon.register(service)?;
    info!(instance = %fullname, port, "Announced on mDNS");

    let receiver = daemon.browse(SERVICE_TYPE)?;
    let table = Arc::new(Mutex::new(PeerTable::new(fullname.clone())));

    let loop_table = table.clone();
    let task = tokio::spawn(async move {
        while let Ok(event) = receiver.recv_async().await {
            handle_event(event, &loop_table, &handshaker);
        }
        debug!("mDNS browse channel closed");
    });

    Ok(DiscoveryHandle {
        daemon,
        fullname,
        table,
        task,
    })
}

fn lock(table: &Mutex<PeerTable>) -> std::sync::MutexGuard<'_, PeerTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn handle_event(event: ServiceEvent, table: &Arc<Mutex<PeerTable>>, handshaker: &Handshaker) {
    match event {
        ServiceEvent::ServiceFound(_, fullname) => {
            let mut peers = lock(table);
            if peers.on_announced(&fullname) {
                // The daemon resolves every instance it reports.
                peers.begin_resolve(&fullname);
                debug!(instance = %fullname, "Peer announced, resolving");
            }
        }

        ServiceEvent::ServiceResolved(resolved) => {
            let fullname = resolved.fullname.clone();
            let ip = pick_address(resolved.addresses.iter().map(|scoped| scoped.to_ip_addr()));
            let Some(ip) = ip else {
                warn!(instance = %fullname, "Resolved peer has no address");
                return;
            };
            let addr = SocketAddr::new(ip, resolved.port);

            let addr = {
                let mut peers = lock(table);
                if !peers.on_resolved(&fullname, addr) {
                    return;
                }
                match peers.begin_handshake(&fullname) {
                    Some(addr) => addr,
                    None => return,
                }
            };

            let table = table.clone();
            let handshaker = handshaker.clone();
            tokio::spawn(async move {
                match handshaker.exchange(addr).await {
                    Ok(device) => {
                        if device.id.is_none() {
                            warn!(instance = %fullname, "Handshake stored no device row");
                        }
                        lock(&table).on_handshake_done(&fullname, device.id, addr);
                    }
                    Err(e) => {
                        warn!(instance = %fullname, addr = %addr, error = %e, "Handshake failed");
                        lock(&table).on_handshake_failed(&fullname);
                    }
                }
            });
        }

        ServiceEvent::ServiceRemoved(_, fullname) => {
            info!(instance = %fullname, "Peer withdrew its announcement");
            lock(table).on_removed(&fullname);
        }

        ServiceEvent::SearchStarted(ty) => debug!(service = %ty, "mDNS search started"),
        ServiceEvent::SearchStopped(ty) => debug!(service = %ty, "mDNS search stopped"),
        _ => {}
    }
}
