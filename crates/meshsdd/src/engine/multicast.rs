//! Production engine speaking multicast DNS over a `mio` UDP socket.

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use mio::net::UdpSocket;
use mio::{Interest, Token};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::event_loop::IoRegistry;

use super::wire::{self, MDNS_PORT};
use super::{
    BrowserHandle, BrowserId, DiscoveryEngine, ENGINE_TARGET, EngineConfig, EngineError,
    EngineEventSender, EngineHandle, EngineId, EngineState,
};

const MDNS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
const MAX_DATAGRAM: usize = 9000;

/// Multicast DNS responder and service-type browser.
///
/// One engine is live at a time. It reports [`EngineState::Running`] the
/// first time its socket becomes ready and [`EngineState::Failure`] when the
/// socket reports a hard error.
pub struct MulticastEngine {
    bind: SocketAddr,
    next_engine: u64,
    next_browser: u64,
    live: Option<LiveEngine>,
    buffer: Vec<u8>,
}

struct LiveEngine {
    id: EngineId,
    socket: UdpSocket,
    token: Token,
    events: EngineEventSender,
    wide_area_servers: Vec<SocketAddr>,
    running: bool,
    failed: bool,
    browser: Option<LiveBrowser>,
    outbox: VecDeque<(Vec<u8>, SocketAddr)>,
}

struct LiveBrowser {
    id: BrowserId,
    owner: String,
}

impl MulticastEngine {
    /// Engine bound to the standard mDNS port on all interfaces.
    #[must_use]
    pub fn new() -> Self {
        Self::with_bind_address(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            MDNS_PORT,
        )))
    }

    /// Engine bound to `bind`, e.g. an ephemeral port in tests.
    #[must_use]
    pub fn with_bind_address(bind: SocketAddr) -> Self {
        Self {
            bind,
            next_engine: 0,
            next_browser: 0,
            live: None,
            buffer: vec![0; MAX_DATAGRAM],
        }
    }

    fn open_socket(&self) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&self.bind.into())?;
        socket.join_multicast_v4(&MDNS_GROUP, &Ipv4Addr::UNSPECIFIED)?;
        socket.set_multicast_loop_v4(true)?;
        socket.set_nonblocking(true)?;
        Ok(UdpSocket::from_std(socket.into()))
    }
}

impl Default for MulticastEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryEngine for MulticastEngine {
    fn create_engine(
        &mut self,
        config: &EngineConfig,
        io: &mut IoRegistry<'_>,
        events: EngineEventSender,
    ) -> Result<EngineHandle, EngineError> {
        if let Some(live) = &self.live {
            return Err(EngineError::Rejected {
                reason: format!("{} is still live", live.id),
            });
        }
        let mut socket = self
            .open_socket()
            .map_err(|source| EngineError::Socket { source })?;
        let token = io
            .register(&mut socket, Interest::READABLE | Interest::WRITABLE)
            .map_err(|source| EngineError::Register { source })?;

        self.next_engine += 1;
        let id = EngineId::new(self.next_engine);
        let publication = config.publication();
        info!(
            target: ENGINE_TARGET,
            engine = %id,
            bind = %self.bind,
            wide_area = config.wide_area_servers().len(),
            suppress_host_info = publication.suppress_host_info,
            suppress_addresses = publication.suppress_addresses,
            suppress_workstation = publication.suppress_workstation,
            suppress_domain = publication.suppress_domain,
            "multicast engine created"
        );
        self.live = Some(LiveEngine {
            id,
            socket,
            token,
            events,
            wide_area_servers: config.wide_area_servers().to_vec(),
            running: false,
            failed: false,
            browser: None,
            outbox: VecDeque::new(),
        });
        Ok(EngineHandle::new(id))
    }

    fn destroy_engine(&mut self, handle: EngineHandle, io: &mut IoRegistry<'_>) {
        let Some(mut live) = self.live.take_if(|live| live.id == handle.id()) else {
            debug!(target: ENGINE_TARGET, engine = %handle.id(), "engine already gone");
            return;
        };
        if let Err(error) = io.deregister(&mut live.socket) {
            warn!(
                target: ENGINE_TARGET,
                engine = %live.id,
                error = %error,
                "failed to deregister engine socket"
            );
        }
        info!(target: ENGINE_TARGET, engine = %live.id, "multicast engine destroyed");
    }

    fn create_type_browser(
        &mut self,
        engine: &EngineHandle,
        domain: &str,
    ) -> Result<BrowserHandle, EngineError> {
        let live = self
            .live
            .as_mut()
            .filter(|live| live.id == engine.id())
            .ok_or(EngineError::StaleEngine {
                engine: engine.id(),
            })?;
        if let Some(browser) = &live.browser {
            return Err(EngineError::Rejected {
                reason: format!("{} is still browsing", browser.id),
            });
        }
        let owner = wire::enumeration_name(domain);
        let query = wire::encode_query(&owner).map_err(|source| EngineError::Domain {
            domain: domain.to_owned(),
            source,
        })?;

        self.next_browser += 1;
        let id = BrowserId::new(self.next_browser);
        let group = SocketAddr::V4(SocketAddrV4::new(MDNS_GROUP, MDNS_PORT));
        live.outbox.push_back((query.clone(), group));
        for server in &live.wide_area_servers {
            live.outbox.push_back((query.clone(), *server));
        }
        live.browser = Some(LiveBrowser { id, owner });
        live.flush();
        info!(target: ENGINE_TARGET, browser = %id, domain, "type browser created");
        Ok(BrowserHandle::new(id, live.id))
    }

    fn destroy_type_browser(&mut self, browser: BrowserHandle) {
        let removed = self
            .live
            .as_mut()
            .filter(|live| live.id == browser.engine())
            .and_then(|live| live.browser.take_if(|live| live.id == browser.id()));
        if removed.is_some() {
            info!(target: ENGINE_TARGET, browser = %browser.id(), "type browser destroyed");
        }
    }

    fn process_io(&mut self, token: Token) {
        let Some(live) = self.live.as_mut().filter(|live| live.token == token) else {
            return;
        };
        if live.failed {
            return;
        }
        if !live.running {
            live.running = true;
            live.events.state(live.id, EngineState::Running);
        }
        live.flush();
        live.receive(&mut self.buffer);
    }
}

impl LiveEngine {
    fn flush(&mut self) {
        while let Some((datagram, target)) = self.outbox.front() {
            match self.socket.send_to(datagram, *target) {
                Ok(_) => {
                    debug!(target: ENGINE_TARGET, engine = %self.id, destination = %target, "query sent");
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    warn!(
                        target: ENGINE_TARGET,
                        engine = %self.id,
                        destination = %target,
                        error = %error,
                        "dropping undeliverable query"
                    );
                }
            }
            self.outbox.pop_front();
        }
    }

    fn receive(&mut self, buffer: &mut [u8]) {
        loop {
            match self.socket.recv_from(buffer) {
                Ok((length, source)) => {
                    if let Some(datagram) = buffer.get(..length) {
                        self.handle_datagram(datagram, source);
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    warn!(
                        target: ENGINE_TARGET,
                        engine = %self.id,
                        error = %error,
                        "engine socket failed"
                    );
                    self.failed = true;
                    self.events.state(self.id, EngineState::Failure);
                    return;
                }
            }
        }
    }

    fn handle_datagram(&self, datagram: &[u8], source: SocketAddr) {
        let Some(browser) = &self.browser else {
            return;
        };
        let records = match wire::decode_ptr_records(datagram) {
            Ok(records) => records,
            Err(error) => {
                debug!(target: ENGINE_TARGET, %source, error = %error, "ignoring malformed response");
                return;
            }
        };
        for record in records
            .into_iter()
            .filter(|record| record.owner.eq_ignore_ascii_case(&browser.owner))
        {
            let Some((service_type, domain)) = wire::split_service_type(&record.target) else {
                continue;
            };
            if record.ttl == 0 {
                self.events.type_removed(browser.id, service_type, domain);
            } else {
                self.events.type_found(browser.id, service_type, domain);
            }
        }
    }
}
