//! The multicast socket every synth listens on.
//!
//! One [`MulticastSession`] per process.  It is opened explicitly, handed by
//! reference to whoever needs to talk to the synths, and closed explicitly
//! (which leaves the multicast group before the socket is dropped).
use log::{debug, info, warn};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::{
    fmt,
    io::ErrorKind,
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket},
    str::FromStr,
};

#[cfg(test)]
use mockall::automock;

use crate::{
    common::{box_error::BoxError, config::Config},
    utils,
};

/// group all the synths join
pub const ALLES_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(232, 10, 11, 12);
/// port all the synths listen on
pub const ALLES_PORT: u16 = 3333;
/// lowest ttl we will put on a multicast packet (enough for a typical LAN)
pub const MIN_MULTICAST_TTL: u32 = 20;
/// largest datagram we bother to read
pub const MAX_RECEIVE_LEN: usize = 1024;
/// default guess of how long a synth takes to answer (ms)
pub const ALLES_LATENCY_MS: i64 = 1000;
/// default number of voices on a synth
pub const ALLES_VOICES: u32 = 10;

/// A datagram that came in off the wire
#[derive(Debug, Clone, PartialEq)]
pub struct Datagram {
    pub data: Vec<u8>,
    pub source: SocketAddr,
}

/// The operations the controller needs from the network.
///
/// [`MulticastSession`] is the real thing.  The sync engine and command
/// sender only see this trait so they can be driven by a simulated network.
#[cfg_attr(test, automock)]
pub trait Transport {
    /// send one datagram to the group
    fn send(&mut self, data: &[u8]) -> Result<usize, BoxError>;
    /// non-blocking receive.  None means nothing was waiting (or the socket
    /// hiccupped, which is treated the same way)
    fn try_receive(&mut self) -> Option<Datagram>;
}

/// Network knobs for a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub group: Ipv4Addr,
    pub port: u16,
    /// interface the group is joined on (UNSPECIFIED lets the kernel pick)
    pub local_ip: Ipv4Addr,
    pub ttl: u32,
    /// assumed worst case time for a synth to answer, used to size the sync drain
    pub latency_ms: i64,
    /// voices per synth, a reset at or above this count resets all of them
    pub voices: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            group: ALLES_MULTICAST_GROUP,
            port: ALLES_PORT,
            local_ip: Ipv4Addr::UNSPECIFIED,
            ttl: MIN_MULTICAST_TTL,
            latency_ms: ALLES_LATENCY_MS,
            voices: ALLES_VOICES,
        }
    }
}

impl SessionSettings {
    /// pull the network settings out of a [`Config`]
    ///
    /// `local_ip` may be "auto", in which case the interface that routes to
    /// the multicast group is used.
    pub fn from_config(config: &Config) -> Result<SessionSettings, BoxError> {
        let group = Ipv4Addr::from_str(&config.get_str_value("multicast_group", None)?)?;
        let port = config.get_u32_value("port", None)?;
        if port > u16::MAX as u32 {
            simple_error::bail!("port {} out of range", port);
        }
        let local = config.get_str_value("local_ip", None)?;
        let local_ip = if local == "auto" {
            match utils::get_local_ip(group) {
                Ok(ip) => ip,
                Err(e) => {
                    warn!("cannot detect local interface, letting the kernel pick: {}", e);
                    Ipv4Addr::UNSPECIFIED
                }
            }
        } else {
            Ipv4Addr::from_str(&local)?
        };
        Ok(SessionSettings {
            group: group,
            port: port as u16,
            local_ip: local_ip,
            ttl: config.get_u32_value("ttl", None)?.max(MIN_MULTICAST_TTL),
            latency_ms: config.get_u32_value("latency_ms", None)? as i64,
            voices: config.get_u32_value("voices", None)?,
        })
    }
    pub fn group_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.group, self.port)
    }
}

/// An open, joined multicast socket
pub struct MulticastSession {
    sock: UdpSocket,
    group: SocketAddrV4,
    interface: Ipv4Addr,
    joined: bool,
    buffer: [u8; MAX_RECEIVE_LEN],
}

impl MulticastSession {
    /// Create the socket, join the group and go non-blocking.
    ///
    /// Any failure here is fatal.  The one exception is SO_REUSEPORT, which
    /// not every platform has: if it can't be set SO_BROADCAST is set instead.
    pub fn open(settings: &SessionSettings) -> Result<MulticastSession, BoxError> {
        let raw_sock = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        raw_sock.set_reuse_address(true)?;
        if let Err(e) = Self::set_reuse_port(&raw_sock) {
            debug!("SO_REUSEPORT unavailable ({}), using SO_BROADCAST", e);
            raw_sock.set_broadcast(true)?;
        }
        raw_sock.set_multicast_ttl_v4(settings.ttl.max(MIN_MULTICAST_TTL))?;
        // we don't need to hear our own beacons
        raw_sock.set_multicast_loop_v4(false)?;
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), settings.port);
        raw_sock.bind(&SockAddr::from(addr))?;
        raw_sock.set_multicast_if_v4(&settings.local_ip)?;
        raw_sock.join_multicast_v4(&settings.group, &settings.local_ip)?;
        // the sync engine polls, it must never block on a read
        raw_sock.set_nonblocking(true)?;
        info!(
            "joined {} on interface {}",
            settings.group_addr(),
            settings.local_ip
        );
        Ok(MulticastSession {
            sock: UdpSocket::from(raw_sock),
            group: settings.group_addr(),
            interface: settings.local_ip,
            joined: true,
            buffer: [0; MAX_RECEIVE_LEN],
        })
    }

    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    fn set_reuse_port(sock: &Socket) -> std::io::Result<()> {
        sock.set_reuse_port(true)
    }

    #[cfg(not(all(unix, not(any(target_os = "solaris", target_os = "illumos")))))]
    fn set_reuse_port(_sock: &Socket) -> std::io::Result<()> {
        Err(std::io::Error::from(ErrorKind::Unsupported))
    }

    /// Leave the group and release the socket
    pub fn close(mut self) -> Result<(), BoxError> {
        self.leave()?;
        Ok(())
    }

    fn leave(&mut self) -> std::io::Result<()> {
        if self.joined {
            self.joined = false;
            self.sock
                .leave_multicast_v4(self.group.ip(), &self.interface)?;
            info!("left {}", self.group);
        }
        Ok(())
    }

    pub fn group(&self) -> SocketAddrV4 {
        self.group
    }
}

impl Transport for MulticastSession {
    fn send(&mut self, data: &[u8]) -> Result<usize, BoxError> {
        Ok(self.sock.send_to(data, self.group)?)
    }
    fn try_receive(&mut self) -> Option<Datagram> {
        match self.sock.recv_from(&mut self.buffer) {
            Ok((amt, source)) => Some(Datagram {
                data: self.buffer[..amt].to_vec(),
                source: source,
            }),
            Err(e) if e.kind() == ErrorKind::WouldBlock => None,
            Err(e) => {
                debug!("receive error treated as no data: {}", e);
                None
            }
        }
    }
}

impl Drop for MulticastSession {
    fn drop(&mut self) {
        if let Err(e) = self.leave() {
            warn!("could not leave {}: {}", self.group, e);
        }
    }
}

impl fmt::Display for MulticastSession {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.sock.local_addr() {
            Ok(local) => write!(
                f,
                "{{ sock: {}, group: {}, if: {} }}",
                local, self.group, self.interface
            ),
            Err(_) => write!(f, "{{ group: {}, if: {} }}", self.group, self.interface),
        }
    }
}

#[cfg(test)]
mod test_multicast_sock {
    use super::*;

    #[test]
    fn default_settings() {
        let settings = SessionSettings::default();
        assert_eq!(settings.group_addr().to_string(), "232.10.11.12:3333");
        assert!(settings.ttl >= 20);
        assert_eq!(settings.latency_ms, 1000);
    }
    #[test]
    fn settings_from_config_defaults() {
        let config = Config::build("no_such_alles_file.json".to_string(), Config::defaults()).unwrap();
        let mut from_config = SessionSettings::from_config(&config).unwrap();
        // whatever "auto" finds depends on the machine running the test
        from_config.local_ip = Ipv4Addr::UNSPECIFIED;
        assert_eq!(from_config, SessionSettings::default());
    }
    #[test]
    fn settings_raise_low_ttl() {
        let mut config = Config::build("no_such_alles_file.json".to_string(), Config::defaults()).unwrap();
        config.set_value("ttl", 2).unwrap();
        config.set_value("local_ip", "127.0.0.1").unwrap();
        let settings = SessionSettings::from_config(&config).unwrap();
        assert_eq!(settings.ttl, MIN_MULTICAST_TTL);
        assert_eq!(settings.local_ip, Ipv4Addr::LOCALHOST);
    }
    fn loopback_settings(port: u16) -> SessionSettings {
        SessionSettings {
            port,
            local_ip: Ipv4Addr::LOCALHOST,
            ..Default::default()
        }
    }

    #[test]
    fn open_poll_close() {
        let mut session = MulticastSession::open(&loopback_settings(43331)).unwrap();
        assert_eq!(session.group().to_string(), "232.10.11.12:43331");
        assert!(session.to_string().contains("232.10.11.12:43331"));
        // nothing is waiting, so this must come straight back
        let tic = std::time::Instant::now();
        assert_eq!(session.try_receive(), None);
        assert!(tic.elapsed() < std::time::Duration::from_millis(100));
        assert!(session.close().is_ok());
    }

    #[test]
    fn leave_only_once() {
        let mut session = MulticastSession::open(&loopback_settings(43332)).unwrap();
        session.leave().unwrap();
        assert!(!session.joined);
        // already left, so this and the Drop are no-ops
        session.leave().unwrap();
        drop(session);
    }

    #[test]
    fn drop_without_close() {
        let session = MulticastSession::open(&loopback_settings(43333)).unwrap();
        drop(session);
        // the port can be joined again afterwards
        let again = MulticastSession::open(&loopback_settings(43333)).unwrap();
        assert!(again.close().is_ok());
    }

    #[test]
    fn settings_reject_bad_group() {
        let mut config = Config::build("no_such_alles_file.json".to_string(), Config::defaults()).unwrap();
        config.set_value("multicast_group", "not-an-ip").unwrap();
        assert!(SessionSettings::from_config(&config).is_err());
    }
}
