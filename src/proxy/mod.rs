use std::{
    io,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{info, warn};
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::ProxyError;
use crate::host::HostServices;

use handlers::ProxyService;

mod handlers;
mod http;
mod listener;

pub const HOST: Ipv4Addr = Ipv4Addr::LOCALHOST;
pub const DEFAULT_PORT: u16 = 57012;

// Bounds how long a silent player connection can hold up `stop()`.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub host: Ipv4Addr,
    pub preferred_port: u16,
    /// Honour HTTP(S)_PROXY from the environment for upstream calls.
    pub system_proxy: bool,
    pub stream_timeout: Duration,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        ProxyOptions {
            host: HOST,
            preferred_port: DEFAULT_PORT,
            system_proxy: true,
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
        }
    }
}

struct Running {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    listener_thread: JoinHandle<()>,
}

/// The loopback proxy. `start` and `stop` are both idempotent, and a stopped
/// proxy can be started again, possibly on a different port.
pub struct Proxy {
    options: ProxyOptions,
    services: HostServices,
    running: Option<Running>,
}

impl Proxy {
    pub fn new(options: ProxyOptions, services: HostServices) -> Self {
        Proxy {
            options,
            services,
            running: None,
        }
    }

    /// Binds the preferred port, or an ephemeral one if that fails, and
    /// starts accepting. Must not be called from inside an async runtime.
    pub fn start(&mut self) -> Result<SocketAddr, ProxyError> {
        if let Some(running) = &self.running {
            return Ok(running.addr);
        }

        let host = self.options.host;
        let preferred = self.options.preferred_port;

        let listener = bind_listener(host, preferred)?;
        let addr = listener
            .local_addr()
            .map_err(|source| ProxyError::Bind {
                host,
                preferred,
                source,
            })?;

        let mut client = reqwest::blocking::Client::builder();
        if !self.options.system_proxy {
            client = client.no_proxy();
        }
        let client = client.build()?;

        let service = Arc::new(ProxyService::new(client, self.services.clone()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let stream_timeout = self.options.stream_timeout;

        let listener_thread = {
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("ottproxy-listener".into())
                .spawn(move || listener::accept_loop(listener, shutdown, service, stream_timeout))
                .map_err(ProxyError::Spawn)?
        };

        info!(target: "ottproxy", "Proxy started: http://{}", addr);

        self.running = Some(Running {
            addr,
            shutdown,
            listener_thread,
        });

        Ok(addr)
    }

    /// Stops accepting, waits for in-flight requests and releases the port.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.shutdown.store(true, Ordering::SeqCst);

        // Wakes the listener out of its blocking accept.
        if let Err(e) = TcpStream::connect(running.addr) {
            warn!(target: "ottproxy", "Failed to wake listener on {}: {}", running.addr, e);
        }

        if running.listener_thread.join().is_err() {
            warn!(target: "ottproxy", "Listener thread panicked");
        }

        info!(target: "ottproxy", "Proxy stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn address(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.addr)
    }

    /// Base URL the player should use, e.g. `http://127.0.0.1:57012`.
    pub fn proxy_address(&self) -> Option<String> {
        self.address().map(|addr| format!("http://{}", addr))
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind_listener(host: Ipv4Addr, preferred: u16) -> Result<TcpListener, ProxyError> {
    match bind(SocketAddrV4::new(host, preferred)) {
        Ok(listener) => Ok(listener),
        Err(e) => {
            warn!(target: "ottproxy", "Cannot bind {}:{} ({}), using an ephemeral port", host, preferred, e);
            bind(SocketAddrV4::new(host, 0)).map_err(|source| ProxyError::Bind {
                host,
                preferred,
                source,
            })
        }
    }
}

fn bind(addr: SocketAddrV4) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;

    // Lets a restarted proxy take its port back while old connections sit in TIME_WAIT.
    #[cfg(unix)]
    socket.set_reuse_address(true)?;

    socket.bind(&addr.into())?;
    socket.listen(128)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::host::HostSettings;

    fn proxy(preferred_port: u16) -> Proxy {
        Proxy::new(
            ProxyOptions {
                preferred_port,
                system_proxy: false,
                ..ProxyOptions::default()
            },
            HostServices::new(HostSettings::default()),
        )
    }

    #[test]
    fn test_bind_falls_back_to_ephemeral_port() {
        let taken = TcpListener::bind((HOST, 0)).unwrap();
        let taken_port = taken.local_addr().unwrap().port();

        let listener = bind_listener(HOST, taken_port).unwrap();
        let port = listener.local_addr().unwrap().port();

        assert_ne!(port, taken_port);
        assert_ne!(port, 0);
    }

    #[test]
    fn test_binds_preferred_port_when_free() {
        let free_port = TcpListener::bind((HOST, 0)).unwrap().local_addr().unwrap().port();

        let listener = bind_listener(HOST, free_port).unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), free_port);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut proxy = proxy(0);
        proxy.stop();
        assert!(!proxy.is_running());
        assert_eq!(proxy.address(), None);
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut proxy = proxy(0);
        let first = proxy.start().unwrap();
        let second = proxy.start().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.ip(), HOST);
        assert_eq!(proxy.proxy_address(), Some(format!("http://127.0.0.1:{}", first.port())));

        proxy.stop();
        assert!(!proxy.is_running());
    }

    #[test]
    fn test_stop_releases_port() {
        let mut proxy = proxy(0);
        let addr = proxy.start().unwrap();
        proxy.stop();

        let rebound = bind(SocketAddrV4::new(HOST, addr.port()));
        assert!(rebound.is_ok());
    }
}
