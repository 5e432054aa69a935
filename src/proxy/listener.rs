use log::{debug, trace, warn};

use std::{
    io::BufReader,
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use reqwest::StatusCode;

use super::handlers::ProxyService;
use super::http::{read_request, Response};

/// Accepts connections until `shutdown` is raised, one worker thread per
/// connection. Every worker is joined before the listener is dropped.
pub(crate) fn accept_loop(
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    service: Arc<ProxyService>,
    stream_timeout: Duration,
) {
    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    for incoming_stream in listener.incoming() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let stream = match incoming_stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(target: "ottproxy", "Failed to accept incoming connection: {}", e);
                continue;
            }
        };

        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(e) => {
                warn!(target: "ottproxy", "Failed to get peer address: {}", e);
                continue;
            }
        };

        if let Err(e) = stream.set_read_timeout(Some(stream_timeout)) {
            warn!(target: "ottproxy", "Failed to set read timeout: {}", e);
        }
        if let Err(e) = stream.set_write_timeout(Some(stream_timeout)) {
            warn!(target: "ottproxy", "Failed to set write timeout: {}", e);
        }

        reap_finished(&mut workers);

        let service = service.clone();
        let spawned = thread::Builder::new()
            .name(format!("ottproxy-conn-{}", peer_addr.port()))
            .spawn(move || handle_conn(stream, peer_addr, &service));

        match spawned {
            Ok(handle) => workers.push(handle),
            Err(e) => warn!(target: "ottproxy", "Failed to spawn worker for {}: {}", peer_addr, e),
        }
    }

    debug!(target: "ottproxy", "Listener shutting down, waiting for {} worker(s)", workers.len());

    for worker in workers {
        join_worker(worker);
    }
}

fn reap_finished(workers: &mut Vec<JoinHandle<()>>) {
    let (finished, running): (Vec<_>, Vec<_>) =
        workers.drain(..).partition(|worker| worker.is_finished());

    workers.extend(running);

    for worker in finished {
        join_worker(worker);
    }
}

fn join_worker(worker: JoinHandle<()>) {
    if let Err(e) = worker.join() {
        warn!(target: "ottproxy", "Connection worker panicked: {:?}", e);
    }
}

fn handle_conn(stream: TcpStream, peer_addr: SocketAddr, service: &ProxyService) {
    let mut reader = match stream.try_clone() {
        Ok(s) => BufReader::new(s),
        Err(e) => {
            warn!(target: "ottproxy", "Failed to clone stream for {}: {}", peer_addr, e);
            return;
        }
    };

    let response = match read_request(&mut reader) {
        Ok(request) => {
            trace!(
                target: "ottproxy",
                "HTTP {} request received to {} from {} ({})",
                request.method,
                request.path,
                peer_addr,
                request.headers.get("user-agent").map_or("unknown agent", String::as_str)
            );
            service.handle(&request)
        }
        Err(e) => {
            debug!(target: "ottproxy", "Malformed request from {}: {}", peer_addr, e);
            Response::new(StatusCode::BAD_REQUEST)
        }
    };

    let mut writer = stream;
    if let Err(e) = response.write_to(&mut writer) {
        trace!(target: "ottproxy", "Failed to send response to {}: {}", peer_addr, e);
    }

    trace!(target: "ottproxy", "Answered {} to {}, closing connection", response.status(), peer_addr);
}
