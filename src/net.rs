//! Socket helpers: backlog-configurable listener creation and the liveness peek used by the
//! ingester and the per-receiver workers.

use net2::TcpBuilder;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};

/// Create a listening socket bound to `addr` with the given `backlog`, setting
/// `SO_REUSEADDR` the way the reference's `server_create` does.
pub fn listen(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let builder = if addr.is_ipv6() {
        TcpBuilder::new_v6()?
    } else {
        TcpBuilder::new_v4()?
    };
    builder.reuse_address(true)?;
    builder.bind(addr)?;
    builder.listen(backlog as i32)
}

/// Non-blocking zero-length peek: `Ok(0)` means the peer sent an orderly FIN (socket is dead).
/// Any other outcome (data pending, or `WouldBlock`) means the socket is still alive.
pub fn is_alive(stream: &TcpStream) -> io::Result<bool> {
    stream.set_nonblocking(true)?;
    let mut buf = [0u8; 1];
    let result = stream.peek(&mut buf);
    stream.set_nonblocking(false)?;
    match result {
        Ok(0) => Ok(false),
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(true),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alive_socket_reports_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (_server, _) = listener.accept().unwrap();
        assert!(is_alive(&client).unwrap());
    }

    #[test]
    fn closed_socket_reports_dead() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        drop(server);
        // give the FIN time to arrive
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!is_alive(&client).unwrap());
    }

    #[test]
    fn listen_honors_custom_backlog() {
        let listener = listen("127.0.0.1:0".parse().unwrap(), 4).unwrap();
        assert!(listener.local_addr().is_ok());
    }
}
