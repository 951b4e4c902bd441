use std::{
    io::{ErrorKind, Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::{Duration, Instant},
};

use sprinkler_common::{Endpoint, Receive, Transport, WeatherError};

/// Blocking TCP transport. ESP-IDF exposes lwIP through `std::net`, so the
/// host and esp32 builds share it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    type Connection = TcpStream;

    fn connect(&mut self, endpoint: &Endpoint, deadline: Instant) -> Result<TcpStream, WeatherError> {
        let addrs: Vec<SocketAddr> = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|_| WeatherError::ResolveFailure {
                host: endpoint.host.clone(),
            })?
            .collect();
        if addrs.is_empty() {
            return Err(WeatherError::ResolveFailure {
                host: endpoint.host.clone(),
            });
        }

        let mut reason = String::from("no address attempted");
        for addr in addrs {
            let Some(remaining) = remaining(deadline) else {
                reason = "deadline elapsed before connect".to_string();
                break;
            };
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => return Ok(stream),
                Err(err) => reason = format!("{addr}: {err}"),
            }
        }

        Err(WeatherError::ConnectFailure {
            endpoint: endpoint.to_string(),
            reason,
        })
    }

    fn send(&mut self, conn: &mut TcpStream, bytes: &[u8]) -> Result<(), WeatherError> {
        conn.write_all(bytes)
            .map_err(|err| WeatherError::ConnectFailure {
                endpoint: conn
                    .peer_addr()
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|_| "peer".to_string()),
                reason: format!("send failed: {err}"),
            })
    }

    fn receive(&mut self, conn: &mut TcpStream, buf: &mut [u8], deadline: Instant) -> Receive {
        loop {
            let Some(remaining) = remaining(deadline) else {
                return Receive::Timeout;
            };
            if conn.set_read_timeout(Some(remaining)).is_err() {
                return Receive::Closed;
            }

            match conn.read(buf) {
                Ok(0) => return Receive::Closed,
                Ok(count) => return Receive::Data(count),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Receive::Timeout
                }
                Err(_) => return Receive::Closed,
            }
        }
    }
}

/// Time left before `deadline`, or `None` once it has passed. Socket timeouts
/// reject a zero duration.
fn remaining(deadline: Instant) -> Option<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    (!left.is_zero()).then_some(left)
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, thread};

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn unresolvable_host_is_resolve_failure() {
        let endpoint = Endpoint::parse("does-not-exist.invalid");
        let err = TcpTransport
            .connect(&endpoint, Instant::now() + Duration::from_secs(2))
            .unwrap_err();

        assert_eq!(
            err,
            WeatherError::ResolveFailure {
                host: "does-not-exist.invalid".to_string(),
            }
        );
    }

    #[test]
    fn reads_until_peer_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0_u8; 256];
            let count = stream.read(&mut request).unwrap();
            stream.write_all(b"HTTP/1.0 200 OK\r\n\r\nok&").unwrap();
            request[..count].to_vec()
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut transport = TcpTransport;
        let mut conn = transport
            .connect(&Endpoint::parse(&format!("127.0.0.1:{port}")), deadline)
            .unwrap();
        transport.send(&mut conn, b"GET /weather HTTP/1.0\r\n\r\n").unwrap();

        let mut received = Vec::new();
        let mut buf = [0_u8; 8];
        loop {
            match transport.receive(&mut conn, &mut buf, deadline) {
                Receive::Data(count) => received.extend_from_slice(&buf[..count]),
                Receive::Closed => break,
                Receive::Timeout => panic!("unexpected timeout"),
            }
        }

        assert_eq!(received, b"HTTP/1.0 200 OK\r\n\r\nok&".to_vec());
        assert_eq!(server.join().unwrap(), b"GET /weather HTTP/1.0\r\n\r\n".to_vec());
    }

    #[test]
    fn silent_peer_times_out_at_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(500));
            drop(stream);
        });

        let deadline = Instant::now() + Duration::from_millis(150);
        let mut transport = TcpTransport;
        let mut conn = transport
            .connect(&Endpoint::parse(&addr.to_string()), deadline)
            .unwrap();
        let mut buf = [0_u8; 16];

        assert_eq!(transport.receive(&mut conn, &mut buf, deadline), Receive::Timeout);
        server.join().unwrap();
    }
}
