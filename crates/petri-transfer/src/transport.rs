//! TCP connection setup for neighbor links and the master connection.
//!
//! Dialing retries a bounded number of times; accepting takes exactly one
//! connection and releases the port.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpSocket, TcpStream};

use crate::error::{Error, Result};

/// Bounded retry for outgoing connections.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total connection attempts before giving up.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Short delays for in-process tests.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            attempts: 50,
            delay: Duration::from_millis(50),
        }
    }
}

/// Connect to `addr`, retrying per `policy`.
///
/// When `bind_ip` is set the outgoing socket uses it as its source address,
/// which is what the master sees as this node's address.
pub async fn dial_with_retry(
    addr: SocketAddr,
    policy: &RetryPolicy,
    bind_ip: Option<IpAddr>,
) -> Result<TcpStream> {
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match dial_once(addr, bind_ip).await {
            Ok(stream) => {
                tracing::debug!(%addr, attempt, "Connected");
                return Ok(stream);
            }
            Err(e) => {
                tracing::warn!(%addr, attempt, attempts, "Connection attempt failed: {}", e);
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    Err(Error::ConnectExhausted {
        addr,
        attempts,
        source: last_error
            .unwrap_or_else(|| std::io::Error::other("no connection attempt was made")),
    })
}

async fn dial_once(addr: SocketAddr, bind_ip: Option<IpAddr>) -> std::io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    if let Some(ip) = bind_ip {
        socket.bind(SocketAddr::new(ip, 0))?;
    }
    let stream = socket.connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Bind `addr`, wait for one peer and close the listener.
pub async fn accept_one(addr: SocketAddr) -> Result<(TcpStream, SocketAddr)> {
    let listener = bind_listener(addr)?;
    tracing::debug!(%addr, "Waiting for neighbor connection");
    let (stream, peer) = listener.accept().await?;
    stream.set_nodelay(true)?;
    tracing::debug!(%addr, %peer, "Accepted neighbor connection");
    Ok((stream, peer))
}

/// Listener with address reuse, since the same port is rebound between runs.
pub fn bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(64)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn dial_reaches_listener() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut stream = dial_with_retry(addr, &RetryPolicy::fast(), None)
            .await
            .unwrap();
        stream.write_all(b"petri").await.unwrap();
        assert_eq!(&server.await.unwrap(), b"petri");
    }

    #[tokio::test]
    async fn dial_retries_until_listener_appears() {
        let probe = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            accept_one(addr).await.unwrap()
        });

        let stream = dial_with_retry(addr, &RetryPolicy::fast(), None).await;
        assert!(stream.is_ok());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn dial_gives_up_after_bounded_attempts() {
        let probe = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let policy = RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(10),
        };
        match dial_with_retry(addr, &policy, None).await {
            Err(Error::ConnectExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected ConnectExhausted, got {:?}", other),
        }
    }
}
