//! Framed message channel over any reliable byte stream.
//!
//! The receive half is owned by exactly one task. The send half is cloneable
//! and serialises writers behind a mutex so two frames never interleave.

use std::pin::Pin;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::{Frame, FrameCodec, Keepalive};
use crate::error::{Error, Result};

type BoxReader = Pin<Box<dyn AsyncRead + Send>>;
type BoxWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Sending half of a [`FrameChannel`].
#[derive(Clone)]
pub struct FrameSender {
    inner: Arc<Mutex<FramedWrite<BoxWriter, FrameCodec>>>,
}

impl FrameSender {
    /// Write one frame and flush it.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        let mut writer = self.inner.lock().await;
        writer.send(frame).await.map_err(closed_on_disconnect)
    }

    /// Write a zero-length keepalive.
    pub async fn send_keepalive(&self) -> Result<()> {
        let mut writer = self.inner.lock().await;
        writer.send(Keepalive).await.map_err(closed_on_disconnect)
    }

    /// Flush and shut down the write side.
    pub async fn close(&self) -> Result<()> {
        let mut writer = self.inner.lock().await;
        SinkExt::<Frame>::close(&mut *writer)
            .await
            .map_err(closed_on_disconnect)
    }
}

/// Receiving half of a [`FrameChannel`].
pub struct FrameReceiver {
    inner: FramedRead<BoxReader, FrameCodec>,
}

impl FrameReceiver {
    /// Wait for the next non-keepalive frame.
    ///
    /// Fails with [`Error::ChannelClosed`] when the stream ends or resets.
    pub async fn recv(&mut self) -> Result<Frame> {
        match self.inner.next().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => Err(closed_on_disconnect(e)),
            None => Err(Error::ChannelClosed),
        }
    }
}

/// A bidirectional framed channel.
pub struct FrameChannel {
    sender: FrameSender,
    receiver: FrameReceiver,
}

impl FrameChannel {
    /// Wrap a stream such as a `TcpStream` or an in-memory duplex.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(reader, writer)
    }

    /// Build from separate read and write halves.
    pub fn from_parts<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let reader: BoxReader = Box::pin(reader);
        let writer: BoxWriter = Box::pin(writer);
        Self {
            sender: FrameSender {
                inner: Arc::new(Mutex::new(FramedWrite::new(writer, FrameCodec::new()))),
            },
            receiver: FrameReceiver {
                inner: FramedRead::new(reader, FrameCodec::new()),
            },
        }
    }

    pub async fn send(&mut self, frame: Frame) -> Result<()> {
        self.sender.send(frame).await
    }

    pub async fn recv(&mut self) -> Result<Frame> {
        self.receiver.recv().await
    }

    /// A handle for sending from another task.
    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    pub fn split(self) -> (FrameSender, FrameReceiver) {
        (self.sender, self.receiver)
    }

    pub async fn close(&mut self) -> Result<()> {
        self.sender.close().await
    }
}

fn closed_on_disconnect(e: Error) -> Error {
    if e.is_disconnect() {
        Error::ChannelClosed
    } else {
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    #[tokio::test]
    async fn round_trip_over_duplex() {
        let (a, b) = tokio::io::duplex(256);
        let mut left = FrameChannel::new(a);
        let mut right = FrameChannel::new(b);

        left.send(Frame::new(Opcode::Time, 42u64.to_be_bytes().to_vec()))
            .await
            .unwrap();
        let frame = right.recv().await.unwrap();
        assert_eq!(frame.kind().unwrap(), Opcode::Time);
        assert_eq!(&frame.payload[..], &42u64.to_be_bytes());
    }

    #[tokio::test]
    async fn keepalive_is_not_delivered() {
        let stream = tokio_test::io::Builder::new()
            .read(&[0, 0, 0, 0])
            .read(&[0, 0, 0, 1, 0, 0, 0, 51, 1])
            .build();
        let mut channel = FrameChannel::new(stream);
        let frame = channel.recv().await.unwrap();
        assert_eq!(frame.kind().unwrap(), Opcode::Start);
    }

    #[tokio::test]
    async fn sender_writes_exact_bytes() {
        let stream = tokio_test::io::Builder::new()
            .write(&[0, 0, 0, 1, 0, 0, 0, 53, 1])
            .write(&[0, 0, 0, 0])
            .build();
        let mut channel = FrameChannel::new(stream);
        channel.send(Frame::signal(Opcode::FrameMark)).await.unwrap();
        channel.sender().send_keepalive().await.unwrap();
    }

    #[tokio::test]
    async fn channel_can_be_driven_from_a_spawned_task() {
        let (a, b) = tokio::io::duplex(256);
        let mut peer = FrameChannel::new(b);

        let task = tokio::spawn(async move {
            let mut channel = FrameChannel::new(a);
            channel.send(Frame::signal(Opcode::Done)).await?;
            let reply = channel.recv().await?;
            channel.close().await?;
            Ok::<_, Error>(reply)
        });

        let frame = peer.recv().await.unwrap();
        assert_eq!(frame.kind().unwrap(), Opcode::Done);
        peer.send(Frame::signal(Opcode::Start)).await.unwrap();
        let reply = task.await.unwrap().unwrap();
        assert_eq!(reply.kind().unwrap(), Opcode::Start);
        assert!(matches!(peer.recv().await, Err(Error::ChannelClosed)));
    }

    #[tokio::test]
    async fn eof_reports_closed() {
        let (a, b) = tokio::io::duplex(64);
        drop(a);
        let mut channel = FrameChannel::new(b);
        assert!(matches!(channel.recv().await, Err(Error::ChannelClosed)));
    }

    #[tokio::test]
    async fn concurrent_senders_do_not_interleave() {
        let (a, b) = tokio::io::duplex(64);
        let (sender, _) = FrameChannel::new(a).split();
        let mut receiver = FrameChannel::new(b);

        let mut tasks = Vec::new();
        for i in 0..8u8 {
            let sender = sender.clone();
            tasks.push(tokio::spawn(async move {
                sender
                    .send(Frame::new(Opcode::Data, vec![i; 100]))
                    .await
                    .unwrap();
            }));
        }

        let mut seen = Vec::new();
        for _ in 0..8 {
            let frame = receiver.recv().await.unwrap();
            let first = frame.payload[0];
            assert!(frame.payload.iter().all(|&b| b == first));
            assert_eq!(frame.payload.len(), 100);
            seen.push(first);
        }
        for task in tasks {
            task.await.unwrap();
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<u8>>());
    }
}
