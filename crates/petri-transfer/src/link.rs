//! Neighbor links.
//!
//! Each link owns one connection and a background task that is the only
//! reader of it. The simulation task talks to the link through channels of
//! capacity one: a balancing link takes one start command and hands back one
//! outcome per step, a fixed link hands back one column per step.

use std::pin::Pin;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use petri_automaton::Cell;
use petri_protocols::{column_codec, ExchangeMessage, FrameChannel, FrameReceiver, FrameSender};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::error::{Error, Result};
use crate::machine::{Action, Initiator, Responder, TransactionMachine};
use crate::types::{Outcome, Role, Side, Slice};

struct StartCommand {
    boundary: Slice,
    step_nanos: u64,
}

/// A balancing link to one neighbor.
///
/// The role follows the side: the left link responds, the right link
/// initiates.
pub struct BalancingLink {
    side: Side,
    commands: mpsc::Sender<StartCommand>,
    outcomes: mpsc::Receiver<Result<Outcome>>,
    sender: FrameSender,
    task: JoinHandle<()>,
    in_flight: bool,
}

impl BalancingLink {
    /// Spawn the link task over an established stream.
    pub fn new<S>(side: Side, stream: S, height: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (sender, receiver) = FrameChannel::new(stream).split();
        let (command_tx, command_rx) = mpsc::channel(1);
        let (outcome_tx, outcome_rx) = mpsc::channel(1);

        let task_sender = sender.clone();
        let task = match side.role() {
            Role::Initiator => tokio::spawn(run_balancing(
                side,
                Initiator::new(height),
                task_sender,
                receiver,
                command_rx,
                outcome_tx,
            )),
            Role::Responder => tokio::spawn(run_balancing(
                side,
                Responder::new(height),
                task_sender,
                receiver,
                command_rx,
                outcome_tx,
            )),
        };

        Self {
            side,
            commands: command_tx,
            outcomes: outcome_rx,
            sender,
            task,
            in_flight: false,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Begin this step's transaction. Returns without waiting for the
    /// neighbor.
    pub async fn start_transaction(&mut self, boundary: Slice, step_nanos: u64) -> Result<()> {
        if self.in_flight {
            return Err(Error::TransactionInFlight);
        }
        self.commands
            .send(StartCommand {
                boundary,
                step_nanos,
            })
            .await
            .map_err(|_| Error::LinkClosed { side: self.side })?;
        self.in_flight = true;
        Ok(())
    }

    /// Block until the transaction started last resolves.
    pub async fn wait_for_transaction(&mut self) -> Result<Outcome> {
        if !self.in_flight {
            return Err(Error::NoTransaction);
        }
        self.in_flight = false;
        match self.outcomes.recv().await {
            Some(outcome) => outcome,
            None => Err(Error::LinkClosed { side: self.side }),
        }
    }

    /// Stop the task and shut the write side down.
    pub async fn close(self) -> Result<()> {
        let Self {
            side,
            commands,
            sender,
            task,
            ..
        } = self;
        drop(commands);
        let closed = sender.close().await;
        if let Err(e) = task.await {
            tracing::warn!(%side, "Balancing link task ended abnormally: {}", e);
        }
        match closed {
            Ok(()) => Ok(()),
            Err(e) if e.is_disconnect() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn run_balancing<M: TransactionMachine>(
    side: Side,
    mut machine: M,
    sender: FrameSender,
    mut receiver: FrameReceiver,
    mut commands: mpsc::Receiver<StartCommand>,
    outcomes: mpsc::Sender<Result<Outcome>>,
) {
    loop {
        let actions = tokio::select! {
            command = commands.recv() => match command {
                Some(StartCommand { boundary, step_nanos }) => {
                    tracing::trace!(%side, step_nanos, "Starting transaction");
                    machine.start(boundary, step_nanos)
                }
                None => break,
            },
            frame = receiver.recv() => match frame {
                Ok(frame) => ExchangeMessage::from_frame(&frame)
                    .map_err(Error::from)
                    .and_then(|message| machine.receive(message)),
                Err(e) if e.is_disconnect() => {
                    if machine.is_idle() {
                        tracing::debug!(%side, "Neighbor closed the link");
                        break;
                    }
                    Err(Error::LinkClosed { side })
                }
                Err(e) => Err(e.into()),
            },
        };

        let actions = match actions {
            Ok(actions) => actions,
            Err(e) => {
                tracing::error!(%side, "Balancing link failed: {}", e);
                let _ = outcomes.try_send(Err(e));
                break;
            }
        };

        for action in actions {
            match action {
                Action::Send(message) => {
                    if let Err(e) = sender.send(message.to_frame()).await {
                        tracing::error!(%side, "Failed to send to neighbor: {}", e);
                        let _ = outcomes.try_send(Err(Error::LinkClosed { side }));
                        return;
                    }
                }
                Action::Complete(outcome) => {
                    tracing::trace!(%side, delta = outcome.width_delta(), "Transaction complete");
                    if outcomes.send(Ok(outcome)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

type BoxWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// A fixed link to one neighbor: one raw column each way per step.
pub struct FixedLink {
    side: Side,
    height: usize,
    writer: FramedWrite<BoxWriter, LengthDelimitedCodec>,
    columns: mpsc::Receiver<Result<Bytes>>,
    reader: JoinHandle<()>,
}

impl FixedLink {
    pub fn new<S>(side: Side, stream: S, height: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let writer: BoxWriter = Box::pin(write_half);
        let (column_tx, column_rx) = mpsc::channel(1);
        let reader = tokio::spawn(read_columns(
            side,
            FramedRead::new(read_half, column_codec()),
            column_tx,
        ));

        Self {
            side,
            height,
            writer: FramedWrite::new(writer, column_codec()),
            columns: column_rx,
            reader,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Send our boundary-adjacent column.
    pub async fn send_column(&mut self, column: &[Cell]) -> Result<()> {
        let payload: Bytes = column.iter().map(|&c| c as u8).collect();
        match self.writer.send(payload).await {
            Ok(()) => Ok(()),
            Err(e) if is_disconnect(&e) => Err(Error::LinkClosed { side: self.side }),
            Err(e) => Err(e.into()),
        }
    }

    /// Wait for the neighbor's column, to become our halo.
    pub async fn recv_column(&mut self) -> Result<Vec<Cell>> {
        let payload = match self.columns.recv().await {
            Some(payload) => payload?,
            None => return Err(Error::LinkClosed { side: self.side }),
        };
        if payload.len() != self.height {
            return Err(petri_protocols::Error::MalformedPayload {
                what: "column",
                expected: self.height,
                actual: payload.len(),
            }
            .into());
        }
        Ok(payload.iter().map(|&b| b as Cell).collect())
    }

    /// Shut the write side down and stop reading.
    pub async fn close(mut self) -> Result<()> {
        let closed = SinkExt::<Bytes>::close(&mut self.writer).await;
        self.reader.abort();
        match closed {
            Ok(()) => Ok(()),
            Err(e) if is_disconnect(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_columns<R>(
    side: Side,
    mut frames: FramedRead<R, LengthDelimitedCodec>,
    columns: mpsc::Sender<Result<Bytes>>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    while let Some(frame) = frames.next().await {
        match frame {
            // Keepalive.
            Ok(payload) if payload.is_empty() => continue,
            Ok(payload) => {
                if columns.send(Ok(payload.freeze())).await.is_err() {
                    return;
                }
            }
            Err(e) if is_disconnect(&e) => break,
            Err(e) => {
                tracing::error!(%side, "Fixed link read failed: {}", e);
                let _ = columns.try_send(Err(e.into()));
                return;
            }
        }
    }
    tracing::debug!(%side, "Neighbor closed the link");
}

fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use petri_automaton::Grid;

    fn slice_of(value: Cell, side: Side) -> Slice {
        let column = vec![value; 4];
        let grid = Grid::from_columns(4, std::iter::repeat(column.as_slice()).take(6)).unwrap();
        Slice::from_grid(&grid, side).unwrap()
    }

    fn linked_pair() -> (BalancingLink, BalancingLink) {
        let (a, b) = tokio::io::duplex(1024);
        // `a` is the right link of the left fragment, `b` the left link of
        // the right fragment.
        (
            BalancingLink::new(Side::Right, a, 4),
            BalancingLink::new(Side::Left, b, 4),
        )
    }

    #[tokio::test]
    async fn faster_side_gains_the_slower_slice() {
        let (mut initiator, mut responder) = linked_pair();
        let given = slice_of(7, Side::Left);

        responder.start_transaction(given.clone(), 5_000).await.unwrap();
        initiator
            .start_transaction(slice_of(3, Side::Right), 1_000)
            .await
            .unwrap();

        let (i, r) = tokio::join!(
            initiator.wait_for_transaction(),
            responder.wait_for_transaction()
        );
        assert_eq!(i.unwrap(), Outcome::Gained(given));
        assert_eq!(r.unwrap(), Outcome::Lost);

        initiator.close().await.unwrap();
        responder.close().await.unwrap();
    }

    #[tokio::test]
    async fn many_rounds_stay_in_lockstep() {
        let (mut initiator, mut responder) = linked_pair();
        for round in 0u64..20 {
            let (own, peer) = if round % 3 == 0 { (10, 1) } else { (1, 10) };
            initiator
                .start_transaction(slice_of(1, Side::Right), own)
                .await
                .unwrap();
            responder
                .start_transaction(slice_of(2, Side::Left), peer)
                .await
                .unwrap();
            let i = initiator.wait_for_transaction().await.unwrap();
            let r = responder.wait_for_transaction().await.unwrap();
            assert_eq!(i.width_delta() + r.width_delta(), 0);
            assert_eq!(i.width_delta(), if own > peer { -1 } else { 1 });
        }
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let (mut initiator, _responder) = linked_pair();
        initiator
            .start_transaction(slice_of(1, Side::Right), 1)
            .await
            .unwrap();
        assert!(matches!(
            initiator
                .start_transaction(slice_of(1, Side::Right), 1)
                .await,
            Err(Error::TransactionInFlight)
        ));
    }

    #[tokio::test]
    async fn neighbor_vanishing_mid_transaction_is_fatal() {
        let (a, b) = tokio::io::duplex(1024);
        let mut link = BalancingLink::new(Side::Right, a, 4);
        link.start_transaction(slice_of(1, Side::Right), 1)
            .await
            .unwrap();
        drop(b);
        assert!(matches!(
            link.wait_for_transaction().await,
            Err(Error::LinkClosed { side: Side::Right })
        ));
    }

    #[tokio::test]
    async fn unexpected_opcode_fails_the_transaction() {
        let (a, b) = tokio::io::duplex(1024);
        let mut link = BalancingLink::new(Side::Left, a, 4);
        let mut rogue = FrameChannel::new(b);

        link.start_transaction(slice_of(1, Side::Left), 1)
            .await
            .unwrap();
        rogue.send(ExchangeMessage::Ack.to_frame()).await.unwrap();
        assert!(matches!(
            link.wait_for_transaction().await,
            Err(Error::Protocol(petri_protocols::Error::UnexpectedOpcode { .. }))
        ));
    }

    #[tokio::test]
    async fn fixed_links_swap_columns() {
        let (a, b) = tokio::io::duplex(1024);
        let mut left = FixedLink::new(Side::Right, a, 3);
        let mut right = FixedLink::new(Side::Left, b, 3);

        left.send_column(&[-128, 5, 127]).await.unwrap();
        right.send_column(&[1, 2, 3]).await.unwrap();
        assert_eq!(right.recv_column().await.unwrap(), vec![-128, 5, 127]);
        assert_eq!(left.recv_column().await.unwrap(), vec![1, 2, 3]);

        left.close().await.unwrap();
        assert!(matches!(
            right.recv_column().await,
            Err(Error::LinkClosed { side: Side::Left })
        ));
    }

    #[tokio::test]
    async fn fixed_link_skips_keepalives() {
        let stream = tokio_test::io::Builder::new()
            .read(&[0, 0, 0, 0])
            .read(&[0, 0, 0, 3, 0xff, 0, 0x7f])
            .build();
        let mut link = FixedLink::new(Side::Left, stream, 3);
        assert_eq!(link.recv_column().await.unwrap(), vec![-1, 0, 127]);
        assert!(matches!(
            link.recv_column().await,
            Err(Error::LinkClosed { side: Side::Left })
        ));
    }

    #[tokio::test]
    async fn fixed_link_checks_column_height() {
        let (a, b) = tokio::io::duplex(1024);
        let mut left = FixedLink::new(Side::Right, a, 3);
        let mut right = FixedLink::new(Side::Left, b, 4);
        left.send_column(&[1, 2, 3]).await.unwrap();
        assert!(right.recv_column().await.is_err());
    }
}
