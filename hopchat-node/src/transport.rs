//! TCP transport: listener (incoming), dialer (outbound), id handshake, length-prefixed frames.
//! Every link reports into the node's event queue; nothing here touches protocol state.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hopchat_core::wire::{encode_frame, frame_len};
use hopchat_core::{Channel, ChannelError, PeerId};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::runtime::NodeEvent;

const LEN_SIZE: usize = 4;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_PEER_ID_LEN: usize = 256;

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Sending side of one neighbor link. Clones share the same link.
#[derive(Clone)]
pub struct TcpChannel {
    link: u64,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    open: Arc<AtomicBool>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl TcpChannel {
    fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            link: NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed),
            tx,
            open: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Process-unique link number, used to tell a replaced link's late events apart.
    pub fn link(&self) -> u64 {
        self.link
    }

    /// Tear the link down. Reader and writer tasks stop; the reader reports `Closed`.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.shutdown.send_replace(true);
    }

    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl Channel for TcpChannel {
    fn send(&self, message: Vec<u8>) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        let frame = encode_frame(&message).map_err(|e| ChannelError::Transport(e.to_string()))?;
        self.tx.send(frame).map_err(|_| ChannelError::Closed)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Establishes links and feeds their events to the node.
#[derive(Clone)]
pub struct Transport {
    local: PeerId,
    events: mpsc::UnboundedSender<NodeEvent>,
}

impl Transport {
    pub fn new(local: PeerId, events: mpsc::UnboundedSender<NodeEvent>) -> Self {
        Self { local, events }
    }

    /// Accept incoming links until the listener fails.
    pub async fn listen(self, listener: TcpListener) -> io::Result<()> {
        loop {
            let (stream, addr) = listener.accept().await?;
            let transport = self.clone();
            tokio::spawn(async move {
                match handshake_accept(stream, &transport.local).await {
                    Ok((stream, peer)) => {
                        info!(peer = %peer, %addr, "inbound link established");
                        transport.spawn_link(stream, peer, false);
                    }
                    Err(e) => debug!(%addr, error = %e, "inbound handshake failed"),
                }
            });
        }
    }

    /// Dial a neighbor in the background. Failures are logged; nothing is retried.
    pub fn dial(&self, addr: String) {
        let transport = self.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.connect(&addr).await {
                warn!(%addr, error = %e, "cannot connect to neighbor");
            }
        });
    }

    /// Connect, handshake and register the link. Returns the peer's id.
    pub async fn connect(&self, addr: &str) -> io::Result<PeerId> {
        let stream = TcpStream::connect(addr).await?;
        let (stream, peer) = handshake_connect(stream, &self.local).await?;
        info!(peer = %peer, %addr, "outbound link established");
        self.spawn_link(stream, peer.clone(), true);
        Ok(peer)
    }

    fn spawn_link(&self, stream: TcpStream, peer: PeerId, outbound: bool) {
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = TcpChannel::new(tx);
        let link = channel.link();

        // Opened is queued before the reader starts so the node sees it first.
        let _ = self.events.send(NodeEvent::Opened {
            peer: peer.clone(),
            channel: channel.clone(),
            outbound,
        });
        tokio::spawn(write_loop(writer, rx, channel.clone()));
        tokio::spawn(read_loop(reader, peer, link, channel, self.events.clone()));
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    channel: TcpChannel,
) {
    let mut stop = channel.shutdown.subscribe();
    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = write_all_flush(&mut writer, &frame).await {
                    debug!(link = channel.link, error = %e, "write failed");
                    channel.close();
                    break;
                }
            }
            _ = stopped(&mut stop) => break,
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    peer: PeerId,
    link: u64,
    channel: TcpChannel,
    events: mpsc::UnboundedSender<NodeEvent>,
) {
    let mut stop = channel.shutdown.subscribe();
    let outcome = loop {
        tokio::select! {
            read = read_frame(&mut reader) => match read {
                Ok(bytes) => {
                    if events.send(NodeEvent::Data { peer: peer.clone(), link, bytes }).is_err() {
                        break Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break Ok(()),
                Err(e) => break Err(e),
            },
            _ = stopped(&mut stop) => break Ok(()),
        }
    };
    channel.close();
    let event = match outcome {
        Ok(()) => NodeEvent::Closed { peer, link },
        Err(e) => NodeEvent::Failed {
            peer,
            link,
            reason: e.to_string(),
        },
    };
    let _ = events.send(event);
}

/// Resolves once the link is closed. The borrowed watch value is dropped before returning
/// so the caller's future stays `Send`.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; LEN_SIZE];
    reader.read_exact(&mut len_buf).await?;
    let len = frame_len(len_buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn write_all_flush<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

async fn handshake_accept(mut stream: TcpStream, local: &PeerId) -> io::Result<(TcpStream, PeerId)> {
    let peer = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        let peer = read_peer_id(&mut stream).await?;
        write_peer_id(&mut stream, local).await?;
        Ok::<_, io::Error>(peer)
    })
    .await
    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "handshake timed out"))??;
    Ok((stream, peer))
}

async fn handshake_connect(mut stream: TcpStream, local: &PeerId) -> io::Result<(TcpStream, PeerId)> {
    let peer = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        write_peer_id(&mut stream, local).await?;
        read_peer_id(&mut stream).await
    })
    .await
    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "handshake timed out"))??;
    Ok((stream, peer))
}

async fn write_peer_id<W: AsyncWrite + Unpin>(writer: &mut W, id: &PeerId) -> io::Result<()> {
    let frame = encode_frame(id.as_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    write_all_flush(writer, &frame).await
}

async fn read_peer_id<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<PeerId> {
    let bytes = read_frame(reader).await?;
    if bytes.is_empty() || bytes.len() > MAX_PEER_ID_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad peer id length"));
    }
    let id = String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(PeerId::from(id))
}
