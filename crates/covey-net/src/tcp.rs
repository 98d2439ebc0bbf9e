//! TCP transport: framed request/reply exchange between nodes.
//!
//! Every RPC is one short-lived connection: the caller connects, writes a
//! single length-prefixed postcard frame and reads exactly one frame back.
//! The server side accepts connections and feeds each inbound frame to a
//! [`MessageHandler`], writing the handler's reply on the same socket.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::NetError;
use crate::message::Message;
use crate::{MAX_MESSAGE_SIZE, MessageHandler, Transport};

/// TCP implementation of [`Transport`].
///
/// Connections are not pooled: cluster RPCs are small and infrequent
/// enough that a connect per request keeps failure handling trivial.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    request_timeout: Duration,
}

impl TcpTransport {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn request(&self, addr: &str, msg: Message) -> Result<Message, NetError> {
        let exchange = async {
            let mut stream = TcpStream::connect(addr).await?;
            write_frame(&mut stream, &msg).await?;
            read_frame(&mut stream).await
        };
        match tokio::time::timeout(self.request_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(NetError::Timeout(addr.to_string())),
        }
    }
}

// -----------------------------------------------------------------------
// Framing
// -----------------------------------------------------------------------

/// Write one message as a length-prefixed (4-byte big-endian) postcard
/// frame.
pub async fn write_frame<W>(stream: &mut W, msg: &Message) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    let payload = postcard::to_allocvec(msg).map_err(|e| NetError::Serialization(e.to_string()))?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(NetError::MessageTooLarge {
            len: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    stream.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    stream.write_all(&payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one length-prefixed postcard frame.
pub async fn read_frame<R>(stream: &mut R) -> Result<Message, NetError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(NetError::MessageTooLarge {
            len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    postcard::from_bytes(&payload).map_err(|e| NetError::Serialization(e.to_string()))
}

// -----------------------------------------------------------------------
// Server side
// -----------------------------------------------------------------------

/// Accept connections until `shutdown` flips, dispatching every inbound
/// frame to the handler and writing its reply back on the same socket.
pub async fn serve(
    listener: TcpListener,
    handler: Arc<dyn MessageHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, handler).await {
                                debug!(%peer, error = %e, "connection ended");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
            _ = shutdown.changed() => {
                debug!("listener shutting down");
                break;
            }
        }
    }
}

/// Serve one connection: frames in, replies out, until the peer closes.
async fn serve_connection(
    mut stream: TcpStream,
    handler: Arc<dyn MessageHandler>,
) -> Result<(), NetError> {
    loop {
        let msg = match read_frame(&mut stream).await {
            Ok(msg) => msg,
            // Clean close between frames.
            Err(NetError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        let reply = handler.handle(msg).await;
        write_frame(&mut stream, &reply).await?;
    }
}
