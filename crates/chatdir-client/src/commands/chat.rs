//! Interactive chat client.
//!
//! Lists the directory's topics, resolves the one typed on stdin, then
//! relays stdin lines to the room and prints whatever the room sends.

use std::io::ErrorKind;
use std::net::SocketAddr;

use chatdir_protocol::{DirectoryRequest, FRAME_LEN, Frame, RoomEndpoint, decode_topic_list};
use chatdir_server::TlsContext;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::{ClientError, ClientResult};

/// A plain or TLS byte stream to the directory or a room.
pub trait ChatStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> ChatStream for S {}

/// Why a chat session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The room closed the connection.
    ServerClosed,
    /// stdin reached EOF.
    InputClosed,
}

/// The topic listing shown before the user picks a room.
fn servers_line(topics: &Frame) -> String {
    let topics = decode_topic_list(topics);
    debug!(count = topics.len(), "Directory listing");
    format!("Servers: {}", topics.join(", "))
}

/// Runs the interactive client on stdin/stdout.
pub async fn run(config: &ChatConfig) -> ClientResult<()> {
    let tls = config.tls_context(false)?;
    let directory_addr = config.directory_addr()?;
    let mut directory = connect(directory_addr, tls.as_ref()).await?;

    let Some(topics) = request(&mut directory, &DirectoryRequest::List.to_frame()).await? else {
        println!("Directory disconnected, shutting down client");
        return Ok(());
    };
    println!("{}", servers_line(&topics));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let topic = lines
        .next_line()
        .await?
        .ok_or_else(|| ClientError::Input("no topic given".to_string()))?;
    let lookup = Frame::from_text(&format!("cr{}", topic.trim_end_matches('\r')));

    let Some(reply) = request(&mut directory, &lookup).await? else {
        println!("Directory disconnected, shutting down client");
        return Ok(());
    };
    drop(directory);

    let endpoint = match RoomEndpoint::parse(&reply) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            println!("Input parsing failed, closing client");
            return Err(e.into());
        }
    };
    debug!(endpoint = %endpoint, "Resolved room");

    let room = connect(SocketAddr::V4(endpoint.socket_addr()), tls.as_ref()).await?;
    let mut stdout = tokio::io::stdout();
    let end = chat_session(room, lines.into_inner(), &mut stdout).await?;
    debug!(?end, "Chat session ended");
    Ok(())
}

/// Opens a connection, completing the TLS handshake when `tls` is set.
pub async fn connect(
    addr: SocketAddr,
    tls: Option<&TlsContext>,
) -> ClientResult<Box<dyn ChatStream>> {
    let tcp = TcpStream::connect(addr)
        .await
        .map_err(|e| ClientError::Connection(format!("failed to connect to {addr}: {e}")))?;
    tcp.set_nodelay(true)?;

    let Some(tls) = tls else {
        return Ok(Box::new(tcp));
    };
    let stream = TlsConnector::from(tls.client_config())
        .connect(tls.server_name().clone(), tcp)
        .await
        .map_err(|e| ClientError::Connection(format!("TLS handshake with {addr} failed: {e}")))?;
    Ok(Box::new(stream))
}

/// Sends one frame and waits for one reply. `None` means the peer hung up.
pub async fn request<S>(stream: &mut S, frame: &Frame) -> ClientResult<Option<Frame>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(frame.as_bytes()).await?;
    stream.flush().await?;

    let mut buf = [0u8; FRAME_LEN];
    match stream.read_exact(&mut buf).await {
        Ok(_) => Ok(Some(Frame::from(buf))),
        Err(e) if is_disconnect(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Relays `input` lines to the room and writes room frames to `output`,
/// one per line, until either side closes.
pub async fn chat_session<S, I, W>(room: S, input: I, output: &mut W) -> ClientResult<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(room);
    let mut incoming = IncomingFrames::default();
    let mut lines = input.lines();

    loop {
        let server_closed = tokio::select! {
            frame = incoming.next(&mut reader) => match frame {
                Ok(Some(frame)) => {
                    output.write_all(format!("{}\n", frame.text()).as_bytes()).await?;
                    output.flush().await?;
                    false
                }
                Ok(None) => true,
                Err(e) if is_disconnect(&e) => true,
                Err(e) => return Err(e.into()),
            },
            line = lines.next_line() => match line? {
                Some(line) => {
                    let text = line.strip_suffix('\r').unwrap_or(&line);
                    let sent = async {
                        writer.write_all(Frame::from_text(text).as_bytes()).await?;
                        writer.flush().await
                    };
                    match sent.await {
                        Ok(()) => false,
                        Err(e) if is_disconnect(&e) => true,
                        Err(e) => return Err(e.into()),
                    }
                }
                None => return Ok(SessionEnd::InputClosed),
            },
        };

        if server_closed {
            output
                .write_all(b"Server disconnected, shutting down client\n")
                .await?;
            output.flush().await?;
            return Ok(SessionEnd::ServerClosed);
        }
    }
}

/// Reassembles frames across reads.
///
/// Progress lives in the struct, so a `next` future dropped by `select!`
/// loses no bytes.
struct IncomingFrames {
    buf: [u8; FRAME_LEN],
    filled: usize,
}

impl Default for IncomingFrames {
    fn default() -> Self {
        Self {
            buf: [0; FRAME_LEN],
            filled: 0,
        }
    }
}

impl IncomingFrames {
    async fn next<R>(&mut self, reader: &mut R) -> std::io::Result<Option<Frame>>
    where
        R: AsyncRead + Unpin,
    {
        while self.filled < FRAME_LEN {
            let n = reader.read(&mut self.buf[self.filled..]).await?;
            if n == 0 {
                return Ok(None);
            }
            self.filled += n;
        }
        self.filled = 0;
        Ok(Some(Frame::from(self.buf)))
    }
}

fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}
