use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    select,
};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    message::{ChatCodec, ChatMessage},
};

pub const NAME_PROMPT: &str = "Enter your name: ";

pub async fn run(args: ClientArgs) -> Result<()> {
    let stream = TcpStream::connect(&args.server_addr)
        .await
        .with_context(|| format!("failed to connect to {}", args.server_addr))?;
    info!("connected to {}", args.server_addr);

    run_session(stream, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Drives one chat session over `stream`.
///
/// Prompts on `output` for a name, then sends each further line of `input`
/// as a message and prints every message from someone else. Returns `Ok`
/// when `input` ends; losing the server is an error.
pub async fn run_session<S, I, O>(stream: S, input: I, mut output: O) -> Result<()>
where
    S: AsyncRead + AsyncWrite,
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut lines = FramedRead::new(input, LinesCodec::new());

    output.write_all(NAME_PROMPT.as_bytes()).await?;
    output.flush().await?;
    let name = match lines.next().await {
        Some(line) => line.context("failed to read name")?,
        None => bail!("standard input closed before a name was entered"),
    };

    let (reader, writer) = tokio::io::split(stream);
    let mut inbound = FramedRead::new(reader, ChatCodec::default());
    let mut outbound = FramedWrite::new(writer, ChatCodec::default());

    loop {
        select! {
            incoming = inbound.next() => match incoming {
                Some(Ok(message)) => {
                    if let Some(line) = render_incoming(&name, &message) {
                        write_line(&mut output, &line).await?;
                    }
                }
                Some(Err(err)) => return Err(err).context("failed to receive from server"),
                None => bail!("server closed the stream"),
            },
            line = lines.next() => match line {
                Some(text) => {
                    let text = text.context("failed to read standard input")?;
                    outbound
                        .send(ChatMessage::new(name.as_str(), text))
                        .await
                        .context("failed to send message")?;
                }
                None => break,
            },
        }
    }

    if let Err(error) = outbound.close().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
    Ok(())
}

/// Line to print for an incoming message, or `None` for our own echo.
pub fn render_incoming(local_name: &str, message: &ChatMessage) -> Option<String> {
    if message.user == local_name {
        return None;
    }
    Some(format!("{}> {}", message.user, message.message))
}

async fn write_line<O>(output: &mut O, line: &str) -> std::io::Result<()>
where
    O: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}
