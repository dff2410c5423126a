//! Drives one session from stdin and mirrors its writes to stdout.
//!
//! Each stdin line is either typed at the end of the document, exactly as a
//! user would type it into the editor, or, while a command is running and
//! reading its stdin, forwarded to that command.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use inkterm_core::{MemoryHost, Phase, Session};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Feed stdin to `session` until end of file, then wait for it to settle.
pub async fn run(host: &MemoryHost, session: &Arc<Session>) -> Result<(), String> {
    // Settle on a prompt before anything is typed.
    session.reset_prompt().await;

    let mut out = tokio::io::stdout();
    write_text(&mut out, &session.document().text()).await;

    let (stop_tx, stop_rx) = oneshot::channel();
    let mirror = start_mirror(host.subscribe_inserts(), stop_rx);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| format!("failed to read stdin: {e}"))?
    {
        submit(host, session, &line).await?;
    }

    session.close_input();
    wait_until_ready(session).await;

    let _ = stop_tx.send(());
    let _ = mirror.await;
    Ok(())
}

async fn submit(host: &MemoryHost, session: &Session, line: &str) -> Result<(), String> {
    let text = format!("{line}\n");

    loop {
        match session.phase() {
            Phase::InteractiveInput => {
                if session.send_input(text.clone()).await {
                    return Ok(());
                }
            }
            Phase::ReadingCommand(_) if !session.writer().is_busy() => break,
            _ => {}
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    let version = host
        .type_text(session.document().id(), &text)
        .map_err(|e| e.to_string())?;
    while session.handled_version() < version {
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    Ok(())
}

/// Wait until the session is back at a prompt with nothing left to write.
async fn wait_until_ready(session: &Session) {
    while !session.phase().is_reading() || session.writer().is_busy() {
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn start_mirror(
    mut inserts: mpsc::UnboundedReceiver<String>,
    mut stop_rx: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut out = tokio::io::stdout();
        loop {
            tokio::select! {
                text = inserts.recv() => match text {
                    Some(text) => write_text(&mut out, &text).await,
                    None => break,
                },
                _ = &mut stop_rx => {
                    while let Ok(text) = inserts.try_recv() {
                        write_text(&mut out, &text).await;
                    }
                    break;
                }
            }
        }
    })
}

async fn write_text<W: AsyncWrite + Unpin>(out: &mut W, text: &str) {
    if let Err(e) = out.write_all(text.as_bytes()).await {
        log::warn!("failed to mirror output: {e}");
        return;
    }
    let _ = out.flush().await;
}
