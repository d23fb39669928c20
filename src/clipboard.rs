//! System clipboard for the copy command. arboard handles are kept on one
//! worker thread so copied text stays available after the call returns.

use std::sync::mpsc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::{ClientError, ClientResult};

#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn set_text(&self, text: String) -> ClientResult<()>;
}

type Request = (String, oneshot::Sender<Result<(), String>>);

pub struct SystemClipboard {
    requests: mpsc::Sender<Request>,
}

impl SystemClipboard {
    /// Starts the worker thread. The clipboard itself opens on first use.
    pub fn spawn() -> Self {
        let (requests, rx) = mpsc::channel::<Request>();
        std::thread::spawn(move || {
            let mut clipboard = None;
            for (text, reply) in rx {
                let result = write_text(&mut clipboard, text).map_err(|e| e.to_string());
                let _ = reply.send(result);
            }
        });
        Self { requests }
    }
}

fn write_text(slot: &mut Option<arboard::Clipboard>, text: String) -> Result<(), arboard::Error> {
    if slot.is_none() {
        *slot = Some(arboard::Clipboard::new()?);
    }
    if let Some(clipboard) = slot.as_mut() {
        clipboard.set_text(text)?;
    }
    Ok(())
}

#[async_trait]
impl Clipboard for SystemClipboard {
    async fn set_text(&self, text: String) -> ClientResult<()> {
        let (reply, result) = oneshot::channel();
        self.requests
            .send((text, reply))
            .map_err(|_| ClientError::Unavailable("Clipboard".into()))?;
        match result.await {
            Ok(outcome) => outcome.map_err(ClientError::Clipboard),
            Err(_) => Err(ClientError::Unavailable("Clipboard".into())),
        }
    }
}
