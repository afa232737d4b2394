use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::watch;

use super::PreviewSink;
use crate::core::CapturedUnit;

/// Publishes the latest previewed unit on a watch channel.
///
/// Viewers only ever see the newest unit; once every receiver is gone the
/// sink reports a failure and the router disables preview.
pub struct WatchPreview {
    tx: watch::Sender<Option<CapturedUnit>>,
}

impl WatchPreview {
    pub fn new() -> (Self, watch::Receiver<Option<CapturedUnit>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PreviewSink for WatchPreview {
    async fn present(&mut self, unit: CapturedUnit) -> Result<()> {
        self.tx
            .send(Some(unit))
            .map_err(|_| anyhow!("All preview viewers disconnected"))
    }
}
