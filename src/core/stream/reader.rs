use crate::core::dispatch::client::RttClient;
use crate::core::session::state::SessionState;
use crate::domain::error::{RttComResult, TaskError};
use std::time::{Duration, Instant};
use tracing::trace;

/// Repeatedly reads one up channel, yielding only non-empty chunks
#[derive(Debug, Clone)]
pub struct ChannelReader {
    channel_index: u32,
    chunk_size: u32,
    poll_interval: Duration,
    total_bytes: u64,
}

impl ChannelReader {
    pub fn new(channel_index: u32, chunk_size: u32, poll_interval: Duration) -> Self {
        Self {
            channel_index,
            chunk_size: chunk_size.max(1),
            poll_interval,
            total_bytes: 0,
        }
    }

    pub fn channel_index(&self) -> u32 {
        self.channel_index
    }

    /// Bytes yielded so far
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Wait for the next non-empty chunk
    ///
    /// Sleeps `poll_interval` between empty reads. Fails straight away when
    /// the session failed to start, and propagates any read error.
    pub async fn next_chunk(&mut self, client: &mut RttClient) -> RttComResult<Vec<u8>> {
        loop {
            if let Some(chunk) = self.poll(client, None).await? {
                return Ok(chunk);
            }
        }
    }

    /// Like [`ChannelReader::next_chunk`] but gives up after `timeout`, returning `None`
    ///
    /// The deadline is only checked between reads, so no read in flight is abandoned.
    pub async fn next_chunk_timeout(
        &mut self,
        client: &mut RttClient,
        timeout: Duration,
    ) -> RttComResult<Option<Vec<u8>>> {
        self.poll(client, Some(Instant::now() + timeout)).await
    }

    async fn poll(
        &mut self,
        client: &mut RttClient,
        deadline: Option<Instant>,
    ) -> RttComResult<Option<Vec<u8>>> {
        loop {
            if let SessionState::Failed(kind) = client.state() {
                return Err(TaskError::new(
                    kind,
                    "read",
                    format!(
                        "session failed to start; cannot read up channel {}",
                        self.channel_index
                    ),
                )
                .into());
            }

            let chunk = client.read(self.channel_index, self.chunk_size).await?;
            if !chunk.is_empty() {
                self.total_bytes += chunk.len() as u64;
                trace!(
                    "Up channel {} yielded {} bytes",
                    self.channel_index,
                    chunk.len()
                );
                return Ok(Some(chunk));
            }

            let mut pause = self.poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                pause = pause.min(deadline - now);
            }
            tokio::time::sleep(pause).await;
        }
    }
}
