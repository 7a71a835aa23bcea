//! Stream writer (C6): serialises frames to a shared transport under a
//! single write lock, matching `original_source/lib/StreamWriter.cpp`'s
//! gathered write under `m_writeMtx`.

use serde_json::Value;
use stream_protocol::{encode_header, StreamError, StreamResult, TransportType};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Writes meta and signal-data frames to one transport. Every write
/// (header + body) happens while holding `inner`, so two frames from
/// different signals on the same writer never interleave.
pub struct StreamWriter<W> {
    endpoint_id: String,
    inner: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> StreamWriter<W> {
    pub fn new(endpoint_id: impl Into<String>, transport: W) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            inner: Mutex::new(transport),
        }
    }

    /// The transport endpoint, used as `streamId` in the `init` frame
    /// and for diagnostics. Mirrors `StreamWriter::id()`.
    pub fn id(&self) -> &str {
        &self.endpoint_id
    }

    /// Encodes `params` as a MessagePack meta body behind `method` and
    /// writes `[header][meta-type][body]` in one locked section.
    pub async fn write_meta_information(
        &self,
        signal_number: u32,
        method: &str,
        params: Value,
    ) -> StreamResult<()> {
        let body = stream_protocol::encode_meta_envelope(method, params)?;
        let header = encode_header(TransportType::MetaInformation, signal_number, body.len() as u32)?;

        let mut transport = self.inner.lock().await;
        transport.write_all(&header).await.map_err(StreamError::TransportError)?;
        transport.write_all(&body).await.map_err(StreamError::TransportError)?;
        transport.flush().await.map_err(StreamError::TransportError)
    }

    /// Writes `[header][payload]` for a signal-scoped data frame.
    pub async fn write_signal_data(&self, signal_number: u32, payload: &[u8]) -> StreamResult<()> {
        let header = encode_header(TransportType::SignalData, signal_number, payload.len() as u32)?;

        let mut transport = self.inner.lock().await;
        transport.write_all(&header).await.map_err(StreamError::TransportError)?;
        transport.write_all(payload).await.map_err(StreamError::TransportError)?;
        transport.flush().await.map_err(StreamError::TransportError)
    }

    /// Closes the underlying transport. Further writes fail.
    pub async fn shutdown(&self) -> StreamResult<()> {
        self.inner.lock().await.shutdown().await.map_err(StreamError::TransportError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stream_protocol::decode_meta_envelope;
    use tokio::io::duplex;

    #[tokio::test]
    async fn writes_meta_frame_readable_back() {
        let (client, mut server) = duplex(4096);
        let writer = StreamWriter::new("demo", client);
        writer
            .write_meta_information(0, "apiVersion", json!({"version": "1.0.0"}))
            .await
            .unwrap();

        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 4096];
        let n = server.read(&mut buf).await.unwrap();
        let word = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let len = (word >> 20) & 0xff;
        let payload = &buf[4..4 + len as usize];
        assert_eq!(n, 4 + len as usize);

        let decoded = decode_meta_envelope(payload).unwrap().unwrap();
        assert_eq!(decoded.method.as_deref(), Some("apiVersion"));
    }

    #[tokio::test]
    async fn writes_signal_data_frame() {
        let (client, mut server) = duplex(4096);
        let writer = StreamWriter::new("demo", client);
        writer.write_signal_data(7, &[1, 2, 3, 4]).await.unwrap();

        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 16];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(n, 8);
        assert_eq!(&buf[4..8], &[1, 2, 3, 4]);
    }
}
