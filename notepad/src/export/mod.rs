// Export pipe: a background writer streams one note's text through a bounded channel

use crate::config::ExportConfig;
use crate::error::{Result, StoreError};
use crate::record::Note;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::runtime::Handle;

pub const TEXT_PLAIN: &str = "text/plain";

/// Stream kinds a note can be exported as.
pub const SUPPORTED_KINDS: &[&str] = &[TEXT_PLAIN];

/// Match a concrete MIME type against a filter such as `text/plain`,
/// `text/*` or `*/*`.
pub fn mime_matches(filter: &str, kind: &str) -> bool {
    let filter = filter.trim().to_ascii_lowercase();
    let kind = kind.to_ascii_lowercase();
    if filter == "*/*" || filter == "*" {
        return true;
    }
    match (filter.split_once('/'), kind.split_once('/')) {
        (Some((f_type, f_sub)), Some((k_type, k_sub))) => {
            f_type == k_type && (f_sub == "*" || f_sub == k_sub)
        }
        _ => false,
    }
}

/// The supported kinds accepted by `filter`.
pub fn matching_kinds(filter: &str) -> Vec<&'static str> {
    SUPPORTED_KINDS
        .iter()
        .copied()
        .filter(|kind| mime_matches(filter, kind))
        .collect()
}

/// The plain-text rendering of a note: title, a blank line, then the body.
pub fn render_note(note: &Note) -> String {
    format!("{}\n\n{}\n", note.title, note.body)
}

/// Spawns export writers on the current tokio runtime.
#[derive(Debug, Clone)]
pub struct ExportPipe {
    config: ExportConfig,
    active: Arc<AtomicUsize>,
}

impl ExportPipe {
    pub fn new(config: ExportConfig) -> Self {
        ExportPipe {
            config,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Writers that have been spawned and not yet finished.
    pub fn active_writers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Start a writer for `note` and hand back the read end. Must be called
    /// from within a tokio runtime. Writer failures are logged, never
    /// returned: the reader just sees the stream end early.
    pub fn spawn(&self, note: &Note) -> Result<NoteStream> {
        let handle = Handle::try_current()
            .map_err(|e| StoreError::Runtime(format!("export needs a tokio runtime: {e}")))?;

        let (writer, reader) = tokio::io::duplex(self.config.buffer_bytes);
        let payload = render_note(note).into_bytes();
        let chunk_size = self.config.buffer_bytes;
        let timeout = self.config.write_timeout();
        let guard = ActiveWriter::enter(self.active.clone());
        let note_id = note.id;

        handle.spawn(async move {
            let _guard = guard;
            match write_payload(writer, &payload, chunk_size, timeout).await {
                Ok(()) => log::debug!("export of note {note_id} complete"),
                Err(e) => log::warn!("export of note {note_id} stopped: {e}"),
            }
        });

        Ok(NoteStream {
            note_id,
            inner: reader,
        })
    }
}

async fn write_payload(
    mut writer: DuplexStream,
    payload: &[u8],
    chunk_size: usize,
    timeout: Duration,
) -> io::Result<()> {
    for chunk in payload.chunks(chunk_size.max(1)) {
        tokio::time::timeout(timeout, writer.write_all(chunk))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "reader stopped consuming"))??;
    }
    writer.shutdown().await
}

/// Counts a writer as active for as long as it lives.
#[derive(Debug)]
struct ActiveWriter(Arc<AtomicUsize>);

impl ActiveWriter {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        ActiveWriter(counter)
    }
}

impl Drop for ActiveWriter {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Read end of an export. Ends once the writer has sent the whole note.
#[derive(Debug)]
pub struct NoteStream {
    note_id: i64,
    inner: DuplexStream,
}

impl NoteStream {
    pub fn note_id(&self) -> i64 {
        self.note_id
    }

    /// Read the whole export as text.
    pub async fn read_to_string(mut self) -> Result<String> {
        let mut buf = Vec::new();
        self.inner.read_to_end(&mut buf).await?;
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }
}

impl AsyncRead for NoteStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn note(title: &str, body: &str) -> Note {
        Note {
            id: 7,
            title: title.to_string(),
            body: body.to_string(),
            created: 1,
            modified: 1,
            color: 0,
            category: "task".to_string(),
        }
    }

    async fn wait_idle(pipe: &ExportPipe) {
        for _ in 0..200 {
            if pipe.active_writers() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("export writer never finished");
    }

    #[test]
    fn test_render_note() {
        assert_eq!(render_note(&note("Hi", "World")), "Hi\n\nWorld\n");
        assert_eq!(render_note(&note("", "")), "\n\n\n");
    }

    #[test]
    fn test_mime_matches() {
        assert!(mime_matches("text/plain", TEXT_PLAIN));
        assert!(mime_matches("text/*", TEXT_PLAIN));
        assert!(mime_matches("*/*", TEXT_PLAIN));
        assert!(mime_matches("TEXT/Plain", TEXT_PLAIN));
        assert!(!mime_matches("text/html", TEXT_PLAIN));
        assert!(!mime_matches("image/*", TEXT_PLAIN));
        assert!(!mime_matches("plain", TEXT_PLAIN));
        assert_eq!(matching_kinds("image/png"), Vec::<&str>::new());
        assert_eq!(matching_kinds("text/*"), vec![TEXT_PLAIN]);
    }

    #[test]
    fn test_spawn_without_runtime_fails() {
        let pipe = ExportPipe::new(ExportConfig::default());
        let err = pipe.spawn(&note("Hi", "World")).unwrap_err();
        assert!(matches!(err, StoreError::Runtime(_)));
        assert_eq!(pipe.active_writers(), 0);
    }

    #[tokio::test]
    async fn test_stream_note() {
        let pipe = ExportPipe::new(ExportConfig::default());
        let stream = pipe.spawn(&note("Hi", "World")).unwrap();
        assert_eq!(stream.note_id(), 7);
        assert_eq!(stream.read_to_string().await.unwrap(), "Hi\n\nWorld\n");
        wait_idle(&pipe).await;
    }

    #[tokio::test]
    async fn test_body_larger_than_buffer() {
        let pipe = ExportPipe::new(ExportConfig {
            buffer_bytes: 16,
            write_timeout_ms: 5000,
        });
        let body = "x".repeat(10_000);
        let stream = pipe.spawn(&note("big", &body)).unwrap();
        let text = stream.read_to_string().await.unwrap();
        assert_eq!(text.len(), "big\n\n".len() + body.len() + 1);
        assert!(text.ends_with("x\n"));
    }

    #[tokio::test]
    async fn test_reader_dropped_early() {
        let pipe = ExportPipe::new(ExportConfig {
            buffer_bytes: 8,
            write_timeout_ms: 5000,
        });
        let stream = pipe.spawn(&note("title", &"y".repeat(1000))).unwrap();
        drop(stream);
        wait_idle(&pipe).await;
    }

    #[tokio::test]
    async fn test_stalled_reader_times_out() {
        let pipe = ExportPipe::new(ExportConfig {
            buffer_bytes: 8,
            write_timeout_ms: 20,
        });
        let _stream = pipe.spawn(&note("title", &"z".repeat(1000))).unwrap();
        assert_eq!(pipe.active_writers(), 1);
        wait_idle(&pipe).await;
    }
}
