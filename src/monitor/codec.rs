//! Line framing for server output.
//!
//! Wraps [`LinesCodec`] with a maximum line length so a runaway line from the
//! server cannot grow the read buffer without bound. stdout and stderr are
//! framed separately and merged into one stream of lines.
//!
//! A framing error never ends a source: the offending line is skipped with a
//! warning and the pipe keeps draining, so later readiness and `ERROR` lines
//! still reach the monitor.

use std::pin::Pin;

use bytes::BytesMut;
use futures_util::{stream, Stream};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::{AppError, Result};

/// Maximum accepted output line: 1 MiB.
///
/// Longer lines make [`OutputCodec::decode`] return [`AppError::Io`] with
/// `"line too long"`; the codec then discards input up to the next newline.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Initial read buffer capacity per output source.
const READ_CHUNK: usize = 8 * 1024;

/// Merged, line-framed server output.
pub type OutputLines = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Newline-delimited UTF-8 decoder for server output.
///
/// Delegates framing to [`LinesCodec`] with a fixed [`MAX_LINE_BYTES`]
/// limit. Both `\n` and `\r\n` terminators are accepted.
#[derive(Debug)]
pub struct OutputCodec(LinesCodec);

impl OutputCodec {
    /// Create a codec with the [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for OutputCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for OutputCodec {
    type Item = String;
    type Error = AppError;

    /// Decode the next newline-terminated line from `src`.
    ///
    /// Returns `Ok(None)` while `src` holds no complete line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io("line too long: ...")` when the pending line
    /// exceeds [`MAX_LINE_BYTES`]; subsequent calls skip the rest of that
    /// line. Invalid UTF-8 is reported as `AppError::Io` after the line has
    /// been consumed.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    /// Decode the final, possibly unterminated, line at end of input.
    ///
    /// # Errors
    ///
    /// Same error mapping as [`decode`](Self::decode).
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

fn map_codec_error(err: LinesCodecError) -> AppError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Io(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}

/// One output pipe with its read buffer and codec state.
struct LineSource<R> {
    reader: R,
    buf: BytesMut,
    codec: OutputCodec,
    eof: bool,
}

impl<R> LineSource<R>
where
    R: AsyncRead + Unpin,
{
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(READ_CHUNK),
            codec: OutputCodec::new(),
            eof: false,
        }
    }

    /// Next decoded line, or `None` once the pipe is closed and drained.
    async fn next_line(&mut self) -> Option<String> {
        loop {
            let decoded = if self.eof {
                self.codec.decode_eof(&mut self.buf)
            } else {
                self.codec.decode(&mut self.buf)
            };

            match decoded {
                Ok(Some(line)) => return Some(line),
                Ok(None) if self.eof => return None,
                Ok(None) => {}
                Err(err) => {
                    warn!(%err, "server output: skipping undecodable line");
                    continue;
                }
            }

            match self.reader.read_buf(&mut self.buf).await {
                Ok(0) => self.eof = true,
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, "server output: read failed; closing source");
                    self.eof = true;
                }
            }
        }
    }
}

fn source_lines<R>(reader: R) -> impl Stream<Item = String> + Send
where
    R: AsyncRead + Send + Unpin + 'static,
{
    stream::unfold(LineSource::new(reader), |mut source| async move {
        source.next_line().await.map(|line| (line, source))
    })
}

/// Merge stdout and stderr into one line stream that ends when both close.
///
/// Lines that cannot be framed are logged and skipped; the source keeps
/// being read.
pub fn output_lines<O, E>(stdout: O, stderr: E) -> OutputLines
where
    O: AsyncRead + Send + Unpin + 'static,
    E: AsyncRead + Send + Unpin + 'static,
{
    Box::pin(stream::select(source_lines(stdout), source_lines(stderr)))
}
