use bytes::{Buf, BytesMut};

use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading the `data` payloads of server-sent events from a
/// chunk stream.
///
/// Chunks are buffered as raw bytes and only complete event blocks are
/// decoded, so a character or a `\r\n` pair may be split anywhere.
pub struct Sse {
    buf: BytesMut,
    pending_cr: bool,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: BytesMut::new(),
            pending_cr: false,
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Drain what is already buffered before reading more, a single
            // chunk often carries several events.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                return Ok(None);
            };
            self.push_normalized(&bytes);
        }
    }

    /// Appends `bytes` to the buffer with `\r\n` folded into `\n`. A
    /// trailing `\r` is held back until the next byte is known.
    fn push_normalized(&mut self, bytes: &[u8]) {
        self.buf.reserve(bytes.len());
        for &b in bytes {
            if self.pending_cr {
                self.pending_cr = false;
                if b != b'\n' {
                    self.buf.extend_from_slice(b"\r");
                }
            }
            if b == b'\r' {
                self.pending_cr = true;
            } else {
                self.buf.extend_from_slice(&[b]);
            }
        }
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        // event         = *( comment / field ) end-of-line
        // comment       = colon *any-char end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        //
        // Only `data` fields are collected, other fields are ignored. Blocks
        // without any data (keep-alive comments) are skipped.
        while let Some(eol_idx) =
            self.buf.windows(2).position(|w| w == b"\n\n")
        {
            // A UTF-8 sequence never contains `\n`, so a complete block
            // never ends inside a character.
            let Ok(block) = str::from_utf8(&self.buf[..eol_idx]) else {
                return Err(Error::InvalidPayload);
            };
            let mut data: Option<String> = None;
            for line in block.lines() {
                if line.starts_with(':') {
                    continue;
                }
                let Some((name, value)) = line.split_once(':') else {
                    return Err(Error::InvalidPayload);
                };
                if name != "data" {
                    continue;
                }
                let value = value.strip_prefix(' ').unwrap_or(value);
                match &mut data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => data = Some(value.to_owned()),
                }
            }

            // Consume the bytes from the buffer.
            self.buf.advance(eol_idx + 2);

            if data.is_some() {
                return Ok(data);
            }
        }
        Ok(None)
    }
}
