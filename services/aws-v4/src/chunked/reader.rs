use std::io::{self, Read};

use bytes::{Buf, BytesMut};

use super::ChunkEncoder;

/// aws-chunked encoding over a blocking body.
#[derive(Debug)]
pub struct AwsChunkedReader<R> {
    inner: R,
    encoder: ChunkEncoder,
    chunk: Vec<u8>,
    /// Bytes of `chunk` read so far, kept across read errors.
    filled: usize,
    out: BytesMut,
}

impl<R: Read> AwsChunkedReader<R> {
    pub(crate) fn new(inner: R, encoder: ChunkEncoder, chunk_size: usize) -> Self {
        Self {
            inner,
            encoder,
            chunk: vec![0; chunk_size],
            filled: 0,
            out: BytesMut::new(),
        }
    }

    /// Read the next chunk from the body and encode it.
    fn fill(&mut self) -> io::Result<()> {
        let mut eof = false;
        while self.filled < self.chunk.len() {
            match self.inner.read(&mut self.chunk[self.filled..]) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => self.filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        self.encoder
            .encode_chunk(&self.chunk[..self.filled], &mut self.out)?;
        self.filled = 0;
        if eof {
            self.encoder.finish(&mut self.out)?;
        }
        Ok(())
    }
}

impl<R: Read> Read for AwsChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.out.is_empty() {
            if self.encoder.is_finished() {
                return Ok(0);
            }
            self.fill()?;
        }

        let n = buf.len().min(self.out.len());
        buf[..n].copy_from_slice(&self.out[..n]);
        self.out.advance(n);
        Ok(n)
    }
}
