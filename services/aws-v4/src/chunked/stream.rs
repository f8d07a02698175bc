use std::pin::Pin;
use std::task::{ready, Context, Poll};

use awsign_core::{Error, Result};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use pin_project_lite::pin_project;

use super::ChunkEncoder;

pin_project! {
    /// aws-chunked encoding over an async body.
    ///
    /// Input buffers are regrouped into chunks of the prepared size and every
    /// item yielded is one encoded chunk. The last item carries the final
    /// chunk and the trailers. The first error ends the stream.
    #[derive(Debug)]
    pub struct AwsChunkedStream<S> {
        #[pin]
        inner: S,
        encoder: ChunkEncoder,
        chunk_size: usize,
        buf: BytesMut,
        done: bool,
    }
}

impl<S> AwsChunkedStream<S> {
    pub(crate) fn new(inner: S, encoder: ChunkEncoder, chunk_size: usize) -> Self {
        Self {
            inner,
            encoder,
            chunk_size,
            buf: BytesMut::new(),
            done: false,
        }
    }
}

impl<S, E> Stream for AwsChunkedStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<Error>,
{
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }

        loop {
            if this.buf.len() >= *this.chunk_size {
                let chunk = this.buf.split_to(*this.chunk_size);
                let mut out = BytesMut::new();
                let res = this.encoder.encode_chunk(&chunk, &mut out);
                return Poll::Ready(Some(match res {
                    Ok(()) => Ok(out.freeze()),
                    Err(err) => {
                        *this.done = true;
                        Err(err)
                    }
                }));
            }

            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(bs)) => this.buf.extend_from_slice(&bs),
                Some(Err(err)) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(err.into())));
                }
                None => {
                    *this.done = true;
                    let mut out = BytesMut::new();
                    let rest = this.buf.split();
                    let res = this
                        .encoder
                        .encode_chunk(&rest, &mut out)
                        .and_then(|_| this.encoder.finish(&mut out));
                    return Poll::Ready(Some(res.map(|_| out.freeze())));
                }
            }
        }
    }
}
