use std::pin::Pin;
use std::task::{ready, Context, Poll};

use awsign_core::{Error, Result};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;

use super::{EventStreamSigner, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Streaming,
    EndPending,
    Done,
}

pin_project! {
    /// Signs every message of `inner` and encodes it for the wire.
    ///
    /// Once `inner` ends, one signed empty message is yielded before the
    /// stream ends. It is only produced when polled for: dropping the stream
    /// before that never signs it.
    #[derive(Debug)]
    pub struct SignedEventStream<S> {
        #[pin]
        inner: S,
        signer: EventStreamSigner,
        state: State,
        frames_signed: usize,
    }
}

impl<S> SignedEventStream<S> {
    /// Wrap `inner` with `signer`.
    pub fn new(inner: S, signer: EventStreamSigner) -> Self {
        Self {
            inner,
            signer,
            state: State::Streaming,
            frames_signed: 0,
        }
    }

    /// Number of frames signed so far, the end frame included.
    pub fn frames_signed(&self) -> usize {
        self.frames_signed
    }
}

impl<S, E> Stream for SignedEventStream<S>
where
    S: Stream<Item = std::result::Result<Message, E>>,
    E: Into<Error>,
{
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            match *this.state {
                State::Streaming => match ready!(this.inner.as_mut().poll_next(cx)) {
                    Some(Ok(message)) => {
                        let frame = this.signer.sign(&message).and_then(|v| v.to_bytes());
                        if frame.is_err() {
                            *this.state = State::Done;
                        } else {
                            *this.frames_signed += 1;
                        }
                        return Poll::Ready(Some(frame));
                    }
                    Some(Err(err)) => {
                        *this.state = State::Done;
                        return Poll::Ready(Some(Err(err.into())));
                    }
                    None => *this.state = State::EndPending,
                },
                State::EndPending => {
                    *this.state = State::Done;
                    let frame = this.signer.sign_empty().and_then(|v| v.to_bytes());
                    if frame.is_ok() {
                        *this.frames_signed += 1;
                    }
                    return Poll::Ready(Some(frame));
                }
                State::Done => return Poll::Ready(None),
            }
        }
    }
}
