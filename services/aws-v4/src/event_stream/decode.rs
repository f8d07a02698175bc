use std::pin::Pin;
use std::task::{ready, Context, Poll};

use awsign_core::{Error, Result};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;

use super::{Message, MessageDecoder};

/// Error sent by the remote peer as an event stream frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct EventStreamError {
    /// `:error-code` or `:exception-type` of the frame.
    pub code: String,
    /// `:error-message`, or the payload of an exception.
    pub message: String,
}

/// Turn error and exception frames into errors.
pub fn check_message(message: Message) -> Result<Message> {
    let header = |name: &str| {
        message
            .header(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let err = match message.header(":message-type").and_then(|v| v.as_str()) {
        Some("error") => Some(EventStreamError {
            code: header(":error-code"),
            message: header(":error-message"),
        }),
        Some("exception") => Some(EventStreamError {
            code: header(":exception-type"),
            message: String::from_utf8_lossy(message.payload()).into_owned(),
        }),
        _ => None,
    };
    let Some(err) = err else {
        return Ok(message);
    };

    Err(Error::stream_frame("received error frame from event stream")
        .with_context(format!("code: {}", err.code))
        .with_source(err))
}

pin_project! {
    /// Decodes a byte stream into messages.
    ///
    /// The first error ends the stream, whether it comes from the body, a
    /// malformed frame, or an error frame sent by the peer.
    #[derive(Debug)]
    pub struct DecodedEventStream<S> {
        #[pin]
        inner: S,
        decoder: MessageDecoder,
        done: bool,
    }
}

impl<S> DecodedEventStream<S> {
    /// Decode messages from `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: MessageDecoder::new(),
            done: false,
        }
    }
}

impl<S, E> Stream for DecodedEventStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<Error>,
{
    type Item = Result<Message>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }

        loop {
            match this.decoder.next_message() {
                Ok(Some(message)) => {
                    let res = check_message(message);
                    *this.done = res.is_err();
                    return Poll::Ready(Some(res));
                }
                Ok(None) => {}
                Err(err) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(err)));
                }
            }

            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(bs)) => this.decoder.push(&bs),
                Some(Err(err)) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(err.into())));
                }
                None => {
                    *this.done = true;
                    if this.decoder.buffered() == 0 {
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(Err(Error::unexpected(
                        "event stream ended in the middle of a message",
                    )
                    .with_context(format!("buffered: {}", this.decoder.buffered())))));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_stream::Header;
    use awsign_core::ErrorKind;
    use futures::{stream, StreamExt};
    use pretty_assertions::assert_eq;

    fn wire(messages: &[Message]) -> Vec<std::io::Result<Bytes>> {
        let bytes: Vec<u8> = messages
            .iter()
            .flat_map(|m| m.to_bytes().expect("message must encode").to_vec())
            .collect();
        bytes
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect()
    }

    #[tokio::test]
    async fn test_error_frame_is_terminal() {
        let messages = [
            Message::new(Bytes::from_static(b"first"))
                .with_header(Header::new(":message-type", "event")),
            Message::new(Bytes::new())
                .with_header(Header::new(":message-type", "error"))
                .with_header(Header::new(":error-code", "ThrottlingException"))
                .with_header(Header::new(":error-message", "slow down")),
            Message::new(Bytes::from_static(b"never"))
                .with_header(Header::new(":message-type", "event")),
        ];
        let mut stream = DecodedEventStream::new(stream::iter(wire(&messages)));

        let first = stream.next().await.expect("event must exist");
        assert_eq!(first.expect("must be event").payload().as_ref(), b"first");

        let err = stream
            .next()
            .await
            .expect("error must exist")
            .expect_err("must be error");
        assert_eq!(err.kind(), ErrorKind::StreamFrame);
        let source = err
            .source_ref()
            .and_then(|e| e.downcast_ref::<EventStreamError>())
            .expect("source must be EventStreamError");
        assert_eq!(
            source,
            &EventStreamError {
                code: "ThrottlingException".to_string(),
                message: "slow down".to_string(),
            }
        );
        assert!(!err.is_retryable());

        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_exception_frame_uses_payload() {
        let message = Message::new(Bytes::from_static(b"{\"Message\":\"bad audio\"}"))
            .with_header(Header::new(":message-type", "exception"))
            .with_header(Header::new(":exception-type", "BadRequestException"));

        let err = check_message(message).expect_err("must be error");
        let source = err
            .source_ref()
            .and_then(|e| e.downcast_ref::<EventStreamError>())
            .expect("source must be EventStreamError");
        assert_eq!(source.code, "BadRequestException");
        assert_eq!(source.message, "{\"Message\":\"bad audio\"}");
    }

    #[tokio::test]
    async fn test_truncated_stream() {
        let mut chunks = wire(&[Message::new(Bytes::from_static(b"cut"))]);
        chunks.pop();
        let mut stream = DecodedEventStream::new(stream::iter(chunks));

        let err = stream
            .next()
            .await
            .expect("error must exist")
            .expect_err("must be error");
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert!(stream.next().await.is_none());
    }
}
