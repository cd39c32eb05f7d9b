// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

// Stream processor
//
// Takes the transport byte stream of one streaming call and produces the
// canonical event stream: frame, parse, forward. Malformed fragments are
// logged and skipped; a transport failure is forwarded once and ends the
// stream.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::transport::ByteStream;

use super::decoder::FrameDecoder;
use super::parser::StreamParser;
use super::types::{EventStream, StreamError, StreamEvent};

/// Capacity of the channel between the reader task and the consumer.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Spawn the reader task for one streaming call.
///
/// The task stops when the input ends, the token is cancelled, or the
/// returned stream is dropped.
pub fn event_stream(
    mut input: ByteStream,
    parser: Arc<dyn StreamParser>,
    cancel: CancellationToken,
) -> EventStream {
    let (tx, rx) = mpsc::channel::<Result<StreamEvent, StreamError>>(EVENT_CHANNEL_CAPACITY);

    let parser = parser.session();

    tokio::spawn(async move {
        let mut decoder = FrameDecoder::new(parser.framing());

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                next = input.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    if forward_chunk(&mut decoder, &bytes, parser.as_ref(), &tx)
                        .await
                        .is_err()
                    {
                        return; // Consumer went away
                    }
                }
                Some(Err(e)) => {
                    let _ = tx.send(Err(StreamError::Transport(e.to_string()))).await;
                    return;
                }
                None => break,
            }
        }

        if let Some(group) = decoder.finish() {
            let _ = forward_group(&group, parser.as_ref(), &tx).await;
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

async fn forward_chunk(
    decoder: &mut FrameDecoder,
    bytes: &Bytes,
    parser: &dyn StreamParser,
    tx: &mpsc::Sender<Result<StreamEvent, StreamError>>,
) -> Result<(), ()> {
    let groups = match decoder.push(bytes) {
        Ok(groups) => groups,
        Err(e) => {
            tracing::warn!(error = %e, "discarding oversized stream frame");
            return Ok(());
        }
    };
    for group in groups {
        forward_group(&group, parser, tx).await?;
    }
    Ok(())
}

async fn forward_group(
    group: &str,
    parser: &dyn StreamParser,
    tx: &mpsc::Sender<Result<StreamEvent, StreamError>>,
) -> Result<(), ()> {
    match parser.parse(group) {
        Ok(Some(event)) => tx.send(Ok(event)).await.map_err(|_| ()),
        Ok(None) => Ok(()),
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed stream fragment");
            Ok(())
        }
    }
}
