use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;

use crate::error::EngineResult;

/// A single-producer, back-pressured source of byte chunks.
///
/// The replicator calls [`ChunkSource::next_chunk`] once, awaits the write of
/// whatever it returns, and only then calls it again. Demand is implicit in
/// the call/await cadence, so there's no separate `request(n)` API to model.
/// `None` signals end-of-stream. There is deliberately no separate error
/// callback: a source that would otherwise signal failure out-of-band must
/// instead yield `Some(Err(..))` from this method.
#[async_trait]
pub trait ChunkSource: Send {
    async fn next_chunk(&mut self) -> Option<EngineResult<Bytes>>;
}

/// Adapts any `futures_core::Stream` of chunks, the shape an object-store
/// client's download API typically hands back, into a [`ChunkSource`]
/// without pulling in a combinator crate just for `.next()`.
pub struct StreamChunkSource<S> {
    stream: Pin<Box<S>>,
}

impl<S> StreamChunkSource<S>
where
    S: Stream<Item = EngineResult<Bytes>> + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: Box::pin(stream),
        }
    }
}

#[async_trait]
impl<S> ChunkSource for StreamChunkSource<S>
where
    S: Stream<Item = EngineResult<Bytes>> + Send,
{
    async fn next_chunk(&mut self) -> Option<EngineResult<Bytes>> {
        std::future::poll_fn(|cx| self.stream.as_mut().poll_next(cx)).await
    }
}
