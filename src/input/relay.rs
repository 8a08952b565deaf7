//! Chunked reads from the producer

use std::future::Future;
use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::shutdown::Shutdown;

/// Read `reader` in chunks of at most `chunk_size` bytes until end of stream
///
/// Every non-empty chunk is handed to `on_chunk` and awaited before the next
/// read. A zero-length read ends the relay, as does `shutdown`. Returns the
/// number of bytes relayed.
pub async fn relay_chunks<R, F, Fut>(
    reader: &mut R,
    chunk_size: usize,
    shutdown: &Shutdown,
    mut on_chunk: F,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    F: FnMut(Bytes) -> Fut,
    Fut: Future<Output = ()>,
{
    let chunk_size = chunk_size.max(1);
    let mut buf = BytesMut::with_capacity(chunk_size);
    let mut total = 0u64;

    loop {
        buf.reserve(chunk_size);
        let mut limited = (&mut buf).limit(chunk_size);

        let n = tokio::select! {
            result = reader.read_buf(&mut limited) => result?,
            _ = shutdown.wait() => return Ok(total),
        };

        if n == 0 {
            return Ok(total);
        }

        total += n as u64;
        on_chunk(buf.split().freeze()).await;
    }
}
