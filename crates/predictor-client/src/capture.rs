//! Bounded capture of a child process output stream.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::PredictorError;

/// Read `reader` to EOF into memory, failing once more than `limit` bytes arrive.
///
/// `stream` names the pipe ("stdout" / "stderr") in the overflow error.
pub async fn read_capped<R>(
    reader: R,
    limit: usize,
    stream: &'static str,
) -> Result<Vec<u8>, PredictorError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)
        .await?;

    if buf.len() > limit {
        return Err(PredictorError::OutputOverflow { stream, limit });
    }
    Ok(buf)
}
