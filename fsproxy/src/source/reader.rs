use std::io::SeekFrom;

use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};

/// Cursor over an append-only file that yields complete lines only.
///
/// Bytes after the last `\n` stay in `pending` until a terminator arrives.
pub(crate) struct LineReader {
    file: File,
    position: u64,
    pending: Vec<u8>,
}

impl LineReader {
    pub fn new(file: File) -> Self {
        Self {
            file,
            position: 0,
            pending: Vec::new(),
        }
    }

    /// Move the cursor to the current end of file so existing content is never replayed.
    pub async fn skip_existing(&mut self) -> std::io::Result<u64> {
        self.position = self.file.seek(SeekFrom::End(0)).await?;
        self.pending.clear();
        Ok(self.position)
    }

    /// Read everything appended since the last call and return the complete lines.
    pub async fn read_lines(&mut self) -> std::io::Result<Vec<String>> {
        let len = self.file.metadata().await?.len();
        if len < self.position {
            log::warn!(
                "input truncated from {} to {} bytes, reading from the start",
                self.position,
                len
            );
            self.position = self.file.seek(SeekFrom::Start(0)).await?;
            self.pending.clear();
        }

        let mut chunk = Vec::new();
        let read = self.file.read_to_end(&mut chunk).await?;
        self.position += read as u64;
        self.pending.extend_from_slice(&chunk);

        Ok(split_lines(&mut self.pending))
    }
}

/// Drain every `\n`-terminated line from `buf`, leaving the unterminated tail.
fn split_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let Some(last) = buf.iter().rposition(|b| *b == b'\n') else {
        return Vec::new();
    };
    let rest = buf.split_off(last + 1);
    let complete = std::mem::replace(buf, rest);

    complete[..last]
        .split(|b| *b == b'\n')
        .map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            String::from_utf8_lossy(line).into_owned()
        })
        .collect()
}
