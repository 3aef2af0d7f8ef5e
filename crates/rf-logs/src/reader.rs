//! Streaming line reader shared by search, tail and the providers

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::ControlFlow;
use std::path::Path;

use crate::error::LogError;

/// Visit each line of a file with its 0-based index
///
/// Invalid UTF-8 is replaced rather than rejected, since log writers crash
/// mid-line often enough. Line terminators are stripped. The visitor can stop
/// the scan early by returning `ControlFlow::Break`. Returns the number of
/// lines visited.
pub(crate) fn for_each_line<F>(file_id: &str, path: &Path, mut visit: F) -> Result<usize, LogError>
where
    F: FnMut(usize, &str) -> ControlFlow<()>,
{
    let file = File::open(path).map_err(|e| LogError::unavailable(file_id, path, e))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::with_capacity(256);
    let mut index = 0;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| LogError::unavailable(file_id, path, e))?;
        if read == 0 {
            break;
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        let line = String::from_utf8_lossy(&buf);
        let flow = visit(index, &line);
        index += 1;
        if flow.is_break() {
            break;
        }
    }

    Ok(index)
}
