use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::pipeline::{ExecutionResult, Mode, ScriptUnit, Streams, execute};
use crate::{EngineHeap, LoadError};

/// Reads `path` whole and runs it in batch mode.
///
/// Every error is reported on `streams.err` as one flushed line before it is
/// returned. The buffer lives for the duration of this call only.
pub fn load_and_run(
    heap: &EngineHeap,
    path: &Path,
    streams: &mut Streams<'_>,
) -> Result<(), LoadError> {
    let name = path.display().to_string();
    let result = run_file(heap, path, &name, streams);
    if let Err(e) = &result {
        let _ = writeln!(streams.err, "{e}");
        let _ = streams.err.flush();
    }
    result
}

fn run_file(
    heap: &EngineHeap,
    path: &Path,
    name: &str,
    streams: &mut Streams<'_>,
) -> Result<(), LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        name: name.to_string(),
        source,
    })?;
    run_reader(heap, file, name, streams)
}

fn run_reader<R: Read + Seek>(
    heap: &EngineHeap,
    mut reader: R,
    name: &str,
    streams: &mut Streams<'_>,
) -> Result<(), LoadError> {
    let source = read_sized(&mut reader, name).map_err(|source| LoadError::Read {
        name: name.to_string(),
        source,
    })?;

    heap.script_started(name);
    let result = execute(heap, &ScriptUnit::new(&source, name), Mode::Batch, streams);
    heap.script_finished(name, result.is_success());
    match result {
        ExecutionResult::Success => Ok(()),
        ExecutionResult::Failure(failure) => Err(LoadError::Execution {
            name: name.to_string(),
            kind: failure.kind,
        }),
    }
}

/// Sizes the buffer from the stream length; a short read keeps what arrived.
fn read_sized<R: Read + Seek>(reader: &mut R, name: &str) -> io::Result<Vec<u8>> {
    let len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
    reader.take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        tracing::debug!(file = name, expected = len, read = buf.len(), "short read");
    }
    Ok(buf)
}
