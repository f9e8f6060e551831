use std::io::{self, BufRead, IsTerminal, Write};

use jsh_runtime::{EngineHeap, Mode, ScriptUnit, Streams, execute};

const INPUT_NAME: &str = "input";

/// One line, one unit. Failures are reported and the loop goes on.
pub(crate) fn repl(heap: &EngineHeap) -> io::Result<()> {
    let stdin = io::stdin();
    let prompt = stdin.is_terminal();
    let mut out = io::stdout();
    let mut err = io::stderr();
    let mut line = String::new();
    let mut input = stdin.lock();
    loop {
        if prompt {
            write!(out, "> ")?;
            out.flush()?;
        }
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let src = line.trim_end_matches(['\n', '\r']);
        if src.trim().is_empty() {
            continue;
        }
        let unit = ScriptUnit::new(src.as_bytes(), INPUT_NAME);
        execute(heap, &unit, Mode::Interactive, &mut Streams::new(&mut out, &mut err));
    }
    if prompt {
        writeln!(out)?;
    }
    Ok(())
}
