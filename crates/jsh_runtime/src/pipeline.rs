//! Protected execution of one script unit.

use std::ffi::CString;
use std::fmt;
use std::io::Write;

use rquickjs::{Ctx, Value, qjs};

use crate::fault::{Fault, guarded, safe_to_string, try_or};
use crate::heap::{EngineHeap, InterruptCause};

/// Borrowed source bytes plus the name they are reported under.
#[derive(Debug, Clone, Copy)]
pub struct ScriptUnit<'a> {
    pub source: &'a [u8],
    pub filename: &'a str,
}

impl<'a> ScriptUnit<'a> {
    pub fn new(source: &'a [u8], filename: &'a str) -> Self {
        Self { source, filename }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Results are printed as `= <value>`.
    Interactive,
    /// Results are discarded without being looked at.
    Batch,
}

/// Output and error streams a run reports to.
pub struct Streams<'a> {
    pub out: &'a mut dyn Write,
    pub err: &'a mut dyn Write,
}

impl<'a> Streams<'a> {
    pub fn new(out: &'a mut dyn Write, err: &'a mut dyn Write) -> Self {
        Self { out, err }
    }

    fn error(&mut self, text: fmt::Arguments<'_>) {
        let _ = self.err.write_fmt(text);
        let _ = self.err.flush();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Compile,
    Runtime,
    Timeout,
    Interrupted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Compile => "compile error",
            FailureKind::Runtime => "runtime error",
            FailureKind::Timeout => "execution timed out",
            FailureKind::Interrupted => "interrupted by debugger",
        })
    }
}

/// Text extracted from a thrown value.
///
/// `headline` is the value's string coercion. `detail` is the `stack`
/// property of a thrown error, verbatim, when it could be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub headline: String,
    pub detail: Option<String>,
}

impl Diagnostic {
    /// The stack when there is one, otherwise the coerced value.
    pub fn text(&self) -> &str {
        self.detail.as_deref().unwrap_or(&self.headline)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.headline)?;
        if let Some(detail) = &self.detail {
            write!(f, "\n{}", detail.trim_end())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub kind: FailureKind,
    pub diagnostic: Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Success,
    Failure(ScriptFailure),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success)
    }
}

/// Compiles and runs `unit` against the global object.
///
/// Nothing the script does escapes as a host error: a throw at any depth is
/// caught, described, written to `streams.err`, and returned as a failure.
/// Every engine value created here is released before returning.
pub fn execute(
    heap: &EngineHeap,
    unit: &ScriptUnit<'_>,
    mode: Mode,
    streams: &mut Streams<'_>,
) -> ExecutionResult {
    let result = heap.with(|ctx| {
        heap.watchdog().start();
        let outcome = guarded(&ctx, || eval_unit(&ctx, unit));
        heap.watchdog().clear();
        let cause = heap.take_interrupt();

        match outcome {
            Ok(value) => {
                if mode == Mode::Interactive {
                    show(&ctx, &value, streams);
                }
                ExecutionResult::Success
            }
            Err(fault) => {
                let failure = describe_failure(&ctx, fault, cause);
                streams.error(format_args!("{}\n", failure.diagnostic));
                ExecutionResult::Failure(failure)
            }
        }
    });
    if let ExecutionResult::Failure(failure) = &result {
        tracing::debug!(file = unit.filename, kind = %failure.kind, "script failed");
    }
    result
}

/// Compiles and runs `unit` as sloppy-mode global code under its own file
/// name. The length is passed explicitly, so NUL bytes inside the source
/// reach the parser like any other character.
fn eval_unit<'js>(ctx: &Ctx<'js>, unit: &ScriptUnit<'_>) -> rquickjs::Result<Value<'js>> {
    let filename = CString::new(unit.filename)?;
    // The parser peeks one byte past the end of its input.
    let mut source = Vec::with_capacity(unit.source.len() + 1);
    source.extend_from_slice(unit.source);
    source.push(0);
    unsafe {
        let raw = qjs::JS_Eval(
            ctx.as_raw().as_ptr(),
            source.as_ptr().cast(),
            unit.source.len() as _,
            filename.as_ptr(),
            qjs::JS_EVAL_TYPE_GLOBAL as _,
        );
        if qjs::JS_IsException(raw) {
            return Err(rquickjs::Error::Exception);
        }
        Ok(Value::from_raw(ctx.clone(), raw))
    }
}

/// Prints the result as `= <text>`. A result whose coercion throws is
/// reported on the error stream instead.
fn show<'js>(ctx: &Ctx<'js>, value: &Value<'js>, streams: &mut Streams<'_>) {
    match guarded(ctx, || value.get::<rquickjs::convert::Coerced<String>>()) {
        Ok(text) => {
            let _ = writeln!(streams.out, "= {}", text.0);
            let _ = streams.out.flush();
        }
        Err(fault) => {
            let reason = match &fault {
                Fault::Thrown(thrown) => safe_to_string(ctx, thrown),
                Fault::Host(e) => e.to_string(),
            };
            let shown = safe_to_string(ctx, value);
            streams.error(format_args!("cannot display result {shown}: {reason}\n"));
        }
    }
}

fn describe_failure<'js>(
    ctx: &Ctx<'js>,
    fault: Fault<'js>,
    cause: Option<InterruptCause>,
) -> ScriptFailure {
    let thrown = match fault {
        Fault::Thrown(thrown) => thrown,
        Fault::Host(e) => {
            return ScriptFailure {
                kind: FailureKind::Runtime,
                diagnostic: Diagnostic {
                    headline: e.to_string(),
                    detail: None,
                },
            };
        }
    };
    let kind = match cause {
        Some(InterruptCause::Timeout) => FailureKind::Timeout,
        Some(InterruptCause::Debugger) => FailureKind::Interrupted,
        None if is_syntax_error(ctx, &thrown) => FailureKind::Compile,
        None => FailureKind::Runtime,
    };
    ScriptFailure {
        kind,
        diagnostic: diagnostic_of(ctx, &thrown),
    }
}

/// Extracts the diagnostic for a thrown value.
///
/// An error object's `stack` is read inside its own fault boundary, since
/// the property may be a getter that throws; on such a failure the plain
/// string coercion of the thrown value is used.
pub fn diagnostic_of<'js>(ctx: &Ctx<'js>, thrown: &Value<'js>) -> Diagnostic {
    let mut headline = safe_to_string(ctx, thrown);
    let detail = if thrown.is_error() {
        thrown.as_object().and_then(|obj| {
            try_or(
                ctx,
                || {
                    if !obj.contains_key("stack")? {
                        return Ok(None);
                    }
                    let stack: Value = obj.get("stack")?;
                    if stack.is_undefined() {
                        return Ok(None);
                    }
                    stack
                        .get::<rquickjs::convert::Coerced<String>>()
                        .map(|s| Some(s.0))
                },
                || None,
            )
        })
    } else {
        None
    };
    if headline.is_empty() && detail.is_none() {
        headline = format!("uncaught {}", thrown.type_name());
    }
    Diagnostic { headline, detail }
}

fn is_syntax_error<'js>(ctx: &Ctx<'js>, thrown: &Value<'js>) -> bool {
    if !thrown.is_error() {
        return false;
    }
    let Some(obj) = thrown.as_object() else {
        return false;
    };
    try_or(
        ctx,
        || obj.get::<_, String>("name").map(|n| n == "SyntaxError"),
        || false,
    )
}
