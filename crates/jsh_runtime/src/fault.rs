//! Fault boundaries around engine calls.
//!
//! A failure inside a boundary never escapes as a host error: a thrown
//! value is taken off the context (clearing the pending exception) and
//! handed back to the caller.

use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Error, Value};

#[derive(Debug)]
pub enum Fault<'js> {
    /// The script (or a getter it installed) threw this value.
    Thrown(Value<'js>),
    /// The binding failed without a pending exception.
    Host(Error),
}

/// Runs `f` and converts an engine exception into [`Fault::Thrown`].
pub fn guarded<'js, T, F>(ctx: &Ctx<'js>, f: F) -> Result<T, Fault<'js>>
where
    F: FnOnce() -> rquickjs::Result<T>,
{
    match f() {
        Ok(v) => Ok(v),
        Err(Error::Exception) => Err(Fault::Thrown(ctx.catch())),
        Err(e) => Err(Fault::Host(e)),
    }
}

/// Try `f`; on any fault, drop it and use `fallback` instead.
pub fn try_or<'js, T, F, G>(ctx: &Ctx<'js>, f: F, fallback: G) -> T
where
    F: FnOnce() -> rquickjs::Result<T>,
    G: FnOnce() -> T,
{
    guarded(ctx, f).unwrap_or_else(|_| fallback())
}

/// String coercion that cannot fail. Values whose `toString` throws (or
/// symbols, which refuse coercion) are described by their type.
pub fn safe_to_string<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> String {
    try_or(
        ctx,
        || value.get::<Coerced<String>>().map(|s| s.0),
        || format!("[unprintable {}]", value.type_name()),
    )
}
