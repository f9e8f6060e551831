pub(crate) mod debug;
pub(crate) mod repl;
pub(crate) mod run;

pub(crate) const EXIT_OK: i32 = 0;
pub(crate) const EXIT_FAILURE: i32 = 1;
pub(crate) const EXIT_HEAP: i32 = 3;
