//! Native functions exposed to scripts.

use std::io::Write;

use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function};

/// A native extension installed into the global object when the heap is
/// created. `cleanup` runs once, before the heap is torn down.
pub trait Plugin {
    fn name(&self) -> &str;

    fn register<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<()>;

    fn cleanup(&self) {}
}

#[derive(Default)]
pub struct PluginSet {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The set every host run starts with.
    pub fn builtins() -> Self {
        let mut set = Self::new();
        set.add(PrintPlugin);
        set
    }

    pub fn add<P: Plugin + 'static>(&mut self, plugin: P) -> &mut Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub(crate) fn install<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<()> {
        for plugin in &self.plugins {
            plugin.register(ctx)?;
            tracing::debug!(plugin = plugin.name(), "plugin registered");
        }
        Ok(())
    }

    pub(crate) fn cleanup(&self) {
        for plugin in self.plugins.iter().rev() {
            plugin.cleanup();
        }
    }
}

impl std::fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// `print(...args)`: writes the arguments, coerced to strings and joined by
/// spaces, as one line on standard output.
pub struct PrintPlugin;

impl Plugin for PrintPlugin {
    fn name(&self) -> &str {
        "print"
    }

    fn register<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<()> {
        let print = Function::new(ctx.clone(), |args: Rest<Coerced<String>>| {
            let line = args
                .0
                .iter()
                .map(|a| a.0.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{line}");
            let _ = out.flush();
        })?;
        ctx.globals().set("print", print)
    }
}
