use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use clap::error::ErrorKind;
use jsh_alloc::ProviderKind;
use jsh_runtime::{HostConfig, MemoryLimit};

#[derive(Debug, Parser)]
#[command(name = "jsh", version, about = "Run JavaScript files on an embedded engine")]
pub(crate) struct CliArgs {
    /// Host configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Allocator provider: default, logging, torture, hybrid or external
    #[arg(long, value_name = "KIND")]
    pub alloc: Option<ProviderKind>,

    /// Where the logging provider writes its events
    #[arg(long, value_name = "FILE")]
    pub alloc_log: Option<PathBuf>,

    /// Fail every Nth allocation under the torture provider (0 disables)
    #[arg(long, value_name = "N")]
    pub torture_every: Option<u64>,

    /// Raise the engine memory limit to its high preset
    #[arg(long)]
    pub memory_limit_high: bool,

    /// Abort any script running longer than this
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Wait for a debugger to connect before running anything
    #[arg(long)]
    pub debugger: bool,

    /// Address the debugger listener binds to
    #[arg(long, value_name = "ADDR")]
    pub debug_addr: Option<SocketAddr>,

    /// Read lines from stdin and print each result (default without files)
    #[arg(short, long)]
    pub interactive: bool,

    /// Script files, run in order; the first failure stops the run
    #[arg(value_name = "FILES")]
    pub files: Vec<PathBuf>,
}

impl CliArgs {
    pub(crate) fn wants_repl(&self) -> bool {
        self.interactive || self.files.is_empty()
    }

    /// Flags win over the configuration file.
    pub(crate) fn apply(&self, config: &mut HostConfig) {
        if let Some(kind) = self.alloc {
            config.alloc.provider = kind;
        }
        if let Some(path) = &self.alloc_log {
            config.alloc.log_path = path.clone();
        }
        if let Some(n) = self.torture_every {
            config.alloc.torture.fail_every = Some(n);
        }
        if self.memory_limit_high {
            config.limits.memory = MemoryLimit::High;
        }
        if let Some(ms) = self.timeout_ms {
            config.limits.timeout_ms = Some(ms);
        }
        if self.debugger {
            config.debugger.enabled = true;
        }
        if let Some(addr) = self.debug_addr {
            config.debugger.addr = addr;
        }
    }
}

/// Help and version requests exit 0 through clap; anything else is a usage
/// error the caller turns into exit status 1.
pub(crate) fn parse_args() -> Result<CliArgs, clap::Error> {
    match CliArgs::try_parse() {
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<CliArgs, clap::Error> {
        CliArgs::try_parse_from(std::iter::once("jsh").chain(argv.iter().copied()))
    }

    #[test]
    fn flags_override_config() {
        let args = parse(&[
            "--alloc",
            "torture",
            "--torture-every",
            "9",
            "--memory-limit-high",
            "--timeout-ms",
            "100",
            "--debug-addr",
            "127.0.0.1:7000",
            "a.js",
        ])
        .unwrap();
        let mut config = HostConfig::default();
        args.apply(&mut config);
        assert_eq!(config.alloc.provider, ProviderKind::Torture);
        assert_eq!(config.alloc.torture.fail_every, Some(9));
        assert_eq!(config.limits.memory, MemoryLimit::High);
        assert_eq!(config.limits.timeout_ms, Some(100));
        assert_eq!(config.debugger.addr.port(), 7000);
        assert!(!config.debugger.enabled);
        assert!(!args.wants_repl());
    }

    #[test]
    fn no_files_means_repl() {
        assert!(parse(&[]).unwrap().wants_repl());
        assert!(parse(&["-i", "a.js"]).unwrap().wants_repl());
    }

    #[test]
    fn unknown_provider_is_a_usage_error() {
        let err = parse(&["--alloc", "bogus"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }
}
