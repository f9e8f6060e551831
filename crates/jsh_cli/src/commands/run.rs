use anyhow::Context as _;
use jsh_alloc::ProviderRegistry;
use jsh_debug::Checkpoint;
use jsh_runtime::{EngineHeap, HostConfig, PluginSet, Streams, load_and_run};

use crate::args::CliArgs;
use crate::commands::{EXIT_FAILURE, EXIT_HEAP, EXIT_OK, debug, repl};

pub(crate) fn run(args: &CliArgs) -> anyhow::Result<i32> {
    let mut config = match &args.config {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::default(),
    };
    args.apply(&mut config);
    tracing::debug!(?config, "host configuration");

    let heap = match EngineHeap::create(
        &ProviderRegistry::standard(),
        &config,
        PluginSet::builtins(),
        &mut std::io::stderr(),
    ) {
        Ok(heap) => heap,
        Err(e) => {
            eprintln!("{e}");
            return Ok(EXIT_HEAP);
        }
    };

    if config.debugger.enabled {
        debug::attach(&heap, config.debugger.addr);
    }

    let code = run_files(&heap, args);
    let repl_result = if code == EXIT_OK && args.wants_repl() {
        repl::repl(&heap).context("reading standard input")
    } else {
        Ok(())
    };

    let report = heap.destroy();
    tracing::debug!(provider = %report.provider, stats = %report.stats, "run finished");
    repl_result.map(|()| code)
}

fn run_files(heap: &EngineHeap, args: &CliArgs) -> i32 {
    let mut out = std::io::stdout();
    let mut err = std::io::stderr();
    for path in &args.files {
        if heap.checkpoint() == Checkpoint::Interrupt {
            eprintln!("run interrupted by debugger before {}", path.display());
            return EXIT_FAILURE;
        }
        if load_and_run(heap, path, &mut Streams::new(&mut out, &mut err)).is_err() {
            return EXIT_FAILURE;
        }
    }
    EXIT_OK
}
