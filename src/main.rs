use anyhow::Context;
use daemon::{logger, parser, Supervisor, WorkerHandle};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| String::from("config/daemon.yml"));
    let cfg = parser(&path).with_context(|| format!("cannot load config `{path}`"))?;

    logger::logs_tracing(&cfg.log).context("cannot install logger")?;
    std::fs::create_dir_all(&cfg.runtime_root)
        .with_context(|| format!("cannot create runtime root {}", cfg.runtime_root.display()))?;

    let name = cfg.name.clone();
    Supervisor::new(cfg)
        .on_worker_start(heartbeat)
        .run()
        .with_context(|| format!("{name} master start failed"))?;
    Ok(())
}



/*
    @@@
    @heartbeat();
    . Worker body of the bundled binary: builds its own single-threaded tokio runtime after the fork.
    . Logs a heartbeat every five seconds until SIGTERM/SIGINT reaches this worker; SIGQUIT from the master kills it outright.
*/
fn heartbeat(worker: &WorkerHandle) {
    let pid = worker.pid().as_raw();
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(pid, error = %e, "Cannot build worker runtime");
            return;
        }
    };

    rt.block_on(async move {
        let (mut term, mut int) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!(pid, error = %e, "Cannot listen for stop signals");
                return;
            }
        };

        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            tokio::select! {
                _ = ticker.tick() => info!(pid, "worker alive"),
                _ = term.recv() => break,
                _ = int.recv() => break,
            }
        }
        info!(pid, "worker stopping");
    });
}
