use tokio_util::sync::CancellationToken;

use super::{EngineArgs, fail, make_engine, make_runtime};

pub fn print_banner(host: &str, port: u16, endpoints: &[String]) {
    let base = format!("http://{host}:{port}");
    println!("tunnelwatch exporter v{}", tunnelwatch_core::VERSION);
    println!("   {base}");
    println!("   monitoring: {}", endpoints.join(", "));
    println!();
    println!("   Endpoints:");
    println!("     GET /                      API index (try: curl {base})");
    println!("     GET /metrics               Current snapshots + history");
    println!("     GET /health                Collector status");
    println!("     GET /endpoints/<name>      Classified current snapshot");
    println!();
    println!("   Examples:");
    println!("     curl {base}/metrics?limit=10");
    if let Some(first) = endpoints.first() {
        println!("     curl {base}/endpoints/{first}");
    }
    println!();
}

pub fn run(args: &EngineArgs, host: &str, port: u16) {
    let engine = make_engine(args);
    let names: Vec<String> = engine.config.endpoints.iter().map(|e| e.name.clone()).collect();
    print_banner(host, port, &names);

    let state = engine.app_state();
    let mut collector = engine.collector;
    let cancel = CancellationToken::new();

    let rt = make_runtime();
    let result = rt.block_on(async {
        let collecting = {
            let cancel = cancel.clone();
            tokio::spawn(async move { collector.run(cancel).await })
        };
        let stop = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    log::info!("interrupt received, shutting down");
                    stop.cancel();
                }
                Err(e) => log::warn!("cannot listen for Ctrl-C: {e}"),
            }
        });

        let served = tunnelwatch_server::run_server(state, host, port, cancel.clone()).await;
        cancel.cancel();
        let _ = collecting.await;
        served
    });

    if let Err(e) = result {
        fail(format!("server on {host}:{port}: {e}"));
    }
}
