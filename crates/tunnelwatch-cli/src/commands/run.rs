use tokio_util::sync::CancellationToken;

use super::{EngineArgs, fail, make_engine, make_runtime, monitor::dashboard};

/// Dashboard and HTTP exporter over one collector.
pub fn run(args: &EngineArgs, host: &str, port: u16) {
    let engine = make_engine(args);
    let mut app = dashboard(&engine).with_server_url(format!("http://{host}:{port}"));
    let state = engine.app_state();
    let mut collector = engine.collector;
    let cancel = CancellationToken::new();

    let rt = make_runtime();
    let collecting = {
        let cancel = cancel.clone();
        rt.spawn(async move { collector.run(cancel).await })
    };
    let serving = {
        let cancel = cancel.clone();
        let host = host.to_string();
        rt.spawn(async move {
            let served = tunnelwatch_server::run_server(state, &host, port, cancel.clone()).await;
            if let Err(e) = &served {
                log::error!("exporter on {host}:{port} stopped: {e}");
            }
            served
        })
    };

    let result = app.run();
    cancel.cancel();
    let _ = rt.block_on(collecting);
    let served = rt.block_on(serving);

    if let Err(e) = result {
        fail(format!("TUI error: {e}"));
    }
    if let Ok(Err(e)) = served {
        fail(format!("server on {host}:{port}: {e}"));
    }
}
