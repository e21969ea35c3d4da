use tokio_util::sync::CancellationToken;

use super::{Engine, EngineArgs, fail, make_engine, make_runtime};
use crate::tui::app::App;

/// Dashboard over `engine`'s store.
pub fn dashboard(engine: &Engine) -> App {
    App::new(
        engine.store.clone(),
        engine.config.endpoint_ids(),
        engine.config.metrics.clone(),
        engine.config.effective_thresholds(),
    )
}

pub fn run(args: &EngineArgs) {
    let engine = make_engine(args);
    let mut app = dashboard(&engine);
    let mut collector = engine.collector;
    let cancel = CancellationToken::new();

    let rt = make_runtime();
    let collecting = {
        let cancel = cancel.clone();
        rt.spawn(async move { collector.run(cancel).await })
    };

    let result = app.run();
    cancel.cancel();
    let _ = rt.block_on(collecting);

    if let Err(e) = result {
        fail(format!("TUI error: {e}"));
    }
}
