use tunnelwatch_core::unix_secs_now;

use super::{Engine, EngineArgs, fail, make_engine, make_runtime};

/// Collect one cycle (two with `rates`) and return the store as JSON.
pub async fn probe(engine: &mut Engine, rates: bool) -> serde_json::Result<String> {
    engine.collector.collect_cycle(unix_secs_now()).await;
    if rates {
        tokio::time::sleep(engine.config.interval()).await;
        engine.collector.collect_cycle(unix_secs_now()).await;
    }
    serde_json::to_string_pretty(&engine.store.view())
}

pub fn run(args: &EngineArgs, rates: bool) {
    let mut engine = make_engine(args);
    let rt = make_runtime();
    match rt.block_on(probe(&mut engine, rates)) {
        Ok(json) => println!("{json}"),
        Err(e) => fail(e),
    }
}
