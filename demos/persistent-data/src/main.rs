use bytes::Bytes;
use futures::executor::block_on;
use log::LevelFilter;
use serde::Serialize;

use persistent_data_demo::{build_pipeline, PersistentData, VARIABLE_NAME};
use phaseline_core::http::{request_builder, Method};
use phaseline_core::{logging, PhaseError};

#[derive(Serialize)]
struct RequestReport {
    restarts: u32,
    random: Option<i64>,
}

fn main() {
    logging::init_with(Box::new(|| {
        simple_logger::SimpleLogger::new()
            .with_level(LevelFilter::Info)
            .init()
    }));

    let pipeline = build_pipeline().expect("pipeline startup");
    let index = pipeline
        .variables()
        .index_of(VARIABLE_NAME)
        .expect("registered variable");

    let request = request_builder()
        .method(Method::GET)
        .uri("/demo")
        .body(Bytes::new())
        .expect("request");

    let mut ctx = pipeline.begin(request);
    block_on(async {
        pipeline.run_access(&mut ctx).await?;
        // Re-enter the access phase the way an internal redirect would.
        pipeline.redirect(&mut ctx).await?;
        pipeline.run_log(&mut ctx).await;
        Ok::<_, PhaseError>(())
    })
    .expect("request flow");

    let report = RequestReport {
        restarts: ctx.restarts(),
        random: ctx.slot::<PersistentData>(index).map(|pd| pd.random),
    };
    println!(
        "{}",
        serde_json::to_string(&report).expect("serialize report")
    );
}
