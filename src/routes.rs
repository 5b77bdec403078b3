use actix_web::{get, post, web::Data, HttpResponse, Responder};
use log::info;
use std::sync::Arc;

use crate::reminders::ReminderPipeline;

#[get("/health")]
pub async fn health() -> impl Responder {
    info!("Health check");
    HttpResponse::Ok()
}

/// Out-of-band tick, same contract as the scheduled one: fire the pipeline
/// and acknowledge immediately, whatever the outcome.
#[post("/run")]
pub async fn run_now(pipeline: Data<Arc<ReminderPipeline>>) -> impl Responder {
    info!("Manual tick requested");
    let pipeline = Arc::clone(pipeline.as_ref());
    tokio::spawn(async move {
        pipeline.run_tick(chrono::Utc::now()).await;
    });
    HttpResponse::Ok()
}
