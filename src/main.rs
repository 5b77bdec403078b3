// A small service that delivers scheduled medication reminders through
// Firebase Cloud Messaging for the senior-care PWA -- checks once per minute
// which schedules are due and sends one multicast push per medication.
mod authtoken;
mod util;
mod models;
mod store;
mod firestore;
mod fcm;
mod reminders;
mod routes;
mod timing;

use actix_web::{HttpResponse, HttpServer, App, web::{self, Data}};
use dotenv::dotenv;
use log::{info, error};
use std::{sync::Arc, process::exit, env};
use tokio::{sync::RwLock, time::Duration};

use util::{HOST, PORT, VAR_PROJECT_ID, VAR_SA_EMAIL, VAR_SA_KEY_PATH, VAR_FCM_SERVER_KEY};
use authtoken::AuthToken;
use fcm::FcmClient;
use firestore::FirestoreClient;
use reminders::ReminderPipeline;
use routes::{health, run_now};
use timing::start_reminder_loop;

/// Log sends instead of delivering them (FCM's `dry_run` flag).
pub const DRY_RUN: bool = false;

pub const LOG_CONFIG_PATH: &str = "log4rs.yaml";

const AUTH_TOKEN_REFRESH_RATE_S: u64 = 60 * 50; // Access tokens expire after 60 minutes

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    let check = util::check_environment_vars();
    if check.is_err() {
        eprintln!("Missing environment variable");
        eprintln!("Required environment variables: {VAR_PROJECT_ID} {VAR_SA_EMAIL} {VAR_SA_KEY_PATH} {VAR_FCM_SERVER_KEY}");
        exit(1)
    }
    util::init_logging();

    let auth_token = match AuthToken::new().await {
        Ok(auth_token) => Arc::new(RwLock::new(auth_token)),
        Err(e) => {
            error!("Failed to obtain the initial access token: {:?}", e);
            exit(1)
        }
    };
    info!("Initial access token obtained");

    let store = Arc::new(FirestoreClient::new(Arc::clone(&auth_token)));
    let push = Arc::new(FcmClient::new());
    let pipeline = Arc::new(ReminderPipeline::new(store, push));
    let pipeline_data = Data::new(Arc::clone(&pipeline));

    let reminder_loop_handle = tokio::spawn(start_reminder_loop(Arc::clone(&pipeline)));
    let refresh_loop_handle = tokio::spawn(auth_token_refresh_loop(Arc::clone(&auth_token)));

    let host = env::var(HOST).unwrap_or(String::from("127.0.0.1"));
    let port = env::var(PORT).unwrap_or(String::from("9898"));

    let server_handle = HttpServer::new(move || {
        let json_cfg = web::JsonConfig::default()
            .error_handler(|err, _req| {
                error!("Json config error: {}", err);
                actix_web::error::InternalError::from_response(err, HttpResponse::Conflict().into()).into()
            });
        App::new()
            .app_data(Data::clone(&pipeline_data))
            .app_data(json_cfg)
            .service(run_now)
            .service(health)
    })
        .bind(format!("{}:{}", host, port))?
        .run();

    tokio::select! {
        _ = server_handle => {}
        _ = reminder_loop_handle => {}
        _ = refresh_loop_handle => {}
    }
    Ok(())
}

async fn auth_token_refresh_loop(auth_token: Arc<RwLock<AuthToken>>) {
    loop {
        tokio::time::sleep(Duration::from_secs(AUTH_TOKEN_REFRESH_RATE_S)).await;
        let result = auth_token.write().await.refresh().await;
        match result {
            Ok(_) => info!("AuthToken refreshed successfully"),
            Err(e) => error!("AuthToken refresh error {:?}", e),
        }
    }
}
