use actix_web::{middleware::Logger, web, App, HttpServer};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use memberpass_backend::{
    config::Config,
    database::{create_connection, run_migrations},
    handlers,
    middlewares::create_cors,
    services::{EmailNotificationService, MemberService, PassService},
    swagger::swagger_config,
    wallet::{ApplePassBuilder, GooglePassBuilder, ServiceAccountKey, WalletObjectsClient},
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    let config = Config::from_toml().expect("Failed to load configuration file");

    let db = create_connection(&config.database)
        .await
        .expect("Failed to connect to the database");

    run_migrations(&db)
        .await
        .expect("Failed to run database migrations");

    // Wallet platform clients
    let apple_builder = Arc::new(ApplePassBuilder::new(
        config.apple.clone(),
        config.branding.clone(),
    ));

    let service_account = ServiceAccountKey::from_file(&config.google.service_account_file)
        .expect("Failed to load the Google Wallet service account");
    let objects_client = WalletObjectsClient::new(&config.google, service_account.clone())
        .expect("Failed to build the Google Wallet API client");
    let google_builder = Arc::new(
        GooglePassBuilder::new(
            Arc::new(objects_client),
            config.google.clone(),
            config.branding.clone(),
            &service_account,
        )
        .expect("Failed to build the Google Wallet pass builder"),
    );

    // Services
    let member_service = MemberService::new(db.clone(), config.branding.clone());
    let pass_service = PassService::new(db.clone(), apple_builder, google_builder);
    let email_service = EmailNotificationService::new(db.clone(), config.branding.clone());

    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .app_data(web::Data::new(member_service.clone()))
            .app_data(web::Data::new(pass_service.clone()))
            .app_data(web::Data::new(email_service.clone()))
            .configure(swagger_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::member_config)
                    .configure(handlers::pass_config)
                    .configure(handlers::admin_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
