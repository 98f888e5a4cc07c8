use actix_web::{
    middleware::{NormalizePath, TrailingSlash},
    web, App, HttpServer,
};
use std::sync::Arc;
use storefront_api::{
    catalog::Catalog,
    config::{AppConfig, EmailBackend},
    configure, configure_media, cors,
    media::MediaStorage,
    notifier::{load_templates, ConsoleMailer, Mailer, Notifier, NotifierSettings, SmtpMailer},
    orders::OrderIntake,
    state::AppState,
    store::MongoStore,
    submissions::Submissions,
};
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{self, EnvFilter};

fn io_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,actix_web=info,storefront_api=debug")),
        )
        .init();

    info!("Starting storefront API server");

    let config = AppConfig::from_env().map_err(|e| io_error("Invalid configuration", e))?;

    let store = Arc::new(
        MongoStore::connect(&config.mongo_uri, &config.database_name)
            .await
            .map_err(|e| io_error("Failed to initialize MongoDB", e))?,
    );
    info!("MongoDB connection established");

    let mailer: Arc<dyn Mailer> = match (config.email_backend, &config.smtp) {
        (EmailBackend::Smtp, Some(smtp)) => Arc::new(
            SmtpMailer::new(smtp).map_err(|e| io_error("Failed to configure SMTP", e))?,
        ),
        _ => Arc::new(ConsoleMailer),
    };
    let templates = load_templates(&config.template_dir)
        .map_err(|e| io_error("Failed to load email templates", e))?;
    let (notifier, _notifier_worker) = Notifier::start(
        mailer,
        templates,
        NotifierSettings {
            from_email: config.default_from_email.clone(),
            max_attempts: config.email_max_attempts,
            retry_backoff: config.email_retry_backoff,
        },
    );

    tokio::fs::create_dir_all(&config.media_root)
        .await
        .map_err(|e| io_error("Failed to create media root", e))?;
    let media = MediaStorage::new(&config.media_root);
    let state = AppState {
        catalog: Catalog::new(store.clone()),
        orders: OrderIntake::new(
            store.clone(),
            store.clone(),
            media,
            notifier.clone(),
            config.admin_email.clone(),
        ),
        submissions: Submissions::new(store.clone(), notifier.clone(), config.admin_email.clone()),
        records: store,
        media_url: config.media_url.clone(),
        max_upload_bytes: config.max_upload_bytes,
    };
    let state = web::Data::new(state);
    let origins = config.cors_allowed_origins.clone();
    let media_url = config.media_url.clone();
    let media_root = config.media_root.clone();
    let serve_media = config.serve_media;

    info!("Listening on {}", config.bind_address);
    HttpServer::new(move || {
        App::new()
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .wrap(cors(&origins))
            .wrap(TracingLogger::default())
            .app_data(state.clone())
            .configure(configure)
            .configure(|cfg| {
                if serve_media {
                    configure_media(cfg, &media_url, &media_root);
                }
            })
    })
    .bind(&config.bind_address)?
    .run()
    .await?;

    // Let queued emails go out before exiting.
    notifier.flush().await;
    info!("Server stopped");
    Ok(())
}
