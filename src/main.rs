use std::{future::IntoFuture, pin::pin, process, sync::Arc, time::Duration};

use catalog::{
    application::{
        error::AppError,
        products::ProductService,
        repos::{CreateProductParams, HealthRepo, ProductsRepo, ProductsWriteRepo},
        seed,
    },
    cache::{CacheConfig, CacheKeys, ReadThroughCache, build_cache_store},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        telemetry,
    },
};
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::Seed(args) => run_seed(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    if settings.database.run_migrations {
        apply_migrations(&repositories).await?;
    }

    let cache_config = CacheConfig::from(&settings.cache);
    let store = build_cache_store(&cache_config).await;
    let cache = ReadThroughCache::new(store, cache_config.single_flight);

    let reader: Arc<dyn ProductsRepo> = repositories.clone();
    let writer: Arc<dyn ProductsWriteRepo> = repositories.clone();
    let health: Arc<dyn HealthRepo> = repositories.clone();

    let state = ApiState {
        products: Arc::new(ProductService::new(reader, writer)),
        cache,
        keys: CacheKeys::new(cache_config.key_prefix.clone()),
        cache_ttl: cache_config.ttl,
        listing: settings.listing.clone(),
        health,
    };

    let result = serve_http(&settings, state).await;

    repositories.close().await;
    info!(target = "catalog::server", "database pool closed");

    result
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let result = apply_migrations(&repositories).await;
    repositories.close().await;
    result
}

async fn run_seed(settings: config::Settings, args: config::SeedArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    if settings.database.run_migrations {
        apply_migrations(&repositories).await?;
    }

    let batch_size = u64::from(args.batch_size.max(1));
    let mut remaining = args.count;
    let mut inserted = 0_u64;

    info!(
        target = "catalog::seed",
        count = args.count,
        batch_size,
        "Seeding products"
    );

    while remaining > 0 {
        let size = remaining.min(batch_size);
        let batch = seed::random_batch(&mut rand::rng(), size as usize)
            .into_iter()
            .map(CreateProductParams::from)
            .collect();

        match repositories.insert_products(batch).await {
            Ok(rows) => inserted += rows,
            Err(err) => {
                repositories.close().await;
                return Err(AppError::from(err));
            }
        }
        remaining -= size;

        info!(target = "catalog::seed", inserted, "Inserted batch");
    }

    repositories.close().await;
    info!(target = "catalog::seed", inserted, "Seeding finished");
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn apply_migrations(repositories: &PostgresRepositories) -> Result<(), AppError> {
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;
    info!(target = "catalog::server", "migrations applied");
    Ok(())
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state, &settings.cors);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "catalog::server",
        addr = %settings.server.addr,
        "HTTP server listening"
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .into_future();
    let mut server = pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            drain(&mut server, settings.server.graceful_shutdown).await?;
        }
    }

    Ok(())
}

async fn drain<F>(server: &mut F, grace: Duration) -> Result<(), AppError>
where
    F: std::future::Future<Output = std::io::Result<()>> + Unpin,
{
    info!(
        target = "catalog::server",
        grace_seconds = grace.as_secs(),
        "draining in-flight requests"
    );
    match tokio::time::timeout(grace, server).await {
        Ok(result) => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        Err(_) => {
            warn!(
                target = "catalog::server",
                "graceful shutdown timed out, dropping remaining connections"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "catalog::server", error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target = "catalog::server", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!(target = "catalog::server", "received Ctrl+C"),
        () = terminate => info!(target = "catalog::server", "received SIGTERM"),
    }
}
