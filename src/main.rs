use std::{process, sync::Arc};

use frontcache::{
    application::error::AppError,
    cache::{
        CacheConfig, CacheGate, MaintenanceSwitch, RequestContext, Storefront, build_store,
        canonical_string, derive_key,
    },
    config::{self, KeyArgs},
    infra::{
        error::InfraError,
        http::{self, HookState},
        telemetry,
    },
};
use axum::http::Method;
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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Key(args) => run_key(settings, args),
        config::Command::Purge(_) => run_purge(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    if !cache_config.driver.is_shared() {
        warn!(
            driver = %cache_config.driver,
            "hook listener uses a private store; purges will not reach storefront processes"
        );
    }
    let store = build_store(&cache_config);
    let gate = CacheGate::new(cache_config, store, Arc::new(MaintenanceSwitch::default()));

    let router = http::build_hook_router(HookState {
        listener: gate.listener(),
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        addr = %settings.server.addr,
        store = gate.store().name(),
        "hook listener ready"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!("hook listener stopped");
    Ok(())
}

fn run_key(settings: config::Settings, args: KeyArgs) -> Result<(), AppError> {
    if !args.url.starts_with('/') {
        return Err(AppError::validation(format!(
            "url `{}` must start with `/`",
            args.url
        )));
    }

    let ctx = RequestContext::new(Method::GET, args.url).with_storefront(Storefront {
        locale_id: Some(args.lang),
        store_id: Some(args.shop),
        device: args.device.map(Into::into),
        debug: false,
    });

    let split = settings.cache.separate_mobile_and_desktop;
    println!("{}", canonical_string(&ctx, split));
    println!("{}", derive_key(&ctx, split));
    Ok(())
}

async fn run_purge(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let store = build_store(&cache_config);
    let gate = CacheGate::new(cache_config, store, Arc::new(MaintenanceSwitch::default()));

    gate.listener().purge("cli").await?;
    info!(store = gate.store().name(), "page store emptied");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
