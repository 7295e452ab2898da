use std::process;

use slidepane::{
    application::{
        context::{Collaborators, PresentationContext},
        error::AppError,
        knit::KnitOutcome,
    },
    config,
    infra::{error::InfraError, http, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
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
        config::Command::Export(args) => run_export(settings, args).await,
        config::Command::Knit(args) => run_knit(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let ctx = PresentationContext::new(&settings, Collaborators::system());
    let router = http::build_router(ctx);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "slidepane::serve",
        addr = %settings.server.addr,
        presentation = settings
            .presentation
            .directory
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default(),
        "Listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::from(InfraError::server(err.to_string())))
}

async fn run_export(
    settings: config::Settings,
    args: config::ExportArgs,
) -> Result<(), AppError> {
    let ctx = PresentationContext::new(&settings, Collaborators::system());
    let assembler = ctx.assembler.clone();
    let directory = args.directory;

    let target = tokio::task::spawn_blocking(move || assembler.export_standalone(&directory))
        .await
        .map_err(|err| AppError::unexpected(format!("export task failed: {err}")))??;

    println!("{}", target.display());
    Ok(())
}

async fn run_knit(settings: config::Settings, args: config::KnitArgs) -> Result<(), AppError> {
    let ctx = PresentationContext::new(&settings, Collaborators::system());
    let knit = ctx.knit.clone();
    let file = args.file;

    if !file.is_file() {
        return Err(AppError::validation(format!(
            "`{}` is not a file",
            file.display()
        )));
    }

    let source = file.clone();
    let outcome = tokio::task::spawn_blocking(move || knit.ensure_fresh(&source))
        .await
        .map_err(|err| AppError::unexpected(format!("knit task failed: {err}")))??;

    info!(
        target = "slidepane::knit",
        path = %file.display(),
        outcome = match outcome {
            KnitOutcome::UpToDate => "up_to_date",
            KnitOutcome::Knitted => "knitted",
        },
        "Knit finished"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}
