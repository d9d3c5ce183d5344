use std::{process, sync::Arc};

use serde::Serialize;
use shelfmark::{
    application::{
        content::{ContentService, MutationIntent},
        error::AppError,
        repos::RepoError,
    },
    cache::CacheConfig,
    config::{self, Command, ItemArgs},
    domain::{
        entities::{ContentPatch, ItemId},
        types::ContentType,
    },
    infra::{error::InfraError, http::ApiClient, telemetry},
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

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let client = Arc::new(ApiClient::new(&settings.api)?);
    info!(
        target = "shelfmark::startup",
        base_url = %client.base_url(),
        "API client ready"
    );
    let service = ContentService::new(
        CacheConfig::from(&settings.cache),
        client.clone(),
        client.clone(),
        client,
    );

    let result = dispatch(&service, cli_args.command).await;
    // Let refetches triggered by a settled mutation finish before exiting.
    service.wait_idle().await;
    result
}

async fn dispatch(service: &ContentService, command: Command) -> Result<(), AppError> {
    match command {
        Command::List(args) => {
            let list = service.load_list(args.query_key()).await?;
            print_json(&*list)
        }
        Command::Create(args) => {
            let intent = MutationIntent::Create(args.new_content());
            mutate(service, args.content_type.into(), intent).await
        }
        Command::Update(args) => {
            let patch = args.patch();
            if patch == ContentPatch::default() {
                return Err(AppError::validation("update requires at least one field"));
            }
            let intent = MutationIntent::Update {
                id: ItemId::new(args.id),
                patch,
            };
            mutate(service, args.content_type.into(), intent).await
        }
        Command::Archive(args) => {
            let (content_type, id) = target(args);
            mutate(service, content_type, MutationIntent::Archive { id }).await
        }
        Command::Unarchive(args) => {
            let (content_type, id) = target(args);
            mutate(service, content_type, MutationIntent::Unarchive { id }).await
        }
        Command::Restore(args) => {
            let (content_type, id) = target(args);
            mutate(service, content_type, MutationIntent::Restore { id }).await
        }
        Command::Delete(args) => {
            let permanent = args.permanent;
            let (content_type, id) = target(args.item);
            mutate(service, content_type, MutationIntent::Delete { id, permanent }).await
        }
        Command::Tags => match service.load_tag_usage().await {
            Some(tags) => print_json(&*tags),
            None => Err(RepoError::transport("tag usage could not be loaded").into()),
        },
    }
}

async fn mutate(
    service: &ContentService,
    content_type: ContentType,
    intent: MutationIntent,
) -> Result<(), AppError> {
    let outcome = service.mutate(content_type, intent).await?;
    match outcome.item {
        Some(item) => print_json(&item),
        None => {
            println!("deleted");
            Ok(())
        }
    }
}

fn target(args: ItemArgs) -> (ContentType, ItemId) {
    (args.content_type.into(), ItemId::new(args.id))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value).map_err(InfraError::from)?;
    println!("{out}");
    Ok(())
}
