use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use lambda_http::{run, service_fn, Error, Request};
use stadion_shared::config::Config;
use stadion_shared::dynamo::DynamoStore;
use stadion_shared::s3::S3BlobStore;
use stadion_shared::AppState;
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_http::tracing::init_default_subscriber();

    let config = Config::from_env()?;
    tracing::info!(
        "Starting with table {} bucket {} and {} plans",
        config.table_name,
        config.bucket_name,
        config.plans.len()
    );

    // Initialize AWS clients once at startup
    let aws_config = aws_config::load_from_env().await;
    let store = DynamoStore::new(DynamoClient::new(&aws_config), config.table_name.clone());
    let blobs = S3BlobStore::new(S3Client::new(&aws_config), config.bucket_name.clone());

    let state = AppState::new(store, blobs, config);

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
