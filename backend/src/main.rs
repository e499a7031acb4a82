use actix_web::{web, App, HttpServer};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use std::env;

use breedscan::auth::{AuthMiddleware, JwtService};
use breedscan::classify::client::HttpClassifier;
use breedscan::classify::config::ClassifierConfig;
use breedscan::classify::model::Model;
use breedscan::classify::ClassifierBackend;
use breedscan::config::AppConfig;
use breedscan::db::DynamoDbRepository;
use breedscan::geo::IpLookupClient;
use breedscan::routes::{configure_routes, cors, LocationSettings, UploadLimit};
use breedscan::storage::S3Service;

fn startup_error(message: String) -> std::io::Error {
    log::error!("{}", message);
    std::io::Error::new(std::io::ErrorKind::Other, message)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = AppConfig::from_env().map_err(|e| startup_error(format!("Configuration error: {}", e)))?;

    // Stub model settings
    let classifier_config = match &config.classifier_config {
        Some(path) => ClassifierConfig::load(path).map_err(|e| {
            startup_error(format!("Failed to load {}: {}", path.display(), e))
        })?,
        None => ClassifierConfig::default(),
    };
    let model = Model::new(classifier_config);

    let classifier = match &config.classifier_url {
        Some(url) => ClassifierBackend::Remote(
            HttpClassifier::new(url)
                .map_err(|e| startup_error(format!("Invalid CLASSIFIER_URL: {}", e)))?,
        ),
        None => ClassifierBackend::Local(model.clone()),
    };
    log::info!("Scans are classified by the {}", classifier.describe());

    // Initialize AWS configuration
    let mut aws_loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &config.aws_region {
        aws_loader = aws_loader.region(Region::new(region.clone()));
    }
    let aws_config = aws_loader.load().await;

    let dynamodb_client = DynamoDbClient::new(&aws_config);
    let s3_client = S3Client::new(&aws_config);

    let db_repo = DynamoDbRepository::new(
        dynamodb_client,
        config.scans_table.clone(),
        config.breeds_table.clone(),
        config.sightings_table.clone(),
    );

    let public_base_url = config.public_asset_base_url.clone().unwrap_or_else(|| {
        S3Service::default_public_base_url(
            &config.s3_bucket,
            aws_config.region().map(|r| r.as_ref()),
        )
    });
    let s3_service = S3Service::new(s3_client, config.s3_bucket.clone(), public_base_url);
    log::info!(
        "Scan images go to bucket '{}', served from {}",
        s3_service.bucket_name(),
        s3_service.public_base_url()
    );

    let ip_lookup = IpLookupClient::new(config.ipinfo_base_url.clone(), config.ipinfo_token.clone())
        .map_err(|e| startup_error(format!("IP lookup client: {}", e)))?;
    if !ip_lookup.is_configured() {
        log::warn!("IPINFO_TOKEN is not set; scans without a device position will have no location");
    }
    let location = LocationSettings {
        ip_lookup,
        device_timeout: config.device_location_timeout,
    };

    let jwt_service = JwtService::new(&config.jwt_secret);
    let auth_middleware = AuthMiddleware::new(jwt_service);

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(auth_middleware.clone())
            .wrap(cors())
            .app_data(web::Data::new(UploadLimit::default()))
            .app_data(web::Data::new(model.clone()))
            .app_data(web::Data::new(classifier.clone()))
            .app_data(web::Data::new(s3_service.clone()))
            .app_data(web::Data::new(db_repo.clone()))
            .app_data(web::Data::new(location.clone()))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
