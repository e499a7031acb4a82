use actix_cors::Cors;
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use futures::{StreamExt, TryStreamExt};
use serde_json::json;
use shared::{FlagRequest, ReviewRequest, ScanResponse, ScanSummary};
use std::time::Duration;
use uuid::Uuid;

use crate::auth::MaybeIdentity;
use crate::classify::model::Model;
use crate::classify::{Classifier, ClassifierBackend};
use crate::db::models::{BreedFilter, SightingFilter};
use crate::db::{DynamoDbRepository, ScanStore};
use crate::error::ApiError;
use crate::geo::{
    parse_client_ip, GeolocationResolver, IpLookupClient, PositionOptions, ReportedPosition,
};
use crate::scan::{
    EventLog, LogObserver, ReviewService, ScanContext, ScanError, ScanImage, ScanOrchestrator,
};
use crate::storage::{AssetStore, S3Service};

/// Where the scan endpoint looks for a location when the device sent none.
#[derive(Clone)]
pub struct LocationSettings {
    pub ip_lookup: IpLookupClient,
    pub device_timeout: Duration,
}

/// Largest image accepted in a multipart upload.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

impl Default for UploadLimit {
    fn default() -> Self {
        Self(S3Service::MAX_IMAGE_BYTES)
    }
}

impl UploadLimit {
    fn from_app(limit: Option<web::Data<UploadLimit>>) -> usize {
        limit.map(|l| *l.get_ref()).unwrap_or_default().0
    }
}

const MAX_TEXT_FIELD_BYTES: usize = 64;

/// CORS has to stay the outermost layer so that auth rejections carry
/// the allow-origin header too.
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "PUT", "OPTIONS"])
        .allowed_headers(vec![
            actix_web::http::header::AUTHORIZATION,
            actix_web::http::header::ACCEPT,
            actix_web::http::header::CONTENT_TYPE,
        ])
        .max_age(3600)
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/scan").route(web::post().to(classify_image)))
        .service(
            web::scope("/api")
                .service(web::resource("/scans").route(
                    web::post().to(create_scan::<ClassifierBackend, S3Service, DynamoDbRepository>),
                ))
                .service(web::resource("/scans/{scan_id}").route(web::get().to(get_scan)))
                .service(
                    web::resource("/scans/{scan_id}/review")
                        .route(web::put().to(review_scan::<DynamoDbRepository>)),
                )
                .service(
                    web::resource("/scans/{scan_id}/flag")
                        .route(web::put().to(flag_scan::<DynamoDbRepository>)),
                )
                .service(web::resource("/breeds").route(web::get().to(list_breeds)))
                .service(web::resource("/sightings").route(web::get().to(list_sightings))),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Multipart scan form: the image plus an optional device position.
#[derive(Debug, Default)]
struct ScanForm {
    image: Option<ScanImage>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f64>,
}

fn malformed(e: impl std::fmt::Display) -> ApiError {
    ApiError::BadRequest(format!("Malformed upload: {}", e))
}

/// Buffers a field, giving up as soon as it grows past `limit` bytes.
async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(malformed)?;
        if data.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge(limit));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn skip_field(field: &mut Field) -> Result<(), ApiError> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(malformed)?;
    }
    Ok(())
}

async fn read_number(field: &mut Field, name: &str) -> Result<Option<f64>, ApiError> {
    let raw = match read_field(field, MAX_TEXT_FIELD_BYTES).await {
        Err(ApiError::PayloadTooLarge(_)) => {
            return Err(ApiError::BadRequest(format!("Field {} is too long", name)));
        }
        other => other?,
    };
    let text = String::from_utf8_lossy(&raw);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse()
        .map(Some)
        .map_err(|_| ApiError::BadRequest(format!("Not a number: {}", text)))
}

async fn read_scan_form(mut payload: Multipart, max_image_bytes: usize) -> Result<ScanForm, ApiError> {
    let mut form = ScanForm::default();

    while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or("upload")
                    .to_string();
                let declared = field
                    .content_type()
                    .map(|mime| mime.essence_str().to_string())
                    .filter(|mime| mime != "application/octet-stream");
                let bytes = read_field(&mut field, max_image_bytes).await?;
                if bytes.is_empty() {
                    continue;
                }
                let mime_type = declared
                    .or_else(|| ScanImage::sniff_mime_type(&bytes).map(str::to_string))
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                form.image = Some(ScanImage::new(bytes, file_name, mime_type));
            }
            "latitude" => form.latitude = read_number(&mut field, &name).await?,
            "longitude" => form.longitude = read_number(&mut field, &name).await?,
            "accuracy" => form.accuracy = read_number(&mut field, &name).await?,
            _ => skip_field(&mut field).await?,
        }
    }

    Ok(form)
}

/// The stub classification endpoint: `{ data, error }` in every case.
async fn classify_image(
    model: web::Data<Model>,
    payload: Multipart,
    limit: Option<web::Data<UploadLimit>>,
) -> HttpResponse {
    let image = match read_scan_form(payload, UploadLimit::from_app(limit)).await {
        Ok(ScanForm {
            image: Some(image), ..
        }) => image,
        Ok(_) => {
            return HttpResponse::BadRequest()
                .json(ScanResponse::failure("No image file provided."));
        }
        Err(e) => {
            log::warn!("Rejected classification upload: {}", e);
            return HttpResponse::build(e.status_code()).json(ScanResponse::failure(e.to_string()));
        }
    };

    match model.inference(&image.bytes).await {
        Ok(predictions) => HttpResponse::Ok().json(ScanResponse::success(predictions)),
        Err(e) => {
            log::error!("Inference failed for {}: {}", image.file_name, e);
            HttpResponse::InternalServerError()
                .json(ScanResponse::failure("Failed to process image."))
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn create_scan<C, S, D>(
    req: HttpRequest,
    payload: Multipart,
    identity: MaybeIdentity,
    limit: Option<web::Data<UploadLimit>>,
    classifier: web::Data<C>,
    assets: web::Data<S>,
    scans: web::Data<D>,
    location: web::Data<LocationSettings>,
) -> Result<HttpResponse, ApiError>
where
    C: Classifier + Clone + 'static,
    S: AssetStore + Clone + 'static,
    D: ScanStore + Clone + 'static,
{
    let form = read_scan_form(payload, UploadLimit::from_app(limit)).await?;
    let image = form
        .image
        .ok_or_else(|| ApiError::BadRequest("No image file provided.".to_string()))?;

    let client_ip = req
        .connection_info()
        .realip_remote_addr()
        .and_then(parse_client_ip);
    let options = PositionOptions {
        timeout: location.device_timeout,
        ..PositionOptions::default()
    };
    let resolver = GeolocationResolver::with_options(
        ReportedPosition::from_parts(form.latitude, form.longitude, form.accuracy),
        location.ip_lookup.locator(client_ip),
        options,
    );
    let fix = match resolver.resolve().await {
        Ok(fix) => Some(fix),
        Err(e) => {
            log::warn!("Continuing scan without a location: {}", e);
            None
        }
    };

    let events = EventLog::new();
    let mut orchestrator = ScanOrchestrator::new(
        classifier.get_ref().clone(),
        assets.get_ref().clone(),
        scans.get_ref().clone(),
    );
    orchestrator.subscribe(LogObserver::new(image.file_name.clone()));
    orchestrator.subscribe(events.clone());

    let context = ScanContext {
        location: fix,
        identity: identity.into_inner(),
    };
    let record = orchestrator.run(&image, context).await?;

    Ok(HttpResponse::Created().json(ScanSummary {
        top_prediction: record.top_prediction(),
        record,
        events: events.snapshot(),
    }))
}

async fn get_scan(
    path: web::Path<Uuid>,
    scans: web::Data<DynamoDbRepository>,
) -> Result<HttpResponse, ApiError> {
    let scan_id = path.into_inner();
    match scans.get_scan(scan_id).await? {
        Some(record) => Ok(HttpResponse::Ok().json(record)),
        None => Err(ScanError::NotFound(scan_id).into()),
    }
}

async fn review_scan<D: ScanStore + Clone + 'static>(
    path: web::Path<Uuid>,
    body: web::Json<ReviewRequest>,
    identity: MaybeIdentity,
    scans: web::Data<D>,
) -> Result<HttpResponse, ApiError> {
    let service = ReviewService::new(scans.get_ref().clone());
    let update = service
        .set_helpful(path.into_inner(), body.is_helpful, identity.0.as_ref())
        .await?;
    Ok(HttpResponse::Ok().json(update))
}

async fn flag_scan<D: ScanStore + Clone + 'static>(
    path: web::Path<Uuid>,
    body: web::Json<FlagRequest>,
    identity: MaybeIdentity,
    scans: web::Data<D>,
) -> Result<HttpResponse, ApiError> {
    let service = ReviewService::new(scans.get_ref().clone());
    let update = service
        .set_flag(
            path.into_inner(),
            body.flag,
            body.reason.as_deref(),
            identity.0.as_ref(),
        )
        .await?;
    Ok(HttpResponse::Ok().json(update))
}

async fn list_breeds(
    query: web::Query<BreedFilter>,
    repo: web::Data<DynamoDbRepository>,
) -> Result<HttpResponse, ApiError> {
    let breeds = repo.list_breeds(&query).await?;
    Ok(HttpResponse::Ok().json(breeds))
}

async fn list_sightings(
    query: web::Query<SightingFilter>,
    repo: web::Data<DynamoDbRepository>,
) -> Result<HttpResponse, ApiError> {
    let sightings = repo.list_sightings(&query).await?;
    Ok(HttpResponse::Ok().json(sightings))
}
