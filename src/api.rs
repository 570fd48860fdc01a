use actix_web::{HttpResponse, ResponseError, http::StatusCode, web};
use serde::Deserialize;
use serde_json::json;

use crate::admin::save_settings;
use crate::errors::{Error, Result, ValidationErrors};
use crate::rate_cache::{RateCache, filter_by_selection};
use crate::settings::{MAX_RANGE_DAYS, SettingsForm};

pub const CHART_TITLE: &str = "Currency Exchange Rates";

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Source(_) => StatusCode::BAD_GATEWAY,
            Error::Database(_) | Error::Lock(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Error::Validation(fields) => json!({ "error": "Invalid settings", "fields": fields }),
            other => {
                log::error!("Request failed: {}", other);
                json!({ "error": other.to_string() })
            }
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/rates", web::get().to(rates))
        .route("/rates/chart", web::get().to(chart))
        .route("/currencies", web::get().to(currencies))
        .route("/source/validate", web::post().to(validate_source))
        .route("/source/preview", web::get().to(preview_source))
        .route("/settings", web::get().to(get_settings))
        .route("/settings", web::put().to(put_settings));
}

#[derive(Debug, Deserialize)]
struct RatesQuery {
    days: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct UriQuery {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UriBody {
    #[serde(default)]
    uri: String,
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn rates(cache: web::Data<RateCache>, query: web::Query<RatesQuery>) -> Result<HttpResponse> {
    let settings = cache.settings().await?;
    let days = query.days.unwrap_or(settings.range_days);
    if days > MAX_RANGE_DAYS {
        let mut errors = ValidationErrors::default();
        errors.add("days", format!("must not exceed {}", MAX_RANGE_DAYS));
        return Err(Error::Validation(errors));
    }
    let records = cache.get_by_range(days).await?;
    Ok(HttpResponse::Ok().json(filter_by_selection(records, &settings.active_codes())))
}

async fn chart(cache: web::Data<RateCache>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(cache.chart_data(CHART_TITLE).await?))
}

async fn currencies(cache: web::Data<RateCache>, query: web::Query<UriQuery>) -> Result<HttpResponse> {
    let list = cache.list_available_currencies(query.uri.as_deref()).await?;
    Ok(HttpResponse::Ok().json(list))
}

async fn validate_source(cache: web::Data<RateCache>, body: web::Json<UriBody>) -> HttpResponse {
    HttpResponse::Ok().json(cache.validate_source(&body.uri).await)
}

async fn preview_source(
    cache: web::Data<RateCache>,
    query: web::Query<UriQuery>,
) -> Result<HttpResponse> {
    let uri = match query.uri.as_deref() {
        Some(uri) => uri.to_string(),
        None => cache.settings().await?.source_uri,
    };
    Ok(HttpResponse::Ok().json(cache.preview_source(&uri).await?))
}

async fn get_settings(cache: web::Data<RateCache>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(cache.settings().await?))
}

async fn put_settings(
    cache: web::Data<RateCache>,
    form: web::Json<SettingsForm>,
) -> Result<HttpResponse> {
    let saved = save_settings(&cache, &form).await?;
    for warning in &saved.warnings {
        log::warn!("{}", warning);
    }
    Ok(HttpResponse::Ok().json(saved))
}
