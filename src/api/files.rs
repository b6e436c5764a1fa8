use std::{ffi::OsStr, io::ErrorKind, path::Path};

use actix_web::{
    error::ErrorInternalServerError,
    get,
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    web, HttpResponse,
};
use log::info;
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;

use crate::{api::auth::check_token, config::Settings};

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    /// Shared secret, e.g. `/files/cqc_homecare_20261016_060000Z.csv?token=...`
    token: Option<String>,
}

/// Download a previously saved CSV file.
#[get("/files/{filename}")]
pub async fn api_get_file(
    path: web::Path<String>,
    query: web::Query<FileQuery>,
    settings: web::Data<Settings>,
) -> actix_web::Result<HttpResponse> {
    check_token(settings.run_token.as_deref(), query.token.as_deref(), "token")?;

    let name = path.into_inner();
    if !is_bare_file_name(&name) {
        return Ok(HttpResponse::BadRequest().json(json!({"detail": "Invalid filename"})));
    }
    let file_path = settings.data_dir.join(&name);
    let file = match tokio::fs::File::open(&file_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(not_found()),
        Err(e) => return Err(ErrorInternalServerError(e)),
    };
    if !file.metadata().await.map_err(ErrorInternalServerError)?.is_file() {
        return Ok(not_found());
    }

    info!("Serving file {}", file_path.display());
    Ok(HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(name)],
        })
        .streaming(ReaderStream::new(file)))
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({"detail": "File not found"}))
}

/// A plain file name: no directories, no parent references, nothing hidden.
pub fn is_bare_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && Path::new(name).file_name() == Some(OsStr::new(name))
}
