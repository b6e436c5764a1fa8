use actix_web::{post, web, HttpRequest, HttpResponse};
use log::info;

use crate::{
    api::auth::{check_token, header_token, TOKEN_HEADER},
    config::Settings,
    run::run_with_reqwest,
};

/// Download both CQC exports now.  Answers with the run envelope even when
/// every download failed.
#[post("/run")]
pub async fn api_run(
    req: HttpRequest,
    settings: web::Data<Settings>,
) -> actix_web::Result<HttpResponse> {
    check_token(settings.run_token.as_deref(), header_token(&req), TOKEN_HEADER)?;

    let settings = settings.into_inner();
    // the blocking client has to stay off the async workers
    let res = web::block(move || run_with_reqwest(&settings)).await?;
    info!("Run finished with status={}", res.status);
    Ok(HttpResponse::Ok().json(res.envelope()))
}
