// rest/routes/translate.rs — text translation route.

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::translate::Translation;
use crate::AppContext;

fn default_source() -> String {
    "en".to_string()
}

fn default_target() -> String {
    "zh".to_string()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    pub text: String,
    #[serde(default = "default_source")]
    pub source_lang: String,
    #[serde(default = "default_target")]
    pub target_lang: String,
}

pub async fn translate(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<TranslateRequest>,
) -> Result<Json<Translation>, GatewayError> {
    let translation = ctx
        .translate
        .translate(&body.text, &body.source_lang, &body.target_lang)
        .await?;
    Ok(Json(translation))
}
