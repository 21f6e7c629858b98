use axum::{
    extract::{Extension, State},
    routing::get,
    Json, Router,
};
use dispatch_core::validation::validate_enum;
use dispatch_core::{Language, ValidationErrors};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppJson};
use crate::middleware::Claims;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguagePreference {
    pub language: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/preferences/language", get(get_language).put(set_language))
}

/// Falls back to the default language when nothing was saved.
async fn get_language(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<LanguagePreference>, AppError> {
    let language = state.preferences.get_language(claims.sub).await?.unwrap_or_default();
    Ok(Json(LanguagePreference {
        language: language.code().to_string(),
    }))
}

async fn set_language(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<LanguagePreference>,
) -> Result<Json<LanguagePreference>, AppError> {
    let code = req.language.trim().to_ascii_lowercase();
    ValidationErrors::collect([validate_enum(&code, "language", &Language::ALL)])?;
    let language: Language = code
        .parse()
        .map_err(|e: dispatch_core::language::UnsupportedLanguage| AppError::BadRequest(e.to_string()))?;

    state.preferences.set_language(claims.sub, language).await?;
    Ok(Json(LanguagePreference {
        language: language.code().to_string(),
    }))
}
