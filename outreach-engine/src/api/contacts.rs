//! Contact REST endpoints

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use outreach_common::models::Contact;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/contacts", post(create_contact).get(list_contacts))
}

#[derive(Debug, Deserialize)]
struct CreateContactRequest {
    name: String,
    email: String,
    phone: Option<String>,
    role: Option<String>,
    company: Option<String>,
    location: Option<String>,
    category: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn create_contact(
    State(state): State<AppState>,
    Json(request): Json<CreateContactRequest>,
) -> ApiResult<(StatusCode, Json<Contact>)> {
    if request.name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }
    let email = request.email.trim();
    if !email.contains('@') || email.len() < 3 {
        return Err(ApiError::Validation(format!(
            "{:?} is not a usable email address",
            request.email
        )));
    }
    if db::contacts::get_contact_by_email(&state.db, email).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "a contact with email {} already exists",
            email
        )));
    }

    let mut contact = Contact::new(request.name.trim(), email);
    contact.phone = request.phone.filter(|p| !p.trim().is_empty());
    contact.role = request.role;
    contact.company = request.company;
    contact.location = request.location;
    contact.category = request.category;
    if let Some(language) = request.language.filter(|l| !l.trim().is_empty()) {
        contact.language = language;
    }

    db::contacts::insert_contact(&state.db, &contact).await?;
    Ok((StatusCode::CREATED, Json(contact)))
}

async fn list_contacts(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = page.limit.unwrap_or(50).clamp(1, 200);
    let offset = page.offset.unwrap_or(0).max(0);
    let contacts = db::contacts::list_contacts(&state.db, limit, offset).await?;
    let total = db::contacts::count_contacts(&state.db).await?;
    Ok(Json(json!({ "contacts": contacts, "total": total })))
}
