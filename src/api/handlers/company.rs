//! Company documents, reminders, and the insight evaluator.

use crate::AppState;
use crate::api::models::{
    CompanyDocumentRequest, ExpiryQuery, InsightQuery, Pagination, ReminderListQuery,
    ReminderRequest, ReminderUpdateRequest,
};
use crate::db::handlers::{CompanyDocuments, Reminders};
use crate::db::models::{CompanyDocumentRecord, ReminderRecord};
use crate::errors::{Entity, Error};
use crate::insights::InsightReport;
use crate::types::{CompanyDocumentId, ReminderId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

#[utoipa::path(get, path = "/api/company-documents", tag = "company", params(Pagination),
    responses((status = 200, description = "Company documents by expiry", body = Vec<CompanyDocumentRecord>)))]
pub async fn list_company_documents(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<CompanyDocumentRecord>>, Error> {
    Ok(Json(
        CompanyDocuments::list(&state.pool, page.skip, page.limit).await?,
    ))
}

#[utoipa::path(post, path = "/api/company-documents", tag = "company",
    request_body = CompanyDocumentRequest,
    responses((status = 201, description = "Company document created", body = CompanyDocumentRecord)))]
pub async fn create_company_document(
    State(state): State<AppState>,
    Json(request): Json<CompanyDocumentRequest>,
) -> Result<(StatusCode, Json<CompanyDocumentRecord>), Error> {
    let record = CompanyDocuments::create(&state.pool, &request.into()).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(get, path = "/api/company-documents/{id}", tag = "company",
    params(("id" = CompanyDocumentId, Path, description = "Company document id")),
    responses(
        (status = 200, description = "Company document", body = CompanyDocumentRecord),
        (status = 404, description = "Company document not found"),
    ))]
pub async fn get_company_document(
    State(state): State<AppState>,
    Path(id): Path<CompanyDocumentId>,
) -> Result<Json<CompanyDocumentRecord>, Error> {
    let record = CompanyDocuments::get(&state.pool, id).await?.ok_or(Error::NotFound {
        entity: Entity::CompanyDocument,
        id: id.to_string(),
    })?;
    Ok(Json(record))
}

#[utoipa::path(put, path = "/api/company-documents/{id}", tag = "company",
    params(("id" = CompanyDocumentId, Path, description = "Company document id")),
    request_body = CompanyDocumentRequest,
    responses(
        (status = 200, description = "Company document updated", body = CompanyDocumentRecord),
        (status = 404, description = "Company document not found"),
    ))]
pub async fn update_company_document(
    State(state): State<AppState>,
    Path(id): Path<CompanyDocumentId>,
    Json(request): Json<CompanyDocumentRequest>,
) -> Result<Json<CompanyDocumentRecord>, Error> {
    let record = CompanyDocuments::update(&state.pool, id, &request.into())
        .await?
        .ok_or(Error::NotFound {
            entity: Entity::CompanyDocument,
            id: id.to_string(),
        })?;
    Ok(Json(record))
}

#[utoipa::path(delete, path = "/api/company-documents/{id}", tag = "company",
    params(("id" = CompanyDocumentId, Path, description = "Company document id")),
    responses(
        (status = 204, description = "Company document deleted"),
        (status = 404, description = "Company document not found"),
    ))]
pub async fn delete_company_document(
    State(state): State<AppState>,
    Path(id): Path<CompanyDocumentId>,
) -> Result<StatusCode, Error> {
    if CompanyDocuments::delete(&state.pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            entity: Entity::CompanyDocument,
            id: id.to_string(),
        })
    }
}

#[utoipa::path(get, path = "/api/company-documents/expiring", tag = "company", params(ExpiryQuery),
    responses((status = 200, description = "Documents expiring within the horizon", body = Vec<CompanyDocumentRecord>)))]
pub async fn expiring_company_documents(
    State(state): State<AppState>,
    Query(query): Query<ExpiryQuery>,
) -> Result<Json<Vec<CompanyDocumentRecord>>, Error> {
    let horizon = chrono::Utc::now().date_naive() + chrono::Duration::days(query.days.max(0));
    Ok(Json(CompanyDocuments::expiring(&state.pool, horizon).await?))
}

#[utoipa::path(post, path = "/api/company-documents/check-expiry", tag = "company", params(ExpiryQuery),
    responses((status = 200, description = "Expiry scan with reminders created", body = InsightReport)))]
pub async fn check_expiry(
    State(state): State<AppState>,
    Query(query): Query<ExpiryQuery>,
) -> Result<Json<InsightReport>, Error> {
    let report = state.insights.evaluate(query.days, true).await?;
    Ok(Json(report))
}

#[utoipa::path(get, path = "/api/reminders", tag = "reminders", params(ReminderListQuery),
    responses((status = 200, description = "Reminders by due date", body = Vec<ReminderRecord>)))]
pub async fn list_reminders(
    State(state): State<AppState>,
    Query(query): Query<ReminderListQuery>,
) -> Result<Json<Vec<ReminderRecord>>, Error> {
    Ok(Json(
        Reminders::list(&state.pool, query.include_done, query.skip, query.limit).await?,
    ))
}

#[utoipa::path(post, path = "/api/reminders", tag = "reminders", request_body = ReminderRequest,
    responses((status = 201, description = "Reminder created", body = ReminderRecord)))]
pub async fn create_reminder(
    State(state): State<AppState>,
    Json(request): Json<ReminderRequest>,
) -> Result<(StatusCode, Json<ReminderRecord>), Error> {
    let record = Reminders::create(&state.pool, &request.into()).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(put, path = "/api/reminders/{id}", tag = "reminders",
    params(("id" = ReminderId, Path, description = "Reminder id")),
    request_body = ReminderUpdateRequest,
    responses(
        (status = 200, description = "Reminder updated", body = ReminderRecord),
        (status = 404, description = "Reminder not found"),
    ))]
pub async fn update_reminder(
    State(state): State<AppState>,
    Path(id): Path<ReminderId>,
    Json(request): Json<ReminderUpdateRequest>,
) -> Result<Json<ReminderRecord>, Error> {
    let record = Reminders::set_done(&state.pool, id, request.is_done)
        .await?
        .ok_or(Error::NotFound {
            entity: Entity::Reminder,
            id: id.to_string(),
        })?;
    Ok(Json(record))
}

#[utoipa::path(delete, path = "/api/reminders/{id}", tag = "reminders",
    params(("id" = ReminderId, Path, description = "Reminder id")),
    responses(
        (status = 204, description = "Reminder deleted"),
        (status = 404, description = "Reminder not found"),
    ))]
pub async fn delete_reminder(
    State(state): State<AppState>,
    Path(id): Path<ReminderId>,
) -> Result<StatusCode, Error> {
    if Reminders::delete(&state.pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            entity: Entity::Reminder,
            id: id.to_string(),
        })
    }
}

#[utoipa::path(get, path = "/api/reminders/insights", tag = "reminders", params(InsightQuery),
    responses((status = 200, description = "Derived insights", body = InsightReport)))]
pub async fn reminder_insights(
    State(state): State<AppState>,
    Query(query): Query<InsightQuery>,
) -> Result<Json<InsightReport>, Error> {
    let report = state
        .insights
        .evaluate(query.expiry_days, query.auto_create)
        .await?;
    Ok(Json(report))
}
