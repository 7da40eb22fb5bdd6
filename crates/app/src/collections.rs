use std::collections::HashSet;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use metrics::{counter, histogram};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use jam_core::batch;
use jam_core::types::{Association, AssociationPair, CollectionMetadata, CollectionPage};
use jam_storage::CollectionError;

use crate::companies::fetch_companies_with_liked;
use crate::problem::ProblemResponse;
use crate::router::AppState;

pub const DEFAULT_PAGE_LIMIT: i64 = 10;

/// Offset/limit pagination parameters shared by the read endpoints.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl PageQuery {
    /// Applies defaults and validates the range contract.
    pub fn resolve(&self) -> Result<(i64, i64), ProblemResponse> {
        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if offset < 0 {
            return Err(ProblemResponse::new(
                StatusCode::BAD_REQUEST,
                "invalid_offset",
                "offset must be greater than or equal to 0",
            ));
        }
        if limit < 1 {
            return Err(ProblemResponse::new(
                StatusCode::BAD_REQUEST,
                "invalid_limit",
                "limit must be greater than or equal to 1",
            ));
        }
        Ok((offset, limit))
    }
}

fn storage_problem(op: &'static str, err: impl std::fmt::Display) -> ProblemResponse {
    error!(stage = "collections", op, %err, "storage operation failed");
    ProblemResponse::internal("storage operation failed")
}

/// `GET /collections` — id and name of every stored collection.
pub async fn list_collection_metadata(
    State(state): State<AppState>,
) -> Result<Json<Vec<CollectionMetadata>>, ProblemResponse> {
    let collections = state
        .storage()
        .collections()
        .list_all()
        .await
        .map_err(|err| storage_problem("list", err))?;

    counter!("collection_reads_total", "endpoint" => "list", "result" => "ok").increment(1);
    Ok(Json(collections))
}

/// `GET /collections/{collection_id}` — one page of a collection's members,
/// enriched with liked status, plus the full member count.
pub async fn get_collection_by_id(
    State(state): State<AppState>,
    Path(collection_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<Json<CollectionPage>, ProblemResponse> {
    let (offset, limit) = page.resolve()?;
    let storage = state.storage();

    // Resolve the collection up front so an unknown id fails closed instead
    // of producing a page with no name.
    let collection = storage
        .collections()
        .fetch_by_id(collection_id)
        .await
        .map_err(|err| match err {
            CollectionError::NotFound => {
                counter!("collection_reads_total", "endpoint" => "fetch", "result" => "not_found")
                    .increment(1);
                ProblemResponse::not_found("Collection", collection_id)
            }
            other => storage_problem("fetch", other),
        })?;

    let members = storage
        .associations()
        .member_page(collection_id, offset, limit)
        .await
        .map_err(|err| storage_problem("fetch", err))?;

    let companies = fetch_companies_with_liked(storage, &members.company_ids)
        .await
        .map_err(|err| storage_problem("fetch", err))?;

    counter!("collection_reads_total", "endpoint" => "fetch", "result" => "ok").increment(1);
    Ok(Json(CollectionPage {
        id: collection.id,
        collection_name: collection.collection_name,
        companies,
        total: members.total,
    }))
}

/// `POST /collections` — batch create of company↔collection associations.
///
/// Validates every referenced id before any write, skips pairs that already
/// exist, and returns the stored associations covered by the payload's
/// cross product so repeated identical calls return identical bodies.
pub async fn create_batch_associations(
    State(state): State<AppState>,
    Json(payload): Json<Vec<AssociationPair>>,
) -> Result<Json<Vec<Association>>, ProblemResponse> {
    let start = Instant::now();
    let ids = batch::referenced_ids(&payload);
    let company_ids: Vec<i64> = ids.company_ids.iter().copied().collect();
    let collection_ids: Vec<Uuid> = ids.collection_ids.iter().copied().collect();
    let storage = state.storage();

    let found_companies: HashSet<i64> = storage
        .companies()
        .fetch_by_ids(&company_ids)
        .await
        .map_err(|err| storage_problem("create", err))?
        .iter()
        .map(|company| company.id)
        .collect();
    if let Some(missing) = batch::first_missing(&ids.company_ids, &found_companies) {
        counter!("batch_requests_total", "op" => "create", "result" => "company_not_found")
            .increment(1);
        return Err(ProblemResponse::not_found("Company", missing));
    }

    let found_collections: HashSet<Uuid> = storage
        .collections()
        .fetch_by_ids(&collection_ids)
        .await
        .map_err(|err| storage_problem("create", err))?
        .iter()
        .map(|collection| collection.id)
        .collect();
    if let Some(missing) = batch::first_missing(&ids.collection_ids, &found_collections) {
        counter!("batch_requests_total", "op" => "create", "result" => "collection_not_found")
            .increment(1);
        return Err(ProblemResponse::not_found("Collection", missing));
    }

    let associations = storage.associations();
    let existing: HashSet<AssociationPair> = associations
        .list_cross_product(&company_ids, &collection_ids)
        .await
        .map_err(|err| storage_problem("create", err))?
        .iter()
        .map(Association::pair)
        .collect();

    let to_create = batch::plan_creations(&payload, &existing);
    if !to_create.is_empty() {
        let mut tx = associations
            .begin()
            .await
            .map_err(|err| storage_problem("create", err))?;
        associations
            .insert_pairs(&mut tx, &to_create)
            .await
            .map_err(|err| storage_problem("create", err))?;
        tx.commit()
            .await
            .map_err(|err| storage_problem("create", err))?;

        counter!("associations_created_total").increment(to_create.len() as u64);
    }

    // Re-read after the write so the response carries storage-assigned ids,
    // including rows that predate this call.
    let result = associations
        .list_cross_product(&company_ids, &collection_ids)
        .await
        .map_err(|err| storage_problem("create", err))?;

    info!(
        stage = "collections",
        op = "create",
        requested = payload.len(),
        created = to_create.len(),
        "applied batch association create"
    );
    counter!("batch_requests_total", "op" => "create", "result" => "ok").increment(1);
    histogram!("batch_apply_latency_seconds", "op" => "create")
        .record(start.elapsed().as_secs_f64());

    Ok(Json(result))
}

/// `DELETE /collections` — batch delete of company↔collection associations.
///
/// Pairs that are not stored are silently skipped; the response lists the
/// associations that were actually removed, with their former ids.
pub async fn delete_batch_associations(
    State(state): State<AppState>,
    Json(payload): Json<Vec<AssociationPair>>,
) -> Result<Json<Vec<Association>>, ProblemResponse> {
    let start = Instant::now();
    let ids = batch::referenced_ids(&payload);
    let company_ids: Vec<i64> = ids.company_ids.iter().copied().collect();
    let collection_ids: Vec<Uuid> = ids.collection_ids.iter().copied().collect();

    let associations = state.storage().associations();
    let existing = associations
        .list_cross_product(&company_ids, &collection_ids)
        .await
        .map_err(|err| storage_problem("delete", err))?;
    let victims = batch::plan_deletions(existing, &payload);

    if !victims.is_empty() {
        let victim_ids: Vec<i64> = victims.iter().map(|association| association.id).collect();
        let mut tx = associations
            .begin()
            .await
            .map_err(|err| storage_problem("delete", err))?;
        associations
            .delete_by_ids(&mut tx, &victim_ids)
            .await
            .map_err(|err| storage_problem("delete", err))?;
        tx.commit()
            .await
            .map_err(|err| storage_problem("delete", err))?;

        counter!("associations_deleted_total").increment(victims.len() as u64);
    }

    info!(
        stage = "collections",
        op = "delete",
        requested = payload.len(),
        deleted = victims.len(),
        "applied batch association delete"
    );
    counter!("batch_requests_total", "op" => "delete", "result" => "ok").increment(1);
    histogram!("batch_apply_latency_seconds", "op" => "delete")
        .record(start.elapsed().as_secs_f64());

    Ok(Json(victims))
}
