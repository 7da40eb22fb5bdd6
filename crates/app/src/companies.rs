use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Query, State},
    Json,
};
use thiserror::Error;
use tracing::error;

use jam_core::types::{CompanyBatch, EnrichedCompany};
use jam_storage::{AssociationError, CollectionError, CompanyError, Database};

use crate::collections::PageQuery;
use crate::problem::ProblemResponse;
use crate::router::AppState;

/// Display name of the seeded collection that backs the liked flag.
pub const LIKED_COLLECTION_NAME: &str = "Liked Companies List";

/// Resolves company records for the provided ids and annotates each with its
/// liked status, preserving the input order.
///
/// A company is liked when it is a member of the liked-list collection; when
/// that collection is absent every company reports `liked: false`.
pub async fn fetch_companies_with_liked(
    storage: &Database,
    company_ids: &[i64],
) -> Result<Vec<EnrichedCompany>, EnrichmentError> {
    let companies = storage.companies().fetch_by_ids(company_ids).await?;
    let mut by_id: HashMap<i64, _> = companies
        .into_iter()
        .map(|company| (company.id, company))
        .collect();

    let liked = match storage
        .collections()
        .find_by_name(LIKED_COLLECTION_NAME)
        .await?
    {
        Some(collection) => {
            storage
                .associations()
                .member_ids_of(collection.id, company_ids)
                .await?
        }
        None => HashSet::new(),
    };

    Ok(company_ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .map(|company| {
            let liked = liked.contains(&company.id);
            EnrichedCompany {
                id: company.id,
                company_name: company.company_name,
                liked,
            }
        })
        .collect())
}

/// Errors that can occur while enriching companies with liked status.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("failed to load companies: {0}")]
    Company(#[from] CompanyError),
    #[error("failed to resolve the liked collection: {0}")]
    Collection(#[from] CollectionError),
    #[error("failed to load liked memberships: {0}")]
    Association(#[from] AssociationError),
}

/// `GET /companies` — one page of companies with liked annotations and the
/// table-wide count.
pub async fn list_companies(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<CompanyBatch>, ProblemResponse> {
    let (offset, limit) = page.resolve()?;
    let storage = state.storage();

    let page = storage
        .companies()
        .fetch_page(offset, limit)
        .await
        .map_err(|err| {
            error!(stage = "companies", %err, "failed to load company page");
            ProblemResponse::internal("storage operation failed")
        })?;

    let ids: Vec<i64> = page.companies.iter().map(|company| company.id).collect();
    let companies = fetch_companies_with_liked(storage, &ids)
        .await
        .map_err(|err| {
            error!(stage = "companies", %err, "failed to enrich company page");
            ProblemResponse::internal("storage operation failed")
        })?;

    Ok(Json(CompanyBatch {
        companies,
        total: page.total,
    }))
}
