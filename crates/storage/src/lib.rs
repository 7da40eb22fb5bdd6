use std::collections::HashSet;

use sqlx::{
    migrate::MigrateError, sqlite::SqlitePoolOptions, Row, Sqlite, SqlitePool, Transaction,
};
use thiserror::Error;
use uuid::Uuid;

use jam_core::types::{Association, AssociationPair, CollectionMetadata, Company};

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle to query company records.
    pub fn companies(&self) -> CompanyRepository {
        CompanyRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to query collection records.
    pub fn collections(&self) -> CollectionRepository {
        CollectionRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to query and mutate company↔collection associations.
    pub fn associations(&self) -> AssociationRepository {
        AssociationRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn bind_placeholders(count: usize) -> String {
    let mut list = String::from("?");
    for _ in 1..count {
        list.push_str(", ?");
    }
    list
}

/// Repository used to query company records.
#[derive(Clone)]
pub struct CompanyRepository {
    pool: SqlitePool,
}

impl CompanyRepository {
    /// Fetches one page of companies plus the table-wide count.
    pub async fn fetch_page(&self, offset: i64, limit: i64) -> Result<CompanyPage, CompanyError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM companies")
            .fetch_one(&self.pool)
            .await?;

        let companies = sqlx::query_as::<_, CompanyRow>(
            "SELECT id, company_name FROM companies LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CompanyRow::into_domain)
        .collect();

        Ok(CompanyPage { companies, total })
    }

    /// Looks up the companies matching the provided ids in one pass.
    ///
    /// Ids with no matching row are absent from the result.
    pub async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<Company>, CompanyError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, company_name FROM companies WHERE id IN ({}) ORDER BY id",
            bind_placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, CompanyRow>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(CompanyRow::into_domain).collect())
    }
}

/// One page of companies with the table-wide count.
#[derive(Debug, Clone)]
pub struct CompanyPage {
    pub companies: Vec<Company>,
    pub total: i64,
}

/// Errors that can occur while reading companies.
#[derive(Debug, Error)]
pub enum CompanyError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
struct CompanyRow {
    id: i64,
    company_name: String,
}

impl CompanyRow {
    fn into_domain(self) -> Company {
        Company {
            id: self.id,
            company_name: self.company_name,
        }
    }
}

/// Repository used to query collection records.
#[derive(Clone)]
pub struct CollectionRepository {
    pool: SqlitePool,
}

impl CollectionRepository {
    /// Lists every stored collection in storage-iteration order.
    pub async fn list_all(&self) -> Result<Vec<CollectionMetadata>, CollectionError> {
        let rows = sqlx::query_as::<_, CollectionRow>(
            "SELECT id, collection_name FROM company_collections",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CollectionRow::into_domain).collect()
    }

    /// Fetches a single collection by id, failing when it does not exist.
    pub async fn fetch_by_id(&self, id: Uuid) -> Result<CollectionMetadata, CollectionError> {
        let row = sqlx::query_as::<_, CollectionRow>(
            "SELECT id, collection_name FROM company_collections WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CollectionError::NotFound)?;

        row.into_domain()
    }

    /// Looks up the collections matching the provided ids in one pass.
    pub async fn fetch_by_ids(&self, ids: &[Uuid]) -> Result<Vec<CollectionMetadata>, CollectionError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, collection_name FROM company_collections WHERE id IN ({})",
            bind_placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, CollectionRow>(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(CollectionRow::into_domain).collect()
    }

    /// Finds a collection by its display name.
    pub async fn find_by_name(
        &self,
        name: &str,
    ) -> Result<Option<CollectionMetadata>, CollectionError> {
        let row = sqlx::query_as::<_, CollectionRow>(
            "SELECT id, collection_name FROM company_collections WHERE collection_name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CollectionRow::into_domain).transpose()
    }
}

/// Errors that can occur while reading collections.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("collection not found")]
    NotFound,
    #[error("invalid collection id stored in row: {0}")]
    InvalidId(#[from] uuid::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
struct CollectionRow {
    id: String,
    collection_name: String,
}

impl CollectionRow {
    fn into_domain(self) -> Result<CollectionMetadata, CollectionError> {
        Ok(CollectionMetadata {
            id: Uuid::parse_str(&self.id)?,
            collection_name: self.collection_name,
        })
    }
}

/// Repository for company↔collection association rows.
#[derive(Clone)]
pub struct AssociationRepository {
    pool: SqlitePool,
}

impl AssociationRepository {
    /// Begins a SQLite transaction for a batch mutation.
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Fetches one page of a collection's member company ids plus the full
    /// member count, preserving the join's natural ordering.
    pub async fn member_page(
        &self,
        collection_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<MemberPage, AssociationError> {
        let collection_id = collection_id.to_string();

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) \
               FROM company_collection_associations AS a \
               JOIN companies AS c ON c.id = a.company_id \
              WHERE a.collection_id = ?",
        )
        .bind(&collection_id)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            "SELECT c.id \
               FROM company_collection_associations AS a \
               JOIN companies AS c ON c.id = a.company_id \
              WHERE a.collection_id = ? \
              LIMIT ? OFFSET ?",
        )
        .bind(&collection_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let company_ids = rows.iter().map(|row| row.get("id")).collect();
        Ok(MemberPage { company_ids, total })
    }

    /// Lists every stored association whose company id and collection id both
    /// appear in the provided sets.
    ///
    /// This is the cross-product filter: it is a superset of exact pair
    /// matching and may return pairs that were never requested.
    pub async fn list_cross_product(
        &self,
        company_ids: &[i64],
        collection_ids: &[Uuid],
    ) -> Result<Vec<Association>, AssociationError> {
        if company_ids.is_empty() || collection_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, company_id, collection_id \
               FROM company_collection_associations \
              WHERE company_id IN ({}) AND collection_id IN ({}) \
              ORDER BY id",
            bind_placeholders(company_ids.len()),
            bind_placeholders(collection_ids.len()),
        );
        let mut query = sqlx::query_as::<_, AssociationRow>(&sql);
        for id in company_ids {
            query = query.bind(id);
        }
        for id in collection_ids {
            query = query.bind(id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(AssociationRow::into_domain).collect()
    }

    /// Returns which of the provided companies are members of the collection.
    pub async fn member_ids_of(
        &self,
        collection_id: Uuid,
        company_ids: &[i64],
    ) -> Result<HashSet<i64>, AssociationError> {
        if company_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let sql = format!(
            "SELECT company_id FROM company_collection_associations \
              WHERE collection_id = ? AND company_id IN ({})",
            bind_placeholders(company_ids.len())
        );
        let mut query = sqlx::query(&sql).bind(collection_id.to_string());
        for id in company_ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row.get("company_id")).collect())
    }

    /// Inserts the planned pairs inside the provided transaction.
    ///
    /// A pair that gained a row since the exclusion set was read degrades to
    /// a no-op through the UNIQUE constraint instead of failing the batch.
    pub async fn insert_pairs(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        pairs: &[AssociationPair],
    ) -> Result<(), AssociationError> {
        for pair in pairs {
            sqlx::query(
                "INSERT INTO company_collection_associations (company_id, collection_id) \
                 VALUES (?, ?) \
                 ON CONFLICT (company_id, collection_id) DO NOTHING",
            )
            .bind(pair.company_id)
            .bind(pair.collection_id.to_string())
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    /// Deletes the association rows with the provided ids, returning how many
    /// rows were removed.
    pub async fn delete_by_ids(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        ids: &[i64],
    ) -> Result<u64, AssociationError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "DELETE FROM company_collection_associations WHERE id IN ({})",
            bind_placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let result = query.execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

/// One page of a collection's member company ids with the full member count.
#[derive(Debug, Clone)]
pub struct MemberPage {
    pub company_ids: Vec<i64>,
    pub total: i64,
}

/// Errors that can occur while reading or mutating associations.
#[derive(Debug, Error)]
pub enum AssociationError {
    #[error("invalid collection id stored in row: {0}")]
    InvalidId(#[from] uuid::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
struct AssociationRow {
    id: i64,
    company_id: i64,
    collection_id: String,
}

impl AssociationRow {
    fn into_domain(self) -> Result<Association, AssociationError> {
        Ok(Association {
            id: self.id,
            company_id: self.company_id,
            collection_id: Uuid::parse_str(&self.collection_id)?,
        })
    }
}
