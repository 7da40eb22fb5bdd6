use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A company row as stored by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub company_name: String,
}

/// A company annotated with its liked status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedCompany {
    pub id: i64,
    pub company_name: String,
    pub liked: bool,
}

/// Identifier and display name of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub id: Uuid,
    pub collection_name: String,
}

/// One page of a collection's members together with the full member count.
///
/// `total` always counts the whole filtered set, never the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionPage {
    pub id: Uuid,
    pub collection_name: String,
    pub companies: Vec<EnrichedCompany>,
    pub total: i64,
}

/// A page of companies with the table-wide count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyBatch {
    pub companies: Vec<EnrichedCompany>,
    pub total: i64,
}

/// A requested company↔collection link, before it has a row identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociationPair {
    pub company_id: i64,
    pub collection_id: Uuid,
}

/// A persisted company↔collection link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub id: i64,
    pub company_id: i64,
    pub collection_id: Uuid,
}

impl Association {
    /// Returns the link as a pair, dropping the row identity.
    pub fn pair(&self) -> AssociationPair {
        AssociationPair {
            company_id: self.company_id,
            collection_id: self.collection_id,
        }
    }
}
