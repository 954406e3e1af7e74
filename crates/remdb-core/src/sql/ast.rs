//! Parsed form of the SELECT subset.

use crate::predicate::Predicate;
use crate::types::Order;

/// Similarity form accepted in WHERE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityKind {
    Cosine,
    InnerProduct,
}

/// `<field>.cosine("query text")` / `<field>.inner_product("query text")`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityClause {
    pub field: String,
    pub query_text: String,
    pub kind: SimilarityKind,
}

/// A parsed SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub table: String,
    /// `None` means `SELECT *`.
    pub projection: Option<Vec<String>>,
    /// Structural predicate; in a hybrid query this is the post-filter.
    pub predicate: Option<Predicate>,
    pub similarity: Option<SimilarityClause>,
    pub order_by: Option<(String, Order)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}
