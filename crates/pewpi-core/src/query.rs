//! Token query semantics.
//!
//! Exact-match equality per field, optional in-memory sort, then skip/limit
//! pagination. No operators, no indexes.

use serde::{Deserialize, Serialize};

use crate::token::Token;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Name,
    Symbol,
    Amount,
    CreatedAt,
    UpdatedAt,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub sort: Option<(SortKey, SortOrder)>,
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl TokenQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn creator(mut self, creator: &str) -> Self {
        self.creator = Some(creator.to_string());
        self
    }

    pub fn sort(mut self, key: SortKey, order: SortOrder) -> Self {
        self.sort = Some((key, order));
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, token: &Token) -> bool {
        if let Some(name) = &self.name
            && token.name != *name
        {
            return false;
        }
        if let Some(symbol) = &self.symbol
            && token.symbol != *symbol
        {
            return false;
        }
        if let Some(creator) = &self.creator
            && token.creator != *creator
        {
            return false;
        }
        true
    }

    /// Filter, sort, paginate.
    pub fn apply(&self, tokens: Vec<Token>) -> Vec<Token> {
        let mut out: Vec<Token> = tokens.into_iter().filter(|t| self.matches(t)).collect();

        if let Some((key, order)) = self.sort {
            out.sort_by(|a, b| {
                let ord = match key {
                    SortKey::Name => a.name.cmp(&b.name),
                    SortKey::Symbol => a.symbol.cmp(&b.symbol),
                    SortKey::Amount => a.amount.cmp(&b.amount),
                    SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
                    SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                };
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            });
        }

        out.into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn token(name: &str, symbol: &str, creator: &str, amount: u64, created_at: u64) -> Token {
        Token {
            id: format!("tok_{created_at}_{symbol}"),
            name: name.to_string(),
            symbol: symbol.to_string(),
            amount,
            creator: creator.to_string(),
            created_at,
            updated_at: created_at,
            metadata: Map::new(),
        }
    }

    fn fixture() -> Vec<Token> {
        vec![
            token("Brain", "BRN", "u1", 100, 10),
            token("Pew", "PEW", "u2", 50, 20),
            token("Brain", "BRN", "u2", 75, 30),
            token("Infinity", "INF", "u1", 25, 40),
        ]
    }

    #[test]
    fn test_empty_query_matches_all() {
        let out = TokenQuery::new().apply(fixture());
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_exact_match_single_field() {
        let out = TokenQuery::new().symbol("BRN").apply(fixture());
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|t| t.symbol == "BRN"));
    }

    #[test]
    fn test_exact_match_multiple_fields() {
        let out = TokenQuery::new().symbol("BRN").creator("u2").apply(fixture());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].creator, "u2");
    }

    #[test]
    fn test_no_partial_matching() {
        let out = TokenQuery::new().name("Brai").apply(fixture());
        assert!(out.is_empty(), "equality only, no prefix matching");
    }

    #[test]
    fn test_sort_descending_by_amount() {
        let out = TokenQuery::new()
            .sort(SortKey::Amount, SortOrder::Descending)
            .apply(fixture());
        let amounts: Vec<u64> = out.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![100, 75, 50, 25]);
    }

    #[test]
    fn test_skip_and_limit() {
        let out = TokenQuery::new()
            .sort(SortKey::CreatedAt, SortOrder::Ascending)
            .skip(1)
            .limit(2)
            .apply(fixture());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].created_at, 20);
        assert_eq!(out[1].created_at, 30);
    }

    #[test]
    fn test_skip_past_end() {
        let out = TokenQuery::new().skip(10).apply(fixture());
        assert!(out.is_empty());
    }

    #[test]
    fn test_limit_zero() {
        let out = TokenQuery::new().limit(0).apply(fixture());
        assert!(out.is_empty());
    }
}
