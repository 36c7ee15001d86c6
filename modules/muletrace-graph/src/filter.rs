use muletrace_common::{EntityKind, MuletraceError};
use neo4rs::Query;
use serde::{Deserialize, Serialize};

/// Declarative filter specification for graph queries. Every populated
/// field contributes one clause; clauses combine with AND. An empty
/// specification matches everything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphFilter {
    #[serde(default)]
    pub entity_kinds: Vec<EntityKind>,
    #[serde(default)]
    pub banks: Vec<String>,
    #[serde(default)]
    pub wallet_providers: Vec<String>,
    #[serde(default)]
    pub currencies: Vec<String>,
    #[serde(default)]
    pub phone_providers: Vec<String>,
    #[serde(default = "priority_min_default")]
    pub priority_min: i64,
    #[serde(default = "priority_max_default")]
    pub priority_max: i64,
    #[serde(default)]
    pub search: Option<String>,
}

fn priority_min_default() -> i64 {
    0
}

fn priority_max_default() -> i64 {
    100
}

impl Default for GraphFilter {
    fn default() -> Self {
        Self {
            entity_kinds: Vec::new(),
            banks: Vec::new(),
            wallet_providers: Vec::new(),
            currencies: Vec::new(),
            phone_providers: Vec::new(),
            priority_min: 0,
            priority_max: 100,
            search: None,
        }
    }
}

/// A parameter value bound into a compiled filter clause.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterParam {
    Str(String),
    Int(i64),
    StrList(Vec<String>),
}

/// The selection predicate a filter compiles into: a Cypher WHERE fragment
/// over an `entity` alias plus its bound parameters.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pub clause: String,
    pub params: Vec<(String, FilterParam)>,
}

impl CompiledFilter {
    /// Bind this filter's parameters onto a query.
    pub fn apply(&self, mut q: Query) -> Query {
        for (name, value) in &self.params {
            q = match value {
                FilterParam::Str(s) => q.param(name.as_str(), s.as_str()),
                FilterParam::Int(i) => q.param(name.as_str(), *i),
                FilterParam::StrList(l) => q.param(name.as_str(), l.clone()),
            };
        }
        q
    }
}

impl GraphFilter {
    /// Reject malformed specifications before any query runs.
    pub fn validate(&self) -> Result<(), MuletraceError> {
        if !(0..=100).contains(&self.priority_min) || !(0..=100).contains(&self.priority_max) {
            return Err(MuletraceError::MalformedFilter(format!(
                "priority bounds must lie in 0..=100, got {}..{}",
                self.priority_min, self.priority_max
            )));
        }
        if self.priority_min > self.priority_max {
            return Err(MuletraceError::MalformedFilter(format!(
                "priority_min {} exceeds priority_max {}",
                self.priority_min, self.priority_max
            )));
        }
        Ok(())
    }

    /// Label restriction for the `entity` alias. Unrestricted filters still
    /// need the guard so that Site nodes never match an entity pattern.
    pub fn label_guard(&self) -> String {
        let kinds: &[EntityKind] = if self.entity_kinds.is_empty() {
            &EntityKind::ALL
        } else {
            &self.entity_kinds
        };
        let labels: Vec<String> = kinds.iter().map(|k| format!("entity:{}", k.label())).collect();
        format!("({})", labels.join(" OR "))
    }

    /// Compile the attribute clauses into a WHERE fragment. Attribute
    /// clauses are property tests: an entity of a kind without the property
    /// simply never matches, it does not error.
    pub fn compile(&self) -> CompiledFilter {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<(String, FilterParam)> = Vec::new();

        if !self.banks.is_empty() {
            conditions.push("entity.bank_name IN $banks".into());
            params.push(("banks".into(), FilterParam::StrList(self.banks.clone())));
        }

        if !self.wallet_providers.is_empty() {
            conditions.push("entity.provider IN $wallet_providers".into());
            params.push((
                "wallet_providers".into(),
                FilterParam::StrList(self.wallet_providers.clone()),
            ));
        }

        if !self.currencies.is_empty() {
            conditions.push("entity.currency IN $currencies".into());
            params.push(("currencies".into(), FilterParam::StrList(self.currencies.clone())));
        }

        if !self.phone_providers.is_empty() {
            conditions.push("entity.carrier IN $phone_providers".into());
            params.push((
                "phone_providers".into(),
                FilterParam::StrList(self.phone_providers.clone()),
            ));
        }

        if self.priority_min != 0 || self.priority_max != 100 {
            conditions.push(
                "coalesce(entity.priority_score, 0) >= $priority_min \
                 AND coalesce(entity.priority_score, 0) <= $priority_max"
                    .into(),
            );
            params.push(("priority_min".into(), FilterParam::Int(self.priority_min)));
            params.push(("priority_max".into(), FilterParam::Int(self.priority_max)));
        }

        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            // Broad substring match over identifying keys and holder names.
            // Deliberately a contains test, not a ranked search.
            let fields = [
                "account_number",
                "wallet_address",
                "wallet_id",
                "phone_number",
                "qris_code",
                "account_holder",
                "owner_name",
            ];
            let search_conditions: Vec<String> = fields
                .iter()
                .map(|f| format!("entity.{f} CONTAINS $search"))
                .collect();
            conditions.push(format!("({})", search_conditions.join(" OR ")));
            params.push(("search".into(), FilterParam::Str(search.trim().to_string())));
        }

        let clause = if conditions.is_empty() {
            "true".to_string()
        } else {
            conditions.join(" AND ")
        };

        CompiledFilter { clause, params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        let compiled = GraphFilter::default().compile();
        assert_eq!(compiled.clause, "true");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn default_label_guard_covers_all_kinds() {
        let guard = GraphFilter::default().label_guard();
        for kind in EntityKind::ALL {
            assert!(guard.contains(kind.label()), "guard missing {}", kind.label());
        }
    }

    #[test]
    fn kind_restriction_narrows_the_guard() {
        let filter = GraphFilter {
            entity_kinds: vec![EntityKind::EWallet],
            ..GraphFilter::default()
        };
        assert_eq!(filter.label_guard(), "(entity:EWallet)");
    }

    #[test]
    fn bank_clause_binds_a_list_param() {
        let filter = GraphFilter {
            banks: vec!["BCA".into(), "BRI".into()],
            ..GraphFilter::default()
        };
        let compiled = filter.compile();
        assert_eq!(compiled.clause, "entity.bank_name IN $banks");
        assert_eq!(
            compiled.params,
            vec![(
                "banks".to_string(),
                FilterParam::StrList(vec!["BCA".into(), "BRI".into()])
            )]
        );
    }

    #[test]
    fn populated_fields_combine_with_and() {
        let filter = GraphFilter {
            banks: vec!["BCA".into()],
            currencies: vec!["USDT".into()],
            ..GraphFilter::default()
        };
        let compiled = filter.compile();
        assert_eq!(
            compiled.clause,
            "entity.bank_name IN $banks AND entity.currency IN $currencies"
        );
    }

    #[test]
    fn default_priority_bounds_add_no_clause() {
        let filter = GraphFilter {
            priority_min: 0,
            priority_max: 100,
            ..GraphFilter::default()
        };
        assert_eq!(filter.compile().clause, "true");

        let narrowed = GraphFilter {
            priority_min: 40,
            ..GraphFilter::default()
        };
        assert!(narrowed.compile().clause.contains("$priority_min"));
    }

    #[test]
    fn search_matches_keys_and_holder_names() {
        let filter = GraphFilter {
            search: Some("Budi".into()),
            ..GraphFilter::default()
        };
        let compiled = filter.compile();
        assert!(compiled.clause.contains("entity.account_number CONTAINS $search"));
        assert!(compiled.clause.contains("entity.account_holder CONTAINS $search"));
        assert!(compiled.clause.contains("entity.owner_name CONTAINS $search"));
    }

    #[test]
    fn blank_search_is_ignored() {
        let filter = GraphFilter {
            search: Some("   ".into()),
            ..GraphFilter::default()
        };
        assert_eq!(filter.compile().clause, "true");
    }

    #[test]
    fn out_of_range_priority_is_malformed() {
        let filter = GraphFilter {
            priority_max: 250,
            ..GraphFilter::default()
        };
        assert!(matches!(
            filter.validate(),
            Err(MuletraceError::MalformedFilter(_))
        ));
    }

    #[test]
    fn inverted_priority_bounds_are_malformed() {
        let filter = GraphFilter {
            priority_min: 80,
            priority_max: 20,
            ..GraphFilter::default()
        };
        assert!(filter.validate().is_err());
    }
}
