use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{Dataset, Operator, evaluate_jointly, row_f64, row_str, row_u64};
use crate::cancel::CancellationToken;
use crate::domain::{LapisFilter, Row, SequenceType};
use crate::error::DashboardError;
use crate::lapis::LapisClient;
use crate::mutation::{Insertion, Mutation, MutationParseCache, SubstitutionOrDeletion};

pub struct FetchAggregatedOperator {
    filter: LapisFilter,
    fields: Vec<String>,
}

impl FetchAggregatedOperator {
    pub fn new(filter: LapisFilter, fields: Vec<String>) -> Self {
        Self { filter, fields }
    }
}

impl Operator for FetchAggregatedOperator {
    type Item = Row;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<Row>, DashboardError> {
        debug!(fields = ?self.fields, "fetch aggregated");
        let rows = lapis.aggregated(&self.filter, &self.fields, cancel)?;
        for row in &rows {
            if !row.get("count").is_some_and(Value::is_number) {
                return Err(DashboardError::MissingCount(
                    Value::Object(row.clone()).to_string(),
                ));
            }
        }
        Ok(Dataset::new(rows))
    }
}

pub struct FetchDetailsOperator {
    filter: LapisFilter,
    fields: Vec<String>,
}

impl FetchDetailsOperator {
    pub fn new(filter: LapisFilter, fields: Vec<String>) -> Self {
        Self { filter, fields }
    }
}

impl Operator for FetchDetailsOperator {
    type Item = Row;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<Row>, DashboardError> {
        debug!(fields = ?self.fields, "fetch details");
        Ok(Dataset::new(lapis.details(&self.filter, &self.fields, cancel)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubstitutionOrDeletionEntry {
    pub mutation: SubstitutionOrDeletion,
    pub count: u64,
    pub proportion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertionEntry {
    pub mutation: Insertion,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MutationEntry {
    SubstitutionOrDeletion(SubstitutionOrDeletionEntry),
    Insertion(InsertionEntry),
}

impl MutationEntry {
    pub fn mutation(&self) -> Mutation {
        match self {
            MutationEntry::SubstitutionOrDeletion(entry) => entry.mutation.clone().into(),
            MutationEntry::Insertion(entry) => Mutation::Insertion(entry.mutation.clone()),
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            MutationEntry::SubstitutionOrDeletion(entry) => entry.count,
            MutationEntry::Insertion(entry) => entry.count,
        }
    }
}

/// Parses codes either directly or through a shared memoizing cache.
#[derive(Clone, Default)]
struct CodeParser {
    cache: Option<Arc<MutationParseCache>>,
}

impl CodeParser {
    fn parse(&self, code: &str) -> Result<Mutation, DashboardError> {
        let parsed = match &self.cache {
            Some(cache) => cache.parse(code),
            None => Mutation::parse(code),
        };
        parsed.ok_or_else(|| DashboardError::InvalidMutationCode(code.to_string()))
    }

    fn substitution_or_deletion_entries(
        &self,
        rows: Vec<Row>,
    ) -> Result<Vec<SubstitutionOrDeletionEntry>, DashboardError> {
        rows.iter()
            .map(|row| {
                let code = row_str(row, "mutation")?;
                let mutation = SubstitutionOrDeletion::try_from(self.parse(code)?)?;
                Ok(SubstitutionOrDeletionEntry {
                    mutation,
                    count: row_u64(row, "count")?,
                    proportion: row_f64(row, "proportion")?,
                })
            })
            .collect()
    }

    fn insertion_entries(&self, rows: Vec<Row>) -> Result<Vec<InsertionEntry>, DashboardError> {
        rows.iter()
            .map(|row| {
                let code = row_str(row, "insertion")?;
                let mutation = match self.parse(code)? {
                    Mutation::Insertion(insertion) => insertion,
                    other => {
                        return Err(DashboardError::UnexpectedMutationType {
                            code: other.code(),
                            expected: "insertion".to_string(),
                        });
                    }
                };
                Ok(InsertionEntry {
                    mutation,
                    count: row_u64(row, "count")?,
                })
            })
            .collect()
    }
}

pub struct FetchSubstitutionsOrDeletionsOperator {
    filter: LapisFilter,
    sequence_type: SequenceType,
    min_proportion: f64,
    parser: CodeParser,
}

impl FetchSubstitutionsOrDeletionsOperator {
    pub fn new(filter: LapisFilter, sequence_type: SequenceType, min_proportion: f64) -> Self {
        Self {
            filter,
            sequence_type,
            min_proportion,
            parser: CodeParser::default(),
        }
    }

    pub fn with_parse_cache(mut self, cache: Arc<MutationParseCache>) -> Self {
        self.parser = CodeParser { cache: Some(cache) };
        self
    }
}

impl Operator for FetchSubstitutionsOrDeletionsOperator {
    type Item = SubstitutionOrDeletionEntry;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<Self::Item>, DashboardError> {
        debug!(sequence_type = %self.sequence_type, min_proportion = self.min_proportion, "fetch mutations");
        let rows = lapis.mutations(&self.filter, self.sequence_type, self.min_proportion, cancel)?;
        Ok(Dataset::new(self.parser.substitution_or_deletion_entries(rows)?))
    }
}

pub struct FetchInsertionsOperator {
    filter: LapisFilter,
    sequence_type: SequenceType,
    parser: CodeParser,
}

impl FetchInsertionsOperator {
    pub fn new(filter: LapisFilter, sequence_type: SequenceType) -> Self {
        Self {
            filter,
            sequence_type,
            parser: CodeParser::default(),
        }
    }

    pub fn with_parse_cache(mut self, cache: Arc<MutationParseCache>) -> Self {
        self.parser = CodeParser { cache: Some(cache) };
        self
    }
}

impl Operator for FetchInsertionsOperator {
    type Item = InsertionEntry;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<Self::Item>, DashboardError> {
        debug!(sequence_type = %self.sequence_type, "fetch insertions");
        let rows = lapis.insertions(&self.filter, self.sequence_type, cancel)?;
        Ok(Dataset::new(self.parser.insertion_entries(rows)?))
    }
}

/// Substitutions, deletions and insertions from one concurrent pair of
/// backend calls; point mutations come first in the merged dataset.
pub struct FetchMutationsOperator {
    filter: LapisFilter,
    sequence_type: SequenceType,
    min_proportion: f64,
    parser: CodeParser,
}

impl FetchMutationsOperator {
    pub fn new(filter: LapisFilter, sequence_type: SequenceType, min_proportion: f64) -> Self {
        Self {
            filter,
            sequence_type,
            min_proportion,
            parser: CodeParser::default(),
        }
    }

    pub fn with_parse_cache(mut self, cache: Arc<MutationParseCache>) -> Self {
        self.parser = CodeParser { cache: Some(cache) };
        self
    }
}

impl Operator for FetchMutationsOperator {
    type Item = MutationEntry;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<Self::Item>, DashboardError> {
        debug!(sequence_type = %self.sequence_type, "fetch mutations and insertions");
        let (mutations, insertions) = evaluate_jointly(
            cancel,
            |token| {
                let rows =
                    lapis.mutations(&self.filter, self.sequence_type, self.min_proportion, token)?;
                self.parser.substitution_or_deletion_entries(rows)
            },
            |token| {
                let rows = lapis.insertions(&self.filter, self.sequence_type, token)?;
                self.parser.insertion_entries(rows)
            },
        )?;

        let content = mutations
            .into_iter()
            .map(MutationEntry::SubstitutionOrDeletion)
            .chain(insertions.into_iter().map(MutationEntry::Insertion))
            .collect();
        Ok(Dataset::new(content))
    }
}
