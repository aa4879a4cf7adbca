//! Physical operators hosted by a phase plan.
//!
//! The catalog is a closed set: optimizer passes match on [`OpKind`] rather
//! than relying on per-operator overrides.

use std::fmt;

use mrplan_core::id::OperatorKey;
use serde::{Deserialize, Serialize};

/// A file plus the function used to read or write it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: String,
    pub func: String,
}

impl FileSpec {
    pub fn new(path: impl Into<String>, func: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            func: func.into(),
        }
    }
}

impl fmt::Display for FileSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.func)
    }
}

/// Which stage of a decomposed aggregate a `ForEach` invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggStage {
    /// The function evaluated in one pass (no decomposition).
    Whole,
    Initial,
    Intermediate,
    Final,
}

impl AggStage {
    fn suffix(self) -> &'static str {
        match self {
            AggStage::Whole => "",
            AggStage::Initial => "$Initial",
            AggStage::Intermediate => "$Intermediate",
            AggStage::Final => "$Final",
        }
    }
}

/// Reference from a `ForEach` to an aggregate function by registry name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggCall {
    pub function: String,
    pub stage: AggStage,
    /// Input column holding the bag to aggregate.
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    Load {
        file: FileSpec,
    },
    Store {
        file: FileSpec,
    },
    Filter {
        predicate: String,
    },
    ForEach {
        projections: Vec<String>,
        aggregates: Vec<AggCall>,
        /// Fully qualified names of user functions referenced.
        udfs: Vec<String>,
    },
    /// Map-side key extraction for the shuffle; `index` tags which input a
    /// row came from when several inputs feed one reduce.
    LocalRearrange {
        key_columns: Vec<usize>,
        index: u8,
    },
    /// Map-side key extraction for the skewed input of a skewed join; rows
    /// are spread according to the partition file.
    PartitionRearrange {
        key_columns: Vec<usize>,
        partition_file: String,
    },
    GlobalRearrange,
    Package {
        inputs: usize,
    },
    Union,
    Split {
        spill_file: FileSpec,
    },
    Limit {
        n: u64,
    },
    Sort {
        columns: Vec<usize>,
        ascending: Vec<bool>,
    },
    /// Fragment-replicate join: `fragment` is the streamed input.
    FrJoin {
        inputs: usize,
        fragment: usize,
    },
}

impl OpKind {
    fn label(&self) -> String {
        match self {
            OpKind::Load { file } => format!("Load({file})"),
            OpKind::Store { file } => format!("Store({file})"),
            OpKind::Filter { predicate } => format!("Filter[{predicate}]"),
            OpKind::ForEach {
                projections,
                aggregates,
                ..
            } => {
                let mut items: Vec<String> = projections.clone();
                items.extend(
                    aggregates
                        .iter()
                        .map(|a| format!("{}{}(${})", a.function, a.stage.suffix(), a.column)),
                );
                format!("New For Each[{}]", items.join(","))
            }
            OpKind::LocalRearrange { key_columns, index } => {
                format!("Local Rearrange[{}]({index})", join_cols(key_columns))
            }
            OpKind::PartitionRearrange {
                key_columns,
                partition_file,
            } => format!(
                "Partition Rearrange[{}]({partition_file})",
                join_cols(key_columns)
            ),
            OpKind::GlobalRearrange => "Global Rearrange".to_string(),
            OpKind::Package { inputs } => format!("Package[{inputs}]"),
            OpKind::Union => "Union".to_string(),
            OpKind::Split { spill_file } => format!("Split({spill_file})"),
            OpKind::Limit { n } => format!("Limit[{n}]"),
            OpKind::Sort { columns, ascending } => {
                let cols: Vec<String> = columns
                    .iter()
                    .zip(ascending.iter().chain(std::iter::repeat(&true)))
                    .map(|(c, asc)| format!("${c} {}", if *asc { "ASC" } else { "DESC" }))
                    .collect();
                format!("Sort[{}]", cols.join(","))
            }
            OpKind::FrJoin { inputs, fragment } => format!("FRJoin[{inputs}]({fragment})"),
        }
    }
}

fn join_cols(cols: &[usize]) -> String {
    cols.iter()
        .map(|c| format!("${c}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// One operator in a phase plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalOperator {
    pub key: OperatorKey,
    pub kind: OpKind,
}

impl PhysicalOperator {
    pub fn new(key: OperatorKey, kind: OpKind) -> Self {
        Self { key, kind }
    }

    pub fn union(key: OperatorKey) -> Self {
        Self::new(key, OpKind::Union)
    }

    /// Stable one-line identity used in explain output.
    pub fn name(&self) -> String {
        format!("{} - {}", self.kind.label(), self.key)
    }

    pub fn is_union(&self) -> bool {
        matches!(self.kind, OpKind::Union)
    }

    /// User function names referenced by this operator (fully qualified).
    pub fn udfs(&self) -> &[String] {
        match &self.kind {
            OpKind::ForEach { udfs, .. } => udfs,
            _ => &[],
        }
    }

    /// Aggregate calls evaluated by this operator.
    pub fn aggregates(&self) -> &[AggCall] {
        match &self.kind {
            OpKind::ForEach { aggregates, .. } => aggregates,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        let op = PhysicalOperator::new(
            OperatorKey::new("scope", 4),
            OpKind::Load {
                file: FileSpec::new("in.txt", "PigStorage"),
            },
        );
        assert_eq!(op.name(), "Load(in.txt:PigStorage) - scope-4");
        assert_eq!(
            PhysicalOperator::union(OperatorKey::new("scope", 9)).name(),
            "Union - scope-9"
        );
    }

    #[test]
    fn foreach_renders_aggregate_stages() {
        let op = PhysicalOperator::new(
            OperatorKey::new("s", 2),
            OpKind::ForEach {
                projections: vec!["group".into()],
                aggregates: vec![AggCall {
                    function: "LongMax".into(),
                    stage: AggStage::Intermediate,
                    column: 1,
                }],
                udfs: vec![],
            },
        );
        assert_eq!(
            op.name(),
            "New For Each[group,LongMax$Intermediate($1)] - s-2"
        );
    }

    #[test]
    fn sort_labels_directions() {
        let op = PhysicalOperator::new(
            OperatorKey::new("s", 1),
            OpKind::Sort {
                columns: vec![0, 2],
                ascending: vec![true, false],
            },
        );
        assert_eq!(op.name(), "Sort[$0 ASC,$2 DESC] - s-1");
    }
}
