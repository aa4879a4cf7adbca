//! Aggregate evaluation inside one task.
//!
//! A task owns fresh aggregate instances (from the registry) and drives them
//! over its input in one pass:
//!
//! - `Initial`: once per row, no grouping (map side).
//! - `Intermediate` / `Final`: once per key run over the run's values
//!   (combiner / reduce after a combiner).
//! - `Accumulate`: the run is fed in chunks of `chunk_rows` values, the
//!   value read at the end of the run, then `cleanup` before the next key
//!   (reduce without a combiner).
//!
//! Input for the grouped modes must be sorted by key. Any error aborts the
//! whole task; no result for a partially processed key is ever returned.

use std::fmt;

use mrplan_core::error::{codes, ErrorSource, ExecError};
use mrplan_core::types::{Bag, Scalar, Tuple};
use mrplan_operators::agg::AggregateRegistry;
use mrplan_operators::physical::{AggCall, AggStage, PhysicalOperator};
use mrplan_operators::traits::AggregateFunction;
use tracing::trace;

use crate::metrics::emit_span;

/// Default chunk size for accumulator mode.
pub const DEFAULT_CHUNK_ROWS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    Initial,
    Intermediate,
    Final,
    Accumulate { chunk_rows: usize },
}

impl TaskMode {
    fn for_stage(stage: AggStage, chunk_rows: usize) -> Self {
        match stage {
            AggStage::Initial => TaskMode::Initial,
            AggStage::Intermediate => TaskMode::Intermediate,
            AggStage::Final => TaskMode::Final,
            AggStage::Whole => TaskMode::Accumulate {
                chunk_rows: chunk_rows.max(1),
            },
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskMode::Initial => write!(f, "initial"),
            TaskMode::Intermediate => write!(f, "intermediate"),
            TaskMode::Final => write!(f, "final"),
            TaskMode::Accumulate { chunk_rows } => write!(f, "accumulate({chunk_rows})"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub rows_in: u64,
    pub rows_out: u64,
    pub chunks: u64,
}

struct Slot {
    column: usize,
    func: Box<dyn AggregateFunction>,
}

pub struct AggregateTask {
    mode: TaskMode,
    slots: Vec<Slot>,
    stats: TaskStats,
}

impl AggregateTask {
    /// Instantiate every call. All calls must name the same stage; `Whole`
    /// runs in accumulator mode.
    pub fn new(
        registry: &AggregateRegistry,
        calls: &[AggCall],
        chunk_rows: usize,
    ) -> Result<Self, ExecError> {
        let Some(first) = calls.first() else {
            return Err(ExecError::new(
                codes::AGGREGATE_BUG,
                ErrorSource::Bug,
                "aggregate task without aggregate calls",
            ));
        };
        if let Some(other) = calls.iter().find(|c| c.stage != first.stage) {
            return Err(ExecError::new(
                codes::AGGREGATE_BUG,
                ErrorSource::Bug,
                format!(
                    "mixed aggregate stages in one task: {:?} and {:?}",
                    first.stage, other.stage
                ),
            ));
        }
        let mut slots = Vec::with_capacity(calls.len());
        for call in calls {
            let func = registry.instantiate(&call.function).ok_or_else(|| {
                ExecError::new(
                    codes::UNKNOWN_FUNCTION,
                    ErrorSource::User,
                    format!("unknown aggregate function {}", call.function),
                )
            })?;
            slots.push(Slot {
                column: call.column,
                func,
            });
        }
        Ok(Self {
            mode: TaskMode::for_stage(first.stage, chunk_rows),
            slots,
            stats: TaskStats::default(),
        })
    }

    /// Task for the aggregates of a `ForEach` operator.
    pub fn for_operator(
        registry: &AggregateRegistry,
        op: &PhysicalOperator,
        chunk_rows: usize,
    ) -> Result<Self, ExecError> {
        Self::new(registry, op.aggregates(), chunk_rows)
    }

    pub fn mode(&self) -> TaskMode {
        self.mode
    }

    pub fn stats(&self) -> TaskStats {
        self.stats
    }

    /// Run over `(key, value)` rows. Each output row is the key and one field
    /// per aggregate call, in call order.
    pub fn run<I>(&mut self, input: I) -> Result<Vec<(Tuple, Tuple)>, ExecError>
    where
        I: IntoIterator<Item = (Tuple, Tuple)>,
    {
        // Retries start from scratch.
        for s in &mut self.slots {
            s.func.cleanup();
        }
        self.stats = TaskStats::default();

        let out = match self.mode {
            TaskMode::Initial => self.run_initial(input)?,
            _ => self.run_grouped(input)?,
        };

        self.stats.rows_out = out.len() as u64;
        emit_span(
            "aggregate_task",
            &[
                ("mode", self.mode.to_string()),
                ("rows_in", self.stats.rows_in.to_string()),
                ("rows_out", self.stats.rows_out.to_string()),
                ("chunks", self.stats.chunks.to_string()),
            ],
        );
        Ok(out)
    }

    fn run_initial<I>(&mut self, input: I) -> Result<Vec<(Tuple, Tuple)>, ExecError>
    where
        I: IntoIterator<Item = (Tuple, Tuple)>,
    {
        let mut out = Vec::new();
        for (key, value) in input {
            self.stats.rows_in += 1;
            let mut fields = Vec::with_capacity(self.slots.len());
            for s in &self.slots {
                let one = Bag::from_iter([project(&value, s)?]);
                fields.push(first_field(s.func.initial(&one)?));
            }
            out.push((key, Tuple::new(fields)));
        }
        Ok(out)
    }

    fn run_grouped<I>(&mut self, input: I) -> Result<Vec<(Tuple, Tuple)>, ExecError>
    where
        I: IntoIterator<Item = (Tuple, Tuple)>,
    {
        let mut out = Vec::new();
        let mut bags: Vec<Bag> = self.slots.iter().map(|_| Bag::new()).collect();
        let mut current: Option<Tuple> = None;

        for (key, value) in input {
            self.stats.rows_in += 1;
            if current.as_ref() != Some(&key) {
                if let Some(prev) = current.take() {
                    if key < prev {
                        return Err(ExecError::new(
                            codes::UNSORTED_INPUT,
                            ErrorSource::Input,
                            format!("key {key:?} arrived after {prev:?}"),
                        ));
                    }
                    let row = self.finish_run(prev, &mut bags)?;
                    out.push(row);
                }
                current = Some(key);
            }
            for (s, bag) in self.slots.iter_mut().zip(bags.iter_mut()) {
                bag.add(project(&value, s)?);
                if let TaskMode::Accumulate { chunk_rows } = self.mode {
                    if bag.len() >= chunk_rows {
                        s.func.accumulate(bag)?;
                        *bag = Bag::new();
                        self.stats.chunks += 1;
                    }
                }
            }
        }
        if let Some(prev) = current {
            let row = self.finish_run(prev, &mut bags)?;
            out.push(row);
        }
        Ok(out)
    }

    fn finish_run(&mut self, key: Tuple, bags: &mut [Bag]) -> Result<(Tuple, Tuple), ExecError> {
        let mut fields = Vec::with_capacity(self.slots.len());
        for (s, bag) in self.slots.iter_mut().zip(bags.iter_mut()) {
            let run = std::mem::take(bag);
            let v = match self.mode {
                TaskMode::Intermediate => first_field(s.func.intermediate(&run)?),
                TaskMode::Final => s.func.final_value(&run)?,
                TaskMode::Accumulate { .. } => {
                    if !run.is_empty() {
                        s.func.accumulate(&run)?;
                        self.stats.chunks += 1;
                    }
                    let v = s.func.value();
                    s.func.cleanup();
                    v
                }
                TaskMode::Initial => Scalar::Null,
            };
            fields.push(v);
        }
        trace!(key = ?key, mode = %self.mode, "key run finished");
        Ok((key, Tuple::new(fields)))
    }
}

fn project(value: &Tuple, slot: &Slot) -> Result<Tuple, ExecError> {
    match value.get(slot.column) {
        Ok(v) => Ok(Tuple::single(v.clone())),
        Err(e) => Err(ExecError::classify(
            &format!("input of {}", slot.func.name()),
            Box::new(e),
        )),
    }
}

fn first_field(t: Tuple) -> Scalar {
    t.fields().first().cloned().unwrap_or(Scalar::Null)
}
