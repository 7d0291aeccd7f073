//! Grouped aggregation over tuple streams.

use crate::access::schema::TupleDesc;
use crate::access::tuple::Tuple;
use crate::access::value::{DataType, Value};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl AggregateOp {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateOp::Min => "MIN",
            AggregateOp::Max => "MAX",
            AggregateOp::Sum => "SUM",
            AggregateOp::Avg => "AVG",
            AggregateOp::Count => "COUNT",
        }
    }
}

/// Running per-group state; which parts matter depends on the op.
#[derive(Debug, Clone, Copy, Default)]
struct GroupState {
    count: i64,
    sum: i64,
    min: Option<i32>,
    max: Option<i32>,
}

impl GroupState {
    fn merge(&mut self, v: i32) {
        self.count += 1;
        self.sum += v as i64;
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
    }

    fn finish(&self, op: AggregateOp) -> i32 {
        match op {
            AggregateOp::Min => self.min.unwrap_or(0),
            AggregateOp::Max => self.max.unwrap_or(0),
            AggregateOp::Sum => self.sum as i32,
            // integer average, truncating toward zero
            AggregateOp::Avg => (self.sum / self.count) as i32,
            AggregateOp::Count => self.count as i32,
        }
    }
}

fn output_desc(group_type: Option<DataType>) -> Arc<TupleDesc> {
    let fields = match group_type {
        None => vec![(DataType::Int, "aggval".to_string())],
        Some(t) => vec![
            (t, "gbval".to_string()),
            (DataType::Int, "aggval".to_string()),
        ],
    };
    Arc::new(TupleDesc::new(fields))
}

fn result_tuples(
    desc: &Arc<TupleDesc>,
    groups: &HashMap<Option<Value>, GroupState>,
    op: AggregateOp,
) -> Result<Vec<Tuple>> {
    let mut out = Vec::with_capacity(groups.len());
    for (key, state) in groups {
        let agg = Value::Int(state.finish(op));
        let values = match key {
            None => vec![agg],
            Some(k) => vec![k.clone(), agg],
        };
        out.push(Tuple::new(desc.clone(), values)?);
    }
    Ok(out)
}

/// Computes one aggregate over an integer field, optionally grouped by
/// another field.
///
/// Output tuples are `(aggval)` without grouping, `(gbval, aggval)` with.
pub struct IntAggregator {
    group_by: Option<usize>,
    field: usize,
    op: AggregateOp,
    desc: Arc<TupleDesc>,
    groups: HashMap<Option<Value>, GroupState>,
}

impl IntAggregator {
    /// `group_by` pairs the grouping field's index with its type; `None`
    /// aggregates the whole stream into one row.
    pub fn new(group_by: Option<(usize, DataType)>, field: usize, op: AggregateOp) -> Self {
        Self {
            group_by: group_by.map(|(i, _)| i),
            field,
            op,
            desc: output_desc(group_by.map(|(_, t)| t)),
            groups: HashMap::new(),
        }
    }

    /// Folds one tuple into its group.
    pub fn merge(&mut self, tuple: &Tuple) -> Result<()> {
        let Value::Int(v) = tuple.value(self.field) else {
            bail!("aggregate field {} is not an integer", self.field);
        };
        let key = self.group_by.map(|i| tuple.value(i).clone());
        self.groups.entry(key).or_default().merge(*v);
        Ok(())
    }

    /// One result tuple per group, in no particular order.
    pub fn results(&self) -> Result<Vec<Tuple>> {
        result_tuples(&self.desc, &self.groups, self.op)
    }

    pub fn output_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}

/// Counts text fields, optionally grouped. COUNT is the only aggregate
/// defined over text.
pub struct TextAggregator {
    group_by: Option<usize>,
    field: usize,
    desc: Arc<TupleDesc>,
    groups: HashMap<Option<Value>, GroupState>,
}

impl TextAggregator {
    pub fn new(
        group_by: Option<(usize, DataType)>,
        field: usize,
        op: AggregateOp,
    ) -> Result<Self> {
        if op != AggregateOp::Count {
            bail!("text fields only support COUNT, got {}", op.name());
        }
        Ok(Self {
            group_by: group_by.map(|(i, _)| i),
            field,
            desc: output_desc(group_by.map(|(_, t)| t)),
            groups: HashMap::new(),
        })
    }

    pub fn merge(&mut self, tuple: &Tuple) -> Result<()> {
        let Value::Text(_) = tuple.value(self.field) else {
            bail!("aggregate field {} is not text", self.field);
        };
        let key = self.group_by.map(|i| tuple.value(i).clone());
        self.groups.entry(key).or_default().merge(0);
        Ok(())
    }

    pub fn results(&self) -> Result<Vec<Tuple>> {
        result_tuples(&self.desc, &self.groups, AggregateOp::Count)
    }

    pub fn output_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}
