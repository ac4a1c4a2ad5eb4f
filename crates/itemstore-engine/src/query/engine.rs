//! Compiling requests onto storage selections and running them

use super::materialize::{FromQueryRow, QueryRow, ResultKind};
use super::request::{QueryRequest, QuerySource};
use super::result::QueryResult;
use crate::mapping::{self, Related};
use crate::session::Session;
use crate::transaction::Context;
use crate::{PersistenceError, Result};
use itemstore_model::{
    ItemRef, Pk, PropertyDefinition, TypeDefinition, Value, ValueType,
    RESERVED_PROPERTIES,
};
use itemstore_query::{
    ComparisonOp, Condition, Literal, Operand, OperandKind, ParamRef, SelectList, Spanned,
    Statement,
};
use itemstore_storage::{
    CacheMode, Column, CompareOp, Direction, Predicate, Projection, Row, Selection, SortOrder,
    StoredValue, Window,
};

pub struct QueryEngine<'a> {
    ctx: Context<'a>,
}

/// A request resolved against the registry and bound to its parameters
enum Compiled<'a> {
    Select {
        def: &'a TypeDefinition,
        predicate: Option<Predicate>,
        projection: Projection,
        order: Vec<SortOrder>,
    },
    Update {
        def: &'a TypeDefinition,
        predicate: Option<Predicate>,
        assignments: Vec<(String, StoredValue)>,
    },
    Delete {
        def: &'a TypeDefinition,
        predicate: Option<Predicate>,
    },
}

impl<'a> QueryEngine<'a> {
    pub fn new(ctx: Context<'a>) -> Self {
        Self { ctx }
    }

    pub fn execute<T: FromQueryRow>(
        &self,
        session: &mut Session<'_>,
        request: &QueryRequest,
    ) -> Result<QueryResult<T>> {
        let compiled = self.compile(request)?;
        if request.read_only && !matches!(compiled, Compiled::Select { .. }) {
            return Err(PersistenceError::query(
                "update and delete statements are not allowed in a read-only query",
            ));
        }

        let mode = CacheMode::resolve(request.cachable, request.ignore_cache);
        let previous = session.txn().cache_mode();
        tracing::debug!("Running query with cache mode {:?}", mode);
        session.txn_mut().set_cache_mode(mode);

        let result = match compiled {
            Compiled::Select {
                def,
                predicate,
                projection,
                order,
            } => self.select(session, request, def, predicate, projection, order),
            Compiled::Update {
                def,
                predicate,
                assignments,
            } => session
                .write(|txn| txn.update_matching(def.type_code(), predicate.as_ref(), &assignments))
                .map(QueryResult::affected),
            Compiled::Delete { def, predicate } => session
                .write(|txn| txn.delete_matching(def.type_code(), predicate.as_ref()))
                .map(QueryResult::affected),
        };

        if request.clear_caches_after {
            session.txn_mut().clear_cache();
        }
        session.txn_mut().set_cache_mode(previous);
        result
    }

    fn resolve(&self, name: &str) -> Result<&'a TypeDefinition> {
        self.ctx
            .registry
            .lookup(name)
            .map_err(|_| PersistenceError::UnknownType(name.to_string()))
    }

    fn compile(&self, request: &QueryRequest) -> Result<Compiled<'a>> {
        match &request.source {
            QuerySource::Statement(text) => {
                let statement = itemstore_query::parse(text)?;
                self.compile_statement(&statement, request)
            }
            QuerySource::Filter { type_code, filter } => {
                let def = self.resolve(type_code)?;
                let binder = Binder { def, request };
                let mut conditions = Vec::with_capacity(filter.len());
                for (name, value) in filter {
                    binder.property(name)?;
                    let stored = binder.coerce(bind_value(value, name)?, name)?;
                    if is_collection(&stored) {
                        return Err(PersistenceError::query(format!(
                            "filter value for '{}' must be a single value",
                            name
                        )));
                    }
                    conditions.push((name.clone(), stored));
                }
                Ok(Compiled::Select {
                    def,
                    predicate: Some(Predicate::all_equal(conditions)),
                    projection: Projection::Records,
                    order: binder.request_order()?,
                })
            }
        }
    }

    fn compile_statement(&self, statement: &Statement, request: &QueryRequest) -> Result<Compiled<'a>> {
        let def = self.resolve(&statement.type_name().node)?;
        let binder = Binder { def, request };
        let predicate = statement
            .condition()
            .map(|condition| binder.condition(condition))
            .transpose()?;

        match statement {
            Statement::Select(select) => {
                let projection = match &select.projection {
                    SelectList::Star => Projection::Records,
                    SelectList::Columns(items) => Projection::Columns(
                        items
                            .iter()
                            .map(|item| {
                                binder.readable(&item.property)?;
                                Ok(Column {
                                    property: item.property.node.clone(),
                                    alias: item.name().to_string(),
                                })
                            })
                            .collect::<Result<_>>()?,
                    ),
                };
                let mut order = Vec::with_capacity(select.order_by.len());
                for item in &select.order_by {
                    binder.property(&item.property.node)?;
                    order.push(SortOrder {
                        property: item.property.node.clone(),
                        direction: if item.descending {
                            Direction::Desc
                        } else {
                            Direction::Asc
                        },
                    });
                }
                order.extend(binder.request_order()?);
                Ok(Compiled::Select {
                    def,
                    predicate,
                    projection,
                    order,
                })
            }
            Statement::Update(update) => {
                let assignments = update
                    .assignments
                    .iter()
                    .map(|a| binder.assignment(&a.property, &a.value))
                    .collect::<Result<_>>()?;
                Ok(Compiled::Update {
                    def,
                    predicate,
                    assignments,
                })
            }
            Statement::Delete(_) => Ok(Compiled::Delete { def, predicate }),
        }
    }

    fn select<T: FromQueryRow>(
        &self,
        session: &mut Session<'_>,
        request: &QueryRequest,
        def: &TypeDefinition,
        predicate: Option<Predicate>,
        projection: Projection,
        mut order: Vec<SortOrder>,
    ) -> Result<QueryResult<T>> {
        if order.is_empty() {
            order = SortOrder::default_order();
        }
        let eager = if projection == Projection::Records {
            eager_properties::<T>(def, request)?
        } else {
            Vec::new()
        };
        let selection = Selection::new(def.type_code())
            .with_predicate(predicate)
            .with_order(order)
            .with_projection(projection);

        let total_count = session.read(|txn| txn.count_matching(&selection))?;
        let page = request.page.max(1);
        let window = (request.page_size > 0).then(|| Window {
            offset: (page - 1) * request.page_size,
            limit: request.page_size,
        });

        let rows = match window {
            // Joined children would multiply root rows inside the window,
            // so the page is chosen by id first
            Some(window) if !eager.is_empty() => {
                let ids = session
                    .read(|txn| txn.select_ids(&selection.clone().with_window(Some(window))))?;
                if ids.is_empty() {
                    Vec::new()
                } else {
                    let by_id = selection.with_ids(ids).with_eager(eager);
                    session.read(|txn| txn.fetch(&by_id))?
                }
            }
            _ => {
                let windowed = selection.with_window(window).with_eager(eager);
                session.read(|txn| txn.fetch(&windowed))?
            }
        };

        Ok(QueryResult {
            results: materialize(session, rows)?,
            page: if request.page_size > 0 { page } else { request.page },
            page_size: request.page_size,
            total_count,
        })
    }
}

fn eager_properties<T: FromQueryRow>(
    def: &TypeDefinition,
    request: &QueryRequest,
) -> Result<Vec<String>> {
    if !request.wants_eager() {
        return Ok(Vec::new());
    }
    if T::KIND != ResultKind::Items {
        tracing::debug!("Ignoring eager fetch for a non-item result type");
        return Ok(Vec::new());
    }
    if request.eager_fetch_all {
        return Ok(def.relation_properties().map(|p| p.name.clone()).collect());
    }
    request
        .eager_fetch
        .iter()
        .map(|name| match def.property(name) {
            Some(property) if property.is_relation() => Ok(name.clone()),
            Some(_) => Err(PersistenceError::query(format!(
                "'{}' is not a relation of {}",
                name,
                def.name()
            ))),
            None => Err(unknown_property(def, name)),
        })
        .collect()
}

fn materialize<T: FromQueryRow>(session: &mut Session<'_>, rows: Vec<Row>) -> Result<Vec<T>> {
    let mut related = Related::new();
    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        let row = match row {
            Row::Record(fetched) => {
                for child in &fetched.related {
                    if !related.contains_key(&child.pk) {
                        let item = mapping::rehydrate(child, &Related::new())?;
                        related.insert(child.pk.clone(), ItemRef::new(item));
                    }
                }
                let root = mapping::rehydrate(&fetched.record, &related)?;
                session.attach(fetched.record.pk.clone());
                QueryRow::Item(ItemRef::new(root))
            }
            Row::Tuple(columns) => QueryRow::Tuple(
                columns
                    .iter()
                    .map(|(alias, value)| {
                        Ok((alias.clone(), mapping::stored_to_value(value, &related)?))
                    })
                    .collect::<Result<_>>()?,
            ),
        };
        results.push(T::from_row(row)?);
    }
    Ok(results)
}

fn unknown_property(def: &TypeDefinition, name: &str) -> PersistenceError {
    PersistenceError::query(format!("unknown property '{}' on {}", name, def.name()))
}

fn is_collection(value: &StoredValue) -> bool {
    matches!(value, StoredValue::List(_) | StoredValue::Map(_))
}

/// Stored form of a bound parameter value
fn coerce_to(value: StoredValue, target: &ValueType) -> Result<StoredValue> {
    Ok(match (target, value) {
        (_, StoredValue::List(values)) => StoredValue::List(
            values
                .into_iter()
                .map(|v| coerce_to(v, target))
                .collect::<Result<_>>()?,
        ),
        (ValueType::Item(code), StoredValue::Int(id)) if id >= 0 => {
            StoredValue::Reference(Pk::new(id as u64, code))
        }
        (ValueType::Timestamp, StoredValue::Text(text)) => mapping::parse_timestamp(&text)
            .map(|ts| StoredValue::Timestamp(ts.timestamp_millis()))
            .ok_or_else(|| PersistenceError::query(format!("'{}' is not a timestamp", text)))?,
        (ValueType::Timestamp, StoredValue::Int(millis)) => StoredValue::Timestamp(millis),
        (_, other) => other,
    })
}

fn bind_value(value: &Value, name: &str) -> Result<StoredValue> {
    match value {
        Value::Item(item) => item.pk().map(StoredValue::Reference).ok_or_else(|| {
            PersistenceError::query(format!("parameter {} holds an unsaved item", name))
        }),
        Value::List(values) => values
            .iter()
            .map(|v| bind_value(v, name))
            .collect::<Result<_>>()
            .map(StoredValue::List),
        Value::Map(_) => Err(PersistenceError::query(format!(
            "parameter {} holds a map, which cannot be compared",
            name
        ))),
        scalar => mapping::stored_scalar(scalar)
            .ok_or_else(|| PersistenceError::query(format!("parameter {} cannot be bound", name))),
    }
}

fn compare_op(op: ComparisonOp) -> CompareOp {
    match op {
        ComparisonOp::Eq => CompareOp::Eq,
        ComparisonOp::Ne => CompareOp::Ne,
        ComparisonOp::Lt => CompareOp::Lt,
        ComparisonOp::Le => CompareOp::Le,
        ComparisonOp::Gt => CompareOp::Gt,
        ComparisonOp::Ge => CompareOp::Ge,
    }
}

struct Binder<'q> {
    def: &'q TypeDefinition,
    request: &'q QueryRequest,
}

impl<'q> Binder<'q> {
    /// The property's definition; `None` for bookkeeping names like `pk`
    fn property(&self, name: &str) -> Result<Option<&'q PropertyDefinition>> {
        if RESERVED_PROPERTIES.contains(&name) {
            return Ok(None);
        }
        self.def
            .property(name)
            .map(Some)
            .ok_or_else(|| unknown_property(self.def, name))
    }

    fn readable(&self, name: &Spanned<String>) -> Result<()> {
        match self.property(&name.node)? {
            Some(property) if !property.flags.readable => Err(PersistenceError::query(format!(
                "{}.{} is not readable",
                self.def.name(),
                name.node
            ))),
            _ => Ok(()),
        }
    }

    /// Type single operands are coerced to; the element type for lists
    fn operand_type(&self, name: &str) -> Option<&'q ValueType> {
        const TIMESTAMP: &ValueType = &ValueType::Timestamp;
        if matches!(name, "createdAt" | "modifiedAt") {
            return Some(TIMESTAMP);
        }
        match &self.def.property(name)?.value_type {
            ValueType::List(element) => Some(element.as_ref()),
            other => Some(other),
        }
    }

    fn request_order(&self) -> Result<Vec<SortOrder>> {
        for order in &self.request.order_by {
            self.property(&order.property)?;
        }
        Ok(self.request.order_by.clone())
    }

    /// Operand value exactly as written or bound
    fn raw_operand(&self, operand: &Operand) -> Result<StoredValue> {
        match &operand.node {
            OperandKind::Literal(literal) => Ok(match literal {
                Literal::Null => StoredValue::Null,
                Literal::Bool(b) => StoredValue::Bool(*b),
                Literal::Int(n) => StoredValue::Int(*n),
                Literal::Float(f) => StoredValue::Float(*f),
                Literal::Text(s) => StoredValue::Text(s.clone()),
            }),
            OperandKind::Param(param) => {
                let value = match param {
                    ParamRef::Named(name) => self.request.named.get(name),
                    ParamRef::Positional(index) => index
                        .checked_sub(1)
                        .and_then(|i| self.request.positional.get(i)),
                };
                let value = value.ok_or_else(|| {
                    PersistenceError::query(format!("no value bound for parameter {}", param))
                })?;
                bind_value(value, &param.to_string())
            }
        }
    }

    /// Text and integer operands compared against timestamps become
    /// timestamps; integers compared against item references become
    /// references to that id
    fn coerce(&self, value: StoredValue, property: &str) -> Result<StoredValue> {
        match self.operand_type(property) {
            Some(target) => coerce_to(value, target),
            None => Ok(value),
        }
    }

    fn single(&self, operand: &Operand, property: &str) -> Result<StoredValue> {
        let value = self.coerce(self.raw_operand(operand)?, property)?;
        if is_collection(&value) {
            return Err(PersistenceError::query(format!(
                "'{}' must be compared with a single value",
                property
            )));
        }
        Ok(value)
    }

    fn condition(&self, condition: &Condition) -> Result<Predicate> {
        Ok(match condition {
            Condition::Compare {
                property,
                op,
                operand,
            } => {
                self.property(&property.node)?;
                Predicate::Compare {
                    property: property.node.clone(),
                    op: compare_op(*op),
                    value: self.single(operand, &property.node)?,
                }
            }
            Condition::Like { property, pattern } => {
                self.property(&property.node)?;
                match self.raw_operand(pattern)? {
                    StoredValue::Text(pattern) => Predicate::Like {
                        property: property.node.clone(),
                        pattern,
                    },
                    _ => {
                        return Err(PersistenceError::query(format!(
                            "LIKE on '{}' needs a text pattern",
                            property.node
                        )))
                    }
                }
            }
            Condition::In { property, operands } => {
                self.property(&property.node)?;
                let mut values = Vec::with_capacity(operands.len());
                for operand in operands {
                    match self.coerce(self.raw_operand(operand)?, &property.node)? {
                        StoredValue::List(items) => values.extend(items),
                        value => values.push(value),
                    }
                }
                Predicate::In {
                    property: property.node.clone(),
                    values,
                }
            }
            Condition::Contains { property, operand } => {
                self.property(&property.node)?;
                let value = self.coerce(self.raw_operand(operand)?, &property.node)?;
                if is_collection(&value) {
                    return Err(PersistenceError::query(format!(
                        "CONTAINS on '{}' needs a single value",
                        property.node
                    )));
                }
                Predicate::Contains {
                    property: property.node.clone(),
                    value,
                }
            }
            Condition::IsNull { property, negated } => {
                self.property(&property.node)?;
                Predicate::IsNull {
                    property: property.node.clone(),
                    negated: *negated,
                }
            }
            Condition::And(parts) => Predicate::And(
                parts
                    .iter()
                    .map(|p| self.condition(p))
                    .collect::<Result<_>>()?,
            ),
            Condition::Or(parts) => Predicate::Or(
                parts
                    .iter()
                    .map(|p| self.condition(p))
                    .collect::<Result<_>>()?,
            ),
            Condition::Not(inner) => Predicate::Not(Box::new(self.condition(inner)?)),
        })
    }

    fn assignment(&self, property: &Spanned<String>, operand: &Operand) -> Result<(String, StoredValue)> {
        let name = &property.node;
        let Some(definition) = self.property(name)? else {
            return Err(PersistenceError::query(format!("'{}' cannot be assigned", name)));
        };
        if !definition.flags.writable {
            return Err(PersistenceError::query(format!(
                "{}.{} is not writable",
                self.def.name(),
                name
            )));
        }
        if definition.flags.initial {
            return Err(PersistenceError::query(format!(
                "{}.{} is set-once and cannot be updated",
                self.def.name(),
                name
            )));
        }
        let value = self.coerce(self.raw_operand(operand)?, name)?;
        if is_collection(&value) {
            return Err(PersistenceError::query(format!(
                "'{}' can only be assigned a single value",
                name
            )));
        }
        if !mapping::stored_accepts(&definition.value_type, &value) {
            return Err(PersistenceError::query(format!(
                "'{}' expects {}",
                name, definition.value_type
            )));
        }
        Ok((name.clone(), value))
    }
}
