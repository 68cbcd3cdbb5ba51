//! Filter expression to storage predicate translation.
//!
//! Field names are resolved against the object type: composite sub-fields
//! map to their storage columns, many-to-one relations to their join column.
//! Values are coerced with the same rules the input formatter uses.

use crate::coerce::coerce_value;
use crate::error::RunnerResult;
use serde_json::Value as JsonValue;
use tessera_core::{
    composite_column, FieldKind, FilterCondition, FilterError, FilterExpr, FilterOperator,
    ObjectTypeDescriptor, RelationKind,
};
use tessera_storage::{CompareOp, Predicate, QueryState};

/// Constrain `query` to the rows matching `filter`.
///
/// Used identically for the existence read (on a clone of the base state)
/// and for the update (on the base state itself).
pub fn apply_filter(
    query: &mut QueryState,
    filter: &FilterExpr,
    descriptor: &ObjectTypeDescriptor,
) -> RunnerResult<()> {
    let predicate = translate(filter, descriptor)?;
    query.and_where(predicate);
    Ok(())
}

/// Translate a filter tree into a predicate over storage columns.
pub fn translate(
    filter: &FilterExpr,
    descriptor: &ObjectTypeDescriptor,
) -> Result<Predicate, FilterError> {
    match filter {
        FilterExpr::Condition(condition) => translate_condition(condition, descriptor),
        FilterExpr::And(children) => Ok(Predicate::And(
            children
                .iter()
                .map(|c| translate(c, descriptor))
                .collect::<Result<_, _>>()?,
        )),
        FilterExpr::Or(children) => Ok(Predicate::Or(
            children
                .iter()
                .map(|c| translate(c, descriptor))
                .collect::<Result<_, _>>()?,
        )),
        FilterExpr::Not(inner) => Ok(Predicate::Not(Box::new(translate(inner, descriptor)?))),
    }
}

/// Storage column and value kind a filter leaf targets.
fn resolve_column(
    condition: &FilterCondition,
    descriptor: &ObjectTypeDescriptor,
) -> Result<(String, FieldKind), FilterError> {
    let unknown = || FilterError::UnknownField {
        object_type: descriptor.name_singular.clone(),
        field: match &condition.sub_field {
            Some(sub) => format!("{}.{}", condition.field, sub),
            None => condition.field.clone(),
        },
    };

    let Some(field) = descriptor.field(&condition.field) else {
        // `companyId` addresses the `company` relation's join column.
        return match descriptor.field_by_join_column(&condition.field) {
            Some(_) if condition.sub_field.is_none() => {
                Ok((condition.field.clone(), FieldKind::Uuid))
            }
            _ => Err(unknown()),
        };
    };

    match (&field.kind, &condition.sub_field) {
        (kind, Some(sub)) => {
            let sub_kind = kind.sub_field_kind(sub).ok_or_else(unknown)?;
            Ok((composite_column(&field.name, sub), sub_kind))
        }
        (kind, None) if kind.is_composite() => Err(FilterError::Malformed {
            reason: format!(
                "composite field '{}' must be filtered by sub-field",
                field.name
            ),
        }),
        (FieldKind::Relation(RelationKind::ManyToOne { join_column, .. }), None) => {
            Ok((join_column.clone(), FieldKind::Uuid))
        }
        (FieldKind::Relation(RelationKind::OneToMany { .. }), None) => {
            Err(FilterError::Malformed {
                reason: format!("cannot filter on one-to-many relation '{}'", field.name),
            })
        }
        (kind, None) => Ok((field.name.clone(), kind.clone())),
    }
}

fn operator_applies(kind: &FieldKind, operator: &FilterOperator) -> bool {
    match operator {
        FilterOperator::Eq | FilterOperator::Neq | FilterOperator::Is => true,
        FilterOperator::In => !matches!(kind, FieldKind::RawJson),
        FilterOperator::Gt | FilterOperator::Gte | FilterOperator::Lt | FilterOperator::Lte => {
            matches!(kind, FieldKind::Number | FieldKind::DateTime | FieldKind::Text)
        }
        FilterOperator::Like | FilterOperator::Ilike | FilterOperator::StartsWith => {
            matches!(kind, FieldKind::Text | FieldKind::Select { .. })
        }
        FilterOperator::Unsupported(_) => false,
    }
}

fn translate_condition(
    condition: &FilterCondition,
    descriptor: &ObjectTypeDescriptor,
) -> Result<Predicate, FilterError> {
    let (column, kind) = resolve_column(condition, descriptor)?;
    let unsupported = || FilterError::UnsupportedOperator {
        field: condition.field.clone(),
        operator: condition.operator.as_str().to_string(),
    };
    if !operator_applies(&kind, &condition.operator) {
        return Err(unsupported());
    }

    let value = &condition.value;
    let predicate = match &condition.operator {
        FilterOperator::Eq if value.is_null() => Predicate::IsNull { column },
        FilterOperator::Neq if value.is_null() => Predicate::IsNotNull { column },
        FilterOperator::Eq => Predicate::compare(column, CompareOp::Eq, coerce_value(&kind, value)),
        FilterOperator::Neq => {
            Predicate::compare(column, CompareOp::Neq, coerce_value(&kind, value))
        }
        FilterOperator::Gt => Predicate::compare(column, CompareOp::Gt, coerce_value(&kind, value)),
        FilterOperator::Gte => {
            Predicate::compare(column, CompareOp::Gte, coerce_value(&kind, value))
        }
        FilterOperator::Lt => Predicate::compare(column, CompareOp::Lt, coerce_value(&kind, value)),
        FilterOperator::Lte => {
            Predicate::compare(column, CompareOp::Lte, coerce_value(&kind, value))
        }
        FilterOperator::In => {
            let JsonValue::Array(items) = value else {
                return Err(FilterError::Malformed {
                    reason: format!("'in' on '{}' expects an array", condition.field),
                });
            };
            Predicate::in_list(column, items.iter().map(|v| coerce_value(&kind, v)).collect())
        }
        FilterOperator::Is => match value.as_str() {
            Some("NULL") => Predicate::IsNull { column },
            Some("NOT_NULL") => Predicate::IsNotNull { column },
            _ => {
                return Err(FilterError::Malformed {
                    reason: format!(
                        "'is' on '{}' expects \"NULL\" or \"NOT_NULL\"",
                        condition.field
                    ),
                })
            }
        },
        FilterOperator::Like | FilterOperator::Ilike | FilterOperator::StartsWith => {
            let Some(text) = value.as_str() else {
                return Err(FilterError::Malformed {
                    reason: format!(
                        "'{}' on '{}' expects a string",
                        condition.operator.as_str(),
                        condition.field
                    ),
                });
            };
            let pattern = match condition.operator {
                FilterOperator::StartsWith => format!("{}%", text),
                _ => text.to_string(),
            };
            Predicate::Like {
                column,
                pattern,
                case_insensitive: condition.operator == FilterOperator::Ilike,
            }
        }
        FilterOperator::Unsupported(_) => return Err(unsupported()),
    };
    Ok(predicate)
}
