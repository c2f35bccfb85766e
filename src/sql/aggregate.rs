//! GROUP BY/aggregates, DISTINCT/REDUCED, ORDER BY and slicing (spec
//! §4.6.10, §4.6.11, §4.6.13).

use spargebra::algebra::{AggregateExpression, AggregateFunction, OrderExpression};
use spargebra::term::Variable;

use crate::error::{EngineError, EngineResult};
use crate::sql::context::{column_alias, value_column_alias, AliasAllocator, CompiledPattern, TranslationContext};
use crate::sql::expr::ExprCompiler;

/// Lowers `Group{inner, variables, aggregates}`. Each aggregate's target
/// variable becomes an output column; the grouping keys are re-exposed
/// under their original variable names.
pub fn compile_group(
    ctx: &mut TranslationContext,
    alloc: &mut AliasAllocator,
    inner: CompiledPattern,
    group_vars: &[Variable],
    aggregates: &[(Variable, AggregateExpression)],
) -> EngineResult<CompiledPattern> {
    ctx.charge_node()?;
    let src_alias = alloc.next_subquery_alias();

    let mut select = Vec::new();
    let mut group_by = Vec::new();
    let mut columns = std::collections::HashMap::new();

    for var in group_vars {
        let col = inner
            .columns
            .get(var)
            .ok_or_else(|| crate::error::translation_error("GROUP BY variable not bound", var.as_str()))?;
        let out_col = column_alias(var);
        select.push(format!("{src_alias}.{col} AS {out_col}"));
        group_by.push(format!("{src_alias}.{col}"));
        columns.insert(var.clone(), out_col);
    }

    let var_columns: std::collections::HashMap<Variable, String> = inner
        .columns
        .iter()
        .map(|(v, c)| (v.clone(), format!("{src_alias}.{c}")))
        .collect();
    let mut all_joins = Vec::new();

    for (out_var, agg) in aggregates {
        // Aggregate outputs are SQL scalars (bigint/numeric/text), never
        // term UUIDs — project as text under the value-column naming so the
        // executor decodes them as plain literals (spec §4.6.10, §4.6.11).
        let out_col = value_column_alias(out_var);
        let mut compiler = ExprCompiler::new(ctx.tables, &var_columns);
        let expr_sql = compile_aggregate(&mut compiler, agg)?;
        all_joins.extend(compiler.into_joins());
        select.push(format!("({expr_sql})::text AS {out_col}"));
        columns.insert(out_var.clone(), out_col);
    }

    if select.is_empty() {
        select.push("1 AS unit".to_string());
    }

    let join_clause = render_term_joins(&all_joins, ctx.tables);
    let group_clause = if group_by.is_empty() {
        String::new()
    } else {
        format!(" GROUP BY {}", group_by.join(", "))
    };

    let sql = format!(
        "SELECT {} FROM ({}) AS {src_alias}{join_clause}{group_clause}",
        select.join(", "),
        inner.sql
    );
    Ok(CompiledPattern {
        sql,
        columns,
        nullable: Default::default(),
    })
}

fn compile_aggregate(compiler: &mut ExprCompiler, agg: &AggregateExpression) -> EngineResult<String> {
    match agg {
        AggregateExpression::CountSolutions { distinct: _ } => Ok("COUNT(*)".to_string()),
        AggregateExpression::FunctionCall { name, expr, distinct } => {
            let value = compiler.compile_value(expr)?;
            let distinct_kw = if *distinct { "DISTINCT " } else { "" };
            match name {
                AggregateFunction::Count => Ok(format!("COUNT({distinct_kw}{value})")),
                AggregateFunction::Sum => Ok(format!("COALESCE(SUM({distinct_kw}({value})::numeric), 0)")),
                AggregateFunction::Avg => Ok(format!("AVG({distinct_kw}({value})::numeric)")),
                AggregateFunction::Min => Ok(format!("MIN({distinct_kw}{value})")),
                AggregateFunction::Max => Ok(format!("MAX({distinct_kw}{value})")),
                AggregateFunction::Sample => Ok(format!("MIN({value})")),
                AggregateFunction::GroupConcat { separator } => {
                    let sep = separator.as_deref().unwrap_or(" ");
                    Ok(format!(
                        "STRING_AGG({distinct_kw}{value}, '{}')",
                        sep.replace('\'', "''")
                    ))
                }
                AggregateFunction::Custom(name) => Err(EngineError::UnsupportedFeature(format!(
                    "custom aggregate {} is not supported",
                    name.as_str()
                ))),
                #[allow(unreachable_patterns)]
                _ => Err(EngineError::UnsupportedFeature("aggregate not supported".to_string())),
            }
        }
    }
}

/// Lowers `OrderBy{inner, expression}` (spec §4.6.13): non-numeric
/// comparison falls back to lexical text order on the resolved term value.
pub fn compile_order_by(
    ctx: &mut TranslationContext,
    alloc: &mut AliasAllocator,
    inner: CompiledPattern,
    order: &[OrderExpression],
) -> EngineResult<CompiledPattern> {
    ctx.charge_node()?;
    let src_alias = alloc.next_subquery_alias();
    let var_columns: std::collections::HashMap<Variable, String> = inner
        .columns
        .iter()
        .map(|(v, c)| (v.clone(), format!("{src_alias}.{c}")))
        .collect();

    let mut compiler = ExprCompiler::new(ctx.tables, &var_columns);
    let mut order_terms = Vec::new();
    for o in order {
        let (expr, desc) = match o {
            OrderExpression::Asc(e) => (e, false),
            OrderExpression::Desc(e) => (e, true),
        };
        let sql = compiler.compile_value(expr)?;
        order_terms.push(format!("{sql} {}", if desc { "DESC" } else { "ASC" }));
    }
    let joins = compiler.into_joins();
    let join_clause = render_term_joins(&joins, ctx.tables);

    let sql = format!(
        "SELECT {src_alias}.* FROM ({}) AS {src_alias}{join_clause} ORDER BY {}",
        inner.sql,
        order_terms.join(", ")
    );
    Ok(CompiledPattern {
        sql,
        columns: inner.columns,
        nullable: inner.nullable,
    })
}

pub fn compile_distinct(alloc: &mut AliasAllocator, inner: CompiledPattern) -> CompiledPattern {
    let src_alias = alloc.next_subquery_alias();
    let sql = format!("SELECT DISTINCT {src_alias}.* FROM ({}) AS {src_alias}", inner.sql);
    CompiledPattern {
        sql,
        columns: inner.columns,
        nullable: inner.nullable,
    }
}

pub fn compile_slice(
    alloc: &mut AliasAllocator,
    inner: CompiledPattern,
    start: usize,
    length: Option<usize>,
) -> CompiledPattern {
    let src_alias = alloc.next_subquery_alias();
    let limit = match length {
        Some(n) => format!(" LIMIT {n}"),
        None => String::new(),
    };
    let sql = format!(
        "SELECT {src_alias}.* FROM ({}) AS {src_alias} OFFSET {start}{limit}",
        inner.sql
    );
    CompiledPattern {
        sql,
        columns: inner.columns,
        nullable: inner.nullable,
    }
}

pub fn compile_project(
    alloc: &mut AliasAllocator,
    inner: CompiledPattern,
    vars: &[Variable],
) -> EngineResult<CompiledPattern> {
    let src_alias = alloc.next_subquery_alias();
    let mut select = Vec::new();
    let mut columns = std::collections::HashMap::new();
    let mut nullable = std::collections::HashSet::new();
    for var in vars {
        match inner.columns.get(var) {
            Some(col) => {
                select.push(format!("{src_alias}.{col} AS {col}"));
                columns.insert(var.clone(), col.clone());
                if inner.nullable.contains(var) {
                    nullable.insert(var.clone());
                }
            }
            None => {
                let out_col = column_alias(var);
                select.push(format!("NULL::uuid AS {out_col}"));
                columns.insert(var.clone(), out_col.clone());
                nullable.insert(var.clone());
            }
        }
    }
    if select.is_empty() {
        select.push("1 AS unit".to_string());
    }
    let sql = format!("SELECT {} FROM ({}) AS {src_alias}", select.join(", "), inner.sql);
    Ok(CompiledPattern {
        sql,
        columns,
        nullable,
    })
}

pub(crate) fn render_term_joins(joins: &[crate::sql::expr::TermJoin], tables: &crate::space::SpaceTables) -> String {
    let mut clause = String::new();
    for j in joins {
        clause.push_str(&format!(
            " LEFT JOIN {term} AS {alias} ON {alias}.term_uuid = {uuid_expr} LEFT JOIN {datatype} AS {dt_alias} ON {dt_alias}.datatype_id = {alias}.datatype_id",
            term = tables.term(),
            alias = j.alias,
            uuid_expr = j.uuid_expr,
            datatype = tables.datatype(),
            dt_alias = j.datatype_alias,
        ));
    }
    clause
}
