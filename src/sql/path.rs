//! Property path lowering (spec §4.6.9): fixed-length paths unroll into a
//! chain of joins the same way a BGP with intermediate variables would;
//! `*`/`+`/`?` lower to a recursive CTE with an explicit visited-node array
//! guarding against cycles and a depth cap from `limits.max_path_depth`.

use spargebra::algebra::PropertyPathExpression;
use spargebra::term::TermPattern;

use crate::error::{EngineError, EngineResult};
use crate::sql::context::{AliasAllocator, CompiledPattern, TranslationContext};
use crate::term::Term;

/// Lowers `subject path object` into a `CompiledPattern` whose output
/// columns carry the subject/object UUIDs for every matching pair (bound
/// positions are filtered in-place rather than exposed as columns).
pub fn compile_path(
    ctx: &mut TranslationContext,
    alloc: &mut AliasAllocator,
    subject: &TermPattern,
    path: &PropertyPathExpression,
    object: &TermPattern,
) -> EngineResult<CompiledPattern> {
    ctx.charge_node()?;
    let tables = ctx.tables;

    match path {
        PropertyPathExpression::NamedNode(pred) => {
            let alias = alloc.next_table_alias();
            let mut wheres = vec![format!(
                "{alias}.predicate_uuid = '{}'::uuid",
                Term::from_named_node(pred).uuid()
            )];
            let mut select = Vec::new();
            let mut columns = std::collections::HashMap::new();

            bind_endpoint(subject, &alias, "subject_uuid", &mut select, &mut columns, &mut wheres);
            bind_endpoint(object, &alias, "object_uuid", &mut select, &mut columns, &mut wheres);
            if let Some(cond) = ctx.graph_condition(&format!("{alias}.context_uuid")) {
                wheres.push(cond);
            }

            let select_list = if select.is_empty() {
                "1 AS unit".to_string()
            } else {
                select.join(", ")
            };
            let sql = format!(
                "SELECT {select_list} FROM {} AS {alias} WHERE {}",
                tables.rdf_quad(),
                wheres.join(" AND ")
            );
            Ok(CompiledPattern {
                sql,
                columns,
                nullable: Default::default(),
            })
        }
        PropertyPathExpression::Reverse(inner) => {
            compile_path(ctx, alloc, object, inner, subject)
        }
        PropertyPathExpression::Sequence(a, b) => {
            let mid = fresh_mid_variable(alloc);
            let mid_pattern = TermPattern::Variable(mid.clone());
            let left = compile_path(ctx, alloc, subject, a, &mid_pattern)?;
            let right = compile_path(ctx, alloc, &mid_pattern, b, object)?;
            join_on_shared(alloc, left, right, &[mid])
        }
        PropertyPathExpression::Alternative(a, b) => {
            let left = compile_path(ctx, alloc, subject, a, object)?;
            let right = compile_path(ctx, alloc, subject, b, object)?;
            union_patterns(alloc, left, right)
        }
        PropertyPathExpression::ZeroOrOne(inner) => {
            let stepped = compile_path(ctx, alloc, subject, inner, object)?;
            let reflexive = reflexive_pattern(ctx, alloc, subject, object)?;
            union_patterns(alloc, reflexive, stepped)
        }
        PropertyPathExpression::OneOrMore(inner) => {
            recursive_closure(ctx, alloc, subject, inner, object, false)
        }
        PropertyPathExpression::ZeroOrMore(inner) => {
            recursive_closure(ctx, alloc, subject, inner, object, true)
        }
        PropertyPathExpression::NegatedPropertySet(preds) => {
            let alias = alloc.next_table_alias();
            let excluded: Vec<String> = preds
                .iter()
                .map(|p| format!("'{}'::uuid", Term::from_named_node(p).uuid()))
                .collect();
            let mut wheres = vec![format!(
                "{alias}.predicate_uuid NOT IN ({})",
                excluded.join(", ")
            )];
            let mut select = Vec::new();
            let mut columns = std::collections::HashMap::new();
            bind_endpoint(subject, &alias, "subject_uuid", &mut select, &mut columns, &mut wheres);
            bind_endpoint(object, &alias, "object_uuid", &mut select, &mut columns, &mut wheres);
            if let Some(cond) = ctx.graph_condition(&format!("{alias}.context_uuid")) {
                wheres.push(cond);
            }
            let select_list = if select.is_empty() {
                "1 AS unit".to_string()
            } else {
                select.join(", ")
            };
            let sql = format!(
                "SELECT {select_list} FROM {} AS {alias} WHERE {}",
                tables.rdf_quad(),
                wheres.join(" AND ")
            );
            Ok(CompiledPattern {
                sql,
                columns,
                nullable: Default::default(),
            })
        }
    }
}

fn bind_endpoint(
    pattern: &TermPattern,
    alias: &str,
    column: &str,
    select: &mut Vec<String>,
    columns: &mut std::collections::HashMap<spargebra::term::Variable, String>,
    wheres: &mut Vec<String>,
) {
    match pattern {
        TermPattern::Variable(v) => {
            let out_col = crate::sql::context::column_alias(v);
            select.push(format!("{alias}.{column} AS {out_col}"));
            columns.insert(v.clone(), out_col);
        }
        other => {
            if let Some(term) = Term::from_term_pattern(other) {
                wheres.push(format!("{alias}.{column} = '{}'::uuid", term.uuid()));
            }
        }
    }
}

fn fresh_mid_variable(alloc: &mut AliasAllocator) -> spargebra::term::Variable {
    let name = format!("__path_mid_{}", alloc.next_subquery_alias());
    spargebra::term::Variable::new(name).expect("generated identifier is valid")
}

fn join_on_shared(
    alloc: &mut AliasAllocator,
    left: CompiledPattern,
    right: CompiledPattern,
    drop_vars: &[spargebra::term::Variable],
) -> EngineResult<CompiledPattern> {
    let left_alias = alloc.next_subquery_alias();
    let right_alias = alloc.next_subquery_alias();
    let mut shared = Vec::new();
    for (var, col) in &left.columns {
        if let Some(rcol) = right.columns.get(var) {
            shared.push(format!("{left_alias}.{col} = {right_alias}.{rcol}"));
        }
    }
    let on_clause = if shared.is_empty() {
        "TRUE".to_string()
    } else {
        shared.join(" AND ")
    };

    let mut columns = std::collections::HashMap::new();
    let mut select = Vec::new();
    for (var, col) in &left.columns {
        if drop_vars.contains(var) {
            continue;
        }
        select.push(format!("{left_alias}.{col} AS {col}"));
        columns.insert(var.clone(), col.clone());
    }
    for (var, col) in &right.columns {
        if drop_vars.contains(var) || columns.contains_key(var) {
            continue;
        }
        select.push(format!("{right_alias}.{col} AS {col}"));
        columns.insert(var.clone(), col.clone());
    }
    if select.is_empty() {
        select.push("1 AS unit".to_string());
    }

    let sql = format!(
        "SELECT {} FROM ({}) AS {left_alias} JOIN ({}) AS {right_alias} ON {on_clause}",
        select.join(", "),
        left.sql,
        right.sql
    );
    Ok(CompiledPattern {
        sql,
        columns,
        nullable: Default::default(),
    })
}

fn union_patterns(
    alloc: &mut AliasAllocator,
    left: CompiledPattern,
    right: CompiledPattern,
) -> EngineResult<CompiledPattern> {
    let mut all_vars: Vec<spargebra::term::Variable> = left.columns.keys().cloned().collect();
    for v in right.columns.keys() {
        if !all_vars.contains(v) {
            all_vars.push(v.clone());
        }
    }
    let left_alias = alloc.next_subquery_alias();
    let right_alias = alloc.next_subquery_alias();
    let mut left_select = Vec::new();
    let mut right_select = Vec::new();
    let mut columns = std::collections::HashMap::new();
    for var in &all_vars {
        let out_col = crate::sql::context::column_alias(var);
        match left.columns.get(var) {
            Some(c) => left_select.push(format!("{left_alias}.{c} AS {out_col}")),
            None => left_select.push(format!("NULL::uuid AS {out_col}")),
        }
        match right.columns.get(var) {
            Some(c) => right_select.push(format!("{right_alias}.{c} AS {out_col}")),
            None => right_select.push(format!("NULL::uuid AS {out_col}")),
        }
        columns.insert(var.clone(), out_col);
    }
    let sql = format!(
        "SELECT {} FROM ({}) AS {left_alias} UNION ALL SELECT {} FROM ({}) AS {right_alias}",
        left_select.join(", "),
        left.sql,
        right_select.join(", "),
        right.sql
    );
    Ok(CompiledPattern {
        sql,
        columns,
        nullable: Default::default(),
    })
}

/// The reflexive step of `path?`: every term that actually occurs as a
/// quad endpoint, paired with itself, restricted to any bound subject/object.
fn reflexive_pattern(
    ctx: &mut TranslationContext,
    alloc: &mut AliasAllocator,
    subject: &TermPattern,
    object: &TermPattern,
) -> EngineResult<CompiledPattern> {
    let _ = alloc;
    let quad = ctx.tables.rdf_quad();
    let context_constraint = ctx.graph_condition("context_uuid");
    let mut columns = std::collections::HashMap::new();
    let mut select = Vec::new();
    let mut wheres = Vec::new();

    match (subject, object) {
        (TermPattern::Variable(sv), TermPattern::Variable(ov)) if sv == ov => {
            let out_col = crate::sql::context::column_alias(sv);
            select.push(format!("t.term_uuid AS {out_col}"));
            columns.insert(sv.clone(), out_col);
        }
        (TermPattern::Variable(sv), TermPattern::Variable(ov)) => {
            let sc = crate::sql::context::column_alias(sv);
            let oc = crate::sql::context::column_alias(ov);
            select.push(format!("t.term_uuid AS {sc}"));
            select.push(format!("t.term_uuid AS {oc}"));
            columns.insert(sv.clone(), sc);
            columns.insert(ov.clone(), oc);
        }
        (TermPattern::Variable(sv), bound) => {
            let term = Term::from_term_pattern(bound).ok_or_else(|| {
                EngineError::TranslationError("path endpoint must be bound or variable".into())
            })?;
            let out_col = crate::sql::context::column_alias(sv);
            select.push(format!("t.term_uuid AS {out_col}"));
            columns.insert(sv.clone(), out_col);
            wheres.push(format!("t.term_uuid = '{}'::uuid", term.uuid()));
        }
        (bound, TermPattern::Variable(ov)) => {
            let term = Term::from_term_pattern(bound).ok_or_else(|| {
                EngineError::TranslationError("path endpoint must be bound or variable".into())
            })?;
            let out_col = crate::sql::context::column_alias(ov);
            select.push(format!("t.term_uuid AS {out_col}"));
            columns.insert(ov.clone(), out_col);
            wheres.push(format!("t.term_uuid = '{}'::uuid", term.uuid()));
        }
        (ls, rs) => {
            let lt = Term::from_term_pattern(ls);
            let rt = Term::from_term_pattern(rs);
            select.push("1 AS unit".to_string());
            if lt != rt {
                wheres.push("FALSE".to_string());
            } else if let Some(term) = lt {
                wheres.push(format!("t.term_uuid = '{}'::uuid", term.uuid()));
            }
        }
    }

    let select_list = if select.is_empty() {
        "1 AS unit".to_string()
    } else {
        select.join(", ")
    };
    let where_clause = if wheres.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", wheres.join(" AND "))
    };
    let graph_where = match &context_constraint {
        Some(cond) => format!(" WHERE {cond}"),
        None => String::new(),
    };
    let sql = format!(
        "SELECT DISTINCT {select_list} FROM (
            SELECT subject_uuid AS term_uuid FROM {quad}{graph_where}
            UNION
            SELECT object_uuid AS term_uuid FROM {quad}{graph_where}
        ) AS t{where_clause}"
    );
    Ok(CompiledPattern {
        sql,
        columns,
        nullable: Default::default(),
    })
}

fn recursive_closure(
    ctx: &mut TranslationContext,
    alloc: &mut AliasAllocator,
    subject: &TermPattern,
    inner: &PropertyPathExpression,
    object: &TermPattern,
    zero_or_more: bool,
) -> EngineResult<CompiledPattern> {
    if ctx.max_path_depth == 0 {
        return Err(EngineError::QueryTooComplex(
            "property path recursion disabled (max_path_depth = 0)".to_string(),
        ));
    }
    let mid = fresh_mid_variable(alloc);
    let mid_pattern = TermPattern::Variable(mid.clone());
    let start_var = fresh_mid_variable(alloc);
    let step = compile_path(ctx, alloc, &TermPattern::Variable(start_var.clone()), inner, &mid_pattern)?;
    let start_col = step
        .columns
        .get(&start_var)
        .cloned()
        .ok_or_else(|| EngineError::TranslationError("path step lost its start column".into()))?;
    let mid_col = step
        .columns
        .get(&mid)
        .cloned()
        .ok_or_else(|| EngineError::TranslationError("path step lost its end column".into()))?;

    let cte = format!("path_cte_{}", alloc.next_subquery_alias());
    let depth_cap = ctx.max_path_depth;

    let base_case = if zero_or_more {
        let quad = ctx.tables.rdf_quad();
        let graph_where = match ctx.graph_condition("context_uuid") {
            Some(cond) => format!(" WHERE {cond}"),
            None => String::new(),
        };
        format!(
            "SELECT t.term_uuid AS from_uuid, t.term_uuid AS to_uuid, 0 AS depth, ARRAY[t.term_uuid] AS visited
             FROM (SELECT subject_uuid AS term_uuid FROM {quad}{graph_where} UNION SELECT object_uuid AS term_uuid FROM {quad}{graph_where}) AS t"
        )
    } else {
        format!(
            "SELECT {start_col} AS from_uuid, {mid_col} AS to_uuid, 1 AS depth, ARRAY[{start_col}, {mid_col}] AS visited
             FROM ({step_sql}) AS step0",
            step_sql = step.sql
        )
    };

    let recursive_step = format!(
        "SELECT r.from_uuid, step.{mid_col} AS to_uuid, r.depth + 1, r.visited || step.{mid_col}
         FROM {cte} r
         JOIN ({step_sql}) AS step ON step.{start_col} = r.to_uuid
         WHERE r.depth < {depth_cap} AND NOT (step.{mid_col} = ANY(r.visited))",
        step_sql = step.sql
    );

    let sql = format!(
        "WITH RECURSIVE {cte}(from_uuid, to_uuid, depth, visited) AS (
            {base_case}
            UNION ALL
            {recursive_step}
        )
        SELECT DISTINCT from_uuid, to_uuid FROM {cte}"
    );

    let mut columns = std::collections::HashMap::new();
    let mut wheres = Vec::new();
    let mut select = Vec::new();

    let from_col;
    match subject {
        TermPattern::Variable(v) => {
            let out = crate::sql::context::column_alias(v);
            select.push(format!("from_uuid AS {out}"));
            columns.insert(v.clone(), out.clone());
            from_col = out;
        }
        bound => {
            let term = Term::from_term_pattern(bound).ok_or_else(|| {
                EngineError::TranslationError("path endpoint must be bound or variable".into())
            })?;
            wheres.push(format!("from_uuid = '{}'::uuid", term.uuid()));
            from_col = String::new();
        }
    }
    match object {
        TermPattern::Variable(v) => {
            let out = crate::sql::context::column_alias(v);
            select.push(format!("to_uuid AS {out}"));
            columns.insert(v.clone(), out);
        }
        bound => {
            let term = Term::from_term_pattern(bound).ok_or_else(|| {
                EngineError::TranslationError("path endpoint must be bound or variable".into())
            })?;
            wheres.push(format!("to_uuid = '{}'::uuid", term.uuid()));
        }
    }
    let _ = from_col;
    if select.is_empty() {
        select.push("1 AS unit".to_string());
    }

    let where_clause = if wheres.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", wheres.join(" AND "))
    };
    let outer = format!(
        "SELECT {} FROM ({sql}) AS closure{where_clause}",
        select.join(", ")
    );
    Ok(CompiledPattern {
        sql: outer,
        columns,
        nullable: Default::default(),
    })
}
