//! Expression compilation (spec §4.6.6 FILTER/BIND, §4.6.12 builtins).
//!
//! SPARQL expressions operate on RDF terms, but `rdf_quad` only stores term
//! UUIDs, so every variable an expression touches needs a join back to the
//! term (and, for typed literals, datatype) table to recover its lexical
//! value. `ExprCompiler` tracks one such join per distinct variable it sees
//! and hands the SQL builder (`bgp.rs`) the resulting `LEFT JOIN` clauses to
//! splice into the enclosing subquery.

use std::collections::HashMap;

use spargebra::algebra::{Expression, Function};
use spargebra::term::{Literal, NamedNodePattern, TermPattern, Variable};

use crate::error::{EngineError, EngineResult};
use crate::space::SpaceTables;
use crate::term::{is_numeric_datatype, NUMERIC_DATATYPES, RDF_LANG_STRING, XSD_STRING};

/// One join the expression compiler needs added to the enclosing query so a
/// variable's lexical value is available to evaluate against.
#[derive(Debug, Clone)]
pub struct TermJoin {
    pub alias: String,
    pub datatype_alias: String,
    pub uuid_expr: String,
}

pub struct ExprCompiler<'a> {
    tables: &'a SpaceTables,
    /// Maps a bound SPARQL variable to the SQL expression yielding its
    /// term UUID in the enclosing query (e.g. `t0.subject_uuid`).
    var_columns: &'a HashMap<Variable, String>,
    joins: Vec<TermJoin>,
    by_var: HashMap<Variable, usize>,
    next_alias: u32,
}

impl<'a> ExprCompiler<'a> {
    pub fn new(tables: &'a SpaceTables, var_columns: &'a HashMap<Variable, String>) -> Self {
        Self {
            tables,
            var_columns,
            joins: Vec::new(),
            by_var: HashMap::new(),
            next_alias: 0,
        }
    }

    pub fn into_joins(self) -> Vec<TermJoin> {
        self.joins
    }

    fn term_join_for(&mut self, var: &Variable) -> EngineResult<(String, String)> {
        if let Some(&idx) = self.by_var.get(var) {
            let j = &self.joins[idx];
            return Ok((j.alias.clone(), j.datatype_alias.clone()));
        }
        let uuid_expr = self.var_columns.get(var).cloned().ok_or_else(|| {
            crate::error::translation_error("variable not in scope", var.as_str())
        })?;
        let alias = format!("e{}", self.next_alias);
        let dt_alias = format!("ed{}", self.next_alias);
        self.next_alias += 1;
        self.joins.push(TermJoin {
            alias: alias.clone(),
            datatype_alias: dt_alias.clone(),
            uuid_expr,
        });
        self.by_var.insert(var.clone(), self.joins.len() - 1);
        Ok((alias, dt_alias))
    }

    /// SQL text yielding the variable's lexical text.
    fn text(&mut self, var: &Variable) -> EngineResult<String> {
        let (alias, _) = self.term_join_for(var)?;
        Ok(format!("{alias}.term_text"))
    }

    fn kind(&mut self, var: &Variable) -> EngineResult<String> {
        let (alias, _) = self.term_join_for(var)?;
        Ok(format!("{alias}.term_type"))
    }

    fn lang(&mut self, var: &Variable) -> EngineResult<String> {
        let (alias, _) = self.term_join_for(var)?;
        Ok(format!("COALESCE({alias}.lang, '')"))
    }

    fn datatype_uri(&mut self, var: &Variable) -> EngineResult<String> {
        let (_, dt_alias) = self.term_join_for(var)?;
        Ok(format!(
            "COALESCE({dt_alias}.datatype_uri, '{XSD_STRING}')"
        ))
    }

    /// A guarded numeric cast: non-numeric text yields SQL `NULL` rather
    /// than aborting the statement, matching SPARQL's "type error" semantics
    /// for arithmetic/comparison on non-numeric operands (spec §4.6.6).
    fn numeric(&mut self, var: &Variable) -> EngineResult<String> {
        let text = self.text(var)?;
        Ok(format!(
            "(CASE WHEN {text} ~ '^[+-]?[0-9]+(\\.[0-9]+)?([eE][+-]?[0-9]+)?$' THEN ({text})::numeric ELSE NULL END)"
        ))
    }

    /// Compiles an `Expression` to a SQL boolean/scalar expression. Returns
    /// `UnsupportedFeature` for constructs spec §9 leaves open (hash
    /// functions, `EXISTS`, custom function calls).
    pub fn compile(&mut self, expr: &Expression) -> EngineResult<String> {
        match expr {
            Expression::NamedNode(n) => Ok(format!("'{}'", sql_escape(n.as_str()))),
            Expression::Literal(lit) => self.compile_literal_value(lit),
            Expression::Variable(v) => {
                // A bare variable in a boolean context is its effective
                // boolean value (SPARQL EBV): numeric literals are
                // truthy/falsy by value, others by non-empty string.
                let text = self.text(v)?;
                Ok(format!("({text} IS NOT NULL AND {text} <> '' AND {text} <> 'false' AND {text} <> '0')"))
            }
            Expression::Or(l, r) => Ok(format!("({} OR {})", self.compile(l)?, self.compile(r)?)),
            Expression::And(l, r) => Ok(format!("({} AND {})", self.compile(l)?, self.compile(r)?)),
            Expression::Equal(l, r) => self.compile_cmp("=", l, r),
            Expression::SameTerm(l, r) => self.compile_sameterm(l, r),
            Expression::Greater(l, r) => self.compile_cmp(">", l, r),
            Expression::GreaterOrEqual(l, r) => self.compile_cmp(">=", l, r),
            Expression::Less(l, r) => self.compile_cmp("<", l, r),
            Expression::LessOrEqual(l, r) => self.compile_cmp("<=", l, r),
            Expression::In(expr, list) => {
                let lhs = self.compile_value(expr)?;
                let mut parts = Vec::with_capacity(list.len());
                for item in list {
                    parts.push(format!("{} = {}", lhs, self.compile_value(item)?));
                }
                Ok(format!("({})", parts.join(" OR ")))
            }
            Expression::Add(l, r) => self.compile_arith("+", l, r),
            Expression::Subtract(l, r) => self.compile_arith("-", l, r),
            Expression::Multiply(l, r) => self.compile_arith("*", l, r),
            Expression::Divide(l, r) => self.compile_arith("/", l, r),
            Expression::UnaryPlus(e) => self.compile_value(e),
            Expression::UnaryMinus(e) => Ok(format!("(-({}))", self.compile_value(e)?)),
            Expression::Not(e) => Ok(format!("(NOT {})", self.compile(e)?)),
            Expression::Exists(_) => Err(EngineError::UnsupportedFeature(
                "EXISTS/NOT EXISTS is not supported".to_string(),
            )),
            Expression::Bound(v) => {
                let col = self.var_columns.get(v).cloned().ok_or_else(|| {
                    crate::error::translation_error("variable not in scope", v.as_str())
                })?;
                Ok(format!("({col} IS NOT NULL)"))
            }
            Expression::If(cond, then, els) => Ok(format!(
                "(CASE WHEN {} THEN {} ELSE {} END)",
                self.compile(cond)?,
                self.compile_value(then)?,
                self.compile_value(els)?
            )),
            Expression::Coalesce(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(self.compile_value(item)?);
                }
                Ok(format!("COALESCE({})", parts.join(", ")))
            }
            Expression::FunctionCall(func, args) => self.compile_function(func, args),
        }
    }

    /// A "value" context expression (as opposed to the top-level boolean
    /// context `compile` is usually invoked in) — used inside arithmetic,
    /// COALESCE/IF branches and IN lists, where the expression yields a
    /// scalar rather than a boolean.
    pub(crate) fn compile_value(&mut self, expr: &Expression) -> EngineResult<String> {
        match expr {
            Expression::Variable(v) => self.text(v),
            Expression::Literal(lit) => self.compile_literal_value(lit),
            Expression::NamedNode(n) => Ok(format!("'{}'", sql_escape(n.as_str()))),
            _ => self.compile(expr),
        }
    }

    fn compile_literal_value(&mut self, lit: &Literal) -> EngineResult<String> {
        if is_numeric_datatype(lit.datatype().as_str()) {
            Ok(lit.value().to_string())
        } else {
            Ok(format!("'{}'", sql_escape(lit.value())))
        }
    }

    fn compile_arith(&mut self, op: &str, l: &Expression, r: &Expression) -> EngineResult<String> {
        let lhs = self.numeric_value(l)?;
        let rhs = self.numeric_value(r)?;
        Ok(format!("({lhs} {op} {rhs})"))
    }

    fn numeric_value(&mut self, expr: &Expression) -> EngineResult<String> {
        match expr {
            Expression::Variable(v) => self.numeric(v),
            Expression::Literal(lit) => self.compile_literal_value(lit),
            _ => self.compile(expr),
        }
    }

    /// Comparison lowering (spec §4.6.6): numeric casting is only correct
    /// when the operand's datatype is actually XSD-numeric. For a literal or
    /// an arithmetic expression that is known at translation time, this is a
    /// static decision. For a variable, the datatype is only known once the
    /// row is read, so the comparison is compiled as a runtime `CASE` that
    /// numeric-compares when both sides' actual datatype is numeric and
    /// falls back to lexical comparison otherwise — e.g. `FILTER(?x = ?y)`
    /// over two equal URIs must not be silently dropped by a numeric cast
    /// that yields NULL for non-numeric text.
    fn compile_cmp(&mut self, op: &str, l: &Expression, r: &Expression) -> EngineResult<String> {
        if self.is_statically_numeric(l) && self.is_statically_numeric(r) {
            let lhs = self.numeric_value(l)?;
            let rhs = self.numeric_value(r)?;
            return Ok(format!("({lhs} {op} {rhs})"));
        }
        if matches!(l, Expression::Variable(_)) || matches!(r, Expression::Variable(_)) {
            let lhs_num = self.numeric_value(l)?;
            let rhs_num = self.numeric_value(r)?;
            let lhs_txt = self.compile_value(l)?;
            let rhs_txt = self.compile_value(r)?;
            let lhs_is_num = self.is_dynamically_numeric(l)?;
            let rhs_is_num = self.is_dynamically_numeric(r)?;
            return Ok(format!(
                "(CASE WHEN {lhs_is_num} AND {rhs_is_num} THEN ({lhs_num} {op} {rhs_num}) ELSE ({lhs_txt} {op} {rhs_txt}) END)"
            ));
        }
        let lhs = self.compile_value(l)?;
        let rhs = self.compile_value(r)?;
        Ok(format!("({lhs} {op} {rhs})"))
    }

    /// True when `expr`'s numeric-ness is already known at translation time
    /// (a numeric literal, or an arithmetic expression, which always yields
    /// a number or SQL `NULL` via the guarded `numeric()` cast).
    fn is_statically_numeric(&self, expr: &Expression) -> bool {
        matches!(
            expr,
            Expression::Literal(lit) if is_numeric_datatype(lit.datatype().as_str())
        ) || matches!(
            expr,
            Expression::Add(..) | Expression::Subtract(..) | Expression::Multiply(..) | Expression::Divide(..)
                | Expression::UnaryMinus(..) | Expression::UnaryPlus(..)
        )
    }

    /// A SQL boolean expression telling, for one comparison operand, whether
    /// its *actual* datatype (checked at runtime for a variable, since the
    /// translator cannot know it in advance) is XSD-numeric.
    fn is_dynamically_numeric(&mut self, expr: &Expression) -> EngineResult<String> {
        match expr {
            Expression::Variable(v) => {
                let dt = self.datatype_uri(v)?;
                Ok(format!("({dt} = ANY(ARRAY[{}]))", numeric_datatype_array()))
            }
            Expression::Literal(lit) => Ok(if is_numeric_datatype(lit.datatype().as_str()) {
                "TRUE".to_string()
            } else {
                "FALSE".to_string()
            }),
            _ => Ok("TRUE".to_string()),
        }
    }

    fn compile_sameterm(&mut self, l: &Expression, r: &Expression) -> EngineResult<String> {
        // SAMETERM compares the UUID identity directly when both sides are
        // bound variables (the strongest, cheapest form); falls back to
        // value comparison otherwise.
        if let (Expression::Variable(lv), Expression::Variable(rv)) = (l, r) {
            let lcol = self.var_columns.get(lv).cloned();
            let rcol = self.var_columns.get(rv).cloned();
            if let (Some(lcol), Some(rcol)) = (lcol, rcol) {
                return Ok(format!("({lcol} = {rcol})"));
            }
        }
        let lhs = self.compile_value(l)?;
        let rhs = self.compile_value(r)?;
        Ok(format!("({lhs} = {rhs})"))
    }

    fn compile_function(&mut self, func: &Function, args: &[Expression]) -> EngineResult<String> {
        let arg_value = |this: &mut Self, i: usize| -> EngineResult<String> {
            this.compile_value(&args[i])
        };
        match func {
            Function::Str => arg_value(self, 0),
            Function::Lang => match &args[0] {
                Expression::Variable(v) => self.lang(v),
                _ => Ok("''".to_string()),
            },
            Function::LangMatches => {
                let lang = arg_value(self, 0)?;
                let range = arg_value(self, 1)?;
                Ok(format!(
                    "(LOWER({lang}) = LOWER({range}) OR {range} = '*' OR LOWER({lang}) LIKE LOWER({range}) || '-%')"
                ))
            }
            Function::Datatype => match &args[0] {
                Expression::Variable(v) => self.datatype_uri(v),
                _ => Ok(format!("'{XSD_STRING}'")),
            },
            Function::Iri | Function::BNode if args.is_empty() => Err(EngineError::UnsupportedFeature(
                "zero-argument BNode()/IRI() construction is not supported".to_string(),
            )),
            Function::Iri => arg_value(self, 0),
            Function::BNode => arg_value(self, 0),
            Function::Uuid | Function::StrUuid => Ok("gen_random_uuid()::text".to_string()),
            Function::Now => Ok("now()::text".to_string()),
            Function::Rand => Ok("random()".to_string()),
            Function::Abs => Ok(format!("abs({})", self.numeric_value(&args[0])?)),
            Function::Ceil => Ok(format!("ceil({})", self.numeric_value(&args[0])?)),
            Function::Floor => Ok(format!("floor({})", self.numeric_value(&args[0])?)),
            Function::Round => Ok(format!("round({})", self.numeric_value(&args[0])?)),
            Function::Concat => {
                let mut parts = Vec::with_capacity(args.len());
                for i in 0..args.len() {
                    parts.push(arg_value(self, i)?);
                }
                Ok(format!("CONCAT({})", parts.join(", ")))
            }
            Function::SubStr => {
                let s = arg_value(self, 0)?;
                let start = arg_value(self, 1)?;
                if args.len() > 2 {
                    let len = arg_value(self, 2)?;
                    Ok(format!("substring({s} from ({start})::int for ({len})::int)"))
                } else {
                    Ok(format!("substring({s} from ({start})::int)"))
                }
            }
            Function::StrLen => Ok(format!("char_length({})", arg_value(self, 0)?)),
            Function::UCase => Ok(format!("upper({})", arg_value(self, 0)?)),
            Function::LCase => Ok(format!("lower({})", arg_value(self, 0)?)),
            Function::EncodeForUri => Ok(format!("encode(convert_to({}, 'UTF8'), 'hex')", arg_value(self, 0)?)),
            Function::Contains => Ok(format!(
                "(position({} in {}) > 0)",
                arg_value(self, 1)?,
                arg_value(self, 0)?
            )),
            Function::StrStarts => Ok(format!(
                "(left({}, char_length({})) = {})",
                arg_value(self, 0)?,
                arg_value(self, 1)?,
                arg_value(self, 1)?
            )),
            Function::StrEnds => Ok(format!(
                "(right({}, char_length({})) = {})",
                arg_value(self, 0)?,
                arg_value(self, 1)?,
                arg_value(self, 1)?
            )),
            Function::StrBefore => {
                let s = arg_value(self, 0)?;
                let needle = arg_value(self, 1)?;
                Ok(format!(
                    "(CASE WHEN position({needle} in {s}) > 0 THEN left({s}, position({needle} in {s}) - 1) ELSE '' END)"
                ))
            }
            Function::StrAfter => {
                let s = arg_value(self, 0)?;
                let needle = arg_value(self, 1)?;
                Ok(format!(
                    "(CASE WHEN position({needle} in {s}) > 0 THEN substring({s} from position({needle} in {s}) + char_length({needle})) ELSE '' END)"
                ))
            }
            Function::Replace => {
                let s = arg_value(self, 0)?;
                let pattern = arg_value(self, 1)?;
                let replacement = arg_value(self, 2)?;
                Ok(format!("regexp_replace({s}, {pattern}, {replacement}, 'g')"))
            }
            Function::Regex => {
                let s = arg_value(self, 0)?;
                let pattern = arg_value(self, 1)?;
                if args.len() > 2 {
                    let flags = arg_value(self, 2)?;
                    Ok(format!("({s} ~ ('(?' || replace({flags}, '''', '') || ')' || {pattern}))"))
                } else {
                    Ok(format!("({s} ~ {pattern})"))
                }
            }
            Function::IsIri => match &args[0] {
                Expression::Variable(v) => Ok(format!("({} = 'U')", self.kind(v)?)),
                _ => Ok("FALSE".to_string()),
            },
            Function::IsBlank => match &args[0] {
                Expression::Variable(v) => Ok(format!("({} = 'B')", self.kind(v)?)),
                _ => Ok("FALSE".to_string()),
            },
            Function::IsLiteral => match &args[0] {
                Expression::Variable(v) => Ok(format!("({} = 'L')", self.kind(v)?)),
                _ => Ok("TRUE".to_string()),
            },
            Function::IsNumeric => match &args[0] {
                Expression::Variable(v) => {
                    let numeric = self.numeric(v)?;
                    Ok(format!("({numeric} IS NOT NULL)"))
                }
                _ => Ok("FALSE".to_string()),
            },
            Function::StrLang => {
                let s = arg_value(self, 0)?;
                Ok(s)
            }
            Function::StrDt => {
                let s = arg_value(self, 0)?;
                Ok(s)
            }
            Function::Year | Function::Month | Function::Day | Function::Hours
            | Function::Minutes | Function::Seconds => {
                let field = match func {
                    Function::Year => "year",
                    Function::Month => "month",
                    Function::Day => "day",
                    Function::Hours => "hour",
                    Function::Minutes => "minute",
                    _ => "second",
                };
                Ok(format!(
                    "EXTRACT({field} FROM ({})::timestamptz)",
                    arg_value(self, 0)?
                ))
            }
            Function::Timezone | Function::Tz => Err(EngineError::UnsupportedFeature(
                "TIMEZONE()/TZ() are not supported".to_string(),
            )),
            Function::Md5 | Function::Sha1 | Function::Sha256 | Function::Sha384 | Function::Sha512 => {
                Err(EngineError::UnsupportedFeature(
                    "hash functions require the pgcrypto extension and are not supported".to_string(),
                ))
            }
            Function::Custom(name) => Err(EngineError::UnsupportedFeature(format!(
                "custom function {} is not supported",
                name.as_str()
            ))),
            #[allow(unreachable_patterns)]
            _ => Err(EngineError::UnsupportedFeature(
                "this function is not supported".to_string(),
            )),
        }
    }
}

fn sql_escape(s: &str) -> String {
    s.replace('\'', "''")
}

/// SQL array-literal element list of every XSD datatype URI this translator
/// treats as numeric, for the runtime membership test `is_dynamically_numeric`
/// compiles a variable's actual datatype against.
fn numeric_datatype_array() -> String {
    NUMERIC_DATATYPES.iter().map(|u| format!("'{u}'")).collect::<Vec<_>>().join(", ")
}

/// Used by `bgp.rs` to decide whether a `NamedNodePattern` (predicate
/// position) is a constant or a variable.
pub fn is_predicate_variable(pattern: &NamedNodePattern) -> Option<&Variable> {
    match pattern {
        NamedNodePattern::Variable(v) => Some(v),
        NamedNodePattern::NamedNode(_) => None,
    }
}

/// True if `pattern` is a bound (non-variable) term position.
pub fn is_constant(pattern: &TermPattern) -> bool {
    !matches!(pattern, TermPattern::Variable(_))
}
