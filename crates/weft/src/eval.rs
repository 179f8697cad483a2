//! Expression evaluation.
//!
//! One method per expression kind, dispatched from [`Renderer::eval_expr`].
//! Everything here reads the context; mutation happens only in statement
//! evaluation ([`crate::run`]).

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    context::ContextWrapper,
    exception::{ErrorKind, RenderError, RenderResult, TemplateError},
    expressions::{CallArgs, CmpOperator, CodeRange, Expr, ExprLoc, LogicOperator, Operator, UnpackTarget},
    namespace::MacroValue,
    run::{Renderer, bind_unpack},
    undefined::resolve_missing,
    value::{HostFunction, Value},
};

impl Renderer<'_> {
    /// Evaluates one expression to a value.
    pub(crate) fn eval_expr(&mut self, expr: &ExprLoc, ctx: &ContextWrapper) -> RenderResult<Value> {
        let position = expr.position;
        match &expr.expr {
            Expr::Literal(literal) => Ok(Value::from(literal.clone())),
            Expr::Name(name) => self.lookup_name(name, position, ctx),
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_expr(item, ctx)?);
                }
                Ok(Value::List(out))
            }
            Expr::Dict(pairs) => {
                let mut map = IndexMap::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = self.eval_expr(key, ctx)?.to_string();
                    map.insert(key, self.eval_expr(value, ctx)?);
                }
                Ok(Value::Dict(map))
            }
            Expr::Op { left, op, right } => {
                let left = self.eval_expr(left, ctx)?;
                let right = self.eval_expr(right, ctx)?;
                apply_operator(*op, &left, &right).map_err(|err| RenderError::from(err.at(position)))
            }
            Expr::CmpOp { left, op, right } => {
                let left = self.eval_expr(left, ctx)?;
                let right = self.eval_expr(right, ctx)?;
                compare(*op, &left, &right).map_err(|err| RenderError::from(err.at(position)))
            }
            Expr::Logic { left, op, right } => {
                let left = self.eval_expr(left, ctx)?;
                match op {
                    // short-circuit: the right operand is untouched when the
                    // left already decides
                    LogicOperator::And if !left.truthy() => Ok(Value::Bool(false)),
                    LogicOperator::And => self.eval_expr(right, ctx),
                    // `or` keeps the left value uncoerced so expressions like
                    // `name or "guest"` preserve non-boolean semantics
                    LogicOperator::Or if left.truthy() => Ok(left),
                    LogicOperator::Or => self.eval_expr(right, ctx),
                }
            }
            Expr::Not(inner) => Ok(Value::Bool(!self.eval_expr(inner, ctx)?.truthy())),
            Expr::Neg(inner) => match self.eval_expr(inner, ctx)? {
                Value::Int(v) => Ok(Value::Int(-v)),
                Value::Float(v) => Ok(Value::Float(-v)),
                other => Err(RenderError::from(
                    TemplateError::type_error(format!("cannot negate {}", other.type_name())).at(position),
                )),
            },
            Expr::AttrGet { object, attr } => {
                let object = self.eval_expr(object, ctx)?;
                self.attr_lookup(&object, attr, position)
            }
            Expr::Subscript { object, index } => {
                let object = self.eval_expr(object, ctx)?;
                let index = self.eval_expr(index, ctx)?;
                item_lookup(&object, &index, position)
            }
            Expr::Slice {
                object,
                lower,
                upper,
                step,
            } => {
                let object = self.eval_expr(object, ctx)?;
                let lower = self.eval_slice_bound(lower.as_deref(), ctx)?;
                let upper = self.eval_slice_bound(upper.as_deref(), ctx)?;
                let step = match step {
                    Some(expr) => self
                        .eval_expr(expr, ctx)?
                        .as_index()
                        .ok_or_else(|| RenderError::from(integer_step_error().at(position)))?,
                    None => 1,
                };
                eval_slice(&object, lower, upper, step).map_err(|err| RenderError::from(err.at(position)))
            }
            Expr::Call { callable, args } => self.eval_call(callable, args, position, ctx),
            Expr::Filter { .. } => self.eval_filter_chain(expr, ctx),
            Expr::Test {
                value,
                name,
                args,
                negated,
            } => {
                let value = self.eval_expr(value, ctx)?;
                let test = self
                    .env
                    .tests()
                    .get(name)
                    .ok_or_else(|| RenderError::from(TemplateError::test_not_found(name).at(position)))?;
                let mut arg_values = Vec::with_capacity(args.positional.len());
                for arg in &args.positional {
                    arg_values.push(self.eval_expr(arg, ctx)?);
                }
                let outcome = test(&value, &arg_values).map_err(|err| RenderError::from(err.at(position)))?;
                Ok(Value::Bool(outcome != *negated))
            }
            Expr::IfElse { test, body, orelse } => {
                if self.eval_expr(test, ctx)?.truthy() {
                    self.eval_expr(body, ctx)
                } else {
                    self.eval_expr(orelse, ctx)
                }
            }
            Expr::ListComp {
                elt,
                target,
                iter,
                cond,
            } => {
                let items = self.comprehension_items(iter, target, ctx)?;
                let mut scope = ctx.scoped();
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    bind_unpack(&mut scope, target, item, position)?;
                    if !self.comprehension_included(cond.as_deref(), &scope)? {
                        continue;
                    }
                    out.push(self.eval_expr(elt, &scope)?);
                }
                Ok(Value::List(out))
            }
            Expr::DictComp {
                key,
                value,
                target,
                iter,
                cond,
            } => {
                let items = self.comprehension_items(iter, target, ctx)?;
                let mut scope = ctx.scoped();
                let mut map = IndexMap::with_capacity(items.len());
                for item in items {
                    bind_unpack(&mut scope, target, item, position)?;
                    if !self.comprehension_included(cond.as_deref(), &scope)? {
                        continue;
                    }
                    let key = self.eval_expr(key, &scope)?.to_string();
                    map.insert(key, self.eval_expr(value, &scope)?);
                }
                Ok(Value::Dict(map))
            }
        }
    }

    fn lookup_name(&mut self, name: &str, position: CodeRange, ctx: &ContextWrapper) -> RenderResult<Value> {
        if let Some(value) = ctx.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.env.global(name) {
            return Ok(value);
        }
        resolve_missing(name, position)
    }

    fn comprehension_items(
        &mut self,
        iter: &ExprLoc,
        target: &UnpackTarget,
        ctx: &ContextWrapper,
    ) -> RenderResult<Vec<Value>> {
        let iterable = self.eval_expr(iter, ctx)?;
        iterable
            .make_iterable_for_unpack(target.arity())
            .map_err(|err| RenderError::from(err.at(iter.position)))
    }

    fn comprehension_included(&mut self, cond: Option<&ExprLoc>, scope: &ContextWrapper) -> RenderResult<bool> {
        match cond {
            Some(cond) => Ok(self.eval_expr(cond, scope)?.truthy()),
            None => Ok(true),
        }
    }

    fn eval_slice_bound(&mut self, bound: Option<&ExprLoc>, ctx: &ContextWrapper) -> RenderResult<Option<i64>> {
        match bound {
            None => Ok(None),
            Some(expr) => {
                let value = self.eval_expr(expr, ctx)?;
                value
                    .as_index()
                    .map(Some)
                    .ok_or_else(|| RenderError::from(integer_step_error().at(expr.position)))
            }
        }
    }

    /// Attribute lookup ladder.
    ///
    /// In order: dict key, synthesized dict methods (`items`/`keys`/`values`),
    /// sequence index when the attribute is numeric, namespace exports, host
    /// object fields (literal name, then capitalized for host export
    /// conventions). A miss falls to the undefined policy.
    pub(crate) fn attr_lookup(&mut self, object: &Value, attr: &str, position: CodeRange) -> RenderResult<Value> {
        match object {
            Value::Dict(map) => {
                if let Some(value) = map.get(attr) {
                    return Ok(value.clone());
                }
                if let Some(synthesized) = dict_method(map, attr) {
                    return Ok(synthesized);
                }
                resolve_missing(attr, position)
            }
            Value::List(items) => {
                if let Ok(index) = attr.parse::<usize>()
                    && let Some(value) = items.get(index)
                {
                    return Ok(value.clone());
                }
                resolve_missing(attr, position)
            }
            Value::Namespace(namespace) => match namespace.get(attr) {
                Some(value) => Ok(value),
                None => resolve_missing(&format!("{}.{attr}", namespace.template_name), position),
            },
            Value::Object(object) => {
                if let Some(value) = object.clone().attr(attr) {
                    return Ok(value);
                }
                // retry with the first letter capitalized, for hosts that
                // export capitalized field names
                let mut chars = attr.chars();
                if let Some(first) = chars.next() {
                    let capitalized: String = first.to_uppercase().chain(chars).collect();
                    if capitalized != attr
                        && let Some(value) = object.clone().attr(&capitalized)
                    {
                        return Ok(value);
                    }
                }
                resolve_missing(attr, position)
            }
            Value::Undefined { name } => resolve_missing(&format!("{name}.{attr}"), position),
            _ => resolve_missing(attr, position),
        }
    }

    /// Call evaluation: `super()`, host functions, and macros.
    fn eval_call(
        &mut self,
        callable: &ExprLoc,
        args: &CallArgs,
        position: CodeRange,
        ctx: &ContextWrapper,
    ) -> RenderResult<Value> {
        if let Expr::Name(name) = &callable.expr
            && name == "super"
            && args.is_empty()
        {
            return self.render_super(position, ctx);
        }

        let target = self.eval_expr(callable, ctx)?;
        let (positional, named) = self.eval_call_args(args, ctx)?;
        match target {
            Value::Callable(function) => function
                .call(&positional, &named)
                .map_err(|err| RenderError::from(err.at(position))),
            Value::Macro(macro_value) => self.call_macro(&macro_value, positional, named, None, ctx, position),
            other => Err(RenderError::from(
                TemplateError::type_error(format!("value of type {} is not callable", other.type_name()))
                    .at(position),
            )),
        }
    }

    pub(crate) fn eval_call_args(
        &mut self,
        args: &CallArgs,
        ctx: &ContextWrapper,
    ) -> RenderResult<(Vec<Value>, IndexMap<String, Value>)> {
        let mut positional = Vec::with_capacity(args.positional.len());
        for arg in &args.positional {
            positional.push(self.eval_expr(arg, ctx)?);
        }
        let mut named = IndexMap::with_capacity(args.named.len());
        for (name, arg) in &args.named {
            named.insert(name.clone(), self.eval_expr(arg, ctx)?);
        }
        Ok((positional, named))
    }

    /// Invokes a macro per the closure rules: the body evaluates in a fresh
    /// child of the macro's *definition* context, never the caller's.
    pub(crate) fn call_macro(
        &mut self,
        macro_value: &MacroValue,
        positional: Vec<Value>,
        named: IndexMap<String, Value>,
        caller: Option<Value>,
        ctx: &ContextWrapper,
        position: CodeRange,
    ) -> RenderResult<Value> {
        let (scope, lazy_defaults) = macro_value
            .bind_call(positional, named)
            .map_err(|err| RenderError::from(err.at(position)))?;
        let mut wrapper = ctx.rescoped(scope);

        match caller {
            Some(caller) => wrapper.set("caller", caller),
            // thread an outer `caller` through nested macro calls
            None => {
                if let Some(existing) = ctx.get("caller") {
                    wrapper.set("caller", existing.clone());
                }
            }
        }

        for (name, default_expr) in lazy_defaults {
            let value = self.eval_expr(&default_expr, &wrapper)?;
            wrapper.set(name, value);
        }

        // the macro body is its own frame: a signal escaping it was never
        // inside a loop of this body, so it surfaces as a syntax error here
        // instead of being intercepted by a loop at the call site
        let rendered = match self.render_to_string(&macro_value.body, &mut wrapper) {
            Ok(rendered) => rendered,
            Err(signal @ (RenderError::Break(_) | RenderError::Continue(_))) => {
                return Err(RenderError::from(signal.into_template_error()));
            }
            Err(err) => return Err(err),
        };
        Ok(Value::Safe(rendered))
    }

    /// Renders the next-older definition of the innermost block.
    fn render_super(&mut self, position: CodeRange, ctx: &ContextWrapper) -> RenderResult<Value> {
        let Some((name, depth)) = self.block_stack.last().cloned() else {
            return Err(RenderError::from(
                TemplateError::new(ErrorKind::SyntaxError, "super() called outside a block").at(position),
            ));
        };
        let body = self
            .hierarchy
            .as_ref()
            .and_then(|hierarchy| hierarchy.block_at_depth(&name, depth + 1))
            .cloned()
            .ok_or_else(|| {
                RenderError::from(
                    TemplateError::inheritance_error(format!("block '{name}' has no parent definition"))
                        .at(position),
                )
            })?;

        self.block_stack.push((name, depth + 1));
        let mut scope = ctx.scoped();
        let result = self.render_to_string(&body, &mut scope);
        self.block_stack.pop();
        Ok(Value::Safe(result?))
    }

    /// Flattens and applies a filter chain.
    ///
    /// The chain nests through the `value` side of each filter node; walking
    /// down to the innermost non-filter expression and reversing recovers
    /// the textual order. The input is evaluated exactly once, then each
    /// filter applies in turn with its arguments evaluated against the
    /// caller's context immediately before application.
    fn eval_filter_chain(&mut self, expr: &ExprLoc, ctx: &ContextWrapper) -> RenderResult<Value> {
        let mut chain: SmallVec<[(&str, &CallArgs, CodeRange); 4]> = SmallVec::new();
        let mut cursor = expr;
        while let Expr::Filter { value, name, args } = &cursor.expr {
            chain.push((name, args, cursor.position));
            cursor = value;
        }
        chain.reverse();

        let mut current = self.eval_expr(cursor, ctx)?;
        for (name, args, position) in chain {
            let filter = self
                .env
                .filters()
                .get(name)
                .ok_or_else(|| RenderError::from(TemplateError::filter_not_found(name).at(position)))?;
            let mut arg_values = Vec::with_capacity(args.positional.len());
            for arg in &args.positional {
                arg_values.push(self.eval_expr(arg, ctx)?);
            }
            current = filter(&current, &arg_values).map_err(|err| RenderError::from(err.at(position)))?;
        }
        Ok(current)
    }
}

fn integer_step_error() -> TemplateError {
    TemplateError::type_error("slice indices must be integers")
}

/// Synthesized zero-argument methods on dict values.
fn dict_method(map: &IndexMap<String, Value>, attr: &str) -> Option<Value> {
    match attr {
        "items" => {
            let pairs: Vec<Value> = map
                .iter()
                .map(|(k, v)| Value::List(vec![Value::String(k.clone()), v.clone()]))
                .collect();
            Some(Value::Callable(HostFunction::new(move |_, _| Ok(Value::List(pairs.clone())))))
        }
        "keys" => {
            let keys: Vec<Value> = map.keys().map(|k| Value::String(k.clone())).collect();
            Some(Value::Callable(HostFunction::new(move |_, _| Ok(Value::List(keys.clone())))))
        }
        "values" => {
            let values: Vec<Value> = map.values().cloned().collect();
            Some(Value::Callable(HostFunction::new(move |_, _| Ok(Value::List(values.clone())))))
        }
        _ => None,
    }
}

/// Item access: dict by key, sequence and string by (possibly negative)
/// index with out-of-range yielding undefined rather than an error.
pub(crate) fn item_lookup(object: &Value, index: &Value, position: CodeRange) -> RenderResult<Value> {
    match object {
        Value::Dict(map) => {
            let key = index.to_string();
            match map.get(&key) {
                Some(value) => Ok(value.clone()),
                None => resolve_missing(&key, position),
            }
        }
        Value::List(items) => {
            let raw = index.as_index().ok_or_else(|| {
                RenderError::from(
                    TemplateError::type_error(format!(
                        "list indices must be integers, got {}",
                        index.type_name()
                    ))
                    .at(position),
                )
            })?;
            Ok(sequence_index(items.len(), raw)
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_else(|| Value::undefined(format!("[{raw}]"))))
        }
        Value::String(s) | Value::Safe(s) => {
            let raw = index.as_index().ok_or_else(|| {
                RenderError::from(
                    TemplateError::type_error(format!(
                        "string indices must be integers, got {}",
                        index.type_name()
                    ))
                    .at(position),
                )
            })?;
            let chars: Vec<char> = s.chars().collect();
            Ok(sequence_index(chars.len(), raw)
                .and_then(|i| chars.get(i).copied())
                .map_or_else(|| Value::undefined(format!("[{raw}]")), |c| Value::String(c.to_string())))
        }
        Value::Object(host) => match host.clone().item(index) {
            Some(value) => Ok(value),
            None => resolve_missing(&index.to_string(), position),
        },
        Value::Undefined { name } => resolve_missing(&format!("{name}[{index}]"), position),
        other => Err(RenderError::from(
            TemplateError::type_error(format!("value of type {} is not subscriptable", other.type_name()))
                .at(position),
        )),
    }
}

/// Negative-from-end index normalization. Out-of-range maps to `None`.
fn sequence_index(len: usize, raw: i64) -> Option<usize> {
    let len = len as i64;
    let normalized = if raw < 0 { raw + len } else { raw };
    if normalized < 0 || normalized >= len {
        None
    } else {
        Some(normalized as usize)
    }
}

/// Python-style slicing over lists and strings.
pub(crate) fn eval_slice(
    object: &Value,
    lower: Option<i64>,
    upper: Option<i64>,
    step: i64,
) -> Result<Value, TemplateError> {
    if step == 0 {
        return Err(TemplateError::value_error("slice step cannot be zero"));
    }
    match object {
        Value::List(items) => {
            let picked = slice_indices(items.len(), lower, upper, step)
                .into_iter()
                .map(|i| items[i].clone())
                .collect();
            Ok(Value::List(picked))
        }
        Value::String(s) | Value::Safe(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked: String = slice_indices(chars.len(), lower, upper, step)
                .into_iter()
                .map(|i| chars[i])
                .collect();
            Ok(Value::String(picked))
        }
        other => Err(TemplateError::type_error(format!(
            "value of type {} cannot be sliced",
            other.type_name()
        ))),
    }
}

/// Resolves slice bounds the way Python's `slice.indices` does and returns
/// the selected indices in iteration order.
fn slice_indices(len: usize, lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let clamp = |value: i64| {
        if value < 0 {
            (value + len).max(if step < 0 { -1 } else { 0 })
        } else {
            value.min(if step < 0 { len - 1 } else { len })
        }
    };

    let start = lower.map_or_else(|| if step < 0 { len - 1 } else { 0 }, clamp);
    let stop = upper.map_or_else(|| if step < 0 { -1 } else { len }, clamp);

    let mut indices = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        if i >= 0 && i < len {
            indices.push(i as usize);
        }
        i += step;
    }
    indices
}

/// Membership for `in` / `not in`: substring on strings, equality scan on
/// lists, key presence on dicts. An undefined container contains nothing.
pub(crate) fn value_contains(container: &Value, item: &Value) -> Result<bool, TemplateError> {
    match container {
        Value::String(s) | Value::Safe(s) => match item.as_str() {
            Some(needle) => Ok(s.contains(needle)),
            None => Err(TemplateError::type_error(format!(
                "'in <string>' requires string as left operand, got {}",
                item.type_name()
            ))),
        },
        Value::List(items) => Ok(items.contains(item)),
        Value::Dict(map) => Ok(map.contains_key(&item.to_string())),
        Value::Undefined { .. } => Ok(false),
        other => Err(TemplateError::type_error(format!(
            "argument of type {} is not a container",
            other.type_name()
        ))),
    }
}

/// Binary operator dispatch with numeric coercion: int op int stays int,
/// any float operand promotes to float. Bools never coerce to numbers.
pub(crate) fn apply_operator(op: Operator, left: &Value, right: &Value) -> Result<Value, TemplateError> {
    match op {
        Operator::Concat => Ok(Value::String(format!("{left}{right}"))),
        Operator::Add => match (left, right) {
            (Value::String(a) | Value::Safe(a), Value::String(b) | Value::Safe(b)) => {
                Ok(Value::String(format!("{a}{b}")))
            }
            (Value::List(a), Value::List(b)) => {
                let mut out = a.clone();
                out.extend(b.iter().cloned());
                Ok(Value::List(out))
            }
            _ => numeric_op(op, left, right),
        },
        Operator::Mul => match (left, right) {
            (Value::String(s) | Value::Safe(s), Value::Int(n)) | (Value::Int(n), Value::String(s) | Value::Safe(s)) => {
                Ok(Value::String(s.repeat(usize::try_from(*n).unwrap_or(0))))
            }
            (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
                let count = usize::try_from(*n).unwrap_or(0);
                let mut out = Vec::with_capacity(items.len() * count);
                for _ in 0..count {
                    out.extend(items.iter().cloned());
                }
                Ok(Value::List(out))
            }
            _ => numeric_op(op, left, right),
        },
        Operator::Sub | Operator::Div | Operator::FloorDiv | Operator::Mod | Operator::Pow => {
            numeric_op(op, left, right)
        }
    }
}

fn numeric_op(op: Operator, left: &Value, right: &Value) -> Result<Value, TemplateError> {
    use crate::value::Num;

    let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
        return Err(TemplateError::type_error(format!(
            "unsupported operand types for {op:?}: {} and {}",
            left.type_name(),
            right.type_name()
        )));
    };

    if let (Num::Int(a), Num::Int(b)) = (a, b) {
        return int_op(op, a, b);
    }

    let (a, b) = (a.as_f64(), b.as_f64());
    let result = match op {
        Operator::Add => a + b,
        Operator::Sub => a - b,
        Operator::Mul => a * b,
        Operator::Div => {
            if b == 0.0 {
                return Err(TemplateError::value_error("division by zero"));
            }
            a / b
        }
        Operator::FloorDiv => {
            if b == 0.0 {
                return Err(TemplateError::value_error("division by zero"));
            }
            (a / b).floor()
        }
        Operator::Mod => {
            if b == 0.0 {
                return Err(TemplateError::value_error("division by zero"));
            }
            // the result takes the divisor's sign
            a - b * (a / b).floor()
        }
        Operator::Pow => a.powf(b),
        Operator::Concat => unreachable!("Concat is handled before numeric dispatch"),
    };
    Ok(Value::Float(result))
}

fn int_op(op: Operator, a: i64, b: i64) -> Result<Value, TemplateError> {
    let overflow = || TemplateError::value_error("integer overflow");
    match op {
        Operator::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        Operator::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        Operator::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        // true division always yields a float
        Operator::Div => {
            if b == 0 {
                Err(TemplateError::value_error("division by zero"))
            } else {
                Ok(Value::Float(a as f64 / b as f64))
            }
        }
        Operator::FloorDiv => {
            if b == 0 {
                return Err(TemplateError::value_error("division by zero"));
            }
            // floored division: rounds toward negative infinity
            let quotient = a / b;
            let remainder = a % b;
            let floored = if remainder != 0 && (remainder < 0) != (b < 0) {
                quotient - 1
            } else {
                quotient
            };
            Ok(Value::Int(floored))
        }
        Operator::Mod => {
            if b == 0 {
                return Err(TemplateError::value_error("division by zero"));
            }
            // the result takes the divisor's sign
            let remainder = a % b;
            let adjusted = if remainder != 0 && (remainder < 0) != (b < 0) {
                remainder + b
            } else {
                remainder
            };
            Ok(Value::Int(adjusted))
        }
        Operator::Pow => {
            if b >= 0 {
                let exponent = u32::try_from(b).map_err(|_| overflow())?;
                a.checked_pow(exponent).map(Value::Int).ok_or_else(overflow)
            } else {
                Ok(Value::Float((a as f64).powi(b as i32)))
            }
        }
        Operator::Concat => unreachable!("Concat is handled before numeric dispatch"),
    }
}

/// Comparison dispatch. Equality is total; ordering requires comparable
/// variants.
pub(crate) fn compare(op: CmpOperator, left: &Value, right: &Value) -> Result<Value, TemplateError> {
    use std::cmp::Ordering;

    let outcome = match op {
        CmpOperator::Eq => left == right,
        CmpOperator::NotEq => left != right,
        CmpOperator::In => value_contains(right, left)?,
        CmpOperator::NotIn => !value_contains(right, left)?,
        CmpOperator::Lt | CmpOperator::LtE | CmpOperator::Gt | CmpOperator::GtE => {
            let ordering = left.try_cmp(right).ok_or_else(|| {
                TemplateError::type_error(format!(
                    "values of type {} and {} are not orderable",
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            match op {
                CmpOperator::Lt => ordering == Ordering::Less,
                CmpOperator::LtE => ordering != Ordering::Greater,
                CmpOperator::Gt => ordering == Ordering::Greater,
                CmpOperator::GtE => ordering != Ordering::Less,
                _ => unreachable!(),
            }
        }
    };
    Ok(Value::Bool(outcome))
}
