//! Tests for macros, imports, autoescaping, batch filters, and extension
//! hooks.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use weft::{
    AssignTarget, CallArgs, CodeRange, Context, ContextWrapper, DefaultEscaper, Environment,
    ErrorKind, EscapeContext, Expr, ExprLoc, ExtensionEval, FilterJob, Literal, MacroParam,
    MemoryLoader, Node, Operator, UnpackTarget, Value,
};

fn origin() -> CodeRange {
    CodeRange::default()
}

fn text(content: &str) -> Node {
    Node::Text {
        content: content.to_owned(),
        position: origin(),
    }
}

fn var(expr: ExprLoc) -> Node {
    Node::Variable { expr }
}

fn name(identifier: &str) -> ExprLoc {
    ExprLoc::at_origin(Expr::Name(identifier.to_owned()))
}

fn string(value: &str) -> ExprLoc {
    ExprLoc::at_origin(Expr::Literal(Literal::Str(value.to_owned())))
}

fn int(value: i64) -> ExprLoc {
    ExprLoc::at_origin(Expr::Literal(Literal::Int(value)))
}

fn attr(object: ExprLoc, attribute: &str) -> ExprLoc {
    ExprLoc::at_origin(Expr::AttrGet {
        object: Box::new(object),
        attr: attribute.to_owned(),
    })
}

fn call(callable: ExprLoc, args: CallArgs) -> ExprLoc {
    ExprLoc::at_origin(Expr::Call {
        callable: Box::new(callable),
        args: Box::new(args),
    })
}

fn set_name(target: &str, value: ExprLoc) -> Node {
    Node::Set {
        target: AssignTarget::Name(target.to_owned()),
        value,
        position: origin(),
    }
}

fn template(template_name: &str, body: Vec<Node>) -> Node {
    Node::Template {
        name: template_name.to_owned(),
        body,
    }
}

fn render(body: Vec<Node>, context: Context) -> Result<String, weft::TemplateError> {
    Environment::new(MemoryLoader::new()).render_node(&template("test", body), context)
}

// =============================================================================
// 1. Macro definition and invocation
// =============================================================================

fn greet_macro() -> Node {
    Node::Macro {
        name: "greet".to_owned(),
        params: vec![
            MacroParam::required("who"),
            MacroParam::with_default("punct", string("!")),
        ],
        body: vec![text("hi "), var(name("who")), var(name("punct"))],
        position: origin(),
    }
}

/// Positional arguments bind in order; defaults fill the gaps.
#[test]
fn macro_binds_positional_and_defaults() {
    let body = vec![
        greet_macro(),
        var(call(name("greet"), CallArgs::positional(vec![string("world")]))),
    ];
    assert_eq!(render(body, Context::new()).unwrap(), "hi world!");
}

/// Named arguments override positional binding and defaults.
#[test]
fn macro_named_arguments_override() {
    let args = CallArgs {
        positional: vec![string("world")],
        named: vec![("punct".to_owned(), string("?"))],
    };
    let body = vec![greet_macro(), var(call(name("greet"), args))];
    assert_eq!(render(body, Context::new()).unwrap(), "hi world?");
}

/// A missing required parameter is a `MacroError` naming the parameter.
#[test]
fn macro_missing_parameter_fails() {
    let body = vec![greet_macro(), var(call(name("greet"), CallArgs::default()))];
    let err = render(body, Context::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MacroError);
    assert!(err.message().contains("who"), "got: {}", err.message());
}

/// Too many positional arguments and unknown named arguments both fail.
#[test]
fn macro_arity_checks() {
    let too_many = CallArgs::positional(vec![string("a"), string("b"), string("c")]);
    let body = vec![greet_macro(), var(call(name("greet"), too_many))];
    assert_eq!(render(body, Context::new()).unwrap_err().kind(), ErrorKind::MacroError);

    let unknown = CallArgs {
        positional: vec![],
        named: vec![("nope".to_owned(), string("x"))],
    };
    let body = vec![greet_macro(), var(call(name("greet"), unknown))];
    assert_eq!(render(body, Context::new()).unwrap_err().kind(), ErrorKind::MacroError);
}

/// A macro closes over its definition context: a later reassignment in the
/// defining scope is invisible to the body.
#[test]
fn macro_captures_definition_context() {
    let body = vec![
        set_name("x", string("old")),
        Node::Macro {
            name: "show".to_owned(),
            params: vec![],
            body: vec![var(name("x"))],
            position: origin(),
        },
        set_name("x", string("new")),
        var(call(name("show"), CallArgs::default())),
        text("/"),
        var(name("x")),
    ];
    assert_eq!(render(body, Context::new()).unwrap(), "old/new");
}

/// Default expressions evaluate lazily against the call context, so one
/// parameter's default may reference another parameter.
#[test]
fn macro_defaults_evaluate_lazily() {
    let double = ExprLoc::at_origin(Expr::Op {
        left: Box::new(name("base")),
        op: Operator::Mul,
        right: Box::new(int(2)),
    });
    let body = vec![
        Node::Macro {
            name: "m".to_owned(),
            params: vec![
                MacroParam::required("base"),
                MacroParam::with_default("doubled", double),
            ],
            body: vec![var(name("doubled"))],
            position: origin(),
        },
        var(call(name("m"), CallArgs::positional(vec![int(21)]))),
    ];
    assert_eq!(render(body, Context::new()).unwrap(), "42");
}

/// `break` inside a macro body does not leak into a loop at the call site.
#[test]
fn macro_body_signals_do_not_escape() {
    let body = vec![
        Node::Macro {
            name: "bad".to_owned(),
            params: vec![],
            body: vec![Node::Break { position: origin() }],
            position: origin(),
        },
        Node::For {
            target: UnpackTarget::Name("x".to_owned()),
            iter: ExprLoc::at_origin(Expr::List(vec![int(1)])),
            body: vec![var(call(name("bad"), CallArgs::default()))],
            or_else: vec![],
            position: origin(),
        },
    ];
    let err = render(body, Context::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
}

// =============================================================================
// 2. Call blocks
// =============================================================================

/// `{% call wrap() %}inner{% endcall %}` exposes the body as `caller`.
#[test]
fn call_block_threads_caller() {
    let wrap = Node::Macro {
        name: "wrap".to_owned(),
        params: vec![],
        body: vec![
            text("["),
            var(call(name("caller"), CallArgs::default())),
            text("]"),
        ],
        position: origin(),
    };
    let body = vec![
        wrap,
        Node::CallBlock {
            call: call(name("wrap"), CallArgs::default()),
            body: vec![text("inner")],
            position: origin(),
        },
    ];
    assert_eq!(render(body, Context::new()).unwrap(), "[inner]");
}

// =============================================================================
// 3. Imports and namespaces
// =============================================================================

fn helpers_template() -> Node {
    template(
        "helpers",
        vec![
            Node::Macro {
                name: "greet".to_owned(),
                params: vec![MacroParam::required("who")],
                body: vec![text("hey "), var(name("who"))],
                position: origin(),
            },
            set_name("answer", int(42)),
        ],
    )
}

/// `import "helpers" as h` exposes macros and variables through the alias.
#[test]
fn import_binds_namespace() {
    let loader = MemoryLoader::new().with("helpers", helpers_template()).with(
        "main",
        template(
            "main",
            vec![
                Node::Import {
                    template: "helpers".to_owned(),
                    alias: "h".to_owned(),
                    position: origin(),
                },
                var(call(attr(name("h"), "greet"), CallArgs::positional(vec![string("x")]))),
                text(" "),
                var(attr(name("h"), "answer")),
            ],
        ),
    );
    let env = Environment::new(loader);
    assert_eq!(env.render("main", Context::new()).unwrap(), "hey x 42");
}

/// `from "helpers" import answer, greet as hello` binds selected exports.
#[test]
fn from_import_binds_selected_names() {
    let loader = MemoryLoader::new().with("helpers", helpers_template()).with(
        "main",
        template(
            "main",
            vec![
                Node::FromImport {
                    template: "helpers".to_owned(),
                    names: vec![
                        ("answer".to_owned(), None),
                        ("greet".to_owned(), Some("hello".to_owned())),
                    ],
                    position: origin(),
                },
                var(call(name("hello"), CallArgs::positional(vec![string("y")]))),
                text(" "),
                var(name("answer")),
            ],
        ),
    );
    let env = Environment::new(loader);
    assert_eq!(env.render("main", Context::new()).unwrap(), "hey y 42");
}

/// Importing a missing export is an error; importing a missing template is
/// tolerated with an empty namespace.
#[test]
fn import_error_paths() {
    let loader = MemoryLoader::new().with("helpers", helpers_template()).with(
        "main",
        template(
            "main",
            vec![Node::FromImport {
                template: "helpers".to_owned(),
                names: vec![("ghost".to_owned(), None)],
                position: origin(),
            }],
        ),
    );
    let env = Environment::new(loader);
    assert_eq!(env.render("main", Context::new()).unwrap_err().kind(), ErrorKind::UndefinedError);

    let loader = MemoryLoader::new().with(
        "main",
        template(
            "main",
            vec![
                Node::Import {
                    template: "nowhere".to_owned(),
                    alias: "n".to_owned(),
                    position: origin(),
                },
                text("["),
                var(attr(name("n"), "anything")),
                text("]"),
            ],
        ),
    );
    let env = Environment::new(loader);
    assert_eq!(env.render("main", Context::new()).unwrap(), "[]");
}

/// Repeated imports of one template share a single cached namespace.
#[test]
fn namespace_extraction_is_cached() {
    let env = Environment::new(MemoryLoader::new().with("helpers", helpers_template()));
    let first = env.namespace_for("helpers").unwrap();
    let second = env.namespace_for("helpers").unwrap();
    assert!(Arc::ptr_eq(&first, &second), "imports must share one namespace");
    assert_eq!(first.variables.get("answer"), Some(&Value::Int(42)));
    assert!(first.macros.contains_key("greet"));
}

/// Conditionally defined macros are discovered inside `if` bodies.
#[test]
fn extraction_descends_into_control_flow() {
    let conditional = template(
        "cond",
        vec![Node::If {
            test: ExprLoc::at_origin(Expr::Literal(Literal::Bool(false))),
            body: vec![Node::Macro {
                name: "hidden".to_owned(),
                params: vec![],
                body: vec![text("h")],
                position: origin(),
            }],
            elifs: vec![],
            or_else: vec![],
            position: origin(),
        }],
    );
    let env = Environment::new(MemoryLoader::new().with("cond", conditional));
    let namespace = env.namespace_for("cond").unwrap();
    assert!(
        namespace.macros.contains_key("hidden"),
        "macros in untaken branches are still exported"
    );
}

/// A namespace variable whose expression fails records a diagnostic
/// placeholder instead of disappearing.
#[test]
fn failed_namespace_variable_keeps_placeholder() {
    let broken = template(
        "broken",
        vec![set_name(
            "bad",
            ExprLoc::at_origin(Expr::Op {
                left: Box::new(int(1)),
                op: Operator::Div,
                right: Box::new(int(0)),
            }),
        )],
    );
    let env = Environment::new(MemoryLoader::new().with("broken", broken));
    let namespace = env.namespace_for("broken").unwrap();
    assert!(
        matches!(namespace.variables.get("bad"), Some(Value::Undefined { .. })),
        "got: {:?}",
        namespace.variables.get("bad")
    );
}

// =============================================================================
// 4. Autoescaping
// =============================================================================

fn escaped_render(body: Vec<Node>, context: Context, escape_context: EscapeContext) -> String {
    let env = Environment::new(MemoryLoader::new());
    let mut wrapper = ContextWrapper::with_escaper(context, Arc::new(DefaultEscaper));
    wrapper.set_escape_context(escape_context);
    env.render_node_with(&template("test", body), wrapper).unwrap()
}

/// With an escaper installed, emitted strings are escaped for the context.
#[test]
fn autoescape_escapes_output() {
    let context: Context = [("html".to_owned(), Value::from("<b>&</b>"))].into_iter().collect();
    let body = vec![var(name("html"))];
    assert_eq!(
        escaped_render(body, context, EscapeContext::Html),
        "&lt;b&gt;&amp;&lt;/b&gt;"
    );
}

/// Safe-wrapped values bypass escaping in every context.
#[test]
fn safe_values_bypass_escaping() {
    let context: Context = [("html".to_owned(), Value::Safe("<b>".to_owned()))]
        .into_iter()
        .collect();
    let body = vec![var(name("html"))];
    assert_eq!(escaped_render(body, context, EscapeContext::Html), "<b>");
}

/// The `safe` filter marks plain strings for bypass.
#[test]
fn safe_filter_marks_output() {
    let safe = ExprLoc::at_origin(Expr::Filter {
        value: Box::new(string("<i>")),
        name: "safe".to_owned(),
        args: Box::new(CallArgs::default()),
    });
    assert_eq!(escaped_render(vec![var(safe)], Context::new(), EscapeContext::Html), "<i>");
}

/// The JS escape context uses string-literal escaping.
#[test]
fn js_context_escapes_quotes() {
    let context: Context = [("v".to_owned(), Value::from("a'b\n"))].into_iter().collect();
    assert_eq!(
        escaped_render(vec![var(name("v"))], context, EscapeContext::Js),
        "a\\'b\\n"
    );
}

/// Without an escaper, values pass through untouched.
#[test]
fn no_escaper_passes_through() {
    let context: Context = [("html".to_owned(), Value::from("<b>"))].into_iter().collect();
    assert_eq!(render(vec![var(name("html"))], context).unwrap(), "<b>");
}

/// Macro output counts as rendered markup and is not escaped again.
#[test]
fn macro_output_is_not_double_escaped() {
    let body = vec![
        Node::Macro {
            name: "tag".to_owned(),
            params: vec![],
            body: vec![text("<hr>")],
            position: origin(),
        },
        var(call(name("tag"), CallArgs::default())),
    ];
    assert_eq!(escaped_render(body, Context::new(), EscapeContext::Html), "<hr>");
}

// =============================================================================
// 5. Batch filter evaluation
// =============================================================================

/// Jobs run concurrently but results come back in job order, with each
/// job's error captured independently.
#[test]
fn batch_results_keep_job_order() {
    let env = Environment::new(MemoryLoader::new());
    let filter = |input: &str, filter_name: &str| {
        ExprLoc::at_origin(Expr::Filter {
            value: Box::new(string(input)),
            name: filter_name.to_owned(),
            args: Box::new(CallArgs::default()),
        })
    };
    let jobs = vec![
        FilterJob {
            expr: filter("a", "upper"),
            context: ContextWrapper::new(Context::new()),
        },
        FilterJob {
            expr: filter("b", "no_such_filter"),
            context: ContextWrapper::new(Context::new()),
        },
        FilterJob {
            expr: filter("  c ", "trim"),
            context: ContextWrapper::new(Context::new()),
        },
    ];

    let results = env.eval_filter_batch(jobs);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap(), &Value::from("A"));
    assert_eq!(results[1].as_ref().unwrap_err().kind(), ErrorKind::FilterNotFoundError);
    assert_eq!(results[2].as_ref().unwrap(), &Value::from("c"));
}

// =============================================================================
// 6. Extension nodes and helper globals
// =============================================================================

/// An extension node renders through its callback.
#[test]
fn extension_node_uses_callback() {
    let node = Node::Extension {
        tag: "stamp".to_owned(),
        evaluator: Some(ExtensionEval(Arc::new(|_, _| Ok(Value::from("stamped"))))),
        position: origin(),
    };
    assert_eq!(render(vec![node], Context::new()).unwrap(), "stamped");
}

/// An extension node without an evaluator is an `ExtensionError`.
#[test]
fn extension_node_without_callback_fails() {
    let node = Node::Extension {
        tag: "stamp".to_owned(),
        evaluator: None,
        position: origin(),
    };
    let err = render(vec![node], Context::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExtensionError);
    assert!(err.message().contains("stamp"));
}

/// The `cycler` global cycles through its arguments across calls.
#[test]
fn cycler_global() {
    let make = call(name("cycler"), CallArgs::positional(vec![string("a"), string("b")]));
    let next = || call(attr(name("c"), "next"), CallArgs::default());
    let body = vec![set_name("c", make), var(next()), var(next()), var(next())];
    assert_eq!(render(body, Context::new()).unwrap(), "aba");
}

/// The `joiner` global emits nothing first, then the separator.
#[test]
fn joiner_global() {
    let make = call(name("joiner"), CallArgs::positional(vec![string(", ")]));
    let body = vec![
        set_name("j", make),
        Node::For {
            target: UnpackTarget::Name("x".to_owned()),
            iter: name("items"),
            body: vec![var(call(name("j"), CallArgs::default())), var(name("x"))],
            or_else: vec![],
            position: origin(),
        },
    ];
    let context: Context = [("items".to_owned(), Value::from(vec![1i64, 2]))]
        .into_iter()
        .collect();
    assert_eq!(render(body, context).unwrap(), "1, 2");
}
