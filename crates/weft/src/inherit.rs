//! Template inheritance: hierarchy building and block resolution.
//!
//! A derived template names its parent with an `extends` node; the resolver
//! follows that chain to the base-most template, collects every block
//! definition along the way (most-derived wins), and assembles a resolved
//! template: the root's body with each block's effective definition spliced
//! in. `super()` support keeps the older definitions around, ordered from
//! most-derived to base.

use std::sync::Arc;

use ahash::AHashMap;
use tracing::debug;

use crate::{exception::TemplateError, loader::TemplateLoader, nodes::Node};

/// The linearized extends chain of one template, with its block overrides.
#[derive(Debug)]
pub struct InheritanceHierarchy {
    /// The base-most template.
    pub root: String,
    /// Chain in base → derived order; `root` is always first.
    pub templates: Vec<String>,
    /// Block definitions by name, most-derived first. Index 0 is the
    /// effective definition; higher indices are what `super()` walks.
    blocks: AHashMap<String, Vec<Arc<Vec<Node>>>>,
    /// Loaded ASTs for every chain member.
    template_map: AHashMap<String, Arc<Node>>,
}

impl InheritanceHierarchy {
    /// The effective definition of a block.
    #[must_use]
    pub fn block(&self, name: &str) -> Option<&Arc<Vec<Node>>> {
        self.block_at_depth(name, 0)
    }

    /// The definition `depth` steps older than the effective one.
    /// `depth` 1 is what a first `super()` call renders.
    #[must_use]
    pub fn block_at_depth(&self, name: &str, depth: usize) -> Option<&Arc<Vec<Node>>> {
        self.blocks.get(name).and_then(|defs| defs.get(depth))
    }

    #[must_use]
    pub fn template(&self, name: &str) -> Option<&Arc<Node>> {
        self.template_map.get(name)
    }

    #[must_use]
    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }
}

/// A resolved template ready to render, as stored in the resolved-template
/// cache. The node is shared so repeated cache hits hand out the same AST.
#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    pub node: Arc<Node>,
    /// Every template the resolution depended on, derived first. Used for
    /// dependency invalidation.
    pub chain: Vec<String>,
}

/// Follows `extends` links from `name` to the base template and assembles
/// the hierarchy. A template naming itself or any ancestor as parent is a
/// cycle and fails with `InheritanceError`.
pub(crate) fn build_hierarchy(
    loader: &dyn TemplateLoader,
    name: &str,
) -> Result<InheritanceHierarchy, TemplateError> {
    let mut derived_first: Vec<(String, Arc<Node>)> = Vec::new();
    let mut current = name.to_owned();

    loop {
        if derived_first.iter().any(|(seen, _)| *seen == current) {
            let mut chain: Vec<&str> = derived_first.iter().map(|(n, _)| n.as_str()).collect();
            chain.push(&current);
            return Err(TemplateError::inheritance_error(format!(
                "cyclic extends chain: {}",
                chain.join(" -> ")
            )));
        }

        let ast = Arc::new(loader.load_template(&current)?);
        let parent = ast.extends_parent().map(ToOwned::to_owned);
        derived_first.push((current, ast));

        match parent {
            Some(next) => current = next,
            None => break,
        }
    }

    let mut blocks: AHashMap<String, Vec<Arc<Vec<Node>>>> = AHashMap::new();
    for (_, ast) in &derived_first {
        collect_blocks(ast.top_level_body(), &mut blocks);
    }

    let root = derived_first
        .last()
        .map(|(n, _)| n.clone())
        .unwrap_or_default();
    let templates: Vec<String> = derived_first.iter().rev().map(|(n, _)| n.clone()).collect();
    let template_map: AHashMap<String, Arc<Node>> = derived_first.into_iter().collect();

    debug!(template = name, root = %root, depth = templates.len(), "built inheritance hierarchy");
    Ok(InheritanceHierarchy {
        root,
        templates,
        blocks,
        template_map,
    })
}

/// Collects block definitions in document order, descending into nested
/// blocks and control-flow bodies. Within one template the outermost
/// definition of a name wins; across templates the caller's iteration order
/// (derived first) makes the most-derived definition land first.
fn collect_blocks(nodes: &[Node], out: &mut AHashMap<String, Vec<Arc<Vec<Node>>>>) {
    for node in nodes {
        match node {
            Node::Block { name, body, .. } => {
                out.entry(name.clone()).or_default().push(Arc::new(body.clone()));
                collect_blocks(body, out);
            }
            Node::If { body, elifs, or_else, .. } => {
                collect_blocks(body, out);
                for (_, elif_body) in elifs {
                    collect_blocks(elif_body, out);
                }
                collect_blocks(or_else, out);
            }
            Node::For { body, or_else, .. } => {
                collect_blocks(body, out);
                collect_blocks(or_else, out);
            }
            _ => {}
        }
    }
}

/// Builds the resolved template for a hierarchy: the root's body with each
/// block's effective definition spliced in.
pub(crate) fn resolve_template(hierarchy: &InheritanceHierarchy) -> Result<ResolvedTemplate, TemplateError> {
    let root_ast = hierarchy
        .template(&hierarchy.root)
        .ok_or_else(|| TemplateError::inheritance_error(format!("root template '{}' missing", hierarchy.root)))?;

    let body = splice_blocks(root_ast.top_level_body(), hierarchy);
    let node = Arc::new(Node::Template {
        name: hierarchy
            .templates
            .last()
            .cloned()
            .unwrap_or_else(|| hierarchy.root.clone()),
        body,
    });

    let mut chain: Vec<String> = hierarchy.templates.clone();
    chain.reverse();
    Ok(ResolvedTemplate { node, chain })
}

fn splice_blocks(nodes: &[Node], hierarchy: &InheritanceHierarchy) -> Vec<Node> {
    nodes
        .iter()
        .filter(|node| !matches!(node, Node::Extends { .. }))
        .map(|node| match node {
            Node::Block { name, body, position } => {
                let effective = hierarchy
                    .block(name)
                    .map_or_else(|| body.clone(), |defs| defs.as_ref().clone());
                Node::Block {
                    name: name.clone(),
                    // nested blocks inside the effective body resolve too
                    body: splice_nested(&effective, name, hierarchy),
                    position: *position,
                }
            }
            Node::If {
                test,
                body,
                elifs,
                or_else,
                position,
            } => Node::If {
                test: test.clone(),
                body: splice_blocks(body, hierarchy),
                elifs: elifs
                    .iter()
                    .map(|(cond, elif_body)| (cond.clone(), splice_blocks(elif_body, hierarchy)))
                    .collect(),
                or_else: splice_blocks(or_else, hierarchy),
                position: *position,
            },
            Node::For {
                target,
                iter,
                body,
                or_else,
                position,
            } => Node::For {
                target: target.clone(),
                iter: iter.clone(),
                body: splice_blocks(body, hierarchy),
                or_else: splice_blocks(or_else, hierarchy),
                position: *position,
            },
            other => other.clone(),
        })
        .collect()
}

/// Like `splice_blocks` but guards against a block containing a block of
/// the same name, which would otherwise substitute forever.
fn splice_nested(nodes: &[Node], current: &str, hierarchy: &InheritanceHierarchy) -> Vec<Node> {
    nodes
        .iter()
        .map(|node| match node {
            Node::Block { name, body, position } if name != current => {
                let effective = hierarchy
                    .block(name)
                    .map_or_else(|| body.clone(), |defs| defs.as_ref().clone());
                Node::Block {
                    name: name.clone(),
                    body: splice_nested(&effective, name, hierarchy),
                    position: *position,
                }
            }
            other => other.clone(),
        })
        .collect()
}
