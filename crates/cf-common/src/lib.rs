use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Envelope Node Tree
// ============================================================================

/// A single node in an envelope payload tree.
///
/// The mediation core treats payload content as opaque: it only ever clones,
/// detaches, attaches, and queries nodes. Parsing a concrete wire format into
/// this tree (and serializing it back out) belongs to the transport adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub text: Option<String>,
    pub attributes: IndexMap<String, String>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: None,
            attributes: IndexMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut node = Self::new(name);
        node.text = Some(text.into());
        node
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn push_child(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Text content of this node, empty string if none.
    pub fn text_value(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// The payload carried by an in-flight message.
///
/// `Clone` produces a fully independent deep copy; clone siblings share no
/// mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    body: Node,
}

impl Envelope {
    pub fn new() -> Self {
        Self {
            body: Node::new("body"),
        }
    }

    pub fn with_body(body: Node) -> Self {
        Self { body }
    }

    pub fn body(&self) -> &Node {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Node {
        &mut self.body
    }

    /// Remove every direct child of the body, leaving an empty template.
    pub fn clear_body(&mut self) {
        self.body.children.clear();
        self.body.text = None;
    }

    /// Attach a node at the first location matching `path`, or directly to
    /// the body when the path is empty or unmatched. Returns whether the
    /// path itself matched.
    pub fn attach_at(&mut self, path: &PathExpr, node: Node) -> bool {
        if path.is_empty() {
            self.body.children.push(node);
            return true;
        }
        if let Some(target) = path.select_first_mut(&mut self.body) {
            target.children.push(node);
            true
        } else {
            self.body.children.push(node);
            false
        }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Path Expressions
// ============================================================================

/// A slash-separated child-axis path evaluated against an envelope body.
///
/// This is the closed stand-in for the external query collaborator: it
/// supports the three evaluation modes the mediation core needs (node list,
/// first string value, boolean existence) and nothing more. `orders/order`
/// selects every `order` child of every `orders` child of the body. A `*`
/// segment matches every child, anonymous text nodes included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathExpr {
    segments: Vec<String>,
}

impl PathExpr {
    pub fn parse(expr: &str) -> Self {
        let segments = expr
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// All matching nodes, in document order. An empty path selects the body.
    pub fn select<'a>(&self, root: &'a Node) -> Vec<&'a Node> {
        let mut current = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for node in current {
                next.extend(node.children.iter().filter(|c| Self::matches(segment, c)));
            }
            current = next;
        }
        current
    }

    fn matches(segment: &str, node: &Node) -> bool {
        segment == "*" || node.name == segment
    }

    /// The first matching node's text content, if any node matched.
    pub fn select_string(&self, root: &Node) -> Option<String> {
        self.select(root)
            .first()
            .map(|n| n.text_value().to_string())
    }

    /// Whether any node matches.
    pub fn exists(&self, root: &Node) -> bool {
        !self.select(root).is_empty()
    }

    /// Remove every matching node from the tree and return them in document
    /// order. An empty path detaches nothing.
    pub fn detach_all(&self, root: &mut Node) -> Vec<Node> {
        if self.segments.is_empty() {
            return Vec::new();
        }
        let mut detached = Vec::new();
        Self::detach_walk(root, &self.segments, &mut detached);
        detached
    }

    fn detach_walk(node: &mut Node, segments: &[String], out: &mut Vec<Node>) {
        let segment = &segments[0];
        if segments.len() == 1 {
            let mut kept = Vec::with_capacity(node.children.len());
            for child in node.children.drain(..) {
                if Self::matches(segment, &child) {
                    out.push(child);
                } else {
                    kept.push(child);
                }
            }
            node.children = kept;
        } else {
            for child in node.children.iter_mut() {
                if Self::matches(segment, child) {
                    Self::detach_walk(child, &segments[1..], out);
                }
            }
        }
    }

    fn select_first_mut<'a>(&self, root: &'a mut Node) -> Option<&'a mut Node> {
        let mut current = root;
        for segment in &self.segments {
            current = current
                .children
                .iter_mut()
                .find(|c| Self::matches(segment, c))?;
        }
        Some(current)
    }
}

impl std::fmt::Display for PathExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}
