//! Expression tree for clause rendering.
//!
//! An [`Expr`] is a `{source?, operator, target}` node; `source` and `target` may
//! themselves be expressions, so a clause is a right-folded tree:
//!
//! ```text
//! WHERE ─ target ─┬─ source: users.a = :ph1
//!                 ├─ operator: AND
//!                 └─ target: users.b > :ph2
//! ```
//!
//! Rendering never adds parentheses on its own. Grouping comes exclusively from
//! [`ExprGroup`], which renders `start + join(delimiter, items) + end`.

use std::fmt;

/// One side of an expression: plain SQL text, a nested expression, or a group.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Text(String),
    Expr(Box<Expr>),
    Group(ExprGroup),
}

impl Operand {
    pub fn render(&self) -> String {
        match self {
            Operand::Text(s) => s.clone(),
            Operand::Expr(e) => e.render(),
            Operand::Group(g) => g.render(),
        }
    }

    pub fn as_expr(&self) -> Option<&Expr> {
        match self {
            Operand::Expr(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&ExprGroup> {
        match self {
            Operand::Group(g) => Some(g),
            _ => None,
        }
    }
}

impl From<String> for Operand {
    fn from(s: String) -> Self {
        Operand::Text(s)
    }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Operand::Text(s.to_string())
    }
}

impl From<Expr> for Operand {
    fn from(e: Expr) -> Self {
        Operand::Expr(Box::new(e))
    }
}

impl From<ExprGroup> for Operand {
    fn from(g: ExprGroup) -> Self {
        Operand::Group(g)
    }
}

/// Expression node: `source operator target`.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    source: Option<Operand>,
    operator: String,
    target: Operand,
}

impl Expr {
    pub fn new(source: Option<Operand>, operator: impl Into<String>, target: impl Into<Operand>) -> Self {
        Self {
            source,
            operator: operator.into(),
            target: target.into(),
        }
    }

    /// Expression without a source, e.g. `WHERE <target>` or `ORDER BY <target>`.
    pub fn prefix(operator: impl Into<String>, target: impl Into<Operand>) -> Self {
        Self::new(None, operator, target)
    }

    /// Expression with both sides, e.g. `<source> AND <target>`.
    pub fn binary(
        source: impl Into<Operand>,
        operator: impl Into<String>,
        target: impl Into<Operand>,
    ) -> Self {
        Self::new(Some(source.into()), operator, target)
    }

    pub fn source(&self) -> Option<&Operand> {
        self.source.as_ref()
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn target(&self) -> &Operand {
        &self.target
    }

    pub(crate) fn target_mut(&mut self) -> &mut Operand {
        &mut self.target
    }

    /// Render as `source operator target`.
    ///
    /// An absent source renders as the empty string; empty parts are skipped so
    /// the output never carries doubled or leading spaces. A `,` operator hugs
    /// its source, as in `a = :ph1, b = :ph2`.
    pub fn render(&self) -> String {
        let source = self.source.as_ref().map(Operand::render).unwrap_or_default();
        let target = self.target.render();
        if self.operator == "," {
            return [source.as_str(), target.as_str()]
                .iter()
                .filter(|part| !part.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(", ");
        }
        [source.as_str(), self.operator.as_str(), target.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Parenthesized, delimited list of operands (the "wrap" node).
#[derive(Clone, Debug, PartialEq)]
pub struct ExprGroup {
    items: Vec<Operand>,
    delimiter: String,
    start: String,
    end: String,
}

impl ExprGroup {
    /// Comma-delimited group in parentheses: `(a,b,c)`.
    pub fn new(items: Vec<Operand>) -> Self {
        Self {
            items,
            delimiter: ",".to_string(),
            start: "(".to_string(),
            end: ")".to_string(),
        }
    }

    /// Group of placeholder names or column names.
    pub fn of_text<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(items.into_iter().map(|s| Operand::Text(s.into())).collect())
    }

    /// Two-element range for BETWEEN: renders `lo AND hi` with no parentheses.
    pub fn range(lo: impl Into<String>, hi: impl Into<String>) -> Self {
        Self::of_text([lo.into(), hi.into()])
            .delimiter(" AND ")
            .bounds("", "")
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn bounds(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start = start.into();
        self.end = end.into();
        self
    }

    pub fn items(&self) -> &[Operand] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn render(&self) -> String {
        let body: Vec<String> = self.items.iter().map(Operand::render).collect();
        format!("{}{}{}", self.start, body.join(&self.delimiter), self.end)
    }
}

impl fmt::Display for ExprGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
