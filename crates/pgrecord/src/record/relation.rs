//! Lazily resolved relations between entities.
//!
//! Relations are declared statically on an [`EntityDef`]:
//!
//! ```ignore
//! static USERS: EntityDef = EntityDef::new("User", "users", "id").with_relations(&[
//!     RelationDef::has_many("posts", &POSTS, "user_id")
//!         .configure(|q| {
//!             q.order_by(&["posts.id"]);
//!         })
//!         .back_ref("author"),
//! ]);
//! static POSTS: EntityDef = EntityDef::new("Post", "posts", "id")
//!     .with_relations(&[RelationDef::belongs_to("author", &USERS, "user_id")]);
//! ```
//!
//! [`Record::resolve`] runs the secondary query the first time a relation is
//! asked for and caches the result on the owning record.

use super::{EntityDef, Record};
use crate::error::{BuilderError, OrmResult};
use crate::qb::QueryBuilder;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Owner holds the foreign key; target matched on its primary key.
    BelongsTo,
    /// Target holds the foreign key; at most one row.
    HasOne,
    /// Target holds the foreign key; every matching row.
    HasMany,
}

/// Declared relation from one entity to another.
pub struct RelationDef {
    pub name: &'static str,
    pub kind: RelationKind,
    pub target: &'static EntityDef,
    pub foreign_key: &'static str,
    /// Extra builder setup applied to the secondary query (ordering, filters).
    pub configure: Option<fn(&mut QueryBuilder)>,
    /// Field of the resolved record(s) that points back to the owner.
    pub back_ref: Option<&'static str>,
}

impl RelationDef {
    const fn new(
        name: &'static str,
        kind: RelationKind,
        target: &'static EntityDef,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            target,
            foreign_key,
            configure: None,
            back_ref: None,
        }
    }

    pub const fn belongs_to(
        name: &'static str,
        target: &'static EntityDef,
        foreign_key: &'static str,
    ) -> Self {
        Self::new(name, RelationKind::BelongsTo, target, foreign_key)
    }

    pub const fn has_one(
        name: &'static str,
        target: &'static EntityDef,
        foreign_key: &'static str,
    ) -> Self {
        Self::new(name, RelationKind::HasOne, target, foreign_key)
    }

    pub const fn has_many(
        name: &'static str,
        target: &'static EntityDef,
        foreign_key: &'static str,
    ) -> Self {
        Self::new(name, RelationKind::HasMany, target, foreign_key)
    }

    pub const fn configure(mut self, f: fn(&mut QueryBuilder)) -> Self {
        self.configure = Some(f);
        self
    }

    pub const fn back_ref(mut self, field: &'static str) -> Self {
        self.back_ref = Some(field);
        self
    }
}

// Entity definitions reference each other, so only the target's name is printed.
impl std::fmt::Debug for RelationDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("target", &self.target.name)
            .field("foreign_key", &self.foreign_key)
            .field("configure", &self.configure.is_some())
            .field("back_ref", &self.back_ref)
            .finish()
    }
}

/// A resolved relation.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

impl Related {
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            Related::One(one) => one.as_deref(),
            Related::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> &[Record] {
        match self {
            Related::Many(many) => many,
            Related::One(_) => &[],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Related::One(one) => usize::from(one.is_some()),
            Related::Many(many) => many.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Record {
    /// Resolve `name`, querying only on the first call.
    ///
    /// A `belongs_to` whose foreign key is unset resolves to `One(None)`
    /// without a query.
    pub async fn resolve(&mut self, name: &str) -> OrmResult<&Related> {
        let rel = self.def.relation(name).ok_or_else(|| BuilderError::UnknownRelation {
            entity: self.def.name.to_string(),
            name: name.to_string(),
        })?;
        if self.relations.contains_key(rel.name) {
            return Ok(&self.relations[rel.name]);
        }

        let mut related = self.query_relation(rel).await?;
        if let Some(field) = rel.back_ref {
            let owner = self.detached();
            match &mut related {
                Related::One(Some(child)) => child.set_back_ref(field, owner),
                Related::One(None) => {}
                Related::Many(children) => {
                    for child in children.iter_mut() {
                        child.set_back_ref(field, owner.clone());
                    }
                }
            }
        }

        tracing::debug!(
            target: "pgrecord.sql",
            entity = self.def.name,
            relation = rel.name,
            rows = related.len(),
            "relation resolved"
        );
        self.relations.insert(rel.name, related);
        Ok(&self.relations[rel.name])
    }

    async fn query_relation(&self, rel: &'static RelationDef) -> OrmResult<Related> {
        let mut target = Record::new(rel.target, Arc::clone(&self.exec));

        let key = match rel.kind {
            RelationKind::BelongsTo => match self.get(rel.foreign_key).filter(|v| !v.is_null()) {
                Some(fk) => fk.clone(),
                None => return Ok(Related::One(None)),
            },
            RelationKind::HasOne | RelationKind::HasMany => self.require_pk()?,
        };
        let column = match rel.kind {
            RelationKind::BelongsTo => rel.target.primary_key,
            RelationKind::HasOne | RelationKind::HasMany => rel.foreign_key,
        };
        target.query.restrict(column, key);
        if let Some(configure) = rel.configure {
            configure(&mut target.query);
        }

        Ok(match rel.kind {
            RelationKind::HasMany => Related::Many(target.fetch_all().await?),
            _ => Related::One(target.fetch().await?.map(Box::new)),
        })
    }

    /// Cached result of `name`, without querying.
    pub fn cached(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    /// Drop the cached result of `name` so the next [`Record::resolve`]
    /// queries again. Returns whether anything was cached.
    pub fn invalidate(&mut self, name: &str) -> bool {
        self.relations.remove(name).is_some()
    }

    /// The owner this record was resolved from, through `field`.
    pub fn back_ref(&self, field: &str) -> Option<&Record> {
        self.back_refs.get(field).map(Box::as_ref)
    }

    fn set_back_ref(&mut self, field: &str, owner: Record) {
        self.back_refs.insert(field.to_string(), Box::new(owner));
    }

    /// Copy of the row state with no cached relations, back-references or
    /// pending builder state.
    fn detached(&self) -> Record {
        let mut copy = Record::new(self.def, Arc::clone(&self.exec));
        copy.values = self.values.clone();
        copy.dirty = self.dirty.clone();
        copy
    }
}
