//! Helpers shared by this crate's tests.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{TimeZone, Utc};

use godb_diff::Backend;
use godb_model::{JsonNodeSerializer, NodeType, PropertyDescriptor, TypeModel};
use godb_types::Signature;

use crate::connection::Connection;
use crate::repository::Repository;
use crate::transform::Transformations;

static CLOCK: AtomicI64 = AtomicI64::new(1_700_000_000);

/// A signature strictly later than every previous one.
pub fn signature() -> Signature {
    let when = CLOCK.fetch_add(1, Ordering::SeqCst);
    Signature::at("Ada", "ada@example.com", Utc.timestamp_opt(when, 0).unwrap())
}

/// Tables with fields.
pub fn model() -> TypeModel {
    let mut model = TypeModel::default();
    model
        .register(
            NodeType::new("Table", "tables")
                .property(PropertyDescriptor::modifiable("name"))
                .property(PropertyDescriptor::modifiable("description")),
        )
        .unwrap();
    model
        .register(
            NodeType::new("Field", "fields")
                .under("Table")
                .property(PropertyDescriptor::modifiable("name"))
                .property(PropertyDescriptor::modifiable("kind")),
        )
        .unwrap();
    model
}

pub struct Fixture {
    pub repo: Repository,
    pub model: TypeModel,
    pub serializer: JsonNodeSerializer,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            repo: Repository::in_memory(),
            model: model(),
            serializer: JsonNodeSerializer,
        }
    }

    pub fn backend(&self) -> Backend<'_> {
        Backend::new(self.repo.store(), &self.model, &self.serializer)
    }

    pub fn transform(&self) -> Transformations<'_> {
        Transformations::new(self.backend(), self.repo.refs())
    }

    pub fn connection(&self) -> Connection<'_> {
        Connection::new(&self.repo, &self.model, &self.serializer)
    }
}
