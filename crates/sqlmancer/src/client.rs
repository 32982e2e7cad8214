//! The client: a connection plus the registry its builders compile against.
//!
//! ```rust,ignore
//! use sqlmancer::prelude::*;
//!
//! let client = Client::new(SqliteConnection::open_memory()?, Registry::from_json(CONFIG)?);
//! let film = client.model("Film")?;
//!
//! let page = film
//!     .paginate()
//!     .where_(json!({ "rating": { "in": ["G", "PG"] } }))
//!     .limit(20)
//!     .count()
//!     .execute(&cx)
//!     .await;
//!
//! if let Some(mutations) = film.mutations() {
//!     mutations.delete_by_id(1_i64).execute(&cx).await;
//! }
//! ```

use serde_json::Value as JsonValue;
use sqlmancer_core::{
    ComparableField, ConfigError, Connection, Error, Executor, ModelMeta, NumericField, Registry,
    Result, Value,
};
use sqlmancer_query::{
    Aggregate, CreateMany, CreateOne, DeleteById, DeleteMany, FindById, FindMany, FindOne,
    Paginate, UpdateById, UpdateMany,
};

/// A database connection bound to a model registry.
#[derive(Debug)]
pub struct Client<C: Connection> {
    connection: C,
    registry: Registry,
}

impl<C: Connection> Client<C> {
    pub fn new(connection: C, registry: Registry) -> Self {
        tracing::debug!(dialect = registry.dialect().as_str(), "Client created");
        Self {
            connection,
            registry,
        }
    }

    /// Builders for the model named `name`.
    pub fn model(&self, name: &str) -> Result<ModelClient<'_, C>> {
        let model = self
            .registry
            .model(name)
            .ok_or_else(|| Error::Config(ConfigError::unknown_model(name)))?;
        Ok(ModelClient {
            exec: &self.connection,
            registry: &self.registry,
            model,
        })
    }

    #[must_use]
    pub fn connection(&self) -> &C {
        &self.connection
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn into_connection(self) -> C {
        self.connection
    }
}

/// Read builders for one model.
#[derive(Debug)]
pub struct ModelClient<'c, E> {
    exec: &'c E,
    registry: &'c Registry,
    model: &'c ModelMeta,
}

impl<E> Clone for ModelClient<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for ModelClient<'_, E> {}

impl<'c, E: Executor> ModelClient<'c, E> {
    pub fn meta(&self) -> &'c ModelMeta {
        self.model
    }

    /// Aggregate token for `avg`/`sum`; `None` unless `name` is numeric.
    pub fn numeric_field(&self, name: &str) -> Option<NumericField<'c>> {
        self.model.numeric_field(name)
    }

    /// Aggregate token for `min`/`max`; `None` unless `name` is comparable.
    pub fn comparable_field(&self, name: &str) -> Option<ComparableField<'c>> {
        self.model.comparable_field(name)
    }

    pub fn find_by_id(&self, id: impl Into<Value>) -> FindById<'c, E> {
        FindById::new(self.exec, self.registry, self.model, id)
    }

    pub fn find_one(&self) -> FindOne<'c, E> {
        FindOne::new(self.exec, self.registry, self.model)
    }

    pub fn find_many(&self) -> FindMany<'c, E> {
        FindMany::new(self.exec, self.registry, self.model)
    }

    pub fn paginate(&self) -> Paginate<'c, E> {
        Paginate::new(self.exec, self.registry, self.model)
    }

    pub fn aggregate(&self) -> Aggregate<'c, E> {
        Aggregate::new(self.exec, self.registry, self.model)
    }

    /// The mutation builders, absent for read-only models.
    pub fn mutations(&self) -> Option<ModelMutations<'c, E>> {
        (!self.model.is_read_only()).then_some(ModelMutations {
            exec: self.exec,
            registry: self.registry,
            model: self.model,
        })
    }
}

/// Mutation builders for one writable model.
#[derive(Debug)]
pub struct ModelMutations<'c, E> {
    exec: &'c E,
    registry: &'c Registry,
    model: &'c ModelMeta,
}

impl<'c, E: Executor> ModelMutations<'c, E> {
    pub fn create_one(&self, input: JsonValue) -> CreateOne<'c, E> {
        CreateOne::new(self.exec, self.registry, self.model, input)
    }

    pub fn create_many(&self, inputs: Vec<JsonValue>) -> CreateMany<'c, E> {
        CreateMany::new(self.exec, self.registry, self.model, inputs)
    }

    pub fn update_by_id(&self, id: impl Into<Value>, input: JsonValue) -> UpdateById<'c, E> {
        UpdateById::new(self.exec, self.registry, self.model, id, input)
    }

    pub fn update_many(&self, input: JsonValue) -> UpdateMany<'c, E> {
        UpdateMany::new(self.exec, self.registry, self.model, input)
    }

    pub fn delete_by_id(&self, id: impl Into<Value>) -> DeleteById<'c, E> {
        DeleteById::new(self.exec, self.registry, self.model, id)
    }

    pub fn delete_many(&self) -> DeleteMany<'c, E> {
        DeleteMany::new(self.exec, self.registry, self.model)
    }
}
